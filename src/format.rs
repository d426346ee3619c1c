//! Scalar formatting hooks
//!
//! Every leaf value ends up in a cell through a [`ScalarFormatter`]. The
//! default renders values the way `Display` does; other hooks change
//! number formatting without touching anything else.

use crate::types::Scalar;
use std::sync::Arc;

/// Renders one leaf value into cell text
pub type ScalarFormatter = Arc<dyn Fn(&Scalar) -> String + Send + Sync>;

/// Locale-independent default rendering
pub fn default_scalar(scalar: &Scalar) -> String {
    scalar.to_string()
}

/// Render floating point values with `separator` as the decimal mark
///
/// Integers, strings and all other scalars keep their default rendering.
pub fn decimal_separator(separator: char) -> ScalarFormatter {
    Arc::new(move |scalar: &Scalar| match scalar {
        Scalar::F32(_) | Scalar::F64(_) => {
            let mut buf = [0u8; 4];
            scalar
                .to_string()
                .replacen('.', separator.encode_utf8(&mut buf), 1)
        }
        _ => default_scalar(scalar),
    })
}
