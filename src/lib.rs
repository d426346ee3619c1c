//! # csv-marshal - object graphs as delimited tables
//!
//! Renders any `serde::Serialize` value as delimited text. Every top-level
//! sequence of records becomes one table block; nested records are inlined
//! into the row, nested sequences and maps are merged into single cells.
//! Self-referential data (`Rc` cycles through `RefCell`) is cut at the
//! repeated record instead of recursing forever.
//!
//! ## Modules
//!
//! - **extractor**: find the top-level sequences of records
//! - **flatten**: capture one record and render it as header or row
//! - **writer**: join headers, rows and blocks into text
//! - **json**: read JSON documents with objects as records
//!
//! ## Quick Start
//!
//! ```rust
//! use csv_marshal::MarshalConfig;
//! use serde::Serialize;
//! use std::collections::BTreeMap;
//!
//! #[derive(Serialize)]
//! struct Row {
//!     #[serde(rename = "Col1")]
//!     col1: String,
//!     #[serde(rename = "S")]
//!     s: Vec<String>,
//!     #[serde(rename = "M")]
//!     m: BTreeMap<i32, i32>,
//! }
//!
//! # fn main() -> Result<(), csv_marshal::MarshalError> {
//! let rows = vec![Row {
//!     col1: "a".into(),
//!     s: vec!["a".into(), "b".into()],
//!     m: BTreeMap::from([(1, 2), (3, 4)]),
//! }];
//!
//! let csv = csv_marshal::to_string(&rows, &MarshalConfig::default())?;
//! assert_eq!(csv, "Col1;S;M\na;a|b;1:2|3:4\n");
//! # Ok(())
//! # }
//! ```

use serde::Serialize;

pub mod error;
pub mod extractor;
pub mod flatten;
pub mod format;
pub mod json;
pub mod marshaler;
pub mod types;
pub mod writer;

// Re-export commonly used types for convenience
pub use error::{MarshalError, Result};
pub use extractor::Block;
pub use flatten::{Mode, RowFlattener};
pub use format::ScalarFormatter;
pub use marshaler::{Marshaler, CONTENT_TYPE};
pub use writer::TableWriter;
pub use types::{
    Field, MapOrder, MarshalConfig, Node, Record, Scalar, BLOCK_SEPARATOR, DEFAULT_FIELD_DELIM,
    DEFAULT_INNER_DELIM, DEFAULT_ROW_DELIM,
};

/// Main entry point: render `value` as delimited table bytes
pub fn to_vec<T: ?Sized + Serialize>(value: &T, config: &MarshalConfig) -> Result<Vec<u8>> {
    to_string(value, config).map(String::into_bytes)
}

/// Same as [`to_vec`], returning text
pub fn to_string<T: ?Sized + Serialize>(value: &T, config: &MarshalConfig) -> Result<String> {
    let config = config.clone().with_defaults();
    let blocks = extractor::extract(value, &config)?;
    Ok(TableWriter::new(&config).render(&blocks))
}

/// Media type of the rendered output
pub fn content_type() -> &'static str {
    CONTENT_TYPE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Row {
        #[serde(rename = "Col1")]
        col1: String,
        #[serde(rename = "Col2")]
        col2: String,
        #[serde(rename = "S")]
        s: Vec<String>,
        #[serde(rename = "M")]
        m: BTreeMap<i32, i32>,
    }

    #[test]
    fn test_basic_marshaling() {
        let rows = vec![
            Row {
                col1: "a".into(),
                col2: "b".into(),
                s: vec!["a".into(), "b".into()],
                m: BTreeMap::from([(1, 2), (3, 4)]),
            },
            Row {
                col1: "e".into(),
                col2: "f".into(),
                s: vec!["a".into(), "b".into(), "c".into()],
                m: BTreeMap::new(),
            },
        ];

        let csv = to_string(&rows, &MarshalConfig::default()).unwrap();
        assert_eq!(csv, "Col1;Col2;S;M\na;b;a|b;1:2|3:4\ne;f;a|b|c;\n");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(), "text/csv");
    }
}
