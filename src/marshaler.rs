use crate::error::Result;
use crate::extractor;
use crate::types::MarshalConfig;
use crate::writer::TableWriter;
use serde::Serialize;
use serde_json::Value;

/// Media type of everything a [`Marshaler`] produces
pub const CONTENT_TYPE: &str = "text/csv";

/// Renders values as delimited tables
///
/// A marshaler holds no state besides its configuration; one instance can
/// serve any number of calls, from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Marshaler {
    config: MarshalConfig,
}

impl Marshaler {
    /// Create a marshaler; empty delimiters fall back to their defaults
    pub fn new(config: MarshalConfig) -> Self {
        Marshaler {
            config: config.with_defaults(),
        }
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Render `value` as one table block per top-level sequence of records
    ///
    /// Nothing is returned if any block fails: a sequence holding a
    /// non-record element aborts the whole call.
    pub fn marshal<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let blocks = extractor::extract(value, &self.config)?;
        Ok(TableWriter::new(&self.config).render(&blocks).into_bytes())
    }

    /// Render a JSON document, taking JSON objects as records
    pub fn marshal_json(&self, value: &Value) -> Result<Vec<u8>> {
        let blocks = extractor::extract_json(value, &self.config)?;
        Ok(TableWriter::new(&self.config).render(&blocks).into_bytes())
    }

    /// The media type this marshaler is responsible for
    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_delimiters_are_defaulted() {
        let config = MarshalConfig::default()
            .with_row_delim("")
            .with_field_delim("");
        let marshaler = Marshaler::new(config);
        assert_eq!(marshaler.config().row_delim, "\n");
        assert_eq!(marshaler.config().field_delim, ";");
    }

    #[test]
    fn test_marshal_json() {
        let doc = json!([
            {"id": 1, "tags": ["a", "b"], "owner": {"name": "Alice"}},
            {"id": 2, "tags": [], "owner": {"name": "Bob"}}
        ]);
        let out = Marshaler::default().marshal_json(&doc).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id;tags;name\n1;a|b;Alice\n2;;Bob\n"
        );
    }

    #[test]
    fn test_content_type() {
        assert_eq!(Marshaler::default().content_type(), "text/csv");
    }
}
