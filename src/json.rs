//! JSON documents as record graphs
//!
//! `serde_json::Value` serializes objects as maps, which would never qualify
//! as table rows. This module reads a JSON document directly instead:
//! objects become records (keys in document order), arrays become
//! sequences, `null` becomes a nil reference.

use crate::types::{Field, Node, Record, Scalar};
use regex::Regex;
use serde_json::{Number, Value};

/// Record name given to every JSON object
pub const OBJECT_RECORD: &str = "object";

impl Node {
    /// Convert a JSON document, taking objects as records
    pub fn from_json(value: &Value) -> Node {
        to_node(value, None)
    }
}

/// Convert a JSON value, dropping object keys that match `reserved`
pub fn to_node(value: &Value, reserved: Option<&Regex>) -> Node {
    match value {
        Value::Null => Node::Reference(None),
        Value::Bool(b) => Node::Scalar(Scalar::Bool(*b)),
        Value::Number(n) => Node::Scalar(number(n)),
        Value::String(s) => Node::Scalar(Scalar::Str(s.clone())),
        Value::Array(items) => {
            Node::Sequence(items.iter().map(|item| to_node(item, reserved)).collect())
        }
        Value::Object(obj) => {
            let fields = obj
                .iter()
                .filter(|(key, _)| !reserved.is_some_and(|pattern| pattern.is_match(key.as_str())))
                .map(|(key, value)| Field::new(key.clone(), to_node(value, reserved)))
                .collect();
            Node::Record(Record {
                name: String::from(OBJECT_RECORD),
                fields,
            })
        }
    }
}

fn number(n: &Number) -> Scalar {
    if let Some(v) = n.as_u64() {
        Scalar::U64(v)
    } else if let Some(v) = n.as_i64() {
        Scalar::I64(v)
    } else if let Some(v) = n.as_f64() {
        Scalar::F64(v)
    } else {
        Scalar::Str(n.to_string())
    }
}
