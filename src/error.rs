use serde::ser;
use std::fmt::Display;
use thiserror::Error;

/// Errors raised while rendering a value as a table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// A top-level sequence holds an element that is not a record
    #[error("sequence element {index} is a {found}, expected a record")]
    NonRecordSequence { index: usize, found: &'static str },

    /// Raised by a `Serialize` impl of the input value itself
    #[error("failed to serialize value: {0}")]
    Serialize(String),
}

impl ser::Error for MarshalError {
    fn custom<T: Display>(msg: T) -> Self {
        MarshalError::Serialize(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarshalError>;
