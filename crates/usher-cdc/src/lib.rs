//! Change-record intake for usherd
//!
//! Provides:
//! - Debezium-style envelope normalization into `SessionChange`
//! - NDJSON (newline-delimited JSON) record reading from a file or stdin

mod normalizer;
mod reader;

pub use normalizer::*;
pub use reader::*;

use thiserror::Error;

/// Errors for a single malformed change record
///
/// None of these are fatal: the caller logs and skips the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Expected a JSON object for {0}")]
    NotAnObject(&'static str),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown operation code: {0:?}")]
    UnknownOperation(String),

    #[error("Invalid timestamp in {field}: {reason}")]
    InvalidTimestamp { field: &'static str, reason: String },
}

impl ParseError {
    pub fn wrong_type(field: &'static str, expected: &'static str) -> Self {
        Self::WrongType { field, expected }
    }

    pub fn invalid_timestamp(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::Json(e.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
