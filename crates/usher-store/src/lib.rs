//! SQLite-backed scheduler backend for usherd
//!
//! Holds named triggers in a single table so a development or single-node
//! deployment can run without a hosted scheduling service. Implements
//! `ExternalScheduler` with the same idempotency guarantees:
//! - upsert by name replaces the row
//! - delete of a missing name succeeds

mod sqlite;

pub use sqlite::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
