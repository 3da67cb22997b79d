//! Persistence layer for counseld
//!
//! Provides:
//! - Session records and their participant links
//! - Guarded (`completed = 0`) completion updates shared by manual and automatic closure
//! - Filtered session queries built from bound predicates
//! - Student directory rows used for class lookups
//! - Audit log (append-only)

mod audit;
mod query;
mod sqlite;
mod traits;

pub use audit::*;
pub use query::*;
pub use sqlite::*;
pub use traits::*;

use counsel_util::CounselError;
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

    #[error("Store lock poisoned")]
    LockPoisoned,
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

impl From<StoreError> for CounselError {
    fn from(e: StoreError) -> Self {
        CounselError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
