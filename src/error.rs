//! Error types for feature stores.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Primary error type for opening and querying feature stores.
#[derive(Debug, Error)]
pub enum StoreError {
    // === Open Errors ===
    #[error("Feature database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Malformed {what}: {reason}")]
    Malformed { what: String, reason: String },

    #[error("Invalid GeoJSON: {0}")]
    Parse(String),

    // === Read Errors ===
    #[error("Failed to decode record at offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Remote Errors ===
    #[error("{failed} of {total} remote fetches failed, first: {first}")]
    RemoteFetch {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Transport error: {0:#}")]
    Transport(#[from] anyhow::Error),

    #[error("Failed to start fetch pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl StoreError {
    pub(crate) fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::Decode {
            offset,
            reason: reason.into(),
        }
    }
}
