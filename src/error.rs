//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = BpetokError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during configuration, IO, or model loading.
///
/// Encoding itself never fails; every variant here arises at the loading
/// boundary, and a model is never returned partially constructed.
#[derive(Debug, Error)]
pub enum BpetokError {
    /// Vocabulary file failed parsing or validation.
    #[error("invalid vocabulary: {0}")]
    Vocab(String),
    /// Merge table failed parsing or validation.
    #[error("invalid merge table: {0}")]
    Merges(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BpetokError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl BpetokError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }
}
