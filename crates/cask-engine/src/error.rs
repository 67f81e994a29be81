use std::io;

use cask_catalog::CatalogError;
use cask_store::StoreError;
use cask_types::Digest;
use thiserror::Error;

/// Errors surfaced by the deduplication engine.
///
/// Duplicate content is never an error: it is a successful ingestion
/// reported through [`IngestResult::is_duplicate`](crate::IngestResult).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reading the upload or talking to the blob store failed.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The bytes could not be persisted as hashed. No catalog record was
    /// kept, so retrying the whole upload is clean.
    #[error("incomplete upload of {digest}: {reason}")]
    IncompleteUpload { digest: Digest, reason: String },

    /// The decision for one digest kept racing with concurrent writers.
    #[error("conflicting writers on {digest}: gave up after {attempts} attempts")]
    ConflictRetryExhausted { digest: Digest, attempts: u32 },

    /// The request itself is unusable (e.g. an empty filename).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No object is catalogued under the digest.
    #[error("object not found: {0}")]
    NotFound(Digest),

    #[error("blob store error: {0}")]
    Store(StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A lock guarding engine state was poisoned by a panicking thread.
    #[error("engine lock poisoned: {0}")]
    Poisoned(&'static str),
}

impl EngineError {
    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::IncompleteUpload { .. } | Self::ConflictRetryExhausted { .. }
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => Self::Io(e),
            StoreError::NotFound(digest) => Self::NotFound(digest),
            other => Self::Store(other),
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
