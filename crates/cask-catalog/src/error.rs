//! Error types for catalog operations.

use std::io;

use thiserror::Error;

/// Errors that can occur during catalog and ledger operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// I/O error while reading or writing the journal.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding catalog state was poisoned by a panicking writer.
    #[error("catalog lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Convenience type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
