//! Blob storage for Cask.
//!
//! A blob store persists raw upload bytes under their content digest. It is
//! the physical half of deduplication: the catalog decides *whether* bytes
//! must be stored, the blob store only stores them.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`] -- sharded directory tree with atomic renames
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content addressing guarantees this).
//! 2. `put` verifies the bytes against the digest while writing them; a
//!    mismatch leaves nothing visible under that digest.
//! 3. `put` of an existing digest is a no-op.
//! 4. The store never interprets blob contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobLocation, BlobReader, BlobStore};
