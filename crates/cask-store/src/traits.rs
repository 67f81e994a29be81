use std::io::Read;

use cask_types::Digest;

use crate::error::StoreResult;

/// Readable handle to a stored blob.
pub type BlobReader = Box<dyn Read + Send>;

/// Where a blob ended up after `put`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobLocation {
    pub digest: Digest,
    /// Stored byte length.
    pub size: u64,
    /// Backend-specific address (a file path, or `mem:<hex>`).
    pub location: String,
    /// `false` when the digest was already present and nothing was written.
    pub created: bool,
}

/// Raw byte storage keyed by content digest.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written.
/// - `put` checks the bytes against `digest` and fails with
///   `HashMismatch` rather than store content under the wrong key.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait BlobStore: Send + Sync {
    /// Persist the bytes of `reader` under `digest`.
    ///
    /// If the digest already exists this is a no-op and the reader is left
    /// untouched.
    fn put(&self, digest: &Digest, reader: &mut dyn Read) -> StoreResult<BlobLocation>;

    /// Open a stored blob for reading.
    ///
    /// Returns `StoreError::NotFound` if the digest is unknown.
    fn get(&self, digest: &Digest) -> StoreResult<BlobReader>;

    /// Check whether a blob exists.
    fn exists(&self, digest: &Digest) -> StoreResult<bool>;

    /// Delete a blob. Returns `true` if it existed.
    ///
    /// Intended for rollback and garbage collection only; deleting a blob
    /// the catalog still names corrupts the store.
    fn delete(&self, digest: &Digest) -> StoreResult<bool>;

    /// Every digest currently stored, sorted.
    fn list(&self) -> StoreResult<Vec<Digest>>;

    /// Read a whole blob into memory.
    fn read_to_vec(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        let mut reader = self.get(digest)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}
