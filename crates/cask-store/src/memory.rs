use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, RwLock};

use cask_crypto::HashingWriter;
use cask_types::Digest;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobLocation, BlobReader, BlobStore};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are shared `Arc<[u8]>` buffers,
/// so reads do not copy the stored bytes.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<Digest, Arc<[u8]>>>,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.blobs.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .values()
            .map(|b| b.len() as u64)
            .sum())
    }

    fn location(digest: &Digest, size: u64, created: bool) -> BlobLocation {
        BlobLocation {
            digest: *digest,
            size,
            location: format!("mem:{}", digest.to_hex()),
            created,
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, digest: &Digest, reader: &mut dyn Read) -> StoreResult<BlobLocation> {
        if let Some(existing) = self
            .blobs
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(digest)
        {
            return Ok(Self::location(digest, existing.len() as u64, false));
        }

        let mut writer = HashingWriter::new(Vec::new());
        io::copy(reader, &mut writer)?;
        let (data, computed, size) = writer.finish();
        if computed != *digest {
            return Err(StoreError::HashMismatch {
                expected: *digest,
                computed,
            });
        }

        let mut map = self.blobs.write().map_err(|_| StoreError::Poisoned)?;
        let created = !map.contains_key(digest);
        map.entry(*digest).or_insert_with(|| Arc::from(data));
        Ok(Self::location(digest, size, created))
    }

    fn get(&self, digest: &Digest) -> StoreResult<BlobReader> {
        let map = self.blobs.read().map_err(|_| StoreError::Poisoned)?;
        let data = map.get(digest).cloned().ok_or(StoreError::NotFound(*digest))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        let map = self.blobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.contains_key(digest))
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        let mut map = self.blobs.write().map_err(|_| StoreError::Poisoned)?;
        Ok(map.remove(digest).is_some())
    }

    fn list(&self) -> StoreResult<Vec<Digest>> {
        let map = self.blobs.read().map_err(|_| StoreError::Poisoned)?;
        let mut digests: Vec<Digest> = map.keys().copied().collect();
        digests.sort();
        Ok(digests)
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &count)
            .finish()
    }
}
