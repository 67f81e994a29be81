//! Storage interfaces for the object catalog and the reference ledger.
//!
//! Any backend (in-memory, journaled file, database with a unique index on
//! the digest) implements these traits.

use std::collections::{BTreeSet, HashMap};

use cask_types::{Digest, Reference, StoredObject};

use crate::error::CatalogResult;

/// Result of [`ObjectCatalog::insert_if_absent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    /// `true` if the offered object was inserted; `false` if another object
    /// with the same digest was already present.
    pub inserted: bool,
    /// The object now in the catalog under the digest: the offered one when
    /// `inserted`, otherwise the pre-existing one.
    pub object: StoredObject,
}

/// Record of unique stored objects keyed by digest.
///
/// Implementations must be thread-safe and must make
/// [`insert_if_absent`](Self::insert_if_absent) atomic: at most one caller
/// ever sees `inserted == true` for a given digest.
pub trait ObjectCatalog: Send + Sync {
    /// Look up the object stored under `digest`.
    fn find(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>>;

    /// Insert `object` unless its digest is already catalogued.
    fn insert_if_absent(&self, object: StoredObject) -> CatalogResult<InsertOutcome>;

    /// Remove and return the object stored under `digest`.
    fn remove(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>>;

    /// All objects, newest first.
    fn list(&self) -> CatalogResult<Vec<StoredObject>>;

    /// Number of catalogued objects.
    fn len(&self) -> CatalogResult<usize>;

    /// Returns `true` if nothing is catalogued.
    fn is_empty(&self) -> CatalogResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns `true` if `digest` is catalogued.
    fn contains(&self, digest: &Digest) -> CatalogResult<bool> {
        Ok(self.find(digest)?.is_some())
    }

    /// Every distinct declared media type.
    fn declared_types(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|obj| obj.declared_type)
            .collect())
    }
}

/// Record of uploads that resolved to an already stored object.
pub trait ReferenceLedger: Send + Sync {
    /// Record one duplicate upload.
    fn append(&self, reference: Reference) -> CatalogResult<()>;

    /// References targeting `digest`, newest first.
    fn list_for(&self, digest: &Digest) -> CatalogResult<Vec<Reference>>;

    /// Number of references targeting `digest`.
    fn count_for(&self, digest: &Digest) -> CatalogResult<u64>;

    /// Total number of references.
    fn count(&self) -> CatalogResult<u64>;

    /// Reference counts per target digest (digests without references are
    /// absent).
    fn counts(&self) -> CatalogResult<HashMap<Digest, u64>>;

    /// Delete every reference targeting `digest`. Returns how many went.
    fn remove_for(&self, digest: &Digest) -> CatalogResult<usize>;
}
