//! In-memory catalog backends for testing and embedding.
//!
//! Both backends keep their state in a `HashMap` behind a `RwLock`. Each
//! mutation takes the write lock exactly once, so a check and the write it
//! guards form one critical section. The `*_with` variants run a hook inside
//! that section before the state changes; the journaled backends use it to
//! persist the mutation first.

use std::collections::HashMap;
use std::sync::RwLock;

use cask_types::{Digest, Reference, StoredObject};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::{InsertOutcome, ObjectCatalog, ReferenceLedger};

/// An in-memory implementation of [`ObjectCatalog`].
#[derive(Debug, Default)]
pub struct InMemoryObjectCatalog {
    objects: RwLock<HashMap<Digest, StoredObject>>,
}

impl InMemoryObjectCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic insert-if-absent that runs `hook` on the new object, under the
    /// write lock, before inserting it. If the hook fails nothing is inserted.
    pub fn insert_if_absent_with<F>(&self, object: StoredObject, hook: F) -> CatalogResult<InsertOutcome>
    where
        F: FnOnce(&StoredObject) -> CatalogResult<()>,
    {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| CatalogError::Poisoned("object catalog"))?;
        if let Some(existing) = objects.get(&object.digest) {
            return Ok(InsertOutcome {
                inserted: false,
                object: existing.clone(),
            });
        }
        hook(&object)?;
        objects.insert(object.digest, object.clone());
        Ok(InsertOutcome {
            inserted: true,
            object,
        })
    }

    /// Remove an object, running `hook` under the write lock first when the
    /// object exists.
    pub fn remove_with<F>(&self, digest: &Digest, hook: F) -> CatalogResult<Option<StoredObject>>
    where
        F: FnOnce(&StoredObject) -> CatalogResult<()>,
    {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| CatalogError::Poisoned("object catalog"))?;
        match objects.get(digest) {
            Some(existing) => hook(existing)?,
            None => return Ok(None),
        }
        Ok(objects.remove(digest))
    }
}

impl ObjectCatalog for InMemoryObjectCatalog {
    fn find(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| CatalogError::Poisoned("object catalog"))?;
        Ok(objects.get(digest).cloned())
    }

    fn insert_if_absent(&self, object: StoredObject) -> CatalogResult<InsertOutcome> {
        self.insert_if_absent_with(object, |_| Ok(()))
    }

    fn remove(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>> {
        self.remove_with(digest, |_| Ok(()))
    }

    fn list(&self) -> CatalogResult<Vec<StoredObject>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| CatalogError::Poisoned("object catalog"))?;
        let mut list: Vec<StoredObject> = objects.values().cloned().collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.digest.cmp(&b.digest))
        });
        Ok(list)
    }

    fn len(&self) -> CatalogResult<usize> {
        let objects = self
            .objects
            .read()
            .map_err(|_| CatalogError::Poisoned("object catalog"))?;
        Ok(objects.len())
    }
}

/// An in-memory implementation of [`ReferenceLedger`].
///
/// References are kept per target in arrival order; listings reverse that
/// order so the newest comes first.
#[derive(Debug, Default)]
pub struct InMemoryReferenceLedger {
    references: RwLock<HashMap<Digest, Vec<Reference>>>,
}

impl InMemoryReferenceLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference, running `hook` under the write lock first.
    pub fn append_with<F>(&self, reference: Reference, hook: F) -> CatalogResult<()>
    where
        F: FnOnce(&Reference) -> CatalogResult<()>,
    {
        let mut references = self
            .references
            .write()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        hook(&reference)?;
        references.entry(reference.target).or_default().push(reference);
        Ok(())
    }

    /// Remove all references to `digest`, running `hook` under the write
    /// lock first when there is anything to remove.
    pub fn remove_for_with<F>(&self, digest: &Digest, hook: F) -> CatalogResult<usize>
    where
        F: FnOnce(usize) -> CatalogResult<()>,
    {
        let mut references = self
            .references
            .write()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        let count = references.get(digest).map(Vec::len).unwrap_or(0);
        if count == 0 {
            return Ok(0);
        }
        hook(count)?;
        references.remove(digest);
        Ok(count)
    }
}

impl ReferenceLedger for InMemoryReferenceLedger {
    fn append(&self, reference: Reference) -> CatalogResult<()> {
        self.append_with(reference, |_| Ok(()))
    }

    fn list_for(&self, digest: &Digest) -> CatalogResult<Vec<Reference>> {
        let references = self
            .references
            .read()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        Ok(references
            .get(digest)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn count_for(&self, digest: &Digest) -> CatalogResult<u64> {
        let references = self
            .references
            .read()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        Ok(references.get(digest).map(|l| l.len() as u64).unwrap_or(0))
    }

    fn count(&self) -> CatalogResult<u64> {
        let references = self
            .references
            .read()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        Ok(references.values().map(|l| l.len() as u64).sum())
    }

    fn counts(&self) -> CatalogResult<HashMap<Digest, u64>> {
        let references = self
            .references
            .read()
            .map_err(|_| CatalogError::Poisoned("reference ledger"))?;
        Ok(references
            .iter()
            .map(|(digest, list)| (*digest, list.len() as u64))
            .collect())
    }

    fn remove_for(&self, digest: &Digest) -> CatalogResult<usize> {
        self.remove_for_with(digest, |_| Ok(()))
    }
}
