//! Journaled catalog backends.
//!
//! [`JournaledCatalog`] and [`JournaledLedger`] share one [`Journal`]. Each
//! mutation is appended to the journal inside the in-memory backend's
//! critical section, so the journal order matches the order in which
//! readers observed the changes: an `ObjectStored` event always precedes
//! the `ReferenceAppended` events that target it.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use cask_types::{Digest, Reference, StoredObject};

use crate::error::CatalogResult;
use crate::journal::{CatalogEvent, Journal, SyncMode};
use crate::memory::{InMemoryObjectCatalog, InMemoryReferenceLedger};
use crate::traits::{InsertOutcome, ObjectCatalog, ReferenceLedger};

/// Open the journal at `path` and rebuild the catalog and ledger from it.
///
/// References whose target is not catalogued at that point of the replay
/// are rejected with a warning, so a recovered ledger never points at a
/// missing object.
pub fn open_journaled(
    path: &Path,
    sync_mode: SyncMode,
) -> CatalogResult<(JournaledCatalog, JournaledLedger)> {
    let journal = Arc::new(Journal::open(path, sync_mode)?);
    let objects = InMemoryObjectCatalog::new();
    let references = InMemoryReferenceLedger::new();

    let events = journal.recover()?;
    let replayed = events.len();
    for event in events {
        match event {
            CatalogEvent::ObjectStored(object) => {
                objects.insert_if_absent(object)?;
            }
            CatalogEvent::ReferenceAppended(reference) => {
                if objects.contains(&reference.target)? {
                    references.append(reference)?;
                } else {
                    warn!(
                        reference = %reference.id,
                        target = %reference.target.short_hex(),
                        "dropping journaled reference to a missing object"
                    );
                }
            }
            CatalogEvent::ReferencesRemoved { digest } => {
                references.remove_for(&digest)?;
            }
            CatalogEvent::ObjectRemoved { digest } => {
                objects.remove(&digest)?;
                // A removed object takes its references with it.
                references.remove_for(&digest)?;
            }
        }
    }

    info!(
        path = %path.display(),
        events = replayed,
        objects = objects.len()?,
        references = references.count()?,
        "catalog journal replayed"
    );

    Ok((
        JournaledCatalog {
            inner: objects,
            journal: Arc::clone(&journal),
        },
        JournaledLedger {
            inner: references,
            journal,
        },
    ))
}

/// [`ObjectCatalog`] that journals every mutation before applying it.
#[derive(Debug)]
pub struct JournaledCatalog {
    inner: InMemoryObjectCatalog,
    journal: Arc<Journal>,
}

impl JournaledCatalog {
    /// The journal backing this catalog.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl ObjectCatalog for JournaledCatalog {
    fn find(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>> {
        self.inner.find(digest)
    }

    fn insert_if_absent(&self, object: StoredObject) -> CatalogResult<InsertOutcome> {
        self.inner.insert_if_absent_with(object, |new| {
            self.journal
                .append(&CatalogEvent::ObjectStored(new.clone()))
                .map(|_| ())
        })
    }

    fn remove(&self, digest: &Digest) -> CatalogResult<Option<StoredObject>> {
        self.inner.remove_with(digest, |existing| {
            self.journal
                .append(&CatalogEvent::ObjectRemoved {
                    digest: existing.digest,
                })
                .map(|_| ())
        })
    }

    fn list(&self) -> CatalogResult<Vec<StoredObject>> {
        self.inner.list()
    }

    fn len(&self) -> CatalogResult<usize> {
        self.inner.len()
    }

    fn declared_types(&self) -> CatalogResult<BTreeSet<String>> {
        self.inner.declared_types()
    }
}

/// [`ReferenceLedger`] that journals every mutation before applying it.
#[derive(Debug)]
pub struct JournaledLedger {
    inner: InMemoryReferenceLedger,
    journal: Arc<Journal>,
}

impl ReferenceLedger for JournaledLedger {
    fn append(&self, reference: Reference) -> CatalogResult<()> {
        self.inner.append_with(reference, |new| {
            self.journal
                .append(&CatalogEvent::ReferenceAppended(new.clone()))
                .map(|_| ())
        })
    }

    fn list_for(&self, digest: &Digest) -> CatalogResult<Vec<Reference>> {
        self.inner.list_for(digest)
    }

    fn count_for(&self, digest: &Digest) -> CatalogResult<u64> {
        self.inner.count_for(digest)
    }

    fn count(&self) -> CatalogResult<u64> {
        self.inner.count()
    }

    fn counts(&self) -> CatalogResult<HashMap<Digest, u64>> {
        self.inner.counts()
    }

    fn remove_for(&self, digest: &Digest) -> CatalogResult<usize> {
        self.inner.remove_for_with(digest, |_| {
            self.journal
                .append(&CatalogEvent::ReferencesRemoved { digest: *digest })
                .map(|_| ())
        })
    }
}
