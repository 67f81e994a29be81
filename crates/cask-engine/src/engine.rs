use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use tracing::{debug, info, warn};

use cask_catalog::{InMemoryObjectCatalog, InMemoryReferenceLedger, ObjectCatalog, ReferenceLedger};
use cask_crypto::ContentHasher;
use cask_store::{BlobLocation, BlobReader, BlobStore, InMemoryBlobStore, StoreError};
use cask_types::{Digest, Reference, StoredObject, UsageSummary};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::locks::DigestLocks;
use crate::outcome::{GcReport, IngestResult, RemovalReport};
use crate::stats::{StatsAggregator, StatsDelta, StatsReport};
use crate::view::{ObjectView, ReferenceListing};

/// Media type recorded when the caller declares none.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Content-addressable deduplication engine.
///
/// Each ingestion hashes the upload, then under the digest's lock either
/// records a [`Reference`] to the existing object or persists the bytes and
/// inserts a new [`StoredObject`]. Bytes are always persisted before the
/// object record that names them, so a reader that finds a record can open
/// its blob.
pub struct DeduplicationEngine {
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn ObjectCatalog>,
    ledger: Arc<dyn ReferenceLedger>,
    hasher: ContentHasher,
    locks: DigestLocks,
    stats: StatsAggregator,
    config: EngineConfig,
}

impl DeduplicationEngine {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn ObjectCatalog>,
        ledger: Arc<dyn ReferenceLedger>,
        config: EngineConfig,
    ) -> Self {
        Self {
            blobs,
            catalog,
            ledger,
            hasher: ContentHasher::new(config.chunk_size),
            locks: DigestLocks::new(),
            stats: StatsAggregator::new(config.stats_strategy),
            config,
        }
    }

    /// Engine over in-memory backends with the default configuration.
    pub fn in_memory() -> Self {
        Self::in_memory_with(EngineConfig::default())
    }

    pub fn in_memory_with(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryObjectCatalog::new()),
            Arc::new(InMemoryReferenceLedger::new()),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- Ingestion ----

    /// Ingest one upload.
    ///
    /// The content is read twice: once to hash it, and once more (after
    /// rewinding) to persist it when it turns out to be new.
    pub fn ingest<R: Read + Seek>(
        &self,
        content: &mut R,
        filename: &str,
        declared_type: &str,
    ) -> EngineResult<IngestResult> {
        let filename = validate_filename(filename)?;
        let declared_type = normalize_type(declared_type);

        let (digest, size) = self.hasher.digest_reader(content)?;
        debug!(digest = %digest.short_hex(), size, filename, "upload hashed");

        self.stats
            .ensure_baseline(self.catalog.as_ref(), self.ledger.as_ref())?;
        let _guard = self.locks.acquire(digest)?;
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            if let Some(result) = self.try_reference(&digest, filename)? {
                return Ok(result);
            }

            content.rewind()?;
            let location = self.persist(&digest, content)?;
            let candidate = StoredObject::new(digest, size, declared_type, filename);

            let outcome = match self.catalog.insert_if_absent(candidate) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.rollback_blob(&location);
                    return Err(err.into());
                }
            };

            if outcome.inserted {
                self.stats.record(
                    StatsDelta::NewObject { size },
                    self.catalog.as_ref(),
                    self.ledger.as_ref(),
                )?;
                info!(
                    digest = %digest.short_hex(),
                    size,
                    filename,
                    "stored new object"
                );
                return Ok(IngestResult::new_object(outcome.object, location.location));
            }

            // Another writer inserted first; this upload is a duplicate.
            warn!(digest = %digest.short_hex(), "lost insert race to another writer");
            if let Some(result) = self.try_reference(&digest, filename)? {
                return Ok(result);
            }

            // The winner's object vanished before the reference could land.
            if attempts > self.config.max_conflict_retries {
                warn!(digest = %digest.short_hex(), attempts, "giving up on contended digest");
                return Err(EngineError::ConflictRetryExhausted { digest, attempts });
            }
        }
    }

    /// Ingest an in-memory upload.
    pub fn ingest_bytes(
        &self,
        content: &[u8],
        filename: &str,
        declared_type: &str,
    ) -> EngineResult<IngestResult> {
        self.ingest(&mut Cursor::new(content), filename, declared_type)
    }

    /// Record a reference if `digest` is already catalogued.
    fn try_reference(&self, digest: &Digest, filename: &str) -> EngineResult<Option<IngestResult>> {
        let Some(existing) = self.catalog.find(digest)? else {
            return Ok(None);
        };

        let reference = Reference::new(*digest, filename);
        self.ledger.append(reference.clone())?;
        self.stats.record(
            StatsDelta::Reference {
                size: existing.size,
            },
            self.catalog.as_ref(),
            self.ledger.as_ref(),
        )?;
        info!(
            digest = %digest.short_hex(),
            reference = %reference.id,
            filename,
            saved = existing.size,
            "recorded duplicate upload"
        );
        Ok(Some(IngestResult::duplicate(existing, reference)))
    }

    fn persist(&self, digest: &Digest, content: &mut dyn Read) -> EngineResult<BlobLocation> {
        match self.blobs.put(digest, content) {
            Ok(location) => Ok(location),
            Err(StoreError::HashMismatch { computed, .. }) => Err(EngineError::IncompleteUpload {
                digest: *digest,
                reason: format!("content changed after hashing (now {})", computed.short_hex()),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort removal of a blob this ingestion created.
    fn rollback_blob(&self, location: &BlobLocation) {
        if !location.created {
            return;
        }
        match self.blobs.delete(&location.digest) {
            Ok(_) => debug!(digest = %location.digest.short_hex(), "rolled back blob"),
            Err(err) => warn!(
                digest = %location.digest.short_hex(),
                error = %err,
                "failed to roll back blob; garbage collection will reclaim it"
            ),
        }
    }

    // ---- Queries ----

    /// Current usage summary.
    pub fn storage_stats(&self) -> EngineResult<UsageSummary> {
        self.stats
            .refresh(self.catalog.as_ref(), self.ledger.as_ref())
    }

    /// Usage summary with derived percentages and MiB figures.
    pub fn stats_report(&self) -> EngineResult<StatsReport> {
        Ok(StatsReport::from(&self.storage_stats()?))
    }

    pub fn find_object(&self, digest: &Digest) -> EngineResult<ObjectView> {
        let object = self
            .catalog
            .find(digest)?
            .ok_or(EngineError::NotFound(*digest))?;
        let references = self.ledger.count_for(digest)?;
        Ok(ObjectView::new(object, references))
    }

    /// Every stored object, newest first.
    pub fn list_objects(&self) -> EngineResult<Vec<ObjectView>> {
        let counts = self.ledger.counts()?;
        Ok(self
            .catalog
            .list()?
            .into_iter()
            .map(|object| {
                let references = counts.get(&object.digest).copied().unwrap_or(0);
                ObjectView::new(object, references)
            })
            .collect())
    }

    /// The object under `digest` and every reference to it.
    pub fn list_references(&self, digest: &Digest) -> EngineResult<ReferenceListing> {
        let object = self
            .catalog
            .find(digest)?
            .ok_or(EngineError::NotFound(*digest))?;
        let references = self.ledger.list_for(digest)?;
        let total = references.len() as u64;
        Ok(ReferenceListing {
            original: ObjectView::new(object, total),
            references,
            total_references: total,
        })
    }

    /// Distinct declared media types across stored objects.
    pub fn declared_types(&self) -> EngineResult<BTreeSet<String>> {
        Ok(self.catalog.declared_types()?)
    }

    /// Open the stored bytes of a catalogued object.
    pub fn open_blob(&self, digest: &Digest) -> EngineResult<BlobReader> {
        if !self.catalog.contains(digest)? {
            return Err(EngineError::NotFound(*digest));
        }
        Ok(self.blobs.get(digest)?)
    }

    // ---- Maintenance ----

    /// Delete an object together with its references and blob.
    pub fn remove_object(&self, digest: &Digest) -> EngineResult<RemovalReport> {
        self.stats
            .ensure_baseline(self.catalog.as_ref(), self.ledger.as_ref())?;
        let _guard = self.locks.acquire(*digest)?;
        let size = self
            .catalog
            .find(digest)?
            .ok_or(EngineError::NotFound(*digest))?
            .size;

        let references = self.ledger.remove_for(digest)? as u64;
        let object = match self.catalog.remove(digest) {
            Ok(Some(object)) => object,
            outcome => {
                // The references are gone even though the object stays.
                self.stats.record(
                    StatsDelta::ReferencesRemoved { size, references },
                    self.catalog.as_ref(),
                    self.ledger.as_ref(),
                )?;
                return Err(match outcome {
                    Err(err) => err.into(),
                    _ => EngineError::NotFound(*digest),
                });
            }
        };
        self.stats.record(
            StatsDelta::Removed {
                size: object.size,
                references,
            },
            self.catalog.as_ref(),
            self.ledger.as_ref(),
        )?;

        // An undeleted blob is an orphan now; garbage collection reclaims it.
        let blob_deleted = self.blobs.delete(digest)?;
        if !blob_deleted {
            warn!(digest = %digest.short_hex(), "removed object had no blob");
        }
        info!(
            digest = %digest.short_hex(),
            references,
            size = object.size,
            "removed object"
        );
        Ok(RemovalReport {
            object,
            references_removed: references,
            blob_deleted,
        })
    }

    /// Delete blobs that no object record names.
    ///
    /// Such blobs are left behind by crashes between persisting bytes and
    /// recording the object, or by failed rollbacks.
    pub fn collect_garbage(&self) -> EngineResult<GcReport> {
        let candidates = self.blobs.list()?;
        let mut report = GcReport {
            scanned: candidates.len(),
            removed: Vec::new(),
        };

        for digest in candidates {
            // In-flight ingestions hold the lock between persist and insert.
            let _guard = self.locks.acquire(digest)?;
            if self.catalog.contains(&digest)? {
                continue;
            }
            if self.blobs.delete(&digest)? {
                debug!(digest = %digest.short_hex(), "collected orphan blob");
                report.removed.push(digest);
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed.len(),
            "garbage collection complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for DeduplicationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_filename(filename: &str) -> EngineResult<&str> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput("filename must not be empty".into()));
    }
    Ok(trimmed)
}

fn normalize_type(declared_type: &str) -> &str {
    match declared_type.trim() {
        "" => DEFAULT_MEDIA_TYPE,
        t => t,
    }
}
