//! Deduplication accounting.
//!
//! The summary is a projection of the catalog: it can always be rebuilt
//! from the object records and reference counts alone. The aggregator owns
//! the only mutable copy and serialises every refresh behind one mutex, so
//! concurrent refreshes never lose an update and readers never see a
//! half-updated summary.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cask_catalog::{ObjectCatalog, ReferenceLedger};
use cask_types::UsageSummary;

use crate::config::StatsStrategy;
use crate::error::{EngineError, EngineResult};

/// Change to the totals caused by one engine write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsDelta {
    /// A new unique object of `size` bytes was stored.
    NewObject { size: u64 },
    /// A duplicate of an object of `size` bytes was recorded.
    Reference { size: u64 },
    /// An object of `size` bytes was removed along with `references`.
    Removed { size: u64, references: u64 },
    /// `references` duplicates of an object of `size` bytes were dropped
    /// but the object itself stayed.
    ReferencesRemoved { size: u64, references: u64 },
}

/// Rebuild the summary from the full catalog.
pub fn compute_summary(
    catalog: &dyn ObjectCatalog,
    ledger: &dyn ReferenceLedger,
) -> EngineResult<UsageSummary> {
    let objects = catalog.list()?;
    let counts = ledger.counts()?;

    let mut logical_uploads = 0u64;
    let mut logical_bytes = 0u64;
    let mut physical_bytes = 0u64;
    for object in &objects {
        let references = counts.get(&object.digest).copied().unwrap_or(0);
        logical_uploads += 1 + references;
        logical_bytes += object.size * (1 + references);
        physical_bytes += object.size;
    }

    Ok(UsageSummary::from_totals(
        logical_uploads,
        objects.len() as u64,
        logical_bytes,
        physical_bytes,
    ))
}

/// Owner of the process-wide [`UsageSummary`].
#[derive(Debug)]
pub struct StatsAggregator {
    strategy: StatsStrategy,
    summary: Mutex<Option<UsageSummary>>,
}

impl StatsAggregator {
    pub fn new(strategy: StatsStrategy) -> Self {
        Self {
            strategy,
            summary: Mutex::new(None),
        }
    }

    pub fn strategy(&self) -> StatsStrategy {
        self.strategy
    }

    /// Build the incremental baseline if there is none yet.
    ///
    /// Writers call this before touching the catalog. A baseline scanned
    /// while a write sits between its catalog change and its [`record`]
    /// would count that write twice.
    ///
    /// [`record`]: Self::record
    pub fn ensure_baseline(
        &self,
        catalog: &dyn ObjectCatalog,
        ledger: &dyn ReferenceLedger,
    ) -> EngineResult<()> {
        if self.strategy == StatsStrategy::Recompute {
            return Ok(());
        }
        let mut slot = self.lock()?;
        if slot.is_none() {
            let baseline = compute_summary(catalog, ledger)?;
            debug!(uploads = baseline.logical_uploads, "stats baseline built");
            *slot = Some(baseline);
        }
        Ok(())
    }

    /// Bring the summary up to date with the catalog and return it.
    ///
    /// Under [`StatsStrategy::Recompute`] this always rescans. Under
    /// [`StatsStrategy::Incremental`] it only scans to build the first
    /// baseline.
    pub fn refresh(
        &self,
        catalog: &dyn ObjectCatalog,
        ledger: &dyn ReferenceLedger,
    ) -> EngineResult<UsageSummary> {
        let mut slot = self.lock()?;
        if self.strategy == StatsStrategy::Incremental {
            if let Some(current) = slot.as_ref() {
                return Ok(current.clone());
            }
        }
        let fresh = compute_summary(catalog, ledger)?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Account for a write that has already been applied to the catalog.
    pub fn record(
        &self,
        delta: StatsDelta,
        catalog: &dyn ObjectCatalog,
        ledger: &dyn ReferenceLedger,
    ) -> EngineResult<UsageSummary> {
        if self.strategy == StatsStrategy::Recompute {
            return self.refresh(catalog, ledger);
        }

        let mut slot = self.lock()?;
        let summary = if let Some(current) = slot.as_mut() {
            apply(current, delta);
            current.clone()
        } else {
            // Only reachable for a writer that skipped `ensure_baseline`;
            // the scan already sees this write.
            let fresh = compute_summary(catalog, ledger)?;
            *slot = Some(fresh.clone());
            fresh
        };
        debug!(?delta, uploads = summary.logical_uploads, "stats updated");
        Ok(summary)
    }

    /// Last computed summary, without touching the catalog.
    pub fn cached(&self) -> EngineResult<Option<UsageSummary>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Option<UsageSummary>>> {
        self.summary
            .lock()
            .map_err(|_| EngineError::Poisoned("usage summary"))
    }
}

fn apply(summary: &mut UsageSummary, delta: StatsDelta) {
    match delta {
        StatsDelta::NewObject { size } => summary.record_new_object(size),
        StatsDelta::Reference { size } => summary.record_reference(size),
        StatsDelta::Removed { size, references } => summary.record_removal(size, references),
        StatsDelta::ReferencesRemoved { size, references } => {
            summary.record_reference_removal(size, references)
        }
    }
}

/// Presentation form of a [`UsageSummary`] with derived figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_uploads: u64,
    pub unique_objects: u64,
    pub logical_bytes: u64,
    pub physical_bytes: u64,
    pub bytes_saved: u64,
    pub saved_percentage: f64,
    pub logical_mb: f64,
    pub physical_mb: f64,
    pub saved_mb: f64,
    pub last_updated: DateTime<Utc>,
}

impl From<&UsageSummary> for StatsReport {
    fn from(summary: &UsageSummary) -> Self {
        Self {
            total_uploads: summary.logical_uploads,
            unique_objects: summary.unique_objects,
            logical_bytes: summary.logical_bytes,
            physical_bytes: summary.physical_bytes,
            bytes_saved: summary.bytes_saved,
            saved_percentage: summary.saved_percentage(),
            logical_mb: summary.logical_mb(),
            physical_mb: summary.physical_mb(),
            saved_mb: summary.saved_mb(),
            last_updated: summary.last_updated,
        }
    }
}
