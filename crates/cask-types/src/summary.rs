use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MIB: f64 = 1024.0 * 1024.0;

/// Process-wide deduplication accounting.
///
/// Totals are defined over the catalog:
///
/// - `logical_uploads` = objects + references
/// - `unique_objects` = objects
/// - `logical_bytes` = Σ `size × (1 + references to it)`
/// - `physical_bytes` = Σ `size`
/// - `bytes_saved` = `logical_bytes − physical_bytes`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub logical_uploads: u64,
    pub unique_objects: u64,
    pub logical_bytes: u64,
    pub physical_bytes: u64,
    pub bytes_saved: u64,
    pub last_updated: DateTime<Utc>,
}

impl UsageSummary {
    /// The zero baseline for an empty catalog.
    pub fn empty() -> Self {
        Self {
            logical_uploads: 0,
            unique_objects: 0,
            logical_bytes: 0,
            physical_bytes: 0,
            bytes_saved: 0,
            last_updated: Utc::now(),
        }
    }

    /// Build a summary from raw totals, deriving `bytes_saved`.
    pub fn from_totals(
        logical_uploads: u64,
        unique_objects: u64,
        logical_bytes: u64,
        physical_bytes: u64,
    ) -> Self {
        Self {
            logical_uploads,
            unique_objects,
            logical_bytes,
            physical_bytes,
            bytes_saved: logical_bytes.saturating_sub(physical_bytes),
            last_updated: Utc::now(),
        }
    }

    /// Account for a newly stored object of `size` bytes.
    pub fn record_new_object(&mut self, size: u64) {
        self.logical_uploads += 1;
        self.unique_objects += 1;
        self.logical_bytes += size;
        self.physical_bytes += size;
        self.last_updated = Utc::now();
    }

    /// Account for a duplicate upload of an object of `size` bytes.
    pub fn record_reference(&mut self, size: u64) {
        self.logical_uploads += 1;
        self.logical_bytes += size;
        self.bytes_saved += size;
        self.last_updated = Utc::now();
    }

    /// Account for removing an object of `size` bytes and its `references`.
    pub fn record_removal(&mut self, size: u64, references: u64) {
        let logical = size * (references + 1);
        self.logical_uploads = self.logical_uploads.saturating_sub(references + 1);
        self.unique_objects = self.unique_objects.saturating_sub(1);
        self.logical_bytes = self.logical_bytes.saturating_sub(logical);
        self.physical_bytes = self.physical_bytes.saturating_sub(size);
        self.bytes_saved = self.logical_bytes.saturating_sub(self.physical_bytes);
        self.last_updated = Utc::now();
    }

    /// Account for dropping `references` duplicates of an object of `size`
    /// bytes while the object itself stays.
    pub fn record_reference_removal(&mut self, size: u64, references: u64) {
        self.logical_uploads = self.logical_uploads.saturating_sub(references);
        self.logical_bytes = self.logical_bytes.saturating_sub(size * references);
        self.bytes_saved = self.logical_bytes.saturating_sub(self.physical_bytes);
        self.last_updated = Utc::now();
    }

    /// Share of logical bytes that deduplication avoided storing, in
    /// percent rounded to two decimals. `0` for an empty catalog.
    pub fn saved_percentage(&self) -> f64 {
        if self.logical_bytes == 0 {
            return 0.0;
        }
        round2(self.bytes_saved as f64 / self.logical_bytes as f64 * 100.0)
    }

    /// Logical bytes in MiB, rounded to two decimals.
    pub fn logical_mb(&self) -> f64 {
        round2(self.logical_bytes as f64 / MIB)
    }

    /// Physical bytes in MiB, rounded to two decimals.
    pub fn physical_mb(&self) -> f64 {
        round2(self.physical_bytes as f64 / MIB)
    }

    /// Saved bytes in MiB, rounded to two decimals.
    pub fn saved_mb(&self) -> f64 {
        round2(self.bytes_saved as f64 / MIB)
    }

    /// Same totals, ignoring `last_updated`.
    pub fn same_totals(&self, other: &Self) -> bool {
        self.logical_uploads == other.logical_uploads
            && self.unique_objects == other.unique_objects
            && self.logical_bytes == other.logical_bytes
            && self.physical_bytes == other.physical_bytes
            && self.bytes_saved == other.bytes_saved
    }
}

impl Default for UsageSummary {
    fn default() -> Self {
        Self::empty()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
