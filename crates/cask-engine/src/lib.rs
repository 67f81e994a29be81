//! Deduplication engine for Cask.
//!
//! [`DeduplicationEngine`] turns uploads into either a new
//! [`StoredObject`](cask_types::StoredObject) or a
//! [`Reference`](cask_types::Reference) to an existing one, and keeps the
//! [`UsageSummary`](cask_types::UsageSummary) consistent with the catalog.
//!
//! # Concurrency
//!
//! Every decision about one digest runs under that digest's lock
//! ([`DigestLocks`]). Combined with the catalog's atomic
//! `insert_if_absent`, concurrent identical uploads persist exactly one
//! blob and one object record; all others become references. Uploads of
//! different content proceed in parallel.
//!
//! # Modules
//!
//! - [`engine`] - The [`DeduplicationEngine`] facade
//! - [`stats`] - Usage accounting ([`StatsAggregator`])
//! - [`locks`] - Per-digest locking
//! - [`outcome`] / [`view`] - Result and query types
//! - [`config`] / [`error`] - Configuration and errors

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod outcome;
pub mod stats;
pub mod view;

pub use config::{EngineConfig, StatsStrategy};
pub use engine::{DeduplicationEngine, DEFAULT_MEDIA_TYPE};
pub use error::{EngineError, EngineResult};
pub use locks::{DigestGuard, DigestLocks};
pub use outcome::{GcReport, IngestOutcome, IngestResult, RemovalReport};
pub use stats::{compute_summary, StatsAggregator, StatsDelta, StatsReport};
pub use view::{ObjectView, ReferenceListing};
