//! Foundation types for Cask, a deduplicating content-addressed file store.
//!
//! Every other Cask crate depends on `cask-types`.
//!
//! # Key Types
//!
//! - [`Digest`] - Content-addressed identifier (BLAKE3-256 of the raw bytes)
//! - [`ReferenceId`] - UUID v7 identifier of a duplicate upload
//! - [`StoredObject`] - One physically stored blob and its first-arrival metadata
//! - [`Reference`] - One logical upload that resolved to an existing object
//! - [`UsageSummary`] - Process-wide deduplication accounting

pub mod digest;
pub mod error;
pub mod record;
pub mod reference;
pub mod summary;

pub use digest::Digest;
pub use error::TypeError;
pub use record::{Reference, StoredObject};
pub use reference::ReferenceId;
pub use summary::UsageSummary;
