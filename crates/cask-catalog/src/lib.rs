//! Object catalog and reference ledger for Cask.
//!
//! The catalog records one [`StoredObject`](cask_types::StoredObject) per
//! distinct digest; the ledger records every later upload of the same content
//! as a [`Reference`](cask_types::Reference). Together they are the logical
//! half of deduplication.
//!
//! # Architecture
//!
//! - [`ObjectCatalog::insert_if_absent`] is a single atomic check-and-insert.
//!   It is the primitive that makes concurrent identical uploads race-free;
//!   callers must never emulate it with `find` followed by an insert.
//! - References carry no uniqueness constraint. Any number may target one
//!   object, and they are listed newest first.
//! - The journaled backends persist every mutation to an append-only,
//!   CRC-framed journal *inside* the critical section that applies it, and
//!   rebuild the in-memory state by replaying the journal on open.
//!
//! # Modules
//!
//! - [`error`] - Error types for catalog operations
//! - [`traits`] - The [`ObjectCatalog`] and [`ReferenceLedger`] traits
//! - [`memory`] - In-memory backends for tests and embedding
//! - [`journal`] - The append-only catalog journal
//! - [`durable`] - Journaled backends built on [`memory`] and [`journal`]

pub mod durable;
pub mod error;
pub mod journal;
pub mod memory;
pub mod traits;

pub use durable::{open_journaled, JournaledCatalog, JournaledLedger};
pub use error::{CatalogError, CatalogResult};
pub use journal::{CatalogEvent, Journal, SyncMode};
pub use memory::{InMemoryObjectCatalog, InMemoryReferenceLedger};
pub use traits::{InsertOutcome, ObjectCatalog, ReferenceLedger};
