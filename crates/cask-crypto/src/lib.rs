//! Content hashing for Cask.
//!
//! Digests are plain BLAKE3-256 over the raw content. Hashing is streaming:
//! inputs of any size are consumed in fixed-size chunks, and the result is
//! independent of where the chunk boundaries fall.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HashingWriter, DEFAULT_CHUNK_SIZE};
