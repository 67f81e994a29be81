//! Catalog records: one [`StoredObject`] per distinct digest, and one
//! [`Reference`] per later upload of the same content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::reference::ReferenceId;

/// One physically stored blob, recorded at its first arrival.
///
/// Exactly one `StoredObject` exists per distinct digest. It is never
/// mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Content hash; the object's identity.
    pub digest: Digest,
    /// Byte length of the hashed content.
    pub size: u64,
    /// Caller-supplied media type. Not checked against the content.
    pub declared_type: String,
    /// Name under which the content was first uploaded.
    pub first_filename: String,
    /// Time of first arrival.
    pub created_at: DateTime<Utc>,
}

impl StoredObject {
    /// Create a record stamped with the current time.
    pub fn new(
        digest: Digest,
        size: u64,
        declared_type: impl Into<String>,
        first_filename: impl Into<String>,
    ) -> Self {
        Self {
            digest,
            size,
            declared_type: declared_type.into(),
            first_filename: first_filename.into(),
            created_at: Utc::now(),
        }
    }
}

/// One logical upload that matched an already stored object.
///
/// A `Reference` is only created while its target exists, and never
/// outlives it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    /// Digest of the [`StoredObject`] this upload resolved to.
    pub target: Digest,
    /// Name under which the duplicate was submitted.
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    /// Create a reference with a fresh ID, stamped with the current time.
    pub fn new(target: Digest, filename: impl Into<String>) -> Self {
        Self {
            id: ReferenceId::new(),
            target,
            filename: filename.into(),
            created_at: Utc::now(),
        }
    }
}
