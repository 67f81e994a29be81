use serde::{Deserialize, Serialize};

use cask_types::{Reference, StoredObject};

/// An object record together with its reference count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectView {
    #[serde(flatten)]
    pub object: StoredObject,
    /// Total uploads of this content: the original plus every reference.
    pub reference_count: u64,
    /// `true` once the content has been uploaded more than once.
    pub is_duplicate: bool,
}

impl ObjectView {
    pub fn new(object: StoredObject, references: u64) -> Self {
        Self {
            object,
            reference_count: references + 1,
            is_duplicate: references > 0,
        }
    }
}

/// One object and every reference to it, newest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceListing {
    pub original: ObjectView,
    pub references: Vec<Reference>,
    pub total_references: u64,
}
