use serde::{Deserialize, Serialize};

use cask_types::{Digest, Reference, StoredObject};

/// What an ingestion did with the uploaded bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The content was new; its bytes were persisted at `location`.
    NewObject { location: String },
    /// The content was already stored; only `reference` was recorded.
    DuplicateReference { reference: Reference },
}

/// Result of a successful ingestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// The object the upload resolved to (the original for duplicates).
    pub object: StoredObject,
    pub outcome: IngestOutcome,
    pub is_duplicate: bool,
    /// Bytes not written because the content was already stored.
    pub bytes_saved_by_this_upload: u64,
    pub message: String,
}

impl IngestResult {
    pub(crate) fn new_object(object: StoredObject, location: String) -> Self {
        Self {
            object,
            outcome: IngestOutcome::NewObject { location },
            is_duplicate: false,
            bytes_saved_by_this_upload: 0,
            message: "stored new object".to_string(),
        }
    }

    pub(crate) fn duplicate(object: StoredObject, reference: Reference) -> Self {
        let message = format!(
            "duplicate content; linked to existing object {}",
            object.digest.short_hex()
        );
        Self {
            bytes_saved_by_this_upload: object.size,
            object,
            outcome: IngestOutcome::DuplicateReference { reference },
            is_duplicate: true,
            message,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.object.digest
    }

    /// The recorded reference, for duplicate uploads.
    pub fn reference(&self) -> Option<&Reference> {
        match &self.outcome {
            IngestOutcome::DuplicateReference { reference } => Some(reference),
            IngestOutcome::NewObject { .. } => None,
        }
    }
}

/// Result of removing one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub object: StoredObject,
    pub references_removed: u64,
    /// `false` if the blob was already missing.
    pub blob_deleted: bool,
}

impl RemovalReport {
    /// Logical bytes this removal took out of the accounting.
    pub fn logical_bytes_removed(&self) -> u64 {
        self.object.size * (self.references_removed + 1)
    }
}

/// Result of a garbage collection pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    /// Blobs examined.
    pub scanned: usize,
    /// Blobs deleted because no object record named them.
    pub removed: Vec<Digest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reports_saved_bytes() {
        let object = StoredObject::new(Digest::of(b"hello"), 5, "text/plain", "a.txt");
        let reference = Reference::new(object.digest, "b.txt");
        let result = IngestResult::duplicate(object.clone(), reference.clone());
        assert!(result.is_duplicate);
        assert_eq!(result.bytes_saved_by_this_upload, 5);
        assert_eq!(result.reference(), Some(&reference));
        assert_eq!(result.digest(), &object.digest);
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let object = StoredObject::new(Digest::of(b"x"), 1, "text/plain", "x");
        let result = IngestResult::new_object(object, "mem:abc".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["kind"], "new_object");
        assert_eq!(json["outcome"]["location"], "mem:abc");
        assert_eq!(json["bytes_saved_by_this_upload"], 0);
    }

    #[test]
    fn removal_counts_logical_bytes() {
        let report = RemovalReport {
            object: StoredObject::new(Digest::of(b"abc"), 3, "text/plain", "a"),
            references_removed: 2,
            blob_deleted: true,
        };
        assert_eq!(report.logical_bytes_removed(), 9);
    }
}
