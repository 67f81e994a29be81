use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use cask_crypto::HashingWriter;
use cask_types::Digest;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobLocation, BlobReader, BlobStore};

/// Filesystem blob store.
///
/// Blobs live in a two-level sharded tree under the root:
///
/// ```text
/// <root>/
///   <first 2 hex chars>/
///     <next 2 hex chars>/
///       <remaining 60 hex chars>
/// ```
///
/// Writes stream into a temporary file inside the root and are renamed into
/// place only after the content has been verified against the digest, so a
/// crash or a failed upload never leaves a partial blob at a digest path.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    fsync: bool,
}

impl FsBlobStore {
    /// Open (or create) a blob store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, fsync: false })
    }

    /// `fsync` each blob before it is renamed into place.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where the blob for `digest` is (or would be) stored.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..4]).join(&hex[4..])
    }

    fn location(&self, digest: &Digest, size: u64, created: bool) -> BlobLocation {
        BlobLocation {
            digest: *digest,
            size,
            location: self.blob_path(digest).display().to_string(),
            created,
        }
    }

    /// Rebuild a digest from a path inside the shard tree.
    fn digest_from_path(&self, path: &Path) -> Option<Digest> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let hex: String = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Digest::from_hex(&hex).ok()
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, digest: &Digest, reader: &mut dyn Read) -> StoreResult<BlobLocation> {
        let path = self.blob_path(digest);
        if let Ok(meta) = fs::metadata(&path) {
            return Ok(self.location(digest, meta.len(), false));
        }

        let tmp = NamedTempFile::new_in(&self.root)?;
        let mut writer = HashingWriter::new(BufWriter::new(tmp));
        io::copy(reader, &mut writer)?;
        writer.flush()?;
        let (buffered, computed, size) = writer.finish();
        let tmp = buffered.into_inner().map_err(|e| e.into_error())?;

        if computed != *digest {
            // Dropping `tmp` removes the temporary file.
            return Err(StoreError::HashMismatch {
                expected: *digest,
                computed,
            });
        }
        if self.fsync {
            tmp.as_file().sync_all()?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(digest = %digest.short_hex(), size, "blob persisted");
        Ok(self.location(digest, size, true))
    }

    fn get(&self, digest: &Digest) -> StoreResult<BlobReader> {
        match File::open(self.blob_path(digest)) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(*digest)),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        Ok(self.blob_path(digest).is_file())
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        match fs::remove_file(self.blob_path(digest)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<Digest>> {
        let mut digests = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            match self.digest_from_path(entry.path()) {
                Some(digest) => digests.push(digest),
                None => warn!(path = %entry.path().display(), "skipping foreign file in blob store"),
            }
        }
        digests.sort();
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn temp_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    fn put_bytes(store: &FsBlobStore, data: &[u8]) -> BlobLocation {
        store.put(&Digest::of(data), &mut Cursor::new(data)).unwrap()
    }

    #[test]
    fn put_and_get() {
        let (_dir, store) = temp_store();
        let loc = put_bytes(&store, b"hello world");
        assert!(loc.created);
        assert_eq!(loc.size, 11);
        assert_eq!(store.read_to_vec(&loc.digest).unwrap(), b"hello world");
    }

    #[test]
    fn blobs_are_sharded() {
        let (_dir, store) = temp_store();
        let loc = put_bytes(&store, b"sharded");
        let hex = loc.digest.to_hex();
        let expected = store.root().join(&hex[..2]).join(&hex[2..4]).join(&hex[4..]);
        assert_eq!(store.blob_path(&loc.digest), expected);
        assert!(expected.is_file());
        assert_eq!(loc.location, expected.display().to_string());
    }

    #[test]
    fn put_is_idempotent() {
        let (_dir, store) = temp_store();
        put_bytes(&store, b"same");
        let second = put_bytes(&store, b"same");
        assert!(!second.created);
        assert_eq!(second.size, 4);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn mismatch_leaves_nothing_behind() {
        let (_dir, store) = temp_store();
        let digest = Digest::of(b"expected");
        let err = store
            .put(&digest, &mut Cursor::new(b"changed underneath"))
            .unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(!store.exists(&digest).unwrap());
        // No stray temporary files either.
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[test]
    fn empty_blob_is_storable() {
        let (_dir, store) = temp_store();
        let loc = put_bytes(&store, b"");
        assert_eq!(loc.size, 0);
        assert!(store.read_to_vec(&loc.digest).unwrap().is_empty());
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.get(&Digest::of(b"missing")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_and_list() {
        let (_dir, store) = temp_store();
        let a = put_bytes(&store, b"aaa");
        let b = put_bytes(&store, b"bbb");
        let mut expected = vec![a.digest, b.digest];
        expected.sort();
        assert_eq!(store.list().unwrap(), expected);

        assert!(store.delete(&a.digest).unwrap());
        assert!(!store.delete(&a.digest).unwrap());
        assert_eq!(store.list().unwrap(), vec![b.digest]);
    }

    #[test]
    fn list_skips_foreign_files() {
        let (_dir, store) = temp_store();
        put_bytes(&store, b"real");
        let junk = store.root().join("zz").join("yy");
        fs::create_dir_all(&junk).unwrap();
        fs::write(junk.join("not-a-digest"), b"junk").unwrap();
        assert_eq!(store.list().unwrap(), vec![Digest::of(b"real")]);
    }

    #[test]
    fn fsync_mode_writes_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap().with_fsync(true);
        let loc = put_bytes(&store, b"durable");
        assert!(store.exists(&loc.digest).unwrap());
    }
}
