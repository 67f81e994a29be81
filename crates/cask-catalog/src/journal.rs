//! Append-only catalog journal.
//!
//! Every catalog and ledger mutation is recorded as one [`CatalogEvent`].
//! Replaying the journal front to back rebuilds the catalog.
//!
//! On-disk entry format:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized CatalogEvent)]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cask_types::{Digest, Reference, StoredObject};

use crate::error::{CatalogError, CatalogResult};

/// One recorded catalog mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEvent {
    /// A new object entered the catalog.
    ObjectStored(StoredObject),
    /// A duplicate upload was recorded against an existing object.
    ReferenceAppended(Reference),
    /// Every reference to `digest` was deleted.
    ReferencesRemoved { digest: Digest },
    /// The object under `digest` was deleted.
    ObjectRemoved { digest: Digest },
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Flush to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    /// Current end of the journal file.
    offset: u64,
}

/// Crash-recoverable append-only journal.
///
/// Entries that fail the CRC check are skipped on recovery; a truncated
/// tail (torn write from a crash) ends recovery.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) a journal file at `path`.
    ///
    /// A torn tail left by a crash is cut off here, so new entries always
    /// follow the last complete one.
    pub fn open(path: &Path, sync_mode: SyncMode) -> CatalogResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let (_, valid_len) = scan(path)?;
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
            }),
            sync_mode,
        })
    }

    /// Append one event. Returns the byte offset of the entry.
    pub fn append(&self, event: &CatalogEvent) -> CatalogResult<u64> {
        let payload =
            bincode::serialize(event).map_err(|e| CatalogError::Serialization(e.to_string()))?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self
            .writer
            .lock()
            .map_err(|_| CatalogError::Poisoned("journal writer"))?;
        let entry_offset = w.offset;

        if let Err(e) = write_entry(&mut w, length, crc, &payload, self.sync_mode) {
            warn!(offset = entry_offset, error = %e, "journal append failed; discarding partial entry");
            if let Err(undo) = discard_from(&mut w, entry_offset) {
                warn!(offset = entry_offset, error = %undo, "could not truncate journal");
            }
            return Err(e.into());
        }

        w.offset += HEADER_SIZE as u64 + payload.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Read back every valid event in append order.
    pub fn recover(&self) -> CatalogResult<Vec<CatalogEvent>> {
        let (events, _) = scan(&self.path)?;
        debug!(recovered = events.len(), "journal recovery complete");
        Ok(events)
    }

    /// Current end offset of the journal.
    pub fn offset(&self) -> CatalogResult<u64> {
        Ok(self
            .writer
            .lock()
            .map_err(|_| CatalogError::Poisoned("journal writer"))?
            .offset)
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_entry(
    w: &mut JournalWriter,
    length: u32,
    crc: u32,
    payload: &[u8],
    sync_mode: SyncMode,
) -> io::Result<()> {
    w.writer.write_all(&length.to_le_bytes())?;
    w.writer.write_all(&crc.to_le_bytes())?;
    w.writer.write_all(payload)?;
    w.writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        w.writer.get_ref().sync_all()?;
    }
    Ok(())
}

/// Drop buffered bytes and cut the file back to `offset`.
fn discard_from(w: &mut JournalWriter, offset: u64) -> io::Result<()> {
    let file = w.writer.get_ref().try_clone()?;
    let stale = std::mem::replace(&mut w.writer, BufWriter::new(file));
    // `into_parts` hands back the file without flushing the stale buffer.
    let (_, _unflushed) = stale.into_parts();
    w.writer.get_ref().set_len(offset)?;
    w.offset = offset;
    Ok(())
}

/// Decode every complete entry in the file at `path`.
///
/// Returns the events and the length of the valid prefix: the end of the
/// last fully framed entry. CRC failures inside that prefix are skipped.
fn scan(path: &Path) -> CatalogResult<(Vec<CatalogEvent>, u64)> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "torn journal entry; stopping recovery");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        let entry_offset = offset;
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset = entry_offset,
                expected = expected_crc,
                actual = actual_crc,
                "journal CRC mismatch; skipping entry"
            );
            continue;
        }

        match bincode::deserialize::<CatalogEvent>(&payload) {
            Ok(event) => events.push(event),
            Err(e) => warn!(offset = entry_offset, error = %e, "undecodable journal entry; skipping"),
        }
    }

    Ok((events, offset))
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
