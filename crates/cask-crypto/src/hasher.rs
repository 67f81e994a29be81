use std::io::{self, Read, Write};

use cask_types::Digest;

/// Default read size for streaming digests (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 content hasher.
///
/// Holds no state between invocations; each call hashes one input from
/// start to end. Memory use is bounded by the chunk size regardless of the
/// input length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl ContentHasher {
    /// Hasher reading [`DEFAULT_CHUNK_SIZE`] bytes at a time.
    pub const DEFAULT: Self = Self {
        chunk_size: DEFAULT_CHUNK_SIZE,
    };

    /// Create a hasher with a custom read size. Zero is treated as one.
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 { 1 } else { chunk_size },
        }
    }

    /// The read size used by [`digest_reader`](Self::digest_reader).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash an in-memory buffer.
    pub fn digest_bytes(data: &[u8]) -> Digest {
        Digest::of(data)
    }

    /// Consume `reader` to the end and return its digest and byte count.
    ///
    /// The reader is left exhausted. Interrupted reads are retried; any
    /// other read error is returned unchanged.
    pub fn digest_reader<R: Read + ?Sized>(&self, reader: &mut R) -> io::Result<(Digest, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((Digest::from_hash(*hasher.finalize().as_bytes()), total))
    }

    /// Verify that `data` hashes to `expected`.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::digest_bytes(data) == *expected
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `Write` adapter that hashes and counts everything passing through it.
///
/// Used by blob stores to verify content while persisting it, without a
/// second read pass.
pub struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            written: 0,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Digest of everything written so far.
    pub fn digest(&self) -> Digest {
        Digest::from_hash(*self.hasher.finalize().as_bytes())
    }

    /// Finish and return the inner writer, the digest and the byte count.
    pub fn finish(self) -> (W, Digest, u64) {
        let digest = self.digest();
        (self.inner, digest, self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Reader that fails after yielding `ok_bytes` bytes.
    struct FailingReader {
        ok_bytes: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok_bytes == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream reset"));
            }
            let n = buf.len().min(self.ok_bytes);
            buf[..n].fill(7);
            self.ok_bytes -= n;
            Ok(n)
        }
    }

    /// Reader that reports `Interrupted` before every real read.
    struct InterruptingReader {
        inner: Cursor<Vec<u8>>,
        interrupt_next: bool,
    }

    impl Read for InterruptingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            self.inner.read(buf)
        }
    }

    #[test]
    fn reader_digest_matches_bytes_digest() {
        let data = b"hello world";
        let (digest, size) = ContentHasher::DEFAULT
            .digest_reader(&mut Cursor::new(data))
            .unwrap();
        assert_eq!(digest, ContentHasher::digest_bytes(data));
        assert_eq!(size, 11);
    }

    #[test]
    fn empty_input() {
        let (digest, size) = ContentHasher::DEFAULT
            .digest_reader(&mut io::empty())
            .unwrap();
        assert_eq!(size, 0);
        assert_eq!(digest, Digest::of(b""));
    }

    #[test]
    fn reader_is_exhausted() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        ContentHasher::new(2).digest_reader(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn read_errors_propagate_unchanged() {
        let err = ContentHasher::new(4)
            .digest_reader(&mut FailingReader { ok_bytes: 10 })
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut reader = InterruptingReader {
            inner: Cursor::new(b"interrupted content".to_vec()),
            interrupt_next: true,
        };
        let (digest, size) = ContentHasher::new(3).digest_reader(&mut reader).unwrap();
        assert_eq!(digest, Digest::of(b"interrupted content"));
        assert_eq!(size, 19);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(ContentHasher::new(0).chunk_size(), 1);
    }

    #[test]
    fn verify_detects_tampering() {
        let digest = ContentHasher::digest_bytes(b"original");
        assert!(ContentHasher::verify(b"original", &digest));
        assert!(!ContentHasher::verify(b"tampered", &digest));
    }

    #[test]
    fn hashing_writer_tracks_content() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        let (inner, digest, written) = writer.finish();
        assert_eq!(inner, b"hello world");
        assert_eq!(digest, Digest::of(b"hello world"));
        assert_eq!(written, 11);
    }

    proptest! {
        #[test]
        fn digest_is_independent_of_chunk_size(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..1024,
        ) {
            let (digest, size) = ContentHasher::new(chunk)
                .digest_reader(&mut Cursor::new(&data))
                .unwrap();
            prop_assert_eq!(digest, ContentHasher::digest_bytes(&data));
            prop_assert_eq!(size, data.len() as u64);
        }
    }
}
