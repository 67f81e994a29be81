//! Per-digest mutual exclusion.
//!
//! Every check-and-act on one digest (store-or-reference, removal, garbage
//! collection) runs while holding that digest's lock. Different digests
//! never contend.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use cask_types::Digest;

use crate::error::{EngineError, EngineResult};

/// Table of currently held digest locks.
#[derive(Debug, Default)]
pub struct DigestLocks {
    held: Mutex<HashSet<Digest>>,
    released: Condvar,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `digest` is free, then hold it until the guard drops.
    pub fn acquire(&self, digest: Digest) -> EngineResult<DigestGuard<'_>> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| EngineError::Poisoned("digest locks"))?;
        while held.contains(&digest) {
            held = self
                .released
                .wait(held)
                .map_err(|_| EngineError::Poisoned("digest locks"))?;
        }
        held.insert(digest);
        Ok(DigestGuard {
            locks: self,
            digest,
        })
    }

    /// Number of digests currently locked.
    pub fn held_count(&self) -> usize {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Holds one digest lock; releases it on drop.
#[derive(Debug)]
pub struct DigestGuard<'a> {
    locks: &'a DigestLocks,
    digest: Digest,
}

impl DigestGuard<'_> {
    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.digest);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let locks = DigestLocks::new();
        let digest = Digest::of(b"a");
        {
            let guard = locks.acquire(digest).unwrap();
            assert_eq!(guard.digest(), &digest);
            assert_eq!(locks.held_count(), 1);
        }
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn different_digests_do_not_contend() {
        let locks = DigestLocks::new();
        let _a = locks.acquire(Digest::of(b"a")).unwrap();
        let _b = locks.acquire(Digest::of(b"b")).unwrap();
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn same_digest_is_exclusive() {
        let locks = Arc::new(DigestLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire(Digest::of(b"shared")).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held_count(), 0);
    }
}
