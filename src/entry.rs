/*!
 * Per-Key Lock Entry
 *
 * The object a single key's callers contend on: an exclusion slot plus a
 * reference count of interested callers.
 *
 * # Design: Condvar Slot Over Nested Mutex
 *
 * The slot is a `held` flag behind a small parking_lot mutex with a condvar
 * for waiters. Compared to handing out guards of an inner `Mutex<()>`, this
 * keeps the entry freely shareable via `Arc` (no self-referential guards) and
 * lets release happen from whichever thread drops the guard.
 *
 * Wakeup order among same-key waiters follows `Condvar::notify_one`, which
 * makes no fairness promise. That is inherited behavior, not upgraded to FIFO.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-key lock entry: exclusion slot + reference count
///
/// # Invariants
///
/// - `refs` is only mutated while the owning registry's bookkeeping mutex is
///   held; it equals the number of callers currently holding or waiting.
/// - The slot (`held` + `released`) is touched only *outside* the bookkeeping
///   mutex, so blocking on one key never stalls bookkeeping for others.
pub(crate) struct LockEntry<K> {
    /// The key this entry synchronizes (diagnostics only; comparisons are
    /// delegated to the registry map)
    key: K,
    /// Interested callers (holders + waiters), guarded by the registry's
    /// bookkeeping mutex
    refs: AtomicUsize,
    /// Exclusion slot: true while some caller holds the key
    held: Mutex<bool>,
    /// Signaled each time the slot is released
    released: Condvar,
}

impl<K> LockEntry<K> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            refs: AtomicUsize::new(0),
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Register one more interested caller; returns the new count.
    ///
    /// Caller must hold the registry's bookkeeping mutex.
    #[inline]
    pub(crate) fn retain(&self) -> usize {
        self.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop one interested caller; returns the new count.
    ///
    /// Caller must hold the registry's bookkeeping mutex.
    #[inline]
    pub(crate) fn release_ref(&self) -> usize {
        self.refs.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Block until this caller holds the slot exclusively.
    ///
    /// The loop re-checks `held` after every wakeup, so spurious or stolen
    /// wakeups are harmless.
    pub(crate) fn block_until_held(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    /// Take the slot only if it is free right now.
    pub(crate) fn try_hold(&self) -> bool {
        let mut held = self.held.lock();
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    /// Free the slot and wake one waiter, if any.
    pub(crate) fn release_slot(&self) {
        let mut held = self.held.lock();
        *held = false;
        drop(held);
        self.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_slot_hold_release() {
        let entry = LockEntry::new("k");
        entry.block_until_held();
        assert!(!entry.try_hold());
        entry.release_slot();
        assert!(entry.try_hold());
    }

    #[test]
    fn test_slot_blocks_second_holder() {
        let entry = Arc::new(LockEntry::new(7u64));
        entry.block_until_held();

        let entry_clone = entry.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            entry_clone.block_until_held();
            let waited = start.elapsed();
            entry_clone.release_slot();
            waited
        });

        thread::sleep(Duration::from_millis(50));
        entry.release_slot();

        let waited = handle.join().unwrap();
        assert!(waited >= Duration::from_millis(40));
    }

    #[test]
    fn test_ref_counting() {
        let entry = LockEntry::new(());
        assert_eq!(entry.retain(), 1);
        assert_eq!(entry.retain(), 2);
        assert_eq!(entry.release_ref(), 1);
        assert_eq!(entry.release_ref(), 0);
    }
}
