/*!
 * Keyed Lock Registry
 *
 * Maps live keys to their lock entries and keeps entry lifetimes tied to
 * interest: an entry exists in the map iff at least one caller holds or waits
 * on it, and it is removed in the same bookkeeping step that drops its
 * reference count to zero.
 *
 * # Design: Two-Phase Acquire/Release
 *
 * All bookkeeping (lookup/insert/remove, refcount updates, disposal flag) is
 * serialized through one coarse mutex held only for O(1) steps. Blocking on a
 * key happens afterwards, on the entry itself, so contention on one key never
 * stalls bookkeeping for unrelated keys.
 *
 * Because bookkeeping is totally ordered, a release that drops the last
 * reference and removes the entry can interleave safely with a fresh acquire:
 * either the acquire lands first and queues on the surviving entry, or the
 * removal lands first and the acquire creates a distinct entry it takes
 * uncontended. The prior holder's protected work is already complete by then,
 * so per-key mutual exclusion is never violated.
 */

use crate::entry::LockEntry;
use crate::guard::{KeyGuard, OwnedKeyGuard};
use ahash::RandomState;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

/// Result type for acquire operations
pub type AcquireResult<T> = Result<T, DisposedError>;

/// Returned by acquire operations once the registry has been disposed
///
/// Disposal is the only caller-recoverable failure in this crate. Everything
/// else (releasing after disposal, double-dispose) is a deliberate no-op so
/// cleanup paths can run unconditionally.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("keyed mutex has been disposed; new acquisitions are rejected")]
pub struct DisposedError;

/// Bookkeeping state, everything behind the single coarse mutex
struct Registry<K> {
    entries: HashMap<K, Arc<LockEntry<K>>, RandomState>,
    disposed: bool,
}

/// Value-granularity mutual exclusion
///
/// Serializes critical sections per key while letting distinct keys proceed
/// concurrently. Entries are created lazily on first acquire and reclaimed
/// the instant the last guard for that key drops, so memory stays bounded by
/// the number of *currently interesting* keys, not ever-seen keys.
///
/// # Non-guarantees
///
/// - **No fairness**: same-key waiters are woken in whatever order the
///   underlying condvar picks.
/// - **Not re-entrant**: acquiring a key twice on one thread without dropping
///   the first guard deadlocks; the registry counts interested parties, it
///   does not track ownership identity.
///
/// # Examples
///
/// ```
/// use keymutex::KeyedMutex;
///
/// let locks = KeyedMutex::new();
/// {
///     let _guard = locks.acquire("user-42").unwrap();
///     // exclusive for "user-42"; other keys are unaffected
/// }
/// assert_eq!(locks.lock_count(), 0);
/// ```
pub struct KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    registry: parking_lot::Mutex<Registry<K>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    /// Create a new registry in the active state
    pub fn new() -> Self {
        Self {
            registry: parking_lot::Mutex::new(Registry {
                entries: HashMap::with_hasher(RandomState::new()),
                disposed: false,
            }),
        }
    }

    /// Block until this caller holds exclusive access for `key`.
    ///
    /// The returned guard releases the key when dropped, on every exit path
    /// including panic unwinding.
    ///
    /// # Errors
    ///
    /// Returns [`DisposedError`] if the registry has been disposed; no entry
    /// is created or touched in that case.
    pub fn acquire(&self, key: K) -> AcquireResult<KeyGuard<'_, K>> {
        let entry = self.checkout(key)?;
        // Outside the bookkeeping mutex: blocking here must not stall
        // bookkeeping for unrelated keys.
        entry.block_until_held();
        Ok(KeyGuard::new(self, entry))
    }

    /// Like [`acquire`](Self::acquire), but the guard keeps the registry
    /// alive via `Arc`, so it can be moved into spawned threads.
    pub fn acquire_owned(self: &Arc<Self>, key: K) -> AcquireResult<OwnedKeyGuard<K>> {
        let entry = self.checkout(key)?;
        entry.block_until_held();
        Ok(OwnedKeyGuard::new(Arc::clone(self), entry))
    }

    /// Non-blocking acquire.
    ///
    /// Returns `Ok(None)` if another caller currently holds `key`. The
    /// bookkeeping performed while probing is undone before returning, so a
    /// failed probe leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns [`DisposedError`] if the registry has been disposed.
    pub fn try_acquire(&self, key: K) -> AcquireResult<Option<KeyGuard<'_, K>>> {
        let entry = self.checkout(key)?;
        if entry.try_hold() {
            Ok(Some(KeyGuard::new(self, entry)))
        } else {
            // Never held the slot, so only the refcount needs unwinding.
            self.retire(&entry);
            Ok(None)
        }
    }

    /// Dispose the registry: reject all future acquisitions and forget the
    /// entry map. Idempotent.
    ///
    /// In-flight guards are *not* force-released; they keep their entries
    /// alive through the references captured at acquire time and clean up
    /// normally on drop.
    pub fn dispose(&self) {
        let mut registry = self.registry.lock();
        if registry.disposed {
            return;
        }
        registry.disposed = true;
        let cleared = registry.entries.len();
        registry.entries.clear();
        log::debug!("keyed mutex disposed, {cleared} live entries forgotten");
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.registry.lock().disposed
    }

    /// Number of distinct keys with at least one holder or waiter
    ///
    /// Always 0 once disposed: the map is cleared on disposal and new entries
    /// are rejected afterwards.
    pub fn lock_count(&self) -> usize {
        self.registry.lock().entries.len()
    }

    /// Bookkeeping half of acquire: get-or-create the entry for `key` and
    /// register interest, all under the bookkeeping mutex.
    ///
    /// The refcount increment here is what prevents a concurrent release from
    /// removing the entry before this caller starts blocking on it.
    fn checkout(&self, key: K) -> AcquireResult<Arc<LockEntry<K>>> {
        let mut registry = self.registry.lock();
        if registry.disposed {
            return Err(DisposedError);
        }
        let entry = registry
            .entries
            .entry(key)
            .or_insert_with_key(|k| {
                log::trace!("lock entry created");
                Arc::new(LockEntry::new(k.clone()))
            })
            .clone();
        entry.retain();
        Ok(entry)
    }

    /// Bookkeeping half of release: drop one reference and remove the entry
    /// if this was the last interested caller.
    ///
    /// The pointer-identity check makes stale releases silent no-ops: after
    /// disposal the key is unmapped, and a same-key successor entry created
    /// after removal must not be evicted by the old entry's release.
    pub(crate) fn retire(&self, entry: &Arc<LockEntry<K>>) {
        let mut registry = self.registry.lock();
        if entry.release_ref() == 0 {
            if let Some(current) = registry.entries.get(entry.key()) {
                if Arc::ptr_eq(current, entry) {
                    registry.entries.remove(entry.key());
                    log::trace!("lock entry retired ({} live keys)", registry.entries.len());
                }
            }
        }
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
