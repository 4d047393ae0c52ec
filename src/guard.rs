/*!
 * RAII Key Guards
 *
 * A guard is proof of exclusive access for one key. Dropping it performs the
 * two-phase release: bookkeeping first (decrement interest, remove the entry
 * if this was the last caller), then the slot is freed and the next waiter,
 * if any, is woken. Release runs on every exit path, including panic
 * unwinding, so callers never pair acquire/release by hand.
 */

use crate::entry::LockEntry;
use crate::registry::KeyedMutex;
use std::hash::Hash;
use std::sync::Arc;

/// Exclusive hold on one key, borrowed from a [`KeyedMutex`]
///
/// Released on drop. See [`KeyedMutex::acquire`].
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedMutex<K>,
    entry: Arc<LockEntry<K>>,
}

impl<'a, K> KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(owner: &'a KeyedMutex<K>, entry: Arc<LockEntry<K>>) -> Self {
        Self { owner, entry }
    }

    /// The key this guard holds
    #[inline]
    pub fn key(&self) -> &K {
        self.entry.key()
    }
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // Bookkeeping strictly before the wakeup: the next waiter must find
        // the refcount it registered still accounted for.
        self.owner.retire(&self.entry);
        self.entry.release_slot();
    }
}

/// Exclusive hold on one key, keeping the [`KeyedMutex`] alive via `Arc`
///
/// Released on drop. See [`KeyedMutex::acquire_owned`].
pub struct OwnedKeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    owner: Arc<KeyedMutex<K>>,
    entry: Arc<LockEntry<K>>,
}

impl<K> OwnedKeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(owner: Arc<KeyedMutex<K>>, entry: Arc<LockEntry<K>>) -> Self {
        Self { owner, entry }
    }

    /// The key this guard holds
    #[inline]
    pub fn key(&self) -> &K {
        self.entry.key()
    }
}

impl<K> Drop for OwnedKeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.owner.retire(&self.entry);
        self.entry.release_slot();
    }
}

#[cfg(test)]
mod tests {
    use crate::KeyedMutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_exposes_key() {
        let locks = KeyedMutex::new();
        let guard = locks.acquire(String::from("resource-7")).unwrap();
        assert_eq!(guard.key(), "resource-7");
    }

    #[test]
    fn test_owned_guard_moves_across_threads() {
        let locks = Arc::new(KeyedMutex::new());
        let guard = locks.acquire_owned(3u8).unwrap();

        // Release from a different thread than the one that acquired
        let handle = thread::spawn(move || drop(guard));
        handle.join().unwrap();

        assert_eq!(locks.lock_count(), 0);
        drop(locks.acquire(3u8).unwrap());
    }
}
