/*!
 * Keyed Mutual Exclusion
 *
 * Fine-grained, ephemeral locks partitioned by value: concurrent work on the
 * same key is serialized, concurrent work on different keys proceeds
 * unimpeded. Replaces both a single coarse lock (excessive contention) and a
 * permanent lock per ever-seen key (unbounded growth) — entries are created
 * on demand and reclaimed the moment the last interested caller lets go.
 *
 * # Architecture
 *
 * Two narrowly-scoped synchronization domains, kept syntactically separate:
 *
 * - The registry's **bookkeeping mutex** guards the key → entry map, the
 *   reference counts, and the disposal flag. Held only for short O(1) steps,
 *   never across a blocking wait.
 * - Each entry's **exclusion slot** (mutex + condvar) is where callers
 *   actually block. One slot per live key.
 *
 * # Guarantees
 *
 * - Per-key mutual exclusion; no spurious serialization across keys
 * - Release on all exit paths via RAII guards, including panic unwinding
 * - No fairness among same-key waiters (inherited from the condvar), no
 *   re-entrancy, no timeouts, no cross-process locking
 *
 * # Example
 *
 * ```
 * use keymutex::KeyedMutex;
 * use std::sync::Arc;
 * use std::thread;
 *
 * let locks = Arc::new(KeyedMutex::new());
 *
 * let handles: Vec<_> = (0..4u64)
 *     .map(|account| {
 *         let locks = locks.clone();
 *         thread::spawn(move || {
 *             let _guard = locks.acquire_owned(account).unwrap();
 *             // exclusive per account; the four accounts run concurrently
 *         })
 *     })
 *     .collect();
 *
 * for handle in handles {
 *     handle.join().unwrap();
 * }
 * assert_eq!(locks.lock_count(), 0);
 * ```
 */

mod entry;
mod guard;
mod registry;

pub use guard::{KeyGuard, OwnedKeyGuard};
pub use registry::{AcquireResult, DisposedError, KeyedMutex};
