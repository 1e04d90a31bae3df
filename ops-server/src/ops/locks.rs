//! Per-key serialization points
//!
//! Operations on the same key (animal type, product) run one at a time;
//! operations on different keys never wait for each other. A caller that
//! cannot take all of its keys within the timeout gets
//! [`OpsError::Conflict`] and nothing has been changed.
//!
//! Multi-key acquisition is all-or-nothing: a guard holds either every
//! requested key or none, so two callers asking for overlapping key sets
//! in different orders cannot deadlock.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::{OpsError, OpsResult};

struct LockTable<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

/// Named set of per-key locks
pub struct KeyedLocks<K> {
    name: &'static str,
    table: Arc<LockTable<K>>,
}

impl<K> KeyedLocks<K>
where
    K: Copy + Eq + Hash + Ord + Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: Arc::new(LockTable {
                held: Mutex::new(HashSet::new()),
                released: Condvar::new(),
            }),
        }
    }

    pub fn acquire(&self, key: K, timeout: Duration) -> OpsResult<KeyGuard<K>> {
        self.acquire_many([key], timeout)
    }

    /// Take every key or none; waits at most `timeout`
    pub fn acquire_many(
        &self,
        keys: impl IntoIterator<Item = K>,
        timeout: Duration,
    ) -> OpsResult<KeyGuard<K>> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + timeout;
        let mut held = self.table.held.lock();
        while keys.iter().any(|k| held.contains(k)) {
            if self.table.released.wait_until(&mut held, deadline).timed_out()
                && keys.iter().any(|k| held.contains(k))
            {
                tracing::debug!(lock = self.name, keys = ?keys, "Lock wait timed out");
                return Err(OpsError::Conflict(format!(
                    "{} {:?} is busy, retry later",
                    self.name, keys
                )));
            }
        }
        held.extend(keys.iter().copied());

        Ok(KeyGuard {
            table: self.table.clone(),
            keys,
        })
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.table.held.lock().len()
    }
}

/// Releases its keys on drop
pub struct KeyGuard<K: Eq + Hash> {
    table: Arc<LockTable<K>>,
    keys: Vec<K>,
}

impl<K: Eq + Hash> KeyGuard<K> {
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        let mut held = self.table.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.table.released.notify_all();
    }
}
