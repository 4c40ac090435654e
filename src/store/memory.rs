// * In-memory counter store for tests and dry runs
// * HyperLogLogs are modelled as exact sets, which is the no-false-positive limit

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::store::{CounterStore, StoreError, StoreFuture};

#[derive(Debug, Default)]
struct State {
    zsets: HashMap<String, HashMap<String, f64>>,
    sets: HashMap<String, HashSet<String>>,
    ttls: HashMap<String, u64>,
    failing_keys: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    state: Mutex<State>,
    fail_set_ops: AtomicBool,
    pings: AtomicUsize,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every `zincrby` on `key` fail
    pub fn fail_writes_to(&self, key: &str) {
        self.state().failing_keys.insert(key.to_string());
    }

    /// Makes every `pfadd_with_ttl` fail while set
    pub fn set_fail_set_ops(&self, fail: bool) {
        self.fail_set_ops.store(fail, Ordering::Relaxed);
    }

    pub fn score(&self, key: &str, member: &str) -> Option<f64> {
        self.state().zsets.get(key)?.get(member).copied()
    }

    /// Sorted names of every ranked counter written so far
    pub fn counter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state().zsets.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn set_cardinality(&self, key: &str) -> usize {
        self.state().sets.get(key).map_or(0, HashSet::len)
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.state().ttls.get(key).copied()
    }

    /// Drops a visitor set as if its TTL had run out
    pub fn expire_set(&self, key: &str) {
        let mut state = self.state();
        state.sets.remove(key);
        state.ttls.remove(key);
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn zincrby<'a>(&'a self, key: &'a str, by: i64, member: &'a str) -> StoreFuture<'a, f64> {
        Box::pin(async move {
            let mut state = self.state();
            if state.failing_keys.contains(key) {
                return Err(StoreError::Unavailable(format!("write to {} rejected", key)));
            }
            let score = state
                .zsets
                .entry(key.to_string())
                .or_default()
                .entry(member.to_string())
                .or_insert(0.0);
            *score += by as f64;
            Ok(*score)
        })
    }

    fn pfadd_with_ttl<'a>(
        &'a self,
        key: &'a str,
        element: &'a str,
        ttl_secs: u64,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            if self.fail_set_ops.load(Ordering::Relaxed) {
                return Err(StoreError::Unavailable("set store unreachable".to_string()));
            }
            let mut state = self.state();
            let added = state
                .sets
                .entry(key.to_string())
                .or_default()
                .insert(element.to_string());
            state.ttls.insert(key.to_string(), ttl_secs);
            Ok(added)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}
