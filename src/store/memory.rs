//! In-memory counter store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::Result;

use super::backend::{CounterStore, SaveOutcome, VersionedState};
use super::key::CounterKey;
use super::state::CounterState;

struct StoredCounter {
    state: CounterState,
    version: u64,
    expires_at_ms: u64,
}

/// A sharded in-memory counter store.
///
/// Each key's entry is updated under its shard lock, so `save` is an atomic
/// compare-and-swap against the version the caller fetched. Keys hash onto
/// independent shards; checks for different keys do not contend.
pub struct MemoryStore {
    entries: DashMap<CounterKey, StoredCounter>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryStore {
    async fn fetch(&self, key: &CounterKey) -> Result<Option<VersionedState>> {
        Ok(self.entries.get(key).map(|entry| VersionedState {
            state: entry.state,
            version: entry.version,
        }))
    }

    async fn save(
        &self,
        key: &CounterKey,
        expected_version: u64,
        state: CounterState,
        expires_at_ms: u64,
    ) -> Result<SaveOutcome> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.version != expected_version {
                    trace!(key = %key, expected = expected_version, found = entry.version,
                        "Counter version conflict");
                    return Ok(SaveOutcome::Conflict);
                }
                entry.state = state;
                entry.version += 1;
                entry.expires_at_ms = expires_at_ms;
                Ok(SaveOutcome::Saved)
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    // The entry the caller saw was evicted meanwhile.
                    trace!(key = %key, expected = expected_version, "Counter entry gone");
                    return Ok(SaveOutcome::Conflict);
                }
                debug!(key = %key, "Creating counter entry");
                vacant.insert(StoredCounter {
                    state,
                    version: 1,
                    expires_at_ms,
                });
                Ok(SaveOutcome::Saved)
            }
        }
    }

    async fn remove_expired(&self, now_ms: u64) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at_ms > now_ms);
        Ok(before - self.entries.len())
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
