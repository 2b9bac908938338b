//! Counter store trait for abstracting concrete backends.

use async_trait::async_trait;

use crate::error::Result;

use super::key::CounterKey;
use super::state::CounterState;

/// A counter state together with the version it was read at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionedState {
    pub state: CounterState,
    pub version: u64,
}

/// Result of a conditional save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The state was written.
    Saved,
    /// Another writer got there first; re-fetch and retry.
    Conflict,
}

/// Trait for counter store implementations.
///
/// All updates for a single key are linearizable: `save` only succeeds when
/// the caller's `expected_version` still matches (version 0 means "insert,
/// the key must not exist"). Cross-key operations never contend.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the state and version for a key, if present.
    async fn fetch(&self, key: &CounterKey) -> Result<Option<VersionedState>>;

    /// Conditionally write new state for a key.
    ///
    /// `expires_at_ms` sets the idle deadline after which the sweep may
    /// evict the entry.
    async fn save(
        &self,
        key: &CounterKey,
        expected_version: u64,
        state: CounterState,
        expires_at_ms: u64,
    ) -> Result<SaveOutcome>;

    /// Remove entries whose idle deadline has passed. Returns the number
    /// of entries removed.
    async fn remove_expired(&self, now_ms: u64) -> Result<usize>;

    /// Number of live entries.
    fn entry_count(&self) -> usize;
}
