//! Bounded tracking of the most-denied identifiers.

use std::collections::HashMap;

use serde::Serialize;

/// An identifier and how many of its checks were denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopIdentifier {
    pub identifier: String,
    pub denied_count: u64,
}

/// A bounded table of identifiers ranked by denied-check count.
///
/// Holds at most `capacity` identifiers; when a new identifier would exceed
/// that, the entry with the lowest count is evicted. Identifiers evicted
/// this way lose their history, so long-tail counts are approximate while
/// the heaviest offenders are tracked exactly.
#[derive(Debug)]
pub struct TopOffenders {
    capacity: usize,
    counts: HashMap<String, u64>,
}

impl TopOffenders {
    /// Create a table retaining at most `capacity` identifiers.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            counts: HashMap::with_capacity(capacity.min(1024)),
        }
    }

    /// Record denied checks for an identifier.
    pub fn record(&mut self, identifier: &str, denied: u64) {
        if denied == 0 || self.capacity == 0 {
            return;
        }

        if let Some(count) = self.counts.get_mut(identifier) {
            *count += denied;
            return;
        }

        self.counts.insert(identifier.to_string(), denied);
        if self.counts.len() > self.capacity {
            self.evict_min();
        }
    }

    /// All tracked identifiers, highest denied count first.
    ///
    /// Ties order lexicographically so the ranking is deterministic.
    pub fn ranked(&self) -> Vec<TopIdentifier> {
        let mut ranked: Vec<TopIdentifier> = self
            .counts
            .iter()
            .map(|(identifier, &denied_count)| TopIdentifier {
                identifier: identifier.clone(),
                denied_count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.denied_count
                .cmp(&a.denied_count)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        ranked
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn evict_min(&mut self) {
        let min = self
            .counts
            .iter()
            .min_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| b_id.cmp(a_id)))
            .map(|(identifier, _)| identifier.clone());
        if let Some(identifier) = min {
            self.counts.remove(&identifier);
        }
    }
}
