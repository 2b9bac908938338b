//! Per-key counter state.

/// Algorithm-specific counter state for one key.
///
/// Created lazily on the first check for a key and replaced wholesale on
/// every allowed check. A state variant that does not match the governing
/// rule's algorithm (left over from a rule update) is treated as missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterState {
    /// Token Bucket: fractional token balance and the last refill instant.
    TokenBucket { tokens: f64, last_refill_ms: u64 },
    /// Sliding Window: aligned window start plus current/previous counts.
    SlidingWindow {
        window_start_ms: u64,
        current: u32,
        previous: u32,
    },
    /// Fixed Window: aligned window start and the count within it.
    FixedWindow { window_start_ms: u64, count: u32 },
}
