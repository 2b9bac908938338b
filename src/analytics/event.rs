//! Admission events consumed by the aggregator.

/// One recorded admission decision.
///
/// Events are append-only: the coordinator emits them fire-and-forget and
/// the aggregator folds them into running state.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckEvent {
    /// The principal that was checked.
    pub identifier: String,
    /// The resource that was checked.
    pub resource: String,
    /// Whether the check was allowed.
    pub allowed: bool,
    /// Decision-path latency in microseconds.
    pub latency_us: u64,
    /// When the check happened, in epoch milliseconds.
    pub timestamp_ms: u64,
}
