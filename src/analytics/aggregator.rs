//! Streaming aggregation of admission events.

use chrono::{DateTime, Datelike, Utc};
use hdrhistogram::Histogram;
use serde::Serialize;

use crate::config::AnalyticsConfig;

use super::event::CheckEvent;
use super::offenders::{TopIdentifier, TopOffenders};

/// A point-in-time view of the analytics state.
///
/// Snapshots are monotonically updated and eventually consistent with the
/// event stream: a reader sees a recent view, not necessarily the latest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    /// Checks recorded since startup.
    pub total_checks: u64,
    /// Checks that were denied.
    pub rate_limit_hits: u64,
    /// `rate_limit_hits / total_checks`; 0 when nothing was recorded.
    pub hit_rate: f64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    /// Events dropped under backpressure, never folded into the totals.
    pub dropped_events: u64,
    /// Quota left this calendar month, when a quota is configured.
    pub remaining_checks_this_month: Option<u64>,
}

/// Single-writer fold of the event stream.
///
/// Latency percentiles come from an HDR histogram at 3 significant figures
/// (quantile error at most 0.1% of the value), bounded memory regardless of
/// event volume.
pub struct Aggregator {
    total_checks: u64,
    rate_limit_hits: u64,
    latency: Histogram<u64>,
    offenders: TopOffenders,
    monthly_quota: Option<u64>,
    current_month: Option<(i32, u32)>,
    month_checks: u64,
}

impl Aggregator {
    /// Create an empty aggregator.
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            total_checks: 0,
            rate_limit_hits: 0,
            // 1us to 60s, 3 significant figures.
            latency: Histogram::new_with_bounds(1, 60_000_000, 3)
                .expect("histogram bounds are static"),
            offenders: TopOffenders::new(config.top_offenders),
            monthly_quota: config.monthly_check_quota,
            current_month: None,
            month_checks: 0,
        }
    }

    /// Fold one event into the running state.
    pub fn record(&mut self, event: &CheckEvent) {
        self.total_checks += 1;
        if !event.allowed {
            self.rate_limit_hits += 1;
            self.offenders.record(&event.identifier, 1);
        }
        self.latency.saturating_record(event.latency_us);

        if let Some(ts) = DateTime::<Utc>::from_timestamp_millis(event.timestamp_ms as i64) {
            let month = (ts.year(), ts.month());
            if self.current_month != Some(month) {
                self.current_month = Some(month);
                self.month_checks = 0;
            }
            self.month_checks += 1;
        }
    }

    /// Current analytics view.
    pub fn snapshot(&self, dropped_events: u64) -> AnalyticsSnapshot {
        let hit_rate = if self.total_checks == 0 {
            0.0
        } else {
            self.rate_limit_hits as f64 / self.total_checks as f64
        };

        let (p50, p95, p99) = if self.latency.is_empty() {
            (0, 0, 0)
        } else {
            (
                self.latency.value_at_quantile(0.50),
                self.latency.value_at_quantile(0.95),
                self.latency.value_at_quantile(0.99),
            )
        };

        AnalyticsSnapshot {
            total_checks: self.total_checks,
            rate_limit_hits: self.rate_limit_hits,
            hit_rate,
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            dropped_events,
            remaining_checks_this_month: self
                .monthly_quota
                .map(|quota| quota.saturating_sub(self.month_checks)),
        }
    }

    /// All tracked offenders, most-denied first.
    pub fn ranked_offenders(&self) -> Vec<TopIdentifier> {
        self.offenders.ranked()
    }
}
