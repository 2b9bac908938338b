//! Fixed Window engine.
//!
//! Time is divided into intervals aligned to `window_seconds`; the count
//! resets at each boundary. This is the cheapest strategy, with the known
//! boundary-burst limitation: a caller can spend the full limit at the end
//! of one window and again at the start of the next, up to 2x the limit in
//! a short span. That trade-off is part of the algorithm's contract and is
//! deliberately not corrected here; Sliding Window bounds it.

use crate::rules::Rule;
use crate::store::CounterState;

use super::{Decision, Outcome};

pub(super) fn check(
    rule: &Rule,
    state: Option<&CounterState>,
    now_ms: u64,
    tokens: u32,
) -> Outcome {
    let window_ms = rule.window_millis();
    let aligned = now_ms / window_ms * window_ms;

    // A count from a previous window has rolled over and restarts at zero.
    let count = match state {
        Some(CounterState::FixedWindow {
            window_start_ms,
            count,
        }) if *window_start_ms == aligned => *count,
        _ => 0,
    };

    let allowed = u64::from(count) + u64::from(tokens) <= u64::from(rule.max_requests);
    let count = if allowed { count + tokens } else { count };

    let remaining = rule.max_requests.saturating_sub(count);
    let window_end_ms = aligned + window_ms;
    let retry_after = if allowed {
        0
    } else {
        (window_end_ms - now_ms).div_ceil(1000)
    };

    Outcome {
        decision: Decision {
            allowed,
            remaining,
            reset_at: window_end_ms / 1000,
            retry_after,
        },
        next: allowed.then_some(CounterState::FixedWindow {
            window_start_ms: aligned,
            count,
        }),
    }
}
