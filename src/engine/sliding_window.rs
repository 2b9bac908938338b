//! Sliding Window engine.
//!
//! Implemented as the weighted two-window counter approximation: the
//! rolling count is estimated as `current + previous * (1 - elapsed
//! fraction)`, with both windows aligned to `window_seconds` boundaries.
//! The estimate is exact when previous-window traffic was uniform; in the
//! worst case (all previous traffic clustered at one edge) it is off by at
//! most the previous window's count. An exact timestamp log would remove
//! that error at unbounded memory per key.

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

    let (current, previous) = match state {
        Some(CounterState::SlidingWindow {
            window_start_ms,
            current,
            previous,
        }) => {
            if *window_start_ms == aligned {
                (*current, *previous)
            } else if aligned == window_start_ms + window_ms {
                // Advanced exactly one window: current becomes previous.
                (0, *current)
            } else {
                // Two or more windows passed; both counts are stale.
                (0, 0)
            }
        }
        _ => (0, 0),
    };

    let elapsed_fraction = (now_ms - aligned) as f64 / window_ms as f64;
    let mut estimated = f64::from(current) + f64::from(previous) * (1.0 - elapsed_fraction);
    let max = f64::from(rule.max_requests);

    let allowed = estimated + f64::from(tokens) <= max;
    let current = if allowed {
        estimated += f64::from(tokens);
        current + tokens
    } else {
        current
    };

    let remaining = (max - estimated).floor().max(0.0) as u32;
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
        next: allowed.then_some(CounterState::SlidingWindow {
            window_start_ms: aligned,
            current,
            previous,
        }),
    }
}
