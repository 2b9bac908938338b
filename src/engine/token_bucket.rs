//! Token Bucket engine.
//!
//! The bucket holds up to `burst_capacity` (default `max_requests`) tokens
//! and refills continuously at `max_requests / window_seconds` tokens per
//! second. Balances are `f64`; `remaining` is floored to an integer.

use crate::rules::Rule;
use crate::store::CounterState;

use super::{Decision, Outcome};

pub(super) fn check(
    rule: &Rule,
    state: Option<&CounterState>,
    now_ms: u64,
    tokens: u32,
) -> Outcome {
    let capacity = f64::from(rule.capacity());
    let rate = f64::from(rule.max_requests) / f64::from(rule.window_seconds);

    // A fresh bucket starts full. State from another algorithm is ignored.
    let (balance, last_refill_ms) = match state {
        Some(CounterState::TokenBucket {
            tokens,
            last_refill_ms,
        }) => (*tokens, *last_refill_ms),
        _ => (capacity, now_ms),
    };

    // Zero elapsed time refills zero tokens, so re-evaluation without time
    // advance is a no-op.
    let elapsed_ms = now_ms.saturating_sub(last_refill_ms);
    let mut balance = (balance + elapsed_ms as f64 / 1000.0 * rate).min(capacity);

    let requested = f64::from(tokens);
    let allowed = balance >= requested;
    if allowed {
        balance -= requested;
    }

    let remaining = balance.floor().max(0.0) as u32;
    let until_full_ms = (((capacity - balance) / rate) * 1000.0).ceil() as u64;
    let reset_at = (now_ms + until_full_ms).div_ceil(1000);
    let retry_after = if allowed {
        0
    } else {
        ((requested - balance) / rate).ceil() as u64
    };

    Outcome {
        decision: Decision {
            allowed,
            remaining,
            reset_at,
            retry_after,
        },
        next: allowed.then_some(CounterState::TokenBucket {
            tokens: balance,
            last_refill_ms: now_ms,
        }),
    }
}
