//! Decision algorithms.
//!
//! Each engine is a pure transition function of (rule, stored state, now,
//! requested tokens): given the same inputs it produces the same decision
//! and successor state. Denied checks return no successor state, so they
//! need no store write and repeated evaluation without time advance is
//! idempotent. Persistence and retries belong to the admission coordinator.

mod fixed_window;
mod sliding_window;
mod token_bucket;

use serde::Serialize;

use crate::rules::{Algorithm, Rule};
use crate::store::CounterState;

/// The outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Remaining quota after this decision, floored to an integer.
    pub remaining: u32,
    /// When the quota resets, in epoch seconds.
    pub reset_at: u64,
    /// Seconds to wait before retrying; 0 when allowed.
    pub retry_after: u64,
}

/// A decision together with the counter state to persist.
///
/// `next` is `None` when nothing changed (denied checks).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub decision: Decision,
    pub next: Option<CounterState>,
}

/// Evaluate a check against the engine selected by the rule.
pub fn check(rule: &Rule, state: Option<&CounterState>, now_ms: u64, tokens: u32) -> Outcome {
    match rule.algorithm {
        Algorithm::TokenBucket => token_bucket::check(rule, state, now_ms, tokens),
        Algorithm::SlidingWindow => sliding_window::check(rule, state, now_ms, tokens),
        Algorithm::FixedWindow => fixed_window::check(rule, state, now_ms, tokens),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::rules::{Algorithm, IdentifierType, LimitScope, Rule, RuleSpec};

    pub fn rule(algorithm: Algorithm, max_requests: u32, window_seconds: u32) -> Rule {
        Rule::from_spec(RuleSpec {
            resource: "/api/orders".to_string(),
            algorithm,
            max_requests,
            window_seconds,
            burst_capacity: None,
            identifier_type: IdentifierType::default(),
            limit_scope: LimitScope::default(),
            priority: 0,
            active: true,
        })
    }
}
