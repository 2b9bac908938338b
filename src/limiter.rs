//! Admission coordinator: the public entry point for rate limit checks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::analytics::{Analytics, AnalyticsSnapshot, CheckEvent, TopIdentifier};
use crate::clock::{Clock, SystemClock};
use crate::config::{DefaultPolicy, FailurePolicy, LimiterConfig};
use crate::engine::{self, Decision};
use crate::error::{FloodgateError, Result};
use crate::rules::{Rule, RuleCatalog};
use crate::store::{CounterKey, CounterStore, MemoryStore, SaveOutcome};

/// Remaining quota reported on synthesized allow decisions.
const SYNTHETIC_ALLOW_REMAINING: u32 = 999;
/// Reset horizon on synthesized allow decisions.
const SYNTHETIC_ALLOW_RESET_SECS: u64 = 3600;
/// Retry horizon on synthesized deny decisions.
const SYNTHETIC_DENY_RETRY_SECS: u64 = 60;

/// The rate limiter: resolves the governing rule, runs the matching
/// algorithm engine against atomically-updated counter state, records an
/// analytics event, and returns the decision.
///
/// This struct is thread-safe and can be shared across tasks.
pub struct RateLimiter {
    config: LimiterConfig,
    catalog: Arc<RuleCatalog>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    analytics: Analytics,
    sweeper: JoinHandle<()>,
}

impl RateLimiter {
    /// Create a limiter on an empty in-memory store with the system clock.
    ///
    /// Must be called within a tokio runtime; the analytics pipeline and
    /// the idle-counter sweep run on spawned tasks.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(RuleCatalog::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create a limiter from explicit parts.
    ///
    /// Useful for alternative store backends and for tests that drive time
    /// through a manual clock.
    pub fn with_parts(
        config: LimiterConfig,
        catalog: Arc<RuleCatalog>,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let analytics = Analytics::spawn(&config.analytics);
        let sweeper = Self::spawn_sweeper(
            Arc::clone(&store),
            Arc::clone(&clock),
            Duration::from_secs(config.sweep_interval_secs.max(1)),
        );

        Self {
            config,
            catalog,
            store,
            clock,
            analytics,
            sweeper,
        }
    }

    /// The rule catalog backing this limiter.
    pub fn rules(&self) -> Arc<RuleCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Check whether `tokens` units of work by `identifier` against
    /// `resource` are admitted.
    pub async fn check(&self, identifier: &str, resource: &str, tokens: u32) -> Result<Decision> {
        let started = Instant::now();
        validate_request(identifier, resource, tokens)?;

        let rule = match self.catalog.resolve(identifier, resource) {
            Ok(rule) => rule,
            Err(FloodgateError::NoRuleConfigured { .. }) => {
                warn!(identifier, resource, "No active rule found for check");
                let decision = self.default_decision();
                self.record(identifier, resource, &decision, started);
                return Ok(decision);
            }
            Err(e) => return Err(e),
        };

        trace!(
            identifier,
            resource,
            rule_id = %rule.id,
            tokens,
            "Checking rate limit"
        );

        let decision = match self.apply_rule(&rule, identifier, resource, tokens).await {
            Ok(decision) => decision,
            Err(FloodgateError::StoreUnavailable(reason)) => {
                warn!(
                    %reason,
                    rule_id = %rule.id,
                    policy = ?self.config.failure_policy,
                    "Counter store unavailable, applying failure policy"
                );
                self.failure_decision()
            }
            Err(e) => return Err(e),
        };

        if !decision.allowed {
            debug!(
                identifier,
                resource,
                rule_id = %rule.id,
                retry_after = decision.retry_after,
                "Rate limit exceeded"
            );
        }

        self.record(identifier, resource, &decision, started);
        Ok(decision)
    }

    /// The most recently published analytics snapshot.
    pub fn realtime_analytics(&self) -> AnalyticsSnapshot {
        self.analytics.realtime_snapshot()
    }

    /// The most-denied identifiers, up to `limit`.
    pub fn top_identifiers(&self, limit: usize) -> Vec<TopIdentifier> {
        self.analytics.top_identifiers(limit)
    }

    /// Analytics events dropped under backpressure so far.
    pub fn dropped_events(&self) -> u64 {
        self.analytics.dropped_events()
    }

    /// Get the number of live counter entries.
    pub fn counter_count(&self) -> usize {
        self.store.entry_count()
    }

    /// Stop the background tasks, draining pending analytics events.
    pub async fn shutdown(self) {
        self.sweeper.abort();
        self.analytics.shutdown().await;
    }

    /// Run one check against the store with optimistic concurrency.
    ///
    /// Version conflicts are retried with jittered backoff up to the
    /// configured bound; definitive store failures are not retried.
    async fn apply_rule(
        &self,
        rule: &Rule,
        identifier: &str,
        resource: &str,
        tokens: u32,
    ) -> Result<Decision> {
        let key = CounterKey::new(identifier, resource, rule.id);
        // Idle entries older than two windows carry no information any
        // engine still needs, which is what makes sweeping them safe.
        let ttl_ms = rule.window_millis() * 2;

        for attempt in 1..=self.config.max_update_attempts.max(1) {
            let existing = self.store.fetch(&key).await?;
            let now_ms = self.clock.now_millis();
            let (version, state) = match existing {
                Some(found) => (found.version, Some(found.state)),
                None => (0, None),
            };

            let outcome = engine::check(rule, state.as_ref(), now_ms, tokens);

            // Denied checks mutate nothing; the decision stands as computed.
            let Some(next) = outcome.next else {
                return Ok(outcome.decision);
            };

            match self.store.save(&key, version, next, now_ms + ttl_ms).await? {
                SaveOutcome::Saved => return Ok(outcome.decision),
                SaveOutcome::Conflict => {
                    trace!(key = %key, attempt, "Counter update conflict, retrying");
                    self.backoff(attempt).await;
                }
            }
        }

        Err(FloodgateError::StoreUnavailable(format!(
            "counter update contention persisted across {} attempts",
            self.config.max_update_attempts
        )))
    }

    async fn backoff(&self, attempt: u32) {
        let ceiling = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
        let jitter = if ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=ceiling)
        };
        if jitter == 0 {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }

    fn default_decision(&self) -> Decision {
        match self.config.default_policy {
            DefaultPolicy::Allow => self.synthetic_allow(),
            DefaultPolicy::Deny => self.synthetic_deny(),
        }
    }

    fn failure_decision(&self) -> Decision {
        match self.config.failure_policy {
            FailurePolicy::Open => self.synthetic_allow(),
            FailurePolicy::Closed => self.synthetic_deny(),
        }
    }

    fn synthetic_allow(&self) -> Decision {
        Decision {
            allowed: true,
            remaining: SYNTHETIC_ALLOW_REMAINING,
            reset_at: self.clock.now_secs() + SYNTHETIC_ALLOW_RESET_SECS,
            retry_after: 0,
        }
    }

    fn synthetic_deny(&self) -> Decision {
        Decision {
            allowed: false,
            remaining: 0,
            reset_at: self.clock.now_secs() + SYNTHETIC_DENY_RETRY_SECS,
            retry_after: SYNTHETIC_DENY_RETRY_SECS,
        }
    }

    /// Record the decision fire-and-forget; never fails the check.
    fn record(&self, identifier: &str, resource: &str, decision: &Decision, started: Instant) {
        let event = CheckEvent {
            identifier: identifier.to_string(),
            resource: resource.to_string(),
            allowed: decision.allowed,
            latency_us: started.elapsed().as_micros() as u64,
            timestamp_ms: self.clock.now_millis(),
        };
        if self.analytics.record(event).is_err() {
            warn!(identifier, resource, "Analytics event dropped under backpressure");
        }
    }

    fn spawn_sweeper(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.remove_expired(clock.now_millis()).await {
                    Ok(0) | Err(_) => {}
                    Ok(removed) => {
                        debug!(removed, remaining = store.entry_count(), "Swept idle counters");
                    }
                }
            }
        })
    }
}

/// Reject malformed checks before any state is touched.
///
/// The character restrictions guard downstream key construction, as the
/// original service does for its storage keys.
fn validate_request(identifier: &str, resource: &str, tokens: u32) -> Result<()> {
    if tokens == 0 {
        return Err(FloodgateError::Validation(
            "tokens must be at least 1".to_string(),
        ));
    }
    if resource.trim().is_empty() {
        return Err(FloodgateError::Validation(
            "resource cannot be empty".to_string(),
        ));
    }
    for (field, value) in [("resource", resource), ("identifier", identifier)] {
        if value.contains(':') || value.contains(' ') || value.contains('\n') {
            return Err(FloodgateError::Validation(format!(
                "invalid characters in {}",
                field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rules::{Algorithm, IdentifierType, LimitScope, RuleSpec};
    use crate::store::{CounterState, VersionedState};
    use async_trait::async_trait;

    // Aligned to the 60s windows used below.
    const START: u64 = 1_200_000_000;

    fn spec(algorithm: Algorithm, max_requests: u32, window_seconds: u32) -> RuleSpec {
        RuleSpec {
            resource: "/api/orders".to_string(),
            algorithm,
            max_requests,
            window_seconds,
            burst_capacity: None,
            identifier_type: IdentifierType::default(),
            limit_scope: LimitScope::default(),
            priority: 0,
            active: true,
        }
    }

    fn limiter_with_clock(config: LimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let limiter = RateLimiter::with_parts(
            config,
            Arc::new(RuleCatalog::new()),
            Arc::new(MemoryStore::new()),
            clock.clone(),
        );
        (limiter, clock)
    }

    async fn wait_for_total(limiter: &RateLimiter, total: u64) {
        for _ in 0..100 {
            if limiter.realtime_analytics().total_checks == total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("analytics never reached {} checks", total);
    }

    #[tokio::test]
    async fn test_check_enforces_the_resolved_rule() {
        let (limiter, _clock) = limiter_with_clock(LimiterConfig::default());
        limiter
            .rules()
            .create(spec(Algorithm::FixedWindow, 5, 60))
            .unwrap();

        for _ in 0..5 {
            let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
            assert!(decision.allowed);
        }

        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, 60);
        assert_eq!(limiter.counter_count(), 1);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_separate_identifiers_get_separate_counters() {
        let (limiter, _clock) = limiter_with_clock(LimiterConfig::default());
        limiter
            .rules()
            .create(spec(Algorithm::FixedWindow, 1, 60))
            .unwrap();

        assert!(limiter.check("user-1", "/api/orders", 1).await.unwrap().allowed);
        assert!(limiter.check("user-2", "/api/orders", 1).await.unwrap().allowed);
        assert!(!limiter.check("user-1", "/api/orders", 1).await.unwrap().allowed);
        assert_eq!(limiter.counter_count(), 2);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_token_bucket_refills_through_the_clock() {
        let (limiter, clock) = limiter_with_clock(LimiterConfig::default());
        // 10 tokens per 10s window: 1 token/s.
        limiter
            .rules()
            .create(spec(Algorithm::TokenBucket, 10, 10))
            .unwrap();

        let decision = limiter.check("user-1", "/api/orders", 10).await.unwrap();
        assert!(decision.allowed);
        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, 1);

        clock.advance_secs(10);
        let decision = limiter.check("user-1", "/api/orders", 10).await.unwrap();
        assert!(decision.allowed);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_default_policy_allow_when_no_rule() {
        let (limiter, _clock) = limiter_with_clock(LimiterConfig::default());

        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, SYNTHETIC_ALLOW_REMAINING);
        assert_eq!(decision.retry_after, 0);
        // No counter state is created for unmatched checks.
        assert_eq!(limiter.counter_count(), 0);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_default_policy_deny_when_no_rule() {
        let config = LimiterConfig {
            default_policy: DefaultPolicy::Deny,
            ..Default::default()
        };
        let (limiter, _clock) = limiter_with_clock(config);

        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, SYNTHETIC_DENY_RETRY_SECS);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_validation_rejects_malformed_checks() {
        let (limiter, _clock) = limiter_with_clock(LimiterConfig::default());

        let err = limiter.check("user-1", "", 1).await.unwrap_err();
        assert!(matches!(err, FloodgateError::Validation(_)));

        let err = limiter.check("user:1", "/api/orders", 1).await.unwrap_err();
        assert!(matches!(err, FloodgateError::Validation(_)));

        let err = limiter.check("user-1", "/api/orders", 0).await.unwrap_err();
        assert!(matches!(err, FloodgateError::Validation(_)));

        // Nothing reached the engines or the store.
        assert_eq!(limiter.counter_count(), 0);

        limiter.shutdown().await;
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn fetch(&self, _key: &CounterKey) -> Result<Option<VersionedState>> {
            Err(FloodgateError::StoreUnavailable("store is down".to_string()))
        }

        async fn save(
            &self,
            _key: &CounterKey,
            _expected_version: u64,
            _state: CounterState,
            _expires_at_ms: u64,
        ) -> Result<SaveOutcome> {
            Err(FloodgateError::StoreUnavailable("store is down".to_string()))
        }

        async fn remove_expired(&self, _now_ms: u64) -> Result<usize> {
            Ok(0)
        }

        fn entry_count(&self) -> usize {
            0
        }
    }

    fn limiter_with_down_store(config: LimiterConfig) -> RateLimiter {
        let catalog = Arc::new(RuleCatalog::new());
        catalog
            .create(spec(Algorithm::FixedWindow, 5, 60))
            .unwrap();
        RateLimiter::with_parts(
            config,
            catalog,
            Arc::new(DownStore),
            Arc::new(ManualClock::new(START)),
        )
    }

    #[tokio::test]
    async fn test_fail_open_allows_when_store_is_down() {
        let limiter = limiter_with_down_store(LimiterConfig::default());

        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(decision.allowed);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_fail_closed_denies_when_store_is_down() {
        let config = LimiterConfig {
            failure_policy: FailurePolicy::Closed,
            ..Default::default()
        };
        let limiter = limiter_with_down_store(config);

        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, SYNTHETIC_DENY_RETRY_SECS);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_analytics_reflect_checks() {
        let (limiter, _clock) = limiter_with_clock(LimiterConfig::default());
        limiter
            .rules()
            .create(spec(Algorithm::FixedWindow, 2, 60))
            .unwrap();

        for _ in 0..5 {
            limiter.check("user-1", "/api/orders", 1).await.unwrap();
        }

        wait_for_total(&limiter, 5).await;
        let snapshot = limiter.realtime_analytics();
        assert_eq!(snapshot.total_checks, 5);
        assert_eq!(snapshot.rate_limit_hits, 3);
        let expected = snapshot.rate_limit_hits as f64 / snapshot.total_checks as f64;
        assert!((snapshot.hit_rate - expected).abs() < 1e-9);

        let top = limiter.top_identifiers(10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].identifier, "user-1");
        assert_eq!(top[0].denied_count, 3);

        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_counters() {
        let config = LimiterConfig {
            sweep_interval_secs: 1,
            ..Default::default()
        };
        let (limiter, clock) = limiter_with_clock(config);
        limiter
            .rules()
            .create(spec(Algorithm::FixedWindow, 5, 60))
            .unwrap();

        limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert_eq!(limiter.counter_count(), 1);

        // Idle past the 2x-window TTL; the sweep reclaims the entry.
        clock.advance_secs(121);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.counter_count(), 0);

        // A later check simply re-creates the key.
        let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(limiter.counter_count(), 1);

        limiter.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_checks_never_overcount() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = LimiterConfig {
            // Plenty of CAS retries so contention cannot trip the failure
            // policy and inflate the admitted count.
            max_update_attempts: 256,
            ..Default::default()
        };
        let catalog = Arc::new(RuleCatalog::new());
        catalog
            .create(spec(Algorithm::FixedWindow, 50, 60))
            .unwrap();
        let limiter = Arc::new(RateLimiter::with_parts(
            config,
            catalog,
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(START)),
        ));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let mut allowed = 0u32;
                for _ in 0..10 {
                    let decision = limiter.check("user-1", "/api/orders", 1).await.unwrap();
                    if decision.allowed {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }

        let results = futures::future::join_all(handles).await;
        let allowed: u32 = results.into_iter().map(|r| r.unwrap()).sum();
        assert_eq!(
            allowed, 50,
            "exactly max_requests of the 200 concurrent checks may pass"
        );

        match Arc::try_unwrap(limiter) {
            Ok(limiter) => limiter.shutdown().await,
            Err(_) => panic!("limiter still shared"),
        }
    }

    #[test]
    fn test_request_validation_rules() {
        assert!(validate_request("user-1", "/api/orders", 1).is_ok());
        assert!(validate_request("", "/api/orders", 1).is_ok());
        assert!(validate_request("user-1", "bad resource", 1).is_err());
        assert!(validate_request("user\n1", "/api/orders", 1).is_err());
        assert!(validate_request("user-1", "a:b", 1).is_err());
        assert!(validate_request("user-1", "   ", 1).is_err());
        assert!(validate_request("user-1", "/api/orders", 0).is_err());
    }
}
