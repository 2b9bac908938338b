//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};

/// Main configuration for the Floodgate engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Decision policy when no rule matches a check.
    #[serde(default)]
    pub default_policy: DefaultPolicy,

    /// Decision policy when the counter store is unavailable.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Maximum optimistic-concurrency attempts per counter update.
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,

    /// Base backoff in milliseconds between conflicting update attempts.
    /// The actual wait is jittered in `0..=base * attempt`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How often the idle-counter sweep runs, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Analytics pipeline configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_policy: DefaultPolicy::default(),
            failure_policy: FailurePolicy::default(),
            max_update_attempts: default_max_update_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sweep_interval_secs: default_sweep_interval(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

/// Policy applied when the resolver finds no matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    /// Allow checks for which no rule is configured.
    #[default]
    Allow,
    /// Deny checks for which no rule is configured.
    Deny,
}

/// Policy applied when the counter store cannot serve a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail open: allow the request when counter state is unreachable.
    #[default]
    Open,
    /// Fail closed: deny the request when counter state is unreachable.
    Closed,
}

fn default_max_update_attempts() -> u32 {
    8
}

fn default_retry_backoff_ms() -> u64 {
    1
}

fn default_sweep_interval() -> u64 {
    60
}

/// Analytics pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Bound of the in-flight event channel; events beyond it are dropped.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How many identifiers the top-offender table retains.
    #[serde(default = "default_top_offenders")]
    pub top_offenders: usize,

    /// Optional monthly check quota reported through the snapshot.
    #[serde(default)]
    pub monthly_check_quota: Option<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            top_offenders: default_top_offenders(),
            monthly_check_quota: None,
        }
    }
}

fn default_event_buffer() -> usize {
    1024
}

fn default_top_offenders() -> usize {
    100
}

impl LimiterConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LimiterConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
