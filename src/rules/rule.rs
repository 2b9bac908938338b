//! Rate limit rule model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FloodgateError, Result};

/// The decision algorithm a rule is enforced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    TokenBucket,
    SlidingWindow,
    FixedWindow,
}

/// What the check identifier represents.
///
/// Carried as metadata for the boundary layer; matching does not branch
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    #[default]
    UserId,
    IpAddress,
    ApiKey,
    Custom,
}

/// How broadly a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitScope {
    /// Applies to every check.
    Global,
    /// Applies to checks against a matching resource.
    #[default]
    Resource,
    /// Applies to checks against a matching resource that carry an identifier.
    Identifier,
}

impl LimitScope {
    /// Narrowness rank used to break priority ties: narrower scope wins.
    pub(crate) fn narrowness(&self) -> u8 {
        match self {
            LimitScope::Global => 0,
            LimitScope::Resource => 1,
            LimitScope::Identifier => 2,
        }
    }
}

/// The mutable definition of a rule, as supplied to create/update/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Resource pattern: exact path, trailing-star prefix, or `*`.
    pub resource: String,
    pub algorithm: Algorithm,
    pub max_requests: u32,
    pub window_seconds: u32,
    /// Token Bucket capacity override; defaults to `max_requests`.
    #[serde(default)]
    pub burst_capacity: Option<u32>,
    #[serde(default)]
    pub identifier_type: IdentifierType,
    #[serde(default)]
    pub limit_scope: LimitScope,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RuleSpec {
    /// Validate the spec before it is admitted into the catalog.
    pub fn validate(&self) -> Result<()> {
        if self.resource.trim().is_empty() {
            return Err(FloodgateError::Validation(
                "resource pattern cannot be empty".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(FloodgateError::Validation(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_seconds == 0 {
            return Err(FloodgateError::Validation(
                "window_seconds must be greater than zero".to_string(),
            ));
        }
        if let Some(burst) = self.burst_capacity {
            if burst == 0 {
                return Err(FloodgateError::Validation(
                    "burst_capacity must be greater than zero when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A configured rate limit rule.
///
/// Once resolved for a check, the rule is an immutable snapshot; catalog
/// updates replace the stored copy without touching snapshots in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub resource: String,
    pub algorithm: Algorithm,
    pub max_requests: u32,
    pub window_seconds: u32,
    pub burst_capacity: Option<u32>,
    pub identifier_type: IdentifierType,
    pub limit_scope: LimitScope,
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Materialize a rule from a validated spec with a fresh id.
    pub(crate) fn from_spec(spec: RuleSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: spec.resource,
            algorithm: spec.algorithm,
            max_requests: spec.max_requests,
            window_seconds: spec.window_seconds,
            burst_capacity: spec.burst_capacity,
            identifier_type: spec.identifier_type,
            limit_scope: spec.limit_scope,
            priority: spec.priority,
            active: spec.active,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Apply a validated spec to an existing rule, preserving identity.
    pub(crate) fn apply_spec(&self, spec: RuleSpec) -> Self {
        Self {
            id: self.id,
            resource: spec.resource,
            algorithm: spec.algorithm,
            max_requests: spec.max_requests,
            window_seconds: spec.window_seconds,
            burst_capacity: spec.burst_capacity,
            identifier_type: spec.identifier_type,
            limit_scope: spec.limit_scope,
            priority: spec.priority,
            active: spec.active,
            created_at: self.created_at,
            updated_at: Some(Utc::now()),
        }
    }

    /// The definition portion of this rule, without identity or timestamps.
    pub fn spec(&self) -> RuleSpec {
        RuleSpec {
            resource: self.resource.clone(),
            algorithm: self.algorithm,
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
            burst_capacity: self.burst_capacity,
            identifier_type: self.identifier_type,
            limit_scope: self.limit_scope,
            priority: self.priority,
            active: self.active,
        }
    }

    /// Token Bucket capacity: the burst override, or the steady limit.
    pub fn capacity(&self) -> u32 {
        self.burst_capacity.unwrap_or(self.max_requests)
    }

    /// Window length in milliseconds.
    pub fn window_millis(&self) -> u64 {
        u64::from(self.window_seconds) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RuleSpec {
        RuleSpec {
            resource: "/api/orders".to_string(),
            algorithm: Algorithm::FixedWindow,
            max_requests: 100,
            window_seconds: 60,
            burst_capacity: None,
            identifier_type: IdentifierType::default(),
            limit_scope: LimitScope::default(),
            priority: 0,
            active: true,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut s = spec();
        s.resource = "  ".to_string();
        assert!(matches!(
            s.validate(),
            Err(FloodgateError::Validation(_))
        ));

        let mut s = spec();
        s.max_requests = 0;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.window_seconds = 0;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.burst_capacity = Some(0);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_wire_format_matches_original_enums() {
        let json = r#"{
            "resource": "/api/search",
            "algorithm": "TOKEN_BUCKET",
            "max_requests": 50,
            "window_seconds": 10,
            "identifier_type": "API_KEY",
            "limit_scope": "IDENTIFIER"
        }"#;
        let s: RuleSpec = serde_json::from_str(json).unwrap();
        assert_eq!(s.algorithm, Algorithm::TokenBucket);
        assert_eq!(s.identifier_type, IdentifierType::ApiKey);
        assert_eq!(s.limit_scope, LimitScope::Identifier);
        // Omitted fields take the original entity's defaults
        assert_eq!(s.priority, 0);
        assert!(s.active);
        assert!(s.burst_capacity.is_none());
    }

    #[test]
    fn test_from_spec_and_apply_spec_preserve_identity() {
        let rule = Rule::from_spec(spec());
        assert!(rule.updated_at.is_none());

        let mut changed = rule.spec();
        changed.max_requests = 10;
        let updated = rule.apply_spec(changed);

        assert_eq!(updated.id, rule.id);
        assert_eq!(updated.created_at, rule.created_at);
        assert_eq!(updated.max_requests, 10);
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn test_capacity_prefers_burst() {
        let mut s = spec();
        s.algorithm = Algorithm::TokenBucket;
        s.burst_capacity = Some(250);
        let rule = Rule::from_spec(s);
        assert_eq!(rule.capacity(), 250);

        let rule = Rule::from_spec(spec());
        assert_eq!(rule.capacity(), 100);
        assert_eq!(rule.window_millis(), 60_000);
    }
}
