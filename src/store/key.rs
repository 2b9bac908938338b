//! Counter key generation and handling.

use uuid::Uuid;

/// A key that uniquely identifies counter state for one check subject.
///
/// The key is the (identifier, resource, rule id) triple: one counter per
/// principal, per protected resource, per governing rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The principal being rate-limited.
    pub identifier: String,
    /// The protected resource being checked.
    pub resource: String,
    /// The rule the counter belongs to.
    pub rule_id: Uuid,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(identifier: &str, resource: &str, rule_id: Uuid) -> Self {
        Self {
            identifier: identifier.to_string(),
            resource: resource.to_string(),
            rule_id,
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.identifier, self.resource, self.rule_id)
    }
}
