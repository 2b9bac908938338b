//! Rule matching and deterministic selection.
//!
//! A check is matched against every active rule; when several apply, the
//! winner is chosen by highest priority, then narrower scope
//! (IDENTIFIER > RESOURCE > GLOBAL), then lowest id. The same rule set and
//! request therefore always resolve to the same rule.

use std::cmp::Ordering;
use std::sync::Arc;

use super::rule::{LimitScope, Rule};

/// Whether a resource pattern matches a concrete resource.
///
/// Patterns are `*` (everything), a trailing-star prefix such as `/api/*`,
/// or an exact path.
pub fn pattern_matches(pattern: &str, resource: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return resource.starts_with(prefix);
    }
    pattern == resource
}

/// Whether a rule applies to the given check.
pub fn applies(rule: &Rule, identifier: &str, resource: &str) -> bool {
    if !rule.active {
        return false;
    }
    match rule.limit_scope {
        LimitScope::Global => true,
        LimitScope::Resource => pattern_matches(&rule.resource, resource),
        LimitScope::Identifier => {
            // An identifier-scoped rule needs an identifier to key on.
            !identifier.is_empty() && pattern_matches(&rule.resource, resource)
        }
    }
}

/// Ordering of two applicable rules, best first.
fn precedence(a: &Rule, b: &Rule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.limit_scope.narrowness().cmp(&a.limit_scope.narrowness()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Select the winning rule for a check among the given rules.
///
/// Returns `None` when no active rule applies.
pub fn resolve(rules: &[Arc<Rule>], identifier: &str, resource: &str) -> Option<Arc<Rule>> {
    rules
        .iter()
        .filter(|rule| applies(rule, identifier, resource))
        .min_by(|a, b| precedence(a, b))
        .cloned()
}
