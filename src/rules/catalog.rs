//! Rule catalog: storage, CRUD, and bulk import/export.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{FloodgateError, Result};

use super::resolver;
use super::rule::{Rule, RuleSpec};

/// A single entry in a bulk rule set.
///
/// Entries carrying an `id` address an existing rule (update, never
/// duplicate); entries without one create a rule unless an identical
/// definition already exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleImport {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub spec: RuleSpec,
}

/// Outcome summary of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// The configured rule set.
///
/// Reads hand out `Arc<Rule>` snapshots: a check that resolved a rule keeps
/// using that snapshot even if the rule is updated or deleted mid-flight.
/// This struct is thread-safe and can be shared across tasks.
pub struct RuleCatalog {
    rules: RwLock<HashMap<Uuid, Arc<Rule>>>,
}

impl RuleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new rule from a validated spec.
    pub fn create(&self, spec: RuleSpec) -> Result<Rule> {
        spec.validate()?;
        let rule = Rule::from_spec(spec);
        self.rules
            .write()
            .insert(rule.id, Arc::new(rule.clone()));
        info!(
            rule_id = %rule.id,
            resource = %rule.resource,
            algorithm = ?rule.algorithm,
            "Created rate limit rule"
        );
        Ok(rule)
    }

    /// Replace the definition of an existing rule.
    pub fn update(&self, id: Uuid, spec: RuleSpec) -> Result<Rule> {
        spec.validate()?;
        let mut rules = self.rules.write();
        let existing = rules
            .get(&id)
            .ok_or(FloodgateError::RuleNotFound(id))?;
        let updated = existing.apply_spec(spec);
        rules.insert(id, Arc::new(updated.clone()));
        info!(rule_id = %id, resource = %updated.resource, "Updated rate limit rule");
        Ok(updated)
    }

    /// Delete a rule by id.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self.rules.write().remove(&id);
        match removed {
            Some(rule) => {
                info!(rule_id = %id, resource = %rule.resource, "Deleted rate limit rule");
                Ok(())
            }
            None => Err(FloodgateError::RuleNotFound(id)),
        }
    }

    /// Fetch a rule by id.
    pub fn get(&self, id: Uuid) -> Option<Rule> {
        self.rules.read().get(&id).map(|r| (**r).clone())
    }

    /// List all rules, ordered by id for stable output.
    pub fn list(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .read()
            .values()
            .map(|r| (**r).clone())
            .collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    /// Number of rules in the catalog.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Whether the catalog holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Resolve the rule governing a check.
    pub fn resolve(&self, identifier: &str, resource: &str) -> Result<Arc<Rule>> {
        let snapshot: Vec<Arc<Rule>> = self.rules.read().values().cloned().collect();
        resolver::resolve(&snapshot, identifier, resource).ok_or_else(|| {
            FloodgateError::NoRuleConfigured {
                resource: resource.to_string(),
            }
        })
    }

    /// Import a rule set from JSON.
    pub fn import_json(&self, content: &str) -> Result<ImportReport> {
        let entries: Vec<RuleImport> = serde_json::from_str(content).map_err(|e| {
            FloodgateError::Validation(format!("failed to parse rule set: {}", e))
        })?;
        Ok(self.import(entries))
    }

    /// Import a rule set from YAML.
    pub fn import_yaml(&self, content: &str) -> Result<ImportReport> {
        let entries: Vec<RuleImport> = serde_yaml::from_str(content).map_err(|e| {
            FloodgateError::Validation(format!("failed to parse rule set: {}", e))
        })?;
        Ok(self.import(entries))
    }

    /// Export the full rule set as pretty-printed JSON.
    ///
    /// Exports carry rule ids, so exporting and importing the same catalog
    /// is a no-op.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.list())
            .map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Export the full rule set as YAML.
    pub fn export_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.list()).map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Apply a parsed rule set entry by entry.
    ///
    /// A bad entry is reported and skipped; it never aborts the batch.
    fn import(&self, entries: Vec<RuleImport>) -> ImportReport {
        let mut report = ImportReport::default();

        for entry in entries {
            if let Err(e) = entry.spec.validate() {
                report.skipped += 1;
                report
                    .errors
                    .push(format!("{}: {}", entry.spec.resource, e));
                continue;
            }

            match entry.id {
                Some(id) => {
                    let existing = self.get(id);
                    match existing {
                        Some(rule) if rule.spec() == entry.spec => {
                            debug!(rule_id = %id, "Import entry identical to existing rule");
                            report.skipped += 1;
                        }
                        Some(_) => {
                            // Validated above, so update cannot fail here.
                            if self.update(id, entry.spec).is_ok() {
                                report.updated += 1;
                            }
                        }
                        None => {
                            // Preserve the id so export/import round-trips.
                            let mut rule = Rule::from_spec(entry.spec);
                            rule.id = id;
                            self.rules.write().insert(id, Arc::new(rule));
                            report.created += 1;
                        }
                    }
                }
                None => {
                    let duplicate = self
                        .rules
                        .read()
                        .values()
                        .any(|rule| rule.spec() == entry.spec);
                    if duplicate {
                        report.skipped += 1;
                    } else if self.create(entry.spec).is_ok() {
                        report.created += 1;
                    }
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Imported rule set"
        );
        report
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}
