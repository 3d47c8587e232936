//! The generic rule book: an index from `(resource, applies_to)` to the
//! rules that govern that pair, with ancestry-aware lookup.
//!
//! Construction and lookup follow the same algorithm for every policy
//! domain; the domain plugs in through [`AuditRule`], which parses its own
//! baseline fields and evaluates one rule against live policies.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::audit::errors::AuditError;
use crate::audit::rules::{RuleAppliesTo, RuleDef, RuleMode, Violation};
use crate::resource::Resource;

/// One policy domain's rule: built from a rule definition, evaluated
/// against that domain's live policies.
pub trait AuditRule: Sized {
    /// The live policy primitive this rule is compared against.
    type Policy;
    /// The domain-specific fields of the rule definition.
    type Body: Clone;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError>;

    fn name(&self) -> &str;

    fn index(&self) -> usize;

    /// Evaluate this rule against the live policies of `resource`,
    /// returning the violating subset as violation records.
    fn find_mismatches(&self, resource: &Resource, policies: &[Self::Policy]) -> Vec<Violation>;
}

/// The rules attached to one `(resource, applies_to)` pair.
///
/// Rules are keyed by `(rule_name, rule_index)`, so re-adding the same rule
/// is a no-op and iteration order is deterministic.
pub struct ResourceRules<R> {
    resource: Resource,
    applies_to: RuleAppliesTo,
    inherit_from_parents: bool,
    rules: BTreeMap<(String, usize), Arc<R>>,
}

impl<R: AuditRule> ResourceRules<R> {
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn applies_to(&self) -> RuleAppliesTo {
        self.applies_to
    }

    pub fn inherit_from_parents(&self) -> bool {
        self.inherit_from_parents
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn find_mismatches(&self, resource: &Resource, policies: &[R::Policy]) -> Vec<Violation> {
        self.rules
            .values()
            .flat_map(|rule| rule.find_mismatches(resource, policies))
            .collect()
    }
}

/// Index of rules by `(resource, applies_to)`.
///
/// Writes (`add_rule`/`add_rules`) hold the write guard for their full
/// body: multiple rule documents may be merged into one book, and merges
/// must not interleave. A built book is read-only; evaluation takes the
/// read guard and may run concurrently.
pub struct RuleBook<R: AuditRule> {
    index: RwLock<HashMap<(Resource, RuleAppliesTo), ResourceRules<R>>>,
}

impl<R: AuditRule> Default for RuleBook<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AuditRule> RuleBook<R> {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Build a book from a list of rule definitions. Indexes are assigned
    /// by position.
    pub fn from_defs(defs: &[RuleDef<R::Body>]) -> Result<Self, AuditError> {
        let book = Self::new();
        book.add_rules(defs)?;
        Ok(book)
    }

    pub fn add_rules(&self, defs: &[RuleDef<R::Body>]) -> Result<(), AuditError> {
        for (rule_index, def) in defs.iter().enumerate() {
            self.add_rule(def, rule_index)?;
        }
        Ok(())
    }

    /// Validate one rule definition and index it under every
    /// `(resource, applies_to)` pair it targets. Exactly one rule object is
    /// built per definition and shared across its target resources.
    pub fn add_rule(&self, def: &RuleDef<R::Body>, rule_index: usize) -> Result<(), AuditError> {
        let mut index = self.index.write().expect("rule book lock poisoned");

        let mode = RuleMode::verify(&def.mode, rule_index)?;

        if def.resource.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing resource list in rule {rule_index}"
            )));
        }

        // Validate every selector before touching the index, so a bad rule
        // never leaves a partial entry behind.
        let mut targets = Vec::new();
        for selector in &def.resource {
            let resource_type = selector.resource_type.parse().map_err(|_| {
                AuditError::InvalidRulesSchema(format!(
                    "missing or invalid resource type `{}` in rule {rule_index}",
                    selector.resource_type
                ))
            })?;
            let applies_to = RuleAppliesTo::verify(&selector.applies_to, rule_index)?;
            if selector.resource_ids.is_empty() {
                return Err(AuditError::InvalidRulesSchema(format!(
                    "missing resource ids in rule {rule_index}"
                )));
            }
            for resource_id in &selector.resource_ids {
                targets.push((Resource::new(resource_type, resource_id.clone()), applies_to));
            }
        }

        let rule = Arc::new(R::from_def(def, rule_index, mode)?);

        for (resource, applies_to) in targets {
            let entry = index
                .entry((resource.clone(), applies_to))
                .or_insert_with(|| ResourceRules {
                    resource,
                    applies_to,
                    inherit_from_parents: def.inherit_from_parents,
                    rules: BTreeMap::new(),
                });
            entry
                .rules
                .entry((rule.name().to_string(), rule.index()))
                .or_insert_with(|| Arc::clone(&rule));
        }

        Ok(())
    }

    /// Total number of `(resource, applies_to)` entries.
    pub fn entry_count(&self) -> usize {
        self.index.read().expect("rule book lock poisoned").len()
    }

    /// Walk the ancestry chain (self first) and evaluate every applicable
    /// rule against `policies`.
    ///
    /// At each ancestor, rules are looked up for the concrete resource and
    /// for the `'*'` wildcard of its type, across all three applicability
    /// scopes, then filtered by the scope's meaning relative to the
    /// *original* resource. The walk stops after the first ancestor whose
    /// matching rules carry `inherit_from_parents = false`; ancestors with
    /// no matching rules never stop the walk.
    pub fn find_violations(
        &self,
        resource: &Resource,
        ancestry: &[Resource],
        policies: &[R::Policy],
    ) -> Vec<Violation> {
        let index = self.index.read().expect("rule book lock poisoned");
        let mut violations = Vec::new();

        for current in ancestry {
            let wildcard = Resource::wildcard(current.resource_type());
            let mut inherit_from_parents = None;

            for target in [current, &wildcard] {
                for applies_to in RuleAppliesTo::ALL {
                    let Some(resource_rules) = index.get(&(target.clone(), applies_to)) else {
                        continue;
                    };
                    if !scope_matches(resource, current, applies_to) {
                        continue;
                    }
                    violations.extend(resource_rules.find_mismatches(resource, policies));
                    inherit_from_parents = Some(resource_rules.inherit_from_parents);
                }
            }

            if inherit_from_parents == Some(false) {
                break;
            }
        }

        violations
    }
}

/// SELF applies only at the resource itself, CHILDREN only at proper
/// ancestors, SELF_AND_CHILDREN everywhere.
fn scope_matches(resource: &Resource, current: &Resource, applies_to: RuleAppliesTo) -> bool {
    match applies_to {
        RuleAppliesTo::SelfOnly => resource == current,
        RuleAppliesTo::Children => resource != current,
        RuleAppliesTo::SelfAndChildren => true,
    }
}
