//! Resource location auditing.
//!
//! Location rules constrain where data may live: a whitelist rule flags a
//! resource whose locations all fall outside the allowed patterns, a
//! blacklist rule flags one with any location inside the forbidden
//! patterns. Patterns are globs where `*` matches zero or more characters
//! (`us-*`, `europe-west1`).

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::book::AuditRule;
use crate::audit::errors::AuditError;
use crate::audit::glob::glob_to_regex_any;
use crate::audit::rules::{RuleDef, RuleMode, Violation, ViolationData};
use crate::resource::Resource;

pub const VIOLATION_TYPE: &str = "LOCATION_VIOLATION";

/// Baseline fields of a location rule definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationRuleBody {
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug)]
pub struct LocationRule {
    name: String,
    index: usize,
    mode: RuleMode,
    patterns: Vec<Regex>,
}

impl AuditRule for LocationRule {
    type Policy = String;
    type Body = LocationRuleBody;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError> {
        if !matches!(mode, RuleMode::Whitelist | RuleMode::Blacklist) {
            return Err(AuditError::InvalidRulesSchema(format!(
                "location rules support only whitelist and blacklist modes, got `{mode}` \
                 in rule {rule_index}"
            )));
        }
        if def.body.locations.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing locations in rule {rule_index}"
            )));
        }
        let patterns = def
            .body
            .locations
            .iter()
            .map(|l| glob_to_regex_any(l))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LocationRule {
            name: def.name.clone(),
            index: rule_index,
            mode,
            patterns,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.index
    }

    /// `locations` are the audited resource's locations (a bucket has one,
    /// other resource kinds may report several).
    fn find_mismatches(&self, resource: &Resource, locations: &[String]) -> Vec<Violation> {
        if locations.is_empty() {
            return Vec::new();
        }
        let matched: Vec<&String> = locations
            .iter()
            .filter(|loc| self.patterns.iter().any(|p| p.is_match(loc)))
            .collect();

        let offending: Vec<String> = match self.mode {
            RuleMode::Whitelist if matched.is_empty() => locations.to_vec(),
            RuleMode::Blacklist => matched.into_iter().cloned().collect(),
            _ => Vec::new(),
        };

        offending
            .into_iter()
            .map(|location| Violation {
                resource_type: resource.resource_type().to_string(),
                resource_id: resource.id().to_string(),
                full_name: resource.full_name(),
                rule_name: self.name.clone(),
                rule_index: self.index,
                violation_type: VIOLATION_TYPE.to_string(),
                data: ViolationData::Location { location },
            })
            .collect()
    }
}
