//! Custom role permission auditing.
//!
//! A role rule pins the permission set of roles whose id matches the
//! rule's `role_id` glob. Permissions are opaque case-sensitive strings;
//! comparison is plain set algebra, no covering relation involved.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::book::AuditRule;
use crate::audit::errors::AuditError;
use crate::audit::glob::glob_to_regex;
use crate::audit::rules::{RuleDef, RuleMode, Violation, ViolationData};
use crate::resource::Resource;

pub const VIOLATION_TYPE: &str = "ROLE_PERMISSION_VIOLATION";

/// A role with its granted permissions, as inventoried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Baseline fields of a role rule definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRuleBody {
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug)]
pub struct RoleRule {
    name: String,
    index: usize,
    mode: RuleMode,
    role_pattern: Regex,
    permissions: BTreeSet<String>,
}

impl RoleRule {
    fn violation(
        &self,
        resource: &Resource,
        role: &Role,
        missing: Vec<String>,
        extra: Vec<String>,
    ) -> Violation {
        Violation {
            resource_type: resource.resource_type().to_string(),
            resource_id: resource.id().to_string(),
            full_name: resource.full_name(),
            rule_name: self.name.clone(),
            rule_index: self.index,
            violation_type: VIOLATION_TYPE.to_string(),
            data: ViolationData::Role {
                role: role.id.clone(),
                missing_permissions: missing,
                extra_permissions: extra,
            },
        }
    }
}

impl AuditRule for RoleRule {
    type Policy = Role;
    type Body = RoleRuleBody;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError> {
        if def.body.role_id.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing role_id in rule {rule_index}"
            )));
        }
        if def.body.permissions.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing permissions in rule {rule_index}"
            )));
        }
        Ok(RoleRule {
            name: def.name.clone(),
            index: rule_index,
            mode,
            role_pattern: glob_to_regex(&def.body.role_id)?,
            permissions: def.body.permissions.iter().cloned().collect(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.index
    }

    fn find_mismatches(&self, resource: &Resource, roles: &[Role]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for role in roles {
            if !self.role_pattern.is_match(&role.id) {
                continue;
            }
            let granted: BTreeSet<String> = role.permissions.iter().cloned().collect();
            let missing: Vec<String> = self.permissions.difference(&granted).cloned().collect();
            let extra: Vec<String> = granted.difference(&self.permissions).cloned().collect();
            let forbidden: Vec<String> =
                granted.intersection(&self.permissions).cloned().collect();

            let violation = match self.mode {
                // No permission outside the baseline.
                RuleMode::Whitelist if !extra.is_empty() => {
                    Some(self.violation(resource, role, Vec::new(), extra))
                }
                // No baseline permission may be granted.
                RuleMode::Blacklist if !forbidden.is_empty() => {
                    Some(self.violation(resource, role, Vec::new(), forbidden))
                }
                // Every baseline permission must be granted.
                RuleMode::Required if !missing.is_empty() => {
                    Some(self.violation(resource, role, missing, Vec::new()))
                }
                // The permission sets must be identical.
                RuleMode::Matches if !missing.is_empty() || !extra.is_empty() => {
                    Some(self.violation(resource, role, missing, extra))
                }
                _ => None,
            };
            violations.extend(violation);
        }
        violations
    }
}
