//! Bucket retention auditing.
//!
//! A retention rule bounds how early or late a bucket's lifecycle
//! configuration may delete objects. Only unconditional age-based Delete
//! rules count toward satisfying a bound; a Delete gated on storage class,
//! liveness, or version count guarantees nothing about retention.

use serde::{Deserialize, Serialize};

use crate::audit::book::AuditRule;
use crate::audit::errors::AuditError;
use crate::audit::rules::{RuleDef, RuleMode, Violation, ViolationData};
use crate::resource::Resource;

pub const VIOLATION_TYPE: &str = "BUCKET_RETENTION_VIOLATION";

/// One bucket lifecycle rule, provider API shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub action: LifecycleAction,
    #[serde(default)]
    pub condition: LifecycleCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleAction {
    #[serde(rename = "type")]
    pub action_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleCondition {
    pub age: Option<u32>,
    pub created_before: Option<String>,
    pub matches_storage_class: Option<Vec<String>>,
    pub num_newer_versions: Option<u32>,
    pub is_live: Option<bool>,
}

impl LifecycleCondition {
    /// Whether the condition constrains anything beyond object age.
    fn has_other_conditions(&self) -> bool {
        self.created_before.is_some()
            || self.matches_storage_class.is_some()
            || self.num_newer_versions.is_some()
            || self.is_live.is_some()
    }
}

/// Baseline fields of a retention rule definition, in days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionRuleBody {
    #[serde(default)]
    pub minimum_retention: Option<u32>,
    #[serde(default)]
    pub maximum_retention: Option<u32>,
}

#[derive(Debug)]
pub struct RetentionRule {
    name: String,
    index: usize,
    minimum_retention: Option<u32>,
    maximum_retention: Option<u32>,
}

impl RetentionRule {
    fn violation(&self, resource: &Resource, reason: String) -> Violation {
        Violation {
            resource_type: resource.resource_type().to_string(),
            resource_id: resource.id().to_string(),
            full_name: resource.full_name(),
            rule_name: self.name.clone(),
            rule_index: self.index,
            violation_type: VIOLATION_TYPE.to_string(),
            data: ViolationData::Retention {
                reason,
                min_retention_days: self.minimum_retention,
                max_retention_days: self.maximum_retention,
            },
        }
    }
}

impl AuditRule for RetentionRule {
    type Policy = LifecycleRule;
    type Body = RetentionRuleBody;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError> {
        // Retention bounds have one meaning; the only accepted mode is
        // `required`.
        if mode != RuleMode::Required {
            return Err(AuditError::InvalidRulesSchema(format!(
                "retention rules only support mode `required`, got `{mode}` in rule {rule_index}"
            )));
        }
        let (min, max) = (def.body.minimum_retention, def.body.maximum_retention);
        if min.is_none() && max.is_none() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing minimum and maximum retention in rule {rule_index}"
            )));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(AuditError::InvalidRulesSchema(format!(
                    "minimum_retention larger than maximum_retention in rule {rule_index}"
                )));
            }
        }
        Ok(RetentionRule {
            name: def.name.clone(),
            index: rule_index,
            minimum_retention: min,
            maximum_retention: max,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.index
    }

    fn find_mismatches(
        &self,
        resource: &Resource,
        lifecycle: &[LifecycleRule],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut satisfying_delete = false;

        for item in lifecycle {
            if item.action.action_type != "Delete" {
                continue;
            }
            let Some(age) = item.condition.age else {
                continue;
            };
            if let Some(min) = self.minimum_retention {
                if age < min {
                    violations.push(self.violation(
                        resource,
                        format!("lifecycle deletes at age {age}, below the minimum retention"),
                    ));
                    continue;
                }
            }
            if let Some(max) = self.maximum_retention {
                if age > max {
                    violations.push(self.violation(
                        resource,
                        format!("lifecycle deletes at age {age}, above the maximum retention"),
                    ));
                    continue;
                }
            }
            if !item.condition.has_other_conditions() {
                satisfying_delete = true;
            }
        }

        if self.maximum_retention.is_some() && !satisfying_delete {
            violations.push(self.violation(
                resource,
                "no unconditional delete guarantees the maximum retention".to_string(),
            ));
        }

        violations
    }
}
