//! Shared rule vocabulary: modes, applicability scopes, the generic rule
//! definition schema, and the violation record every engine produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::errors::AuditError;

/// Comparison semantics of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Whitelist,
    Blacklist,
    Required,
    Matches,
}

impl RuleMode {
    /// Parse a mode string from a rule definition, reporting the offending
    /// rule on failure.
    pub fn verify(mode: &str, rule_index: usize) -> Result<Self, AuditError> {
        match mode {
            "whitelist" => Ok(RuleMode::Whitelist),
            "blacklist" => Ok(RuleMode::Blacklist),
            "required" => Ok(RuleMode::Required),
            "matches" => Ok(RuleMode::Matches),
            other => Err(AuditError::InvalidRulesSchema(format!(
                "invalid mode `{other}` in rule {rule_index}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::Whitelist => "whitelist",
            RuleMode::Blacklist => "blacklist",
            RuleMode::Required => "required",
            RuleMode::Matches => "matches",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resources, relative to the attachment point, a rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAppliesTo {
    SelfOnly,
    Children,
    SelfAndChildren,
}

impl RuleAppliesTo {
    /// All scopes, in the order lookups probe them.
    pub const ALL: [RuleAppliesTo; 3] = [
        RuleAppliesTo::SelfOnly,
        RuleAppliesTo::Children,
        RuleAppliesTo::SelfAndChildren,
    ];

    pub fn verify(applies_to: &str, rule_index: usize) -> Result<Self, AuditError> {
        match applies_to {
            "self" => Ok(RuleAppliesTo::SelfOnly),
            "children" => Ok(RuleAppliesTo::Children),
            "self_and_children" => Ok(RuleAppliesTo::SelfAndChildren),
            other => Err(AuditError::InvalidRulesSchema(format!(
                "invalid applies_to `{other}` in rule {rule_index}"
            ))),
        }
    }
}

/// One `resource:` entry of a rule definition. Fields stay unvalidated
/// strings here; `RuleBook::add_rule` verifies them with the rule index in
/// hand so schema errors can name the offending rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSelector {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default = "default_applies_to")]
    pub applies_to: String,
    #[serde(default)]
    pub resource_ids: Vec<String>,
}

fn default_applies_to() -> String {
    "self".to_string()
}

/// The generic shape of one rule definition; `B` carries the
/// domain-specific baseline fields (IAM bindings, retention days, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef<B> {
    pub name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub resource: Vec<ResourceSelector>,
    #[serde(default)]
    pub inherit_from_parents: bool,
    #[serde(flatten)]
    pub body: B,
}

/// A parsed rule document: a top-level `rules` list.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDocument<B> {
    #[serde(default)]
    pub rules: Vec<RuleDef<B>>,
}

/// Recommended remediation for firewall violations, keyed the way the
/// scanner output reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecommendedActions {
    #[serde(rename = "INSERT_FIREWALL_RULES")]
    pub insert_firewall_rules: Vec<String>,
    #[serde(rename = "DELETE_FIREWALL_RULES")]
    pub delete_firewall_rules: Vec<String>,
    #[serde(rename = "UPDATE_FIREWALL_RULES")]
    pub update_firewall_rules: Vec<String>,
}

impl RecommendedActions {
    pub fn is_empty(&self) -> bool {
        self.insert_firewall_rules.is_empty()
            && self.delete_firewall_rules.is_empty()
            && self.update_firewall_rules.is_empty()
    }
}

/// Domain-specific payload of a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationData {
    Iam {
        role: String,
        members: Vec<String>,
    },
    IamMatches {
        role: String,
        missing_members: Vec<String>,
        extra_members: Vec<String>,
    },
    Firewall {
        policy_names: Vec<String>,
        recommended_actions: RecommendedActions,
    },
    Group {
        members: Vec<String>,
    },
    GroupMatches {
        missing_members: Vec<String>,
        extra_members: Vec<String>,
    },
    Role {
        role: String,
        missing_permissions: Vec<String>,
        extra_permissions: Vec<String>,
    },
    Retention {
        reason: String,
        min_retention_days: Option<u32>,
        max_retention_days: Option<u32>,
    },
    Location {
        location: String,
    },
}

/// An immutable record of one rule mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub resource_type: String,
    pub resource_id: String,
    pub full_name: String,
    pub rule_name: String,
    pub rule_index: usize,
    pub violation_type: String,
    pub data: ViolationData,
}
