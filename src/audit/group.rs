//! Group membership auditing.
//!
//! Group rules constrain who may belong to a group. Members carry the same
//! `type:name` identities as IAM policy members, so the member primitives
//! and comparison routines are shared with the IAM domain.

use serde::{Deserialize, Serialize};

use crate::audit::book::AuditRule;
use crate::audit::errors::AuditError;
use crate::audit::iam::{
    check_blacklist_members, check_required_members, check_whitelist_members, IamPolicyMember,
};
use crate::audit::rules::{RuleDef, RuleMode, Violation, ViolationData};
use crate::resource::Resource;

pub const VIOLATION_TYPE: &str = "GROUP_VIOLATION";

/// Baseline fields of a group rule definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRuleBody {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug)]
pub struct GroupRule {
    name: String,
    index: usize,
    mode: RuleMode,
    members: Vec<IamPolicyMember>,
}

impl AuditRule for GroupRule {
    type Policy = IamPolicyMember;
    type Body = GroupRuleBody;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError> {
        if def.body.members.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing members in rule {rule_index}"
            )));
        }
        let members = def
            .body
            .members
            .iter()
            .map(|m| IamPolicyMember::create_from(m))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                AuditError::InvalidRulesSchema(format!("invalid member in rule {rule_index}: {e}"))
            })?;
        Ok(GroupRule {
            name: def.name.clone(),
            index: rule_index,
            mode,
            members,
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
        group_members: &[IamPolicyMember],
    ) -> Vec<Violation> {
        let header = |data: ViolationData| Violation {
            resource_type: resource.resource_type().to_string(),
            resource_id: resource.id().to_string(),
            full_name: resource.full_name(),
            rule_name: self.name.clone(),
            rule_index: self.index,
            violation_type: VIOLATION_TYPE.to_string(),
            data,
        };

        match self.mode {
            RuleMode::Whitelist | RuleMode::Blacklist | RuleMode::Required => {
                let violating = match self.mode {
                    RuleMode::Whitelist => check_whitelist_members(&self.members, group_members),
                    RuleMode::Blacklist => check_blacklist_members(&self.members, group_members),
                    RuleMode::Required => check_required_members(&self.members, group_members),
                    _ => unreachable!("dispatched by mode"),
                };
                if violating.is_empty() {
                    return Vec::new();
                }
                vec![header(ViolationData::Group {
                    members: violating.iter().map(|m| m.to_string()).collect(),
                })]
            }
            RuleMode::Matches => {
                let missing: Vec<String> = self
                    .members
                    .iter()
                    .filter(|r| !group_members.iter().any(|m| r.matches(m)))
                    .map(|m| m.to_string())
                    .collect();
                let extra: Vec<String> = group_members
                    .iter()
                    .filter(|m| !self.members.iter().any(|r| r.matches(m)))
                    .map(|m| m.to_string())
                    .collect();
                if missing.is_empty() && extra.is_empty() {
                    return Vec::new();
                }
                vec![header(ViolationData::GroupMatches {
                    missing_members: missing,
                    extra_members: extra,
                })]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::rules::ResourceSelector;
    use crate::resource::ResourceType;

    fn group_def(mode: &str, members: &[&str]) -> RuleDef<GroupRuleBody> {
        RuleDef {
            name: "group membership".to_string(),
            mode: mode.to_string(),
            resource: vec![ResourceSelector {
                resource_type: "group".to_string(),
                applies_to: "self".to_string(),
                resource_ids: vec!["*".to_string()],
            }],
            inherit_from_parents: false,
            body: GroupRuleBody {
                members: members.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn rule(mode: &str, members: &[&str]) -> GroupRule {
        let def = group_def(mode, members);
        let parsed = RuleMode::verify(mode, 0).unwrap();
        GroupRule::from_def(&def, 0, parsed).unwrap()
    }

    fn group() -> Resource {
        Resource::new(ResourceType::Group, "engineers@company.com")
    }

    fn members(specs: &[&str]) -> Vec<IamPolicyMember> {
        specs
            .iter()
            .map(|s| IamPolicyMember::create_from(s).unwrap())
            .collect()
    }

    #[test]
    fn test_whitelist_flags_external_member() {
        let r = rule("whitelist", &["user:*@company.com", "group:*@company.com"]);
        let violations = r.find_mismatches(
            &group(),
            &members(&["user:in@company.com", "user:out@other.com"]),
        );
        assert_eq!(violations.len(), 1);
        match &violations[0].data {
            ViolationData::Group { members } => {
                assert_eq!(members, &vec!["user:out@other.com".to_string()]);
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn test_blacklist_flags_forbidden_member() {
        let r = rule("blacklist", &["user:*@contractor.com"]);
        let violations =
            r.find_mismatches(&group(), &members(&["user:x@contractor.com", "user:y@company.com"]));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_required_member_must_be_present() {
        let r = rule("required", &["user:security-bot@company.com"]);
        let violations = r.find_mismatches(&group(), &members(&["user:dev@company.com"]));
        assert_eq!(violations.len(), 1);
        match &violations[0].data {
            ViolationData::Group { members } => {
                assert_eq!(members, &vec!["user:security-bot@company.com".to_string()]);
            }
            other => panic!("unexpected data: {other:?}"),
        }

        assert!(r
            .find_mismatches(&group(), &members(&["user:security-bot@company.com"]))
            .is_empty());
    }

    #[test]
    fn test_matches_reports_both_sides() {
        let r = rule("matches", &["user:a@company.com", "user:b@company.com"]);
        let violations =
            r.find_mismatches(&group(), &members(&["user:a@company.com", "user:c@company.com"]));
        assert_eq!(violations.len(), 1);
        match &violations[0].data {
            ViolationData::GroupMatches {
                missing_members,
                extra_members,
            } => {
                assert_eq!(missing_members, &vec!["user:b@company.com".to_string()]);
                assert_eq!(extra_members, &vec!["user:c@company.com".to_string()]);
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn test_empty_members_is_schema_error() {
        let def = group_def("whitelist", &[]);
        assert!(GroupRule::from_def(&def, 0, RuleMode::Whitelist).is_err());
    }

    #[test]
    fn test_bad_member_spec_is_schema_error() {
        let def = group_def("whitelist", &["martian:x@y.z"]);
        let err = GroupRule::from_def(&def, 4, RuleMode::Whitelist).unwrap_err();
        assert!(err.to_string().contains("rule 4"));
    }
}
