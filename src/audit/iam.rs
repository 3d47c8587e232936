//! IAM policy auditing: member and binding primitives plus the IAM rule
//! domain for the generic rule book.
//!
//! A member is a `type:name` identity. Rule members may use `*` globs in
//! the name; `allUsers` and `allAuthenticatedUsers` are bare sentinel
//! identities that match their own kind. A `domain:example.com` rule
//! member also matches any `user:<name>@example.com`.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::book::AuditRule;
use crate::audit::errors::AuditError;
use crate::audit::glob::glob_to_regex;
use crate::audit::rules::{RuleDef, RuleMode, ViolationData, Violation};
use crate::resource::Resource;

pub const VIOLATION_TYPE: &str = "IAM_POLICY_VIOLATION";

/// The member kinds IAM policies may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    User,
    Group,
    ServiceAccount,
    Domain,
    AllUsers,
    AllAuthenticatedUsers,
}

impl MemberType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MemberType::User),
            "group" => Some(MemberType::Group),
            "serviceAccount" => Some(MemberType::ServiceAccount),
            "domain" => Some(MemberType::Domain),
            "allUsers" => Some(MemberType::AllUsers),
            "allAuthenticatedUsers" => Some(MemberType::AllAuthenticatedUsers),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::User => "user",
            MemberType::Group => "group",
            MemberType::ServiceAccount => "serviceAccount",
            MemberType::Domain => "domain",
            MemberType::AllUsers => "allUsers",
            MemberType::AllAuthenticatedUsers => "allAuthenticatedUsers",
        }
    }
}

/// One identity in a policy binding.
#[derive(Debug, Clone)]
pub struct IamPolicyMember {
    member_type: MemberType,
    name: Option<String>,
    name_pattern: Option<Regex>,
}

impl IamPolicyMember {
    pub fn new(member_type: MemberType, name: Option<&str>) -> Result<Self, AuditError> {
        let name_pattern = match name {
            Some(n) => Some(glob_to_regex(n)?),
            None => None,
        };
        Ok(Self {
            member_type,
            name: name.map(str::to_string),
            name_pattern,
        })
    }

    /// Parse a member identity string, e.g. `user:a@b.com` or the bare
    /// `allUsers` sentinel.
    pub fn create_from(member: &str) -> Result<Self, AuditError> {
        let (type_str, name) = match member.split_once(':') {
            Some((t, n)) => (t, Some(n)),
            None => (member, None),
        };
        let member_type = MemberType::parse(type_str)
            .ok_or_else(|| AuditError::InvalidIamPolicyMember(member.to_string()))?;
        Self::new(member_type, name)
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `domain:example.com` also covers plain users of that domain.
    fn matches_domain(&self, other: &IamPolicyMember) -> bool {
        if self.member_type != MemberType::Domain || other.member_type != MemberType::User {
            return false;
        }
        let (Some(domain), Some(user)) = (&self.name, &other.name) else {
            return false;
        };
        user.rsplit_once('@')
            .map(|(_, d)| d == domain)
            .unwrap_or(false)
    }

    /// Whether `other` (a live policy member) is covered by this member
    /// (typically a rule member, possibly a glob).
    pub fn matches(&self, other: &IamPolicyMember) -> bool {
        match (self.member_type, other.member_type) {
            (MemberType::AllUsers, MemberType::AllUsers) => return true,
            (MemberType::AllAuthenticatedUsers, MemberType::AllAuthenticatedUsers) => {
                return true
            }
            _ => {}
        }

        if self.member_type == other.member_type {
            if let (Some(pattern), Some(other_name)) = (&self.name_pattern, &other.name) {
                if pattern.is_match(other_name) {
                    return true;
                }
            }
        }

        self.matches_domain(other)
    }
}

impl PartialEq for IamPolicyMember {
    fn eq(&self, other: &Self) -> bool {
        self.member_type == other.member_type && self.name == other.name
    }
}

impl Eq for IamPolicyMember {}

impl fmt::Display for IamPolicyMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.member_type.as_str(), name),
            None => f.write_str(self.member_type.as_str()),
        }
    }
}

/// One role-to-members binding of an IAM policy.
#[derive(Debug, Clone)]
pub struct IamPolicyBinding {
    role_name: String,
    members: Vec<IamPolicyMember>,
    role_pattern: Regex,
}

impl IamPolicyBinding {
    pub fn new(role_name: &str, members: &[String]) -> Result<Self, AuditError> {
        if role_name.is_empty() || members.is_empty() {
            return Err(AuditError::InvalidIamPolicyBinding {
                role: role_name.to_string(),
                members: members.to_vec(),
            });
        }
        let parsed = members
            .iter()
            .map(|m| IamPolicyMember::create_from(m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            role_name: role_name.to_string(),
            members: parsed,
            role_pattern: glob_to_regex(role_name)?,
        })
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn members(&self) -> &[IamPolicyMember] {
        &self.members
    }

    /// Whether this binding's role (possibly a glob in rule bindings)
    /// covers the given role name.
    pub fn role_matches(&self, role_name: &str) -> bool {
        self.role_pattern.is_match(role_name)
    }
}

impl PartialEq for IamPolicyBinding {
    fn eq(&self, other: &Self) -> bool {
        self.role_name == other.role_name && self.members == other.members
    }
}

impl Eq for IamPolicyBinding {}

/// Whitelist: every policy member must match some rule member. Returns the
/// policy members with no match.
pub fn check_whitelist_members(
    rule_members: &[IamPolicyMember],
    policy_members: &[IamPolicyMember],
) -> Vec<IamPolicyMember> {
    policy_members
        .iter()
        .filter(|p| !rule_members.iter().any(|r| r.matches(p)))
        .cloned()
        .collect()
}

/// Blacklist: no policy member may match a rule member. Returns the policy
/// members that do.
pub fn check_blacklist_members(
    rule_members: &[IamPolicyMember],
    policy_members: &[IamPolicyMember],
) -> Vec<IamPolicyMember> {
    policy_members
        .iter()
        .filter(|p| rule_members.iter().any(|r| r.matches(p)))
        .cloned()
        .collect()
}

/// Required: every rule member must be present in the policy. Returns the
/// rule members that are not.
pub fn check_required_members(
    rule_members: &[IamPolicyMember],
    policy_members: &[IamPolicyMember],
) -> Vec<IamPolicyMember> {
    rule_members
        .iter()
        .filter(|r| !policy_members.iter().any(|p| r.matches(p)))
        .cloned()
        .collect()
}

/// Baseline fields of an IAM rule definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IamRuleBody {
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingDef {
    pub role: String,
    pub members: Vec<String>,
}

/// One IAM rule: a mode and the baseline bindings it compares against.
#[derive(Debug)]
pub struct IamRule {
    name: String,
    index: usize,
    mode: RuleMode,
    bindings: Vec<IamPolicyBinding>,
}

impl IamRule {
    fn violation(&self, resource: &Resource, role: String, members: &[IamPolicyMember]) -> Violation {
        Violation {
            resource_type: resource.resource_type().to_string(),
            resource_id: resource.id().to_string(),
            full_name: resource.full_name(),
            rule_name: self.name.clone(),
            rule_index: self.index,
            violation_type: VIOLATION_TYPE.to_string(),
            data: ViolationData::Iam {
                role,
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        }
    }

    /// REQUIRED: every rule binding must be satisfied by the policy. A rule
    /// role that never appears in the policy reports all of its members as
    /// outstanding.
    fn check_required(
        &self,
        resource: &Resource,
        policy_bindings: &[IamPolicyBinding],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule_binding in &self.bindings {
            let mut found_role = false;
            let mut outstanding = Vec::new();
            for policy_binding in policy_bindings {
                if !rule_binding.role_matches(policy_binding.role_name()) {
                    continue;
                }
                found_role = true;
                outstanding =
                    check_required_members(rule_binding.members(), policy_binding.members());
                if outstanding.is_empty() {
                    break;
                }
            }
            if !found_role {
                outstanding = rule_binding.members().to_vec();
            }
            if !outstanding.is_empty() {
                violations.push(self.violation(
                    resource,
                    rule_binding.role_name().to_string(),
                    &outstanding,
                ));
            }
        }
        violations
    }

    /// WHITELIST / BLACKLIST: for every policy binding whose role a rule
    /// binding covers, check its members under the rule mode.
    fn check_whitelist_blacklist(
        &self,
        resource: &Resource,
        policy_bindings: &[IamPolicyBinding],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for policy_binding in policy_bindings {
            for rule_binding in &self.bindings {
                if !rule_binding.role_matches(policy_binding.role_name()) {
                    continue;
                }
                let violating = match self.mode {
                    RuleMode::Whitelist => {
                        check_whitelist_members(rule_binding.members(), policy_binding.members())
                    }
                    RuleMode::Blacklist => {
                        check_blacklist_members(rule_binding.members(), policy_binding.members())
                    }
                    _ => unreachable!("dispatched by mode"),
                };
                if !violating.is_empty() {
                    violations.push(self.violation(
                        resource,
                        policy_binding.role_name().to_string(),
                        &violating,
                    ));
                }
            }
        }
        violations
    }

    /// MATCHES: per rule binding, the union of live members under the
    /// covered roles must be exactly the rule's member set. One aggregate
    /// violation lists both sides of the symmetric difference.
    fn check_matches(
        &self,
        resource: &Resource,
        policy_bindings: &[IamPolicyBinding],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule_binding in &self.bindings {
            let mut live: Vec<&IamPolicyMember> = Vec::new();
            for policy_binding in policy_bindings {
                if rule_binding.role_matches(policy_binding.role_name()) {
                    for member in policy_binding.members() {
                        if !live.contains(&member) {
                            live.push(member);
                        }
                    }
                }
            }

            let missing: Vec<String> = rule_binding
                .members()
                .iter()
                .filter(|r| !live.iter().any(|p| r.matches(p)))
                .map(|m| m.to_string())
                .collect();
            let extra: Vec<String> = live
                .iter()
                .filter(|p| !rule_binding.members().iter().any(|r| r.matches(p)))
                .map(|m| m.to_string())
                .collect();

            if !missing.is_empty() || !extra.is_empty() {
                violations.push(Violation {
                    resource_type: resource.resource_type().to_string(),
                    resource_id: resource.id().to_string(),
                    full_name: resource.full_name(),
                    rule_name: self.name.clone(),
                    rule_index: self.index,
                    violation_type: VIOLATION_TYPE.to_string(),
                    data: ViolationData::IamMatches {
                        role: rule_binding.role_name().to_string(),
                        missing_members: missing,
                        extra_members: extra,
                    },
                });
            }
        }
        violations
    }
}

impl AuditRule for IamRule {
    type Policy = IamPolicyBinding;
    type Body = IamRuleBody;

    fn from_def(
        def: &RuleDef<Self::Body>,
        rule_index: usize,
        mode: RuleMode,
    ) -> Result<Self, AuditError> {
        if def.body.bindings.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing bindings in rule {rule_index}"
            )));
        }
        let bindings = def
            .body
            .bindings
            .iter()
            .map(|b| IamPolicyBinding::new(&b.role, &b.members))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                AuditError::InvalidRulesSchema(format!("invalid binding in rule {rule_index}: {e}"))
            })?;
        Ok(IamRule {
            name: def.name.clone(),
            index: rule_index,
            mode,
            bindings,
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
        policy_bindings: &[IamPolicyBinding],
    ) -> Vec<Violation> {
        match self.mode {
            RuleMode::Required => self.check_required(resource, policy_bindings),
            RuleMode::Whitelist | RuleMode::Blacklist => {
                self.check_whitelist_blacklist(resource, policy_bindings)
            }
            RuleMode::Matches => self.check_matches(resource, policy_bindings),
        }
    }
}
