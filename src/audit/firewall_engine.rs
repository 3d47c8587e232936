//! The firewall rules engine.
//!
//! Firewall rule documents differ from the other domains: named rule
//! definitions are composed into groups, and an org policy attaches rule
//! and group ids to points in the resource hierarchy. Evaluation walks a
//! resource's ancestry and applies the first org-policy attachment it
//! finds; nothing above that point is consulted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::audit::errors::AuditError;
use crate::audit::firewall::{FirewallRule, FirewallRuleDef};
use crate::audit::loader;
use crate::audit::rules::{RecommendedActions, RuleMode, Violation, ViolationData};
use crate::resource::{ancestry_chain, AncestryProvider, Resource};

pub const MATCHES_VIOLATION: &str = "FIREWALL_MATCHES_VIOLATION";
pub const REQUIRED_VIOLATION: &str = "FIREWALL_REQUIRED_VIOLATION";
pub const WHITELIST_VIOLATION: &str = "FIREWALL_WHITELIST_VIOLATION";
pub const BLACKLIST_VIOLATION: &str = "FIREWALL_BLACKLIST_VIOLATION";

/// Whitelist: the policy must be covered by at least one verify rule.
pub fn is_whitelist_violation(rules: &[FirewallRule], policy: &FirewallRule) -> bool {
    !rules.iter().any(|rule| policy.covered_by(rule))
}

/// Blacklist: the policy must not contain any forbidden rule.
pub fn is_blacklist_violation(rules: &[FirewallRule], policy: &FirewallRule) -> bool {
    rules.iter().any(|rule| policy.covers(rule))
}

/// Required/matches: the mandated rule must appear among the policies,
/// exactly or (with `exact_match` off) equivalently.
pub fn is_rule_exists_violation(
    rule: &FirewallRule,
    policies: &[FirewallRule],
    exact_match: bool,
) -> bool {
    if exact_match {
        !policies.iter().any(|policy| policy == rule)
    } else {
        !policies.iter().any(|policy| policy.is_equivalent(rule))
    }
}

/// One named rule definition from a firewall rule document.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallPolicyRuleDef {
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub match_policies: Vec<FirewallRuleDef>,
    #[serde(default)]
    pub verify_policies: Vec<FirewallRuleDef>,
    #[serde(default = "default_exact_match")]
    pub exact_match: bool,
}

fn default_exact_match() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupDef {
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub rule_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrgPolicyDef {
    #[serde(default)]
    pub resources: Vec<OrgResourceDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgResourceDef {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub resource_ids: Vec<String>,
    #[serde(default)]
    pub rules: OrgRulesRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrgRulesRef {
    #[serde(default)]
    pub rule_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
}

/// A firewall rule document: rules, groups of rules, and the org policy
/// attaching them to the hierarchy.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallRuleFile {
    #[serde(default)]
    pub rules: Vec<FirewallPolicyRuleDef>,
    #[serde(default)]
    pub rule_groups: Vec<GroupDef>,
    #[serde(default)]
    pub org_policy: OrgPolicyDef,
}

/// One named audit rule: a mode, the policies it matches against, and (for
/// whitelist/blacklist) the policies it verifies with.
#[derive(Debug)]
pub struct FirewallPolicyRule {
    id: String,
    index: usize,
    mode: RuleMode,
    match_rules: Vec<FirewallRule>,
    verify_rules: Vec<FirewallRule>,
    exact_match: bool,
}

impl FirewallPolicyRule {
    pub fn from_def(def: &FirewallPolicyRuleDef, rule_index: usize) -> Result<Self, AuditError> {
        if def.rule_id.is_empty() {
            return Err(AuditError::InvalidRulesSchema(format!(
                "missing rule_id in firewall rule {rule_index}"
            )));
        }
        let mode = RuleMode::verify(&def.mode, rule_index)?;
        match mode {
            RuleMode::Whitelist | RuleMode::Blacklist => {
                if def.match_policies.is_empty() || def.verify_policies.is_empty() {
                    return Err(AuditError::InvalidRulesSchema(format!(
                        "whitelist and blacklist firewall rules require match and verify \
                         policies (rule {rule_index})"
                    )));
                }
            }
            RuleMode::Required | RuleMode::Matches => {
                if def.match_policies.is_empty() {
                    return Err(AuditError::InvalidRulesSchema(format!(
                        "required and matches firewall rules require match policies \
                         (rule {rule_index})"
                    )));
                }
                if !def.verify_policies.is_empty() {
                    return Err(AuditError::InvalidRulesSchema(format!(
                        "required and matches firewall rules cannot have verify policies \
                         (rule {rule_index})"
                    )));
                }
            }
        }

        // Required/matches baselines must be complete rules; match and
        // verify policies for whitelist/blacklist may be partial filters.
        let validate = matches!(mode, RuleMode::Required | RuleMode::Matches);
        let match_rules = def
            .match_policies
            .iter()
            .map(|p| FirewallRule::from_def(p, validate))
            .collect::<Result<Vec<_>, _>>()?;
        let verify_rules = def
            .verify_policies
            .iter()
            .map(|p| FirewallRule::from_def(p, false))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: def.rule_id.clone(),
            index: rule_index,
            mode,
            match_rules,
            verify_rules,
            exact_match: def.exact_match,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    pub fn find_policy_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        match self.mode {
            RuleMode::Matches => self.matches_violations(resource, policies),
            RuleMode::Required => self.required_violations(resource, policies),
            RuleMode::Whitelist => self.whitelist_violations(resource, policies),
            RuleMode::Blacklist => self.blacklist_violations(resource, policies),
        }
    }

    /// MATCHES: the live policies must be exactly the golden set. Missing
    /// golden rules become inserts, unexpected policies become deletes,
    /// names on both sides become updates; one aggregate violation.
    fn matches_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        let mut inserts = BTreeSet::new();
        let mut deletes = BTreeSet::new();
        for (i, rule) in self.match_rules.iter().enumerate() {
            if is_rule_exists_violation(rule, policies, self.exact_match) {
                inserts.insert(format!("{}: rule {}", self.id, i));
            }
        }
        for policy in policies {
            if is_rule_exists_violation(policy, &self.match_rules, self.exact_match) {
                deletes.insert(policy.name().to_string());
            }
        }
        let updates: BTreeSet<String> = inserts.intersection(&deletes).cloned().collect();
        let inserts: Vec<String> = inserts.difference(&updates).cloned().collect();
        let deletes: Vec<String> = deletes.difference(&updates).cloned().collect();
        let updates: Vec<String> = updates.into_iter().collect();

        if inserts.is_empty() && deletes.is_empty() && updates.is_empty() {
            return Vec::new();
        }
        vec![self.violation(
            resource,
            policies,
            MATCHES_VIOLATION,
            RecommendedActions {
                insert_firewall_rules: inserts,
                delete_firewall_rules: deletes,
                update_firewall_rules: updates,
            },
        )]
    }

    /// REQUIRED: every golden rule must exist among the live policies. A
    /// resource with no policies at all still reports the missing rules.
    fn required_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (i, rule) in self.match_rules.iter().enumerate() {
            if is_rule_exists_violation(rule, policies, self.exact_match) {
                violations.push(self.violation(
                    resource,
                    policies,
                    REQUIRED_VIOLATION,
                    RecommendedActions {
                        insert_firewall_rules: vec![format!("{}: rule {}", self.id, i)],
                        ..RecommendedActions::default()
                    },
                ));
            }
        }
        violations
    }

    /// WHITELIST: policies selected by the match rules must each be covered
    /// by some verify rule.
    fn whitelist_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for policy in policies {
            if !self.match_rules.iter().any(|rule| policy.covers(rule)) {
                continue;
            }
            if is_whitelist_violation(&self.verify_rules, policy) {
                violations.push(self.violation(
                    resource,
                    std::slice::from_ref(policy),
                    WHITELIST_VIOLATION,
                    RecommendedActions {
                        delete_firewall_rules: vec![policy.name().to_string()],
                        ..RecommendedActions::default()
                    },
                ));
            }
        }
        violations
    }

    /// BLACKLIST: policies selected by the match rules must not contain a
    /// forbidden verify rule.
    fn blacklist_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for policy in policies {
            if !self.match_rules.iter().any(|rule| policy.covers(rule)) {
                continue;
            }
            if is_blacklist_violation(&self.verify_rules, policy) {
                violations.push(self.violation(
                    resource,
                    std::slice::from_ref(policy),
                    BLACKLIST_VIOLATION,
                    RecommendedActions {
                        delete_firewall_rules: vec![policy.name().to_string()],
                        ..RecommendedActions::default()
                    },
                ));
            }
        }
        violations
    }

    fn violation(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
        violation_type: &str,
        recommended_actions: RecommendedActions,
    ) -> Violation {
        let resource_id = policies
            .iter()
            .map(|p| p.project_id())
            .find(|id| !id.is_empty())
            .unwrap_or(resource.id())
            .to_string();
        Violation {
            resource_type: "firewall_rule".to_string(),
            resource_id,
            full_name: resource.full_name(),
            rule_name: self.id.clone(),
            rule_index: self.index,
            violation_type: violation_type.to_string(),
            data: ViolationData::Firewall {
                policy_names: policies.iter().map(|p| p.name().to_string()).collect(),
                recommended_actions,
            },
        }
    }
}

#[derive(Debug, Default)]
struct BookState {
    rules: BTreeMap<String, Arc<FirewallPolicyRule>>,
    rule_groups: BTreeMap<String, Vec<String>>,
    org_policy: HashMap<Resource, Vec<String>>,
}

/// The firewall rule book: named rules, groups, and the org-policy
/// attachment map. Writes hold the write guard for their full body so
/// layered documents (rules, then groups, then org policy) merge without
/// interleaving.
#[derive(Debug, Default)]
pub struct FirewallRuleBook {
    state: RwLock<BookState>,
}

impl FirewallRuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: &FirewallRuleFile) -> Result<Self, AuditError> {
        let book = Self::new();
        book.add_rules(&file.rules)?;
        book.add_rule_groups(&file.rule_groups)?;
        book.add_org_policy(&file.org_policy)?;
        Ok(book)
    }

    pub fn add_rules(&self, defs: &[FirewallPolicyRuleDef]) -> Result<(), AuditError> {
        let mut state = self.state.write().expect("rule book lock poisoned");
        for (rule_index, def) in defs.iter().enumerate() {
            let rule = FirewallPolicyRule::from_def(def, rule_index)?;
            if state.rules.contains_key(&rule.id) {
                return Err(AuditError::DuplicateFirewallRule(rule.id.clone()));
            }
            state.rules.insert(rule.id.clone(), Arc::new(rule));
        }
        Ok(())
    }

    pub fn add_rule_groups(&self, defs: &[GroupDef]) -> Result<(), AuditError> {
        let mut state = self.state.write().expect("rule book lock poisoned");
        for def in defs {
            if def.group_id.is_empty() {
                return Err(AuditError::InvalidRulesSchema(
                    "firewall group requires a group_id".to_string(),
                ));
            }
            if state.rule_groups.contains_key(&def.group_id) {
                return Err(AuditError::DuplicateFirewallGroup(def.group_id.clone()));
            }
            if def.rule_ids.is_empty() {
                return Err(AuditError::InvalidRulesSchema(format!(
                    "firewall group `{}` does not have any rules",
                    def.group_id
                )));
            }
            for rule_id in &def.rule_ids {
                if !state.rules.contains_key(rule_id) {
                    return Err(AuditError::UnknownFirewallRule(rule_id.clone()));
                }
            }
            state
                .rule_groups
                .insert(def.group_id.clone(), def.rule_ids.clone());
        }
        Ok(())
    }

    /// Attach expanded rule ids to each org-policy resource. Group
    /// references expand to their member rules; the stored list is sorted
    /// and deduplicated.
    pub fn add_org_policy(&self, def: &OrgPolicyDef) -> Result<(), AuditError> {
        let mut state = self.state.write().expect("rule book lock poisoned");
        for resource_def in &def.resources {
            let resource_type = resource_def
                .resource_type
                .parse()
                .map_err(AuditError::InvalidResourceType)?;
            let mut expanded = BTreeSet::new();
            for group_id in &resource_def.rules.group_ids {
                let group = state
                    .rule_groups
                    .get(group_id)
                    .ok_or_else(|| AuditError::UnknownFirewallGroup(group_id.clone()))?;
                expanded.extend(group.iter().cloned());
            }
            for rule_id in &resource_def.rules.rule_ids {
                if !state.rules.contains_key(rule_id) {
                    return Err(AuditError::UnknownFirewallRule(rule_id.clone()));
                }
                expanded.insert(rule_id.clone());
            }
            let expanded: Vec<String> = expanded.into_iter().collect();
            for resource_id in &resource_def.resource_ids {
                state
                    .org_policy
                    .insert(Resource::new(resource_type, resource_id.clone()), expanded.clone());
            }
        }
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.state.read().expect("rule book lock poisoned").rules.len()
    }

    /// Walk the ancestry (self first) and evaluate the rules attached at
    /// the first ancestor carrying an org-policy entry. Only that first
    /// attachment applies.
    pub fn find_violations(
        &self,
        resource: &Resource,
        ancestry: &[Resource],
        policies: &[FirewallRule],
    ) -> Vec<Violation> {
        let state = self.state.read().expect("rule book lock poisoned");
        let mut violations = Vec::new();
        for current in ancestry {
            let Some(rule_ids) = state.org_policy.get(current) else {
                continue;
            };
            for rule_id in rule_ids {
                if let Some(rule) = state.rules.get(rule_id) {
                    violations.extend(rule.find_policy_violations(resource, policies));
                }
            }
            break;
        }
        violations
    }
}

/// Engine façade for firewall auditing.
pub struct FirewallRulesEngine {
    rules_path: PathBuf,
    rule_book: Option<FirewallRuleBook>,
}

impl FirewallRulesEngine {
    pub fn new(rules_path: impl Into<PathBuf>) -> Self {
        Self {
            rules_path: rules_path.into(),
            rule_book: None,
        }
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    pub fn build_rule_book(&mut self) -> Result<(), AuditError> {
        let file: FirewallRuleFile = loader::read_and_parse_file(&self.rules_path)?;
        let book = FirewallRuleBook::from_file(&file)?;
        tracing::info!(
            path = %self.rules_path.display(),
            rules = book.rule_count(),
            "Built firewall rule book"
        );
        self.rule_book = Some(book);
        Ok(())
    }

    pub fn find_violations(
        &self,
        resource: &Resource,
        policies: &[FirewallRule],
        ancestry: &dyn AncestryProvider,
    ) -> Result<Vec<Violation>, AuditError> {
        let book = self
            .rule_book
            .as_ref()
            .ok_or_else(|| AuditError::RuleParse("rule book has not been built".to_string()))?;
        let chain = ancestry_chain(resource, ancestry)?;
        Ok(book.find_violations(resource, &chain, policies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn fw_def(json: serde_json::Value) -> FirewallRuleDef {
        serde_json::from_value(json).unwrap()
    }

    fn fw_rule(json: serde_json::Value) -> FirewallRule {
        FirewallRule::from_def(&fw_def(json), false).unwrap()
    }

    fn ssh_golden() -> serde_json::Value {
        serde_json::json!({
            "name": "allow-ssh",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["1.1.1.1/32"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}]
        })
    }

    fn https_golden() -> serde_json::Value {
        serde_json::json!({
            "name": "allow-443",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}]
        })
    }

    fn matches_rule(exact: bool) -> FirewallPolicyRule {
        FirewallPolicyRule::from_def(
            &FirewallPolicyRuleDef {
                rule_id: "golden".to_string(),
                mode: "matches".to_string(),
                match_policies: vec![fw_def(ssh_golden()), fw_def(https_golden())],
                verify_policies: vec![],
                exact_match: exact,
            },
            0,
        )
        .unwrap()
    }

    fn project() -> Resource {
        Resource::new(ResourceType::Project, "p-1")
    }

    #[test]
    fn test_whitelist_violation_predicate() {
        let verify = vec![fw_rule(serde_json::json!({
            "name": "corp-only",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp"}]
        }))];
        let inside = fw_rule(serde_json::json!({
            "name": "ok",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.1.0.0/16"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}]
        }));
        let outside = fw_rule(serde_json::json!({
            "name": "bad",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}]
        }));
        assert!(!is_whitelist_violation(&verify, &inside));
        assert!(is_whitelist_violation(&verify, &outside));
    }

    #[test]
    fn test_blacklist_violation_predicate() {
        let forbidden = vec![fw_rule(serde_json::json!({
            "name": "no-telnet",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["23"]}]
        }))];
        let open_wide = fw_rule(serde_json::json!({
            "name": "everything",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["1-65535"]}]
        }));
        let narrow = fw_rule(serde_json::json!({
            "name": "ssh-only",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}]
        }));
        assert!(is_blacklist_violation(&forbidden, &open_wide));
        assert!(!is_blacklist_violation(&forbidden, &narrow));
    }

    #[test]
    fn test_rule_exists_equivalence_vs_exact() {
        let golden = fw_rule(serde_json::json!({
            "name": "allow-range",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["1-3"]}]
        }));
        let enumerated = fw_rule(serde_json::json!({
            "name": "allow-range",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["1", "2", "3"]}]
        }));
        let policies = vec![enumerated];
        assert!(is_rule_exists_violation(&golden, &policies, true));
        assert!(!is_rule_exists_violation(&golden, &policies, false));
    }

    #[test]
    fn test_matches_mode_reports_extra_policy_as_delete() {
        // Live has both golden rules plus an extra one: exactly one
        // violation recommending the extra rule's deletion and no inserts.
        let rule = matches_rule(true);
        let policies = vec![
            fw_rule(ssh_golden()),
            fw_rule(https_golden()),
            fw_rule(serde_json::json!({
                "name": "80 from 10.0.0.0/8",
                "network": "default",
                "direction": "INGRESS",
                "sourceRanges": ["10.0.0.0/8"],
                "allowed": [{"IPProtocol": "tcp", "ports": ["80"]}]
            })),
        ];
        let violations = rule.find_policy_violations(&project(), &policies);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, MATCHES_VIOLATION);
        match &violations[0].data {
            ViolationData::Firewall {
                recommended_actions,
                ..
            } => {
                assert!(recommended_actions.insert_firewall_rules.is_empty());
                assert_eq!(
                    recommended_actions.delete_firewall_rules,
                    vec!["80 from 10.0.0.0/8".to_string()]
                );
                assert!(recommended_actions.update_firewall_rules.is_empty());
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn test_matches_mode_reports_missing_policy_as_insert() {
        let rule = matches_rule(true);
        let policies = vec![fw_rule(ssh_golden())];
        let violations = rule.find_policy_violations(&project(), &policies);
        assert_eq!(violations.len(), 1);
        match &violations[0].data {
            ViolationData::Firewall {
                recommended_actions,
                ..
            } => {
                assert_eq!(
                    recommended_actions.insert_firewall_rules,
                    vec!["golden: rule 1".to_string()]
                );
                assert!(recommended_actions.delete_firewall_rules.is_empty());
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn test_matches_mode_passes_on_exact_set() {
        let rule = matches_rule(true);
        let policies = vec![fw_rule(ssh_golden()), fw_rule(https_golden())];
        assert!(rule.find_policy_violations(&project(), &policies).is_empty());
    }

    #[test]
    fn test_required_mode_with_no_policies_still_violates() {
        let rule = FirewallPolicyRule::from_def(
            &FirewallPolicyRuleDef {
                rule_id: "need-ssh".to_string(),
                mode: "required".to_string(),
                match_policies: vec![fw_def(ssh_golden())],
                verify_policies: vec![],
                exact_match: true,
            },
            0,
        )
        .unwrap();
        let violations = rule.find_policy_violations(&project(), &[]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, REQUIRED_VIOLATION);
        assert_eq!(violations[0].resource_id, "p-1");
        match &violations[0].data {
            ViolationData::Firewall {
                recommended_actions,
                ..
            } => {
                assert_eq!(
                    recommended_actions.insert_firewall_rules,
                    vec!["need-ssh: rule 0".to_string()]
                );
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn test_whitelist_and_blacklist_modes_require_verify_policies() {
        let def = FirewallPolicyRuleDef {
            rule_id: "wl".to_string(),
            mode: "whitelist".to_string(),
            match_policies: vec![fw_def(ssh_golden())],
            verify_policies: vec![],
            exact_match: true,
        };
        assert!(matches!(
            FirewallPolicyRule::from_def(&def, 0),
            Err(AuditError::InvalidRulesSchema(_))
        ));
    }

    #[test]
    fn test_matches_mode_rejects_verify_policies() {
        let def = FirewallPolicyRuleDef {
            rule_id: "m".to_string(),
            mode: "matches".to_string(),
            match_policies: vec![fw_def(ssh_golden())],
            verify_policies: vec![fw_def(ssh_golden())],
            exact_match: true,
        };
        assert!(FirewallPolicyRule::from_def(&def, 0).is_err());
    }

    fn sample_file() -> FirewallRuleFile {
        serde_yaml::from_str(
            r#"
rules:
  - rule_id: no-open-ssh
    mode: blacklist
    match_policies:
      - direction: INGRESS
        allowed: '*'
    verify_policies:
      - direction: INGRESS
        sourceRanges: ['0.0.0.0/0']
        allowed:
          - IPProtocol: tcp
            ports: ['22']
rule_groups:
  - group_id: baseline
    rule_ids: [no-open-ssh]
org_policy:
  resources:
    - type: organization
      resource_ids: ['567']
      rules:
        group_ids: [baseline]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_book_applies_first_org_policy_in_ancestry() {
        let book = FirewallRuleBook::from_file(&sample_file()).unwrap();
        let open_ssh = fw_rule(serde_json::json!({
            "name": "open-ssh",
            "projectId": "p-1",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}]
        }));
        let chain = vec![
            Resource::new(ResourceType::Project, "p-1"),
            Resource::new(ResourceType::Organization, "567"),
        ];
        let violations = book.find_violations(&project(), &chain, &[open_ssh]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, BLACKLIST_VIOLATION);
        assert_eq!(violations[0].resource_id, "p-1");
    }

    #[test]
    fn test_duplicate_rule_id_is_rejected() {
        let mut file = sample_file();
        file.rules.push(file.rules[0].clone());
        let err = FirewallRuleBook::from_file(&file).unwrap_err();
        assert!(matches!(err, AuditError::DuplicateFirewallRule(_)));
    }

    #[test]
    fn test_group_referencing_unknown_rule_is_rejected() {
        let mut file = sample_file();
        file.rule_groups[0].rule_ids.push("ghost".to_string());
        let err = FirewallRuleBook::from_file(&file).unwrap_err();
        assert!(matches!(err, AuditError::UnknownFirewallRule(_)));
    }

    #[test]
    fn test_org_policy_referencing_unknown_group_is_rejected() {
        let mut file = sample_file();
        file.org_policy.resources[0]
            .rules
            .group_ids
            .push("ghost".to_string());
        let err = FirewallRuleBook::from_file(&file).unwrap_err();
        assert!(matches!(err, AuditError::UnknownFirewallGroup(_)));
    }

    #[test]
    fn test_ancestor_without_attachment_is_skipped() {
        let book = FirewallRuleBook::from_file(&sample_file()).unwrap();
        // Policy is fine: ssh only from corp space.
        let narrow_ssh = fw_rule(serde_json::json!({
            "name": "corp-ssh",
            "projectId": "p-1",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}]
        }));
        let chain = vec![
            Resource::new(ResourceType::Project, "p-1"),
            Resource::new(ResourceType::Organization, "567"),
        ];
        assert!(book.find_violations(&project(), &chain, &[narrow_ssh]).is_empty());
    }
}
