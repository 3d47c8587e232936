//! Scanner passes.
//!
//! Each pass walks one section of the inventory snapshot and feeds the
//! matching engine. Malformed live policies are skipped with a warning —
//! one bad API payload must not abort the whole scan — while rule-document
//! errors always abort, since a scan running with partial rules would
//! silently miss violations.

use crate::audit::engine::RulesEngine;
use crate::audit::errors::AuditError;
use crate::audit::firewall::FirewallRule;
use crate::audit::firewall_engine::FirewallRulesEngine;
use crate::audit::group::GroupRule;
use crate::audit::iam::{IamPolicyBinding, IamPolicyMember, IamRule};
use crate::audit::location::LocationRule;
use crate::audit::retention::RetentionRule;
use crate::audit::role::RoleRule;
use crate::audit::rules::Violation;
use crate::errors::PlumbError;
use crate::settings::Settings;
use crate::snapshot::Snapshot;

pub fn scan_iam_policies(
    engine: &RulesEngine<IamRule>,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for (resource, raw_bindings) in snapshot.iam_policies() {
        let mut bindings = Vec::new();
        for raw in raw_bindings {
            match IamPolicyBinding::new(&raw.role, &raw.members) {
                Ok(binding) => bindings.push(binding),
                Err(error) => {
                    tracing::warn!(
                        resource = %resource,
                        role = %raw.role,
                        %error,
                        "Skipping malformed IAM binding"
                    );
                }
            }
        }
        violations.extend(engine.find_violations(resource, &bindings, snapshot)?);
    }
    Ok(violations)
}

pub fn scan_firewall_policies(
    engine: &FirewallRulesEngine,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for (resource, defs) in snapshot.firewall_policies() {
        let mut policies = Vec::new();
        for def in defs {
            match FirewallRule::from_def(def, false) {
                Ok(rule) => policies.push(rule),
                Err(error) => {
                    tracing::warn!(
                        resource = %resource,
                        %error,
                        "Skipping malformed firewall policy"
                    );
                }
            }
        }
        violations.extend(engine.find_violations(resource, &policies, snapshot)?);
    }
    Ok(violations)
}

pub fn scan_bucket_retention(
    engine: &RulesEngine<RetentionRule>,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for bucket in snapshot.buckets() {
        violations.extend(engine.find_violations(&bucket.resource, &bucket.lifecycle, snapshot)?);
    }
    Ok(violations)
}

pub fn scan_group_members(
    engine: &RulesEngine<GroupRule>,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for group in snapshot.groups() {
        let mut members = Vec::new();
        for spec in &group.members {
            match IamPolicyMember::create_from(spec) {
                Ok(member) => members.push(member),
                Err(error) => {
                    tracing::warn!(
                        group = %group.resource,
                        member = %spec,
                        %error,
                        "Skipping malformed group member"
                    );
                }
            }
        }
        violations.extend(engine.find_violations(&group.resource, &members, snapshot)?);
    }
    Ok(violations)
}

pub fn scan_roles(
    engine: &RulesEngine<RoleRule>,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for (owner, role) in snapshot.roles() {
        violations.extend(engine.find_violations(
            owner,
            std::slice::from_ref(role),
            snapshot,
        )?);
    }
    Ok(violations)
}

pub fn scan_bucket_locations(
    engine: &RulesEngine<LocationRule>,
    snapshot: &Snapshot,
) -> Result<Vec<Violation>, AuditError> {
    let mut violations = Vec::new();
    for bucket in snapshot.buckets() {
        let locations: Vec<String> = bucket.location.iter().cloned().collect();
        violations.extend(engine.find_violations(&bucket.resource, &locations, snapshot)?);
    }
    Ok(violations)
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub snapshot_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub violations: Vec<Violation>,
}

/// Run every pass with a configured rule file against the snapshot.
pub fn run_scan(settings: &Settings) -> Result<ScanOutcome, PlumbError> {
    let snapshot = Snapshot::load(&settings.scanner.snapshot_path)?;
    let mut violations = Vec::new();

    if let Some(path) = &settings.rules.iam_policy {
        let mut engine: RulesEngine<IamRule> = RulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_iam_policies(&engine, &snapshot)?);
    }

    if let Some(path) = &settings.rules.firewall {
        let mut engine = FirewallRulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_firewall_policies(&engine, &snapshot)?);
    }

    if let Some(path) = &settings.rules.retention {
        let mut engine: RulesEngine<RetentionRule> = RulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_bucket_retention(&engine, &snapshot)?);
    }

    if let Some(path) = &settings.rules.location {
        let mut engine: RulesEngine<LocationRule> = RulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_bucket_locations(&engine, &snapshot)?);
    }

    if let Some(path) = &settings.rules.group {
        let mut engine: RulesEngine<GroupRule> = RulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_group_members(&engine, &snapshot)?);
    }

    if let Some(path) = &settings.rules.role {
        let mut engine: RulesEngine<RoleRule> = RulesEngine::new(path);
        engine.build_rule_book()?;
        violations.extend(scan_roles(&engine, &snapshot)?);
    }

    tracing::info!(violations = violations.len(), "Scan complete");
    Ok(ScanOutcome {
        snapshot_timestamp: snapshot.timestamp(),
        violations,
    })
}
