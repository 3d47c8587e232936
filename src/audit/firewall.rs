//! Firewall policy primitives.
//!
//! Unlike IAM members, firewall rules compare by set relationship, not
//! equality: `covered_by` tests whether one rule's traffic is fully
//! contained in another's (direction, network, tags, protocol/port sets,
//! and IP ranges), and `covers` is the mirror. Port specs canonicalize to
//! integer sets, so `ports: ["1", "2", "3"]` and `ports: ["1-3"]` are the
//! same thing.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::audit::errors::AuditError;

/// Traffic direction. Absent in a rule definition means "either".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    fn parse(s: &str) -> Result<Self, AuditError> {
        match s.to_ascii_uppercase().as_str() {
            "INGRESS" => Ok(Direction::Ingress),
            "EGRESS" => Ok(Direction::Egress),
            other => Err(AuditError::InvalidFirewallRule(format!(
                "direction must be ingress or egress, got `{other}`"
            ))),
        }
    }
}

/// Whether an action allows or denies its protocol/port entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Allowed,
    Denied,
}

/// One protocol entry of an allowed/denied list, GCP API shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolPorts {
    #[serde(rename = "IPProtocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// An allowed/denied list: either concrete entries or the `'*'`
/// match-anything sentinel used by verify policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    Any(String),
    Entries(Vec<ProtocolPorts>),
}

/// A canonicalized set of ports. `all`, `0-65535`, and `1-65535` are the
/// match-everything sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSet {
    All,
    Ports(BTreeSet<u16>),
}

impl PortSet {
    pub fn from_specs(specs: &[String]) -> Result<Self, AuditError> {
        if specs
            .iter()
            .any(|s| matches!(s.as_str(), "all" | "0-65535" | "1-65535"))
        {
            return Ok(PortSet::All);
        }
        let mut ports = BTreeSet::new();
        for spec in specs {
            match spec.split_once('-') {
                Some((start, end)) => {
                    let start = parse_port(start)?;
                    let end = parse_port(end)?;
                    if start > end {
                        return Err(AuditError::InvalidFirewallAction(format!(
                            "start port greater than end port in range `{spec}`"
                        )));
                    }
                    ports.extend(start..=end);
                }
                None => {
                    ports.insert(parse_port(spec)?);
                }
            }
        }
        Ok(PortSet::Ports(ports))
    }

    pub fn is_subset(&self, other: &PortSet) -> bool {
        match (self, other) {
            (_, PortSet::All) => true,
            (PortSet::All, PortSet::Ports(_)) => false,
            (PortSet::Ports(a), PortSet::Ports(b)) => a.is_subset(b),
        }
    }
}

fn parse_port(s: &str) -> Result<u16, AuditError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| AuditError::InvalidFirewallAction(format!("invalid port `{s}`")))
}

/// The protocols and ports a firewall rule allows or denies.
#[derive(Debug, Clone)]
pub struct FirewallAction {
    kind: ActionKind,
    /// Raw entries, protocol-sorted, ports sorted by range start. Used for
    /// exact equality and for rendering.
    entries: Vec<ProtocolPorts>,
    /// Protocol name to canonical port set. Empty for `'*'` actions.
    expanded: BTreeMap<String, PortSet>,
    /// The `'*'` sentinel: matches any action of the same kind.
    any_value: bool,
    /// A protocol `all` entry is present.
    applies_to_all: bool,
}

impl FirewallAction {
    pub fn new(kind: ActionKind, spec: &ActionSpec) -> Result<Self, AuditError> {
        match spec {
            ActionSpec::Any(s) if s == "*" => Ok(Self {
                kind,
                entries: Vec::new(),
                expanded: BTreeMap::new(),
                any_value: true,
                applies_to_all: false,
            }),
            ActionSpec::Any(other) => Err(AuditError::InvalidFirewallAction(format!(
                "expected protocol entries or '*', got `{other}`"
            ))),
            ActionSpec::Entries(entries) => {
                let mut entries = entries.clone();
                sort_entries(&mut entries);
                let mut expanded = BTreeMap::new();
                let mut applies_to_all = false;
                for entry in &entries {
                    if entry.protocol == "all" {
                        applies_to_all = true;
                    }
                    let ports = if entry.ports.is_empty() {
                        PortSet::All
                    } else {
                        PortSet::from_specs(&entry.ports)?
                    };
                    match expanded.entry(entry.protocol.clone()) {
                        std::collections::btree_map::Entry::Vacant(v) => {
                            v.insert(ports);
                        }
                        std::collections::btree_map::Entry::Occupied(mut o) => {
                            let merged = match (o.get(), &ports) {
                                (PortSet::All, _) | (_, PortSet::All) => PortSet::All,
                                (PortSet::Ports(a), PortSet::Ports(b)) => {
                                    PortSet::Ports(a.union(b).copied().collect())
                                }
                            };
                            o.insert(merged);
                        }
                    }
                }
                Ok(Self {
                    kind,
                    entries,
                    expanded,
                    any_value: false,
                    applies_to_all,
                })
            }
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn entries(&self) -> &[ProtocolPorts] {
        &self.entries
    }

    /// Ports may only be given for tcp and udp, and every spec must be a
    /// valid port or range.
    pub fn validate(&self) -> Result<(), AuditError> {
        for entry in &self.entries {
            if !entry.ports.is_empty() && !matches!(entry.protocol.as_str(), "tcp" | "udp") {
                return Err(AuditError::InvalidFirewallAction(format!(
                    "only tcp and udp can have ports, got `{}`",
                    entry.protocol
                )));
            }
        }
        Ok(())
    }

    /// Whether this action's traffic is a subset of `other`'s.
    pub fn covered_by(&self, other: &FirewallAction) -> bool {
        self.kind == other.kind
            && (self.any_value
                || other.any_value
                || other.applies_to_all
                || other.expanded.is_empty()
                || self.expanded.iter().all(|(protocol, ports)| {
                    other
                        .expanded
                        .get(protocol)
                        .map(|other_ports| ports.is_subset(other_ports))
                        .unwrap_or(false)
                }))
    }

    /// Whether this action's traffic is a superset of `other`'s.
    pub fn covers(&self, other: &FirewallAction) -> bool {
        other.covered_by(self)
    }

    /// Functional equivalence: same kind and the same canonical
    /// protocol/port sets, regardless of how port specs were written.
    pub fn is_equivalent(&self, other: &FirewallAction) -> bool {
        self.kind == other.kind
            && (self.any_value && other.any_value
                || !self.any_value && !other.any_value && self.expanded == other.expanded)
    }
}

/// Exact equality: kind plus raw (sorted) entries.
impl PartialEq for FirewallAction {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.any_value == other.any_value
            && self.entries == other.entries
    }
}

impl Eq for FirewallAction {}

fn sort_entries(entries: &mut [ProtocolPorts]) {
    for entry in entries.iter_mut() {
        entry.ports.sort_by_key(|p| {
            p.split('-')
                .next()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(u32::MAX)
        });
    }
    entries.sort_by(|a, b| a.protocol.cmp(&b.protocol));
}

/// A firewall rule as it appears in snapshots and rule documents
/// (GCP API field names).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallRuleDef {
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub network: Option<String>,
    pub direction: Option<String>,
    pub priority: Option<u32>,
    pub source_ranges: Vec<String>,
    pub destination_ranges: Vec<String>,
    pub source_tags: Vec<String>,
    pub target_tags: Vec<String>,
    pub source_service_accounts: Vec<String>,
    pub target_service_accounts: Vec<String>,
    pub allowed: Option<ActionSpec>,
    pub denied: Option<ActionSpec>,
}

/// A validated firewall policy primitive.
#[derive(Debug, Clone)]
pub struct FirewallRule {
    name: Option<String>,
    project_id: Option<String>,
    network: Option<String>,
    priority: Option<u32>,
    direction: Option<Direction>,
    source_ranges: BTreeSet<String>,
    destination_ranges: BTreeSet<String>,
    source_tags: BTreeSet<String>,
    target_tags: BTreeSet<String>,
    source_service_accounts: BTreeSet<String>,
    target_service_accounts: BTreeSet<String>,
    action: FirewallAction,
}

impl FirewallRule {
    /// Build from a definition. With `validate`, the rule must be complete
    /// enough to hand to the provider API (required/matches baselines);
    /// without, partial rules are fine (whitelist/blacklist match and
    /// verify policies).
    pub fn from_def(def: &FirewallRuleDef, validate: bool) -> Result<Self, AuditError> {
        let action = match (&def.allowed, &def.denied) {
            (Some(_), Some(_)) => {
                return Err(AuditError::InvalidFirewallRule(
                    "cannot have both allowed and denied entries".to_string(),
                ))
            }
            (Some(spec), None) => FirewallAction::new(ActionKind::Allowed, spec)?,
            (None, Some(spec)) => FirewallAction::new(ActionKind::Denied, spec)?,
            (None, None) => {
                return Err(AuditError::InvalidFirewallRule(
                    "must have allowed or denied entries".to_string(),
                ))
            }
        };

        let direction = def.direction.as_deref().map(Direction::parse).transpose()?;

        let rule = Self {
            name: def.name.clone(),
            project_id: def.project_id.clone(),
            network: def.network.clone(),
            priority: def.priority,
            direction,
            source_ranges: def.source_ranges.iter().cloned().collect(),
            destination_ranges: def.destination_ranges.iter().cloned().collect(),
            source_tags: def.source_tags.iter().cloned().collect(),
            target_tags: def.target_tags.iter().cloned().collect(),
            source_service_accounts: def.source_service_accounts.iter().cloned().collect(),
            target_service_accounts: def.target_service_accounts.iter().cloned().collect(),
            action,
        };
        if validate {
            rule.validate()?;
        }
        Ok(rule)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or("")
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// Effective priority; the provider default is 1000.
    pub fn priority(&self) -> u32 {
        self.priority.unwrap_or(1000)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn action(&self) -> &FirewallAction {
        &self.action
    }

    fn validate(&self) -> Result<(), AuditError> {
        if self.name.is_none() {
            return Err(AuditError::InvalidFirewallRule(
                "missing required field `name`".to_string(),
            ));
        }
        if self.network.is_none() {
            return Err(AuditError::InvalidFirewallRule(
                "missing required field `network`".to_string(),
            ));
        }
        if let Some(priority) = self.priority {
            if priority > 65535 {
                return Err(AuditError::InvalidFirewallRule(format!(
                    "priority out of range 0-65535: {priority}"
                )));
            }
        }
        match self.direction {
            Some(Direction::Ingress) | None => {
                if self.source_ranges.is_empty()
                    && self.source_tags.is_empty()
                    && self.source_service_accounts.is_empty()
                {
                    return Err(AuditError::InvalidFirewallRule(
                        "ingress rule needs sourceRanges, sourceTags, or sourceServiceAccounts"
                            .to_string(),
                    ));
                }
                if !self.destination_ranges.is_empty() {
                    return Err(AuditError::InvalidFirewallRule(
                        "ingress rules cannot include destinationRanges".to_string(),
                    ));
                }
            }
            Some(Direction::Egress) => {
                if self.destination_ranges.is_empty() {
                    return Err(AuditError::InvalidFirewallRule(
                        "egress rule needs destinationRanges".to_string(),
                    ));
                }
                if !self.source_ranges.is_empty() || !self.source_tags.is_empty() {
                    return Err(AuditError::InvalidFirewallRule(
                        "egress rules cannot include sourceRanges or sourceTags".to_string(),
                    ));
                }
            }
        }
        self.action.validate()
    }

    /// Whether this rule's traffic is fully contained in `other`'s
    /// (`self < other` in covering order). Absent direction/network/tags
    /// on `other` act as wildcards.
    pub fn covered_by(&self, other: &FirewallRule) -> bool {
        let direction = self.direction == other.direction
            || self.direction.is_none()
            || other.direction.is_none();
        let network = self.network == other.network || other.network.is_none();
        let source_tags =
            other.source_tags.is_empty() || self.source_tags.is_subset(&other.source_tags);
        let target_tags =
            other.target_tags.is_empty() || self.target_tags.is_subset(&other.target_tags);
        direction
            && network
            && source_tags
            && target_tags
            && self.action.covered_by(&other.action)
            && ips_in_list(&self.source_ranges, &other.source_ranges)
            && ips_in_list(&self.destination_ranges, &other.destination_ranges)
    }

    /// Whether this rule's traffic contains `other`'s (`self > other`).
    pub fn covers(&self, other: &FirewallRule) -> bool {
        let direction = self.direction == other.direction
            || self.direction.is_none()
            || other.direction.is_none();
        let network =
            self.network == other.network || self.network.is_none() || other.network.is_none();
        let source_tags =
            self.source_tags.is_empty() || other.source_tags.is_subset(&self.source_tags);
        let target_tags =
            self.target_tags.is_empty() || other.target_tags.is_subset(&self.target_tags);
        direction
            && network
            && source_tags
            && target_tags
            && self.action.covers(&other.action)
            && ips_in_list(&other.source_ranges, &self.source_ranges)
            && ips_in_list(&other.destination_ranges, &self.destination_ranges)
    }

    /// Functional equivalence: exact fields, with actions compared on
    /// their canonical port sets instead of raw specs.
    pub fn is_equivalent(&self, other: &FirewallRule) -> bool {
        self.comparable_fields() == other.comparable_fields()
            && self.action.is_equivalent(&other.action)
    }

    fn comparable_fields(
        &self,
    ) -> (
        Option<Direction>,
        &Option<String>,
        &BTreeSet<String>,
        &BTreeSet<String>,
        &BTreeSet<String>,
        &BTreeSet<String>,
    ) {
        (
            self.direction,
            &self.network,
            &self.source_tags,
            &self.target_tags,
            &self.source_ranges,
            &self.destination_ranges,
        )
    }
}

/// Exact equality over the comparable fields plus the raw action.
impl PartialEq for FirewallRule {
    fn eq(&self, other: &Self) -> bool {
        self.comparable_fields() == other.comparable_fields() && self.action == other.action
    }
}

impl Eq for FirewallRule {}

/// Whether every IP/range in `ips` is contained in some entry of
/// `ip_list`. Either side being empty means "unconstrained" and passes.
pub fn ips_in_list(ips: &BTreeSet<String>, ip_list: &BTreeSet<String>) -> bool {
    if ips.is_empty() || ip_list.is_empty() {
        return true;
    }
    ips.iter()
        .all(|ip| ip_list.iter().any(|range| ip_in_range(ip, range)))
}

/// Whether `ip` (address or range) is inside `range`.
fn ip_in_range(ip: &str, range: &str) -> bool {
    let (Some((ip_addr, ip_prefix)), Some((range_addr, range_prefix))) =
        (parse_cidr(ip), parse_cidr(range))
    else {
        return false;
    };
    if range_prefix > ip_prefix {
        return false;
    }
    match (ip_addr, range_addr) {
        (IpAddr::V4(a), IpAddr::V4(r)) => mask_v4(a, range_prefix) == mask_v4(r, range_prefix),
        (IpAddr::V6(a), IpAddr::V6(r)) => mask_v6(a, range_prefix) == mask_v6(r, range_prefix),
        _ => false,
    }
}

/// Parse `a.b.c.d` or `a.b.c.d/len`; a bare address is a host route.
fn parse_cidr(s: &str) -> Option<(IpAddr, u8)> {
    match s.split_once('/') {
        Some((addr, len)) => {
            let addr: IpAddr = addr.trim().parse().ok()?;
            let len: u8 = len.trim().parse().ok()?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            (len <= max).then_some((addr, len))
        }
        None => {
            let addr: IpAddr = s.trim().parse().ok()?;
            let len = if addr.is_ipv4() { 32 } else { 128 };
            Some((addr, len))
        }
    }
}

fn mask_v4(addr: Ipv4Addr, prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::from(addr) & (u32::MAX << (32 - u32::from(prefix)))
    }
}

fn mask_v6(addr: Ipv6Addr, prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::from(addr) & (u128::MAX << (128 - u32::from(prefix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_def(json: serde_json::Value) -> FirewallRuleDef {
        serde_json::from_value(json).unwrap()
    }

    fn rule(json: serde_json::Value) -> FirewallRule {
        FirewallRule::from_def(&rule_def(json), false).unwrap()
    }

    fn ssh_from(range: &str) -> FirewallRule {
        rule(serde_json::json!({
            "name": format!("ssh-from-{range}"),
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": [range],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}]
        }))
    }

    #[test]
    fn test_allowed_and_denied_are_mutually_exclusive() {
        let def = rule_def(serde_json::json!({
            "name": "both",
            "allowed": [{"IPProtocol": "tcp"}],
            "denied": [{"IPProtocol": "udp"}]
        }));
        assert!(matches!(
            FirewallRule::from_def(&def, false),
            Err(AuditError::InvalidFirewallRule(_))
        ));

        let neither = rule_def(serde_json::json!({"name": "neither"}));
        assert!(FirewallRule::from_def(&neither, false).is_err());
    }

    #[test]
    fn test_validation_requires_name_network_and_sources() {
        let def = rule_def(serde_json::json!({
            "name": "no-net",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        let err = FirewallRule::from_def(&def, true).unwrap_err();
        assert!(err.to_string().contains("network"));

        let def = rule_def(serde_json::json!({
            "name": "no-src",
            "network": "default",
            "direction": "INGRESS",
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        assert!(FirewallRule::from_def(&def, true).is_err());
    }

    #[test]
    fn test_egress_validation() {
        let def = rule_def(serde_json::json!({
            "name": "egress-ok",
            "network": "default",
            "direction": "EGRESS",
            "destinationRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        assert!(FirewallRule::from_def(&def, true).is_ok());

        let def = rule_def(serde_json::json!({
            "name": "egress-bad",
            "network": "default",
            "direction": "EGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "destinationRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        assert!(FirewallRule::from_def(&def, true).is_err());
    }

    #[test]
    fn test_ports_only_on_tcp_udp() {
        let def = rule_def(serde_json::json!({
            "name": "icmp-ports",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "icmp", "ports": ["22"]}]
        }));
        assert!(matches!(
            FirewallRule::from_def(&def, true),
            Err(AuditError::InvalidFirewallAction(_))
        ));
    }

    #[test]
    fn test_port_canonicalization() {
        let enumerated = PortSet::from_specs(&["1".into(), "2".into(), "3".into()]).unwrap();
        let range = PortSet::from_specs(&["1-3".into()]).unwrap();
        assert_eq!(enumerated, range);
        assert!(enumerated.is_subset(&range));
        assert!(range.is_subset(&enumerated));
    }

    #[test]
    fn test_port_sentinels() {
        for sentinel in ["all", "0-65535", "1-65535"] {
            assert_eq!(
                PortSet::from_specs(&[sentinel.to_string()]).unwrap(),
                PortSet::All
            );
        }
        let some = PortSet::from_specs(&["22".into()]).unwrap();
        assert!(some.is_subset(&PortSet::All));
        assert!(!PortSet::All.is_subset(&some));
    }

    #[test]
    fn test_invalid_port_specs() {
        assert!(PortSet::from_specs(&["a".into()]).is_err());
        assert!(PortSet::from_specs(&["80000".into()]).is_err());
        assert!(PortSet::from_specs(&["30-20".into()]).is_err());
    }

    #[test]
    fn test_ip_in_range() {
        assert!(ip_in_range("1.1.1.1", "0.0.0.0/0"));
        assert!(ip_in_range("1.1.1.1/24", "0.0.0.0/0"));
        assert!(ip_in_range("10.1.2.3", "10.0.0.0/8"));
        assert!(!ip_in_range("0.0.0.0/0", "1.1.1.1"));
        assert!(!ip_in_range("11.0.0.1", "10.0.0.0/8"));
        assert!(!ip_in_range("not-an-ip", "10.0.0.0/8"));
    }

    #[test]
    fn test_ips_in_list() {
        let ips: BTreeSet<String> = ["1.1.1.1".to_string(), "2.2.2.2".to_string()].into();
        let list: BTreeSet<String> = ["1.1.1.0/24".to_string(), "2.2.2.0/24".to_string()].into();
        assert!(ips_in_list(&ips, &list));

        let narrow: BTreeSet<String> = ["1.1.1.0/24".to_string()].into();
        assert!(!ips_in_list(&ips, &narrow));

        // Unconstrained sides pass.
        assert!(ips_in_list(&BTreeSet::new(), &narrow));
        assert!(ips_in_list(&ips, &BTreeSet::new()));
    }

    #[test]
    fn test_covering_relation() {
        let specific = ssh_from("1.1.1.1/32");
        let broad = rule(serde_json::json!({
            "name": "all-tcp",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        assert!(specific.covered_by(&broad));
        assert!(broad.covers(&specific));
        assert!(!broad.covered_by(&specific));
        assert!(!specific.covers(&broad));
    }

    #[test]
    fn test_covering_antisymmetry() {
        // Both directions of covering can only hold for equal rules.
        let a = ssh_from("1.1.1.1/32");
        let b = ssh_from("1.1.1.1/32");
        assert!(a.covered_by(&b) && b.covered_by(&a));
        assert_eq!(a, b);

        let c = ssh_from("10.0.0.0/8");
        assert!(!(a.covered_by(&c) && c.covered_by(&a)));
    }

    #[test]
    fn test_kind_mismatch_never_covers() {
        let allow = ssh_from("1.1.1.1/32");
        let deny = rule(serde_json::json!({
            "name": "deny-ssh",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "denied": [{"IPProtocol": "tcp", "ports": ["22"]}]
        }));
        assert!(!allow.covered_by(&deny));
        assert!(!deny.covers(&allow));
    }

    #[test]
    fn test_absent_network_acts_as_wildcard() {
        let policy = ssh_from("1.1.1.1/32");
        let verify = rule(serde_json::json!({
            "name": "any-net-tcp",
            "direction": "INGRESS",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp"}]
        }));
        assert!(policy.covered_by(&verify));
    }

    #[test]
    fn test_equivalence_expands_port_ranges() {
        let enumerated = rule(serde_json::json!({
            "name": "r",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["1", "2", "3"]}]
        }));
        let ranged = rule(serde_json::json!({
            "name": "r",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["1-3"]}]
        }));
        assert!(enumerated.is_equivalent(&ranged));
        // Exact equality still distinguishes the raw specs.
        assert_ne!(enumerated, ranged);
    }

    #[test]
    fn test_any_action_spec() {
        let any = rule(serde_json::json!({
            "name": "verify-anything",
            "allowed": "*"
        }));
        let concrete = ssh_from("1.1.1.1/32");
        assert!(concrete.action().covered_by(any.action()));
    }

    #[test]
    fn test_tag_subset_rules() {
        let tagged = rule(serde_json::json!({
            "name": "to-web",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "targetTags": ["web"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}]
        }));
        let broader_tags = rule(serde_json::json!({
            "name": "to-web-and-db",
            "network": "default",
            "direction": "INGRESS",
            "sourceRanges": ["10.0.0.0/8"],
            "targetTags": ["web", "db"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}]
        }));
        assert!(tagged.covered_by(&broader_tags));
        assert!(!broader_tags.covered_by(&tagged));
    }
}
