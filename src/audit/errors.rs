use miette::Diagnostic;
use thiserror::Error;

use crate::resource::{AncestryError, InvalidResourceTypeError};

#[derive(Debug, Error, Diagnostic)]
pub enum AuditError {
    #[error("Failed to load rule file `{path}`")]
    #[diagnostic(
        code(plumbline::audit::rule_file_load),
        help("Check that the file exists and is readable")
    )]
    RuleFileLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported rule file format `{0}`")]
    #[diagnostic(
        code(plumbline::audit::unsupported_rule_format),
        help("Rule documents must be .yaml, .yml, or .json")
    )]
    UnsupportedRuleFormat(String),

    #[error("Failed to parse rule document: {0}")]
    #[diagnostic(
        code(plumbline::audit::rule_parse),
        help("The document must contain a top-level `rules` list; see the rules reference")
    )]
    RuleParse(String),

    #[error("Invalid rules schema: {0}")]
    #[diagnostic(
        code(plumbline::audit::invalid_rules_schema),
        help("Each rule needs a recognized mode, a non-empty resource list with type and resource_ids, and its domain fields")
    )]
    InvalidRulesSchema(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidResourceType(#[from] InvalidResourceTypeError),

    #[error("Invalid IAM policy binding: role={role}, members={members:?}")]
    #[diagnostic(
        code(plumbline::audit::invalid_iam_binding),
        help("A binding requires a role name and at least one member")
    )]
    InvalidIamPolicyBinding { role: String, members: Vec<String> },

    #[error("Invalid IAM policy member `{0}`")]
    #[diagnostic(
        code(plumbline::audit::invalid_iam_member),
        help("Members look like `user:name@example.com`; bare `allUsers` and `allAuthenticatedUsers` are also accepted")
    )]
    InvalidIamPolicyMember(String),

    #[error("Invalid firewall rule: {0}")]
    #[diagnostic(code(plumbline::audit::invalid_firewall_rule))]
    InvalidFirewallRule(String),

    #[error("Invalid firewall action: {0}")]
    #[diagnostic(
        code(plumbline::audit::invalid_firewall_action),
        help("An action is `allowed` or `denied` entries of protocol plus optional ports; only tcp and udp take ports")
    )]
    InvalidFirewallAction(String),

    #[error("Duplicate firewall rule id `{0}`")]
    #[diagnostic(
        code(plumbline::audit::duplicate_firewall_rule),
        help("Rule ids must be unique within one rule document")
    )]
    DuplicateFirewallRule(String),

    #[error("Duplicate firewall group id `{0}`")]
    #[diagnostic(code(plumbline::audit::duplicate_firewall_group))]
    DuplicateFirewallGroup(String),

    #[error("Firewall rule id `{0}` does not exist")]
    #[diagnostic(
        code(plumbline::audit::unknown_firewall_rule),
        help("Groups and org policies may only reference rule ids defined under `rules`")
    )]
    UnknownFirewallRule(String),

    #[error("Firewall group id `{0}` does not exist")]
    #[diagnostic(code(plumbline::audit::unknown_firewall_group))]
    UnknownFirewallGroup(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ancestry(#[from] AncestryError),
}
