//! The rule evaluation engine family.
//!
//! Every policy domain follows the same shape: a rule document is parsed
//! ([`loader`]) and compiled into a rule book indexed by resource and
//! applicability scope ([`book`]); evaluation walks a resource's ancestry
//! to collect the applicable rules and compares the resource's live
//! policies against each one under the rule's mode ([`rules::RuleMode`]).
//! The IAM, group, role, retention, and location domains plug into the
//! generic book; firewall auditing has its own book shape
//! ([`firewall_engine`]) because its rules are named, grouped, and
//! attached through an org policy.

pub mod book;
pub mod engine;
pub mod errors;
pub mod firewall;
pub mod firewall_engine;
pub mod glob;
pub mod group;
pub mod iam;
pub mod loader;
pub mod location;
pub mod retention;
pub mod role;
pub mod rules;
