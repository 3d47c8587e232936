//! Cloud resource hierarchy model.
//!
//! A [`Resource`] is one node in the provider's hierarchy (organization,
//! folder, project, bucket, ...). Identity is `(type, id)` — two
//! independently constructed values that name the same cloud entity compare
//! equal and hash identically, so they collapse to one key in rule-book
//! indexes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid resource type `{0}`")]
#[diagnostic(
    code(plumbline::resource::invalid_type),
    help("Recognized types: organization, billing_account, folder, project, bucket, group")
)]
pub struct InvalidResourceTypeError(pub String);

/// The resource types rules may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Organization,
    BillingAccount,
    Folder,
    Project,
    Bucket,
    Group,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Organization => "organization",
            ResourceType::BillingAccount => "billing_account",
            ResourceType::Folder => "folder",
            ResourceType::Project => "project",
            ResourceType::Bucket => "bucket",
            ResourceType::Group => "group",
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = InvalidResourceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(ResourceType::Organization),
            "billing_account" => Ok(ResourceType::BillingAccount),
            "folder" => Ok(ResourceType::Folder),
            "project" => Ok(ResourceType::Project),
            "bucket" => Ok(ResourceType::Bucket),
            "group" => Ok(ResourceType::Group),
            other => Err(InvalidResourceTypeError(other.to_string())),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-reported lifecycle state of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "DELETED")]
    Deleted,
    #[default]
    #[serde(rename = "LIFECYCLE_STATE_UNSPECIFIED")]
    Unspecified,
}

/// One node in the cloud resource hierarchy.
///
/// The parent link is optional: inventory data sometimes carries the full
/// chain and sometimes only the node itself, in which case ancestry is
/// resolved through an [`AncestryProvider`].
#[derive(Debug, Clone)]
pub struct Resource {
    id: String,
    resource_type: ResourceType,
    display_name: Option<String>,
    parent: Option<Arc<Resource>>,
    lifecycle_state: LifecycleState,
}

impl Resource {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type,
            display_name: None,
            parent: None,
            lifecycle_state: LifecycleState::Unspecified,
        }
    }

    pub fn with_parent(mut self, parent: Arc<Resource>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_lifecycle_state(mut self, state: LifecycleState) -> Self {
        self.lifecycle_state = state;
        self
    }

    /// The lookup-time sentinel matching every resource of the given type.
    pub fn wildcard(resource_type: ResourceType) -> Self {
        Self::new(resource_type, "*")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<Resource>> {
        self.parent.as_ref()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    /// Hierarchical name built from the materialized parent chain, root
    /// first: `organization/567/folder/f1/project/p1/`.
    pub fn full_name(&self) -> String {
        let mut segments: Vec<String> = self
            .ancestors(true)
            .map(|r| format!("{}/{}/", r.resource_type, r.id))
            .collect();
        segments.reverse();
        segments.concat()
    }

    /// Walk the parent chain, closest first. The chain is acyclic by
    /// construction (parents are immutable once set).
    pub fn ancestors(&self, include_self: bool) -> Ancestors<'_> {
        Ancestors {
            next: if include_self {
                Some(self)
            } else {
                self.parent.as_deref()
            },
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type && self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_type.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Iterator over a resource's materialized parent chain.
pub struct Ancestors<'a> {
    next: Option<&'a Resource>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Resource;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// A reference to a resource by `(type, id)`, as it appears in snapshots
/// and rule documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceRef {
    pub fn to_resource(&self) -> Resource {
        Resource::new(self.resource_type, self.id.clone())
    }
}

impl From<&Resource> for ResourceRef {
    fn from(r: &Resource) -> Self {
        ResourceRef {
            resource_type: r.resource_type(),
            id: r.id().to_string(),
        }
    }
}

/// Resolves a resource's ancestors when parent links are not materialized.
///
/// Implementations: [`MaterializedAncestry`] (pointer walk) and the
/// snapshot-backed index in [`crate::snapshot`].
pub trait AncestryProvider {
    /// Ancestors of `resource`, closest first, excluding the resource
    /// itself.
    fn find_ancestors(&self, resource: &Resource) -> Result<Vec<Resource>, AncestryError>;
}

#[derive(Debug, Error, Diagnostic)]
#[error("No ancestry recorded for {resource_type}/{resource_id}")]
#[diagnostic(
    code(plumbline::resource::ancestry_not_found),
    help("The inventory snapshot does not contain this resource; check that the snapshot covers it")
)]
pub struct AncestryError {
    pub resource_type: ResourceType,
    pub resource_id: String,
}

/// Ancestry via materialized parent pointers.
pub struct MaterializedAncestry;

impl AncestryProvider for MaterializedAncestry {
    fn find_ancestors(&self, resource: &Resource) -> Result<Vec<Resource>, AncestryError> {
        Ok(resource.ancestors(false).cloned().collect())
    }
}

/// The full ancestry chain for `resource`, self first.
///
/// Uses the materialized parent walk when the resource carries parent
/// links, otherwise falls back to the provider.
pub fn ancestry_chain(
    resource: &Resource,
    provider: &dyn AncestryProvider,
) -> Result<Vec<Resource>, AncestryError> {
    if resource.parent().is_some() || resource.resource_type() == ResourceType::Organization {
        Ok(resource.ancestors(true).cloned().collect())
    } else {
        let mut chain = vec![resource.clone()];
        chain.extend(provider.find_ancestors(resource)?);
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn org_folder_project() -> Resource {
        let org = Arc::new(Resource::new(ResourceType::Organization, "567"));
        let folder = Arc::new(Resource::new(ResourceType::Folder, "f-1").with_parent(org));
        Resource::new(ResourceType::Project, "p-1").with_parent(folder)
    }

    #[test]
    fn test_equality_ignores_parent_and_name() {
        let detached = Resource::new(ResourceType::Project, "p-1");
        let attached = org_folder_project();
        assert_eq!(detached, attached);

        let mut set = HashSet::new();
        set.insert(detached);
        assert!(set.contains(&attached));
    }

    #[test]
    fn test_distinct_types_are_distinct_resources() {
        let a = Resource::new(ResourceType::Project, "x");
        let b = Resource::new(ResourceType::Folder, "x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_ancestors_include_self() {
        let project = org_folder_project();
        let chain: Vec<String> = project
            .ancestors(true)
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(chain, vec!["p-1", "f-1", "567"]);
    }

    #[test]
    fn test_ancestors_exclude_self() {
        let project = org_folder_project();
        let chain: Vec<String> = project
            .ancestors(false)
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(chain, vec!["f-1", "567"]);
    }

    #[test]
    fn test_full_name_is_root_first() {
        let project = org_folder_project();
        assert_eq!(
            project.full_name(),
            "organization/567/folder/f-1/project/p-1/"
        );
    }

    #[test]
    fn test_ancestry_chain_prefers_materialized_parents() {
        let project = org_folder_project();
        let chain = ancestry_chain(&project, &MaterializedAncestry).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].id(), "p-1");
        assert_eq!(chain[2].id(), "567");
    }

    #[test]
    fn test_resource_type_round_trip() {
        for s in [
            "organization",
            "billing_account",
            "folder",
            "project",
            "bucket",
            "group",
        ] {
            let t: ResourceType = s.parse().unwrap();
            assert_eq!(t.as_str(), s);
        }
        assert!("universe".parse::<ResourceType>().is_err());
    }
}
