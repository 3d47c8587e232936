//! Inventory snapshots.
//!
//! A snapshot is one JSON file describing what the inventory crawler saw:
//! the resource hierarchy plus the live policies attached to it. Loading a
//! snapshot materializes parent links so ancestry walks need no further
//! lookups, and the snapshot itself serves as the [`AncestryProvider`] for
//! resources that arrive without parent pointers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::audit::firewall::FirewallRuleDef;
use crate::audit::retention::LifecycleRule;
use crate::audit::role::Role;
use crate::resource::{
    AncestryError, AncestryProvider, LifecycleState, Resource, ResourceRef, ResourceType,
};

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("Failed to read snapshot `{path}`")]
    #[diagnostic(
        code(plumbline::snapshot::load),
        help("Check that the snapshot file exists and is readable")
    )]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot: {0}")]
    #[diagnostic(code(plumbline::snapshot::parse))]
    Parse(String),

    #[error("Resource {child} references unknown parent {parent}")]
    #[diagnostic(
        code(plumbline::snapshot::unknown_parent),
        help("Every parent reference must name a resource declared in the snapshot")
    )]
    UnknownParent { child: String, parent: String },

    #[error("Parent cycle detected at {0}")]
    #[diagnostic(code(plumbline::snapshot::parent_cycle))]
    ParentCycle(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub parent: Option<ResourceRef>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub lifecycle_state: LifecycleState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IamPolicyEntry {
    pub resource: ResourceRef,
    #[serde(default)]
    pub bindings: Vec<RawBinding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBinding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirewallPolicyEntry {
    pub resource: ResourceRef,
    #[serde(default)]
    pub rules: Vec<FirewallRuleDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntry {
    pub id: String,
    #[serde(default)]
    pub parent: Option<ResourceRef>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub lifecycle: Vec<LifecycleRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub id: String,
    #[serde(default)]
    pub parent: Option<ResourceRef>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleEntry {
    pub resource: ResourceRef,
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// The snapshot file as written by the inventory crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub snapshot_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub iam_policies: Vec<IamPolicyEntry>,
    #[serde(default)]
    pub firewall_policies: Vec<FirewallPolicyEntry>,
    #[serde(default)]
    pub buckets: Vec<BucketEntry>,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
}

/// A bucket with the posture-relevant parts of its configuration.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub resource: Arc<Resource>,
    pub location: Option<String>,
    pub lifecycle: Vec<LifecycleRule>,
}

/// A group with its member identity strings.
#[derive(Debug, Clone)]
pub struct Group {
    pub resource: Arc<Resource>,
    pub members: Vec<String>,
}

/// A loaded snapshot with materialized resource hierarchy.
#[derive(Debug)]
pub struct Snapshot {
    timestamp: Option<DateTime<Utc>>,
    resources: HashMap<Resource, Arc<Resource>>,
    iam_policies: Vec<(Arc<Resource>, Vec<RawBinding>)>,
    firewall_policies: Vec<(Arc<Resource>, Vec<FirewallRuleDef>)>,
    buckets: Vec<Bucket>,
    groups: Vec<Group>,
    roles: Vec<(Arc<Resource>, Role)>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Load {
            path: path.display().to_string(),
            source,
        })?;
        let file: SnapshotFile =
            serde_json::from_str(&contents).map_err(|e| SnapshotError::Parse(e.to_string()))?;
        let snapshot = Self::from_file(file)?;
        tracing::info!(
            path = %path.display(),
            resources = snapshot.resources.len(),
            iam_policies = snapshot.iam_policies.len(),
            firewall_policies = snapshot.firewall_policies.len(),
            buckets = snapshot.buckets.len(),
            groups = snapshot.groups.len(),
            roles = snapshot.roles.len(),
            "Loaded inventory snapshot"
        );
        Ok(snapshot)
    }

    pub fn from_file(file: SnapshotFile) -> Result<Self, SnapshotError> {
        // Bucket and group entries are hierarchy nodes too; fold them into
        // the resource list before resolving parents.
        let mut entries: Vec<ResourceEntry> = file.resources;
        for bucket in &file.buckets {
            entries.push(ResourceEntry {
                id: bucket.id.clone(),
                resource_type: ResourceType::Bucket,
                parent: bucket.parent.clone(),
                display_name: None,
                lifecycle_state: LifecycleState::Unspecified,
            });
        }
        for group in &file.groups {
            entries.push(ResourceEntry {
                id: group.id.clone(),
                resource_type: ResourceType::Group,
                parent: group.parent.clone(),
                display_name: None,
                lifecycle_state: LifecycleState::Unspecified,
            });
        }

        let by_key: HashMap<Resource, ResourceEntry> = entries
            .iter()
            .map(|e| (Resource::new(e.resource_type, e.id.clone()), e.clone()))
            .collect();

        let mut resolved: HashMap<Resource, Arc<Resource>> = HashMap::new();
        for key in by_key.keys() {
            resolve(key, &by_key, &mut resolved, 0)?;
        }

        let lookup = |r: &ResourceRef| -> Arc<Resource> {
            resolved
                .get(&r.to_resource())
                .cloned()
                .unwrap_or_else(|| Arc::new(r.to_resource()))
        };

        let iam_policies = file
            .iam_policies
            .into_iter()
            .map(|entry| (lookup(&entry.resource), entry.bindings))
            .collect();
        let firewall_policies = file
            .firewall_policies
            .into_iter()
            .map(|entry| (lookup(&entry.resource), entry.rules))
            .collect();
        let buckets = file
            .buckets
            .into_iter()
            .map(|entry| {
                let key = ResourceRef {
                    resource_type: ResourceType::Bucket,
                    id: entry.id.clone(),
                };
                Bucket {
                    resource: lookup(&key),
                    location: entry.location,
                    lifecycle: entry.lifecycle,
                }
            })
            .collect();
        let groups = file
            .groups
            .into_iter()
            .map(|entry| {
                let key = ResourceRef {
                    resource_type: ResourceType::Group,
                    id: entry.id.clone(),
                };
                Group {
                    resource: lookup(&key),
                    members: entry.members,
                }
            })
            .collect();
        let roles = file
            .roles
            .into_iter()
            .map(|entry| {
                let owner = lookup(&entry.resource);
                (
                    owner,
                    Role {
                        id: entry.id,
                        permissions: entry.permissions,
                    },
                )
            })
            .collect();

        Ok(Self {
            timestamp: file.snapshot_timestamp,
            resources: resolved,
            iam_policies,
            firewall_policies,
            buckets,
            groups,
            roles,
        })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// The materialized resource for a reference, if the snapshot saw it.
    pub fn resolve(&self, reference: &ResourceRef) -> Option<Arc<Resource>> {
        self.resources.get(&reference.to_resource()).cloned()
    }

    pub fn iam_policies(&self) -> &[(Arc<Resource>, Vec<RawBinding>)] {
        &self.iam_policies
    }

    pub fn firewall_policies(&self) -> &[(Arc<Resource>, Vec<FirewallRuleDef>)] {
        &self.firewall_policies
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn roles(&self) -> &[(Arc<Resource>, Role)] {
        &self.roles
    }
}

impl AncestryProvider for Snapshot {
    fn find_ancestors(&self, resource: &Resource) -> Result<Vec<Resource>, AncestryError> {
        let materialized =
            self.resources
                .get(resource)
                .ok_or_else(|| AncestryError {
                    resource_type: resource.resource_type(),
                    resource_id: resource.id().to_string(),
                })?;
        Ok(materialized.ancestors(false).cloned().collect())
    }
}

const MAX_HIERARCHY_DEPTH: usize = 64;

fn resolve(
    key: &Resource,
    entries: &HashMap<Resource, ResourceEntry>,
    resolved: &mut HashMap<Resource, Arc<Resource>>,
    depth: usize,
) -> Result<Arc<Resource>, SnapshotError> {
    if let Some(existing) = resolved.get(key) {
        return Ok(Arc::clone(existing));
    }
    if depth > MAX_HIERARCHY_DEPTH {
        return Err(SnapshotError::ParentCycle(key.to_string()));
    }
    let entry = &entries[key];

    let mut resource = Resource::new(entry.resource_type, entry.id.clone())
        .with_lifecycle_state(entry.lifecycle_state);
    if let Some(name) = &entry.display_name {
        resource = resource.with_display_name(name.clone());
    }
    if let Some(parent_ref) = &entry.parent {
        let parent_key = parent_ref.to_resource();
        if !entries.contains_key(&parent_key) {
            return Err(SnapshotError::UnknownParent {
                child: key.to_string(),
                parent: parent_key.to_string(),
            });
        }
        let parent = resolve(&parent_key, entries, resolved, depth + 1)?;
        resource = resource.with_parent(parent);
    }

    let resource = Arc::new(resource);
    resolved.insert(key.clone(), Arc::clone(&resource));
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"
{
  "snapshot_timestamp": "2026-08-01T00:00:00Z",
  "resources": [
    {"id": "567", "type": "organization"},
    {"id": "f-1", "type": "folder", "parent": {"type": "organization", "id": "567"}},
    {"id": "p-1", "type": "project", "parent": {"type": "folder", "id": "f-1"}}
  ],
  "iam_policies": [
    {
      "resource": {"type": "project", "id": "p-1"},
      "bindings": [{"role": "roles/owner", "members": ["user:a@b.com"]}]
    }
  ],
  "buckets": [
    {
      "id": "b-1",
      "parent": {"type": "project", "id": "p-1"},
      "location": "us-east1",
      "lifecycle": [{"action": {"type": "Delete"}, "condition": {"age": 30}}]
    }
  ]
}
"#
    }

    fn sample() -> Snapshot {
        let file: SnapshotFile = serde_json::from_str(sample_json()).unwrap();
        Snapshot::from_file(file).unwrap()
    }

    #[test]
    fn test_parents_are_materialized() {
        let snapshot = sample();
        let project = snapshot
            .resolve(&ResourceRef {
                resource_type: ResourceType::Project,
                id: "p-1".to_string(),
            })
            .unwrap();
        let chain: Vec<String> = project
            .ancestors(true)
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(chain, vec!["p-1", "f-1", "567"]);
    }

    #[test]
    fn test_buckets_join_the_hierarchy() {
        let snapshot = sample();
        assert_eq!(snapshot.buckets().len(), 1);
        let bucket = &snapshot.buckets()[0];
        assert_eq!(bucket.resource.id(), "b-1");
        assert_eq!(
            bucket.resource.full_name(),
            "organization/567/folder/f-1/project/p-1/bucket/b-1/"
        );
        assert_eq!(bucket.location.as_deref(), Some("us-east1"));
        assert_eq!(bucket.lifecycle.len(), 1);
    }

    #[test]
    fn test_ancestry_provider_for_known_resource() {
        let snapshot = sample();
        let detached = Resource::new(ResourceType::Project, "p-1");
        let ancestors = snapshot.find_ancestors(&detached).unwrap();
        let ids: Vec<&str> = ancestors.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["f-1", "567"]);
    }

    #[test]
    fn test_ancestry_provider_errors_on_unknown_resource() {
        let snapshot = sample();
        let ghost = Resource::new(ResourceType::Project, "ghost");
        assert!(snapshot.find_ancestors(&ghost).is_err());
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let file: SnapshotFile = serde_json::from_str(
            r#"{"resources": [{"id": "p-1", "type": "project",
                 "parent": {"type": "folder", "id": "missing"}}]}"#,
        )
        .unwrap();
        let err = Snapshot::from_file(file).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownParent { .. }));
    }

    #[test]
    fn test_parent_cycle_is_rejected() {
        let file: SnapshotFile = serde_json::from_str(
            r#"{"resources": [
                {"id": "a", "type": "folder", "parent": {"type": "folder", "id": "b"}},
                {"id": "b", "type": "folder", "parent": {"type": "folder", "id": "a"}}
            ]}"#,
        )
        .unwrap();
        let err = Snapshot::from_file(file).unwrap_err();
        assert!(matches!(err, SnapshotError::ParentCycle(_)));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let snapshot = sample();
        assert_eq!(
            snapshot.timestamp().unwrap().to_rfc3339(),
            "2026-08-01T00:00:00+00:00"
        );
    }
}
