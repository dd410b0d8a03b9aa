//! Identity tracking for ownerReference rewriting
//!
//! Owner kinds are registered before any of their instances are migrated.
//! Every instance of a registered kind that ends up in the target group
//! (created, or found already there) has its name and target UID recorded,
//! and dependents' ownerReferences are then pointed at those UIDs.

use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use tracing::{debug, info, warn};

use crate::resource::{GroupVersion, ResourceKind};

/// Name and UID of an item known to exist in the target group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Object name
    pub name: String,
    /// UID assigned by the target store
    pub uid: String,
}

impl IdentityRecord {
    /// Capture the identity of an object returned by the target store
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            name: obj.metadata.name.clone().unwrap_or_default(),
            uid: obj.metadata.uid.clone().unwrap_or_default(),
        }
    }
}

/// Per-pass registry of owner kinds and the identities of their migrated instances
#[derive(Debug)]
pub struct IdentityTracker {
    source: String,
    target: String,
    /// Registered owner kinds, keyed by kind label
    resources_by_kind: HashMap<String, ResourceKind>,
    /// kind label -> item name -> identity
    created_by_kind: HashMap<String, HashMap<String, IdentityRecord>>,
}

impl IdentityTracker {
    /// Create a tracker rewriting references from `source` to `target`
    pub fn new(source: &GroupVersion, target: &GroupVersion) -> Self {
        Self {
            source: source.api_version(),
            target: target.api_version(),
            resources_by_kind: HashMap::new(),
            created_by_kind: HashMap::new(),
        }
    }

    /// Start tracking instances of an owner kind.
    ///
    /// Resets any identities already recorded for the kind, so call this
    /// before migrating its instances.
    pub fn register_resource(&mut self, resource: &ResourceKind) {
        debug!(kind = %resource.kind, "Registering resource for ownerRef tracking");
        self.resources_by_kind
            .insert(resource.kind.clone(), resource.clone());
        self.created_by_kind
            .insert(resource.kind.clone(), HashMap::new());
    }

    /// Check if a kind label is tracked
    pub fn is_tracked(&self, kind: &str) -> bool {
        self.resources_by_kind.contains_key(kind)
    }

    /// Look up the recorded identity of a tracked item
    pub fn lookup(&self, kind: &str, name: &str) -> Option<&IdentityRecord> {
        self.created_by_kind.get(kind)?.get(name)
    }

    /// Record an item that now exists in the target group.
    ///
    /// Items of untracked kinds are ignored: nothing can own them through
    /// this tool.
    pub fn register_created_item(&mut self, item: &DynamicObject) {
        let kind = item.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
        let record = IdentityRecord::from_object(item);

        let Some(by_name) = self.created_by_kind.get_mut(kind) else {
            debug!(
                kind = %kind,
                name = %record.name,
                "Not tracking item because it's not listed as a possible ownerRef parent"
            );
            return;
        };

        if record.uid.is_empty() {
            warn!(kind = %kind, name = %record.name, "Tracked item has no UID");
        }

        by_name.entry(record.name.clone()).or_insert(record);
    }

    /// Point ownerReferences to tracked source-group owners at their target-group copies.
    ///
    /// References to other groups or untracked kinds pass through untouched.
    /// A reference to a tracked kind whose owner was never recorded also
    /// passes through, with a warning.
    pub fn update_owner_refs(&self, item: &mut DynamicObject) {
        let Some(owner_refs) = item.metadata.owner_references.take() else {
            return;
        };

        let updated: Vec<OwnerReference> = owner_refs
            .into_iter()
            .map(|owner_ref| self.rewrite_owner_ref(owner_ref))
            .collect();

        item.metadata.owner_references = Some(updated);
    }

    fn rewrite_owner_ref(&self, mut owner_ref: OwnerReference) -> OwnerReference {
        if owner_ref.api_version != self.source {
            debug!(
                owner_kind = %owner_ref.kind,
                owner_name = %owner_ref.name,
                "ownerRef's apiVersion is not the one being migrated, not updating"
            );
            return owner_ref;
        }

        let Some(by_name) = self.created_by_kind.get(&owner_ref.kind) else {
            debug!(
                owner_kind = %owner_ref.kind,
                owner_name = %owner_ref.name,
                "ownerRef's kind is not being tracked, not updating"
            );
            return owner_ref;
        };

        let Some(record) = by_name.get(&owner_ref.name) else {
            warn!(
                owner_kind = %owner_ref.kind,
                owner_name = %owner_ref.name,
                "Unable to update ownerRef because owner was not migrated by this tool"
            );
            return owner_ref;
        };

        info!(
            owner_kind = %owner_ref.kind,
            owner_name = %owner_ref.name,
            uid = %record.uid,
            "Updating ownerRef's apiVersion and UID"
        );
        owner_ref.api_version = self.target.clone();
        owner_ref.uid = record.uid.clone();
        owner_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ObjectMeta, TypeMeta};

    fn object(api_version: &str, kind: &str, name: &str, uid: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: (!uid.is_empty()).then(|| uid.to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    fn owner_ref(api_version: &str, kind: &str, name: &str, uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }
    }

    fn tracker() -> IdentityTracker {
        let mut tracker =
            IdentityTracker::new(&GroupVersion::new("old", "v1"), &GroupVersion::new("new", "v1"));
        tracker.register_resource(&ResourceKind::new("bars", "Bar", true));
        tracker
    }

    #[test]
    fn test_register_created_item_for_tracked_kind() {
        let mut tracker = tracker();
        tracker.register_created_item(&object("new/v1", "Bar", "bar-1", "uid-1"));

        assert_eq!(
            tracker.lookup("Bar", "bar-1"),
            Some(&IdentityRecord {
                name: "bar-1".to_string(),
                uid: "uid-1".to_string()
            })
        );
    }

    #[test]
    fn test_register_created_item_ignores_untracked_kind() {
        let mut tracker = tracker();
        tracker.register_created_item(&object("new/v1", "Foo", "foo-1", "uid-1"));

        assert!(!tracker.is_tracked("Foo"));
        assert!(tracker.lookup("Foo", "foo-1").is_none());
    }

    #[test]
    fn test_first_identity_is_kept() {
        let mut tracker = tracker();
        tracker.register_created_item(&object("new/v1", "Bar", "bar-1", "uid-1"));
        tracker.register_created_item(&object("new/v1", "Bar", "bar-1", "uid-2"));

        assert_eq!(tracker.lookup("Bar", "bar-1").map(|r| r.uid.as_str()), Some("uid-1"));
    }

    #[test]
    fn test_reregistering_resource_clears_identities() {
        let mut tracker = tracker();
        tracker.register_created_item(&object("new/v1", "Bar", "bar-1", "uid-1"));
        tracker.register_resource(&ResourceKind::new("bars", "Bar", true));

        assert!(tracker.is_tracked("Bar"));
        assert!(tracker.lookup("Bar", "bar-1").is_none());
    }

    #[test]
    fn test_update_owner_refs() {
        let mut tracker = tracker();
        tracker.register_created_item(&object("new/v1", "Bar", "bar-1", "new-uid"));

        let mut item = object("old/v1", "Foo", "foo-1", "");
        item.metadata.owner_references = Some(vec![
            owner_ref("old/v1", "Bar", "bar-1", "old-uid"),
            owner_ref("altgroup/v1", "Bar", "bar-1", "alt-uid"),
            owner_ref("old/v1", "Baz", "baz-1", "baz-uid"),
            owner_ref("old/v1", "Bar", "missing", "missing-uid"),
        ]);

        tracker.update_owner_refs(&mut item);

        let refs = item.metadata.owner_references.unwrap();
        assert_eq!(
            refs,
            vec![
                owner_ref("new/v1", "Bar", "bar-1", "new-uid"),
                owner_ref("altgroup/v1", "Bar", "bar-1", "alt-uid"),
                owner_ref("old/v1", "Baz", "baz-1", "baz-uid"),
                owner_ref("old/v1", "Bar", "missing", "missing-uid"),
            ]
        );
    }

    #[test]
    fn test_update_owner_refs_without_refs() {
        let tracker = tracker();
        let mut item = object("old/v1", "Foo", "foo-1", "");

        tracker.update_owner_refs(&mut item);

        assert!(item.metadata.owner_references.is_none());
    }
}
