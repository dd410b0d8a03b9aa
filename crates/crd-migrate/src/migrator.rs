//! Migration pass orchestration
//!
//! A pass copies every instance of every kind served by the source
//! group/version into the target group/version:
//!
//! 1. Discover the kinds served by the source group/version
//! 2. Order the owner mapping's kinds (owners before dependents)
//! 3. Check every ordered kind exists; abort before writing anything if not
//! 4. Migrate ordered kinds, registering owner kinds for identity tracking
//!    before their instances are migrated
//! 5. Migrate the remaining kinds in discovery order
//!
//! Per item: skip (recording its identity) if it already exists in the target
//! group, otherwise rewrite apiVersion/namespace/keys/ownerReferences and
//! create it. Kind- and item-level failures are logged and reported; a later
//! pass retries them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use kube::api::DynamicObject;
use kube::core::TypeMeta;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::client::{has_status_subresource, DefinitionSource, ResourceDiscovery, ResourceStore};
use crate::error::Error;
use crate::graph::DependencyGraph;
use crate::mapping::{KeyMapper, NamespaceMapper};
use crate::resource::{GroupVersion, ResourceKind};
use crate::tracker::IdentityTracker;

/// Configuration for a Migrator
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Group/version instances are copied from
    pub source: GroupVersion,
    /// Group/version instances are copied to
    pub target: GroupVersion,
    /// Source namespace -> target namespace
    pub namespace_mappings: NamespaceMapper,
    /// Substring rewrites applied to label keys
    pub label_mappings: KeyMapper,
    /// Substring rewrites applied to annotation keys
    pub annotation_mappings: KeyMapper,
    /// (owner, dependent) pairs of plural resource names
    pub owner_mappings: Vec<(String, String)>,
    /// Restrict migration to these plural resource names
    pub resources: Option<BTreeSet<String>>,
}

impl MigratorConfig {
    /// Create a config with no mappings and no resource filter
    pub fn new(source: GroupVersion, target: GroupVersion) -> Self {
        Self {
            source,
            target,
            namespace_mappings: NamespaceMapper::default(),
            label_mappings: KeyMapper::default(),
            annotation_mappings: KeyMapper::default(),
            owner_mappings: Vec::new(),
            resources: None,
        }
    }

    /// Set namespace mappings
    pub fn with_namespace_mappings(mut self, pairs: Vec<(String, String)>) -> Self {
        self.namespace_mappings = NamespaceMapper::new(pairs);
        self
    }

    /// Set label key mappings
    pub fn with_label_mappings(mut self, pairs: Vec<(String, String)>) -> Self {
        self.label_mappings = KeyMapper::new(pairs);
        self
    }

    /// Set annotation key mappings
    pub fn with_annotation_mappings(mut self, pairs: Vec<(String, String)>) -> Self {
        self.annotation_mappings = KeyMapper::new(pairs);
        self
    }

    /// Set owner -> dependent resource mappings
    pub fn with_owner_mappings(mut self, pairs: Vec<(String, String)>) -> Self {
        self.owner_mappings = pairs;
        self
    }

    /// Restrict migration to the given resources
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = String>) -> Self {
        self.resources = Some(resources.into_iter().collect());
        self
    }

    fn is_included(&self, resource: &str) -> bool {
        self.resources
            .as_ref()
            .is_none_or(|set| set.contains(resource))
    }
}

/// Terminal state of a single item within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Found in the target group; nothing was written
    AlreadyExists,
    /// Created in the target group
    Created,
    /// Existence check or create failed; retried on the next pass
    Failed,
}

impl ItemOutcome {
    /// Whether the item's identity was recorded for ownerRef rewriting
    pub fn registers_identity(&self) -> bool {
        matches!(self, ItemOutcome::AlreadyExists | ItemOutcome::Created)
    }
}

/// Outcome of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Plural resource name
    pub resource: String,
    /// Target namespace (empty for cluster-scoped)
    pub namespace: String,
    /// Item name
    pub name: String,
    /// Terminal state
    pub outcome: ItemOutcome,
}

/// A kind that was not migrated during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedResource {
    /// Plural resource name
    pub resource: String,
    /// Why it was skipped
    pub reason: String,
}

/// Summary of a migration pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Every item visited, in processing order
    pub items: Vec<ItemReport>,
    /// Kinds skipped because of a precondition or listing failure
    pub skipped: Vec<SkippedResource>,
}

impl PassReport {
    fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }

    /// Number of items created
    pub fn created(&self) -> usize {
        self.count(ItemOutcome::Created)
    }

    /// Number of items that already existed
    pub fn existing(&self) -> usize {
        self.count(ItemOutcome::AlreadyExists)
    }

    /// Number of items that failed
    pub fn failed(&self) -> usize {
        self.count(ItemOutcome::Failed)
    }

    /// True when no item failed and no kind was skipped
    pub fn is_complete(&self) -> bool {
        self.failed() == 0 && self.skipped.is_empty()
    }
}

/// Order the kinds named in the owner mapping, owners first
pub fn resource_priorities(owner_mappings: &[(String, String)]) -> Result<Vec<String>, Error> {
    DependencyGraph::from_edges(owner_mappings).sort()
}

/// Copies instances of custom resources from one API group to another
pub struct Migrator<D, S, C>
where
    D: ResourceDiscovery,
    S: ResourceStore,
    C: DefinitionSource,
{
    config: MigratorConfig,
    discovery: Arc<D>,
    store: Arc<S>,
    definitions: Arc<C>,
}

impl<D, S, C> Migrator<D, S, C>
where
    D: ResourceDiscovery,
    S: ResourceStore,
    C: DefinitionSource,
{
    /// Create a new Migrator
    pub fn new(
        config: MigratorConfig,
        discovery: Arc<D>,
        store: Arc<S>,
        definitions: Arc<C>,
    ) -> Self {
        Self {
            config,
            discovery,
            store,
            definitions,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Run one full migration pass.
    ///
    /// Returns `Err` only for setup failures, before any item is written.
    pub async fn run_pass(&self) -> Result<PassReport, Error> {
        let span = info_span!(
            "migration_pass",
            from = %self.config.source,
            to = %self.config.target
        );
        self.run_pass_inner().instrument(span).await
    }

    async fn run_pass_inner(&self) -> Result<PassReport, Error> {
        let kinds = self
            .discovery
            .list_resource_kinds(&self.config.source)
            .await?;
        let by_name: HashMap<&str, &ResourceKind> =
            kinds.iter().map(|k| (k.name.as_str(), k)).collect();

        let priorities = resource_priorities(&self.config.owner_mappings)?;

        // Every kind in the owner mapping must exist before any real work
        let mut prioritized = Vec::with_capacity(priorities.len());
        for name in &priorities {
            let Some(resource) = by_name.get(name.as_str()) else {
                return Err(Error::UnknownKind { name: name.clone() });
            };
            prioritized.push(*resource);
        }

        let owners: HashSet<&str> = self
            .config
            .owner_mappings
            .iter()
            .map(|(owner, _)| owner.as_str())
            .collect();

        let mut tracker = IdentityTracker::new(&self.config.source, &self.config.target);
        let mut report = PassReport::default();

        for resource in &prioritized {
            let is_owner = owners.contains(resource.name.as_str());
            if is_owner {
                tracker.register_resource(resource);
            }
            if self.config.is_included(&resource.name) {
                self.migrate_resource(resource, &mut tracker, &mut report)
                    .await;
            } else if is_owner {
                self.register_existing(resource, &mut tracker, &mut report)
                    .await;
            }
        }

        let prioritized_names: HashSet<&str> = priorities.iter().map(String::as_str).collect();
        for resource in kinds
            .iter()
            .filter(|k| !prioritized_names.contains(k.name.as_str()))
        {
            if self.config.is_included(&resource.name) {
                self.migrate_resource(resource, &mut tracker, &mut report)
                    .await;
            }
        }

        info!(
            created = report.created(),
            existing = report.existing(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            "Completed migration pass"
        );

        Ok(report)
    }

    async fn migrate_resource(
        &self,
        resource: &ResourceKind,
        tracker: &mut IdentityTracker,
        report: &mut PassReport,
    ) {
        let span = info_span!("resource", resource = %resource.name);

        async {
            info!("Starting resource migration");

            if let Err(e) = self.validate_target_definition(resource).await {
                error!(error = %e, "Unable to migrate resource");
                report.skipped.push(SkippedResource {
                    resource: resource.name.clone(),
                    reason: e.to_string(),
                });
                return;
            }

            let items = match self.store.list(resource, &self.config.source, "").await {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "Unable to list items");
                    report.skipped.push(SkippedResource {
                        resource: resource.name.clone(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            for item in items {
                report.items.push(self.migrate_item(resource, item, tracker).await);
            }

            info!("Completed resource migration");
        }
        .instrument(span)
        .await
    }

    /// Record the identities of an owner kind that is excluded from this
    /// pass, so dependents can still point at copies made by earlier passes.
    async fn register_existing(
        &self,
        resource: &ResourceKind,
        tracker: &mut IdentityTracker,
        report: &mut PassReport,
    ) {
        let span = info_span!("resource", resource = %resource.name);

        async {
            info!("Resource excluded, loading identities already in new API group");

            let items = match self.store.list(resource, &self.config.target, "").await {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "Unable to list items in new API group");
                    report.skipped.push(SkippedResource {
                        resource: resource.name.clone(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let count = items.len();
            for mut item in items {
                if item.types.is_none() {
                    item.types = Some(TypeMeta {
                        api_version: self.config.target.api_version(),
                        kind: resource.kind.clone(),
                    });
                }
                tracker.register_created_item(&item);
            }

            debug!(count, "Loaded existing identities");
        }
        .instrument(span)
        .await
    }

    /// Refuse kinds whose target definition still enables the status
    /// subresource: create would silently drop their status.
    async fn validate_target_definition(&self, resource: &ResourceKind) -> Result<(), Error> {
        let group = &self.config.target.group;
        let definition = self
            .definitions
            .get_resource_definition(&resource.name, group)
            .await?;

        if has_status_subresource(&definition) {
            return Err(Error::StatusSubresource {
                definition: resource.definition_name(group),
            });
        }

        Ok(())
    }

    async fn migrate_item(
        &self,
        resource: &ResourceKind,
        item: DynamicObject,
        tracker: &mut IdentityTracker,
    ) -> ItemReport {
        let name = item.metadata.name.clone().unwrap_or_default();
        let original_namespace = item.metadata.namespace.clone().unwrap_or_default();
        let namespace = self
            .config
            .namespace_mappings
            .target(&original_namespace)
            .to_string();

        let id = if namespace.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", namespace, name)
        };
        let span = info_span!(
            "item",
            id = %id,
            original_namespace = tracing::field::Empty
        );
        if original_namespace != namespace {
            span.record("original_namespace", original_namespace.as_str());
        }

        let outcome = match self
            .migrate_instance(resource, item, &namespace, tracker)
            .instrument(span.clone())
            .await
        {
            Ok((outcome, stored)) => {
                if outcome.registers_identity() {
                    // may be a parent whose UID dependents need
                    tracker.register_created_item(&stored);
                }
                outcome
            }
            Err(e) => {
                span.in_scope(|| error!(error = %e, "Error migrating item"));
                ItemOutcome::Failed
            }
        };

        ItemReport {
            resource: resource.name.clone(),
            namespace,
            name,
            outcome,
        }
    }

    /// Returns the outcome together with the item as stored in the target group
    async fn migrate_instance(
        &self,
        resource: &ResourceKind,
        mut item: DynamicObject,
        namespace: &str,
        tracker: &IdentityTracker,
    ) -> Result<(ItemOutcome, DynamicObject), Error> {
        let name = item.metadata.name.clone().unwrap_or_default();
        let target = &self.config.target;

        info!("Checking if item already exists in new API group");
        if let Some(existing) = self.store.get(resource, target, namespace, &name).await? {
            warn!("Item already exists - skipping");
            return Ok((ItemOutcome::AlreadyExists, existing));
        }

        self.prepare_for_create(resource, &mut item, namespace, tracker);

        info!("Creating item");
        let created = self.store.create(resource, target, namespace, &item).await?;

        Ok((ItemOutcome::Created, created))
    }

    /// Rewrite a source item into a creatable target item
    fn prepare_for_create(
        &self,
        resource: &ResourceKind,
        item: &mut DynamicObject,
        namespace: &str,
        tracker: &IdentityTracker,
    ) {
        let api_version = self.config.target.api_version();
        match item.types.as_mut() {
            Some(types) => types.api_version = api_version,
            None => {
                item.types = Some(TypeMeta {
                    api_version,
                    kind: resource.kind.clone(),
                })
            }
        }

        // create is rejected when resourceVersion is set
        item.metadata.resource_version = None;

        item.metadata.namespace = (!namespace.is_empty()).then(|| namespace.to_string());

        if !self.config.annotation_mappings.is_empty() {
            debug!("Updating annotation keys");
            item.metadata.annotations = item
                .metadata
                .annotations
                .take()
                .map(|a| self.config.annotation_mappings.apply(a));
        }

        if !self.config.label_mappings.is_empty() {
            debug!("Updating label keys");
            item.metadata.labels = item
                .metadata
                .labels
                .take()
                .map(|l| self.config.label_mappings.apply(l));
        }

        tracker.update_owner_refs(item);
    }
}
