//! Custom resource migration between API groups
//!
//! Copies every instance of every kind served by a source group/version into
//! a target group/version that serves the same kinds, rewriting namespaces,
//! label and annotation keys, and ownerReferences along the way.
//!
//! ## Pass
//!
//! ```text
//! 1. Discover kinds served by the source group/version
//! 2. Order owner-mapping kinds (owners before dependents)
//! 3. Validate every ordered kind is served
//! 4. For each ordered kind:
//!    ├─ Register it for identity tracking if it is an owner
//!    ├─ Migrate it if included
//!    └─ Excluded owner? record identities already in the target group
//! 5. For each remaining kind (discovery order): migrate it if included
//!
//! Migrate kind:
//!    ├─ Refuse if the target definition enables the status subresource
//!    ├─ List every instance in the source group
//!    └─ For each instance:
//!        ├─ Exists in target? record its identity, skip
//!        ├─ Rewrite apiVersion, namespace, keys, ownerRefs
//!        └─ Create, record the returned identity
//! ```
//!
//! Passes are idempotent: items already present in the target group are
//! never modified, so a pass can be re-run until it reports no failures.

mod client;
mod error;
mod graph;
mod mapping;
mod migrator;
mod resource;
mod throttle;
mod tracker;

pub use client::{
    create_client, has_status_subresource, DefinitionSource, KubeDefinitionSource, KubeDiscovery,
    KubeResourceStore, ResourceDiscovery, ResourceStore,
};
pub use error::Error;
pub use graph::DependencyGraph;
pub use mapping::{parse_mappings, KeyMapper, NamespaceMapper};
pub use migrator::{
    resource_priorities, ItemOutcome, ItemReport, Migrator, MigratorConfig, PassReport,
    SkippedResource,
};
pub use resource::{GroupVersion, ResourceKind};
pub use throttle::{RateLimiter, DEFAULT_BURST, DEFAULT_QPS, MIN_QPS};
pub use tracker::{IdentityRecord, IdentityTracker};
