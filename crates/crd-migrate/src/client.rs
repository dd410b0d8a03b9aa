//! Kubernetes access for migration
//!
//! Provides trait-based abstractions for the three things a migration pass
//! needs from the cluster: discovering the kinds a group serves, listing,
//! reading and creating instances, and reading the target group's
//! CustomResourceDefinitions. Tests swap in mocks or in-memory fakes while
//! production code talks to the API server.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{is_not_found, Error};
use crate::resource::{GroupVersion, ResourceKind};
use crate::throttle::RateLimiter;

/// Lists the resource kinds served by an API group/version
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    /// List every resource kind in the group/version (subresources excluded)
    async fn list_resource_kinds(
        &self,
        group_version: &GroupVersion,
    ) -> Result<Vec<ResourceKind>, Error>;
}

/// Reads and creates resource instances
///
/// An empty namespace addresses cluster-scoped kinds, or all namespaces when
/// listing a namespaced kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List instances of a kind, across all namespaces when `namespace` is empty
    async fn list(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error>;

    /// Get an instance by name. Returns `Ok(None)` if it does not exist.
    async fn get(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create an instance and return it as stored (with its assigned UID)
    async fn create(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
        item: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}

/// Reads resource definitions of the target group
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Get the definition backing `kind_name` in `group` as a JSON document
    async fn get_resource_definition(&self, kind_name: &str, group: &str) -> Result<Value, Error>;
}

/// Check whether a definition enables the status subresource.
///
/// Handles both the single-version layout (`spec.subresources.status`) and
/// the per-version layout (`spec.versions[*].subresources.status`).
pub fn has_status_subresource(definition: &Value) -> bool {
    let spec = &definition["spec"];

    if !spec["subresources"]["status"].is_null() {
        return true;
    }

    spec["versions"].as_array().is_some_and(|versions| {
        versions
            .iter()
            .any(|v| !v["subresources"]["status"].is_null())
    })
}

/// Create a kube client from an optional kubeconfig path and context.
///
/// With neither set the configuration is inferred (in-cluster, then the
/// default kubeconfig).
pub async fn create_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<Client, Error> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::config(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None if context.is_some() => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?,
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e)))?,
    };

    Client::try_from(config).map_err(|e| Error::config(format!("failed to create client: {}", e)))
}

/// Discovery backed by the API server's resource list
pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    /// Create a new KubeDiscovery
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceDiscovery for KubeDiscovery {
    async fn list_resource_kinds(
        &self,
        group_version: &GroupVersion,
    ) -> Result<Vec<ResourceKind>, Error> {
        // the core group lives under /api rather than /apis
        let list = if group_version.group.is_empty() {
            self.client
                .list_core_api_resources(&group_version.version)
                .await
        } else {
            self.client
                .list_api_group_resources(&group_version.api_version())
                .await
        };
        let list = list.map_err(|e| Error::Discovery {
            group_version: group_version.to_string(),
            message: e.to_string(),
        })?;

        let kinds = list
            .resources
            .into_iter()
            .filter(|r| !r.name.contains('/'))
            .map(|r| ResourceKind::new(r.name, r.kind, r.namespaced))
            .collect::<Vec<_>>();

        debug!(
            group_version = %group_version,
            kinds = kinds.len(),
            "Discovered resource kinds"
        );

        Ok(kinds)
    }
}

/// Resource store backed by `Api<DynamicObject>`, throttled client-side
pub struct KubeResourceStore {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl KubeResourceStore {
    /// Create a new KubeResourceStore sharing `limiter` across calls
    pub fn new(client: Client, limiter: Arc<RateLimiter>) -> Self {
        Self { client, limiter }
    }

    fn api(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
    ) -> Api<DynamicObject> {
        let ar = group_version.api_resource(kind);
        if kind.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn list(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        self.limiter.acquire().await;
        let list = self
            .api(kind, group_version, namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::store("list", e.to_string()))?;
        Ok(list.items)
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        self.limiter.acquire().await;
        match self.api(kind, group_version, namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::store("get", e.to_string())),
        }
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        group_version: &GroupVersion,
        namespace: &str,
        item: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        self.limiter.acquire().await;
        self.api(kind, group_version, namespace)
            .create(&PostParams::default(), item)
            .await
            .map_err(|e| Error::store("create", e.to_string()))
    }
}

/// Definition source reading `apiextensions.k8s.io/v1` CustomResourceDefinitions
pub struct KubeDefinitionSource {
    client: Client,
}

impl KubeDefinitionSource {
    /// Create a new KubeDefinitionSource
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DefinitionSource for KubeDefinitionSource {
    async fn get_resource_definition(&self, kind_name: &str, group: &str) -> Result<Value, Error> {
        let crd_api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd = crd_api.get(&format!("{}.{}", kind_name, group)).await?;
        serde_json::to_value(&crd).map_err(|e| Error::Serialization(e.to_string()))
    }
}
