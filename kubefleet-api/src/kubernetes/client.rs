//! Cluster API clients
//!
//! [`ClusterClient`] is the remote API surface the core relies on; [`KubeClient`]
//! implements it on kube-rs. [`ClientHandle`] is the live, shareable handle the
//! registry hands out.

use super::credentials::ConnectionParams;
use super::error::RemoteError;
use super::resources::{api_resource, with_type_meta};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use kubefleet_common::{Error, ResourceKind, Result};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote operations on one cluster
///
/// `namespace` is `None` for cluster-scoped kinds; an empty namespace on a
/// list means every namespace. Implementations must be safe to call
/// concurrently.
#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    /// Lightweight reachability check
    async fn probe(&self) -> std::result::Result<(), RemoteError>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<DynamicObject>, RemoteError>;

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<DynamicObject, RemoteError>;

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError>;

    /// Full replace; the server rejects a stale `metadata.resourceVersion`
    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError>;

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<(), RemoteError>;
}

/// Builds clients from parsed credentials
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ClusterClient>>;
}

/// kube-rs backed client
#[derive(Clone)]
pub struct KubeClient {
    inner: Client,
    api_server: String,
}

impl KubeClient {
    pub fn new(inner: Client, api_server: impl Into<String>) -> Self {
        Self {
            inner,
            api_server: api_server.into(),
        }
    }

    /// Get the inner kube-rs Client
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(kind);
        match namespace {
            Some(ns) if kind.is_namespaced() && !ns.is_empty() => {
                Api::namespaced_with(self.inner.clone(), ns, &ar)
            }
            _ => Api::all_with(self.inner.clone(), &ar),
        }
    }
}

impl fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("api_server", &self.api_server)
            .finish()
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn probe(&self) -> std::result::Result<(), RemoteError> {
        self.inner.apiserver_version().await?;
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<DynamicObject>, RemoteError> {
        let list = self.api(kind, namespace).list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .map(|obj| with_type_meta(obj, kind))
            .collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        let obj = self.api(kind, namespace).get(name).await?;
        Ok(with_type_meta(obj, kind))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        let created = self
            .api(kind, namespace)
            .create(&PostParams::default(), object)
            .await?;
        Ok(with_type_meta(created, kind))
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        let replaced = self
            .api(kind, namespace)
            .replace(name, &PostParams::default(), object)
            .await?;
        Ok(with_type_meta(replaced, kind))
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<(), RemoteError> {
        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// Builds [`KubeClient`]s with bounded connect/read timeouts
#[derive(Debug, Clone)]
pub struct KubeConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeConnector {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ClusterClient>> {
        let mut config = Config::from_custom_kubeconfig(
            params.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(params.context.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| Error::InvalidConfig(format!("failed to build client config: {}", e)))?;

        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        let client = Client::try_from(config)
            .map_err(|e| Error::InvalidConfig(format!("failed to create client: {}", e)))?;

        Ok(Arc::new(KubeClient::new(client, params.api_server.clone())))
    }
}

/// Live connection to a registered cluster
///
/// Cheap to share; operations already holding a handle may finish after the
/// cluster is removed or rotated.
pub struct ClientHandle {
    cluster_name: String,
    api_server: String,
    client: Arc<dyn ClusterClient>,
    last_probe_ms: AtomicI64,
}

impl ClientHandle {
    pub fn new(cluster_name: impl Into<String>, api_server: impl Into<String>, client: Arc<dyn ClusterClient>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            api_server: api_server.into(),
            client,
            last_probe_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    pub fn client(&self) -> &dyn ClusterClient {
        self.client.as_ref()
    }

    /// When this handle was last probed (successfully or not)
    pub fn last_probe_at(&self) -> DateTime<Utc> {
        let ms = self.last_probe_ms.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    pub(crate) fn mark_probed(&self, at: DateTime<Utc>) {
        self.last_probe_ms.store(at.timestamp_millis(), Ordering::Release);
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("cluster_name", &self.cluster_name)
            .field("api_server", &self.api_server)
            .field("last_probe_at", &self.last_probe_at())
            .finish()
    }
}
