//! Common test utilities and helpers
//!
//! An in-memory cluster API standing in for real clusters, a connector that
//! hands them out by API server URL, kubeconfig fixtures, and a test
//! environment over an in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use kube::api::DynamicObject;
use kubefleet_api::db::Database;
use kubefleet_api::kubernetes::credentials::ConnectionParams;
use kubefleet_api::kubernetes::resources::{api_resource, with_type_meta};
use kubefleet_api::kubernetes::{
    CallContext, ClusterClient, ClusterRegistry, Connector, RegistrySettings, RemoteError,
    ResourceOperator,
};
use kubefleet_common::{CredentialBlob, Error, ResourceKind, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

type ObjectKey = (ResourceKind, String, String);

#[derive(Debug, Default)]
struct FakeState {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    next_version: u64,
}

/// In-memory cluster API with resourceVersion semantics
#[derive(Debug)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
    reachable: AtomicBool,
    deny_all: AtomicBool,
    hanging: watch::Sender<bool>,
    calls: AtomicUsize,
    probes: AtomicUsize,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            reachable: AtomicBool::new(true),
            deny_all: AtomicBool::new(false),
            hanging: watch::channel(false).0,
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }
}

impl FakeCluster {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_deny_all(&self, deny: bool) {
        self.deny_all.store(deny, Ordering::SeqCst);
    }

    /// While set, every request, probes included, waits without answering.
    /// Clearing it lets the waiting requests continue.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.send_replace(hanging);
    }

    /// Resource calls received (probes excluded)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Names of stored objects of `kind`, in list order
    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    async fn gate(&self) -> std::result::Result<(), RemoteError> {
        let mut hanging = self.hanging.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = hanging.wait_for(|hang| !*hang).await;
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn admit(&self) -> std::result::Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        if self.deny_all.load(Ordering::SeqCst) {
            return Err(RemoteError::forbidden("system:anonymous cannot access this resource"));
        }
        Ok(())
    }

    fn key(kind: ResourceKind, namespace: Option<&str>, name: &str) -> ObjectKey {
        (kind, namespace.unwrap_or("").to_string(), name.to_string())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn probe(&self) -> std::result::Result<(), RemoteError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<DynamicObject>, RemoteError> {
        self.admit().await?;
        let state = self.state.lock().unwrap();
        let scope = namespace.unwrap_or("");
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (scope.is_empty() || ns == scope))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        self.admit().await?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&Self::key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("{} \"{}\" not found", kind, name)))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        self.admit().await?;
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = Self::key(kind, namespace, &name);

        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&key) {
            return Err(RemoteError::already_exists(format!("{} \"{}\" already exists", kind, name)));
        }

        state.next_version += 1;
        let mut stored = with_type_meta(object.clone(), kind);
        stored.metadata.namespace = namespace.map(str::to_string);
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> std::result::Result<DynamicObject, RemoteError> {
        self.admit().await?;
        let key = Self::key(kind, namespace, name);

        let mut state = self.state.lock().unwrap();
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| RemoteError::not_found(format!("{} \"{}\" not found", kind, name)))?;
        if current.metadata.resource_version != object.metadata.resource_version {
            return Err(RemoteError::conflict(
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        state.next_version += 1;
        let mut stored = with_type_meta(object.clone(), kind);
        stored.metadata.namespace = namespace.map(str::to_string);
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> std::result::Result<(), RemoteError> {
        self.admit().await?;
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .remove(&Self::key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(format!("{} \"{}\" not found", kind, name)))
    }
}

/// Hands out fake clusters keyed by API server URL
#[derive(Debug, Default)]
pub struct FakeConnector {
    clusters: Mutex<HashMap<String, Arc<FakeCluster>>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    /// The fake behind `server`, created on first use
    pub fn cluster(&self, server: &str) -> Arc<FakeCluster> {
        self.clusters
            .lock()
            .unwrap()
            .entry(server.to_string())
            .or_default()
            .clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Resource calls across every fake cluster
    pub fn total_calls(&self) -> usize {
        self.clusters.lock().unwrap().values().map(|c| c.calls()).sum()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ClusterClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let cluster: Arc<dyn ClusterClient> = self.cluster(&params.api_server);
        Ok(cluster)
    }
}

/// A kubeconfig pointing at `server`
pub fn kubeconfig(server: &str) -> CredentialBlob {
    CredentialBlob::new(format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: target
  cluster:
    server: {server}
contexts:
- name: admin@target
  context:
    cluster: target
    user: admin
current-context: admin@target
users:
- name: admin
  user:
    token: fixture-token
"#
    ))
}

pub fn server(name: &str) -> String {
    format!("https://{}.clusters.test:6443", name)
}

/// Probing effectively disabled so tests drive it through `probe_once`
pub fn test_settings() -> RegistrySettings {
    RegistrySettings {
        probe_interval: Duration::from_secs(3600),
        probe_timeout: Duration::from_millis(200),
        failure_threshold: 3,
        connect_timeout: Duration::from_millis(500),
    }
}

pub fn ctx() -> CallContext {
    CallContext::with_timeout(Duration::from_secs(2))
}

/// A bare object of `kind` with a name and namespace
pub fn object(kind: ResourceKind, namespace: &str, name: &str) -> DynamicObject {
    let obj = DynamicObject::new(name, &api_resource(kind));
    if kind.is_namespaced() {
        obj.within(namespace)
    } else {
        obj
    }
}

/// Test environment: in-memory database, fake connector, registry, operator
pub struct TestEnv {
    pub db: Database,
    pub connector: Arc<FakeConnector>,
    pub registry: ClusterRegistry,
    pub operator: ResourceOperator,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_settings(settings: RegistrySettings) -> Self {
        let db = Database::in_memory().await.expect("in-memory database");
        let connector = Arc::new(FakeConnector::default());
        let registry = ClusterRegistry::new(Arc::new(db.clusters()), connector.clone(), settings);
        let operator = ResourceOperator::new(registry.clone());

        Self {
            db,
            connector,
            registry,
            operator,
        }
    }

    /// A second registry over the same database and clusters, as after a restart
    pub fn restarted_registry(&self) -> ClusterRegistry {
        ClusterRegistry::new(
            Arc::new(self.db.clusters()),
            self.connector.clone(),
            self.registry.settings().clone(),
        )
    }

    /// Register `name` against a fresh fake cluster and return that fake
    pub async fn register(&self, name: &str) -> Arc<FakeCluster> {
        let fake = self.connector.cluster(&server(name));
        self.registry
            .register(name, kubeconfig(&server(name)))
            .await
            .expect("register");
        fake
    }
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually<F: Fn() -> bool>(check: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub fn assert_unavailable(err: &Error) {
    assert!(matches!(err, Error::Unavailable(_)), "expected Unavailable, got {:?}", err);
}
