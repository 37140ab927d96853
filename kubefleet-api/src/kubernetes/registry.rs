//! Cluster registry
//!
//! Maps cluster names to live client handles. Lookups go straight to a
//! concurrent map and never wait; register, refresh, remove and probe results
//! for one name serialize on a lock owned by that name, so different clusters
//! never block each other.

use super::client::{ClientHandle, ClusterClient, Connector};
use super::credentials::{self, ConnectionParams};
use super::prober;
use crate::db::ClusterStore;
use chrono::Utc;
use dashmap::DashMap;
use kubefleet_common::{Cluster, ClusterStatus, CredentialBlob, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Timing knobs for connecting and health probing
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Time between background probes of one cluster
    pub probe_interval: Duration,
    /// Deadline for a single background probe
    pub probe_timeout: Duration,
    /// Consecutive failed probes before a Connected cluster turns Unhealthy
    pub failure_threshold: u32,
    /// Deadline for building a client and probing it during register/refresh
    pub connect_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// What startup rehydration did with each persisted cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RehydrationReport {
    pub connected: Vec<String>,
    pub unhealthy: Vec<String>,
    /// Rows whose credential could not be parsed or turned into a client
    pub skipped: Vec<String>,
}

struct Entry {
    cluster: Cluster,
    handle: Arc<ClientHandle>,
    consecutive_failures: u32,
}

pub(crate) struct RegistryInner {
    entries: DashMap<String, Entry>,
    /// Never pruned, so two callers can never hold different locks for one name
    locks: DashMap<String, Arc<Mutex<()>>>,
    probers: DashMap<String, CancellationToken>,
    store: Arc<dyn ClusterStore>,
    connector: Arc<dyn Connector>,
    settings: RegistrySettings,
    shutdown: CancellationToken,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Shared registry of cluster connections
///
/// Cloning is cheap; every clone sees the same entries.
#[derive(Clone)]
pub struct ClusterRegistry {
    inner: Arc<RegistryInner>,
}

impl ClusterRegistry {
    pub fn new(store: Arc<dyn ClusterStore>, connector: Arc<dyn Connector>, settings: RegistrySettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                locks: DashMap::new(),
                probers: DashMap::new(),
                store,
                connector,
                settings,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    /// Handle for a Connected cluster
    ///
    /// Fails with `NotRegistered` for unknown names and `ClusterUnavailable`
    /// while the cluster is Unhealthy. Never performs I/O.
    pub fn get(&self, name: &str) -> Result<Arc<ClientHandle>> {
        let entry = self
            .inner
            .entries
            .get(name)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;

        match entry.cluster.status {
            ClusterStatus::Connected => Ok(entry.handle.clone()),
            status => Err(Error::ClusterUnavailable {
                cluster: name.to_string(),
                reason: format!("cluster is {}", status),
            }),
        }
    }

    /// Snapshot of a registered cluster's metadata
    pub fn cluster(&self, name: &str) -> Result<Cluster> {
        self.inner
            .entries
            .get(name)
            .map(|e| e.cluster.clone())
            .ok_or_else(|| Error::NotRegistered(name.to_string()))
    }

    pub fn status(&self, name: &str) -> Result<ClusterStatus> {
        self.inner
            .entries
            .get(name)
            .map(|e| e.cluster.status)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))
    }

    /// `(name, status)` for every registered cluster, ordered by name
    pub fn list(&self) -> Vec<(String, ClusterStatus)> {
        let mut clusters: Vec<_> = self
            .inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.cluster.status))
            .collect();
        clusters.sort_by(|a, b| a.0.cmp(&b.0));
        clusters
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub async fn register(&self, name: &str, credential: CredentialBlob) -> Result<Cluster> {
        self.register_with_description(name, credential, "").await
    }

    /// Parse, connect, probe and persist a new cluster
    ///
    /// Returns only after the probe succeeded; on any failure nothing is left
    /// behind in memory.
    pub async fn register_with_description(
        &self,
        name: &str,
        credential: CredentialBlob,
        description: &str,
    ) -> Result<Cluster> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        if self.inner.entries.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let existing = self.inner.store.get_by_name(name).await?;
        if matches!(&existing, Some(row) if row.status != ClusterStatus::Disabled) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let params = credentials::parse(credential.as_bytes())?;
        let client = self.open(name, &params).await?;
        self.check(name, client.as_ref(), self.inner.settings.connect_timeout)
            .await?;

        let mut cluster = Cluster::pending(name, credential, description);
        transition(name, cluster.status, ClusterStatus::Connected)?;
        cluster.status = ClusterStatus::Connected;

        // Disabled is terminal: the name starts over under a new identity
        if let Some(row) = existing {
            self.inner.store.delete(row.id).await?;
        }
        let cluster = self.inner.store.create(&cluster).await?;

        let handle = Arc::new(ClientHandle::new(name, params.api_server.clone(), client));
        self.install(cluster.clone(), handle, 0);

        tracing::info!(
            cluster = %name,
            api_server = %params.api_server,
            resource_version = cluster.resource_version,
            "Cluster registered"
        );

        Ok(cluster)
    }

    /// Rotate a cluster's credential
    ///
    /// The new client is built and probed before the lock is taken; if that
    /// fails the old handle stays in place. The swap itself is one step under
    /// the per-name lock.
    ///
    /// Also brings up a persisted cluster that rehydration could not connect,
    /// which has a row but no entry.
    pub async fn refresh(&self, name: &str, credential: CredentialBlob) -> Result<Cluster> {
        if !self.inner.entries.contains_key(name) {
            self.persisted_active(name).await?;
        }

        let params = credentials::parse(credential.as_bytes())?;
        let client = self.open(name, &params).await?;
        self.check(name, client.as_ref(), self.inner.settings.connect_timeout)
            .await?;
        let handle = Arc::new(ClientHandle::new(name, params.api_server.clone(), client));

        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        // No entry: removed meanwhile, or a row rehydration left without a handle
        let mut cluster = match self.cluster(name) {
            Ok(cluster) => cluster,
            Err(_) => self.persisted_active(name).await?,
        };
        transition(name, cluster.status, ClusterStatus::Connected)?;
        cluster.credential = credential;
        cluster.status = ClusterStatus::Connected;
        let cluster = self.save(&cluster).await?;

        self.install(cluster.clone(), handle, 0);

        tracing::info!(
            cluster = %name,
            api_server = %params.api_server,
            resource_version = cluster.resource_version,
            "Cluster credential rotated"
        );

        Ok(cluster)
    }

    /// Disable a cluster and drop its handle
    ///
    /// Idempotent. Callers already holding a handle may finish their calls.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let known = match self.inner.entries.get(name).map(|e| e.cluster.clone()) {
            Some(cluster) => Some(cluster),
            None => self.inner.store.get_by_name(name).await?,
        };

        if let Some(cluster) = known.filter(|c| c.status != ClusterStatus::Disabled) {
            match self.save_status(&cluster, ClusterStatus::Disabled).await {
                Ok(_) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let removed = self.inner.entries.remove(name).is_some();
        if let Some((_, token)) = self.inner.probers.remove(name) {
            token.cancel();
        }

        if removed {
            tracing::info!(cluster = %name, "Cluster removed");
        } else {
            tracing::debug!(cluster = %name, "Remove of unregistered cluster");
        }

        Ok(())
    }

    /// Run one health probe and record the result
    ///
    /// The probe runs outside the lock; its outcome is dropped if the handle
    /// was rotated in the meantime.
    pub async fn probe_once(&self, name: &str) -> Result<ClusterStatus> {
        let handle = self
            .inner
            .entries
            .get(name)
            .map(|e| e.handle.clone())
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;

        let probe_timeout = self.inner.settings.probe_timeout;
        let success = match tokio::time::timeout(probe_timeout, handle.client().probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(cluster = %name, error = %e, "Health probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(cluster = %name, timeout = ?probe_timeout, "Health probe timed out");
                false
            }
        };
        handle.mark_probed(Utc::now());

        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let (cluster, failures) = {
            let entry = self
                .inner
                .entries
                .get(name)
                .ok_or_else(|| Error::NotRegistered(name.to_string()))?;
            if !Arc::ptr_eq(&entry.handle, &handle) {
                return Ok(entry.cluster.status);
            }
            (entry.cluster.clone(), entry.consecutive_failures)
        };

        let (next, failures) = prober::next_status(
            cluster.status,
            failures,
            success,
            self.inner.settings.failure_threshold,
        );

        let cluster = if next == cluster.status {
            cluster
        } else {
            match next {
                ClusterStatus::Unhealthy => tracing::warn!(
                    cluster = %name,
                    failures,
                    "Cluster marked unhealthy"
                ),
                _ => tracing::info!(cluster = %name, status = %next, "Cluster recovered"),
            }
            match self.save_status(&cluster, next).await {
                Ok(saved) => saved,
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "Failed to persist cluster status");
                    Cluster { status: next, ..cluster }
                }
            }
        };

        if let Some(mut entry) = self.inner.entries.get_mut(name) {
            entry.cluster = cluster;
            entry.consecutive_failures = failures;
        }

        Ok(next)
    }

    /// Rebuild entries from every persisted non-Disabled cluster
    ///
    /// Only a failure to read the store is fatal. Clusters that fail their
    /// first probe come up Unhealthy and are retried by their prober.
    pub async fn rehydrate(&self) -> Result<RehydrationReport> {
        let rows = self.inner.store.list().await?;
        let mut report = RehydrationReport::default();

        for row in rows.into_iter().filter(|c| c.status != ClusterStatus::Disabled) {
            let name = row.name.clone();
            let lock = self.lock_for(&name);
            let _guard = lock.lock().await;

            if self.inner.entries.contains_key(&name) {
                continue;
            }

            let params = match credentials::parse(row.credential.as_bytes()) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "Skipping cluster with unusable credential");
                    self.mark_skipped(&row).await;
                    report.skipped.push(name);
                    continue;
                }
            };

            let client = match self.open(&name, &params).await {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "Skipping cluster, client could not be built");
                    self.mark_skipped(&row).await;
                    report.skipped.push(name);
                    continue;
                }
            };

            let threshold = self.inner.settings.failure_threshold;
            let (status, failures) = match self
                .check(&name, client.as_ref(), self.inner.settings.connect_timeout)
                .await
            {
                Ok(()) => (ClusterStatus::Connected, 0),
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "Cluster unreachable at startup");
                    (ClusterStatus::Unhealthy, threshold)
                }
            };

            let cluster = if row.status == status {
                row
            } else {
                match self.save_status(&row, status).await {
                    Ok(saved) => saved,
                    Err(e) => {
                        tracing::warn!(cluster = %name, error = %e, "Failed to persist cluster status");
                        Cluster { status, ..row }
                    }
                }
            };

            let handle = Arc::new(ClientHandle::new(name.as_str(), params.api_server.clone(), client));
            self.install(cluster, handle, failures);

            match status {
                ClusterStatus::Connected => report.connected.push(name),
                _ => report.unhealthy.push(name),
            }
        }

        tracing::info!(
            connected = report.connected.len(),
            unhealthy = report.unhealthy.len(),
            skipped = report.skipped.len(),
            "Cluster registry rehydrated"
        );

        Ok(report)
    }

    /// Stop every background prober; entries stay readable
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.probers.clear();
        tracing::info!("Cluster registry shut down");
    }

    /// The stored row for a name that has no entry but is not Disabled
    async fn persisted_active(&self, name: &str) -> Result<Cluster> {
        match self.inner.store.get_by_name(name).await? {
            Some(row) if row.status != ClusterStatus::Disabled => Ok(row),
            _ => Err(Error::NotRegistered(name.to_string())),
        }
    }

    /// A row left without a handle must not claim to be Connected.
    /// Refresh with a working credential brings it back.
    async fn mark_skipped(&self, row: &Cluster) {
        if row.status == ClusterStatus::Unhealthy {
            return;
        }
        if let Err(e) = self.save_status(row, ClusterStatus::Unhealthy).await {
            tracing::warn!(cluster = %row.name, error = %e, "Failed to persist cluster status");
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Build a client, bounded by the connect timeout
    async fn open(&self, name: &str, params: &ConnectionParams) -> Result<Arc<dyn ClusterClient>> {
        let limit = self.inner.settings.connect_timeout;
        match tokio::time::timeout(limit, self.inner.connector.connect(params)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionFailed {
                cluster: name.to_string(),
                reason: format!("client setup timed out after {:?}", limit),
            }),
        }
    }

    async fn check(&self, name: &str, client: &dyn ClusterClient, limit: Duration) -> Result<()> {
        match tokio::time::timeout(limit, client.probe()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                cluster: name.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionFailed {
                cluster: name.to_string(),
                reason: format!("probe timed out after {:?}", limit),
            }),
        }
    }

    /// Store the entry and (re)start its prober. Caller holds the name's lock.
    fn install(&self, cluster: Cluster, handle: Arc<ClientHandle>, consecutive_failures: u32) {
        debug_assert!(
            cluster.status.has_handle(),
            "handle installed for {} cluster",
            cluster.status
        );
        let name = cluster.name.clone();
        self.inner.entries.insert(
            name.clone(),
            Entry {
                cluster,
                handle,
                consecutive_failures,
            },
        );

        if self.inner.probers.contains_key(&name) || self.inner.shutdown.is_cancelled() {
            return;
        }

        let token = self.inner.shutdown.child_token();
        self.inner.probers.insert(name.clone(), token.clone());
        prober::spawn(
            Arc::downgrade(&self.inner),
            name,
            token,
            self.inner.settings.probe_interval.max(Duration::from_millis(10)),
        );
    }

    // The registry owns its rows, so a version conflict only means the cached
    // copy is behind; retry once against the current version.
    async fn save(&self, cluster: &Cluster) -> Result<Cluster> {
        match self.inner.store.update(cluster).await {
            Err(Error::Conflict(_)) => {
                let current = self.inner.store.get(cluster.id).await?;
                transition(&cluster.name, current.status, cluster.status)?;
                let retry = Cluster {
                    resource_version: current.resource_version,
                    ..cluster.clone()
                };
                self.inner.store.update(&retry).await
            }
            other => other,
        }
    }

    async fn save_status(&self, cluster: &Cluster, status: ClusterStatus) -> Result<Cluster> {
        transition(&cluster.name, cluster.status, status)?;
        let store = &self.inner.store;
        match store.update_status(cluster.id, cluster.resource_version, status).await {
            Err(Error::Conflict(_)) => {
                let current = store.get(cluster.id).await?;
                transition(&cluster.name, current.status, status)?;
                store
                    .update_status(cluster.id, current.resource_version, status)
                    .await
            }
            other => other,
        }
    }
}

/// Reject status writes the cluster state machine does not allow
fn transition(name: &str, from: ClusterStatus, to: ClusterStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "cluster '{}' cannot move from {} to {}",
            name, from, to
        )))
    }
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("clusters", &self.list())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_allows_health_moves() {
        transition("c1", ClusterStatus::Pending, ClusterStatus::Connected).unwrap();
        transition("c1", ClusterStatus::Connected, ClusterStatus::Unhealthy).unwrap();
        transition("c1", ClusterStatus::Unhealthy, ClusterStatus::Disabled).unwrap();
    }

    #[test]
    fn test_transition_out_of_disabled_is_conflict() {
        let err = transition("c1", ClusterStatus::Disabled, ClusterStatus::Connected).unwrap_err();
        assert_eq!(
            err,
            Error::Conflict("cluster 'c1' cannot move from disabled to connected".to_string())
        );
    }
}
