//! Resource operator
//!
//! One dispatcher for every resource kind. Calls resolve the target cluster's
//! handle from the registry, race the remote call against the caller's
//! deadline and cancellation token, and translate failures.
//!
//! The untyped methods move `DynamicObject`s; the generic methods wrap them for
//! any [`KubeResource`] so payloads stay typed:
//!
//! ```ignore
//! let ctx = CallContext::with_timeout(Duration::from_secs(10));
//! let deployments: Vec<Deployment> = operator.list(&ctx, &ListOptions::new("prod", "web")).await?;
//! ```

use super::client::ClientHandle;
use super::error::{translate, RemoteError, Verb};
use super::registry::ClusterRegistry;
use super::resources::{from_dynamic, to_dynamic, with_type_meta, KubeResource};
use kube::api::DynamicObject;
use kubefleet_common::{
    ClusterOptions, Error, ListOptions, ObjectOptions, ResourceKind, ResourceRef, Result,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation for one operator call
#[derive(Debug, Clone)]
pub struct CallContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_cancellation(timeout, CancellationToken::new())
    }

    pub fn with_cancellation(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Generic CRUD over registered clusters
#[derive(Clone, Debug)]
pub struct ResourceOperator {
    registry: ClusterRegistry,
}

impl ResourceOperator {
    pub fn new(registry: ClusterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Objects in the referenced collection, in the order the server returns them
    pub async fn list_objects(&self, ctx: &CallContext, target: &ResourceRef) -> Result<Vec<DynamicObject>> {
        let handle = self.handle(target)?;
        self.call(ctx, Verb::List, target, handle.client().list(target.kind, target.scope()))
            .await
    }

    pub async fn get_object(&self, ctx: &CallContext, target: &ResourceRef) -> Result<DynamicObject> {
        let handle = self.handle(target)?;
        self.call(
            ctx,
            Verb::Get,
            target,
            handle.client().get(target.kind, target.scope(), &target.object_name),
        )
        .await
    }

    /// Create `object` in `cluster_name`; its metadata picks the namespace and name
    pub async fn create_object(
        &self,
        ctx: &CallContext,
        cluster_name: &str,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let target = target_of(cluster_name, kind, object);
        let handle = self.handle(&target)?;
        let object = with_type_meta(object.clone(), kind);
        self.call(
            ctx,
            Verb::Create,
            &target,
            handle.client().create(kind, target.scope(), &object),
        )
        .await
    }

    /// Replace `object`, which must carry the resourceVersion the caller last read
    ///
    /// There is no read-before-write and no retry: a stale version comes back
    /// as `Conflict`.
    pub async fn update_object(
        &self,
        ctx: &CallContext,
        cluster_name: &str,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let target = target_of(cluster_name, kind, object);
        if object
            .metadata
            .resource_version
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(Error::Conflict(format!("{}: update requires a resourceVersion", target)));
        }

        let handle = self.handle(&target)?;
        let object = with_type_meta(object.clone(), kind);
        self.call(
            ctx,
            Verb::Update,
            &target,
            handle
                .client()
                .replace(kind, target.scope(), &target.object_name, &object),
        )
        .await
    }

    /// Delete the referenced object; an absent object is `NotFound`
    pub async fn delete_object(&self, ctx: &CallContext, target: &ResourceRef) -> Result<()> {
        let handle = self.handle(target)?;
        self.call(
            ctx,
            Verb::Delete,
            target,
            handle.client().delete(target.kind, target.scope(), &target.object_name),
        )
        .await
    }

    pub async fn list<K: KubeResource>(&self, ctx: &CallContext, options: &ListOptions) -> Result<Vec<K>> {
        self.list_objects(ctx, &options.to_ref(K::KIND))
            .await?
            .into_iter()
            .map(from_dynamic::<K>)
            .collect()
    }

    /// Every object of `K` in the cluster, across namespaces
    pub async fn list_all<K: KubeResource>(&self, ctx: &CallContext, options: &ClusterOptions) -> Result<Vec<K>> {
        self.list_objects(ctx, &options.to_ref(K::KIND))
            .await?
            .into_iter()
            .map(from_dynamic::<K>)
            .collect()
    }

    pub async fn get<K: KubeResource>(&self, ctx: &CallContext, options: &ObjectOptions) -> Result<K> {
        from_dynamic(self.get_object(ctx, &options.to_ref(K::KIND)).await?)
    }

    pub async fn create<K: KubeResource>(&self, ctx: &CallContext, cloud_name: &str, resource: &K) -> Result<K> {
        let object = to_dynamic(resource)?;
        from_dynamic(self.create_object(ctx, cloud_name, K::KIND, &object).await?)
    }

    pub async fn update<K: KubeResource>(&self, ctx: &CallContext, cloud_name: &str, resource: &K) -> Result<K> {
        let object = to_dynamic(resource)?;
        from_dynamic(self.update_object(ctx, cloud_name, K::KIND, &object).await?)
    }

    pub async fn delete<K: KubeResource>(&self, ctx: &CallContext, options: &ObjectOptions) -> Result<()> {
        self.delete_object(ctx, &options.to_ref(K::KIND)).await
    }

    fn handle(&self, target: &ResourceRef) -> Result<Arc<ClientHandle>> {
        self.registry.get(&target.cluster_name).map_err(|e| match e {
            Error::ClusterUnavailable { .. } => e,
            other => Error::ClusterUnavailable {
                cluster: target.cluster_name.clone(),
                reason: other.to_string(),
            },
        })
    }

    async fn call<T, F>(&self, ctx: &CallContext, verb: Verb, target: &ResourceRef, remote: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, RemoteError>>,
    {
        // Dropping the remote future aborts the request
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(RemoteError::Cancelled),
            result = tokio::time::timeout(ctx.timeout, remote) => result.unwrap_or(Err(RemoteError::Timeout)),
        };

        outcome.map_err(|err| {
            let err = translate(err, verb, target);
            match err {
                Error::NotFound(_) | Error::AlreadyExists(_) | Error::Conflict(_) => tracing::debug!(
                    cluster = %target.cluster_name,
                    namespace = %target.namespace,
                    name = %target.object_name,
                    kind = %target.kind,
                    verb = verb.as_str(),
                    error = %err,
                    "Remote call rejected"
                ),
                _ => tracing::warn!(
                    cluster = %target.cluster_name,
                    namespace = %target.namespace,
                    name = %target.object_name,
                    kind = %target.kind,
                    verb = verb.as_str(),
                    error = %err,
                    "Remote call failed"
                ),
            }
            err
        })
    }
}

fn target_of(cluster_name: &str, kind: ResourceKind, object: &DynamicObject) -> ResourceRef {
    let namespace = object
        .metadata
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| "default".to_string());
    let name = object.metadata.name.clone().unwrap_or_default();
    ResourceRef::object(cluster_name, kind, namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn test_target_defaults_namespace() {
        let mut obj = DynamicObject::new("api", &super::super::resources::api_resource(ResourceKind::Service));
        assert_eq!(target_of("c1", ResourceKind::Service, &obj).namespace, "default");

        obj.metadata = ObjectMeta {
            name: Some("api".to_string()),
            namespace: Some("web".to_string()),
            ..Default::default()
        };
        let target = target_of("c1", ResourceKind::Service, &obj);
        assert_eq!(target.to_string(), "c1/Service/web/api");
    }

    #[test]
    fn test_namespace_target_is_cluster_scoped() {
        let obj = DynamicObject::new("team-a", &super::super::resources::api_resource(ResourceKind::Namespace));
        let target = target_of("c1", ResourceKind::Namespace, &obj);
        assert_eq!(target.scope(), None);
        assert_eq!(target.object_name, "team-a");
    }
}
