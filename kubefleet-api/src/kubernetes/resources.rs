//! Typed resource kinds
//!
//! The operator dispatches on [`ResourceKind`] and moves objects as
//! `DynamicObject`; the typed wrappers convert to and from the k8s-openapi
//! structs through [`KubeResource`].

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use kube::Resource;
use kubefleet_common::{Error, ResourceKind, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A k8s-openapi type the operator can manage
pub trait KubeResource:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;
}

impl KubeResource for Namespace {
    const KIND: ResourceKind = ResourceKind::Namespace;
}

impl KubeResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;
}

impl KubeResource for StatefulSet {
    const KIND: ResourceKind = ResourceKind::StatefulSet;
}

impl KubeResource for Job {
    const KIND: ResourceKind = ResourceKind::Job;
}

impl KubeResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

/// Group/version/kind/plural for a kind
pub fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
        ResourceKind::Job => ApiResource::erase::<Job>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
    }
}

/// Fill in apiVersion/kind; list responses omit them per item
pub fn with_type_meta(mut obj: DynamicObject, kind: ResourceKind) -> DynamicObject {
    if obj.types.is_none() {
        let ar = api_resource(kind);
        obj.types = Some(TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        });
    }
    obj
}

pub fn to_dynamic<K: KubeResource>(resource: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(resource)
        .map_err(|e| Error::Unknown(format!("failed to encode {}: {}", K::KIND, e)))?;
    serde_json::from_value(value)
        .map_err(|e| Error::Unknown(format!("failed to encode {}: {}", K::KIND, e)))
}

pub fn from_dynamic<K: KubeResource>(obj: DynamicObject) -> Result<K> {
    let value = serde_json::to_value(with_type_meta(obj, K::KIND))
        .map_err(|e| Error::Unknown(format!("failed to decode {}: {}", K::KIND, e)))?;
    serde_json::from_value(value)
        .map_err(|e| Error::Unknown(format!("failed to decode {}: {}", K::KIND, e)))
}
