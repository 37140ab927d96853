//! Addressing for remote objects
//!
//! Each operation takes its own parameter struct with its full field set;
//! the operator converts them into a [`ResourceRef`] for a concrete kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kinds the operator can dispatch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    Deployment,
    StatefulSet,
    Job,
    Service,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Namespace,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::Job,
        ResourceKind::Service,
    ];

    /// Cluster-scoped kinds ignore the namespace
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Job => "Job",
            ResourceKind::Service => "Service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-qualified pointer to a remote object or collection
///
/// `namespace` is empty for cluster-scoped kinds, `object_name` is empty for
/// collection references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub cluster_name: String,
    pub namespace: String,
    pub object_name: String,
    pub kind: ResourceKind,
}

impl ResourceRef {
    /// Reference to every object of `kind` in a namespace (or the cluster)
    pub fn collection(cluster_name: impl Into<String>, kind: ResourceKind, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            cluster_name: cluster_name.into(),
            namespace: if kind.is_namespaced() { namespace } else { String::new() },
            object_name: String::new(),
            kind,
        }
    }

    /// Reference to a single named object
    pub fn object(
        cluster_name: impl Into<String>,
        kind: ResourceKind,
        namespace: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            ..Self::collection(cluster_name, kind, namespace)
        }
    }

    /// Namespace to address, `None` for cluster-scoped kinds
    pub fn scope(&self) -> Option<&str> {
        if self.kind.is_namespaced() {
            Some(self.namespace.as_str())
        } else {
            None
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_name, self.kind)?;
        if !self.namespace.is_empty() {
            write!(f, "/{}", self.namespace)?;
        }
        if !self.object_name.is_empty() {
            write!(f, "/{}", self.object_name)?;
        }
        Ok(())
    }
}

/// Selects a cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterOptions {
    pub cloud_name: String,
}

impl ClusterOptions {
    pub fn new(cloud_name: impl Into<String>) -> Self {
        Self { cloud_name: cloud_name.into() }
    }

    pub fn to_ref(&self, kind: ResourceKind) -> ResourceRef {
        ResourceRef::collection(&self.cloud_name, kind, "")
    }
}

/// Selects a namespace within a cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListOptions {
    pub cloud_name: String,
    pub namespace: String,
}

impl ListOptions {
    pub fn new(cloud_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn to_ref(&self, kind: ResourceKind) -> ResourceRef {
        ResourceRef::collection(&self.cloud_name, kind, &self.namespace)
    }
}

/// Selects a single named object within a cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectOptions {
    pub cloud_name: String,
    pub namespace: String,
    pub object_name: String,
}

impl ObjectOptions {
    pub fn new(cloud_name: impl Into<String>, namespace: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            namespace: namespace.into(),
            object_name: object_name.into(),
        }
    }

    /// For cluster-scoped objects such as namespaces
    pub fn cluster_scoped(cloud_name: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self::new(cloud_name, "", object_name)
    }

    pub fn to_ref(&self, kind: ResourceKind) -> ResourceRef {
        ResourceRef::object(&self.cloud_name, kind, &self.namespace, &self.object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_scoped_ref_drops_namespace() {
        let r = ObjectOptions::new("c1", "default", "team-a").to_ref(ResourceKind::Namespace);
        assert_eq!(r.namespace, "");
        assert_eq!(r.scope(), None);
        assert_eq!(r.to_string(), "c1/Namespace/team-a");
    }

    #[test]
    fn test_namespaced_ref() {
        let r = ListOptions::new("c1", "payments").to_ref(ResourceKind::Deployment);
        assert_eq!(r.scope(), Some("payments"));
        assert!(r.object_name.is_empty());
        assert_eq!(r.to_string(), "c1/Deployment/payments");
    }

    #[test]
    fn test_only_namespace_kind_is_cluster_scoped() {
        let cluster_scoped: Vec<_> = ResourceKind::ALL
            .iter()
            .filter(|k| !k.is_namespaced())
            .collect();
        assert_eq!(cluster_scoped, vec![&ResourceKind::Namespace]);
    }
}
