//! Kubernetes integration for kubefleet
//!
//! - Credential parsing (kubeconfig blobs)
//! - The cluster registry and its background health probers
//! - The resource operator dispatching CRUD calls by cluster name
//! - The remote API seam ([`ClusterClient`], [`Connector`]) and its kube-rs
//!   implementation

pub mod client;
pub mod credentials;
pub mod error;
pub mod operator;
pub mod prober;
pub mod registry;
pub mod resources;

pub use client::{ClientHandle, ClusterClient, Connector, KubeClient, KubeConnector};
pub use credentials::ConnectionParams;
pub use error::{RemoteError, Verb};
pub use operator::{CallContext, ResourceOperator};
pub use registry::{ClusterRegistry, RegistrySettings, RehydrationReport};
pub use resources::KubeResource;
