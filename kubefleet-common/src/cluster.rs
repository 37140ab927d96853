//! Registered cluster ("cloud") records

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Cluster connection state
///
/// Pending -> Connected -> Unhealthy -> Connected ..., any state -> Disabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Pending,
    Connected,
    Unhealthy,
    Disabled,
}

impl ClusterStatus {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;
        match (self, next) {
            (Disabled, _) => false,
            (_, Disabled) => true,
            (Pending, Connected) | (Pending, Unhealthy) => true,
            (Connected, Unhealthy) | (Unhealthy, Connected) => true,
            (a, b) => a == b,
        }
    }

    /// A client handle exists only in these states
    pub fn has_handle(self) -> bool {
        matches!(self, ClusterStatus::Connected | ClusterStatus::Unhealthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClusterStatus::Pending => "pending",
            ClusterStatus::Connected => "connected",
            ClusterStatus::Unhealthy => "unhealthy",
            ClusterStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClusterStatus::Pending),
            "connected" => Some(ClusterStatus::Connected),
            "unhealthy" => Some(ClusterStatus::Unhealthy),
            "disabled" => Some(ClusterStatus::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque cluster-access credential (a kubeconfig document)
///
/// Never printed and never serialized back out. Deserializes from base64.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBlob(Vec<u8>);

impl CredentialBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialBlob(<redacted>)")
    }
}

impl fmt::Display for CredentialBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for CredentialBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map(CredentialBlob)
            .map_err(serde::de::Error::custom)
    }
}

/// A registered cluster as persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: i64,
    pub resource_version: i64,
    pub name: String,
    pub status: ClusterStatus,
    #[serde(rename = "kube_config", skip_serializing, default)]
    pub credential: CredentialBlob,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Cluster {
    /// A not-yet-persisted record in the Pending state
    pub fn pending(name: impl Into<String>, credential: CredentialBlob, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            resource_version: 0,
            name: name.into(),
            status: ClusterStatus::Pending,
            credential,
            description: description.into(),
            created_at: now,
            modified_at: now,
        }
    }
}
