//! User account records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account state, persisted as a small integer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Locked,
}

impl UserStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            UserStatus::Active => 0,
            UserStatus::Locked => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => UserStatus::Active,
            _ => UserStatus::Locked,
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub resource_version: i64,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub status: UserStatus,
    pub role: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl User {
    /// A not-yet-persisted account
    pub fn new(name: impl Into<String>, password_hash: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            resource_version: 0,
            name: name.into(),
            password_hash: password_hash.into(),
            status: UserStatus::Active,
            role: role.into(),
            email: String::new(),
            description: String::new(),
            created_at: now,
            modified_at: now,
        }
    }
}
