//! Cluster repository

use super::map_sqlx_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubefleet_common::{Cluster, ClusterStatus, CredentialBlob, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Durable storage for cluster registrations
///
/// Updates are optimistic: the caller passes the `resource_version` it last
/// read and a mismatch fails with `Conflict`.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Insert a new row; the returned record carries its id and version 1
    async fn create(&self, cluster: &Cluster) -> Result<Cluster>;

    async fn get(&self, id: i64) -> Result<Cluster>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>>;

    /// All rows ordered by name
    async fn list(&self) -> Result<Vec<Cluster>>;

    /// Replace credential, status and description (the name is immutable)
    async fn update(&self, cluster: &Cluster) -> Result<Cluster>;

    async fn update_status(&self, id: i64, resource_version: i64, status: ClusterStatus) -> Result<Cluster>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLite-backed [`ClusterStore`]
#[derive(Clone)]
pub struct ClusterRepository {
    pool: SqlitePool,
}

impl ClusterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Zero rows touched by a versioned update: find out why
    async fn stale_or_missing(&self, id: i64, resource_version: i64) -> Error {
        match self.get(id).await {
            Ok(current) => Error::Conflict(format!(
                "cluster '{}' is at resource version {}, update was based on {}",
                current.name, current.resource_version, resource_version
            )),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ClusterStore for ClusterRepository {
    async fn create(&self, cluster: &Cluster) -> Result<Cluster> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO clusters (resource_version, name, status, kube_config, description, created_at, modified_at)
             VALUES (1, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cluster.name)
        .bind(cluster.status.as_str())
        .bind(cluster.credential.as_bytes())
        .bind(&cluster.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create cluster", e, || Error::DuplicateName(cluster.name.clone())))?;

        self.get(result.last_insert_rowid()).await
    }

    async fn get(&self, id: i64) -> Result<Cluster> {
        let row = sqlx::query("SELECT * FROM clusters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get cluster: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("cluster {}", id)))?;

        row_to_cluster(&row)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        let row = sqlx::query("SELECT * FROM clusters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get cluster: {}", e)))?;

        row.as_ref().map(row_to_cluster).transpose()
    }

    async fn list(&self) -> Result<Vec<Cluster>> {
        let rows = sqlx::query("SELECT * FROM clusters ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list clusters: {}", e)))?;

        rows.iter().map(row_to_cluster).collect()
    }

    async fn update(&self, cluster: &Cluster) -> Result<Cluster> {
        let result = sqlx::query(
            "UPDATE clusters SET resource_version = resource_version + 1, status = ?, kube_config = ?,
             description = ?, modified_at = ?
             WHERE id = ? AND resource_version = ?",
        )
        .bind(cluster.status.as_str())
        .bind(cluster.credential.as_bytes())
        .bind(&cluster.description)
        .bind(Utc::now())
        .bind(cluster.id)
        .bind(cluster.resource_version)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to update cluster: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self.stale_or_missing(cluster.id, cluster.resource_version).await);
        }

        self.get(cluster.id).await
    }

    async fn update_status(&self, id: i64, resource_version: i64, status: ClusterStatus) -> Result<Cluster> {
        let result = sqlx::query(
            "UPDATE clusters SET resource_version = resource_version + 1, status = ?, modified_at = ?
             WHERE id = ? AND resource_version = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(resource_version)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to update cluster status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self.stale_or_missing(id, resource_version).await);
        }

        self.get(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete cluster: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("cluster {}", id)));
        }

        Ok(())
    }
}

fn row_to_cluster(row: &SqliteRow) -> Result<Cluster> {
    let status: String = row.get("status");
    let status = ClusterStatus::parse(&status)
        .ok_or_else(|| Error::Storage(format!("Unknown cluster status '{}'", status)))?;
    let credential: Vec<u8> = row.get("kube_config");
    let created_at: DateTime<Utc> = row.get("created_at");
    let modified_at: DateTime<Utc> = row.get("modified_at");

    Ok(Cluster {
        id: row.get("id"),
        resource_version: row.get("resource_version"),
        name: row.get("name"),
        status,
        credential: CredentialBlob::new(credential),
        description: row.get("description"),
        created_at,
        modified_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn sample(name: &str) -> Cluster {
        let mut cluster = Cluster::pending(name, CredentialBlob::new(b"apiVersion: v1".to_vec()), "test");
        cluster.status = ClusterStatus::Connected;
        cluster
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        let created = repo.create(&sample("alpha")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.resource_version, 1);
        assert_eq!(created.credential.as_bytes(), b"apiVersion: v1");

        let by_name = repo.get_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(by_name, created);
        assert!(repo.get_by_name("beta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        repo.create(&sample("alpha")).await.unwrap();
        let err = repo.create(&sample("alpha")).await.unwrap_err();
        assert_eq!(err, Error::DuplicateName("alpha".to_string()));
    }

    #[tokio::test]
    async fn test_update_increments_version_once() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        let mut cluster = repo.create(&sample("alpha")).await.unwrap();
        cluster.description = "rotated".to_string();
        let updated = repo.update(&cluster).await.unwrap();
        assert_eq!(updated.resource_version, cluster.resource_version + 1);
        assert_eq!(updated.description, "rotated");
        assert_eq!(updated.name, "alpha");
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        let cluster = repo.create(&sample("alpha")).await.unwrap();
        repo.update_status(cluster.id, cluster.resource_version, ClusterStatus::Unhealthy)
            .await
            .unwrap();

        // Second writer still holds version 1
        let err = repo.update(&cluster).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let stored = repo.get(cluster.id).await.unwrap();
        assert_eq!(stored.resource_version, 2);
        assert_eq!(stored.status, ClusterStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        let mut ghost = sample("ghost");
        ghost.id = 99;
        ghost.resource_version = 1;
        assert!(matches!(repo.update(&ghost).await, Err(Error::NotFound(_))));
        assert!(matches!(repo.delete(99).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_name() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.clusters();

        for name in ["gamma", "alpha", "beta"] {
            repo.create(&sample(name)).await.unwrap();
        }
        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }
}
