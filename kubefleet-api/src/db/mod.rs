//! Database layer using SQLite
//!
//! Persistent storage for registered clusters and user accounts. Callers go
//! through the per-entity repositories ([`ClusterStore`], [`UserStore`]) and
//! never see SQL.

pub mod clusters;
pub mod migrations;
pub mod users;

pub use clusters::{ClusterRepository, ClusterStore};
pub use users::{UserRepository, UserStore};

use kubefleet_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Create parent directory if needed
        if !in_memory {
            if let Some(path) = database_url.strip_prefix("sqlite://") {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await.map_err(|e| {
                            Error::Storage(format!("Failed to create DB directory: {}", e))
                        })?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Storage(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        // Every connection to ":memory:" is a separate database, so pin it to one
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Database connection failed: {}", e)))?;

        tracing::info!(in_memory, "Database connection established");

        Ok(Self { pool })
    }

    /// Open a private in-memory database with migrations applied
    pub async fn in_memory() -> Result<Self> {
        let db = Self::new("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Verify the database answers queries
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cluster repository
    pub fn clusters(&self) -> ClusterRepository {
        ClusterRepository::new(self.pool.clone())
    }

    /// User repository
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}

/// Translate a driver error, surfacing unique-key violations as `on_unique`
pub(crate) fn map_sqlx_error(action: &str, err: sqlx::Error, on_unique: impl FnOnce() -> Error) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => on_unique(),
        _ => Error::Storage(format!("Failed to {}: {}", action, err)),
    }
}
