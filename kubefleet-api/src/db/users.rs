//! User repository

use super::map_sqlx_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubefleet_common::{Error, Result, User, UserStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Durable storage for user accounts, same version contract as clusters
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get(&self, id: i64) -> Result<User>;

    async fn get_by_name(&self, name: &str) -> Result<Option<User>>;

    async fn list(&self) -> Result<Vec<User>>;

    async fn update(&self, user: &User) -> Result<User>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLite-backed [`UserStore`]
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (resource_version, name, password_hash, status, role, email, description, created_at, modified_at)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.status.as_i64())
        .bind(&user.role)
        .bind(&user.email)
        .bind(&user.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create user", e, || Error::AlreadyExists(format!("user '{}'", user.name))))?;

        self.get(result.last_insert_rowid()).await
    }

    async fn get(&self, id: i64) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get user: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))?;

        Ok(row_to_user(&row))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get user: {}", e)))?;

        Ok(row.as_ref().map(row_to_user))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list users: {}", e)))?;

        Ok(rows.iter().map(row_to_user).collect())
    }

    async fn update(&self, user: &User) -> Result<User> {
        let result = sqlx::query(
            "UPDATE users SET resource_version = resource_version + 1, name = ?, password_hash = ?,
             status = ?, role = ?, email = ?, description = ?, modified_at = ?
             WHERE id = ? AND resource_version = ?",
        )
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.status.as_i64())
        .bind(&user.role)
        .bind(&user.email)
        .bind(&user.description)
        .bind(Utc::now())
        .bind(user.id)
        .bind(user.resource_version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update user", e, || Error::AlreadyExists(format!("user '{}'", user.name))))?;

        if result.rows_affected() == 0 {
            let current = self.get(user.id).await?;
            return Err(Error::Conflict(format!(
                "user '{}' is at resource version {}, update was based on {}",
                current.name, current.resource_version, user.resource_version
            )));
        }

        self.get(user.id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }

        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> User {
    let created_at: DateTime<Utc> = row.get("created_at");
    let modified_at: DateTime<Utc> = row.get("modified_at");

    User {
        id: row.get("id"),
        resource_version: row.get("resource_version"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        status: UserStatus::from_i64(row.get("status")),
        role: row.get("role"),
        email: row.get("email"),
        description: row.get("description"),
        created_at,
        modified_at,
    }
}
