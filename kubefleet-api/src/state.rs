//! Application State
//!
//! Everything a serving layer needs, built once at startup and shared by
//! cloning.

use crate::auth;
use crate::config::FleetConfig;
use crate::db::Database;
use crate::kubernetes::{CallContext, ClusterRegistry, Connector, RehydrationReport, ResourceOperator};
use kubefleet_common::Result;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FleetConfig>,
    pub database: Arc<Database>,
    pub registry: ClusterRegistry,
    pub operator: ResourceOperator,
}

impl AppState {
    /// Connect and migrate the database, seed the admin account and rehydrate
    /// the registry
    ///
    /// Any database failure aborts; unreachable clusters do not.
    pub async fn initialize(config: FleetConfig, connector: Arc<dyn Connector>) -> Result<(Self, RehydrationReport)> {
        let database = Database::new(&config.database.url, config.database.max_connections).await?;
        database.migrate().await?;
        database.health_check().await?;

        let users = database.users();
        auth::ensure_admin(
            &users,
            &config.bootstrap,
            std::env::var(auth::ADMIN_PASSWORD_ENV).ok(),
        )
        .await?;

        let registry = ClusterRegistry::new(
            Arc::new(database.clusters()),
            connector,
            config.registry.settings(),
        );
        let report = registry.rehydrate().await?;

        let state = Self {
            config: Arc::new(config),
            database: Arc::new(database),
            operator: ResourceOperator::new(registry.clone()),
            registry,
        };

        Ok((state, report))
    }

    /// Call context with the configured default deadline
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.config.operator.default_timeout())
    }

    /// Stop background probers and close the database
    pub async fn shutdown(self) {
        self.registry.shutdown();
        match Arc::try_unwrap(self.database) {
            Ok(database) => database.close().await,
            Err(shared) => shared.pool().close().await,
        }
    }
}
