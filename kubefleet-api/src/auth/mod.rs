//! Account bootstrap
//!
//! Authentication itself lives in the serving layer; the core only makes sure
//! a first administrator exists.

pub mod password;

use crate::config::BootstrapConfig;
use crate::db::UserStore;
use kubefleet_common::{Result, User};

pub const ADMIN_PASSWORD_ENV: &str = "KUBEFLEET_ADMIN_PASSWORD";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const ADMIN_ROLE: &str = "admin";

/// Create the default admin account when no users exist
///
/// Returns the created account, or `None` if the table already had users.
pub async fn ensure_admin(
    users: &dyn UserStore,
    config: &BootstrapConfig,
    password: Option<String>,
) -> Result<Option<User>> {
    let existing = users.list().await?;
    if !existing.is_empty() {
        tracing::info!(count = existing.len(), "Found existing user accounts");
        return Ok(None);
    }

    let password = password.unwrap_or_else(|| {
        tracing::warn!(
            "Using default admin password, set {} for production",
            ADMIN_PASSWORD_ENV
        );
        DEFAULT_ADMIN_PASSWORD.to_string()
    });

    let mut admin = User::new(
        config.admin_user.as_str(),
        password::hash_password(&password)?,
        ADMIN_ROLE,
    );
    admin.email = config.admin_email.clone();
    admin.description = "Default administrator account".to_string();

    let admin = users.create(&admin).await?;
    tracing::info!(user = %admin.name, "Created default admin user");

    Ok(Some(admin))
}
