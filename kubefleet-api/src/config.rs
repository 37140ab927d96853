//! Configuration management for kubefleet
//!
//! Settings are layered:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use crate::kubernetes::RegistrySettings;
use crate::logging::LogRotation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct for kubefleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub database: DatabaseConfig,
    /// Cluster connection and health probing
    pub registry: RegistryConfig,
    /// Remote call defaults
    pub operator: OperatorConfig,
    pub logging: LoggingConfig,
    /// First-run account seeding
    pub bootstrap: BootstrapConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite:///var/lib/kubefleet/kubefleet.db")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Cluster registry timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds between background health probes of one cluster
    pub probe_interval_secs: u64,
    /// Deadline for one background probe
    pub probe_timeout_secs: u64,
    /// Consecutive failed probes before a cluster is marked unhealthy
    pub failure_threshold: u32,
    /// Deadline for connecting and probing during register/refresh
    pub connect_timeout_secs: u64,
    /// Read timeout applied to every HTTP request to a cluster
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Deadline for remote calls when the caller does not pick one
    pub default_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Enable file logging
    pub file_logging_enabled: bool,
    /// Log file rotation: hourly, daily or never
    pub rotation: LogRotation,
    /// Console output as JSON instead of text
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Account created when the user table is empty
    pub admin_user: String,
    pub admin_email: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///var/lib/kubefleet/kubefleet.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
            failure_threshold: 3,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/kubefleet"),
            file_logging_enabled: false,
            rotation: LogRotation::Daily,
            json: false,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            admin_email: "admin@localhost".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            failure_threshold: self.failure_threshold,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl OperatorConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl FleetConfig {
    /// Load from the first config file found, apply environment overrides, validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.clone(), e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("KUBEFLEET_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/kubefleet/config.toml")),
            Some(PathBuf::from("./kubefleet.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `KUBEFLEET_*` overrides from `lookup`; unparsable numbers are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn number<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *target = parsed;
            }
        }

        // Database
        if let Some(url) = lookup("KUBEFLEET_DATABASE_URL") {
            self.database.url = url;
        }
        number(lookup("KUBEFLEET_DATABASE_MAX_CONNECTIONS"), &mut self.database.max_connections);

        // Registry
        number(lookup("KUBEFLEET_PROBE_INTERVAL_SECS"), &mut self.registry.probe_interval_secs);
        number(lookup("KUBEFLEET_PROBE_TIMEOUT_SECS"), &mut self.registry.probe_timeout_secs);
        number(lookup("KUBEFLEET_FAILURE_THRESHOLD"), &mut self.registry.failure_threshold);
        number(lookup("KUBEFLEET_CONNECT_TIMEOUT_SECS"), &mut self.registry.connect_timeout_secs);
        number(lookup("KUBEFLEET_READ_TIMEOUT_SECS"), &mut self.registry.read_timeout_secs);

        // Operator
        number(lookup("KUBEFLEET_DEFAULT_TIMEOUT_SECS"), &mut self.operator.default_timeout_secs);

        // Logging
        if let Some(level) = lookup("KUBEFLEET_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("KUBEFLEET_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(path);
        }
        if let Some(enabled) = lookup("KUBEFLEET_FILE_LOGGING") {
            self.logging.file_logging_enabled = enabled.parse().unwrap_or(true);
        }
        if let Some(rotation) = lookup("KUBEFLEET_LOG_ROTATION") {
            if let Ok(rotation) = rotation.parse() {
                self.logging.rotation = rotation;
            }
        }
        if let Some(json) = lookup("KUBEFLEET_LOG_JSON") {
            self.logging.json = json.parse().unwrap_or(false);
        }

        // Bootstrap
        if let Some(user) = lookup("KUBEFLEET_ADMIN_USER") {
            self.bootstrap.admin_user = user;
        }
        if let Some(email) = lookup("KUBEFLEET_ADMIN_EMAIL") {
            self.bootstrap.admin_email = email;
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Validation("Database URL cannot be empty".to_string()));
        }

        let registry = &self.registry;
        if registry.probe_interval_secs == 0 {
            return Err(ConfigError::Validation("Probe interval cannot be 0".to_string()));
        }
        if registry.probe_timeout_secs == 0 {
            return Err(ConfigError::Validation("Probe timeout cannot be 0".to_string()));
        }
        if registry.probe_timeout_secs >= registry.probe_interval_secs {
            return Err(ConfigError::Validation(
                "Probe timeout must be shorter than the probe interval".to_string(),
            ));
        }
        if registry.failure_threshold == 0 {
            return Err(ConfigError::Validation("Failure threshold cannot be 0".to_string()));
        }
        if registry.connect_timeout_secs == 0 || self.operator.default_timeout_secs == 0 {
            return Err(ConfigError::Validation("Timeouts cannot be 0".to_string()));
        }

        if self.bootstrap.admin_user.trim().is_empty() {
            return Err(ConfigError::Validation("Admin user name cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for kubefleet_common::Error {
    fn from(err: ConfigError) -> Self {
        kubefleet_common::Error::Config(err.to_string())
    }
}
