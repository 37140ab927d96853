//! Logging configuration module
//!
//! Console output plus an optional rolling JSON file, filtered by `RUST_LOG`
//! or the configured level.

use kubefleet_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "kubefleet.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for rolling log files; `None` disables file output
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Console output as JSON
    pub json_format: bool,
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl FromStr for LogRotation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" => Ok(LogRotation::Hourly),
            "daily" => Ok(LogRotation::Daily),
            "never" => Ok(LogRotation::Never),
            other => Err(Error::Config(format!("unknown log rotation '{}'", other))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            rotation: LogRotation::Daily,
            json_format: false,
        }
    }
}

impl From<&crate::config::LoggingConfig> for LoggingConfig {
    fn from(config: &crate::config::LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            file_path: config
                .file_logging_enabled
                .then(|| config.log_dir.clone()),
            rotation: config.rotation,
            json_format: config.json,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// The returned guard flushes the file writer when dropped; keep it alive
    /// for the life of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::Config(format!("invalid log level '{}': {}", self.level, e)))?;

        let console_text = (!self.json_format).then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_writer(io::stdout)
        });
        let console_json = self
            .json_format
            .then(|| fmt::layer().json().with_target(true).with_writer(io::stdout));

        let (file_layer, guard) = match &self.file_path {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    Error::Config(format!("failed to create log directory {:?}: {}", dir, e))
                })?;

                let file_appender = match self.rotation {
                    LogRotation::Hourly => rolling::hourly(dir, LOG_FILE_PREFIX),
                    LogRotation::Daily => rolling::daily(dir, LOG_FILE_PREFIX),
                    LogRotation::Never => rolling::never(dir, LOG_FILE_PREFIX),
                };
                let (writer, guard) = non_blocking(file_appender);

                let layer = fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_text)
            .with(console_json)
            .with(file_layer)
            .try_init()
            .map_err(|e| Error::Config(format!("failed to install logger: {}", e)))?;

        tracing::info!(level = %self.level, file = ?self.file_path, "Logging initialized");

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file_path.is_none());
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = crate::config::LoggingConfig::default();
        assert!(LoggingConfig::from(&settings).file_path.is_none());

        settings.file_logging_enabled = true;
        settings.json = true;
        settings.rotation = LogRotation::Hourly;
        let config = LoggingConfig::from(&settings);
        assert_eq!(config.file_path, Some(PathBuf::from("/var/log/kubefleet")));
        assert!(config.json_format);
        assert_eq!(config.rotation, LogRotation::Hourly);
    }

    #[test]
    fn test_rotation_parse() {
        assert_eq!("Never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!(matches!("weekly".parse::<LogRotation>(), Err(Error::Config(_))));
    }
}
