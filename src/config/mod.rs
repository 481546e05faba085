//! Monitor configuration
//!
//! The engine only ever sees the canonical [`Config`]: a validated list of
//! pairs plus timing settings. Legacy single-pair files and environment
//! overrides are folded in by [`load_config`] before validation.

pub mod loader;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::NotifyTarget;

pub use loader::{load_config, parse_config};

/// Smallest accepted tick interval
pub const MIN_MONITORING_INTERVAL: Duration = Duration::from_secs(10);

/// Connection parameters for one side of a pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub database: String,
}

impl DatabaseConfig {
    fn validate(&self, pair: &str, side: &str) -> Result<(), ConfigError> {
        let missing = if self.host.is_empty() {
            Some("host")
        } else if self.port == 0 {
            Some("port")
        } else if self.username.is_empty() {
            Some("username")
        } else if self.database.is_empty() {
            Some("name")
        } else {
            None
        };

        match missing {
            Some(field) => Err(ConfigError::Invalid(format!(
                "database pair '{}': {} database {} is required",
                pair, side, field
            ))),
            None => Ok(()),
        }
    }
}

/// One source/target relationship under monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    #[serde(default)]
    pub name: String,
    pub source_db: DatabaseConfig,
    pub target_db: DatabaseConfig,
    #[serde(default)]
    pub tables_to_monitor: Vec<String>,
}

/// Validated application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_pairs: Vec<PairConfig>,
    #[serde(default, with = "humantime_serde")]
    pub monitoring_interval: Duration,
    #[serde(default = "defaults::lag_threshold", with = "humantime_serde")]
    pub replica_lag_threshold: Duration,
    #[serde(default = "defaults::query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
    #[serde(default = "defaults::host")]
    pub web_server_host: String,
    #[serde(default = "defaults::port")]
    pub web_server_port: u16,
    #[serde(default = "defaults::broadcast_interval", with = "humantime_serde")]
    pub broadcast_interval: Duration,
    #[serde(default = "defaults::history_retention", with = "humantime_serde")]
    pub history_retention: Duration,
    #[serde(default = "defaults::history_max_entries")]
    pub history_max_entries: usize,
    #[serde(default = "defaults::alert_history_limit")]
    pub alert_history_limit: usize,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub notifications: Vec<NotifyTarget>,
}

mod defaults {
    use std::time::Duration;

    pub fn lag_threshold() -> Duration {
        Duration::from_secs(60)
    }

    pub fn query_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn host() -> String {
        "0.0.0.0".to_string()
    }

    pub fn port() -> u16 {
        8080
    }

    pub fn broadcast_interval() -> Duration {
        Duration::from_secs(5)
    }

    pub fn history_retention() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    /// 24 hours at a 10 second cadence
    pub fn history_max_entries() -> usize {
        8640
    }

    pub fn alert_history_limit() -> usize {
        100
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}

impl Config {
    /// Check required fields and fill zero-valued settings with defaults
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.database_pairs.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one database pair must be configured".into(),
            ));
        }

        let mut names = HashSet::new();
        for (i, pair) in self.database_pairs.iter().enumerate() {
            if pair.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "database pair {}: name is required",
                    i
                )));
            }
            if !names.insert(pair.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "database pair '{}' is defined more than once",
                    pair.name
                )));
            }
            pair.source_db.validate(&pair.name, "source")?;
            pair.target_db.validate(&pair.name, "target")?;
        }

        if self.monitoring_interval < MIN_MONITORING_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "monitoring interval must be at least {} seconds",
                MIN_MONITORING_INTERVAL.as_secs()
            )));
        }

        if self.replica_lag_threshold.is_zero() {
            self.replica_lag_threshold = defaults::lag_threshold();
        }
        if self.query_timeout.is_zero() {
            self.query_timeout = defaults::query_timeout();
        }
        if self.web_server_port == 0 {
            self.web_server_port = defaults::port();
        }
        if self.broadcast_interval.is_zero() {
            self.broadcast_interval = defaults::broadcast_interval();
        }
        if self.history_retention.is_zero() {
            self.history_retention = defaults::history_retention();
        }
        if self.history_max_entries == 0 {
            self.history_max_entries = defaults::history_max_entries();
        }
        if self.alert_history_limit == 0 {
            self.alert_history_limit = defaults::alert_history_limit();
        }
        if self.log_level.is_empty() {
            self.log_level = defaults::log_level();
        }

        Ok(())
    }

    /// Log the effective configuration (credentials omitted)
    pub fn log_summary(&self) {
        tracing::info!("Monitor configuration:");
        tracing::info!("  Monitoring interval: {:?}", self.monitoring_interval);
        tracing::info!("  Replica lag threshold: {:?}", self.replica_lag_threshold);
        tracing::info!("  Query timeout: {:?}", self.query_timeout);
        tracing::info!(
            "  Web server: {}:{}",
            self.web_server_host,
            self.web_server_port
        );
        tracing::info!("  Database pairs: {}", self.database_pairs.len());
        for pair in &self.database_pairs {
            tracing::info!(
                "    - {}: {}@{}:{}/{} -> {}@{}:{}/{} tables={:?}",
                pair.name,
                pair.source_db.username,
                pair.source_db.host,
                pair.source_db.port,
                pair.source_db.database,
                pair.target_db.username,
                pair.target_db.host,
                pair.target_db.port,
                pair.target_db.database,
                pair.tables_to_monitor
            );
        }
        if !self.notifications.is_empty() {
            tracing::info!("  Notification targets: {}", self.notifications.len());
        }
    }
}

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
