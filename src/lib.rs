//! replmon: live divergence monitor for replication-based migrations
//!
//! Continuously compares pairs of MySQL/MariaDB servers (a source and the
//! replica it feeds) and surfaces divergence as alerts and live metrics.
//!
//! # Features
//!
//! - **Replica Lag**: replication thread state and seconds behind source
//! - **Table Fingerprints**: engine-native whole-table checksums on both sides
//! - **Row Counts**: exact per-table row count comparison
//! - **Alerting**: deduplicated open/resolve transitions, log and webhook targets
//! - **Dashboard**: REST API plus WebSocket push of the current snapshot
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use replmon::alerts::AlertEngine;
//! use replmon::config::load_config;
//! use replmon::metrics::MetricsStore;
//! use replmon::monitor::{MonitorSink, MonitoringEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("config.yaml")?;
//! let store = Arc::new(MetricsStore::new(config.history_retention, config.history_max_entries));
//! let alerts = Arc::new(AlertEngine::new(config.replica_lag_threshold, config.alert_history_limit));
//! let sink = Arc::new(MonitorSink::new(Arc::clone(&store), Arc::clone(&alerts)));
//!
//! let engine = MonitoringEngine::from_config(&config, sink);
//! engine.start().await?;
//! println!("{:?}", store.snapshot());
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod database;
pub mod metrics;
pub mod monitor;
pub mod probe;

// Re-export commonly used types
pub use alerts::{Alert, AlertEngine, AlertEvent};
pub use config::{load_config, Config, ConfigError};
pub use metrics::{MetricsSnapshot, MetricsStore};
pub use monitor::{MonitoringEngine, PairScheduler};
pub use probe::{Measurement, ProbeStatus};
