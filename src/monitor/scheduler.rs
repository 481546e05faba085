//! One pair's measurement cycle

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::MeasurementSink;
use crate::config::PairConfig;
use crate::database::{DatabaseConnection, MySqlDatabase};
use crate::probe::{ConnectionHealth, CountProbe, FingerprintProbe, LagProbe, Measurement};

/// Everything one pair produced in one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub pair: String,
    pub health: ConnectionHealth,
    pub measurements: Vec<Measurement>,
}

/// Runs the health check and probes of a single pair.
///
/// The scheduler exclusively owns the pair's two connections.
pub struct PairScheduler {
    name: String,
    tables: Vec<String>,
    source: Arc<dyn DatabaseConnection>,
    target: Arc<dyn DatabaseConnection>,
    query_timeout: Duration,
    lag: LagProbe,
    fingerprint: FingerprintProbe,
    count: CountProbe,
}

impl PairScheduler {
    /// Scheduler over two already built connections
    pub fn new(
        name: impl Into<String>,
        tables: Vec<String>,
        source: Arc<dyn DatabaseConnection>,
        target: Arc<dyn DatabaseConnection>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            tables,
            source,
            target,
            query_timeout,
            lag: LagProbe::new(query_timeout),
            fingerprint: FingerprintProbe::new(query_timeout),
            count: CountProbe::new(query_timeout),
        }
    }

    /// Scheduler backed by MySQL/MariaDB connections
    pub fn from_config(pair: &PairConfig, query_timeout: Duration) -> Self {
        let source = MySqlDatabase::new(format!("source[{}]", pair.name), &pair.source_db);
        let target = MySqlDatabase::new(format!("target[{}]", pair.name), &pair.target_db);
        Self::new(
            pair.name.clone(),
            pair.tables_to_monitor.clone(),
            Arc::new(source),
            Arc::new(target),
            query_timeout,
        )
    }

    /// Pair name used in logs, metrics and alert keys
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort initial connect of both sides
    pub async fn connect(&self) -> ConnectionHealth {
        let (source, target) = tokio::join!(self.source.connect(), self.target.connect());

        for (side, result) in [(&self.source, &source), (&self.target, &target)] {
            if let Err(e) = result {
                tracing::warn!(
                    pair = %self.name,
                    connection = %side.label(),
                    error = %e,
                    "Initial connection failed, will retry every cycle"
                );
            }
        }

        ConnectionHealth::new(source.is_ok(), target.is_ok())
    }

    /// Refresh health, then run every applicable probe concurrently.
    ///
    /// Each measurement is handed to `sink` as soon as its probe finishes.
    pub async fn run_cycle(&self, sink: &dyn MeasurementSink) -> CycleReport {
        let (source_up, target_up) = tokio::join!(
            self.check(self.source.as_ref()),
            self.check(self.target.as_ref())
        );
        let health = ConnectionHealth::new(source_up, target_up);
        sink.update_health(&self.name, health);

        if !health.both_connected() {
            tracing::warn!(
                pair = %self.name,
                source_connected = source_up,
                target_connected = target_up,
                "Pair not fully connected"
            );
        }

        let run_tables = health.both_connected() && !self.tables.is_empty();
        if !run_tables && !self.tables.is_empty() {
            tracing::debug!(pair = %self.name, "Skipping table probes this cycle");
        }

        let lag = async {
            if !target_up {
                tracing::debug!(pair = %self.name, "Target unreachable, skipping lag probe");
                return None;
            }
            let m = Measurement::Lag(self.lag.measure(&self.name, self.target.as_ref()).await);
            sink.record(&m);
            Some(m)
        };

        let fingerprints = async {
            if !run_tables {
                return Vec::new();
            }
            join_all(self.tables.iter().map(|table| async move {
                let m = Measurement::Fingerprint(
                    self.fingerprint
                        .measure(&self.name, table, self.source.as_ref(), self.target.as_ref())
                        .await,
                );
                sink.record(&m);
                m
            }))
            .await
        };

        let counts = async {
            if !run_tables {
                return Vec::new();
            }
            join_all(self.tables.iter().map(|table| async move {
                let m = Measurement::Count(
                    self.count
                        .measure(&self.name, table, self.source.as_ref(), self.target.as_ref())
                        .await,
                );
                sink.record(&m);
                m
            }))
            .await
        };

        let (lag, fingerprints, counts) = tokio::join!(lag, fingerprints, counts);

        let mut measurements: Vec<Measurement> = lag.into_iter().collect();
        measurements.extend(fingerprints);
        measurements.extend(counts);

        CycleReport {
            pair: self.name.clone(),
            health,
            measurements,
        }
    }

    /// A ping that outlives the query timeout counts as unreachable
    async fn check(&self, side: &dyn DatabaseConnection) -> bool {
        match tokio::time::timeout(self.query_timeout, side.ping()).await {
            Ok(up) => up,
            Err(_) => {
                tracing::warn!(
                    pair = %self.name,
                    connection = %side.label(),
                    timeout = ?self.query_timeout,
                    "Health check timed out"
                );
                false
            }
        }
    }

    /// Release both connections
    pub async fn close(&self) {
        tokio::join!(self.source.close(), self.target.close());
        tracing::debug!(pair = %self.name, "Connections released");
    }
}
