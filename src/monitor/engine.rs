//! Global tick loop driving every pair

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::scheduler::{CycleReport, PairScheduler};
use super::MeasurementSink;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Running,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => f.write_str("stopped"),
            EngineState::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("monitoring engine is already running")]
    AlreadyRunning,
}

struct Running {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns all pair schedulers and runs one cycle per tick.
///
/// Ticks never overlap: a slow cycle delays the next tick instead of queueing it.
pub struct MonitoringEngine {
    pairs: Vec<Arc<PairScheduler>>,
    sink: Arc<dyn MeasurementSink>,
    interval: Duration,
    state: RwLock<EngineState>,
    control: Mutex<Option<Running>>,
}

impl MonitoringEngine {
    pub fn new(
        pairs: Vec<PairScheduler>,
        sink: Arc<dyn MeasurementSink>,
        interval: Duration,
    ) -> Self {
        Self {
            pairs: pairs.into_iter().map(Arc::new).collect(),
            sink,
            interval,
            state: RwLock::new(EngineState::Stopped),
            control: Mutex::new(None),
        }
    }

    /// Engine over MySQL/MariaDB pairs from a validated configuration
    pub fn from_config(config: &Config, sink: Arc<dyn MeasurementSink>) -> Self {
        let pairs = config
            .database_pairs
            .iter()
            .map(|pair| PairScheduler::from_config(pair, config.query_timeout))
            .collect();
        Self::new(pairs, sink, config.monitoring_interval)
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Number of configured pairs
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Names of the configured pairs, in configuration order
    pub fn pair_names(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.name().to_string()).collect()
    }

    /// Connect every pair (best-effort) and start ticking.
    ///
    /// The first cycle runs immediately.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let healths = join_all(
            self.pairs
                .iter()
                .map(|pair| async move { (pair.name(), pair.connect().await) }),
        )
        .await;
        for (name, health) in healths {
            self.sink.update_health(name, health);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(Self::run(
            self.pairs.clone(),
            Arc::clone(&self.sink),
            self.interval,
            shutdown_rx,
        ));

        *control = Some(Running {
            shutdown_tx,
            handle,
        });
        *self.state.write() = EngineState::Running;

        tracing::info!(
            pairs = self.pairs.len(),
            interval = ?self.interval,
            "Monitoring engine started"
        );
        Ok(())
    }

    /// Stop ticking, wait for the in-flight cycle, then release connections.
    ///
    /// A no-op when already stopped.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(running) = control.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(()).await;
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Monitoring loop terminated abnormally");
        }

        join_all(self.pairs.iter().map(|pair| pair.close())).await;
        *self.state.write() = EngineState::Stopped;
        tracing::info!("Monitoring engine stopped");
    }

    /// Run a single cycle across all pairs outside the tick loop
    pub async fn run_cycle(&self) -> Vec<CycleReport> {
        Self::cycle(&self.pairs, &self.sink).await
    }

    async fn run(
        pairs: Vec<Arc<PairScheduler>>,
        sink: Arc<dyn MeasurementSink>,
        period: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("Monitoring loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    Self::cycle(&pairs, &sink).await;
                }
            }
        }
    }

    /// Every pair runs as its own task; a panicking pair is logged and skipped
    async fn cycle(
        pairs: &[Arc<PairScheduler>],
        sink: &Arc<dyn MeasurementSink>,
    ) -> Vec<CycleReport> {
        let started = Instant::now();
        tracing::debug!(pairs = pairs.len(), "Starting monitoring cycle");

        let tasks = pairs.iter().map(|pair| {
            let pair = Arc::clone(pair);
            let sink = Arc::clone(sink);
            tokio::spawn(async move { pair.run_cycle(sink.as_ref()).await })
        });
        let results = join_all(tasks).await;

        let mut reports = Vec::with_capacity(results.len());
        for (pair, result) in pairs.iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(pair = %pair.name(), error = %e, "Pair cycle failed");
                }
            }
        }

        tracing::debug!(
            pairs = reports.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Monitoring cycle finished"
        );
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::alerts::AlertEngine;
    use crate::database::scripted::{running_replica, ScriptedConnection};
    use crate::metrics::MetricsStore;
    use crate::monitor::MonitorSink;

    struct Pair {
        source: Arc<ScriptedConnection>,
        target: Arc<ScriptedConnection>,
    }

    fn pair(name: &str, lag: &str) -> (Pair, PairScheduler) {
        let source = Arc::new(ScriptedConnection::new(format!("source[{}]", name)));
        let target = Arc::new(ScriptedConnection::new(format!("target[{}]", name)));
        target.set_replication(Ok(Some(running_replica(lag))));
        let scheduler = PairScheduler::new(
            name,
            Vec::new(),
            source.clone(),
            target.clone(),
            Duration::from_secs(30),
        );
        (Pair { source, target }, scheduler)
    }

    fn engine(pairs: Vec<PairScheduler>) -> (MonitoringEngine, Arc<MetricsStore>) {
        let store = Arc::new(MetricsStore::default());
        let alerts = Arc::new(AlertEngine::new(Duration::from_secs(60), 100));
        let sink = Arc::new(MonitorSink::new(Arc::clone(&store), alerts));
        (
            MonitoringEngine::new(pairs, sink, Duration::from_secs(10)),
            store,
        )
    }

    #[tokio::test]
    async fn test_pairs_are_isolated() {
        let (a, scheduler_a) = pair("a", "2");
        let (_b, scheduler_b) = pair("b", "4");
        a.target.set_reachable(false);
        let (engine, store) = engine(vec![scheduler_a, scheduler_b]);

        let reports = engine.run_cycle().await;

        assert_eq!(reports.len(), 2);
        let snapshot = store.snapshot();
        assert!(!snapshot.replica_lag.contains_key("a"));
        assert_eq!(snapshot.replica_lag["b"].lag_seconds, 4.0);
        assert!(!snapshot.connection_status["a"].target_connected);
        assert!(snapshot.connection_status["b"].both_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately_then_every_interval() {
        let (p, scheduler) = pair("orders-db", "1");
        let (engine, store) = engine(vec![scheduler]);

        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Running);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(p.target.query_count(), 1);
        assert!(store.snapshot().replica_lag.contains_key("orders-db"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(p.target.query_count(), 2);

        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_delays_next_tick() {
        let (p, scheduler) = pair("orders-db", "1");
        p.target.set_delay(Duration::from_secs(15));
        let (engine, _store) = engine(vec![scheduler]);

        engine.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(p.target.query_count(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(p.target.query_count(), 2);

        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_cycle_and_closes() {
        let (p, scheduler) = pair("orders-db", "7");
        p.target.set_delay(Duration::from_secs(3));
        let (engine, store) = engine(vec![scheduler]);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.snapshot().replica_lag.is_empty());

        engine.stop().await;

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(store.snapshot().replica_lag["orders-db"].lag_seconds, 7.0);
        assert!(p.source.is_closed());
        assert!(p.target.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_ping_does_not_stall_other_pairs() {
        let (good, scheduler_good) = pair("good", "1");
        let (hung, scheduler_hung) = pair("hung", "1");
        hung.source.set_ping_hangs(true);
        let (engine, store) = engine(vec![scheduler_good, scheduler_hung]);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(good.target.query_count() >= 3);
        assert!(!store.snapshot().connection_status["hung"].source_connected);

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_pair_recorded_before_slow_pair_finishes() {
        let (_a, scheduler_a) = pair("a", "2");
        let (b, scheduler_b) = pair("b", "4");
        b.target.set_delay(Duration::from_secs(20));
        let (engine, store) = engine(vec![scheduler_a, scheduler_b]);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.replica_lag["a"].lag_seconds, 2.0);
        assert!(!snapshot.replica_lag.contains_key("b"));

        engine.stop().await;
        assert_eq!(store.snapshot().replica_lag["b"].lag_seconds, 4.0);
    }

    #[tokio::test]
    async fn test_start_twice_fails_and_stop_is_idempotent() {
        let (_p, scheduler) = pair("orders-db", "0");
        let (engine, _store) = engine(vec![scheduler]);

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(EngineError::AlreadyRunning)
        ));

        engine.stop().await;
        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_start_records_initial_health_for_unreachable_pair() {
        let (p, scheduler) = pair("orders-db", "0");
        p.source.set_reachable(false);
        p.target.set_reachable(false);
        let (engine, store) = engine(vec![scheduler]);

        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        let health = store.snapshot().connection_status["orders-db"];
        assert!(!health.source_connected && !health.target_connected);

        engine.stop().await;
    }
}
