//! Thread-safe store of current and recent measurements

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::history::{cutoff, to_chrono, HistoryWindow};
use crate::probe::{
    ConnectionHealth, CountMeasurement, FingerprintMeasurement, LagMeasurement, Measurement,
};

/// Point-in-time copy of everything the store holds
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Latest lag measurement per pair
    pub replica_lag: BTreeMap<String, LagMeasurement>,
    /// Last fingerprint result per (pair, table), ordered by pair then table
    pub fingerprint_results: Vec<FingerprintMeasurement>,
    /// Last row count result per (pair, table)
    pub count_results: Vec<CountMeasurement>,
    pub connection_status: BTreeMap<String, ConnectionHealth>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    lag: HashMap<String, HistoryWindow>,
    fingerprints: BTreeMap<(String, String), FingerprintMeasurement>,
    counts: BTreeMap<(String, String), CountMeasurement>,
    health: BTreeMap<String, ConnectionHealth>,
}

/// The single shared store of measurements.
///
/// Everything behind one reader/writer lock; callers only ever receive copies.
pub struct MetricsStore {
    inner: RwLock<StoreInner>,
    retention: Duration,
    max_entries: usize,
}

impl MetricsStore {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            retention,
            max_entries,
        }
    }

    /// Record any measurement in its slot
    pub fn record(&self, measurement: &Measurement) {
        match measurement {
            Measurement::Lag(m) => self.record_lag(m.clone()),
            Measurement::Fingerprint(m) => self.record_fingerprint(m.clone()),
            Measurement::Count(m) => self.record_count(m.clone()),
        }
    }

    /// Append a lag measurement to its pair's history
    pub fn record_lag(&self, measurement: LagMeasurement) {
        self.record_lag_at(measurement, Utc::now());
    }

    /// Append to the pair's history, pruning relative to `now`
    pub fn record_lag_at(&self, measurement: LagMeasurement, now: DateTime<Utc>) {
        let mut inner = self.inner.write();
        let (retention, max_entries) = (self.retention, self.max_entries);
        inner
            .lag
            .entry(measurement.pair.clone())
            .or_insert_with(|| HistoryWindow::new(retention, max_entries))
            .push(measurement, now);
    }

    /// Overwrite the last fingerprint result for the measurement's (pair, table)
    pub fn record_fingerprint(&self, measurement: FingerprintMeasurement) {
        let key = (measurement.pair.clone(), measurement.table.clone());
        self.inner.write().fingerprints.insert(key, measurement);
    }

    /// Overwrite the last row count result for the measurement's (pair, table)
    pub fn record_count(&self, measurement: CountMeasurement) {
        let key = (measurement.pair.clone(), measurement.table.clone());
        self.inner.write().counts.insert(key, measurement);
    }

    /// Replace the pair's connection health
    pub fn update_health(&self, pair: &str, health: ConnectionHealth) {
        self.inner.write().health.insert(pair.to_string(), health);
    }

    /// Latest value of every slot, copied out of the lock
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();

        let replica_lag = inner
            .lag
            .iter()
            .filter_map(|(pair, window)| window.latest().map(|m| (pair.clone(), m.clone())))
            .collect();

        MetricsSnapshot {
            replica_lag,
            fingerprint_results: inner.fingerprints.values().cloned().collect(),
            count_results: inner.counts.values().cloned().collect(),
            connection_status: inner.health.clone(),
            last_updated: Utc::now(),
        }
    }

    /// Lag measurements of all pairs within `duration`, oldest first
    pub fn history(&self, duration: Duration) -> Vec<LagMeasurement> {
        let since = cutoff(Utc::now(), to_chrono(duration));
        let inner = self.inner.read();

        let mut result: Vec<LagMeasurement> = inner
            .lag
            .values()
            .flat_map(|window| window.since(since).cloned())
            .collect();
        result.sort_by_key(|m| m.timestamp);
        result
    }

    /// Lag measurements of one pair within `duration`, oldest first
    pub fn pair_history(&self, pair: &str, duration: Duration) -> Vec<LagMeasurement> {
        let since = cutoff(Utc::now(), to_chrono(duration));
        self.inner
            .read()
            .lag
            .get(pair)
            .map(|window| window.since(since).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of retained lag entries for a pair
    pub fn history_len(&self, pair: &str) -> usize {
        self.inner.read().lag.get(pair).map_or(0, HistoryWindow::len)
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60), 8640)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::probe::ProbeStatus;

    fn lag(pair: &str, ts: DateTime<Utc>, lag_seconds: f64) -> LagMeasurement {
        LagMeasurement {
            pair: pair.into(),
            timestamp: ts,
            status: ProbeStatus::Ok,
            lag_seconds,
            error: None,
        }
    }

    fn fingerprint(pair: &str, table: &str, matched: bool) -> FingerprintMeasurement {
        FingerprintMeasurement {
            pair: pair.into(),
            table: table.into(),
            timestamp: Utc::now(),
            status: ProbeStatus::Ok,
            source_fingerprint: Some("AAA".into()),
            target_fingerprint: Some(if matched { "AAA" } else { "BBB" }.into()),
            matched: Some(matched),
            error: None,
        }
    }

    #[test]
    fn test_history_never_exceeds_retention_or_cap() {
        let store = MetricsStore::new(Duration::from_secs(24 * 3600), 50);
        let now = Utc::now();

        for i in 0..200 {
            let ts = now - chrono::Duration::hours(48) + chrono::Duration::minutes(i * 20);
            store.record_lag_at(lag("orders-db", ts, i as f64), now);
        }

        let history = store.history(Duration::from_secs(24 * 3600));
        let oldest_allowed = now - chrono::Duration::hours(24);
        assert!(history.len() <= 50);
        assert!(history.iter().all(|m| m.timestamp >= oldest_allowed));
        assert_eq!(store.history_len("orders-db"), history.len());
    }

    #[test]
    fn test_latest_lag_tracks_last_history_entry() {
        let store = MetricsStore::default();
        let now = Utc::now();
        store.record_lag(lag("orders-db", now - chrono::Duration::seconds(20), 1.0));
        store.record_lag(lag("orders-db", now - chrono::Duration::seconds(10), 2.0));
        store.record_lag(lag("billing-db", now, 7.0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.replica_lag["orders-db"].lag_seconds, 2.0);
        assert_eq!(snapshot.replica_lag["billing-db"].lag_seconds, 7.0);
    }

    #[test]
    fn test_latest_lag_consistent_under_concurrent_writers() {
        let store = Arc::new(MetricsStore::default());
        let base = Utc::now() - chrono::Duration::minutes(10);

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let ts = base + chrono::Duration::milliseconds(i * 8 + writer);
                        store.record_lag(lag("orders-db", ts, (i * 8 + writer) as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = store.history(Duration::MAX);
        let latest = &store.snapshot().replica_lag["orders-db"];
        let last = history.last().unwrap();
        assert_eq!(latest, last);
        assert_eq!(latest.lag_seconds, 799.0);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_history_merges_pairs_oldest_first() {
        let store = MetricsStore::default();
        let now = Utc::now();
        store.record_lag(lag("b", now - chrono::Duration::seconds(5), 2.0));
        store.record_lag(lag("a", now - chrono::Duration::seconds(10), 1.0));
        store.record_lag(lag("a", now, 3.0));

        let lags: Vec<f64> = store
            .history(Duration::from_secs(3600))
            .iter()
            .map(|m| m.lag_seconds)
            .collect();
        assert_eq!(lags, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.pair_history("a", Duration::from_secs(3600)).len(), 2);
        assert!(store.pair_history("missing", Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_fingerprint_last_value_overwrite() {
        let store = MetricsStore::default();
        store.record_fingerprint(fingerprint("orders-db", "users", false));
        store.record_fingerprint(fingerprint("orders-db", "users", true));
        store.record_fingerprint(fingerprint("orders-db", "orders", false));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.fingerprint_results.len(), 2);
        assert_eq!(snapshot.fingerprint_results[0].table, "orders");
        assert_eq!(snapshot.fingerprint_results[1].matched, Some(true));
    }

    #[test]
    fn test_record_dispatches_and_health_overwrites() {
        let store = MetricsStore::default();
        store.record(&Measurement::Count(CountMeasurement {
            pair: "orders-db".into(),
            table: "users".into(),
            timestamp: Utc::now(),
            status: ProbeStatus::Ok,
            source_count: Some(100),
            target_count: Some(98),
            matched: Some(false),
            error: None,
        }));
        store.update_health("orders-db", ConnectionHealth::new(true, false));
        store.update_health("orders-db", ConnectionHealth::new(true, true));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.count_results.len(), 1);
        assert!(snapshot.connection_status["orders-db"].both_connected());
        assert!(snapshot.replica_lag.is_empty());
    }
}
