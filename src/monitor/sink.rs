//! Where probe results go once measured

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::alerts::{AlertEngine, AlertEvent};
use crate::metrics::MetricsStore;
use crate::probe::{ConnectionHealth, Measurement};

/// Receives every measurement and health refresh as soon as it is produced
pub trait MeasurementSink: Send + Sync {
    fn record(&self, measurement: &Measurement);

    fn update_health(&self, pair: &str, health: ConnectionHealth);
}

/// Records into the metrics store, evaluates alerts and forwards
/// transitions to the notifier.
pub struct MonitorSink {
    store: Arc<MetricsStore>,
    alerts: Arc<AlertEngine>,
    events: Option<mpsc::UnboundedSender<AlertEvent>>,
}

impl MonitorSink {
    /// Sink that records and evaluates without forwarding events
    pub fn new(store: Arc<MetricsStore>, alerts: Arc<AlertEngine>) -> Self {
        Self {
            store,
            alerts,
            events: None,
        }
    }

    /// Forward alert transitions to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<AlertEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

impl MeasurementSink for MonitorSink {
    fn record(&self, measurement: &Measurement) {
        tracing::trace!(
            pair = %measurement.pair(),
            kind = measurement.kind(),
            status = %measurement.status(),
            "Measurement recorded"
        );
        self.store.record(measurement);

        let Some(event) = self.alerts.evaluate(measurement) else {
            return;
        };
        if let Some(ref events) = self.events {
            if events.send(event).is_err() {
                tracing::warn!(pair = %measurement.pair(), "Notifier gone, alert event dropped");
            }
        }
    }

    fn update_health(&self, pair: &str, health: ConnectionHealth) {
        self.store.update_health(pair, health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::probe::{CountMeasurement, ProbeStatus};

    #[test]
    fn test_record_stores_evaluates_and_forwards() {
        let store = Arc::new(MetricsStore::default());
        let alerts = Arc::new(AlertEngine::new(Duration::from_secs(60), 100));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = MonitorSink::new(Arc::clone(&store), Arc::clone(&alerts)).with_events(tx);

        let m = Measurement::Count(CountMeasurement {
            pair: "orders-db".into(),
            table: "users".into(),
            timestamp: Utc::now(),
            status: ProbeStatus::Ok,
            source_count: Some(100),
            target_count: Some(98),
            matched: Some(false),
            error: None,
        });
        sink.record(&m);
        sink.record(&m);

        assert_eq!(store.snapshot().count_results.len(), 1);
        assert_eq!(alerts.get_active().len(), 1);
        assert!(matches!(rx.try_recv(), Ok(AlertEvent::Opened(_))));
        assert!(rx.try_recv().is_err());
    }
}
