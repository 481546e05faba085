//! Alert state machine

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use parking_lot::RwLock;

use super::types::{Alert, AlertEvent, AlertKind, ConditionKey, Severity};
use crate::probe::{
    CountMeasurement, FingerprintMeasurement, LagMeasurement, Measurement, ProbeStatus,
};

/// Desired state of a condition after one measurement
#[derive(Debug, Clone, PartialEq)]
struct Firing {
    severity: Severity,
    kind: AlertKind,
    message: String,
}

#[derive(Default)]
struct AlertBook {
    /// One open alert per active condition
    active: HashMap<ConditionKey, Alert>,
    /// Append-only, oldest evicted first
    history: VecDeque<Alert>,
    next_seq: u64,
}

/// Turns measurements into alert open/resolve transitions.
///
/// Each condition key is either inactive or owns exactly one open alert.
/// Re-raising an active condition with the same message is a no-op.
pub struct AlertEngine {
    lag_threshold_secs: f64,
    history_limit: usize,
    book: RwLock<AlertBook>,
}

impl AlertEngine {
    pub fn new(lag_threshold: std::time::Duration, history_limit: usize) -> Self {
        Self {
            lag_threshold_secs: lag_threshold.as_secs_f64(),
            history_limit: history_limit.max(1),
            book: RwLock::new(AlertBook::default()),
        }
    }

    /// Evaluate one measurement, returning the transition it caused, if any
    pub fn evaluate(&self, measurement: &Measurement) -> Option<AlertEvent> {
        match measurement {
            Measurement::Lag(m) => self.evaluate_lag(m),
            Measurement::Fingerprint(m) => self.evaluate_fingerprint(m),
            Measurement::Count(m) => self.evaluate_count(m),
        }
    }

    /// Over threshold opens a warning, stopped replication a critical alert
    pub fn evaluate_lag(&self, m: &LagMeasurement) -> Option<AlertEvent> {
        let firing = match m.status {
            ProbeStatus::Ok if m.lag_seconds > self.lag_threshold_secs => Some(Firing {
                severity: Severity::Warning,
                kind: AlertKind::ReplicaLag,
                message: format!(
                    "[{}] Replica lag ({:.2} seconds) exceeds threshold ({:.2} seconds)",
                    m.pair, m.lag_seconds, self.lag_threshold_secs
                ),
            }),
            ProbeStatus::Stopped => Some(Firing {
                severity: Severity::Critical,
                kind: AlertKind::ReplicationStopped,
                message: format!(
                    "[{}] Replication stopped: {}",
                    m.pair,
                    m.error.as_deref().unwrap_or("replication threads not running")
                ),
            }),
            _ => None,
        };
        self.transition(ConditionKey::lag(&m.pair), firing)
    }

    /// A checksum mismatch is critical, a failed query a warning
    pub fn evaluate_fingerprint(&self, m: &FingerprintMeasurement) -> Option<AlertEvent> {
        let firing = if let Some(ref error) = m.error {
            Some(Firing {
                severity: Severity::Warning,
                kind: AlertKind::FingerprintError,
                message: format!(
                    "[{}] Fingerprint check failed for table {}: {}",
                    m.pair, m.table, error
                ),
            })
        } else if m.matched == Some(false) {
            Some(Firing {
                severity: Severity::Critical,
                kind: AlertKind::FingerprintMismatch,
                message: format!(
                    "[{}] Fingerprint mismatch for table {} (source: {}, target: {})",
                    m.pair,
                    m.table,
                    m.source_fingerprint.as_deref().unwrap_or("-"),
                    m.target_fingerprint.as_deref().unwrap_or("-"),
                ),
            })
        } else {
            None
        };
        self.transition(ConditionKey::fingerprint(&m.pair, &m.table), firing)
    }

    /// A row count mismatch is critical, a failed query a warning
    pub fn evaluate_count(&self, m: &CountMeasurement) -> Option<AlertEvent> {
        let firing = if let Some(ref error) = m.error {
            Some(Firing {
                severity: Severity::Warning,
                kind: AlertKind::CountError,
                message: format!(
                    "[{}] Row count check failed for table {}: {}",
                    m.pair, m.table, error
                ),
            })
        } else if m.matched == Some(false) {
            Some(Firing {
                severity: Severity::Critical,
                kind: AlertKind::CountMismatch,
                message: format!(
                    "[{}] Row count mismatch for table {} (source: {}, target: {})",
                    m.pair,
                    m.table,
                    display_count(m.source_count),
                    display_count(m.target_count),
                ),
            })
        } else {
            None
        };
        self.transition(ConditionKey::count(&m.pair, &m.table), firing)
    }

    fn transition(&self, key: ConditionKey, firing: Option<Firing>) -> Option<AlertEvent> {
        let mut book = self.book.write();

        let Some(firing) = firing else {
            let mut alert = book.active.remove(&key)?;
            alert.resolved = true;
            if let Some(entry) = book.history.iter_mut().rev().find(|a| a.id == alert.id) {
                entry.resolved = true;
            }
            tracing::info!(alert_id = %alert.id, condition = %key, "Alert resolved");
            return Some(AlertEvent::Resolved(alert));
        };

        if book
            .active
            .get(&key)
            .is_some_and(|open| open.message == firing.message)
        {
            return None;
        }

        book.next_seq += 1;
        let alert = Alert {
            id: format!("{}#{}", key, book.next_seq),
            timestamp: Utc::now(),
            severity: firing.severity,
            kind: firing.kind,
            condition: key.clone(),
            message: firing.message,
            resolved: false,
        };

        book.history.push_back(alert.clone());
        while book.history.len() > self.history_limit {
            book.history.pop_front();
        }
        book.active.insert(key, alert.clone());

        tracing::debug!(alert_id = %alert.id, severity = ?alert.severity, "Alert opened");
        Some(AlertEvent::Opened(alert))
    }

    /// One alert per active condition, ordered by condition key
    pub fn get_active(&self) -> Vec<Alert> {
        let book = self.book.read();
        let mut active: Vec<Alert> = book.active.values().cloned().collect();
        active.sort_by(|a, b| a.condition.cmp(&b.condition));
        active
    }

    /// Most recent `limit` history entries, oldest first
    pub fn get_history(&self, limit: usize) -> Vec<Alert> {
        let book = self.book.read();
        let skip = book.history.len().saturating_sub(limit);
        book.history.iter().skip(skip).cloned().collect()
    }

    /// Whether the condition currently has an open alert
    pub fn is_active(&self, key: &ConditionKey) -> bool {
        self.book.read().active.contains_key(key)
    }
}

fn display_count(count: Option<i64>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}
