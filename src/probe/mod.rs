//! Probes and the measurement data model
//!
//! A probe performs one measurement against one pair and always produces a
//! [`Measurement`]; failures become error-carrying statuses instead of being
//! propagated, so the absence of data and the presence of an error stay
//! distinguishable downstream.

pub mod count;
pub mod fingerprint;
pub mod lag;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::ConnectionError;

pub use count::CountProbe;
pub use fingerprint::FingerprintProbe;
pub use lag::{classify_replication, LagProbe};

/// Outcome classification shared by all probe kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    /// Replication threads are not running
    Stopped,
    /// No replication configured on the target
    NoRelation,
    ConnectionError,
    QueryError,
    /// Replication running but no lag value available yet
    Indeterminate,
}

impl ProbeStatus {
    pub fn is_ok(self) -> bool {
        self == ProbeStatus::Ok
    }

    /// Whether the probe failed to measure (as opposed to measuring a bad state)
    pub fn is_error(self) -> bool {
        matches!(self, ProbeStatus::ConnectionError | ProbeStatus::QueryError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Ok => "ok",
            ProbeStatus::Stopped => "stopped",
            ProbeStatus::NoRelation => "no_relation",
            ProbeStatus::ConnectionError => "connection_error",
            ProbeStatus::QueryError => "query_error",
            ProbeStatus::Indeterminate => "indeterminate",
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ConnectionError> for ProbeStatus {
    fn from(err: &ConnectionError) -> Self {
        if err.is_connection_level() {
            ProbeStatus::ConnectionError
        } else {
            ProbeStatus::QueryError
        }
    }
}

/// Replication lag of a pair's target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagMeasurement {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub status: ProbeStatus,
    /// Only meaningful when `status` is `Ok`; zero otherwise
    pub lag_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whole-table content fingerprint comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintMeasurement {
    pub pair: String,
    pub table: String,
    pub timestamp: DateTime<Utc>,
    pub status: ProbeStatus,
    pub source_fingerprint: Option<String>,
    pub target_fingerprint: Option<String>,
    /// `None` when either side failed: no verdict from partial data
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Row count comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMeasurement {
    pub pair: String,
    pub table: String,
    pub timestamp: DateTime<Utc>,
    pub status: ProbeStatus,
    pub source_count: Option<i64>,
    pub target_count: Option<i64>,
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Any probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Lag(LagMeasurement),
    Fingerprint(FingerprintMeasurement),
    Count(CountMeasurement),
}

impl Measurement {
    pub fn pair(&self) -> &str {
        match self {
            Measurement::Lag(m) => &m.pair,
            Measurement::Fingerprint(m) => &m.pair,
            Measurement::Count(m) => &m.pair,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Measurement::Lag(_) => None,
            Measurement::Fingerprint(m) => Some(&m.table),
            Measurement::Count(m) => Some(&m.table),
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self {
            Measurement::Lag(m) => m.status,
            Measurement::Fingerprint(m) => m.status,
            Measurement::Count(m) => m.status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Lag(_) => "lag",
            Measurement::Fingerprint(_) => "fingerprint",
            Measurement::Count(_) => "count",
        }
    }
}

/// Reachability of both sides of a pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub source_connected: bool,
    pub target_connected: bool,
    pub last_checked: DateTime<Utc>,
}

impl ConnectionHealth {
    pub fn new(source_connected: bool, target_connected: bool) -> Self {
        Self {
            source_connected,
            target_connected,
            last_checked: Utc::now(),
        }
    }

    pub fn both_connected(&self) -> bool {
        self.source_connected && self.target_connected
    }
}

/// Run a connection call under the query timeout
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(limit)),
    }
}

/// Reduce both sides' results to a status and verdict.
///
/// Any failure on either side yields an error status and no verdict.
pub(crate) fn compare_sides<T: PartialEq>(
    source: &Result<T, ConnectionError>,
    target: &Result<T, ConnectionError>,
) -> (ProbeStatus, Option<bool>, Option<String>) {
    match (source, target) {
        (Ok(s), Ok(t)) => (ProbeStatus::Ok, Some(s == t), None),
        (Err(e), _) => (ProbeStatus::from(e), None, Some(format!("source: {}", e))),
        (_, Err(e)) => (ProbeStatus::from(e), None, Some(format!("target: {}", e))),
    }
}
