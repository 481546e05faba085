//! Alert data types

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Which probe a condition tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Lag,
    Fingerprint,
    Count,
}

impl ConditionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::Lag => "lag",
            ConditionKind::Fingerprint => "fingerprint",
            ConditionKind::Count => "count",
        }
    }
}

/// What an individual alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ReplicaLag,
    ReplicationStopped,
    FingerprintMismatch,
    FingerprintError,
    CountMismatch,
    CountError,
}

/// Identity an alert's active/inactive state is tracked against
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConditionKey {
    pub kind: ConditionKind,
    pub pair: String,
    pub table: Option<String>,
}

impl ConditionKey {
    pub fn lag(pair: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Lag,
            pair: pair.into(),
            table: None,
        }
    }

    pub fn fingerprint(pair: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Fingerprint,
            pair: pair.into(),
            table: Some(table.into()),
        }
    }

    pub fn count(pair: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Count,
            pair: pair.into(),
            table: Some(table.into()),
        }
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}:{}:{}", self.kind.as_str(), self.pair, table),
            None => write!(f, "{}:{}", self.kind.as_str(), self.pair),
        }
    }
}

/// A raised alert. Only `resolved` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub kind: AlertKind,
    pub condition: ConditionKey,
    pub message: String,
    pub resolved: bool,
}

/// Condition transition produced by the alert engine
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Opened(Alert),
    Resolved(Alert),
}

impl AlertEvent {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertEvent::Opened(alert) | AlertEvent::Resolved(alert) => alert,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlertEvent::Opened(_) => "opened",
            AlertEvent::Resolved(_) => "resolved",
        }
    }
}

/// Notification target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}
