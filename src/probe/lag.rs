//! Replication lag probe

use std::time::Duration;

use chrono::Utc;

use super::{with_timeout, LagMeasurement, ProbeStatus};
use crate::database::{DatabaseConnection, ReplicationRow};

const IO_RUNNING: &[&str] = &["Slave_IO_Running", "Replica_IO_Running"];
const SQL_RUNNING: &[&str] = &["Slave_SQL_Running", "Replica_SQL_Running"];
const SECONDS_BEHIND: &[&str] = &["Seconds_Behind_Master", "Seconds_Behind_Source"];

/// Measures how far the target lags behind its replication source
#[derive(Debug, Clone)]
pub struct LagProbe {
    timeout: Duration,
}

impl LagProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Query the target's replication status under the timeout
    pub async fn measure(&self, pair: &str, target: &dyn DatabaseConnection) -> LagMeasurement {
        let timestamp = Utc::now();

        let (status, lag_seconds, error) =
            match with_timeout(self.timeout, target.replication_status()).await {
                Ok(row) => classify_replication(row.as_ref()),
                Err(e) => (ProbeStatus::from(&e), 0.0, Some(e.to_string())),
            };

        if status.is_error() {
            tracing::warn!(
                pair = %pair,
                status = %status,
                error = error.as_deref().unwrap_or_default(),
                "Replica lag probe failed"
            );
        }

        LagMeasurement {
            pair: pair.to_string(),
            timestamp,
            status,
            lag_seconds,
            error,
        }
    }
}

/// Classify a replication status row.
///
/// A lag value is only reported when both replication threads run; a stopped
/// replica reports zero regardless of what the server says.
pub fn classify_replication(row: Option<&ReplicationRow>) -> (ProbeStatus, f64, Option<String>) {
    let Some(row) = row else {
        return (
            ProbeStatus::NoRelation,
            0.0,
            Some("no replication configured (replication status returned no rows)".into()),
        );
    };

    let (io, sql) = match (row.get_any(IO_RUNNING), row.get_any(SQL_RUNNING)) {
        (Some(Some(io)), Some(Some(sql))) => (io, sql),
        _ => {
            return (
                ProbeStatus::QueryError,
                0.0,
                Some(format!(
                    "could not determine replication thread state (columns: {:?})",
                    row.column_names()
                )),
            )
        }
    };

    if !io.eq_ignore_ascii_case("yes") || !sql.eq_ignore_ascii_case("yes") {
        return (
            ProbeStatus::Stopped,
            0.0,
            Some(format!("replication not running (IO: {}, SQL: {})", io, sql)),
        );
    }

    match row.get_any(SECONDS_BEHIND) {
        None => (
            ProbeStatus::QueryError,
            0.0,
            Some("replication lag column missing".into()),
        ),
        Some(None) => (
            ProbeStatus::Indeterminate,
            0.0,
            Some("lag is NULL (replication may be initializing)".into()),
        ),
        Some(Some(raw)) => match raw.trim().parse::<f64>() {
            Ok(lag) => (ProbeStatus::Ok, lag, None),
            Err(_) => (
                ProbeStatus::QueryError,
                0.0,
                Some(format!("unparseable lag value '{}'", raw)),
            ),
        },
    }
}
