//! Row count probe

use std::time::Duration;

use chrono::Utc;

use super::{compare_sides, with_timeout, CountMeasurement};
use crate::database::DatabaseConnection;

/// Compares exact row counts of source and target
#[derive(Debug, Clone)]
pub struct CountProbe {
    timeout: Duration,
}

impl CountProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Count rows of `table` on both sides concurrently
    pub async fn measure(
        &self,
        pair: &str,
        table: &str,
        source: &dyn DatabaseConnection,
        target: &dyn DatabaseConnection,
    ) -> CountMeasurement {
        let timestamp = Utc::now();

        let (source_result, target_result) = tokio::join!(
            with_timeout(self.timeout, source.row_count(table)),
            with_timeout(self.timeout, target.row_count(table)),
        );

        let (status, matched, error) = compare_sides(&source_result, &target_result);
        if let Some(ref e) = error {
            tracing::warn!(pair = %pair, table = %table, error = %e, "Row count probe failed");
        }

        CountMeasurement {
            pair: pair.to_string(),
            table: table.to_string(),
            timestamp,
            status,
            source_count: source_result.ok(),
            target_count: target_result.ok(),
            matched,
            error,
        }
    }
}
