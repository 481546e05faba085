//! Whole-table fingerprint probe

use std::time::Duration;

use chrono::Utc;

use super::{compare_sides, with_timeout, FingerprintMeasurement};
use crate::database::DatabaseConnection;

/// Compares engine-native table checksums of source and target
#[derive(Debug, Clone)]
pub struct FingerprintProbe {
    timeout: Duration,
}

impl FingerprintProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Checksum `table` on both sides concurrently
    pub async fn measure(
        &self,
        pair: &str,
        table: &str,
        source: &dyn DatabaseConnection,
        target: &dyn DatabaseConnection,
    ) -> FingerprintMeasurement {
        let timestamp = Utc::now();

        let (source_result, target_result) = tokio::join!(
            with_timeout(self.timeout, source.table_fingerprint(table)),
            with_timeout(self.timeout, target.table_fingerprint(table)),
        );

        let (status, matched, error) = compare_sides(&source_result, &target_result);
        if let Some(ref e) = error {
            tracing::warn!(pair = %pair, table = %table, error = %e, "Fingerprint probe failed");
        }

        FingerprintMeasurement {
            pair: pair.to_string(),
            table: table.to_string(),
            timestamp,
            status,
            source_fingerprint: source_result.ok(),
            target_fingerprint: target_result.ok(),
            matched,
            error,
        }
    }
}
