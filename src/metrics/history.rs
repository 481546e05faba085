//! Time-bounded lag history for one pair

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::probe::LagMeasurement;

/// Append-only window of lag measurements ordered by timestamp.
///
/// Two limits apply on every write: entries older than `retention` are
/// dropped, and the oldest entries are evicted once `max_entries` is exceeded.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<LagMeasurement>,
    retention: chrono::Duration,
    max_entries: usize,
}

impl HistoryWindow {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            retention: to_chrono(retention),
            max_entries: max_entries.max(1),
        }
    }

    /// Insert a measurement and enforce both limits relative to `now`
    pub fn push(&mut self, measurement: LagMeasurement, now: DateTime<Utc>) {
        // Writers race on timestamps; keep the window sorted so the tail is the latest
        let pos = self
            .entries
            .iter()
            .rposition(|e| e.timestamp <= measurement.timestamp)
            .map_or(0, |i| i + 1);
        self.entries.insert(pos, measurement);
        self.prune(now);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = cutoff(now, self.retention);
        while self
            .entries
            .front()
            .is_some_and(|e| e.timestamp < cutoff)
        {
            self.entries.pop_front();
        }

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Most recent entry, found by scanning from the back
    pub fn latest(&self) -> Option<&LagMeasurement> {
        self.entries.back()
    }

    /// Entries with a timestamp at or after `since`, oldest first
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &LagMeasurement> {
        self.entries.iter().filter(move |e| e.timestamp >= since)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
}

/// `now - window`, saturating at the earliest representable instant
pub(crate) fn cutoff(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
