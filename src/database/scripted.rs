//! In-memory [`DatabaseConnection`] whose answers are set by tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::connection::{ConnectionError, DatabaseConnection, ReplicationRow};

#[derive(Default)]
struct Script {
    replication: Option<Result<Option<ReplicationRow>, ConnectionError>>,
    fingerprints: HashMap<String, Result<String, ConnectionError>>,
    counts: HashMap<String, Result<i64, ConnectionError>>,
    delay: Option<Duration>,
    table_delay: Option<Duration>,
    ping_hangs: bool,
}

pub struct ScriptedConnection {
    label: String,
    reachable: AtomicBool,
    closed: AtomicBool,
    script: Mutex<Script>,
    queries: AtomicUsize,
}

impl ScriptedConnection {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            script: Mutex::new(Script::default()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_replication(&self, result: Result<Option<ReplicationRow>, ConnectionError>) {
        self.script.lock().replication = Some(result);
    }

    pub fn set_fingerprint(&self, table: &str, result: Result<String, ConnectionError>) {
        self.script.lock().fingerprints.insert(table.to_string(), result);
    }

    pub fn set_count(&self, table: &str, result: Result<i64, ConnectionError>) {
        self.script.lock().counts.insert(table.to_string(), result);
    }

    /// Make every query sleep before answering
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().delay = Some(delay);
    }

    /// Make only fingerprint and count queries sleep before answering
    pub fn set_table_delay(&self, delay: Duration) {
        self.script.lock().table_delay = Some(delay);
    }

    /// Make `ping` never resolve, like a half-open TCP peer
    pub fn set_ping_hangs(&self, hangs: bool) {
        self.script.lock().ping_hangs = hangs;
    }

    /// Number of replication/fingerprint/count queries issued so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn before_query(&self, table_query: bool) -> Result<(), ConnectionError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let script = self.script.lock();
            match script.table_delay {
                Some(delay) if table_query => Some(delay),
                _ => script.delay,
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }
}

#[async_trait]
impl DatabaseConnection for ScriptedConnection {
    fn label(&self) -> &str {
        &self.label
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::Connect(format!("{} refused", self.label)))
        }
    }

    async fn ping(&self) -> bool {
        let hangs = self.script.lock().ping_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        self.reachable.load(Ordering::SeqCst)
    }

    async fn replication_status(&self) -> Result<Option<ReplicationRow>, ConnectionError> {
        self.before_query(false).await?;
        self.script.lock().replication.clone().unwrap_or(Ok(None))
    }

    async fn table_fingerprint(&self, table: &str) -> Result<String, ConnectionError> {
        self.before_query(true).await?;
        self.script
            .lock()
            .fingerprints
            .get(table)
            .cloned()
            .unwrap_or_else(|| Err(ConnectionError::MissingTable(table.to_string())))
    }

    async fn row_count(&self, table: &str) -> Result<i64, ConnectionError> {
        self.before_query(true).await?;
        self.script
            .lock()
            .counts
            .get(table)
            .cloned()
            .unwrap_or_else(|| Err(ConnectionError::MissingTable(table.to_string())))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Replication row for a healthy replica with the given lag
pub fn running_replica(lag_seconds: &str) -> ReplicationRow {
    ReplicationRow::new()
        .with("Slave_IO_Running", Some("Yes"))
        .with("Slave_SQL_Running", Some("Yes"))
        .with("Seconds_Behind_Master", Some(lag_seconds))
}
