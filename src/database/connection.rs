//! Capability interface every monitored database must provide

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// One row of a replication status query, with every column rendered as text.
///
/// `None` values are SQL NULLs; a column absent from the map was not returned
/// by the server at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicationRow {
    columns: HashMap<String, Option<String>>,
}

impl ReplicationRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insert
    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.insert(column, value.map(str::to_string));
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.insert(column.into(), value);
    }

    /// Look up a column. The outer `Option` is presence, the inner one is NULL.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.columns.get(column).map(|v| v.as_deref())
    }

    /// First present column out of a list of aliases
    pub fn get_any(&self, columns: &[&str]) -> Option<Option<&str>> {
        columns.iter().find_map(|c| self.get(c))
    }

    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Narrow contract the probes depend on.
///
/// Implementations own their own pooling and reconnection; every fallible call
/// reports a [`ConnectionError`] instead of panicking.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Human-readable identity used in logs, e.g. `source[orders-db]`
    fn label(&self) -> &str;

    /// Establish the connection (or pool)
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Check reachability
    async fn ping(&self) -> bool;

    /// Run the replication status query. `Ok(None)` means no replication is configured.
    async fn replication_status(&self) -> Result<Option<ReplicationRow>, ConnectionError>;

    /// Engine-native whole-table content fingerprint
    async fn table_fingerprint(&self, table: &str) -> Result<String, ConnectionError>;

    /// Exact row count of a table
    async fn row_count(&self, table: &str) -> Result<i64, ConnectionError>;

    /// Release all resources
    async fn close(&self);
}

/// Connection layer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection not established")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected result shape: {0}")]
    UnexpectedShape(String),

    #[error("table `{0}` is missing or unreadable")]
    MissingTable(String),
}

impl ConnectionError {
    /// Whether the failure means the side could not be reached at all
    pub fn is_connection_level(&self) -> bool {
        matches!(self, ConnectionError::NotConnected | ConnectionError::Connect(_))
    }
}
