//! MySQL / MariaDB implementation of [`DatabaseConnection`] backed by an sqlx pool

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Connection, Row};

use super::connection::{ConnectionError, DatabaseConnection, ReplicationRow};
use crate::config::DatabaseConfig;

const REPLICATION_STATUS_QUERY: &str = "SHOW SLAVE STATUS";

/// Reconnect policy used by [`MySqlDatabase::connect`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// One side of a monitored pair
pub struct MySqlDatabase {
    label: String,
    options: MySqlConnectOptions,
    pool: RwLock<Option<MySqlPool>>,
    retry: RetryPolicy,
}

impl MySqlDatabase {
    /// Unconnected handle; `connect` opens the pool
    pub fn new(label: impl Into<String>, config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        Self {
            label: label.into(),
            options,
            pool: RwLock::new(None),
            retry: RetryPolicy::default(),
        }
    }

    fn pool(&self) -> Option<MySqlPool> {
        self.pool.read().clone()
    }

    fn connected_pool(&self) -> Result<MySqlPool, ConnectionError> {
        self.pool().ok_or(ConnectionError::NotConnected)
    }

    async fn open(&self) -> Result<MySqlPool, ConnectionError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .max_lifetime(Duration::from_secs(3600))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(self.options.clone())
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        *self.pool.write() = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl DatabaseConnection for MySqlDatabase {
    fn label(&self) -> &str {
        &self.label
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let mut last_error = ConnectionError::NotConnected;

        for attempt in 1..=self.retry.attempts {
            match self.open().await {
                Ok(_) => {
                    tracing::info!(database = %self.label, "Connected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        database = %self.label,
                        attempt,
                        max_attempts = self.retry.attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = e;
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn ping(&self) -> bool {
        let pool = match self.pool() {
            Some(pool) => pool,
            // Never connected (or closed): one quick attempt per health check
            None => match self.open().await {
                Ok(pool) => {
                    tracing::info!(database = %self.label, "Reconnected");
                    pool
                }
                Err(e) => {
                    tracing::debug!(database = %self.label, error = %e, "Reconnect failed");
                    return false;
                }
            },
        };

        match pool.acquire().await {
            Ok(mut conn) => conn.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn replication_status(&self) -> Result<Option<ReplicationRow>, ConnectionError> {
        let pool = self.connected_pool()?;
        let rows = sqlx::raw_sql(REPLICATION_STATUS_QUERY)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        let row = first_row(rows);

        Ok(row.map(|row| {
            let mut out = ReplicationRow::new();
            for column in row.columns() {
                out.insert(column.name(), column_text(&row, column.ordinal()));
            }
            out
        }))
    }

    async fn table_fingerprint(&self, table: &str) -> Result<String, ConnectionError> {
        let pool = self.connected_pool()?;
        let sql = format!("CHECKSUM TABLE {}", quote_identifier(table));
        let rows = sqlx::raw_sql(&sql)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        let row = first_row(rows)
            .ok_or_else(|| ConnectionError::UnexpectedShape("no checksum row returned".into()))?;

        if row.len() < 2 {
            return Err(ConnectionError::UnexpectedShape(format!(
                "checksum row has {} columns",
                row.len()
            )));
        }

        // NULL checksum: the table does not exist on this side
        column_text(&row, 1).ok_or_else(|| ConnectionError::MissingTable(table.to_string()))
    }

    async fn row_count(&self, table: &str) -> Result<i64, ConnectionError> {
        let pool = self.connected_pool()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn close(&self) {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!(database = %self.label, "Closed connection pool");
        }
    }
}

/// First row of a result set; an empty result set is `None`, not an error
fn first_row<R>(rows: Vec<R>) -> Option<R> {
    rows.into_iter().next()
}

/// Render any scalar column as text, whatever its wire type
fn column_text(row: &MySqlRow, idx: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn map_sqlx_error(e: sqlx::Error) -> ConnectionError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ConnectionError::Connect(e.to_string())
        }
        other => ConnectionError::Query(other.to_string()),
    }
}

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
