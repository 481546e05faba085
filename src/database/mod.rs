//! Connection layer: the capability trait probes run against and its
//! MySQL/MariaDB implementation.

pub mod connection;
pub mod mysql;
#[cfg(test)]
pub mod scripted;

pub use connection::{ConnectionError, DatabaseConnection, ReplicationRow};
pub use mysql::{MySqlDatabase, RetryPolicy};
