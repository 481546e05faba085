//! Alerting for replication conditions
//!
//! Measurements are evaluated into open/resolve transitions with
//! deduplication, and transitions are delivered to notification targets
//! from a background task.

pub mod engine;
pub mod notifier;
pub mod types;

pub use engine::AlertEngine;
pub use notifier::{Notifier, NotifierError};
pub use types::{Alert, AlertEvent, AlertKind, ConditionKey, ConditionKind, NotifyTarget, Severity};
