//! Measurement storage
//!
//! Latest value per probe plus a bounded lag history per pair.

pub mod history;
pub mod store;

pub use history::HistoryWindow;
pub use store::{MetricsSnapshot, MetricsStore};
