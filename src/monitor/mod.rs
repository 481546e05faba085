//! Monitoring engine
//!
//! A single ticker drives cycles; in each cycle every pair runs concurrently
//! as its own task, and within a pair the lag probe and the per-table probes
//! run concurrently. Results reach the metrics store and alert engine per
//! probe, not per cycle.

pub mod engine;
pub mod scheduler;
pub mod sink;

pub use engine::{EngineError, EngineState, MonitoringEngine};
pub use scheduler::{CycleReport, PairScheduler};
pub use sink::{MeasurementSink, MonitorSink};
