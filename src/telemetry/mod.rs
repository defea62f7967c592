//! Observability for the pool and scheduler.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
