//! # urverk-telemetry
//!
//! Observability layer for the urverk simulator: a tracing-based logger
//! setup and a Prometheus recorder fed from kernel counters.

pub mod logging;
pub mod metrics;

pub use metrics::MetricsRecorder;
