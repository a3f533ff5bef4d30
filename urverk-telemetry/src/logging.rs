//! ## urverk-telemetry::logging
//! **Structured logging with tracing**
//!
//! One global subscriber for the whole process; simulation components log
//! through `tracing` macros and the kernel's scheduling decisions surface
//! at trace level. Thread names are included so context handoffs between
//! the maestro, workers, and actor contexts stay readable.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Call once, before the kernel starts.
    pub fn init(level: &str, thread_names: bool) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::ENTER)
            .with_thread_names(thread_names)
            .init();
    }

    /// Log a simulation lifecycle event with key metadata.
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!("simulation_event", event_type = event_type);
        let _guard = span.enter();
        tracing::info!(metadata = ?metadata, "simulation event");
    }
}
