//! ## urverk-telemetry::metrics
//! **Prometheus recorder for kernel counters**
//!
//! The kernel keeps plain counters ([`urverk_core::SimStats`]); this
//! recorder mirrors them into a Prometheus registry for scraping or for a
//! one-shot text dump at the end of a run.

use prometheus::{Counter, Registry};

use urverk_core::SimStats;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub rounds_total: prometheus::Counter,
    pub simcalls_total: prometheus::Counter,
    pub context_resumes_total: prometheus::Counter,
    pub timers_fired_total: prometheus::Counter,
    pub actors_spawned_total: prometheus::Counter,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let rounds_total =
            Counter::new("urverk_rounds_total", "Scheduling rounds executed").unwrap();
        let simcalls_total =
            Counter::new("urverk_simcalls_total", "Simcalls dispatched").unwrap();
        let context_resumes_total =
            Counter::new("urverk_context_resumes_total", "Context resumptions").unwrap();
        let timers_fired_total =
            Counter::new("urverk_timers_fired_total", "Timer events fired").unwrap();
        let actors_spawned_total =
            Counter::new("urverk_actors_spawned_total", "Actors spawned").unwrap();

        for metric in [
            &rounds_total,
            &simcalls_total,
            &context_resumes_total,
            &timers_fired_total,
            &actors_spawned_total,
        ] {
            registry.register(Box::new(metric.clone())).unwrap();
        }

        Self {
            registry,
            rounds_total,
            simcalls_total,
            context_resumes_total,
            timers_fired_total,
            actors_spawned_total,
        }
    }

    /// Folds one run's kernel counters into the registry.
    pub fn record_stats(&self, stats: &SimStats) {
        self.rounds_total.inc_by(stats.rounds as f64);
        self.simcalls_total.inc_by(stats.simcalls_total() as f64);
        self.context_resumes_total.inc_by(stats.context_resumes as f64);
        self.timers_fired_total.inc_by(stats.timers_fired as f64);
        self.actors_spawned_total.inc_by(stats.actors_spawned as f64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_kernel_counters() {
        let recorder = MetricsRecorder::new();
        let stats = SimStats {
            rounds: 3,
            context_resumes: 7,
            simcalls_immediate: 2,
            simcalls_blocking: 1,
            simcalls_legacy: 1,
            timers_fired: 2,
            actors_spawned: 2,
        };
        recorder.record_stats(&stats);
        assert_eq!(recorder.rounds_total.get(), 3.0);
        assert_eq!(recorder.simcalls_total.get(), 4.0);
        let dump = recorder.gather_metrics().unwrap();
        assert!(dump.contains("urverk_rounds_total"));
    }
}
