//! The replay harness: spawns one actor per trace partition and runs the
//! kernel to completion.
//!
//! Every completed action is folded into a BLAKE3 hash together with its
//! completion time. Recording happens through an immediate simcall, so the
//! hash order equals the kernel's dispatch order and the digest is
//! reproducible run over run — and comparable against a recorded one.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use urverk_core::{ContextConfig, Kernel, SimStats, SimTime};

use crate::error::ReplayError;
use crate::registry::{ActionHandler, ActionRegistry};
use crate::trace::{load_trace, partition, Action};

/// Outcome of a completed replay run.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Simulated instant at which the last event fired.
    pub final_time: SimTime,
    /// Actions completed across all actors.
    pub actions_executed: u64,
    /// Deterministic digest of (actor, action, completion time) in
    /// dispatch order.
    pub state_hash: String,
    /// Kernel counters of the run.
    pub stats: SimStats,
}

impl ReplayReport {
    /// Compares the run digest against a recorded one.
    pub fn verify_hash(&self, expected: &str) -> Result<(), ReplayError> {
        if self.state_hash == expected {
            Ok(())
        } else {
            Err(ReplayError::HashMismatch {
                expected: expected.to_string(),
                actual: self.state_hash.clone(),
            })
        }
    }
}

struct HashRecorder {
    inner: Mutex<(blake3::Hasher, u64)>,
}

impl HashRecorder {
    fn new() -> Arc<Self> {
        Arc::new(HashRecorder {
            inner: Mutex::new((blake3::Hasher::new(), 0)),
        })
    }

    fn record(&self, bytes: &[u8], at: SimTime) {
        let mut inner = self.inner.lock();
        inner.0.update(bytes);
        inner.0.update(&at.as_secs().to_bits().to_le_bytes());
        inner.1 += 1;
    }

    fn count(&self) -> u64 {
        self.inner.lock().1
    }

    fn hex_digest(&self) -> String {
        hex::encode(self.inner.lock().0.finalize().as_bytes())
    }
}

fn action_bytes(action: &Action) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(action.actor.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(action.name.as_bytes());
    for arg in &action.args {
        bytes.push(0);
        bytes.extend_from_slice(arg.as_bytes());
    }
    bytes
}

/// Drives registered actions from textual traces.
pub struct ReplayHarness {
    registry: ActionRegistry,
    context: ContextConfig,
}

impl ReplayHarness {
    pub fn new(registry: ActionRegistry) -> Self {
        ReplayHarness {
            registry,
            context: ContextConfig::default(),
        }
    }

    /// Overrides the context factory configuration.
    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Replays a single global trace file, partitioned by actor id.
    pub fn run_file(&self, path: &Path) -> Result<ReplayReport, ReplayError> {
        self.run_files(std::slice::from_ref(&path.to_path_buf()))
    }

    /// Replays one or more trace files (a global file, or one per actor —
    /// the line format is identical either way).
    pub fn run_files(&self, paths: &[std::path::PathBuf]) -> Result<ReplayReport, ReplayError> {
        let mut actions = Vec::new();
        for path in paths {
            actions.extend(load_trace(path)?);
        }
        self.run_actions(actions)
    }

    /// Replays an in-memory action list.
    pub fn run_actions(&self, actions: Vec<Action>) -> Result<ReplayReport, ReplayError> {
        if actions.is_empty() {
            return Err(ReplayError::EmptyTrace);
        }
        // Unknown action names abort the run before any actor is spawned.
        for action in &actions {
            if !self.registry.contains(&action.name) {
                return Err(ReplayError::UnknownAction {
                    actor: action.actor.clone(),
                    action: action.name.clone(),
                });
            }
        }

        let mut kernel = Kernel::new(&self.context)?;
        let recorder = HashRecorder::new();
        let partitions = partition(actions);
        debug!(actors = partitions.len(), "replay starting");

        for (actor, queue) in partitions {
            let resolved: Vec<(ActionHandler, Action)> = queue
                .into_iter()
                .map(|action| {
                    let handler = self
                        .registry
                        .get(&action.name)
                        .expect("validated before spawn");
                    (handler, action)
                })
                .collect();
            let recorder = recorder.clone();
            kernel.spawn(&actor, move |cx| {
                for (handler, action) in resolved {
                    if let Err(e) = handler(cx, &action) {
                        panic!("action '{}' failed: {e}", action.name);
                    }
                    let bytes = action_bytes(&action);
                    let recorder = recorder.clone();
                    cx.kernel_immediate(move |kernel| {
                        recorder.record(&bytes, kernel.now());
                    });
                }
            })?;
        }

        kernel.run()?;
        let report = ReplayReport {
            final_time: kernel.now(),
            actions_executed: recorder.count(),
            state_hash: recorder.hex_digest(),
            stats: *kernel.stats(),
        };
        info!(
            final_time = %report.final_time,
            actions = report.actions_executed,
            hash = %report.state_hash,
            "replay finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::builtin_registry;
    use crate::trace::parse_trace;
    use std::io::Write;
    use std::path::PathBuf;

    const CONTENTION_TRACE: &str = "\
# Two workers contend on a mutex while a watcher waits on a condvar.
worker1 lock m
worker1 compute 3
worker1 unlock m
worker2 sleep 1
worker2 lock m
worker2 notify_all cv-done
worker2 unlock m
watcher lock sync
watcher wait_for cv-done sync 10
watcher unlock sync
";

    fn run(trace: &str) -> ReplayReport {
        let harness = ReplayHarness::new(builtin_registry());
        let actions = parse_trace(trace, &PathBuf::from("inline.trace")).unwrap();
        harness.run_actions(actions).unwrap()
    }

    #[test]
    fn replay_runs_to_completion_and_counts_actions() {
        let report = run(CONTENTION_TRACE);
        assert_eq!(report.actions_executed, 10);
        assert_eq!(report.final_time, SimTime::from_secs(3.0));
        assert!(report.stats.rounds > 0);
    }

    #[test]
    fn replay_hash_is_reproducible() {
        let first = run(CONTENTION_TRACE);
        let second = run(CONTENTION_TRACE);
        assert_eq!(first.state_hash, second.state_hash);
        first.verify_hash(&second.state_hash).unwrap();
        assert!(first.verify_hash("deadbeef").is_err());
    }

    #[test]
    fn unknown_action_aborts_before_spawning() {
        let harness = ReplayHarness::new(builtin_registry());
        let actions =
            parse_trace("ghost teleport 4\n", &PathBuf::from("inline.trace")).unwrap();
        match harness.run_actions(actions) {
            Err(ReplayError::UnknownAction { actor, action }) => {
                assert_eq!(actor, "ghost");
                assert_eq!(action, "teleport");
            }
            other => panic!("expected UnknownAction, got {other:?}"),
        }
    }

    #[test]
    fn empty_trace_is_rejected() {
        let harness = ReplayHarness::new(builtin_registry());
        assert!(matches!(
            harness.run_actions(Vec::new()),
            Err(ReplayError::EmptyTrace)
        ));
    }

    #[test]
    fn global_file_is_partitioned_by_actor() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"a sleep 2\nb sleep 1\na yield\n").unwrap();
        let harness = ReplayHarness::new(builtin_registry());
        let report = harness.run_file(file.path()).unwrap();
        assert_eq!(report.actions_executed, 3);
        assert_eq!(report.final_time, SimTime::from_secs(2.0));
    }

    #[test]
    fn custom_handlers_participate_like_builtins() {
        let mut registry = builtin_registry();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.register("mark", move |cx, action| {
            sink.lock().push((action.args[0].clone(), cx.now().as_secs()));
            Ok(())
        });
        let harness = ReplayHarness::new(registry);
        let actions = parse_trace(
            "a sleep 2\na mark after-sleep\n",
            &PathBuf::from("inline.trace"),
        )
        .unwrap();
        harness.run_actions(actions).unwrap();
        assert_eq!(*seen.lock(), vec![("after-sleep".to_string(), 2.0)]);
    }
}
