//! Error types for trace loading and replay.

use std::path::PathBuf;

use thiserror::Error;

use urverk_core::SimError;

/// Unified replay error type.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Trace file could not be read.
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A non-comment line did not carry at least an actor and an action.
    #[error("malformed trace line {line} in {path}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },

    /// An action name with no registered handler. Detected before any
    /// actor is spawned.
    #[error("unknown action '{action}' for actor '{actor}'")]
    UnknownAction { actor: String, action: String },

    /// The trace produced no actors at all.
    #[error("trace contains no actions")]
    EmptyTrace,

    /// The run hash did not match the expected one.
    #[error("state hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The simulation itself failed (deadlock, fatal actor error, ...).
    #[error(transparent)]
    Sim(#[from] SimError),
}
