//! Simulation error taxonomy.

use thiserror::Error;

/// Errors surfaced by the simulation core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Operation on a future or promise whose shared state is gone
    /// (moved-from handle, or a result consumed twice).
    #[error("future or promise has no shared state")]
    NoState,

    /// Second attempt to satisfy a promise or one-shot slot.
    #[error("promise already satisfied")]
    AlreadySatisfied,

    /// `get()` on an unresolved kernel future, or scheduler quiescence with
    /// live blocked actors.
    #[error("deadlock detected: {0}")]
    Deadlock(String),

    /// A timed wait expired before completion.
    #[error("wait timed out")]
    Timeout,

    /// The actor received the stop signal.
    #[error("actor was stopped")]
    Stopped,

    /// Unrecoverable condition: context allocation failure, invariant
    /// violation, or a panic escaping actor code.
    #[error("fatal simulation error: {0}")]
    Fatal(String),
}

/// Convenience alias used across the simulation crates.
pub type SimResult<T> = Result<T, SimError>;
