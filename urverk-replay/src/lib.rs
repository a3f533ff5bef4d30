//! # urverk-replay
//!
//! Deterministic replay harness for the urverk simulation kernel.
//!
//! A replay run reads plain-text action traces (one whitespace-separated
//! action per line: actor id, action name, arguments), partitions them by
//! actor, spawns one actor per partition and dispatches each action to its
//! registered handler. Runs produce a BLAKE3 state hash over the completed
//! actions and their completion times, comparable against a recorded hash
//! to pin a scenario's behavior down to the event ordering.
//!
//! ## Key Components:
//! - **Trace parser:** comment- and blank-tolerant line format.
//! - **Action registry:** named handlers running in actor context.
//! - **Built-in actions:** sleep/compute/await, mutex and condvar traffic,
//!   yield, log.
//! - **Harness:** spawn, run, hash, verify.

pub mod actions;
pub mod error;
pub mod harness;
pub mod registry;
pub mod trace;

pub use actions::{builtin_registry, register_builtins};
pub use error::ReplayError;
pub use harness::{ReplayHarness, ReplayReport};
pub use registry::{ActionHandler, ActionRegistry};
pub use trace::{load_trace, parse_trace, partition, Action};
