//! # urverk-sync
//!
//! Simulated-time synchronization primitives for actor code, layered on the
//! simcall boundary of `urverk-core`: mutex, condition variable, sleep, and
//! the wait-based actor future.
//!
//! Everything here follows the same shape: a thin, `Copy`-able handle on
//! the actor side, a kernel-owned record addressed by id, and blocking
//! simcalls whose kernel half arranges the wake-up. Suspension only ever
//! happens at those simcalls.

pub mod condvar;
pub mod future;
pub mod mutex;
pub mod sleep;

pub use condvar::SimCondVar;
pub use future::{kernel_async, ActorFuture};
pub use mutex::SimMutex;
pub use sleep::{sleep_for, sleep_until};

pub use urverk_core::sync::CvWait;
