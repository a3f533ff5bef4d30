//! # urverk-core
//!
//! Cooperative actor/kernel runtime for discrete-event simulation of
//! distributed systems. Application code is written as actors that behave
//! as if they run concurrently but execute over a single-threaded kernel
//! (the *maestro*) that advances a virtual clock by jumping from one
//! scheduled event to the next.
//!
//! Actors interact with the kernel exclusively through *simcalls*; those
//! are the only points where simulated time may pass and where an actor may
//! block. Determinism is structural: one runnable list, FIFO unblocking,
//! insertion-ordered ties in the event queue, and continuations that never
//! run inline.
//!
//! ### Key Submodules:
//! - `time`: virtual clock and `f64`-second time arithmetic
//! - `future`: continuation-based kernel future/promise pair
//! - `context`: thread-backed cooperative contexts, serial and parallel
//! - `kernel`: the maestro scheduling loop and all kernel state
//! - `cx`: the actor-side capability handle (simcall wrappers)
//! - `sync`: kernel halves of the simulation mutex/condvar
//! - `timer`: the pending-event queue
//! - `simcall`: simcall records and the legacy typed-call table

pub mod actor;
pub mod context;
pub mod cx;
pub mod error;
pub mod future;
pub mod kernel;
pub mod outcome;
pub mod simcall;
pub mod stats;
pub mod sync;
pub mod task;
pub mod time;
pub mod timer;

pub use actor::{ActorId, ActorState};
pub use context::{ContextConfig, ContextMode, StopRequest};
pub use cx::Cx;
pub use error::{SimError, SimResult};
pub use future::{FutureStatus, KernelFuture, KernelPromise};
pub use kernel::Kernel;
pub use outcome::OutcomeSlot;
pub use stats::SimStats;
pub use sync::{CondVarId, CvWait, MutexId};
pub use task::KernelTask;
pub use time::{SimClock, SimDuration, SimTime};
pub use timer::TimerId;

pub mod prelude {
    pub use crate::context::{ContextConfig, ContextMode};
    pub use crate::cx::Cx;
    pub use crate::error::{SimError, SimResult};
    pub use crate::kernel::Kernel;
    pub use crate::time::{SimDuration, SimTime};
}
