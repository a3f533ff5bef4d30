//! Kernel-side actor records.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::ContextHandle;
use crate::cx::Cx;
use crate::kernel::Kernel;
use crate::simcall::SimcallSlot;

/// Unique actor identity, assigned at spawn, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an actor as the kernel sees it.
///
/// An actor is runnable iff it was newly spawned or explicitly unblocked; a
/// terminated actor never runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Runnable,
    Blocked,
    Terminated,
}

/// The user code an actor runs, exactly once.
pub type ActorCode = Box<dyn FnOnce(&Cx) + Send + 'static>;

/// Optional hook run by the maestro once the actor has terminated.
pub type CleanupFn = Box<dyn FnOnce(&mut Kernel) + Send + 'static>;

/// State shared between the maestro and the actor's context thread.
#[derive(Debug, Default)]
pub(crate) struct ActorShared {
    /// At most one pending simcall record per round.
    pub(crate) simcall: SimcallSlot,
    /// Set by the context trampoline when the actor's code has finished,
    /// stopped, or died.
    pub(crate) terminated: AtomicBool,
    /// Diagnostic from a panic that escaped actor code (not the stop
    /// signal). Non-empty means the simulation must abort.
    pub(crate) fatal: Mutex<Option<String>>,
}

/// Kernel-side record of one actor.
pub(crate) struct Actor {
    pub(crate) id: ActorId,
    pub(crate) name: String,
    pub(crate) state: ActorState,
    pub(crate) shared: Arc<ActorShared>,
    pub(crate) context: ContextHandle,
    pub(crate) cleanup: Option<CleanupFn>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
