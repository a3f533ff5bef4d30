//! Simcall records and the legacy typed-call table.
//!
//! A simcall is the only door from actor context into the kernel. The actor
//! deposits one record in its slot, yields, and the maestro dispatches the
//! record after the scheduling round's barrier. Generic calls carry a
//! type-erased closure; legacy calls carry a small-integer tag and scalar
//! argument slots dispatched through a fixed handler table.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::actor::ActorId;
use crate::kernel::Kernel;
use crate::outcome::OutcomeSlot;

/// Kernel-side closure of an immediate simcall.
pub type ImmediateFn = Box<dyn FnOnce(&mut Kernel) + Send + 'static>;

/// Kernel-side closure of a blocking simcall. Receives the issuing actor
/// and must arrange the eventual `unblock` (or unblock immediately on a
/// synchronous failure).
pub type BlockingFn = Box<dyn FnOnce(&mut Kernel, ActorId) + Send + 'static>;

/// One pending request from an actor to the kernel.
pub enum Simcall {
    /// Run the closure in maestro context; the issuer becomes runnable
    /// again for the next round.
    Immediate(ImmediateFn),
    /// Run the closure in maestro context; the issuer stays blocked until
    /// some later event unblocks it.
    Blocking(BlockingFn),
    /// Table-dispatched typed call; immediate from the scheduler's point of
    /// view.
    Legacy(LegacyCall),
}

impl Simcall {
    pub fn kind(&self) -> &'static str {
        match self {
            Simcall::Immediate(_) => "immediate",
            Simcall::Blocking(_) => "blocking",
            Simcall::Legacy(_) => "legacy",
        }
    }
}

impl fmt::Debug for Simcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Simcall::{}", self.kind())
    }
}

/// Untyped scalar slot of a legacy call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    None,
    U64(u64),
    F64(f64),
}

impl Scalar {
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Scalar::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Scalar::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// Discriminator of the legacy handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum LegacyTag {
    /// Read the simulated clock.
    ClockGet = 0,
    /// Count live actors.
    ActorCount = 1,
    /// Plain yield: round-trip through the scheduler, no effect.
    Yield = 2,
}

/// Record of a legacy typed simcall.
pub struct LegacyCall {
    pub tag: LegacyTag,
    pub args: [Scalar; 2],
    ret: Arc<OutcomeSlot<Scalar>>,
}

impl LegacyCall {
    pub(crate) fn new(tag: LegacyTag, args: [Scalar; 2]) -> (Self, Arc<OutcomeSlot<Scalar>>) {
        let ret = OutcomeSlot::new();
        (
            LegacyCall {
                tag,
                args,
                ret: ret.clone(),
            },
            ret,
        )
    }
}

impl fmt::Debug for LegacyCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyCall")
            .field("tag", &self.tag)
            .field("args", &self.args)
            .finish()
    }
}

type LegacyHandler = fn(&mut Kernel, &LegacyCall) -> Scalar;

const LEGACY_HANDLERS: [LegacyHandler; 3] = [legacy_clock_get, legacy_actor_count, legacy_yield];

fn legacy_clock_get(kernel: &mut Kernel, _call: &LegacyCall) -> Scalar {
    Scalar::F64(kernel.now().as_secs())
}

fn legacy_actor_count(kernel: &mut Kernel, _call: &LegacyCall) -> Scalar {
    Scalar::U64(kernel.live_actors() as u64)
}

fn legacy_yield(_kernel: &mut Kernel, _call: &LegacyCall) -> Scalar {
    Scalar::None
}

pub(crate) fn dispatch_legacy(kernel: &mut Kernel, call: LegacyCall) {
    let handler = LEGACY_HANDLERS[call.tag as usize];
    let value = handler(kernel, &call);
    if call.ret.set(Ok(value)).is_err() {
        error!(tag = ?call.tag, "legacy simcall result delivered twice");
    }
}

/// Per-actor mailbox holding at most one pending simcall record. Written by
/// the actor right before it yields, drained by the maestro after the
/// round's barrier, so the lock is never contended.
#[derive(Debug, Default)]
pub(crate) struct SimcallSlot {
    pending: Mutex<Option<Simcall>>,
}

impl SimcallSlot {
    pub(crate) fn post(&self, call: Simcall) {
        let mut pending = self.pending.lock();
        debug_assert!(pending.is_none(), "actor posted a second simcall in one round");
        *pending = Some(call);
    }

    pub(crate) fn take(&self) -> Option<Simcall> {
        self.pending.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;

    #[test]
    fn legacy_table_dispatches_by_tag() {
        let mut kernel = Kernel::new(&ContextConfig::default()).unwrap();
        let (call, ret) = LegacyCall::new(LegacyTag::ClockGet, [Scalar::None, Scalar::None]);
        dispatch_legacy(&mut kernel, call);
        assert_eq!(ret.take().unwrap().as_f64(), Some(0.0));

        let (call, ret) = LegacyCall::new(LegacyTag::ActorCount, [Scalar::None, Scalar::None]);
        dispatch_legacy(&mut kernel, call);
        assert_eq!(ret.take().unwrap().as_u64(), Some(0));

        let (call, ret) = LegacyCall::new(LegacyTag::Yield, [Scalar::None, Scalar::None]);
        dispatch_legacy(&mut kernel, call);
        assert_eq!(ret.take().unwrap(), Scalar::None);
    }

    #[test]
    fn slot_holds_one_record_per_round() {
        let slot = SimcallSlot::default();
        assert!(slot.take().is_none());
        slot.post(Simcall::Immediate(Box::new(|_| {})));
        let taken = slot.take().expect("record posted");
        assert_eq!(taken.kind(), "immediate");
        assert!(slot.take().is_none());
    }
}
