//! Actor-side capability handle.
//!
//! All effects available to actor code flow through an explicit [`Cx`]: it
//! is the only way to reach the kernel, and every method that traps into
//! the kernel is a suspension point. Code between two simcalls is atomic
//! from the kernel's perspective.

use std::cell::RefCell;
use std::panic::{catch_unwind, panic_any, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{error, trace};

use crate::actor::{ActorCode, ActorId, ActorShared};
use crate::context::{Command, RunQueue, StopRequest};
use crate::error::{SimError, SimResult};
use crate::future::KernelFuture;
use crate::kernel::Kernel;
use crate::outcome::OutcomeSlot;
use crate::simcall::{LegacyCall, LegacyTag, Scalar, Simcall};
use crate::time::{SimClock, SimTime};

/// The actor's capability context.
///
/// Lives on the actor's context thread for exactly as long as the actor.
pub struct Cx {
    id: ActorId,
    name: String,
    shared: Arc<ActorShared>,
    clock: SimClock,
    resume_rx: Receiver<Command>,
    /// Chain state of the current scheduling round, installed at each
    /// resumption.
    chain: RefCell<Option<(Arc<RunQueue>, Sender<()>)>>,
    /// Acknowledgement channel of a received stop command; signalled by the
    /// trampoline once the unwind finished.
    stop_ack: RefCell<Option<Sender<()>>>,
}

/// Everything the kernel prepares for a context thread.
pub(crate) struct CxSeed {
    pub(crate) id: ActorId,
    pub(crate) name: String,
    pub(crate) shared: Arc<ActorShared>,
    pub(crate) clock: SimClock,
}

impl Cx {
    /// This actor's identity.
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// This actor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current simulated instant. Constant between two simcalls.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Runs `f` in the kernel and returns its value. The closure executes
    /// in maestro context with exclusive kernel access; the actor resumes
    /// on the next scheduling round without simulated time passing.
    pub fn kernel_immediate<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&mut Kernel) -> R + Send + 'static,
    {
        let slot = OutcomeSlot::new();
        let result = slot.clone();
        self.post(Simcall::Immediate(Box::new(move |kernel| {
            let value = f(kernel);
            if result.set(Ok(value)).is_err() {
                error!("immediate simcall result delivered twice");
            }
        })));
        self.yield_to_kernel();
        match slot.take() {
            Ok(value) => value,
            Err(e) => panic!("immediate simcall lost its result: {e}"),
        }
    }

    /// Raw blocking simcall. `f` runs in maestro context and must arrange
    /// for the outcome slot to be filled and the issuer unblocked; the
    /// calling actor stays parked until then.
    pub fn run_blocking<R, F>(&self, f: F) -> SimResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Kernel, ActorId, Arc<OutcomeSlot<R>>) + Send + 'static,
    {
        let slot = OutcomeSlot::new();
        let kernel_slot = slot.clone();
        self.post(Simcall::Blocking(Box::new(move |kernel, issuer| {
            f(kernel, issuer, kernel_slot)
        })));
        self.yield_to_kernel();
        slot.take()
    }

    /// Runs `f` in the kernel, then blocks until the kernel future it
    /// returns resolves; delivers its value or error.
    pub fn kernel_sync<R, F>(&self, f: F) -> SimResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Kernel) -> SimResult<KernelFuture<R>> + Send + 'static,
    {
        self.run_blocking(move |kernel, issuer, slot| match f(kernel) {
            Ok(future) => {
                if !future.valid() {
                    deliver(kernel, issuer, &slot, Err(SimError::NoState));
                    return;
                }
                let hooked = future.then_void(move |kernel, ready| {
                    if slot.set(ready.get()).is_err() {
                        error!("kernel_sync result delivered twice");
                    }
                    kernel.unblock(issuer);
                });
                debug_assert!(hooked.is_ok(), "continuation on a validated future");
            }
            Err(e) => deliver(kernel, issuer, &slot, Err(e)),
        })
    }

    /// Issues a legacy typed simcall through the handler table.
    pub fn legacy(&self, tag: LegacyTag, args: [Scalar; 2]) -> Scalar {
        let (call, ret) = LegacyCall::new(tag, args);
        self.post(Simcall::Legacy(call));
        self.yield_to_kernel();
        ret.take().unwrap_or(Scalar::None)
    }

    /// Yields to the scheduler for one round.
    pub fn yield_now(&self) {
        self.legacy(LegacyTag::Yield, [Scalar::None, Scalar::None]);
    }

    /// Spawns another actor. It becomes runnable in the next round.
    pub fn spawn<F>(&self, name: &str, code: F) -> SimResult<ActorId>
    where
        F: FnOnce(&Cx) + Send + 'static,
    {
        let name = name.to_string();
        self.kernel_immediate(move |kernel| kernel.spawn(&name, code))
    }

    /// Terminates the calling actor by unwinding its stack.
    pub fn exit(&self) -> ! {
        panic_any(StopRequest)
    }

    fn post(&self, call: Simcall) {
        self.shared.simcall.post(call);
    }

    /// Parks this context: hands control down the chain (or back to the
    /// resumer) and waits to be resumed. Unwinds on a stop command.
    fn yield_to_kernel(&self) {
        let (queue, done) = self
            .chain
            .borrow_mut()
            .take()
            .expect("simcall issued outside a scheduling round");
        chain_next(&queue, done);
        match self.resume_rx.recv() {
            Ok(Command::Run { queue, done }) => {
                *self.chain.borrow_mut() = Some((queue, done));
            }
            Ok(Command::Stop { acked }) => {
                *self.stop_ack.borrow_mut() = Some(acked);
                panic_any(StopRequest);
            }
            // The kernel is gone; unwind so the thread exits cleanly.
            Err(_) => panic_any(StopRequest),
        }
    }

    /// First park, before any user code runs. Returns false when the actor
    /// was stopped (or the kernel vanished) before ever running.
    fn wait_first_resume(&self) -> bool {
        match self.resume_rx.recv() {
            Ok(Command::Run { queue, done }) => {
                *self.chain.borrow_mut() = Some((queue, done));
                true
            }
            Ok(Command::Stop { acked }) => {
                *self.stop_ack.borrow_mut() = Some(acked);
                false
            }
            Err(_) => false,
        }
    }

    /// Releases control for the last time once the actor has terminated.
    fn leave(&self) {
        if let Some(acked) = self.stop_ack.borrow_mut().take() {
            let _ = acked.send(());
            return;
        }
        if let Some((queue, done)) = self.chain.borrow_mut().take() {
            chain_next(&queue, done);
        }
    }
}

fn deliver<R>(kernel: &mut Kernel, issuer: ActorId, slot: &OutcomeSlot<R>, outcome: SimResult<R>) {
    if slot.set(outcome).is_err() {
        error!(actor = %issuer, "blocking simcall outcome delivered twice");
    }
    kernel.unblock(issuer);
}

/// Resumes the next runnable context of the round, or returns control
/// through `done` when the dispenser is dry.
fn chain_next(queue: &Arc<RunQueue>, done: Sender<()>) {
    while let Some(next) = queue.pull() {
        if next
            .send(Command::Run {
                queue: queue.clone(),
                done: done.clone(),
            })
            .is_ok()
        {
            return;
        }
    }
    let _ = done.send(());
}

/// Context entry trampoline: runs the actor's code once, swallows the stop
/// signal at the boundary, records any other escaping panic as fatal, then
/// releases control.
pub(crate) fn context_main(seed: CxSeed, resume_rx: Receiver<Command>, code: ActorCode) {
    let cx = Cx {
        id: seed.id,
        name: seed.name,
        shared: seed.shared,
        clock: seed.clock,
        resume_rx,
        chain: RefCell::new(None),
        stop_ack: RefCell::new(None),
    };
    if cx.wait_first_resume() {
        match catch_unwind(AssertUnwindSafe(|| code(&cx))) {
            Ok(()) => trace!(actor = %cx.id, "actor code finished"),
            Err(payload) if payload.is::<StopRequest>() => {
                trace!(actor = %cx.id, "caught a stop request")
            }
            Err(payload) => {
                let diagnostic = panic_message(payload.as_ref());
                error!(actor = %cx.id, diagnostic, "panic escaped actor code");
                *cx.shared.fatal.lock() = Some(diagnostic.to_string());
            }
        }
    }
    cx.shared.terminated.store(true, Ordering::Release);
    cx.leave();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
