//! Actor-side wait-based future.
//!
//! [`kernel_async`] runs a closure in the kernel, hooks the kernel future
//! it returns, and hands the actor an [`ActorFuture`]: a thin adapter whose
//! readiness is mirrored into a shared slot (actor threads cannot inspect
//! kernel-owned state). `get` blocks through the blocking simcall; the
//! timed waits arm a timer whose callback and the completion continuation
//! race over a one-shot waiter registration, so whichever fires second
//! becomes a no-op.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use urverk_core::{
    ActorId, Cx, Kernel, KernelFuture, KernelTask, OutcomeSlot, SimDuration, SimError, SimResult,
    SimTime,
};

struct Waiter<R> {
    actor: ActorId,
    slot: Arc<OutcomeSlot<R>>,
}

struct SlotInner<R> {
    outcome: Option<SimResult<R>>,
    waiter: Option<Waiter<R>>,
}

/// Mirror of one kernel future's resolution, shared between the kernel
/// continuation, the timer callback, and the owning actor.
struct FutureSlot<R> {
    inner: Mutex<SlotInner<R>>,
}

impl<R: Send + 'static> FutureSlot<R> {
    fn new() -> Arc<Self> {
        Arc::new(FutureSlot {
            inner: Mutex::new(SlotInner {
                outcome: None,
                waiter: None,
            }),
        })
    }

    /// Called from the kernel when the underlying future resolves: deliver
    /// to a parked waiter, or store for a later `get`.
    fn complete(&self, kernel: &mut Kernel, outcome: SimResult<R>) {
        let mut inner = self.inner.lock();
        if let Some(waiter) = inner.waiter.take() {
            drop(inner);
            if waiter.slot.set(outcome).is_err() {
                error!(actor = %waiter.actor, "actor future outcome delivered twice");
            }
            kernel.unblock(waiter.actor);
        } else if inner.outcome.is_some() {
            error!("actor future resolved twice");
        } else {
            inner.outcome = Some(outcome);
        }
    }
}

/// Wait-based future usable from actor context only.
///
/// Validity is ownership: the handle exists until `get`/`wait_for`
/// consumes it.
pub struct ActorFuture<R: Send + 'static> {
    shared: Arc<FutureSlot<R>>,
}

/// Runs `f` in the kernel; the kernel future it returns is wrapped into an
/// [`ActorFuture`] handed back to the actor without blocking it.
pub fn kernel_async<R, F>(cx: &Cx, f: F) -> ActorFuture<R>
where
    R: Send + 'static,
    F: FnOnce(&mut Kernel) -> SimResult<KernelFuture<R>> + Send + 'static,
{
    let shared = FutureSlot::new();
    let hook = shared.clone();
    cx.kernel_immediate(move |kernel| match f(kernel) {
        Ok(future) => {
            if !future.valid() {
                hook.complete(kernel, Err(SimError::NoState));
                return;
            }
            let attached = future.then_void(move |kernel, ready| {
                let outcome = ready.get();
                hook.complete(kernel, outcome);
            });
            debug_assert!(attached.is_ok(), "continuation on a validated future");
        }
        Err(e) => hook.complete(kernel, Err(e)),
    });
    ActorFuture { shared }
}

impl<R: Send + 'static> ActorFuture<R> {
    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        self.shared.inner.lock().outcome.is_some()
    }

    /// Blocks until the future resolves and delivers its value or error.
    /// An already-resolved future unblocks without waiting for any further
    /// event.
    pub fn get(self, cx: &Cx) -> SimResult<R> {
        let shared = self.shared;
        cx.run_blocking(move |kernel, issuer, slot| {
            let mut inner = shared.inner.lock();
            match inner.outcome.take() {
                Some(outcome) => {
                    drop(inner);
                    if slot.set(outcome).is_err() {
                        error!(actor = %issuer, "actor future outcome delivered twice");
                    }
                    kernel.unblock(issuer);
                }
                None => {
                    inner.waiter = Some(Waiter {
                        actor: issuer,
                        slot,
                    });
                }
            }
        })
    }

    /// Like [`ActorFuture::get`] but gives up after `timeout`, resuming the
    /// actor with a `Timeout` error.
    pub fn wait_for(self, cx: &Cx, timeout: SimDuration) -> SimResult<R> {
        let deadline = cx.now() + timeout.max(SimDuration::ZERO);
        self.wait_until(cx, deadline)
    }

    /// Deadline flavor of [`ActorFuture::wait_for`].
    pub fn wait_until(self, cx: &Cx, deadline: SimTime) -> SimResult<R> {
        let shared = self.shared;
        cx.run_blocking(move |kernel, issuer, slot| {
            let mut inner = shared.inner.lock();
            match inner.outcome.take() {
                Some(outcome) => {
                    drop(inner);
                    if slot.set(outcome).is_err() {
                        error!(actor = %issuer, "actor future outcome delivered twice");
                    }
                    kernel.unblock(issuer);
                }
                None => {
                    inner.waiter = Some(Waiter {
                        actor: issuer,
                        slot,
                    });
                    drop(inner);
                    let armed = shared.clone();
                    kernel.timer_at(
                        deadline,
                        KernelTask::new(move |kernel| {
                            // A waiter still registered means the future
                            // has not resolved: time the wait out. The
                            // late resolution will find no waiter and
                            // become a stored outcome nobody reads.
                            let mut inner = armed.inner.lock();
                            if let Some(waiter) = inner.waiter.take() {
                                drop(inner);
                                if waiter.slot.set(Err(SimError::Timeout)).is_err() {
                                    error!(actor = %waiter.actor, "timeout delivered twice");
                                }
                                kernel.unblock(waiter.actor);
                            }
                        }),
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::sleep_for;
    use urverk_core::ContextConfig;

    fn kernel() -> Kernel {
        Kernel::new(&ContextConfig::default()).unwrap()
    }

    #[test]
    fn async_then_get_delivers_the_value_at_resolution_time() {
        let mut kernel = kernel();
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("asyncer", move |cx| {
                let pending = kernel_async(cx, |k| {
                    k.timer_future(SimTime::from_secs(7.0)).then(|_, done| {
                        done.get()?;
                        Ok("resolved")
                    })
                });
                assert!(!pending.is_ready());
                let value = pending.get(cx).unwrap();
                sink.set(Ok((value, cx.now()))).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        let (value, at) = result.take().unwrap();
        assert_eq!(value, "resolved");
        assert_eq!(at, SimTime::from_secs(7.0));
    }

    #[test]
    fn get_on_an_already_resolved_future_does_not_wait() {
        let mut kernel = kernel();
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("latecomer", move |cx| {
                let pending =
                    kernel_async(cx, |k| Ok(k.timer_future(SimTime::from_secs(1.0))));
                // Out-sleep the resolution, then collect.
                sleep_for(cx, SimDuration::from_secs(5.0)).unwrap();
                assert!(pending.is_ready());
                pending.get(cx).unwrap();
                sink.set(Ok(cx.now())).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        assert_eq!(result.take().unwrap(), SimTime::from_secs(5.0));
    }

    #[test]
    fn wait_for_times_out_before_resolution() {
        let mut kernel = kernel();
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("deadliner", move |cx| {
                let pending =
                    kernel_async(cx, |k| Ok(k.timer_future(SimTime::from_secs(100.0))));
                let outcome = pending.wait_for(cx, SimDuration::from_secs(3.0));
                sink.set(Ok((outcome.err(), cx.now()))).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        let (error, at) = result.take().unwrap();
        assert_eq!(error, Some(SimError::Timeout));
        assert_eq!(at, SimTime::from_secs(3.0));
    }

    #[test]
    fn wait_for_delivers_the_value_when_it_beats_the_deadline() {
        let mut kernel = kernel();
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("optimist", move |cx| {
                let pending = kernel_async(cx, |k| {
                    k.timer_future(SimTime::from_secs(2.0)).then(|_, done| {
                        done.get()?;
                        Ok(17)
                    })
                });
                let value = pending.wait_for(cx, SimDuration::from_secs(60.0)).unwrap();
                sink.set(Ok((value, cx.now()))).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        let (value, at) = result.take().unwrap();
        assert_eq!(value, 17);
        assert_eq!(at, SimTime::from_secs(2.0));
    }

    #[test]
    fn errors_from_the_kernel_closure_surface_at_get() {
        let mut kernel = kernel();
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("doomed", move |cx| {
                let pending: ActorFuture<u32> =
                    kernel_async(cx, |_| Err(SimError::Fatal("no future".into())));
                sink.set(Ok(pending.get(cx).err())).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        assert!(matches!(
            result.take().unwrap(),
            Some(SimError::Fatal(_))
        ));
    }
}
