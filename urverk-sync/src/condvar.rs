//! Simulation condition variable.
//!
//! A waiter releases its mutex and parks in one kernel dispatch; it resumes
//! only after re-acquiring the mutex (through the mutex's own FIFO queue),
//! on both the notify and the timeout path. Returning from a wait therefore
//! always implies the mutex is held again.

use tracing::error;

use urverk_core::sync::{CondVarId, CvWait};
use urverk_core::{Cx, Kernel, SimDuration, SimError, SimResult, SimTime};

use crate::mutex::SimMutex;

/// Actor-side handle to a kernel-owned condition variable.
#[derive(Debug, Clone, Copy)]
pub struct SimCondVar {
    id: CondVarId,
}

impl SimCondVar {
    /// Creates a condition variable from kernel context.
    pub fn create(kernel: &mut Kernel) -> Self {
        SimCondVar {
            id: kernel.condvar_create(),
        }
    }

    /// Creates a condition variable from actor context.
    pub fn new(cx: &Cx) -> Self {
        SimCondVar {
            id: cx.kernel_immediate(|kernel| kernel.condvar_create()),
        }
    }

    pub fn id(&self) -> CondVarId {
        self.id
    }

    /// Waits for a notification. The caller must hold `mutex`; it is
    /// released while parked and held again when this returns.
    pub fn wait(&self, cx: &Cx, mutex: &SimMutex) -> SimResult<()> {
        match self.wait_inner(cx, mutex, None)? {
            CvWait::Notified => Ok(()),
            CvWait::TimedOut => Err(SimError::Fatal(
                "untimed wait reported a timeout".into(),
            )),
        }
    }

    /// Waits for a notification or until `timeout` has elapsed. Returns
    /// which one ended the wait; the mutex is held again either way.
    pub fn wait_for(
        &self,
        cx: &Cx,
        mutex: &SimMutex,
        timeout: SimDuration,
    ) -> SimResult<CvWait> {
        self.wait_until(cx, mutex, cx.now() + timeout.max(SimDuration::ZERO))
    }

    /// Deadline flavor of [`SimCondVar::wait_for`].
    pub fn wait_until(
        &self,
        cx: &Cx,
        mutex: &SimMutex,
        deadline: SimTime,
    ) -> SimResult<CvWait> {
        self.wait_inner(cx, mutex, Some(deadline))
    }

    /// Wakes the longest-waiting actor, if any.
    pub fn notify_one(&self, cx: &Cx) -> SimResult<usize> {
        let id = self.id;
        cx.kernel_immediate(move |kernel| kernel.condvar_notify_one(id))
    }

    /// Wakes every waiter, in FIFO order.
    pub fn notify_all(&self, cx: &Cx) -> SimResult<usize> {
        let id = self.id;
        cx.kernel_immediate(move |kernel| kernel.condvar_notify_all(id))
    }

    fn wait_inner(
        &self,
        cx: &Cx,
        mutex: &SimMutex,
        deadline: Option<SimTime>,
    ) -> SimResult<CvWait> {
        let cv = self.id;
        let mutex = mutex.id();
        cx.run_blocking(move |kernel, issuer, slot| {
            if let Err(e) = kernel.condvar_wait(cv, mutex, issuer, slot.clone(), deadline) {
                if slot.set(Err(e)).is_err() {
                    error!(%cv, "wait verdict delivered twice");
                }
                kernel.unblock(issuer);
            }
        })
    }
}
