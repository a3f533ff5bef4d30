//! Simulation mutex.
//!
//! Strictly FIFO-fair: waiters acquire in the order they called `lock`,
//! and unlocking hands ownership to the queue head atomically with respect
//! to the kernel. Not recursive: relocking a mutex the caller already
//! holds parks the caller in the mutex's own waiter queue, and the
//! scheduler's quiescence check reports the deadlock.
//!
//! No RAII guard is offered: the condition-variable protocol releases and
//! re-acquires the mutex inside the kernel, which an actor-side guard could
//! not observe. Lock and unlock are explicit calls, like the rest of the
//! simcall surface.

use tracing::error;

use urverk_core::sync::MutexId;
use urverk_core::{Cx, Kernel, SimResult};

/// Actor-side handle to a kernel-owned mutex.
#[derive(Debug, Clone, Copy)]
pub struct SimMutex {
    id: MutexId,
}

impl SimMutex {
    /// Creates a mutex from kernel context, before or during the run.
    pub fn create(kernel: &mut Kernel) -> Self {
        SimMutex {
            id: kernel.mutex_create(),
        }
    }

    /// Creates a mutex from actor context.
    pub fn new(cx: &Cx) -> Self {
        SimMutex {
            id: cx.kernel_immediate(|kernel| kernel.mutex_create()),
        }
    }

    pub fn id(&self) -> MutexId {
        self.id
    }

    /// Acquires the mutex, blocking until it is granted.
    pub fn lock(&self, cx: &Cx) -> SimResult<()> {
        let id = self.id;
        cx.run_blocking(move |kernel, issuer, slot| {
            match kernel.mutex_lock(id, issuer) {
                // Granted now or queued; either way the slot already holds
                // the verdict for when the actor resumes.
                Ok(()) => {
                    if slot.set(Ok(())).is_err() {
                        error!(%id, "lock verdict delivered twice");
                    }
                }
                Err(e) => {
                    if slot.set(Err(e)).is_err() {
                        error!(%id, "lock verdict delivered twice");
                    }
                    kernel.unblock(issuer);
                }
            }
        })
    }

    /// Acquires the mutex if it is free, without ever blocking.
    pub fn try_lock(&self, cx: &Cx) -> SimResult<bool> {
        let id = self.id;
        let me = cx.id();
        cx.kernel_immediate(move |kernel| kernel.mutex_try_lock(id, me))
    }

    /// Releases the mutex. Fails when the caller does not own it.
    pub fn unlock(&self, cx: &Cx) -> SimResult<()> {
        let id = self.id;
        let me = cx.id();
        cx.kernel_immediate(move |kernel| kernel.mutex_unlock(id, me))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::sleep_for;
    use std::sync::Arc;
    use urverk_core::{ContextConfig, OutcomeSlot, SimDuration, SimError, SimTime};

    fn kernel() -> Kernel {
        Kernel::new(&ContextConfig::default()).unwrap()
    }

    #[test]
    fn lock_unlock_on_uncontended_mutex() {
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        let done = OutcomeSlot::new();
        let sink = done.clone();
        kernel
            .spawn("solo", move |cx| {
                mutex.lock(cx).unwrap();
                mutex.unlock(cx).unwrap();
                sink.set(Ok(())).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        assert!(done.is_set());
    }

    #[test]
    fn contended_lock_returns_when_the_owner_releases() {
        // First actor takes the mutex at t=0 and sleeps 3s holding it; the
        // second requests it at t=1 and must get it exactly when released.
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = events.clone();
        kernel
            .spawn("holder", move |cx| {
                mutex.lock(cx).unwrap();
                log.lock().push(("holder locked", cx.now().as_secs()));
                sleep_for(cx, SimDuration::from_secs(3.0)).unwrap();
                log.lock().push(("holder releasing", cx.now().as_secs()));
                mutex.unlock(cx).unwrap();
            })
            .unwrap();

        let log = events.clone();
        kernel
            .spawn("claimer", move |cx| {
                sleep_for(cx, SimDuration::from_secs(1.0)).unwrap();
                mutex.lock(cx).unwrap();
                log.lock().push(("claimer locked", cx.now().as_secs()));
                mutex.unlock(cx).unwrap();
            })
            .unwrap();

        kernel.run().unwrap();
        assert_eq!(
            *events.lock(),
            vec![
                ("holder locked", 0.0),
                ("holder releasing", 3.0),
                ("claimer locked", 3.0),
            ]
        );
    }

    #[test]
    fn waiters_are_granted_in_lock_order() {
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = order.clone();
            kernel
                .spawn(&format!("waiter-{n}"), move |cx| {
                    // Stagger the lock calls by n yields.
                    for _ in 0..n {
                        cx.yield_now();
                    }
                    mutex.lock(cx).unwrap();
                    order.lock().push(n);
                    cx.yield_now();
                    mutex.unlock(cx).unwrap();
                })
                .unwrap();
        }
        kernel.run().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn try_lock_reports_contention_without_blocking() {
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        let result = OutcomeSlot::new();

        kernel
            .spawn("owner", move |cx| {
                mutex.lock(cx).unwrap();
                sleep_for(cx, SimDuration::from_secs(2.0)).unwrap();
                mutex.unlock(cx).unwrap();
            })
            .unwrap();

        let sink = result.clone();
        kernel
            .spawn("prober", move |cx| {
                cx.yield_now();
                let contended = mutex.try_lock(cx).unwrap();
                let at = cx.now();
                sink.set(Ok((contended, at))).unwrap();
            })
            .unwrap();

        kernel.run().unwrap();
        let (acquired, at) = result.take().unwrap();
        assert!(!acquired);
        assert_eq!(at, SimTime::ZERO);
    }

    #[test]
    fn unlock_without_ownership_fails() {
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        let result = OutcomeSlot::new();
        let sink = result.clone();
        kernel
            .spawn("impostor", move |cx| {
                sink.set(Ok(mutex.unlock(cx))).unwrap();
            })
            .unwrap();
        kernel.run().unwrap();
        assert!(matches!(result.take().unwrap(), Err(SimError::Fatal(_))));
    }

    #[test]
    fn relocking_a_held_mutex_deadlocks_and_is_reported() {
        let mut kernel = kernel();
        let mutex = SimMutex::create(&mut kernel);
        kernel
            .spawn("relocker", move |cx| {
                mutex.lock(cx).unwrap();
                mutex.lock(cx).unwrap();
            })
            .unwrap();
        match kernel.run() {
            Err(SimError::Deadlock(detail)) => assert!(detail.contains("relocker")),
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[test]
    fn crossed_lock_order_deadlocks_and_is_reported() {
        let mut kernel = kernel();
        let first = SimMutex::create(&mut kernel);
        let second = SimMutex::create(&mut kernel);

        kernel
            .spawn("left", move |cx| {
                first.lock(cx).unwrap();
                cx.yield_now();
                second.lock(cx).unwrap();
            })
            .unwrap();
        kernel
            .spawn("right", move |cx| {
                second.lock(cx).unwrap();
                cx.yield_now();
                first.lock(cx).unwrap();
            })
            .unwrap();

        match kernel.run() {
            Err(SimError::Deadlock(detail)) => {
                assert!(detail.contains("left"));
                assert!(detail.contains("right"));
            }
            other => panic!("expected deadlock, got {other:?}"),
        }
    }
}
