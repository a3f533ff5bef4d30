//! Kernel-side synchronization objects.
//!
//! Simulation mutexes and condition variables are kernel state, addressed
//! by id from actor context and mutated only from the maestro. The
//! actor-facing wrappers live in the `urverk-sync` crate; the operations
//! here are the kernel halves of their simcalls.
//!
//! Fairness is strict FIFO everywhere: waiters acquire a mutex in the order
//! they called lock, and `notify_one` wakes the longest-waiting actor.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{error, trace};

use crate::actor::ActorId;
use crate::error::{SimError, SimResult};
use crate::kernel::Kernel;
use crate::outcome::OutcomeSlot;
use crate::task::KernelTask;
use crate::time::SimTime;
use crate::timer::TimerId;

/// Identity of a simulation mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub(crate) u64);

impl fmt::Display for MutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutex-{}", self.0)
    }
}

/// Identity of a simulation condition variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CondVarId(pub(crate) u64);

impl fmt::Display for CondVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condvar-{}", self.0)
    }
}

/// How a condition-variable wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvWait {
    /// Woken by a notify.
    Notified,
    /// The wait's deadline expired first.
    TimedOut,
}

/// At most one owner; unlocking hands the mutex to the queue head.
#[derive(Debug, Default)]
pub(crate) struct MutexRec {
    pub(crate) owner: Option<ActorId>,
    pub(crate) waiters: VecDeque<ActorId>,
}

/// One parked condition-variable waiter. The result slot is filled when the
/// wait logically ends (notify or timeout); the actor only resumes once it
/// holds its mutex again.
pub(crate) struct CvWaiter {
    pub(crate) actor: ActorId,
    pub(crate) mutex: MutexId,
    pub(crate) result: Arc<OutcomeSlot<CvWait>>,
    pub(crate) timer: Option<TimerId>,
}

#[derive(Default)]
pub(crate) struct CvRec {
    pub(crate) waiters: VecDeque<CvWaiter>,
}

impl Kernel {
    pub fn mutex_create(&mut self) -> MutexId {
        let id = MutexId(self.alloc_object_id());
        self.mutexes.insert(id, MutexRec::default());
        trace!(%id, "mutex created");
        id
    }

    pub fn condvar_create(&mut self) -> CondVarId {
        let id = CondVarId(self.alloc_object_id());
        self.condvars.insert(id, CvRec::default());
        trace!(%id, "condvar created");
        id
    }

    /// Kernel half of a blocking lock: grants and unblocks when the mutex
    /// is free, otherwise appends the actor to the FIFO waiter queue and
    /// leaves it blocked. No owner-equals-caller exception: an actor
    /// relocking a mutex it already holds queues behind itself and the
    /// quiescence check reports the deadlock.
    pub fn mutex_lock(&mut self, id: MutexId, actor: ActorId) -> SimResult<()> {
        let granted = {
            let rec = self.mutex_mut(id)?;
            if rec.owner.is_none() {
                rec.owner = Some(actor);
                true
            } else {
                rec.waiters.push_back(actor);
                false
            }
        };
        if granted {
            trace!(%id, %actor, "mutex granted");
            self.unblock(actor);
        } else {
            trace!(%id, %actor, "mutex contended, queued");
        }
        Ok(())
    }

    /// Non-blocking acquisition attempt.
    pub fn mutex_try_lock(&mut self, id: MutexId, actor: ActorId) -> SimResult<bool> {
        let rec = self.mutex_mut(id)?;
        if rec.owner.is_none() {
            rec.owner = Some(actor);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Releases the mutex and transfers ownership to the queue head, if
    /// any, atomically with respect to the kernel.
    pub fn mutex_unlock(&mut self, id: MutexId, actor: ActorId) -> SimResult<()> {
        let next = {
            let rec = self.mutex_mut(id)?;
            if rec.owner != Some(actor) {
                return Err(SimError::Fatal(format!(
                    "actor {actor} unlocked {id} without owning it"
                )));
            }
            rec.owner = rec.waiters.pop_front();
            rec.owner
        };
        match next {
            Some(next) => {
                trace!(%id, from = %actor, to = %next, "mutex ownership transferred");
                self.unblock(next);
            }
            None => trace!(%id, %actor, "mutex released"),
        }
        Ok(())
    }

    /// Kernel half of a condition wait: releases the mutex (the caller must
    /// own it) and parks the actor on the condvar queue, with an optional
    /// timeout event. Release and enqueue happen in one dispatch, so no
    /// other simcall can interleave.
    pub fn condvar_wait(
        &mut self,
        cv: CondVarId,
        mutex: MutexId,
        actor: ActorId,
        result: Arc<OutcomeSlot<CvWait>>,
        deadline: Option<SimTime>,
    ) -> SimResult<()> {
        if !self.condvars.contains_key(&cv) {
            return Err(SimError::Fatal(format!("unknown condition variable {cv}")));
        }
        self.mutex_unlock(mutex, actor)?;
        let timer = deadline.map(|at| {
            self.timer_at(
                at,
                KernelTask::new(move |kernel| kernel.condvar_timeout(cv, actor)),
            )
        });
        trace!(%cv, %mutex, %actor, timed = timer.is_some(), "condvar wait");
        self.condvars
            .get_mut(&cv)
            .expect("condvar checked above")
            .waiters
            .push_back(CvWaiter {
                actor,
                mutex,
                result,
                timer,
            });
        Ok(())
    }

    /// Wakes the longest-waiting actor. Returns how many were woken.
    pub fn condvar_notify_one(&mut self, cv: CondVarId) -> SimResult<usize> {
        let waiter = self.condvar_mut(cv)?.waiters.pop_front();
        match waiter {
            Some(waiter) => {
                self.wake_cv_waiter(waiter, CvWait::Notified);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    /// Wakes every waiter, in FIFO order.
    pub fn condvar_notify_all(&mut self, cv: CondVarId) -> SimResult<usize> {
        let waiters = mem::take(&mut self.condvar_mut(cv)?.waiters);
        let woken = waiters.len();
        for waiter in waiters {
            self.wake_cv_waiter(waiter, CvWait::Notified);
        }
        Ok(woken)
    }

    /// Timeout event callback. A waiter already notified (and removed) is
    /// not here anymore, which makes a stale timer firing a no-op.
    fn condvar_timeout(&mut self, cv: CondVarId, actor: ActorId) {
        let waiter = {
            let rec = match self.condvars.get_mut(&cv) {
                Some(rec) => rec,
                None => return,
            };
            match rec.waiters.iter().position(|w| w.actor == actor) {
                Some(index) => rec.waiters.remove(index),
                None => return,
            }
        };
        if let Some(waiter) = waiter {
            trace!(%cv, %actor, "condvar wait timed out");
            self.wake_cv_waiter(waiter, CvWait::TimedOut);
        }
    }

    /// Ends a wait: cancels the timeout timer, records the verdict, and
    /// starts re-acquisition of the waiter's mutex. The actor resumes only
    /// once the mutex is granted — returning from a wait implies the mutex
    /// is held again.
    fn wake_cv_waiter(&mut self, waiter: CvWaiter, verdict: CvWait) {
        if let Some(timer) = waiter.timer {
            self.cancel_timer(timer);
        }
        if waiter.result.set(Ok(verdict)).is_err() {
            error!(actor = %waiter.actor, "condvar verdict delivered twice");
        }
        if let Err(e) = self.mutex_lock(waiter.mutex, waiter.actor) {
            // Re-acquire failure leaves the waiter unresumable.
            error!(actor = %waiter.actor, mutex = %waiter.mutex, %e, "mutex re-acquire failed");
        }
    }

    fn mutex_mut(&mut self, id: MutexId) -> SimResult<&mut MutexRec> {
        self.mutexes
            .get_mut(&id)
            .ok_or_else(|| SimError::Fatal(format!("unknown {id}")))
    }

    fn condvar_mut(&mut self, id: CondVarId) -> SimResult<&mut CvRec> {
        self.condvars
            .get_mut(&id)
            .ok_or_else(|| SimError::Fatal(format!("unknown {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;

    fn kernel() -> Kernel {
        Kernel::new(&ContextConfig::default()).unwrap()
    }

    // Kernel-half unit tests drive the state machine directly with actor
    // ids; full actor round-trips live in urverk-sync.
    #[test]
    fn uncontended_lock_is_granted() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(1)));
    }

    #[test]
    fn waiters_acquire_in_lock_order() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        kernel.mutex_lock(m, ActorId(2)).unwrap();
        kernel.mutex_lock(m, ActorId(3)).unwrap();
        kernel.mutex_unlock(m, ActorId(1)).unwrap();
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(2)));
        kernel.mutex_unlock(m, ActorId(2)).unwrap();
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(3)));
        kernel.mutex_unlock(m, ActorId(3)).unwrap();
        assert_eq!(kernel.mutexes[&m].owner, None);
    }

    #[test]
    fn try_lock_never_blocks() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        assert!(kernel.mutex_try_lock(m, ActorId(1)).unwrap());
        assert!(!kernel.mutex_try_lock(m, ActorId(2)).unwrap());
        assert!(kernel.mutexes[&m].waiters.is_empty());
    }

    #[test]
    fn unlock_by_non_owner_is_fatal() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        assert!(matches!(
            kernel.mutex_unlock(m, ActorId(2)),
            Err(SimError::Fatal(_))
        ));
    }

    #[test]
    fn relocking_a_held_mutex_queues_the_caller_behind_itself() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(1)));
        assert_eq!(
            kernel.mutexes[&m].waiters,
            VecDeque::from(vec![ActorId(1)])
        );
    }

    #[test]
    fn wait_releases_the_mutex_and_notify_reacquires() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        let cv = kernel.condvar_create();
        let slot = OutcomeSlot::new();
        kernel.mutex_lock(m, ActorId(1)).unwrap();
        kernel
            .condvar_wait(cv, m, ActorId(1), slot.clone(), None)
            .unwrap();
        // Between wait and wakeup the waiter does not own the mutex.
        assert_eq!(kernel.mutexes[&m].owner, None);
        assert_eq!(kernel.condvar_notify_one(cv).unwrap(), 1);
        assert_eq!(slot.take().unwrap(), CvWait::Notified);
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(1)));
    }

    #[test]
    fn notify_without_waiters_is_a_noop() {
        let mut kernel = kernel();
        let cv = kernel.condvar_create();
        assert_eq!(kernel.condvar_notify_one(cv).unwrap(), 0);
        assert_eq!(kernel.condvar_notify_all(cv).unwrap(), 0);
    }

    #[test]
    fn notify_all_wakes_in_fifo_order() {
        let mut kernel = kernel();
        let m = kernel.mutex_create();
        let cv = kernel.condvar_create();
        let slots: Vec<_> = (1..=3)
            .map(|n| {
                let slot = OutcomeSlot::new();
                kernel.mutex_lock(m, ActorId(n)).unwrap();
                kernel
                    .condvar_wait(cv, m, ActorId(n), slot.clone(), None)
                    .unwrap();
                slot
            })
            .collect();
        assert_eq!(kernel.condvar_notify_all(cv).unwrap(), 3);
        for slot in &slots {
            assert_eq!(slot.take().unwrap(), CvWait::Notified);
        }
        // First waiter re-acquired first, the rest queue on the mutex.
        assert_eq!(kernel.mutexes[&m].owner, Some(ActorId(1)));
        assert_eq!(
            kernel.mutexes[&m].waiters,
            VecDeque::from(vec![ActorId(2), ActorId(3)])
        );
    }
}
