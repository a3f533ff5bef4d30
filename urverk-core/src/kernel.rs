//! The maestro: the single-threaded discrete-event scheduler that owns all
//! simulation state.
//!
//! One scheduling round drains the ready list, resumes every runnable actor
//! through the context factory (a barrier: no actor code runs when
//! `run_all` returns), then walks the batch and dispatches each parked
//! simcall record. When nothing is runnable the kernel pops the earliest
//! pending event, advances the clock to it and fires it. The simulation
//! ends when no actors remain; quiescence with live blocked actors is a
//! deadlock.
//!
//! All kernel state is owned here and mutated only from the maestro
//! context. No lock protects it: correctness comes from the cooperative
//! discipline, not from synchronization.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Once;

use tracing::{debug, error, trace, warn};

use crate::actor::{Actor, ActorId, ActorShared, ActorState, CleanupFn};
use crate::context::{ContextConfig, ContextFactory, StopRequest};
use crate::cx::{context_main, Cx, CxSeed};
use crate::error::{SimError, SimResult};
use crate::future::{KernelFuture, KernelPromise, ReadyList};
use crate::simcall::{dispatch_legacy, Simcall};
use crate::stats::SimStats;
use crate::sync::{CondVarId, CvRec, MutexId, MutexRec};
use crate::task::KernelTask;
use crate::time::{SimClock, SimTime};
use crate::timer::{TimerId, TimerQueue};

static SILENCE_STOP_PANICS: Once = Once::new();

/// Keeps the default panic hook from spamming stderr every time a context
/// unwinds on the stop signal.
fn install_stop_silencer() {
    SILENCE_STOP_PANICS.call_once(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<StopRequest>().is_some() {
                return;
            }
            default_hook(info);
        }));
    });
}

/// The simulation kernel. Create one, spawn the initial actors, call
/// [`Kernel::run`].
pub struct Kernel {
    pub(crate) clock: SimClock,
    pub(crate) ready: ReadyList,
    pub(crate) timers: TimerQueue,
    pub(crate) actors: BTreeMap<ActorId, Actor>,
    pub(crate) to_run: Vec<ActorId>,
    pub(crate) factory: ContextFactory,
    pub(crate) mutexes: HashMap<MutexId, MutexRec>,
    pub(crate) condvars: HashMap<CondVarId, CvRec>,
    pub(crate) next_actor_id: u64,
    pub(crate) next_object_id: u64,
    pub(crate) stats: SimStats,
}

impl Kernel {
    pub fn new(config: &ContextConfig) -> SimResult<Self> {
        install_stop_silencer();
        Ok(Kernel {
            clock: SimClock::new(),
            ready: ReadyList::new(),
            timers: TimerQueue::new(),
            actors: BTreeMap::new(),
            to_run: Vec::new(),
            factory: ContextFactory::new(config)?,
            mutexes: HashMap::new(),
            condvars: HashMap::new(),
            next_actor_id: 0,
            next_object_id: 0,
            stats: SimStats::default(),
        })
    }

    /// Current simulated instant.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// A read-only handle onto the simulated clock.
    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Actors that have not terminated yet.
    pub fn live_actors(&self) -> usize {
        self.actors
            .values()
            .filter(|a| a.state != ActorState::Terminated)
            .count()
    }

    /// Creates a promise bound to this kernel's ready list.
    pub fn promise<T: 'static>(&self) -> KernelPromise<T> {
        KernelPromise::new(self.ready.clone())
    }

    /// Defers `task` to the current event-processing step.
    pub fn schedule(&mut self, task: KernelTask) {
        self.ready.push(task);
    }

    /// Schedules `task` at absolute simulated time `at` (clamped to now).
    pub fn timer_at(&mut self, at: SimTime, task: KernelTask) -> TimerId {
        let at = at.max(self.now());
        self.timers.schedule(at, task)
    }

    /// Cancels a pending timer; firing a cancelled timer is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// A kernel future that resolves at simulated time `at` — the bridge
    /// between the event source and the future machinery.
    pub fn timer_future(&mut self, at: SimTime) -> KernelFuture<()> {
        let mut promise = self.promise::<()>();
        let future = promise
            .get_future()
            .expect("future of a fresh promise already taken");
        self.timer_at(
            at,
            KernelTask::new(move |_| {
                if promise.set_value(()).is_err() {
                    error!("timer promise already satisfied");
                }
            }),
        );
        future
    }

    /// Makes a blocked actor runnable again; it joins the to-run list in
    /// FIFO order. Unblocking a terminated actor is a no-op (its pending
    /// wake-up is simply retired).
    pub fn unblock(&mut self, id: ActorId) {
        match self.actors.get_mut(&id) {
            Some(actor) if actor.state == ActorState::Blocked => {
                actor.state = ActorState::Runnable;
                self.to_run.push(id);
                trace!(actor = %id, "unblocked");
            }
            Some(actor) if actor.state == ActorState::Terminated => {
                trace!(actor = %id, "unblock on terminated actor ignored");
            }
            Some(_) => warn!(actor = %id, "unblock on runnable actor ignored"),
            None => warn!(actor = %id, "unblock on unknown actor"),
        }
    }

    /// Spawns an actor; it becomes runnable in the next round.
    pub fn spawn<F>(&mut self, name: &str, code: F) -> SimResult<ActorId>
    where
        F: FnOnce(&Cx) + Send + 'static,
    {
        self.spawn_with_cleanup(name, code, None)
    }

    /// Spawns an actor with a cleanup hook run by the maestro after the
    /// actor terminates.
    pub fn spawn_with_cleanup<F>(
        &mut self,
        name: &str,
        code: F,
        cleanup: Option<CleanupFn>,
    ) -> SimResult<ActorId>
    where
        F: FnOnce(&Cx) + Send + 'static,
    {
        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;
        let shared = Arc::new(ActorShared::default());
        let seed = CxSeed {
            id,
            name: name.to_string(),
            shared: shared.clone(),
            clock: self.clock.clone(),
        };
        let boxed: Box<dyn FnOnce(&Cx) + Send> = Box::new(code);
        let context = self
            .factory
            .create(name, move |resume_rx| context_main(seed, resume_rx, boxed))?;
        self.actors.insert(
            id,
            Actor {
                id,
                name: name.to_string(),
                state: ActorState::Runnable,
                shared,
                context,
                cleanup,
            },
        );
        self.to_run.push(id);
        self.stats.actors_spawned += 1;
        debug!(actor = %id, name, "spawned actor");
        Ok(id)
    }

    /// Runs the simulation to completion.
    ///
    /// Returns `Ok(())` on clean termination (every actor exited, event
    /// queue empty) and `Err(Deadlock)` when live blocked actors remain at
    /// quiescence. Fatal errors abort the run with a diagnostic naming the
    /// offending actor.
    pub fn run(&mut self) -> SimResult<()> {
        debug!(actors = self.live_actors(), "simulation started");
        loop {
            self.drain_ready();
            if !self.to_run.is_empty() {
                self.run_round()?;
                continue;
            }
            if let Some((at, task)) = self.timers.pop_due() {
                let now = self.now();
                debug_assert!(at >= now, "pending event in the past");
                if at > now {
                    trace!(from = %now, to = %at, "advancing clock");
                    self.clock.advance_to(at);
                }
                self.stats.timers_fired += 1;
                task.run(self);
                continue;
            }
            break;
        }
        let blocked: Vec<String> = self
            .actors
            .values()
            .filter(|a| a.state != ActorState::Terminated)
            .map(|a| format!("'{}' (id {})", a.name, a.id))
            .collect();
        if blocked.is_empty() {
            debug!(final_time = %self.now(), rounds = self.stats.rounds, "simulation finished");
            return Ok(());
        }
        let detail = format!(
            "event queue is empty while {} actor(s) remain blocked: {}",
            blocked.len(),
            blocked.join(", ")
        );
        error!(%detail, "deadlock detected");
        self.shutdown();
        Err(SimError::Deadlock(detail))
    }

    /// Runs every continuation whose future became ready, until the list
    /// is exhausted (continuations may ready further futures).
    pub(crate) fn drain_ready(&mut self) {
        while let Some(task) = self.ready.pop() {
            task.run(self);
        }
    }

    fn run_round(&mut self) -> SimResult<()> {
        self.stats.rounds += 1;
        let batch = mem::take(&mut self.to_run);
        trace!(round = self.stats.rounds, actors = batch.len(), "running actors");
        let targets = batch
            .iter()
            .filter_map(|id| self.actors.get(id).map(|a| a.context.sender()))
            .collect();
        self.factory.run_all(targets);
        self.stats.context_resumes += batch.len() as u64;
        for id in batch {
            self.handle_parked(id)?;
        }
        Ok(())
    }

    /// Inspects one actor after the round's barrier: it either terminated
    /// or parked at a simcall record.
    fn handle_parked(&mut self, id: ActorId) -> SimResult<()> {
        let shared = match self.actors.get(&id) {
            Some(actor) => actor.shared.clone(),
            None => return Ok(()),
        };
        if let Some(diagnostic) = shared.fatal.lock().take() {
            let name = self.actor_name(id);
            self.shutdown();
            return Err(SimError::Fatal(format!(
                "actor '{name}' (id {id}) died: {diagnostic}"
            )));
        }
        if shared.terminated.load(Ordering::Acquire) {
            self.finish_actor(id);
            return Ok(());
        }
        match shared.simcall.take() {
            Some(Simcall::Immediate(f)) => {
                self.stats.simcalls_immediate += 1;
                trace!(actor = %id, "immediate simcall");
                f(self);
                self.requeue(id);
            }
            Some(Simcall::Legacy(call)) => {
                self.stats.simcalls_legacy += 1;
                trace!(actor = %id, tag = ?call.tag, "legacy simcall");
                dispatch_legacy(self, call);
                self.requeue(id);
            }
            Some(Simcall::Blocking(f)) => {
                self.stats.simcalls_blocking += 1;
                trace!(actor = %id, "blocking simcall");
                if let Some(actor) = self.actors.get_mut(&id) {
                    actor.state = ActorState::Blocked;
                }
                f(self, id);
            }
            None => {
                let name = self.actor_name(id);
                self.shutdown();
                return Err(SimError::Fatal(format!(
                    "actor '{name}' (id {id}) yielded without a simcall record"
                )));
            }
        }
        Ok(())
    }

    /// Puts an immediate-simcall issuer back on the to-run list, unless the
    /// closure it ran terminated it.
    fn requeue(&mut self, id: ActorId) {
        if let Some(actor) = self.actors.get(&id) {
            if actor.state != ActorState::Terminated {
                self.to_run.push(id);
            }
        }
    }

    fn actor_name(&self, id: ActorId) -> String {
        self.actors
            .get(&id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "?".into())
    }

    fn finish_actor(&mut self, id: ActorId) {
        let cleanup = match self.actors.get_mut(&id) {
            Some(actor) => {
                actor.state = ActorState::Terminated;
                actor.context.join();
                actor.cleanup.take()
            }
            None => None,
        };
        debug!(actor = %id, "actor terminated");
        if let Some(hook) = cleanup {
            hook(self);
        }
    }

    /// Stops one actor: raises the stop signal at its next resumption,
    /// waits for the unwind, then runs its cleanup hook. Synchronous and
    /// safe to call from any kernel-side closure, including one issued by
    /// the actor being stopped.
    pub fn stop_actor(&mut self, id: ActorId) {
        self.to_run.retain(|r| *r != id);
        let cleanup = match self.actors.get_mut(&id) {
            Some(actor) if actor.state != ActorState::Terminated => {
                debug!(actor = %id, "stopping actor");
                actor.context.stop();
                actor.state = ActorState::Terminated;
                actor.cleanup.take()
            }
            _ => None,
        };
        if let Some(hook) = cleanup {
            hook(self);
        }
    }

    /// Stops every live actor. Used on deadlock and on drop so context
    /// threads never outlive the kernel.
    pub fn shutdown(&mut self) {
        let live: Vec<ActorId> = self
            .actors
            .iter()
            .filter(|(_, a)| a.state != ActorState::Terminated)
            .map(|(id, _)| *id)
            .collect();
        for id in live {
            self.stop_actor(id);
        }
    }

    pub(crate) fn alloc_object_id(&mut self) -> u64 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
