//! Cooperative execution contexts.
//!
//! Every actor owns a context: a parked OS thread that holds the actor's
//! stack between simcalls. Control moves by rendezvous handoff, so exactly
//! one context of the simulation runs at any instant in the serial variant,
//! and only independent actor code overlaps in the parallel variant.
//!
//! Scheduling a round works by chaining: the maestro (or a pool worker)
//! resumes the first context; when a context suspends at its simcall it
//! pulls the next runnable actor from the shared run queue and resumes it
//! directly, and the last one in the chain hands control back through the
//! `done` channel. Workers of the parallel variant pull from the same
//! atomic dispenser and the maestro joins all of them before it looks at
//! any actor state.
//!
//! Stop is delivered at the context's next resumption as a typed panic
//! payload that unwinds the actor stack; the trampoline in [`crate::cx`]
//! catches it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};

/// Typed panic payload raised inside a context to request a clean unwind.
/// Swallowed at the context boundary; anything else escaping actor code is
/// fatal.
#[derive(Debug)]
pub struct StopRequest;

/// Which context factory variant drives the scheduling rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// All actors resumed one by one, chained on the kernel thread.
    Serial,
    /// A fixed pool of worker threads resumes actors; the kernel itself
    /// stays single-threaded between rounds.
    Parallel,
}

/// Context factory configuration.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub mode: ContextMode,
    /// Worker threads of the parallel variant. Ignored in serial mode.
    pub workers: usize,
    /// Stack size of each actor context, in bytes.
    pub stack_size: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            mode: ContextMode::Serial,
            workers: 4,
            stack_size: 512 * 1024,
        }
    }
}

/// Command delivered to a parked context.
pub(crate) enum Command {
    /// Resume and, on the next suspend, keep the chain running.
    Run {
        queue: Arc<RunQueue>,
        done: Sender<()>,
    },
    /// Unwind the context at this resumption point.
    Stop { acked: Sender<()> },
}

/// One scheduling round's list of runnable contexts plus the dispenser
/// index. Shared by every context (and worker) participating in the round.
pub(crate) struct RunQueue {
    targets: Vec<Sender<Command>>,
    next: AtomicUsize,
}

impl RunQueue {
    fn with_start(targets: Vec<Sender<Command>>, start: usize) -> Arc<Self> {
        Arc::new(RunQueue {
            targets,
            next: AtomicUsize::new(start),
        })
    }

    /// Hands out each runnable context exactly once.
    pub(crate) fn pull(&self) -> Option<Sender<Command>> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.targets.get(index).cloned()
    }
}

/// Kernel-side handle to one context.
pub(crate) struct ContextHandle {
    resume_tx: Sender<Command>,
    join: Option<JoinHandle<()>>,
}

impl ContextHandle {
    pub(crate) fn sender(&self) -> Sender<Command> {
        self.resume_tx.clone()
    }

    /// Requests termination at the context's next resumption and waits for
    /// the unwind to finish.
    pub(crate) fn stop(&mut self) {
        let (acked_tx, acked_rx) = bounded(1);
        if self.resume_tx.send(Command::Stop { acked: acked_tx }).is_ok() {
            let _ = acked_rx.recv();
        }
        self.join();
    }

    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Creates contexts and runs scheduling rounds over them.
pub(crate) struct ContextFactory {
    stack_size: usize,
    round_done_tx: Sender<()>,
    round_done_rx: Receiver<()>,
    pool: Option<WorkerPool>,
}

impl ContextFactory {
    pub(crate) fn new(config: &ContextConfig) -> SimResult<Self> {
        let (round_done_tx, round_done_rx) = unbounded();
        let pool = match config.mode {
            ContextMode::Serial => None,
            ContextMode::Parallel => {
                debug!(workers = config.workers, "starting parallel context workers");
                Some(WorkerPool::start(config.workers.max(1))?)
            }
        };
        Ok(ContextFactory {
            stack_size: config.stack_size,
            round_done_tx,
            round_done_rx,
            pool,
        })
    }

    /// Allocates a context: a parked thread running `entry` with the
    /// receiving end of the resume channel. Allocation failure is fatal.
    pub(crate) fn create(
        &self,
        name: &str,
        entry: impl FnOnce(Receiver<Command>) + Send + 'static,
    ) -> SimResult<ContextHandle> {
        let (resume_tx, resume_rx) = unbounded();
        let join = std::thread::Builder::new()
            .name(format!("urverk-{name}"))
            .stack_size(self.stack_size)
            .spawn(move || entry(resume_rx))
            .map_err(|e| SimError::Fatal(format!("context allocation failed for '{name}': {e}")))?;
        Ok(ContextHandle {
            resume_tx,
            join: Some(join),
        })
    }

    /// Runs every context in `targets` until each has parked at its next
    /// simcall or terminated. Returns only after the barrier: no actor code
    /// is running when this returns.
    pub(crate) fn run_all(&mut self, targets: Vec<Sender<Command>>) {
        if targets.is_empty() {
            return;
        }
        match &self.pool {
            None => {
                // Serial: resume the first context ourselves, the chain
                // dispenser starts at 1.
                let first = targets[0].clone();
                let queue = RunQueue::with_start(targets, 1);
                if first
                    .send(Command::Run {
                        queue,
                        done: self.round_done_tx.clone(),
                    })
                    .is_err()
                {
                    return;
                }
                let _ = self.round_done_rx.recv();
            }
            Some(pool) => {
                let queue = RunQueue::with_start(targets, 0);
                pool.run_round(queue);
            }
        }
    }
}

enum WorkerMsg {
    Round(Arc<RunQueue>),
    Shutdown,
}

/// Fixed-size pool of resumption workers for the parallel variant.
struct WorkerPool {
    commands: Vec<Sender<WorkerMsg>>,
    done_rx: Receiver<()>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(workers: usize) -> SimResult<Self> {
        let (done_tx, done_rx) = unbounded();
        let mut commands = Vec::with_capacity(workers);
        let mut joins = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = unbounded();
            let done = done_tx.clone();
            let join = std::thread::Builder::new()
                .name(format!("urverk-worker-{index}"))
                .spawn(move || worker_main(index, rx, done))
                .map_err(|e| SimError::Fatal(format!("worker thread {index} failed to start: {e}")))?;
            commands.push(tx);
            joins.push(join);
        }
        Ok(WorkerPool {
            commands,
            done_rx,
            joins,
        })
    }

    /// Dispatches one round to every worker and joins them all before
    /// returning control to the maestro.
    fn run_round(&self, queue: Arc<RunQueue>) {
        for tx in &self.commands {
            let _ = tx.send(WorkerMsg::Round(queue.clone()));
        }
        for _ in 0..self.commands.len() {
            let _ = self.done_rx.recv();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for tx in &self.commands {
            let _ = tx.send(WorkerMsg::Shutdown);
        }
        for join in self.joins.drain(..) {
            let _ = join.join();
        }
    }
}

fn worker_main(index: usize, commands: Receiver<WorkerMsg>, done: Sender<()>) {
    // Chain-return channel: contexts resumed by this worker hand control
    // back here when the dispenser runs dry.
    let (chain_tx, chain_rx) = bounded(1);
    while let Ok(msg) = commands.recv() {
        match msg {
            WorkerMsg::Round(queue) => {
                while let Some(target) = queue.pull() {
                    if target
                        .send(Command::Run {
                            queue: queue.clone(),
                            done: chain_tx.clone(),
                        })
                        .is_ok()
                    {
                        let _ = chain_rx.recv();
                    }
                }
                trace!(worker = index, "round drained");
                let _ = done.send(());
            }
            WorkerMsg::Shutdown => break,
        }
    }
}
