//! Kernel-side future/promise machinery.
//!
//! A kernel future represents a result that becomes available at some later
//! event inside the same kernel. It has no blocking wait: completion is
//! observed either through `get()` once ready, or by attaching a
//! continuation with `then`/`then_void`.
//!
//! Continuations never run inline. Satisfying a promise (or attaching a
//! continuation to an already-ready future) pushes a [`KernelTask`] onto the
//! kernel's ready list, which the scheduler drains as part of its
//! event-processing step. Code that sets a promise therefore never observes
//! reentrant user callbacks.
//!
//! The shared state is `Rc`-based on purpose: futures and promises are
//! kernel objects and must never leave the maestro thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::error;

use crate::error::{SimError, SimResult};
use crate::kernel::Kernel;
use crate::task::KernelTask;

/// Queue of continuations whose input future became ready. Owned by the
/// kernel, drained at the top of every scheduling round.
#[derive(Clone, Default)]
pub(crate) struct ReadyList {
    queue: Rc<RefCell<VecDeque<KernelTask>>>,
}

impl ReadyList {
    pub(crate) fn new() -> Self {
        ReadyList::default()
    }

    pub(crate) fn push(&self, task: KernelTask) {
        self.queue.borrow_mut().push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<KernelTask> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl fmt::Debug for ReadyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyList").field("len", &self.len()).finish()
    }
}

/// Lifecycle of a future's shared state. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// No value yet.
    NotReady,
    /// Value or error stored, not yet consumed.
    Ready,
    /// Value consumed by `get()`.
    Done,
}

type Continuation<T> = Box<dyn FnOnce(&mut Kernel, KernelFuture<T>) + 'static>;

struct FutureState<T: 'static> {
    status: FutureStatus,
    outcome: Option<SimResult<T>>,
    continuation: Option<Continuation<T>>,
    ready: ReadyList,
}

impl<T: 'static> FutureState<T> {
    fn new(ready: ReadyList) -> Self {
        FutureState {
            status: FutureStatus::NotReady,
            outcome: None,
            continuation: None,
            ready,
        }
    }
}

type SharedState<T> = Rc<RefCell<FutureState<T>>>;

/// Stores the outcome and schedules the attached continuation, if any.
fn complete<T: 'static>(state: &SharedState<T>, outcome: SimResult<T>) -> SimResult<()> {
    let mut s = state.borrow_mut();
    if s.status != FutureStatus::NotReady {
        return Err(SimError::AlreadySatisfied);
    }
    s.outcome = Some(outcome);
    s.status = FutureStatus::Ready;
    if let Some(continuation) = s.continuation.take() {
        let ready = s.ready.clone();
        drop(s);
        schedule_continuation(state.clone(), continuation, &ready);
    }
    Ok(())
}

fn schedule_continuation<T: 'static>(
    state: SharedState<T>,
    continuation: Continuation<T>,
    ready: &ReadyList,
) {
    ready.push(KernelTask::new(move |kernel| {
        continuation(kernel, KernelFuture { state: Some(state) })
    }));
}

/// Attaches the single continuation; schedules it right away when the state
/// is already ready. Never calls it inline.
fn attach<T: 'static>(state: SharedState<T>, continuation: Continuation<T>) {
    let mut s = state.borrow_mut();
    debug_assert!(
        s.continuation.is_none(),
        "kernel future carries at most one continuation"
    );
    match s.status {
        FutureStatus::NotReady => s.continuation = Some(continuation),
        FutureStatus::Ready | FutureStatus::Done => {
            let ready = s.ready.clone();
            drop(s);
            schedule_continuation(state, continuation, &ready);
        }
    }
}

/// Producing half of a future/promise pair. Created with
/// [`Kernel::promise`].
pub struct KernelPromise<T: 'static> {
    state: SharedState<T>,
    future_taken: bool,
}

impl<T: 'static> KernelPromise<T> {
    pub(crate) fn new(ready: ReadyList) -> Self {
        KernelPromise {
            state: Rc::new(RefCell::new(FutureState::new(ready))),
            future_taken: false,
        }
    }

    /// Hands out the consuming half. Callable at most once.
    pub fn get_future(&mut self) -> SimResult<KernelFuture<T>> {
        if self.future_taken {
            return Err(SimError::NoState);
        }
        self.future_taken = true;
        Ok(KernelFuture {
            state: Some(self.state.clone()),
        })
    }

    /// Satisfies the promise with a value. A second satisfaction attempt
    /// fails with `AlreadySatisfied`.
    pub fn set_value(&mut self, value: T) -> SimResult<()> {
        complete(&self.state, Ok(value))
    }

    /// Satisfies the promise with an error.
    pub fn set_error(&mut self, error: SimError) -> SimResult<()> {
        complete(&self.state, Err(error))
    }
}

impl<T: 'static> fmt::Debug for KernelPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelPromise")
            .field("status", &self.state.borrow().status)
            .field("future_taken", &self.future_taken)
            .finish()
    }
}

/// Consuming half of a future/promise pair.
///
/// The handle is single-use: `get` consumes it, and `then`/`then_void` move
/// its state into the continuation chain, leaving the handle invalid.
pub struct KernelFuture<T: 'static> {
    state: Option<SharedState<T>>,
}

impl<T: 'static> KernelFuture<T> {
    /// True while the handle still owns shared state.
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// True once the result is stored and not yet consumed.
    pub fn is_ready(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.borrow().status == FutureStatus::Ready)
    }

    /// Returns the value or error. Never blocks: calling it on a future
    /// that is not ready is a local deadlock and fails as such.
    pub fn get(mut self) -> SimResult<T> {
        let state = self.state.take().ok_or(SimError::NoState)?;
        let mut s = state.borrow_mut();
        match s.status {
            FutureStatus::NotReady => Err(SimError::Deadlock(
                "get() on a kernel future that is not ready".into(),
            )),
            FutureStatus::Ready => {
                s.status = FutureStatus::Done;
                match s.outcome.take() {
                    Some(outcome) => outcome,
                    None => Err(SimError::NoState),
                }
            }
            FutureStatus::Done => Err(SimError::NoState),
        }
    }

    /// Chains a continuation producing a new future.
    ///
    /// The continuation receives the ready future itself (so it can observe
    /// an error via `get`), and its result (or error) satisfies the
    /// returned future. If this future is already ready the continuation is
    /// scheduled, never run inline.
    pub fn then<U, F>(mut self, f: F) -> SimResult<KernelFuture<U>>
    where
        U: 'static,
        F: FnOnce(&mut Kernel, KernelFuture<T>) -> SimResult<U> + 'static,
    {
        let state = self.state.take().ok_or(SimError::NoState)?;
        let ready = state.borrow().ready.clone();
        let next: SharedState<U> = Rc::new(RefCell::new(FutureState::new(ready)));
        let next_in_chain = next.clone();
        attach(
            state,
            Box::new(move |kernel, input| {
                let outcome = f(kernel, input);
                if complete(&next_in_chain, outcome).is_err() {
                    error!("chained future was already satisfied");
                }
            }),
        );
        Ok(KernelFuture { state: Some(next) })
    }

    /// Chain terminator: attaches a continuation without producing a new
    /// future.
    pub fn then_void<F>(mut self, f: F) -> SimResult<()>
    where
        F: FnOnce(&mut Kernel, KernelFuture<T>) + 'static,
    {
        let state = self.state.take().ok_or(SimError::NoState)?;
        attach(state, Box::new(f));
        Ok(())
    }
}

impl<T: 'static> fmt::Debug for KernelFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.state.as_ref().map(|s| s.borrow().status);
        f.debug_struct("KernelFuture").field("status", &status).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use std::cell::Cell;

    fn kernel() -> Kernel {
        Kernel::new(&ContextConfig::default()).unwrap()
    }

    #[test]
    fn value_roundtrip() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        promise.set_value(42).unwrap();
        assert!(future.is_ready());
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn error_roundtrip() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        promise.set_error(SimError::Timeout).unwrap();
        assert_eq!(future.get(), Err(SimError::Timeout));
    }

    #[test]
    fn double_set_fails() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        promise.set_value(1).unwrap();
        assert_eq!(promise.set_value(2), Err(SimError::AlreadySatisfied));
        assert_eq!(
            promise.set_error(SimError::Timeout),
            Err(SimError::AlreadySatisfied)
        );
    }

    #[test]
    fn get_future_twice_fails() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let _first = promise.get_future().unwrap();
        assert!(promise.get_future().is_err());
    }

    #[test]
    fn get_on_unresolved_future_is_a_deadlock() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        assert!(matches!(future.get(), Err(SimError::Deadlock(_))));
    }

    #[test]
    fn continuation_is_scheduled_not_called_inline() {
        let mut kernel = kernel();
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        future
            .then_void(move |_, input| {
                observed.set(true);
                assert_eq!(input.get().unwrap(), 7);
            })
            .unwrap();
        promise.set_value(7).unwrap();
        // Not yet: the continuation sits on the ready list.
        assert!(!fired.get());
        kernel.drain_ready();
        assert!(fired.get());
    }

    #[test]
    fn attach_after_ready_is_scheduled_too() {
        let mut kernel = kernel();
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        promise.set_value(3).unwrap();
        future
            .then_void(move |_, input| {
                observed.set(true);
                assert_eq!(input.get().unwrap(), 3);
            })
            .unwrap();
        assert!(!fired.get());
        kernel.drain_ready();
        assert!(fired.get());
    }

    #[test]
    fn then_chains_values_and_errors() {
        let mut kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        let doubled = future.then(|_, input| Ok(input.get()? * 2)).unwrap();
        let stringified = doubled
            .then(|_, input| Ok(format!("value={}", input.get()?)))
            .unwrap();
        let result = Rc::new(RefCell::new(None));
        let sink = result.clone();
        stringified
            .then_void(move |_, input| {
                *sink.borrow_mut() = Some(input.get());
            })
            .unwrap();
        promise.set_value(21).unwrap();
        kernel.drain_ready();
        assert_eq!(result.borrow_mut().take().unwrap().unwrap(), "value=42");
    }

    #[test]
    fn errors_propagate_through_then_chains() {
        let mut kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        let chained = future.then(|_, input| Ok(input.get()? + 1)).unwrap();
        let result = Rc::new(RefCell::new(None));
        let sink = result.clone();
        chained
            .then_void(move |_, input| {
                *sink.borrow_mut() = Some(input.get());
            })
            .unwrap();
        promise.set_error(SimError::Timeout).unwrap();
        kernel.drain_ready();
        assert_eq!(result.borrow_mut().take().unwrap(), Err(SimError::Timeout));
    }

    #[test]
    fn moved_handle_is_invalid() {
        let kernel = kernel();
        let mut promise = kernel.promise::<u32>();
        let future = promise.get_future().unwrap();
        let chained = future.then(|_, input| input.get()).unwrap();
        assert!(chained.valid());
        // The original handle was consumed by `then`; a fresh default-like
        // handle cannot be observed, but get() on the chain before
        // resolution still reports deadlock, and a moved-from promise
        // rejects a second `get_future`.
        assert!(promise.get_future().is_err());
    }
}
