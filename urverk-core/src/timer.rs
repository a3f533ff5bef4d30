//! Pending-event queue.
//!
//! Min-heap of timer entries keyed by (simulated time, insertion sequence),
//! so simultaneous events fire in insertion order. Callbacks are stored
//! aside and removed on cancellation; firing a cancelled entry is a no-op.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use crate::task::KernelTask;
use crate::time::SimTime;

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct TimerKey {
    at: SimTime,
    seq: u64,
    id: TimerId,
}

impl Ord for TimerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered heap of future callbacks. The heap minimum is always at or
/// after the current clock; the kernel advances the clock to it before
/// firing.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerKey>>,
    callbacks: HashMap<TimerId, KernelTask>,
    next_seq: u64,
    next_id: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        TimerQueue::default()
    }

    /// Schedules `task` at absolute time `at`.
    pub fn schedule(&mut self, at: SimTime, task: KernelTask) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(TimerKey { at, seq, id }));
        self.callbacks.insert(id, task);
        id
    }

    /// Cancels a scheduled timer. Returns false when it already fired or
    /// was already cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// True when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Earliest live deadline, discarding cancelled entries on the way.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        loop {
            let (at, id) = match self.heap.peek() {
                Some(Reverse(key)) => (key.at, key.id),
                None => return None,
            };
            if self.callbacks.contains_key(&id) {
                return Some(at);
            }
            self.heap.pop();
        }
    }

    /// Pops the earliest live entry.
    pub(crate) fn pop_due(&mut self) -> Option<(SimTime, KernelTask)> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(task) = self.callbacks.remove(&key.id) {
                return Some((key.at, task));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use crate::kernel::Kernel;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn noop() -> KernelTask {
        KernelTask::new(|_| {})
    }

    #[test]
    fn pops_in_time_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(SimTime::from_secs(5.0), noop());
        queue.schedule(SimTime::from_secs(1.0), noop());
        queue.schedule(SimTime::from_secs(3.0), noop());
        let order: Vec<f64> = std::iter::from_fn(|| queue.pop_due())
            .map(|(at, _)| at.as_secs())
            .collect();
        assert_eq!(order, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let mut kernel = Kernel::new(&ContextConfig::default()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut queue = TimerQueue::new();
        for tag in 0..3 {
            let seen = seen.clone();
            queue.schedule(
                SimTime::from_secs(2.0),
                KernelTask::new(move |_| seen.borrow_mut().push(tag)),
            );
        }
        while let Some((_, task)) = queue.pop_due() {
            task.run(&mut kernel);
        }
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn cancelled_entries_do_not_fire() {
        let mut queue = TimerQueue::new();
        let keep = queue.schedule(SimTime::from_secs(2.0), noop());
        let doomed = queue.schedule(SimTime::from_secs(1.0), noop());
        assert!(queue.cancel(doomed));
        // Cancelling twice is a no-op.
        assert!(!queue.cancel(doomed));
        assert_eq!(queue.next_deadline(), Some(SimTime::from_secs(2.0)));
        let (at, _) = queue.pop_due().unwrap();
        assert_eq!(at, SimTime::from_secs(2.0));
        assert!(queue.pop_due().is_none());
        assert!(queue.is_empty());
        let _ = keep;
    }
}
