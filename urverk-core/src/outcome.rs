//! One-shot value-or-error holder.
//!
//! Transports the outcome of a kernel-side closure back across the simcall
//! boundary without a full future/promise pair: set exactly once by the
//! kernel, consumed exactly once by the resumed actor.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{SimError, SimResult};

/// Shared one-shot slot. The kernel holds one clone inside the simcall
/// closure, the issuing actor holds the other and reads after resume.
pub struct OutcomeSlot<T> {
    cell: Mutex<Option<SimResult<T>>>,
}

impl<T> OutcomeSlot<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(OutcomeSlot {
            cell: Mutex::new(None),
        })
    }

    /// Stores the outcome. Fails with `AlreadySatisfied` on a second set.
    pub fn set(&self, outcome: SimResult<T>) -> SimResult<()> {
        let mut cell = self.cell.lock();
        if cell.is_some() {
            return Err(SimError::AlreadySatisfied);
        }
        *cell = Some(outcome);
        Ok(())
    }

    /// True once an outcome has been stored and not yet consumed.
    pub fn is_set(&self) -> bool {
        self.cell.lock().is_some()
    }

    /// Consumes the outcome. Fails with `NoState` when the slot is empty.
    pub fn take(&self) -> SimResult<T> {
        match self.cell.lock().take() {
            Some(outcome) => outcome,
            None => Err(SimError::NoState),
        }
    }
}

impl<T> fmt::Debug for OutcomeSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeSlot")
            .field("is_set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_take_roundtrips() {
        let slot = OutcomeSlot::new();
        slot.set(Ok(41)).unwrap();
        assert!(slot.is_set());
        assert_eq!(slot.take().unwrap(), 41);
        assert!(!slot.is_set());
    }

    #[test]
    fn second_set_is_rejected() {
        let slot = OutcomeSlot::new();
        slot.set(Ok(1)).unwrap();
        assert_eq!(slot.set(Ok(2)), Err(SimError::AlreadySatisfied));
    }

    #[test]
    fn take_on_empty_slot_fails() {
        let slot: Arc<OutcomeSlot<u32>> = OutcomeSlot::new();
        assert_eq!(slot.take(), Err(SimError::NoState));
    }

    #[test]
    fn errors_travel_through_the_slot() {
        let slot: Arc<OutcomeSlot<u32>> = OutcomeSlot::new();
        slot.set(Err(SimError::Timeout)).unwrap();
        assert_eq!(slot.take(), Err(SimError::Timeout));
    }
}
