//! ## urverk-core::time
//! **Simulated clock and time arithmetic**
//!
//! Simulated time is measured in floating-point seconds since simulation
//! start. The clock is monotone: it only moves forward, only between event
//! firings, and never while an actor is executing. Actors read it lock-free
//! through a shared atomic cell; the kernel is the sole writer.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicU64, Ordering as MemOrdering};
use std::sync::Arc;

/// A point on the simulated timeline, in seconds since simulation start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimTime(f64);

/// A span of simulated time, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimDuration(f64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Builds a time point from seconds. The value must be finite.
    pub fn from_secs(secs: f64) -> Self {
        debug_assert!(secs.is_finite(), "non-finite simulated time");
        SimTime(secs)
    }

    /// Seconds since simulation start.
    pub fn as_secs(self) -> f64 {
        self.0
    }
}

impl SimDuration {
    /// The empty span.
    pub const ZERO: SimDuration = SimDuration(0.0);

    /// Builds a duration from seconds. The value must be finite.
    pub fn from_secs(secs: f64) -> Self {
        debug_assert!(secs.is_finite(), "non-finite simulated duration");
        SimDuration(secs)
    }

    /// Duration in seconds. May be negative.
    pub fn as_secs(self) -> f64 {
        self.0
    }
}

// f64 comparison via total_cmp so the newtypes carry a total order usable in
// the timer heap. Constructors reject non-finite values, and -0.0 ordering
// below +0.0 is irrelevant on a timeline.
macro_rules! total_order {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0.total_cmp(&other.0) == Ordering::Equal
            }
        }
        impl Eq for $ty {}
        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }
    };
}

total_order!(SimTime);
total_order!(SimDuration);

impl Add<SimDuration> for SimTime {
    type Output = SimTime;
    fn add(self, rhs: SimDuration) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, rhs: SimDuration) {
        self.0 += rhs.0;
    }
}

impl Sub<SimDuration> for SimTime {
    type Output = SimTime;
    fn sub(self, rhs: SimDuration) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl Sub for SimTime {
    type Output = SimDuration;
    fn sub(self, rhs: SimTime) -> SimDuration {
        SimDuration(self.0 - rhs.0)
    }
}

impl Add for SimDuration {
    type Output = SimDuration;
    fn add(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0 + rhs.0)
    }
}

impl Sub for SimDuration {
    type Output = SimDuration;
    fn sub(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The simulated clock.
///
/// Cloning yields another handle onto the same cell, the same sharing scheme
/// as a seeded virtual clock: readers may sit on any thread, the kernel is
/// the only writer and only writes while every actor context is parked.
#[derive(Debug, Clone)]
pub struct SimClock {
    bits: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        SimClock {
            bits: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }

    /// Current simulated instant.
    #[inline]
    pub fn now(&self) -> SimTime {
        SimTime(f64::from_bits(self.bits.load(MemOrdering::Acquire)))
    }

    /// Moves the clock forward. Never moves it backward.
    pub(crate) fn advance_to(&self, to: SimTime) {
        let now = self.now();
        debug_assert!(to >= now, "clock moved backwards: {now} -> {to}");
        if to > now {
            self.bits.store(to.0.to_bits(), MemOrdering::Release);
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
