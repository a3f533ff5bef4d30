//! Actor sleep.
//!
//! A sleep is a blocking simcall that schedules a timer event and parks the
//! actor; the event's callback unblocks it. Zero and negative durations are
//! no-ops time-wise but still round-trip through the scheduler.

use tracing::error;

use urverk_core::{Cx, KernelTask, SimDuration, SimResult, SimTime};

/// Parks the calling actor for `duration` of simulated time.
pub fn sleep_for(cx: &Cx, duration: SimDuration) -> SimResult<()> {
    sleep_until(cx, cx.now() + duration.max(SimDuration::ZERO))
}

/// Parks the calling actor until the simulated instant `deadline`.
pub fn sleep_until(cx: &Cx, deadline: SimTime) -> SimResult<()> {
    cx.run_blocking(move |kernel, issuer, slot| {
        if slot.set(Ok(())).is_err() {
            error!(actor = %issuer, "sleep verdict delivered twice");
        }
        kernel.timer_at(
            deadline,
            KernelTask::new(move |kernel| kernel.unblock(issuer)),
        );
    })
}
