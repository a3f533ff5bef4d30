//! Scheduler counters, read out after (or during) a run.

/// Plain counters kept by the kernel. Exposed so telemetry layers can
/// export them without reaching into kernel state.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimStats {
    /// Scheduling rounds executed.
    pub rounds: u64,
    /// Context resumptions across all rounds.
    pub context_resumes: u64,
    /// Immediate simcalls dispatched.
    pub simcalls_immediate: u64,
    /// Blocking simcalls dispatched.
    pub simcalls_blocking: u64,
    /// Legacy typed simcalls dispatched.
    pub simcalls_legacy: u64,
    /// Timer events fired.
    pub timers_fired: u64,
    /// Actors spawned over the lifetime of the kernel.
    pub actors_spawned: u64,
}

impl SimStats {
    pub fn simcalls_total(&self) -> u64 {
        self.simcalls_immediate + self.simcalls_blocking + self.simcalls_legacy
    }
}
