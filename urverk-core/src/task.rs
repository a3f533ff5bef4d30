//! Move-only unit of deferred kernel work.

use std::fmt;

use crate::kernel::Kernel;

/// A boxed nullary action run from the maestro context with full kernel
/// access. Ready-list entries and timer callbacks are `KernelTask`s.
///
/// Deliberately move-only: continuations routinely capture promises and
/// outcome slots that must not be duplicated.
pub struct KernelTask {
    inner: Box<dyn FnOnce(&mut Kernel) + 'static>,
}

impl KernelTask {
    pub fn new(f: impl FnOnce(&mut Kernel) + 'static) -> Self {
        KernelTask { inner: Box::new(f) }
    }

    /// Runs the task, consuming it.
    pub fn run(self, kernel: &mut Kernel) {
        (self.inner)(kernel);
    }
}

impl fmt::Debug for KernelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KernelTask")
    }
}
