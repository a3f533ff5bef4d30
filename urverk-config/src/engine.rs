//! Engine configuration: context factory variant and sizing.

use serde::{Deserialize, Serialize};
use validator::Validate;

use urverk_core::{ContextConfig, ContextMode};

use crate::validation;

/// Which context factory the kernel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One actor at a time on the kernel thread.
    #[default]
    Serial,
    /// A fixed worker pool resumes independent actors in parallel.
    /// Actor-visible semantics are identical to serial.
    Parallel,
}

/// Kernel/scheduler parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Context factory variant.
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Worker threads of the parallel variant.
    #[validate(custom(function = validation::validate_workers))]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Stack size of each actor context, in KiB.
    #[validate(custom(function = validation::validate_stack_kib))]
    #[serde(default = "default_stack_kib")]
    pub stack_kib: usize,
}

fn default_workers() -> usize {
    4
}

fn default_stack_kib() -> usize {
    512
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: ExecutionMode::Serial,
            workers: default_workers(),
            stack_kib: default_stack_kib(),
        }
    }
}

impl EngineConfig {
    /// Maps the file-level settings onto the kernel's context config.
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            mode: match self.mode {
                ExecutionMode::Serial => ContextMode::Serial,
                ExecutionMode::Parallel => ContextMode::Parallel,
            },
            workers: self.workers,
            stack_size: self.stack_kib * 1024,
        }
    }
}
