//! Named action handlers.

use std::collections::HashMap;
use std::sync::Arc;

use urverk_core::{Cx, SimResult};

use crate::trace::Action;

/// A replay action handler: runs in actor context, may issue any simcall.
pub type ActionHandler = Arc<dyn Fn(&Cx, &Action) -> SimResult<()> + Send + Sync>;

/// Registry mapping action names to handlers. Every action name appearing
/// in a trace must be registered before the run starts.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistry::default()
    }

    /// Registers a handler, replacing any previous one of the same name.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&Cx, &Action) -> SimResult<()> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<ActionHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
