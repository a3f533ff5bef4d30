//! Built-in replay actions.
//!
//! Cover the whole actor API surface so traces can drive realistic
//! workloads: sleeping, computing, mutex and condvar traffic, awaiting a
//! timer through the kernel future machinery, yielding, logging.
//!
//! Synchronization objects are named in the trace and created lazily on
//! first use, shared by all actors of the run.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use urverk_core::{Cx, SimDuration, SimError, SimResult};
use urverk_sync::{sleep_for, SimCondVar, SimMutex};

use crate::registry::ActionRegistry;
use crate::trace::Action;

/// Named synchronization objects shared by every actor of a replay run.
#[derive(Default)]
struct World {
    mutexes: Mutex<HashMap<String, SimMutex>>,
    condvars: Mutex<HashMap<String, SimCondVar>>,
}

impl World {
    // Lookups never hold the map lock across a simcall: creating the
    // object parks the actor, and another actor may need the map meanwhile.
    fn mutex(&self, cx: &Cx, name: &str) -> SimMutex {
        if let Some(mutex) = self.mutexes.lock().get(name) {
            return *mutex;
        }
        let created = SimMutex::new(cx);
        *self
            .mutexes
            .lock()
            .entry(name.to_string())
            .or_insert(created)
    }

    fn condvar(&self, cx: &Cx, name: &str) -> SimCondVar {
        if let Some(condvar) = self.condvars.lock().get(name) {
            return *condvar;
        }
        let created = SimCondVar::new(cx);
        *self
            .condvars
            .lock()
            .entry(name.to_string())
            .or_insert(created)
    }
}

fn arg<'a>(action: &'a Action, index: usize) -> SimResult<&'a str> {
    action
        .args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| {
            SimError::Fatal(format!(
                "action '{}' is missing argument {index}",
                action.name
            ))
        })
}

fn seconds(action: &Action, index: usize) -> SimResult<f64> {
    let raw = arg(action, index)?;
    raw.parse().map_err(|_| {
        SimError::Fatal(format!(
            "action '{}': '{raw}' is not a number of seconds",
            action.name
        ))
    })
}

/// Registers the built-in action set.
pub fn register_builtins(registry: &mut ActionRegistry) {
    let world = Arc::new(World::default());

    registry.register("sleep", |cx, action| {
        sleep_for(cx, SimDuration::from_secs(seconds(action, 0)?))
    });

    // Models a computation of the given duration; distinct name so traces
    // read naturally.
    registry.register("compute", |cx, action| {
        sleep_for(cx, SimDuration::from_secs(seconds(action, 0)?))
    });

    registry.register("await", |cx, action| {
        let deadline = cx.now() + SimDuration::from_secs(seconds(action, 0)?);
        cx.kernel_sync(move |kernel| Ok(kernel.timer_future(deadline)))
    });

    registry.register("yield", |cx, _| {
        cx.yield_now();
        Ok(())
    });

    registry.register("log", |cx, action| {
        info!(actor = cx.name(), time = %cx.now(), "{}", action.args.join(" "));
        Ok(())
    });

    let w = world.clone();
    registry.register("lock", move |cx, action| {
        w.mutex(cx, arg(action, 0)?).lock(cx)
    });

    let w = world.clone();
    registry.register("unlock", move |cx, action| {
        w.mutex(cx, arg(action, 0)?).unlock(cx)
    });

    let w = world.clone();
    registry.register("try_lock", move |cx, action| {
        let acquired = w.mutex(cx, arg(action, 0)?).try_lock(cx)?;
        info!(actor = cx.name(), acquired, "try_lock");
        Ok(())
    });

    let w = world.clone();
    registry.register("wait", move |cx, action| {
        let condvar = w.condvar(cx, arg(action, 0)?);
        let mutex = w.mutex(cx, arg(action, 1)?);
        condvar.wait(cx, &mutex)
    });

    let w = world.clone();
    registry.register("wait_for", move |cx, action| {
        let condvar = w.condvar(cx, arg(action, 0)?);
        let mutex = w.mutex(cx, arg(action, 1)?);
        let timeout = SimDuration::from_secs(seconds(action, 2)?);
        let verdict = condvar.wait_for(cx, &mutex, timeout)?;
        info!(actor = cx.name(), ?verdict, "wait_for");
        Ok(())
    });

    let w = world.clone();
    registry.register("notify_one", move |cx, action| {
        w.condvar(cx, arg(action, 0)?).notify_one(cx).map(|_| ())
    });

    let w = world;
    registry.register("notify_all", move |cx, action| {
        w.condvar(cx, arg(action, 0)?).notify_all(cx).map(|_| ())
    });
}

/// A registry pre-populated with the built-in actions.
pub fn builtin_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    register_builtins(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_the_trace_vocabulary() {
        let registry = builtin_registry();
        for name in [
            "sleep",
            "compute",
            "await",
            "yield",
            "log",
            "lock",
            "unlock",
            "try_lock",
            "wait",
            "wait_for",
            "notify_one",
            "notify_all",
        ] {
            assert!(registry.contains(name), "missing builtin '{name}'");
        }
    }

    #[test]
    fn numeric_argument_errors_name_the_action() {
        let action = Action {
            actor: "a".into(),
            name: "sleep".into(),
            args: vec!["soon".into()],
        };
        let err = seconds(&action, 0).unwrap_err();
        assert!(matches!(err, SimError::Fatal(_)));
    }
}
