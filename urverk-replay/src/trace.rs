//! Action trace parsing.
//!
//! One action per line, whitespace-separated tokens: the first token is the
//! actor identifier, the second the action name, the rest are
//! action-specific arguments. Blank lines and lines starting with `#` are
//! ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ReplayError;

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub actor: String,
    pub name: String,
    pub args: Vec<String>,
}

/// Reads and parses one trace file.
pub fn load_trace(path: &Path) -> Result<Vec<Action>, ReplayError> {
    let content = fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(&content, path)
}

/// Parses trace text; `origin` is only used in diagnostics.
pub fn parse_trace(content: &str, origin: &Path) -> Result<Vec<Action>, ReplayError> {
    let mut actions = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let actor = tokens.next().expect("non-blank line has tokens");
        let name = tokens.next().ok_or(ReplayError::Malformed {
            path: origin.to_path_buf(),
            line: index + 1,
            reason: "missing action name",
        })?;
        actions.push(Action {
            actor: actor.to_string(),
            name: name.to_string(),
            args: tokens.map(str::to_string).collect(),
        });
    }
    Ok(actions)
}

/// Splits a global trace into per-actor action queues, preserving each
/// actor's line order. The map is ordered so spawn order is stable.
pub fn partition(actions: Vec<Action>) -> BTreeMap<String, Vec<Action>> {
    let mut queues: BTreeMap<String, Vec<Action>> = BTreeMap::new();
    for action in actions {
        queues.entry(action.actor.clone()).or_default().push(action);
    }
    queues
}
