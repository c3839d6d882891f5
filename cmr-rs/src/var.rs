//! Script variable store.
//!
//! One store lives for the duration of a run.  The worker owns it; the host
//! sees periodic snapshots, so the store tracks whether it changed since
//! the last snapshot.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct VarStore {
    vars: BTreeMap<String, Value>,
    dirty: bool,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
        self.dirty = true;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        let existed = self.vars.remove(name).is_some();
        self.dirty |= existed;
        existed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.dirty |= !self.vars.is_empty();
        self.vars.clear();
    }

    /// Merge every entry of a JSON object, overwriting existing names.
    pub fn merge(&mut self, map: Map<String, Value>) {
        for (k, v) in map {
            self.set(k, v);
        }
    }

    /// Selected variables (or all when `names` is empty) as a JSON object.
    /// Unknown names are skipped.
    pub fn to_object(&self, names: &[String]) -> Map<String, Value> {
        if names.is_empty() {
            return self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        names
            .iter()
            .filter_map(|n| self.vars.get(n).map(|v| (n.clone(), v.clone())))
            .collect()
    }

    /// Report and reset the changed-since-last-call flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
