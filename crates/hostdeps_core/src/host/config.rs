//! Minimal settings store modeled on a host config service.
//!
//! # Responsibility
//! - Hold a JSON tree addressed by dotted key paths.
//! - Emit `did-change` with `{ key, value }` whenever a stored value changes.
//!
//! # Invariants
//! - Setting a key to `null` removes it.
//! - No event is emitted when a write leaves the value unchanged.

use crate::deps::{ChannelNodeHandle, DepCallback, Dependent, DependentsGraph, DepsError};
use crate::host::emitter::Emitter;
use crate::host::error::HostError;
use crate::model::{ObjectId, Participant};
use log::debug;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Event emitted after a key changes.
pub const DID_CHANGE: &str = "did-change";

pub struct ConfigStore {
    id: ObjectId,
    values: Mutex<Value>,
    emitter: Emitter,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::with_values(Value::Object(Map::new()))
    }

    /// Creates a store seeded with `values`; non-object roots start empty.
    pub fn with_values(values: Value) -> Self {
        let root = if values.is_object() {
            values
        } else {
            Value::Object(Map::new())
        };
        Self {
            id: ObjectId::new(),
            values: Mutex::new(root),
            emitter: Emitter::new(),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        key_lookup(&self.lock(), key).cloned()
    }

    /// Writes `value` at `key` and notifies listeners when it changed.
    pub fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        validate_key(key)?;
        let changed = {
            let mut root = self.lock();
            let before = key_lookup(&root, key).cloned();
            let after = if value.is_null() { None } else { Some(value) };
            if before == after {
                false
            } else {
                key_assign(&mut root, key, after);
                true
            }
        };
        if !changed {
            return Ok(());
        }

        let value = self.get(key).unwrap_or(Value::Null);
        debug!("event=config_set module=host status=ok key={key}");
        self.emitter
            .emit(DID_CHANGE, &json!({ "key": key, "value": value }))
            .map_err(|err| HostError::listener(DID_CHANGE, err))?;
        Ok(())
    }

    pub fn unset(&self, key: &str) -> Result<(), HostError> {
        self.set(key, Value::Null)
    }

    /// Makes `target` depend on changes of `key` (or anything below it).
    ///
    /// Listeners receive `[new, old]`.
    pub fn add_dep<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        key: &str,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        graph.add(self, target, key, callback)
    }

    pub fn remove_dep(&self, graph: &DependentsGraph, key: &str, target: &dyn Participant) {
        graph.remove(self, target, key);
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Participant for ConfigStore {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

fn validate_key(key: &str) -> Result<(), HostError> {
    let valid = !key.is_empty()
        && key.split('.').all(|segment| !segment.is_empty())
        && !key.contains(['(', ')', '*']);
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidKeyPath(key.to_string()))
    }
}

/// Resolves a dotted key path inside `root`.
pub(crate) fn key_lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |node, segment| node.get(segment))
}

/// Writes (`Some`) or removes (`None`) the value at a dotted key path.
///
/// Missing or non-object intermediate nodes are replaced by objects on write.
pub(crate) fn key_assign(root: &mut Value, key: &str, value: Option<Value>) {
    let segments: Vec<&str> = key.split('.').collect();
    match value {
        Some(value) => insert_at(root, &segments, value),
        None => {
            remove_at(root, &segments);
        }
    }
}

fn insert_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*first).to_string()).or_insert(Value::Null);
        insert_at(child, rest, value);
    }
}

fn remove_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        return map.remove(*first).is_some();
    }
    map.get_mut(*first)
        .map_or(false, |child| remove_at(child, rest))
}
