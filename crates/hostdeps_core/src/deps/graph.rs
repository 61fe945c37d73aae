//! Dependents graph: the registry of `(source, channel) -> dependents`.
//!
//! # Responsibility
//! - Find-or-create channel nodes and record dependent entries.
//! - Fire a channel to its dependents in registration order.
//! - Tear down every relationship touching a destroyed participant.
//!
//! # Invariants
//! - A channel node exists iff it has at least one dependent entry.
//! - An identical `(source, channel, target, callback)` is stored once.
//! - The state lock is never held while callbacks or disposal actions run.
//! - Redundant removals are no-ops.

use crate::channel::{Channel, ANY_CHANNEL};
use crate::deps::dependent::{CallbackResult, DepCallback, DepEvent, Dependent};
use crate::deps::error::DepsError;
use crate::deps::node::{
    ChannelNode, ChannelNodeHandle, ChannelNodeVariant, DefaultChannelNode, NodeWiring,
};
use crate::model::{ObjectId, Participant, SourceObject};
use crate::variants::{ConfigChannelNode, PackageChannelNode, WorkspaceChannelNode};
use log::{debug, trace};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

type NodeKey = (ObjectId, String);

static DEPS: Lazy<DependentsGraph> = Lazy::new(DependentsGraph::with_builtin_variants);

/// Process-wide graph, pre-loaded with the built-in variants.
///
/// Prefer passing an explicit [`DependentsGraph`] to consumers; this
/// instance exists for code that has no other way to reach one.
pub fn deps() -> &'static DependentsGraph {
    &DEPS
}

#[derive(Clone)]
struct DependentEntry {
    target_id: ObjectId,
    target: Weak<dyn Dependent>,
    callback: Option<DepCallback>,
}

impl DependentEntry {
    fn is(&self, target_id: ObjectId, callback: &Option<DepCallback>) -> bool {
        self.target_id == target_id && self.callback == *callback
    }
}

struct NodeSlot {
    node: Arc<ChannelNode>,
    dependents: Vec<DependentEntry>,
}

#[derive(Default)]
struct GraphState {
    nodes: BTreeMap<NodeKey, NodeSlot>,
    /// Reverse index: target -> keys it has entries under.
    targets: BTreeMap<ObjectId, BTreeSet<NodeKey>>,
}

impl GraphState {
    fn unlink_target(&mut self, target_id: ObjectId, key: &NodeKey) {
        if let Some(keys) = self.targets.get_mut(&target_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.targets.remove(&target_id);
            }
        }
    }
}

struct GraphShared {
    state: Mutex<GraphState>,
    variants: RwLock<Vec<Arc<dyn ChannelNodeVariant>>>,
}

/// Non-owning handle to a graph, held by host listeners.
#[derive(Debug, Clone)]
pub struct WeakGraph(Weak<GraphShared>);

impl WeakGraph {
    pub fn upgrade(&self) -> Option<DependentsGraph> {
        self.0.upgrade().map(|shared| DependentsGraph { shared })
    }
}

impl std::fmt::Debug for GraphShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GraphShared")
    }
}

enum Delivery {
    Notified,
    Skipped,
    TargetDropped,
}

/// Registry of dependency relationships. Clones share the same graph.
#[derive(Clone)]
pub struct DependentsGraph {
    shared: Arc<GraphShared>,
}

impl Default for DependentsGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependentsGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentsGraph")
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl DependentsGraph {
    /// Creates an empty graph that only knows the default (manual) variant.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(GraphShared {
                state: Mutex::new(GraphState::default()),
                variants: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Creates a graph with the config, workspace and package variants.
    pub fn with_builtin_variants() -> Self {
        let graph = Self::new();
        graph.register_variant(ConfigChannelNode);
        graph.register_variant(WorkspaceChannelNode);
        graph.register_variant(PackageChannelNode);
        graph
    }

    pub fn downgrade(&self) -> WeakGraph {
        WeakGraph(Arc::downgrade(&self.shared))
    }

    /// Registers a variant; it is consulted after previously registered ones.
    pub fn register_variant(&self, variant: impl ChannelNodeVariant + 'static) {
        let name = variant.name();
        self.shared
            .variants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(variant));
        debug!("event=variant_registered module=deps status=ok variant={name}");
    }

    /// Records that `target` depends on `channel` of `source`.
    ///
    /// Creates and wires the channel node on first use; the returned handle
    /// reports `is_new()` only for that call. Re-adding an identical
    /// relationship stores nothing new.
    ///
    /// # Errors
    /// - `MalformedChannel` when the channel string does not parse or the
    ///   matched variant rejects it. No node is left behind.
    pub fn add<T: Dependent>(
        &self,
        source: &dyn SourceObject,
        target: &Arc<T>,
        channel: &str,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let weak: Weak<dyn Dependent> = Arc::downgrade(target) as Weak<dyn Dependent>;
        self.add_entry(source, target.object_id(), weak, channel, callback)
    }

    /// Same as [`DependentsGraph::add`] for an already type-erased target.
    pub fn add_dyn(
        &self,
        source: &dyn SourceObject,
        target: &Arc<dyn Dependent>,
        channel: &str,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        self.add_entry(
            source,
            target.object_id(),
            Arc::downgrade(target),
            channel,
            callback,
        )
    }

    fn add_entry(
        &self,
        source: &dyn SourceObject,
        target_id: ObjectId,
        target: Weak<dyn Dependent>,
        channel: &str,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let parsed = Channel::parse(channel)?;
        let source_id = source.object_id();
        let key: NodeKey = (source_id, parsed.as_str().to_string());

        let mut state = self.lock_state();
        let gone = state
            .nodes
            .get_mut(&key)
            .map(|slot| retain_live(&mut slot.dependents))
            .unwrap_or_default();
        for target_id in &gone {
            state.unlink_target(*target_id, &key);
        }
        if !gone.is_empty() {
            debug!(
                "event=dep_prune module=deps status=ok source={source_id} channel={} pruned={}",
                key.1,
                gone.len()
            );
        }

        let (slot, created) = match state.nodes.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let node = self.build_node(source, parsed)?;
                let slot = entry.insert(NodeSlot {
                    node,
                    dependents: Vec::new(),
                });
                (slot, true)
            }
        };

        let node = Arc::clone(&slot.node);
        if slot
            .dependents
            .iter()
            .any(|entry| entry.is(target_id, &callback))
        {
            trace!(
                "event=dep_add module=deps status=duplicate source={source_id} channel={}",
                key.1
            );
            return Ok(ChannelNodeHandle::new(node, false));
        }

        slot.dependents.push(DependentEntry {
            target_id,
            target,
            callback,
        });
        let count = slot.dependents.len();
        state.targets.entry(target_id).or_default().insert(key.clone());
        debug!(
            "event=dep_add module=deps status=ok source={source_id} channel={} target={target_id} dependents={count} new_node={created}",
            key.1
        );
        Ok(ChannelNodeHandle::new(node, created))
    }

    fn build_node(
        &self,
        source: &dyn SourceObject,
        channel: Channel,
    ) -> Result<Arc<ChannelNode>, DepsError> {
        let variant: Arc<dyn ChannelNodeVariant> = self
            .shared
            .variants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|variant| variant.match_source(source, &channel))
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultChannelNode) as Arc<dyn ChannelNodeVariant>);

        let node = Arc::new(ChannelNode::new(
            source.object_id(),
            channel,
            variant.name(),
        ));
        let wiring = NodeWiring::new(source, &node, self.downgrade());
        if let Err(err) = variant.wire(&wiring) {
            node.disposables().dispose();
            debug!(
                "event=node_wire module=deps status=error variant={} channel={} error={err}",
                variant.name(),
                node.channel()
            );
            return Err(DepsError::MalformedChannel(err));
        }
        Ok(node)
    }

    /// Removes every entry of `target` on `channel` of `source`.
    ///
    /// Disposes the node's wiring when its last dependent leaves. Removing
    /// a relationship that does not exist is a no-op.
    pub fn remove(&self, source: &dyn Participant, target: &dyn Participant, channel: &str) {
        let key: NodeKey = (source.object_id(), channel.to_string());
        let target_id = target.object_id();

        let emptied = {
            let mut state = self.lock_state();
            let Some(slot) = state.nodes.get_mut(&key) else {
                debug!(
                    "event=dep_remove module=deps status=noop source={} channel={channel}",
                    key.0
                );
                return;
            };
            let before = slot.dependents.len();
            slot.dependents.retain(|entry| entry.target_id != target_id);
            let removed = before - slot.dependents.len();
            let empty = slot.dependents.is_empty();
            state.unlink_target(target_id, &key);
            debug!(
                "event=dep_remove module=deps status=ok source={} channel={channel} target={target_id} removed={removed}",
                key.0
            );
            if empty {
                state.nodes.remove(&key).map(|slot| slot.node)
            } else {
                None
            }
        };

        if let Some(node) = emptied {
            release_node(&node);
        }
    }

    /// Notifies every dependent of `channel` on `source`, then every
    /// wildcard dependent of `source`.
    ///
    /// Returns the number of dependents that handled the event. The set of
    /// dependents is captured before the first notification, so callbacks
    /// may add or remove relationships freely.
    ///
    /// # Errors
    /// - `Callback` with the first failure; remaining dependents of this
    ///   pass are not notified.
    pub fn fire(
        &self,
        source: &dyn Participant,
        channel: &str,
        args: &[Value],
    ) -> Result<usize, DepsError> {
        self.fire_by_id(source.object_id(), channel, args)
    }

    /// [`DependentsGraph::fire`] addressed by source id.
    pub fn fire_by_id(
        &self,
        source: ObjectId,
        channel: &str,
        args: &[Value],
    ) -> Result<usize, DepsError> {
        let passes = self.snapshot(source, channel);
        if passes.is_empty() {
            trace!("event=dep_fire module=deps status=idle source={source} channel={channel}");
            return Ok(0);
        }

        let event = DepEvent {
            source,
            channel,
            args,
        };
        let mut notified = 0usize;
        let mut dropped: Vec<NodeKey> = Vec::new();
        for (key, method, entries) in &passes {
            for entry in entries {
                match deliver(entry, method.as_deref(), &event) {
                    Ok(Delivery::Notified) => notified += 1,
                    Ok(Delivery::Skipped) => {}
                    Ok(Delivery::TargetDropped) => {
                        if !dropped.contains(key) {
                            dropped.push(key.clone());
                        }
                    }
                    Err(error) => {
                        self.prune_dropped(&dropped);
                        return Err(DepsError::Callback {
                            source_id: source,
                            channel: channel.to_string(),
                            error,
                        });
                    }
                }
            }
        }
        self.prune_dropped(&dropped);
        trace!(
            "event=dep_fire module=deps status=ok source={source} channel={channel} notified={notified}"
        );
        Ok(notified)
    }

    fn snapshot(
        &self,
        source: ObjectId,
        channel: &str,
    ) -> Vec<(NodeKey, Option<String>, Vec<DependentEntry>)> {
        let state = self.lock_state();
        let mut keys = vec![(source, channel.to_string())];
        if channel != ANY_CHANNEL {
            keys.push((source, ANY_CHANNEL.to_string()));
        }
        keys.into_iter()
            .filter_map(|key| {
                let slot = state.nodes.get(&key)?;
                let method = slot.node.default_target_method();
                let entries = slot.dependents.clone();
                Some((key, method, entries))
            })
            .collect()
    }

    fn prune_dropped(&self, keys: &[NodeKey]) {
        if keys.is_empty() {
            return;
        }
        let mut emptied = Vec::new();
        {
            let mut state = self.lock_state();
            for key in keys {
                let Some(slot) = state.nodes.get_mut(key) else {
                    continue;
                };
                let gone = retain_live(&mut slot.dependents);
                let empty = slot.dependents.is_empty();
                for target_id in &gone {
                    state.unlink_target(*target_id, key);
                }
                if !gone.is_empty() {
                    debug!(
                        "event=dep_prune module=deps status=ok source={} channel={} pruned={}",
                        key.0,
                        key.1,
                        gone.len()
                    );
                }
                if empty {
                    if let Some(slot) = state.nodes.remove(key) {
                        emptied.push(slot.node);
                    }
                }
            }
        }
        for node in emptied {
            release_node(&node);
        }
    }

    /// Removes every relationship touching `obj`.
    ///
    /// As a target, its entries leave every node (other targets are kept).
    /// As a source, all its nodes and their dependents are dropped and each
    /// node's wiring is disposed. A second call finds nothing to do.
    pub fn object_destroyed(&self, obj: &dyn Participant) {
        let id = obj.object_id();
        let mut released = Vec::new();
        let mut as_target = 0usize;
        {
            let mut state = self.lock_state();

            if let Some(keys) = state.targets.remove(&id) {
                for key in keys {
                    let Some(slot) = state.nodes.get_mut(&key) else {
                        continue;
                    };
                    slot.dependents.retain(|entry| entry.target_id != id);
                    as_target += 1;
                    if slot.dependents.is_empty() {
                        if let Some(slot) = state.nodes.remove(&key) {
                            released.push(slot.node);
                        }
                    }
                }
            }

            let source_keys: Vec<NodeKey> = state
                .nodes
                .range((id, String::new())..)
                .take_while(|(key, _)| key.0 == id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in source_keys {
                if let Some(slot) = state.nodes.remove(&key) {
                    for entry in &slot.dependents {
                        state.unlink_target(entry.target_id, &key);
                    }
                    released.push(slot.node);
                }
            }
        }

        if as_target == 0 && released.is_empty() {
            debug!("event=object_destroyed module=deps status=noop object={id}");
            return;
        }
        debug!(
            "event=object_destroyed module=deps status=ok object={id} target_links={as_target} nodes_released={}",
            released.len()
        );
        for node in released {
            release_node(&node);
        }
    }

    /// Looks up the live node for `(source, channel)`.
    pub fn node(&self, source: &dyn Participant, channel: &str) -> Option<Arc<ChannelNode>> {
        let state = self.lock_state();
        state
            .nodes
            .get(&(source.object_id(), channel.to_string()))
            .map(|slot| Arc::clone(&slot.node))
    }

    /// Number of dependent entries on `(source, channel)`.
    pub fn dependent_count(&self, source: &dyn Participant, channel: &str) -> usize {
        let state = self.lock_state();
        state
            .nodes
            .get(&(source.object_id(), channel.to_string()))
            .map_or(0, |slot| slot.dependents.len())
    }

    pub fn node_count(&self) -> usize {
        self.lock_state().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().nodes.is_empty()
    }

    fn lock_state(&self) -> MutexGuard<'_, GraphState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops entries whose target is gone; returns their target ids.
fn retain_live(dependents: &mut Vec<DependentEntry>) -> Vec<ObjectId> {
    let mut gone = Vec::new();
    dependents.retain(|entry| {
        let alive = entry.target.strong_count() > 0;
        if !alive {
            gone.push(entry.target_id);
        }
        alive
    });
    gone
}

fn release_node(node: &ChannelNode) {
    node.disposables().dispose();
    debug!(
        "event=node_released module=deps status=ok source={} channel={} variant={}",
        node.source(),
        node.channel(),
        node.variant_name()
    );
}

fn deliver(
    entry: &DependentEntry,
    method: Option<&str>,
    event: &DepEvent<'_>,
) -> Result<Delivery, crate::deps::error::CallbackError> {
    let Some(target) = entry.target.upgrade() else {
        return Ok(Delivery::TargetDropped);
    };
    if let Some(callback) = &entry.callback {
        callback.call(event)?;
        return Ok(Delivery::Notified);
    }
    if let Some(method) = method {
        if let Some(result) = target.on_named_event(method, event) {
            return handled(result);
        }
    }
    match target.on_dep_changed(event) {
        Some(result) => handled(result),
        None => Ok(Delivery::Skipped),
    }
}

fn handled(result: CallbackResult) -> Result<Delivery, crate::deps::error::CallbackError> {
    result.map(|()| Delivery::Notified)
}

#[cfg(test)]
mod tests {
    use super::DependentsGraph;
    use crate::deps::dependent::{CallbackResult, DepCallback, DepEvent, Dependent};
    use crate::deps::error::{CallbackError, DepsError};
    use crate::model::{ObjectId, Participant};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// Target recording what reached it and through which route.
    struct Recorder {
        id: ObjectId,
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        handles_named: bool,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: ObjectId::new(),
                label,
                log: Arc::clone(log),
                handles_named: true,
            })
        }

        fn generic_only(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: ObjectId::new(),
                label,
                log: Arc::clone(log),
                handles_named: false,
            })
        }

        fn push(&self, line: String) {
            self.log.lock().expect("log lock").push(line);
        }
    }

    impl Participant for Recorder {
        fn object_id(&self) -> ObjectId {
            self.id
        }
    }

    impl Dependent for Recorder {
        fn on_named_event(&self, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
            if !self.handles_named {
                return None;
            }
            self.push(format!("{}:{method}:{}", self.label, event.channel));
            Some(Ok(()))
        }

        fn on_dep_changed(&self, event: &DepEvent<'_>) -> Option<CallbackResult> {
            self.push(format!("{}:changed:{}", self.label, event.channel));
            Some(Ok(()))
        }
    }

    fn lines(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("log lock").clone()
    }

    fn recording_callback(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> DepCallback {
        let log = Arc::clone(log);
        DepCallback::new(move |event| {
            let args: Vec<String> = event.args.iter().map(Value::to_string).collect();
            log.lock()
                .expect("log lock")
                .push(format!("{label}({})", args.join(",")));
            Ok(())
        })
    }

    #[test]
    fn creates_node_once_and_reports_is_new_only_first() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);

        let first = graph.add(&source, &a, "changed", None).expect("add a");
        let second = graph.add(&source, &b, "changed", None).expect("add b");
        assert!(first.is_new());
        assert!(!second.is_new());
        assert!(Arc::ptr_eq(first.node(), second.node()));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(first.variant_name(), "default");
    }

    #[test]
    fn duplicate_relationship_is_stored_once() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let target = Recorder::new("t", &log);
        let callback = recording_callback(&log, "cb");

        graph
            .add(&source, &target, "changed", Some(callback.clone()))
            .expect("first add");
        graph
            .add(&source, &target, "changed", Some(callback))
            .expect("second add");
        assert_eq!(graph.dependent_count(&source, "changed"), 1);

        let notified = graph
            .fire(&source, "changed", &[json!(1)])
            .expect("fire");
        assert_eq!(notified, 1);
        assert_eq!(lines(&log), vec!["cb(1)"]);
    }

    #[test]
    fn distinct_callbacks_for_same_target_are_distinct_entries() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let target = Recorder::new("t", &log);

        graph
            .add(&source, &target, "changed", Some(recording_callback(&log, "one")))
            .expect("add one");
        graph
            .add(&source, &target, "changed", Some(recording_callback(&log, "two")))
            .expect("add two");
        graph.fire(&source, "changed", &[]).expect("fire");
        assert_eq!(lines(&log), vec!["one()", "two()"]);
    }

    #[test]
    fn dispatch_prefers_callback_then_named_method_then_generic() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let with_callback = Recorder::new("cb", &log);
        let named = Recorder::new("named", &log);
        let generic = Recorder::generic_only("generic", &log);
        let silent: Arc<ObjectId> = Arc::new(ObjectId::new());

        let node = graph
            .add(&source, &with_callback, "changed", Some(recording_callback(&log, "explicit")))
            .expect("add callback");
        node.set_default_target_method("on_thing_changed");
        graph.add(&source, &named, "changed", None).expect("add named");
        graph.add(&source, &generic, "changed", None).expect("add generic");
        graph.add(&source, &silent, "changed", None).expect("add silent");

        let notified = graph.fire(&source, "changed", &[]).expect("fire");
        assert_eq!(notified, 3);
        assert_eq!(
            lines(&log),
            vec![
                "explicit()",
                "named:on_thing_changed:changed",
                "generic:changed:changed",
            ]
        );
    }

    #[test]
    fn named_route_is_skipped_without_default_method() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let target = Recorder::new("t", &log);
        graph.add(&source, &target, "custom", None).expect("add");

        graph.fire(&source, "custom", &[]).expect("fire");
        assert_eq!(lines(&log), vec!["t:changed:custom"]);
    }

    #[test]
    fn remove_last_dependent_collects_node_and_disposes_wiring() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);

        let node = graph.add(&source, &a, "changed", None).expect("add a");
        let wiring_log = Arc::clone(&log);
        node.disposables().add(move || {
            wiring_log.lock().expect("log lock").push("wiring disposed".to_string());
        });
        graph.add(&source, &b, "changed", None).expect("add b");

        graph.remove(&source, a.as_ref(), "changed");
        assert!(graph.node(&source, "changed").is_some());
        assert!(lines(&log).is_empty());

        graph.remove(&source, b.as_ref(), "changed");
        assert!(graph.node(&source, "changed").is_none());
        assert_eq!(lines(&log), vec!["wiring disposed"]);

        graph.remove(&source, b.as_ref(), "changed");
        assert_eq!(lines(&log), vec!["wiring disposed"]);
    }

    #[test]
    fn callback_error_stops_the_pass_and_propagates() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let first = Recorder::new("first", &log);
        let failing = Recorder::new("failing", &log);
        let last = Recorder::new("last", &log);

        graph
            .add(&source, &first, "changed", Some(recording_callback(&log, "first")))
            .expect("add first");
        graph
            .add(
                &source,
                &failing,
                "changed",
                Some(DepCallback::new(|_| Err(CallbackError::new("boom")))),
            )
            .expect("add failing");
        graph
            .add(&source, &last, "changed", Some(recording_callback(&log, "last")))
            .expect("add last");

        let err = graph
            .fire(&source, "changed", &[])
            .expect_err("failing callback must propagate");
        assert!(matches!(err, DepsError::Callback { .. }));
        assert_eq!(lines(&log), vec!["first()"]);
    }

    #[test]
    fn dropped_targets_are_skipped_and_pruned() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let keep = Recorder::new("keep", &log);
        let dropped = Recorder::new("dropped", &log);

        graph
            .add(&source, &keep, "changed", Some(recording_callback(&log, "keep")))
            .expect("add keep");
        graph
            .add(&source, &dropped, "changed", Some(recording_callback(&log, "dropped")))
            .expect("add dropped");
        drop(dropped);

        assert_eq!(graph.fire(&source, "changed", &[]).expect("fire"), 1);
        assert_eq!(lines(&log), vec!["keep()"]);
        assert_eq!(graph.dependent_count(&source, "changed"), 1);
    }

    #[test]
    fn adding_to_a_node_prunes_its_dropped_targets() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let dropped = Recorder::new("dropped", &log);
        let dropped_id = dropped.object_id();
        graph
            .add(&source, &dropped, "quiet", None)
            .expect("add dropped");
        drop(dropped);
        assert!(graph.lock_state().targets.contains_key(&dropped_id));

        let late = Recorder::new("late", &log);
        let handle = graph.add(&source, &late, "quiet", None).expect("add late");

        assert!(!handle.is_new());
        assert_eq!(graph.dependent_count(&source, "quiet"), 1);
        assert!(!graph.lock_state().targets.contains_key(&dropped_id));
        assert!(graph.lock_state().targets.contains_key(&late.object_id()));
        assert!(lines(&log).is_empty());
    }

    #[test]
    fn wildcard_dependents_hear_every_channel_after_specific_ones() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let specific = Recorder::new("specific", &log);
        let any = Recorder::new("any", &log);

        graph
            .add(&source, &any, "*", Some(recording_callback(&log, "any")))
            .expect("add wildcard");
        graph
            .add(&source, &specific, "a", Some(recording_callback(&log, "specific")))
            .expect("add specific");

        assert_eq!(graph.fire(&source, "a", &[json!("x")]).expect("fire a"), 2);
        assert_eq!(graph.fire(&source, "b", &[]).expect("fire b"), 1);
        assert_eq!(lines(&log), vec!["specific(\"x\")", "any(\"x\")", "any()"]);
    }

    #[test]
    fn malformed_channel_is_rejected_without_leaving_a_node() {
        let graph = DependentsGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = ObjectId::new();
        let target = Recorder::new("t", &log);

        let err = graph
            .add(&source, &target, "item(/unterminated", None)
            .expect_err("malformed channel must fail");
        assert!(matches!(err, DepsError::MalformedChannel(_)));
        assert!(graph.is_empty());
    }
}
