//! Minimal workspace model: panes holding items, with activation tracking.
//!
//! # Responsibility
//! - Track panes, the items they hold, and which pane/item/editor is active.
//! - Emit host events for open, destroy and activation changes.
//! - Offer `add_dep_*` helpers composing workspace channels.
//!
//! # Invariants
//! - A workspace always has at least one pane, and exactly one is active.
//! - Item URIs are unique across panes; opening an open URI activates it.
//! - Events are emitted after the state lock is released.

use crate::channel::{Channel, ItemSpec};
use crate::deps::{ChannelNodeHandle, DepCallback, Dependent, DependentsGraph, DepsError};
use crate::host::emitter::Emitter;
use crate::host::error::HostError;
use crate::model::{ObjectId, Participant};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DID_OPEN: &str = "did-open";
pub const DID_ADD_TEXT_EDITOR: &str = "did-add-text-editor";
pub const DID_DESTROY_PANE_ITEM: &str = "did-destroy-pane-item";
pub const DID_CHANGE_ACTIVE_PANE_ITEM: &str = "did-change-active-pane-item";
pub const DID_CHANGE_ACTIVE_TEXT_EDITOR: &str = "did-change-active-text-editor";
pub const DID_ADD_PANE: &str = "did-add-pane";
pub const DID_DESTROY_PANE: &str = "did-destroy-pane";
pub const DID_CHANGE_ACTIVE_PANE: &str = "did-change-active-pane";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Panel,
    TextEditor,
}

/// One item shown in a pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceItem {
    pub id: ObjectId,
    pub uri: String,
    pub kind: ItemKind,
}

impl WorkspaceItem {
    pub fn panel(uri: impl Into<String>) -> Self {
        Self::with_id(ObjectId::new(), uri, ItemKind::Panel)
    }

    pub fn text_editor(uri: impl Into<String>) -> Self {
        Self::with_id(ObjectId::new(), uri, ItemKind::TextEditor)
    }

    /// Item whose identity is owned elsewhere (e.g. a view).
    pub fn with_id(id: ObjectId, uri: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            uri: uri.into(),
            kind,
        }
    }

    pub fn is_text_editor(&self) -> bool {
        self.kind == ItemKind::TextEditor
    }

    /// Event payload form of this item.
    pub fn to_value(&self) -> Value {
        json!({ "id": self.id, "uri": self.uri, "kind": self.kind })
    }
}

/// Payload form of a pane reference.
pub fn pane_value(pane: ObjectId) -> Value {
    json!({ "id": pane })
}

fn optional_item_value(item: Option<&WorkspaceItem>) -> Value {
    item.map_or(Value::Null, WorkspaceItem::to_value)
}

struct PaneState {
    id: ObjectId,
    items: Vec<WorkspaceItem>,
    active: Option<usize>,
}

impl PaneState {
    fn new() -> Self {
        Self {
            id: ObjectId::new(),
            items: Vec::new(),
            active: None,
        }
    }

    fn active_item(&self) -> Option<&WorkspaceItem> {
        self.active.and_then(|index| self.items.get(index))
    }
}

struct WorkspaceState {
    panes: Vec<PaneState>,
    active_pane: ObjectId,
    active_item: Option<WorkspaceItem>,
    active_text_editor: Option<WorkspaceItem>,
}

type PendingEvents = Vec<(&'static str, Value)>;

impl WorkspaceState {
    fn pane_index(&self, pane: ObjectId) -> Result<usize, HostError> {
        self.panes
            .iter()
            .position(|state| state.id == pane)
            .ok_or(HostError::UnknownPane(pane))
    }

    fn locate(&self, uri: &str) -> Option<(usize, usize)> {
        self.panes.iter().enumerate().find_map(|(pane_index, pane)| {
            pane.items
                .iter()
                .position(|item| item.uri == uri)
                .map(|item_index| (pane_index, item_index))
        })
    }

    fn set_active_pane(&mut self, pane_index: usize, events: &mut PendingEvents) {
        let pane = self.panes[pane_index].id;
        if pane != self.active_pane {
            self.active_pane = pane;
            events.push((DID_CHANGE_ACTIVE_PANE, json!({ "pane": pane_value(pane) })));
        }
    }

    /// Re-derives the active item/editor from the active pane.
    fn sync_active_item(&mut self, events: &mut PendingEvents) {
        let next = self
            .panes
            .iter()
            .find(|pane| pane.id == self.active_pane)
            .and_then(PaneState::active_item)
            .cloned();
        let current_id = self.active_item.as_ref().map(|item| item.id);
        if next.as_ref().map(|item| item.id) == current_id {
            return;
        }
        events.push((DID_CHANGE_ACTIVE_PANE_ITEM, optional_item_value(next.as_ref())));

        let next_editor = next.clone().filter(WorkspaceItem::is_text_editor);
        let editor_id = self.active_text_editor.as_ref().map(|item| item.id);
        if next_editor.as_ref().map(|item| item.id) != editor_id {
            events.push((
                DID_CHANGE_ACTIVE_TEXT_EDITOR,
                optional_item_value(next_editor.as_ref()),
            ));
            self.active_text_editor = next_editor;
        }
        self.active_item = next;
    }

    fn remove_item(&mut self, pane_index: usize, item_index: usize, events: &mut PendingEvents) {
        let pane = &mut self.panes[pane_index];
        let item = pane.items.remove(item_index);
        pane.active = match pane.active {
            Some(_) if pane.items.is_empty() => None,
            Some(active) if active > item_index => Some(active - 1),
            Some(active) if active == item_index => Some(item_index.min(pane.items.len() - 1)),
            other => other,
        };
        events.push((
            DID_DESTROY_PANE_ITEM,
            json!({ "item": item.to_value(), "pane": pane_value(pane.id), "index": item_index }),
        ));
    }
}

/// Workspace host model.
pub struct Workspace {
    id: ObjectId,
    state: Mutex<WorkspaceState>,
    emitter: Emitter,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Creates a workspace with one empty, active pane.
    pub fn new() -> Self {
        let pane = PaneState::new();
        let active_pane = pane.id;
        Self {
            id: ObjectId::new(),
            state: Mutex::new(WorkspaceState {
                panes: vec![pane],
                active_pane,
                active_item: None,
                active_text_editor: None,
            }),
            emitter: Emitter::new(),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn active_pane(&self) -> ObjectId {
        self.lock().active_pane
    }

    pub fn active_item(&self) -> Option<WorkspaceItem> {
        self.lock().active_item.clone()
    }

    pub fn active_text_editor(&self) -> Option<WorkspaceItem> {
        self.lock().active_text_editor.clone()
    }

    pub fn panes(&self) -> Vec<ObjectId> {
        self.lock().panes.iter().map(|pane| pane.id).collect()
    }

    /// All open items, pane by pane.
    pub fn items(&self) -> Vec<WorkspaceItem> {
        self.lock()
            .panes
            .iter()
            .flat_map(|pane| pane.items.iter().cloned())
            .collect()
    }

    /// First open item whose URI matches `spec`.
    pub fn item_by_uri(&self, spec: &ItemSpec) -> Option<WorkspaceItem> {
        self.items_by_uri(spec).into_iter().next()
    }

    /// Open items selected by `spec`, using the same matching as
    /// `items(<spec>)` channels.
    pub fn items_by_uri(&self, spec: &ItemSpec) -> Vec<WorkspaceItem> {
        self.items()
            .into_iter()
            .filter(|item| spec.matches(&item.uri))
            .collect()
    }

    pub fn add_pane(&self) -> Result<ObjectId, HostError> {
        let pane = PaneState::new();
        let id = pane.id;
        self.lock().panes.push(pane);
        debug!("event=pane_added module=host status=ok pane={id}");
        self.dispatch(vec![(DID_ADD_PANE, json!({ "pane": pane_value(id) }))])?;
        Ok(id)
    }

    pub fn activate_pane(&self, pane: ObjectId) -> Result<(), HostError> {
        let events = {
            let mut state = self.lock();
            let index = state.pane_index(pane)?;
            let mut events = Vec::new();
            state.set_active_pane(index, &mut events);
            state.sync_active_item(&mut events);
            events
        };
        self.dispatch(events)
    }

    /// Destroys `pane` and every item in it.
    pub fn destroy_pane(&self, pane: ObjectId) -> Result<(), HostError> {
        let events = {
            let mut state = self.lock();
            let index = state.pane_index(pane)?;
            if state.panes.len() == 1 {
                return Err(HostError::LastPane);
            }
            let mut events = Vec::new();
            while !state.panes[index].items.is_empty() {
                state.remove_item(index, 0, &mut events);
            }
            state.panes.remove(index);
            events.push((DID_DESTROY_PANE, json!({ "pane": pane_value(pane) })));
            if state.active_pane == pane {
                state.set_active_pane(0, &mut events);
            }
            state.sync_active_item(&mut events);
            events
        };
        debug!("event=pane_destroyed module=host status=ok pane={pane}");
        self.dispatch(events)
    }

    /// Opens `item` in the active pane and activates it.
    pub fn open(&self, item: WorkspaceItem) -> Result<(), HostError> {
        let pane = self.active_pane();
        self.open_in_pane(pane, item)
    }

    /// Opens `item` in `pane` and activates it. An already open URI is
    /// activated where it is instead.
    pub fn open_in_pane(&self, pane: ObjectId, item: WorkspaceItem) -> Result<(), HostError> {
        let events = {
            let mut state = self.lock();
            let mut events = Vec::new();
            let (pane_index, item_index) = match state.locate(&item.uri) {
                Some(found) => found,
                None => {
                    let pane_index = state.pane_index(pane)?;
                    let target = &mut state.panes[pane_index];
                    target.items.push(item.clone());
                    let item_index = target.items.len() - 1;
                    let pane_json = pane_value(target.id);
                    events.push((
                        DID_OPEN,
                        json!({ "item": item.to_value(), "pane": pane_json.clone(), "index": item_index }),
                    ));
                    if item.is_text_editor() {
                        events.push((
                            DID_ADD_TEXT_EDITOR,
                            json!({ "textEditor": item.to_value(), "pane": pane_json, "index": item_index }),
                        ));
                    }
                    debug!(
                        "event=item_opened module=host status=ok uri={} pane={}",
                        item.uri, target.id
                    );
                    (pane_index, item_index)
                }
            };
            state.panes[pane_index].active = Some(item_index);
            state.set_active_pane(pane_index, &mut events);
            state.sync_active_item(&mut events);
            events
        };
        self.dispatch(events)
    }

    /// Activates the open item with exactly this URI, and its pane.
    pub fn activate_item(&self, uri: &str) -> Result<(), HostError> {
        let events = {
            let mut state = self.lock();
            let (pane_index, item_index) = state
                .locate(uri)
                .ok_or_else(|| HostError::UnknownItem(uri.to_string()))?;
            let mut events = Vec::new();
            state.panes[pane_index].active = Some(item_index);
            state.set_active_pane(pane_index, &mut events);
            state.sync_active_item(&mut events);
            events
        };
        self.dispatch(events)
    }

    /// Destroys the open item with exactly this URI.
    pub fn destroy_item(&self, uri: &str) -> Result<(), HostError> {
        let events = {
            let mut state = self.lock();
            let (pane_index, item_index) = state
                .locate(uri)
                .ok_or_else(|| HostError::UnknownItem(uri.to_string()))?;
            let mut events = Vec::new();
            state.remove_item(pane_index, item_index, &mut events);
            state.sync_active_item(&mut events);
            events
        };
        debug!("event=item_destroyed module=host status=ok uri={uri}");
        self.dispatch(events)
    }

    /// Destroys the item carrying `id`, if it is open. Returns whether it was.
    pub fn destroy_item_by_id(&self, id: ObjectId) -> Result<bool, HostError> {
        let uri = self
            .items()
            .into_iter()
            .find(|item| item.id == id)
            .map(|item| item.uri);
        match uri {
            Some(uri) => self.destroy_item(&uri).map(|()| true),
            None => Ok(false),
        }
    }

    /// `target` depends on `items[(uri_spec)][.action]`.
    ///
    /// Without an action the callback receives the action name first, e.g.
    /// `["opened", item, pane, index]` or `["activated", item, previous]`.
    pub fn add_dep_items<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        uri_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let channel = Channel::compose("items", uri_spec, action);
        graph.add(self, target, &channel, callback)
    }

    pub fn remove_dep_items(
        &self,
        graph: &DependentsGraph,
        uri_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &dyn Participant,
    ) {
        let channel = Channel::compose("items", uri_spec, action);
        graph.remove(self, target, &channel);
    }

    /// `target` depends on `textEditors[(uri_spec)][.action]`.
    pub fn add_dep_text_editors<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        uri_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let channel = Channel::compose("textEditors", uri_spec, action);
        graph.add(self, target, &channel, callback)
    }

    pub fn remove_dep_text_editors(
        &self,
        graph: &DependentsGraph,
        uri_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &dyn Participant,
    ) {
        let channel = Channel::compose("textEditors", uri_spec, action);
        graph.remove(self, target, &channel);
    }

    /// `target` depends on `panes[.action]`.
    pub fn add_dep_panes<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        action: Option<&str>,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let channel = Channel::compose("panes", None, action);
        graph.add(self, target, &channel, callback)
    }

    pub fn remove_dep_panes(
        &self,
        graph: &DependentsGraph,
        action: Option<&str>,
        target: &dyn Participant,
    ) {
        let channel = Channel::compose("panes", None, action);
        graph.remove(self, target, &channel);
    }

    fn dispatch(&self, events: PendingEvents) -> Result<(), HostError> {
        for (event, payload) in events {
            self.emitter
                .emit(event, &payload)
                .map_err(|err| HostError::listener(event, err))?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, WorkspaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Participant for Workspace {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

/// Workspaces depend on other objects (e.g. a view's `destroyed` channel)
/// through explicit callbacks only.
impl Dependent for Workspace {}
