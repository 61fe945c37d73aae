//! Channel nodes on a [`Workspace`].
//!
//! Channels: `items[(uriSpec)][.action]`, `textEditors[(uriSpec)][.action]`
//! and `panes[.action]` (singular object types are accepted too).
//!
//! | family      | actions                                         |
//! |-------------|-------------------------------------------------|
//! | items       | opened, destroyed, activated, deactivated, none |
//! | textEditors | opened, activated, deactivated, none            |
//! | panes       | opened, destroyed, activated, deactivated, none |
//!
//! Without an action every event is delivered with its action name as the
//! first argument.

use crate::channel::{Channel, ChannelParseError};
use crate::deps::{ChannelFirer, ChannelNodeVariant, NodeWiring};
use crate::host::workspace::{
    pane_value, Workspace, WorkspaceItem, DID_ADD_PANE, DID_ADD_TEXT_EDITOR,
    DID_CHANGE_ACTIVE_PANE, DID_CHANGE_ACTIVE_PANE_ITEM, DID_CHANGE_ACTIVE_TEXT_EDITOR,
    DID_DESTROY_PANE, DID_DESTROY_PANE_ITEM, DID_OPEN,
};
use crate::model::SourceObject;
use crate::variants::relay;
use serde_json::{json, Value};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceChannelNode;

impl WorkspaceChannelNode {
    pub const NAME: &'static str = "workspace";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Items,
    TextEditors,
    Panes,
}

impl Family {
    fn from_obj_type(obj_type: &str) -> Option<Self> {
        match obj_type {
            "item" | "items" => Some(Self::Items),
            "textEditor" | "textEditors" => Some(Self::TextEditors),
            "pane" | "panes" => Some(Self::Panes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    All,
    Opened,
    Destroyed,
    Activated,
    Deactivated,
}

impl Action {
    fn parse(action: Option<&str>) -> Option<Self> {
        match action {
            None => Some(Self::All),
            Some("opened") => Some(Self::Opened),
            Some("destroyed") => Some(Self::Destroyed),
            Some("activated") => Some(Self::Activated),
            Some("deactivated") => Some(Self::Deactivated),
            Some(_) => None,
        }
    }

    fn covers(self, other: Action) -> bool {
        self == Self::All || self == other
    }
}

fn default_method(family: Family, action: Action) -> &'static str {
    match (family, action) {
        (Family::Items, Action::All) => "on_workspace_item_changed",
        (Family::Items, Action::Opened) => "on_workspace_item_opened",
        (Family::Items, Action::Destroyed) => "on_workspace_item_destroyed",
        (Family::Items, Action::Activated) => "on_workspace_item_activated",
        (Family::Items, Action::Deactivated) => "on_workspace_item_deactivated",
        (Family::TextEditors, Action::All) => "on_text_editor_changed",
        (Family::TextEditors, Action::Opened) => "on_text_editor_opened",
        (Family::TextEditors, Action::Destroyed) => "on_text_editor_destroyed",
        (Family::TextEditors, Action::Activated) => "on_text_editor_activated",
        (Family::TextEditors, Action::Deactivated) => "on_text_editor_deactivated",
        (Family::Panes, Action::All) => "on_pane_changed",
        (Family::Panes, Action::Opened) => "on_pane_opened",
        (Family::Panes, Action::Destroyed) => "on_pane_destroyed",
        (Family::Panes, Action::Activated) => "on_pane_activated",
        (Family::Panes, Action::Deactivated) => "on_pane_deactivated",
    }
}

impl ChannelNodeVariant for WorkspaceChannelNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn match_source(&self, source: &dyn SourceObject, channel: &Channel) -> bool {
        source.as_any().is::<Workspace>() && Family::from_obj_type(channel.obj_type()).is_some()
    }

    fn wire(&self, wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError> {
        let Some(workspace) = wiring.source().as_any().downcast_ref::<Workspace>() else {
            return Err(wiring.unsupported(Self::NAME, "source is not a workspace"));
        };
        let channel = wiring.channel();
        let Some(family) = Family::from_obj_type(channel.obj_type()) else {
            return Err(wiring.unsupported(Self::NAME, "unknown workspace object type"));
        };
        let Some(action) = Action::parse(channel.action()) else {
            return Err(wiring.unsupported(Self::NAME, "unknown workspace action"));
        };
        if family == Family::TextEditors && action == Action::Destroyed {
            return Err(wiring.unsupported(Self::NAME, "text editors report no destroyed action"));
        }
        if family == Family::Panes && channel.item_spec().is_some() {
            return Err(wiring.unsupported(Self::NAME, "panes take no item spec"));
        }

        let hooks = Hooks {
            workspace,
            wiring,
            action,
        };
        match family {
            Family::Items => {
                hooks.lifecycle(Action::Opened, DID_OPEN, "item", &["pane", "index"]);
                hooks.lifecycle(
                    Action::Destroyed,
                    DID_DESTROY_PANE_ITEM,
                    "item",
                    &["pane", "index"],
                );
                let current = workspace.active_item();
                hooks.activation(DID_CHANGE_ACTIVE_PANE_ITEM, None, item_or_null(current));
            }
            Family::TextEditors => {
                hooks.lifecycle(
                    Action::Opened,
                    DID_ADD_TEXT_EDITOR,
                    "textEditor",
                    &["pane", "index"],
                );
                let current = workspace.active_text_editor();
                hooks.activation(DID_CHANGE_ACTIVE_TEXT_EDITOR, None, item_or_null(current));
            }
            Family::Panes => {
                hooks.lifecycle(Action::Opened, DID_ADD_PANE, "pane", &[]);
                hooks.lifecycle(Action::Destroyed, DID_DESTROY_PANE, "pane", &[]);
                let current = pane_value(workspace.active_pane());
                hooks.activation(DID_CHANGE_ACTIVE_PANE, Some("pane"), current);
            }
        }
        wiring
            .node()
            .set_default_target_method(default_method(family, action));
        Ok(())
    }
}

fn item_or_null(item: Option<WorkspaceItem>) -> Value {
    item.as_ref().map_or(Value::Null, WorkspaceItem::to_value)
}

/// True when the channel's item spec accepts the subject's URI.
fn subject_matches(channel: &Channel, subject: &Value) -> bool {
    if channel.item_spec().is_none() {
        return true;
    }
    subject
        .get("uri")
        .and_then(Value::as_str)
        .map_or(false, |uri| channel.matches_item(uri))
}

fn tagged(all: bool, label: &str, args: Vec<Value>) -> Vec<Value> {
    if !all {
        return args;
    }
    let mut tagged = Vec::with_capacity(args.len() + 1);
    tagged.push(json!(label));
    tagged.extend(args);
    tagged
}

struct Hooks<'w, 'a> {
    workspace: &'w Workspace,
    wiring: &'w NodeWiring<'a>,
    action: Action,
}

impl Hooks<'_, '_> {
    /// Relays a host open/destroy event as `[subject, ..extras]`.
    fn lifecycle(
        &self,
        covered: Action,
        event: &'static str,
        subject_key: &'static str,
        extras: &'static [&'static str],
    ) {
        if !self.action.covers(covered) {
            return;
        }
        let all = self.action == Action::All;
        let label = if covered == Action::Opened {
            "opened"
        } else {
            "destroyed"
        };
        let channel: Channel = self.wiring.channel().clone();
        let firer: ChannelFirer = self.wiring.firer();
        let subscription = self.workspace.emitter().on(event, move |payload| {
            let subject = payload.get(subject_key).cloned().unwrap_or(Value::Null);
            if !subject_matches(&channel, &subject) {
                return Ok(());
            }
            let mut args = vec![subject];
            args.extend(
                extras
                    .iter()
                    .map(|key| payload.get(*key).cloned().unwrap_or(Value::Null)),
            );
            relay(&firer, &tagged(all, label, args))
        });
        self.wiring.node().disposables().add(subscription);
    }

    /// Relays activation changes, remembering the previously active subject.
    ///
    /// `deactivated` fires as `[previous, next]` before `activated` fires as
    /// `[next, previous]`.
    fn activation(&self, event: &'static str, subject_key: Option<&'static str>, initial: Value) {
        let wants_activated = self.action.covers(Action::Activated);
        let wants_deactivated = self.action.covers(Action::Deactivated);
        if !wants_activated && !wants_deactivated {
            return;
        }
        let all = self.action == Action::All;
        let channel: Channel = self.wiring.channel().clone();
        let firer: ChannelFirer = self.wiring.firer();
        let last_active = Mutex::new(initial);
        let subscription = self.workspace.emitter().on(event, move |payload| {
            let next = match subject_key {
                Some(key) => payload.get(key).cloned().unwrap_or(Value::Null),
                None => payload.clone(),
            };
            let previous = std::mem::replace(
                &mut *last_active.lock().unwrap_or_else(PoisonError::into_inner),
                next.clone(),
            );
            if wants_deactivated && !previous.is_null() && subject_matches(&channel, &previous) {
                let args = vec![previous.clone(), next.clone()];
                relay(&firer, &tagged(all, "deactivated", args))?;
            }
            if wants_activated && !next.is_null() && subject_matches(&channel, &next) {
                relay(&firer, &tagged(all, "activated", vec![next, previous]))?;
            }
            Ok(())
        });
        self.wiring.node().disposables().add(subscription);
    }
}
