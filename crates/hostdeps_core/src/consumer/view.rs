//! View base: a workspace item with its own lifecycle.
//!
//! # Responsibility
//! - Notify the view once when the workspace first opens it (`on_dom_ready`).
//! - On destroy, announce `destroyed` so the workspace drops the item, then
//!   release the view's own relationships.
//!
//! # Invariants
//! - `on_dom_ready` runs at most once per view.
//! - The `destroyed` channel fires before any of the view's relationships
//!   are removed.

use crate::channel::{Channel, ItemSpec};
use crate::consumer::context::HostContext;
use crate::consumer::error::ViewError;
use crate::deps::{
    CallbackError, CallbackResult, DepCallback, DepEvent, Dependent, DependentsGraph,
};
use crate::disposables::Disposables;
use crate::host::{ItemKind, Workspace, WorkspaceItem};
use crate::model::{ObjectId, Participant};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Channel a view fires on itself right before it is torn down.
pub const DESTROYED_CHANNEL: &str = "destroyed";

/// Presentation options of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewOptions {
    pub title: String,
    pub default_location: String,
    pub allowed_locations: Vec<String>,
    pub is_permanent: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            title: "BG View".to_string(),
            default_location: "bottom".to_string(),
            allowed_locations: ["center", "left", "right", "bottom"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            is_permanent: false,
        }
    }
}

/// Behavior a concrete view plugs into [`View`].
pub trait ViewHooks: Send + Sync + 'static {
    /// Runs once, when the workspace first opens the view.
    fn on_dom_ready(&self, view: &View) -> CallbackResult {
        let _ = view;
        Ok(())
    }

    /// Receives callback-less dependency events addressed to the view.
    fn on_event(&self, view: &View, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        let _ = (view, method, event);
        None
    }
}

impl ViewHooks for () {}

pub struct View {
    id: ObjectId,
    uri: String,
    options: ViewOptions,
    disposables: Disposables,
    context: HostContext,
    hooks: Box<dyn ViewHooks>,
    close_item: DepCallback,
    dom_ready: AtomicBool,
    destroyed: AtomicBool,
}

impl View {
    /// Creates a view and arms its one-shot `on_dom_ready` notification.
    pub fn new(
        context: &HostContext,
        uri: impl Into<String>,
        options: ViewOptions,
        hooks: impl ViewHooks,
    ) -> Result<Arc<Self>, ViewError> {
        let id = ObjectId::new();
        let view = Arc::new(Self {
            id,
            uri: uri.into(),
            options,
            disposables: Disposables::new(),
            context: context.clone(),
            hooks: Box::new(hooks),
            close_item: close_item(&context.workspace, id),
            dom_ready: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        });
        Self::arm_dom_ready(&view)?;
        debug!("event=view_created module=consumer status=ok uri={}", view.uri);
        Ok(view)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn title(&self) -> &str {
        &self.options.title
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// Cleanup actions released by [`View::destroy`].
    pub fn disposables(&self) -> &Disposables {
        &self.disposables
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    pub fn is_dom_ready(&self) -> bool {
        self.dom_ready.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Workspace item representing this view.
    pub fn item(&self) -> WorkspaceItem {
        WorkspaceItem::with_id(self.id, self.uri.clone(), ItemKind::Panel)
    }

    /// Opens the view in the workspace.
    ///
    /// The workspace depends on the view's `destroyed` channel so that
    /// destroying the view closes its item. Showing an open view activates it.
    pub fn show(&self) -> Result<(), ViewError> {
        let workspace = &self.context.workspace;
        self.context.graph.add(
            self,
            workspace,
            DESTROYED_CHANNEL,
            Some(self.close_item.clone()),
        )?;
        workspace.open(self.item())?;
        Ok(())
    }

    /// Fires `destroyed`, then disposes and removes every relationship.
    pub fn destroy(&self) -> Result<(), ViewError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("event=view_destroy module=consumer status=noop uri={}", self.uri);
            return Ok(());
        }
        let fired = self.context.graph.fire(self, DESTROYED_CHANNEL, &[]);
        self.disposables.dispose();
        self.context.graph.object_destroyed(self);
        fired?;
        info!("event=view_destroy module=consumer status=ok uri={}", self.uri);
        Ok(())
    }

    fn arm_dom_ready(view: &Arc<View>) -> Result<(), ViewError> {
        let workspace = &view.context.workspace;
        let spec = ItemSpec::prefix(view.uri.clone());
        let weak = Arc::downgrade(view);
        let graph = view.context.graph.downgrade();
        let workspace_id = workspace.object_id();
        let callback = DepCallback::new(move |event| {
            let Some(view) = weak.upgrade() else {
                return Ok(());
            };
            let opened_id = event
                .arg(0)
                .and_then(|item| item.get("id"))
                .and_then(|id| serde_json::from_value::<ObjectId>(id.clone()).ok());
            if opened_id != Some(view.id) {
                return Ok(());
            }
            if let Some(graph) = graph.upgrade() {
                view.remove_dom_ready_dep(&graph, workspace_id);
            }
            if view.dom_ready.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            view.hooks.on_dom_ready(&view)
        });
        workspace.add_dep_items(
            &view.context.graph,
            Some(&spec),
            Some("opened"),
            view,
            Some(callback),
        )?;
        Ok(())
    }

    fn remove_dom_ready_dep(&self, graph: &DependentsGraph, workspace: ObjectId) {
        let spec = ItemSpec::prefix(self.uri.clone());
        let channel = Channel::compose("items", Some(&spec), Some("opened"));
        graph.remove(&workspace, self, &channel);
    }
}

fn close_item(workspace: &Arc<Workspace>, item_id: ObjectId) -> DepCallback {
    let workspace: Weak<Workspace> = Arc::downgrade(workspace);
    DepCallback::new(move |_| {
        let Some(workspace) = workspace.upgrade() else {
            return Ok(());
        };
        workspace
            .destroy_item_by_id(item_id)
            .map(|_| ())
            .map_err(CallbackError::from_error)
    })
}

impl Participant for View {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Dependent for View {
    fn on_named_event(&self, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        self.hooks.on_event(self, method, event)
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("dom_ready", &self.is_dom_ready())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
