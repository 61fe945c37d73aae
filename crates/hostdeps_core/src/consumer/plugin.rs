//! Plugin base and the per-name plugin registry.
//!
//! # Responsibility
//! - Keep at most one active plugin per name.
//! - Run a plugin's late activation once startup packages are active.
//! - Tear a plugin down: hooks, disposables, graph relationships, registry.
//!
//! # Invariants
//! - Activating a name that is already active fails with `AlreadyActive`.
//! - `destroy` is idempotent.

use crate::consumer::context::HostContext;
use crate::consumer::error::PluginError;
use crate::deps::{CallbackResult, DepCallback, DepEvent, Dependent};
use crate::disposables::Disposables;
use crate::model::{ObjectId, Participant};
use log::{debug, error, info};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Behavior a concrete plugin plugs into [`Plugin`].
pub trait PluginHooks: Send + Sync + 'static {
    /// Whether [`PluginHooks::late_activate`] should be scheduled.
    fn has_late_activate(&self) -> bool {
        false
    }

    /// Runs after every startup package has been activated.
    fn late_activate(&self, plugin: &Plugin) -> CallbackResult {
        let _ = plugin;
        Ok(())
    }

    /// State to persist for the next session.
    fn serialize(&self, plugin: &Plugin) -> Option<Value> {
        let _ = plugin;
        None
    }

    /// Runs first during [`Plugin::destroy`].
    fn deactivate(&self, plugin: &Plugin) {
        let _ = plugin;
    }

    /// Receives callback-less dependency events addressed to the plugin.
    fn on_event(&self, plugin: &Plugin, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        let _ = (plugin, method, event);
        None
    }
}

impl PluginHooks for () {}

type PluginTable = Mutex<BTreeMap<String, Arc<Plugin>>>;

pub struct Plugin {
    id: ObjectId,
    name: String,
    last_session_state: Option<Value>,
    disposables: Disposables,
    context: HostContext,
    hooks: Box<dyn PluginHooks>,
    registry: Weak<PluginTable>,
    destroyed: AtomicBool,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State handed over from the previous session, if any.
    pub fn last_session_state(&self) -> Option<&Value> {
        self.last_session_state.as_ref()
    }

    /// Cleanup actions released by [`Plugin::destroy`].
    pub fn disposables(&self) -> &Disposables {
        &self.disposables
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    pub fn serialize(&self) -> Option<Value> {
        self.hooks.serialize(self)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Deactivates the plugin and removes every relationship it takes part in.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("event=plugin_destroy module=consumer status=noop name={}", self.name);
            return;
        }
        self.hooks.deactivate(self);
        self.disposables.dispose();
        self.context.graph.object_destroyed(self);
        if let Some(table) = self.registry.upgrade() {
            let mut plugins = table.lock().unwrap_or_else(PoisonError::into_inner);
            if plugins.get(&self.name).is_some_and(|entry| entry.id == self.id) {
                plugins.remove(&self.name);
            }
        }
        info!("event=plugin_destroy module=consumer status=ok name={}", self.name);
    }

    fn schedule_late_activate(plugin: &Arc<Plugin>) -> Result<(), PluginError> {
        if !plugin.hooks.has_late_activate() {
            return Ok(());
        }
        let packages = &plugin.context.packages;
        if packages.has_activated_initial_packages() {
            debug!("event=plugin_late_activate module=consumer status=ok name={} mode=immediate", plugin.name);
            return plugin
                .hooks
                .late_activate(plugin)
                .map_err(|error| PluginError::Hook {
                    plugin: plugin.name.clone(),
                    error,
                });
        }

        let weak = Arc::downgrade(plugin);
        let callback = DepCallback::new(move |_| match weak.upgrade() {
            Some(plugin) => {
                debug!("event=plugin_late_activate module=consumer status=ok name={} mode=deferred", plugin.name);
                plugin.hooks.late_activate(&plugin)
            }
            None => Ok(()),
        });
        packages.add_dep_initial_packages_activated(&plugin.context.graph, plugin, Some(callback))?;
        Ok(())
    }
}

impl Participant for Plugin {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Dependent for Plugin {
    fn on_named_event(&self, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        self.hooks.on_event(self, method, event)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Registry of active plugins keyed by package name. Clones share entries.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<PluginTable>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the singleton plugin `name`.
    ///
    /// # Errors
    /// - `AlreadyActive` when `name` is active in this registry.
    /// - `Deps`/`Hook` when scheduling late activation fails; the plugin is
    ///   destroyed again before returning.
    pub fn activate(
        &self,
        context: &HostContext,
        name: &str,
        last_session_state: Option<Value>,
        hooks: impl PluginHooks,
    ) -> Result<Arc<Plugin>, PluginError> {
        let plugin = {
            let mut plugins = self.lock();
            if plugins.contains_key(name) {
                error!("event=plugin_activate module=consumer status=error name={name} reason=already_active");
                return Err(PluginError::AlreadyActive(name.to_string()));
            }
            let plugin = Arc::new(Plugin {
                id: ObjectId::new(),
                name: name.to_string(),
                last_session_state,
                disposables: Disposables::new(),
                context: context.clone(),
                hooks: Box::new(hooks),
                registry: Arc::downgrade(&self.plugins),
                destroyed: AtomicBool::new(false),
            });
            plugins.insert(name.to_string(), Arc::clone(&plugin));
            plugin
        };
        info!("event=plugin_activate module=consumer status=ok name={name}");

        if let Err(err) = Plugin::schedule_late_activate(&plugin) {
            plugin.destroy();
            return Err(err);
        }
        Ok(plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Plugin>> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Session state of `name`; `{}` when it is not active or has none.
    pub fn serialize(&self, name: &str) -> Value {
        self.get(name)
            .and_then(|plugin| plugin.serialize())
            .unwrap_or_else(|| json!({}))
    }

    /// Session state of every active plugin keyed by name.
    pub fn serialize_all(&self) -> Value {
        let plugins: Vec<Arc<Plugin>> = self.lock().values().cloned().collect();
        let mut states = Map::new();
        for plugin in plugins {
            if let Some(state) = plugin.serialize() {
                states.insert(plugin.name.clone(), state);
            }
        }
        Value::Object(states)
    }

    /// Destroys the plugin `name`. Returns whether it was active.
    pub fn deactivate(&self, name: &str) -> bool {
        match self.get(name) {
            Some(plugin) => {
                plugin.destroy();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Plugin>>> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
