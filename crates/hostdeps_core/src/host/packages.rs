//! Minimal package manager model.
//!
//! # Responsibility
//! - Track loaded and active packages plus the two startup milestones.
//! - Emit activation events and the "initial packages" milestone events.
//!
//! # Invariants
//! - Each milestone event is emitted at most once.
//! - Activating an active package (or deactivating an inactive one) emits
//!   nothing.

use crate::channel::{Channel, ItemSpec};
use crate::deps::{ChannelNodeHandle, DepCallback, Dependent, DependentsGraph, DepsError};
use crate::host::emitter::Emitter;
use crate::host::error::HostError;
use crate::model::{ObjectId, Participant};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DID_LOAD_PACKAGE: &str = "did-load-package";
pub const DID_ACTIVATE_PACKAGE: &str = "did-activate-package";
pub const DID_DEACTIVATE_PACKAGE: &str = "did-deactivate-package";
pub const DID_LOAD_INITIAL_PACKAGES: &str = "did-load-initial-packages";
pub const DID_ACTIVATE_INITIAL_PACKAGES: &str = "did-activate-initial-packages";

/// State reported on the action-less package channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PackageState {
    Activated,
    Deactivated,
    NotInstalled,
}

impl PackageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::NotInstalled => "notInstalled",
        }
    }
}

#[derive(Default)]
struct PackagesState {
    /// name -> active
    packages: BTreeMap<String, bool>,
    initial_loaded: bool,
    initial_activated: bool,
}

pub struct PackageManager {
    id: ObjectId,
    state: Mutex<PackagesState>,
    emitter: Emitter,
}

impl Default for PackageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager {
    pub fn new() -> Self {
        Self {
            id: ObjectId::new(),
            state: Mutex::new(PackagesState::default()),
            emitter: Emitter::new(),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn package_state(&self, name: &str) -> PackageState {
        match self.lock().packages.get(name) {
            Some(true) => PackageState::Activated,
            Some(false) => PackageState::Deactivated,
            None => PackageState::NotInstalled,
        }
    }

    pub fn is_package_active(&self, name: &str) -> bool {
        self.package_state(name) == PackageState::Activated
    }

    pub fn active_packages(&self) -> Vec<String> {
        self.lock()
            .packages
            .iter()
            .filter(|(_, active)| **active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn has_loaded_initial_packages(&self) -> bool {
        self.lock().initial_loaded
    }

    pub fn has_activated_initial_packages(&self) -> bool {
        self.lock().initial_activated
    }

    /// Makes `name` known (inactive). Loading a known package is a no-op.
    pub fn load_package(&self, name: &str) -> Result<(), HostError> {
        let inserted = {
            let mut state = self.lock();
            if state.packages.contains_key(name) {
                false
            } else {
                state.packages.insert(name.to_string(), false);
                true
            }
        };
        if inserted {
            self.emit(DID_LOAD_PACKAGE, json!({ "name": name }))?;
        }
        Ok(())
    }

    /// Activates `name`, loading it first when needed.
    pub fn activate_package(&self, name: &str) -> Result<(), HostError> {
        self.load_package(name)?;
        let changed = self.set_active(name, true);
        if changed {
            debug!("event=package_activated module=host status=ok name={name}");
            self.emit(DID_ACTIVATE_PACKAGE, json!({ "name": name }))?;
        }
        Ok(())
    }

    pub fn deactivate_package(&self, name: &str) -> Result<(), HostError> {
        if self.package_state(name) == PackageState::NotInstalled {
            return Err(HostError::UnknownPackage(name.to_string()));
        }
        let changed = self.set_active(name, false);
        if changed {
            debug!("event=package_deactivated module=host status=ok name={name}");
            self.emit(DID_DEACTIVATE_PACKAGE, json!({ "name": name }))?;
        }
        Ok(())
    }

    /// Marks the startup load phase as complete.
    pub fn finish_loading_initial_packages(&self) -> Result<(), HostError> {
        let first = !std::mem::replace(&mut self.lock().initial_loaded, true);
        if first {
            info!("event=initial_packages_loaded module=host status=ok");
            self.emit(DID_LOAD_INITIAL_PACKAGES, Value::Null)?;
        }
        Ok(())
    }

    /// Marks the startup activation phase as complete.
    pub fn finish_activating_initial_packages(&self) -> Result<(), HostError> {
        let first = !std::mem::replace(&mut self.lock().initial_activated, true);
        if first {
            info!("event=initial_packages_activated module=host status=ok");
            self.emit(DID_ACTIVATE_INITIAL_PACKAGES, Value::Null)?;
        }
        Ok(())
    }

    /// `target` depends on `packages[(name_spec)][.action]`.
    ///
    /// A literal `name_spec` is a comma separated list of exact names; use
    /// a `/regex/` spec for pattern matching. Without an action listeners
    /// receive `[state, name]`; with `activated`/`deactivated`, `[name]`.
    pub fn add_dep<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        name_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        let channel = Channel::compose("packages", name_spec, action);
        graph.add(self, target, &channel, callback)
    }

    pub fn remove_dep(
        &self,
        graph: &DependentsGraph,
        name_spec: Option<&ItemSpec>,
        action: Option<&str>,
        target: &dyn Participant,
    ) {
        let channel = Channel::compose("packages", name_spec, action);
        graph.remove(self, target, &channel);
    }

    pub fn add_dep_initial_packages_activated<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        graph.add(self, target, INITIAL_PACKAGES_ACTIVATED, callback)
    }

    pub fn remove_dep_initial_packages_activated(
        &self,
        graph: &DependentsGraph,
        target: &dyn Participant,
    ) {
        graph.remove(self, target, INITIAL_PACKAGES_ACTIVATED);
    }

    pub fn add_dep_initial_packages_loaded<T: Dependent>(
        &self,
        graph: &DependentsGraph,
        target: &Arc<T>,
        callback: Option<DepCallback>,
    ) -> Result<ChannelNodeHandle, DepsError> {
        graph.add(self, target, INITIAL_PACKAGES_LOADED, callback)
    }

    pub fn remove_dep_initial_packages_loaded(&self, graph: &DependentsGraph, target: &dyn Participant) {
        graph.remove(self, target, INITIAL_PACKAGES_LOADED);
    }

    fn set_active(&self, name: &str, active: bool) -> bool {
        let mut state = self.lock();
        match state.packages.get_mut(name) {
            Some(current) if *current != active => {
                *current = active;
                true
            }
            _ => false,
        }
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), HostError> {
        self.emitter
            .emit(event, &payload)
            .map(|_| ())
            .map_err(|err| HostError::listener(event, err))
    }

    fn lock(&self) -> MutexGuard<'_, PackagesState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Participant for PackageManager {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

/// Channel of the "all startup packages activated" milestone.
pub const INITIAL_PACKAGES_ACTIVATED: &str = "manager.initialPackagesActivated";
/// Channel of the "all startup packages loaded" milestone.
pub const INITIAL_PACKAGES_LOADED: &str = "manager.initialPackagesLoaded";
