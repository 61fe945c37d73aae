//! Consumer (plugin/view) error types.

use crate::deps::{CallbackError, DepsError};
use crate::host::HostError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Plugin lifecycle errors.
#[derive(Debug)]
pub enum PluginError {
    /// A plugin with this name is already active; plugins are singletons.
    AlreadyActive(String),
    Deps(DepsError),
    /// A plugin hook failed.
    Hook { plugin: String, error: CallbackError },
}

impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyActive(name) => write!(f, "plugin already active: {name}"),
            Self::Deps(err) => write!(f, "plugin dependency failed: {err}"),
            Self::Hook { plugin, error } => write!(f, "plugin `{plugin}` hook failed: {error}"),
        }
    }
}

impl Error for PluginError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyActive(_) => None,
            Self::Deps(err) => Some(err),
            Self::Hook { error, .. } => Some(error),
        }
    }
}

impl From<DepsError> for PluginError {
    fn from(err: DepsError) -> Self {
        Self::Deps(err)
    }
}

/// View lifecycle errors.
#[derive(Debug)]
pub enum ViewError {
    Deps(DepsError),
    Host(HostError),
}

impl Display for ViewError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deps(err) => write!(f, "view dependency failed: {err}"),
            Self::Host(err) => write!(f, "view host operation failed: {err}"),
        }
    }
}

impl Error for ViewError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Deps(err) => Some(err),
            Self::Host(err) => Some(err),
        }
    }
}

impl From<DepsError> for ViewError {
    fn from(err: DepsError) -> Self {
        Self::Deps(err)
    }
}

impl From<HostError> for ViewError {
    fn from(err: HostError) -> Self {
        Self::Host(err)
    }
}
