//! Host model error types.

use crate::deps::CallbackError;
use crate::model::ObjectId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Host model operation errors.
#[derive(Debug)]
pub enum HostError {
    /// A listener failed while the host delivered `event`.
    Listener { event: String, error: CallbackError },
    UnknownPane(ObjectId),
    UnknownItem(String),
    UnknownPackage(String),
    /// The last pane of a workspace cannot be destroyed.
    LastPane,
    InvalidKeyPath(String),
}

impl HostError {
    pub(crate) fn listener(event: &str, error: CallbackError) -> Self {
        Self::Listener {
            event: event.to_string(),
            error,
        }
    }
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listener { event, error } => write!(f, "listener for `{event}` failed: {error}"),
            Self::UnknownPane(id) => write!(f, "pane not found: {id}"),
            Self::UnknownItem(uri) => write!(f, "workspace item not found: {uri}"),
            Self::UnknownPackage(name) => write!(f, "package not loaded: {name}"),
            Self::LastPane => write!(f, "the last pane of a workspace cannot be destroyed"),
            Self::InvalidKeyPath(key) => write!(f, "invalid config key path: `{key}`"),
        }
    }
}

impl Error for HostError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Listener { error, .. } => Some(error),
            _ => None,
        }
    }
}
