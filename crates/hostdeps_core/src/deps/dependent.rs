//! Dependent-side contracts: fire events, callbacks and listener traits.

use crate::deps::error::CallbackError;
use crate::model::{ObjectId, Participant};
use serde_json::Value;
use std::sync::Arc;

/// Outcome of delivering one event to one dependent.
pub type CallbackResult = Result<(), CallbackError>;

/// One notification delivered to a dependent.
#[derive(Debug, Clone, Copy)]
pub struct DepEvent<'a> {
    /// Source whose channel fired.
    pub source: ObjectId,
    /// Channel that fired. Wildcard dependents see the concrete channel.
    pub channel: &'a str,
    /// Positional event arguments.
    pub args: &'a [Value],
}

impl<'a> DepEvent<'a> {
    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// Returns argument `index` as a string slice when it is a JSON string.
    pub fn arg_str(&self, index: usize) -> Option<&'a str> {
        self.arg(index).and_then(Value::as_str)
    }
}

type CallbackFn = dyn Fn(&DepEvent<'_>) -> CallbackResult + Send + Sync + 'static;

/// Explicit callback attached to a dependency.
///
/// Clones share identity; two callbacks are equal only when they are clones
/// of the same original, which is what duplicate detection relies on.
#[derive(Clone)]
pub struct DepCallback(Arc<CallbackFn>);

impl DepCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&DepEvent<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, event: &DepEvent<'_>) -> CallbackResult {
        (self.0)(event)
    }
}

impl PartialEq for DepCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DepCallback {}

impl std::fmt::Debug for DepCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepCallback({:p})", Arc::as_ptr(&self.0))
    }
}

/// Listener capability of a target.
///
/// When a dependency carries no explicit callback, the graph first offers
/// the event to `on_named_event` with the channel node's default target
/// method name, then to `on_dep_changed`. Returning `None` means "not
/// handled here"; a target that handles neither is skipped silently.
pub trait Dependent: Participant {
    fn on_named_event(&self, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        let _ = (method, event);
        None
    }

    fn on_dep_changed(&self, event: &DepEvent<'_>) -> Option<CallbackResult> {
        let _ = event;
        None
    }
}

/// An id-only target; it can only be notified through explicit callbacks.
impl Dependent for ObjectId {}
