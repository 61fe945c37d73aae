//! Named-event subscription primitive shared by the host models.
//!
//! # Responsibility
//! - Register handlers per event name and hand back a disposable
//!   [`Subscription`].
//! - Deliver an emitted payload to the handlers registered at emit time.
//!
//! # Invariants
//! - Handlers run in subscription order.
//! - Handlers added or removed during an emit take effect on the next emit.
//! - The handler table lock is never held while a handler runs.

use crate::deps::CallbackError;
use crate::disposables::{Disposable, DisposeAction, IntoDisposable};
use log::trace;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type HandlerFn = dyn Fn(&Value) -> Result<(), CallbackError> + Send + Sync + 'static;

#[derive(Default)]
struct HandlerTable {
    next_id: u64,
    handlers: BTreeMap<u64, (String, Arc<HandlerFn>)>,
}

/// Event emitter with disposable subscriptions. Clones share handlers.
#[derive(Clone, Default)]
pub struct Emitter {
    table: Arc<Mutex<HandlerTable>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        table
            .handlers
            .insert(id, (event.to_string(), Arc::new(handler)));
        Subscription {
            table: Arc::downgrade(&self.table),
            id: Some(id),
        }
    }

    /// Delivers `payload` to every handler of `event`.
    ///
    /// Returns the number of handlers invoked. The first handler error stops
    /// delivery and is returned.
    pub fn emit(&self, event: &str, payload: &Value) -> Result<usize, CallbackError> {
        let handlers: Vec<Arc<HandlerFn>> = self
            .lock()
            .handlers
            .values()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(payload)?;
        }
        trace!(
            "event=host_emit module=host status=ok name={event} handlers={}",
            handlers.len()
        );
        Ok(handlers.len())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock()
            .handlers
            .values()
            .filter(|(name, _)| name == event)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HandlerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.lock().handlers.len())
            .finish()
    }
}

/// Handle for one registered handler; disposing it unsubscribes.
///
/// Dropping a subscription without disposing it keeps the handler alive.
#[derive(Debug)]
pub struct Subscription {
    table: Weak<Mutex<HandlerTable>>,
    id: Option<u64>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.table.strong_count() > 0
    }
}

impl Disposable for Subscription {
    fn dispose(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(table) = self.table.upgrade() {
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .remove(&id);
        }
    }
}

impl IntoDisposable for Subscription {
    fn into_actions(self, out: &mut Vec<DisposeAction>) {
        let mut subscription = self;
        out.push(Box::new(move || subscription.dispose()));
    }
}
