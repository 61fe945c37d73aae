//! Disposable registry.
//!
//! # Responsibility
//! - Collect cleanup actions acquired over an object's lifetime.
//! - Release all of them together, exactly once, on teardown.
//!
//! # Invariants
//! - Every accepted action runs at most once.
//! - Actions run in insertion order; actions added while disposing still run.
//! - `dispose()` on an empty registry is a no-op, so repeated calls are safe.
//! - Clones are handles to the same registry.

use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One resolved cleanup action.
pub type DisposeAction = Box<dyn FnOnce() + Send + 'static>;

/// Object exposing a `dispose` capability.
pub trait Disposable: Send + 'static {
    fn dispose(&mut self);
}

/// Object exposing a `destroy` capability.
pub trait Destroyable: Send + 'static {
    fn destroy(&mut self);
}

/// Adapter registering a [`Disposable`] object.
pub struct Disposing<T: Disposable>(pub T);

/// Adapter registering a [`Destroyable`] object.
pub struct Destroying<T: Destroyable>(pub T);

/// Values accepted by [`Disposables::add`].
///
/// Anything without an impl is rejected at compile time, so a
/// non-disposable can never slip into a registry unnoticed.
pub trait IntoDisposable {
    /// Appends the resolved cleanup actions of `self` to `out`.
    fn into_actions(self, out: &mut Vec<DisposeAction>);
}

impl<F> IntoDisposable for F
where
    F: FnOnce() + Send + 'static,
{
    fn into_actions(self, out: &mut Vec<DisposeAction>) {
        out.push(Box::new(self));
    }
}

impl<T: Disposable> IntoDisposable for Disposing<T> {
    fn into_actions(self, out: &mut Vec<DisposeAction>) {
        let mut inner = self.0;
        out.push(Box::new(move || inner.dispose()));
    }
}

impl<T: Destroyable> IntoDisposable for Destroying<T> {
    fn into_actions(self, out: &mut Vec<DisposeAction>) {
        let mut inner = self.0;
        out.push(Box::new(move || inner.destroy()));
    }
}

/// Nested registries are flattened: their pending actions move into the
/// receiving registry and the nested one is left empty.
impl IntoDisposable for Disposables {
    fn into_actions(self, out: &mut Vec<DisposeAction>) {
        out.extend(self.lock().drain(..));
    }
}

/// Ordered bag of cleanup actions released together.
#[derive(Clone, Default)]
pub struct Disposables {
    actions: Arc<Mutex<VecDeque<DisposeAction>>>,
}

impl Disposables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one disposable.
    pub fn add(&self, item: impl IntoDisposable) {
        let mut resolved = Vec::new();
        item.into_actions(&mut resolved);
        self.lock().extend(resolved);
    }

    /// Adds every disposable yielded by `items`.
    ///
    /// Accepts any iterable, including `Option` (where `None` contributes
    /// nothing) and collections of registries.
    pub fn add_all<I>(&self, items: I)
    where
        I: IntoIterator,
        I::Item: IntoDisposable,
    {
        let mut resolved = Vec::new();
        for item in items {
            item.into_actions(&mut resolved);
        }
        self.lock().extend(resolved);
    }

    /// Runs every pending action once and leaves the registry empty.
    ///
    /// The lock is released around each action, so an action may add to
    /// this same registry; such late additions run in the same call.
    pub fn dispose(&self) {
        let mut released = 0usize;
        loop {
            let next = self.lock().pop_front();
            let Some(action) = next else {
                break;
            };
            action();
            released += 1;
        }
        if released > 0 {
            debug!("event=disposables_released module=disposables status=ok count={released}");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DisposeAction>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Disposables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposables")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Destroyable, Destroying, Disposable, Disposables, Disposing};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    struct Handle(Arc<AtomicUsize>);

    impl Disposable for Handle {
        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Widget(Arc<AtomicUsize>);

    impl Destroyable for Widget {
        fn destroy(&mut self) {
            self.0.fetch_add(10, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_closures_and_capability_objects() {
        let hits = counter();
        let registry = Disposables::new();
        let closure_hits = hits.clone();
        registry.add(move || {
            closure_hits.fetch_add(100, Ordering::SeqCst);
        });
        registry.add(Disposing(Handle(hits.clone())));
        registry.add(Destroying(Widget(hits.clone())));
        assert_eq!(registry.len(), 3);

        registry.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 111);
        assert!(registry.is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = Disposables::new();
        for index in 0..4 {
            let order = order.clone();
            registry.add(move || order.lock().expect("order lock").push(index));
        }
        registry.dispose();
        assert_eq!(*order.lock().expect("order lock"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn flattens_nested_registries_and_options() {
        let hits = counter();
        let nested = Disposables::new();
        let nested_hits = hits.clone();
        nested.add(move || {
            nested_hits.fetch_add(1, Ordering::SeqCst);
        });

        let registry = Disposables::new();
        registry.add(nested.clone());
        assert!(nested.is_empty());

        let optional_hits = hits.clone();
        registry.add_all(Some(move || {
            optional_hits.fetch_add(1, Ordering::SeqCst);
        }));
        registry.add_all(None::<Disposables>);

        registry.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn second_dispose_is_a_no_op() {
        let hits = counter();
        let registry = Disposables::new();
        let action_hits = hits.clone();
        registry.add(move || {
            action_hits.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispose();
        registry.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn actions_added_during_dispose_still_run() {
        let hits = counter();
        let registry = Disposables::new();
        let handle = registry.clone();
        let outer_hits = hits.clone();
        registry.add(move || {
            outer_hits.fetch_add(1, Ordering::SeqCst);
            let inner_hits = outer_hits.clone();
            handle.add(move || {
                inner_hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        registry.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_is_reusable_after_dispose() {
        let hits = counter();
        let registry = Disposables::new();
        registry.dispose();

        let action_hits = hits.clone();
        registry.add(move || {
            action_hits.fetch_add(1, Ordering::SeqCst);
        });
        registry.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
