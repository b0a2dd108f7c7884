//! The store contract consumed by the binding layer.
//!
//! The store itself is an external collaborator; this module only pins down
//! the three operations the binding layer is allowed to use and the identity
//! conventions around them.
//!
//! # Invariants
//!
//! 1. The binding layer never mutates a store; it only subscribes, reads
//!    snapshots, and dispatches.
//! 2. "Same store" and "same snapshot" are thin-pointer identity checks.
//!    Content equality is never consulted at this layer.
//! 3. Dropping an [`Unsubscribe`] guard removes the listener before the
//!    next notification cycle.

use std::any::Any;
use std::rc::Rc;

use crate::equal::same_rc;

/// The store state at a point in time. Treated as immutable; a state change
/// is always a new `Rc` allocation.
pub type Snapshot = Rc<dyn Any>;

/// An opaque action handed to [`Store::dispatch`].
pub type Action = Box<dyn Any>;

/// Whatever the store's dispatch returns (opaque to this layer).
pub type DispatchResult = Box<dyn Any>;

/// A dispatch function bound to one store.
pub type Dispatch = Rc<dyn Fn(Action) -> DispatchResult>;

/// Shared handle to a store. Identity of the handle decides "same store".
pub type StoreRef = Rc<dyn Store>;

/// The three operations consumed from the store collaborator.
pub trait Store {
    /// Register a change listener. The listener runs synchronously, inline
    /// with the store's own dispatch. The returned guard unsubscribes on
    /// drop.
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe;

    /// Current state snapshot.
    fn get_state(&self) -> Snapshot;

    /// Feed an action through the store's update pipeline.
    fn dispatch(&self, action: Action) -> DispatchResult;
}

/// RAII listener registration. Dropping the guard removes the listener.
pub struct Unsubscribe(Option<Box<dyn FnOnce()>>);

impl Unsubscribe {
    /// Wrap a teardown closure.
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(teardown)))
    }

    /// A guard that does nothing on drop.
    #[must_use]
    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(teardown) = self.0.take() {
            teardown();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unsubscribe")
            .field(&self.0.is_some())
            .finish()
    }
}

/// Wrap a value into a [`Snapshot`].
#[must_use]
pub fn snapshot<T: 'static>(value: T) -> Snapshot {
    Rc::new(value)
}

/// Identity comparison of two snapshots.
#[inline]
#[must_use]
pub fn same_snapshot(a: &Snapshot, b: &Snapshot) -> bool {
    same_rc(a, b)
}

/// Identity comparison of two store handles.
#[inline]
#[must_use]
pub fn same_store(a: &StoreRef, b: &StoreRef) -> bool {
    same_rc(a, b)
}

/// Build a [`Dispatch`] function bound to `store`.
#[must_use]
pub fn dispatcher(store: &StoreRef) -> Dispatch {
    let store = Rc::clone(store);
    Rc::new(move |action| store.dispatch(action))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
