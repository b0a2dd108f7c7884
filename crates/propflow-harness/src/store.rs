//! An in-memory reducer store.
//!
//! A test double, not a store implementation: it notifies every listener on
//! every dispatch, leaving identity filtering to the subscription component
//! under test. The listener list is snapshot-cloned before notification so
//! callbacks may subscribe or unsubscribe freely.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use propflow_core::store::{Action, DispatchResult, Snapshot, Store, StoreRef, Unsubscribe};

/// `(state, action) -> state`. Returning a clone of the incoming `Rc`
/// signals "unchanged" to identity-based consumers.
pub type Reducer = Rc<dyn Fn(&Snapshot, &dyn Any) -> Snapshot>;

pub struct MemoryStore {
    state: RefCell<Snapshot>,
    reducer: Reducer,
    listeners: Rc<RefCell<Vec<(u64, Rc<dyn Fn()>)>>>,
    next_listener_id: Cell<u64>,
}

impl MemoryStore {
    pub fn new(
        initial: Snapshot,
        reducer: impl Fn(&Snapshot, &dyn Any) -> Snapshot + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(initial),
            reducer: Rc::new(reducer),
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_listener_id: Cell::new(0),
        })
    }

    /// The trait-object handle consumed by the binding layer.
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> StoreRef {
        Rc::clone(self) as StoreRef
    }

    /// Swap the state without going through the reducer, then notify.
    pub fn replace_state(&self, next: Snapshot) {
        *self.state.borrow_mut() = next;
        self.notify();
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn notify(&self) {
        let live: Vec<Rc<dyn Fn()>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        tracing::trace!(target: "propflow::harness", listeners = live.len(), "notifying");
        for listener in live {
            listener();
        }
    }
}

impl Store for MemoryStore {
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        let listeners = Rc::clone(&self.listeners);
        Unsubscribe::new(move || {
            listeners.borrow_mut().retain(|(entry, _)| *entry != id);
        })
    }

    fn get_state(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    fn dispatch(&self, action: Action) -> DispatchResult {
        let next = {
            let current = self.state.borrow();
            (self.reducer)(&current, action.as_ref())
        };
        *self.state.borrow_mut() = next;
        self.notify();
        action
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use propflow_core::store::{same_snapshot, snapshot};

    fn counter() -> Rc<MemoryStore> {
        MemoryStore::new(snapshot(0u32), |state, action| {
            let n = *state.downcast_ref::<u32>().unwrap();
            match action.downcast_ref::<&str>() {
                Some(&"inc") => snapshot(n + 1),
                _ => Rc::clone(state),
            }
        })
    }

    #[test]
    fn dispatch_runs_reducer_and_returns_action() {
        let store = counter();
        let result = store.dispatch(Box::new("inc"));
        assert_eq!(*result.downcast::<&str>().unwrap(), "inc");
        assert_eq!(*store.get_state().downcast_ref::<u32>().unwrap(), 1);
    }

    #[test]
    fn unknown_action_keeps_state_identity() {
        let store = counter();
        let before = store.get_state();
        store.dispatch(Box::new("noop"));
        assert!(same_snapshot(&before, &store.get_state()));
    }

    #[test]
    fn every_dispatch_notifies_even_without_change() {
        let store = counter();
        let calls = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&calls);
        let _guard = store.subscribe(Rc::new(move || count.set(count.get() + 1)));

        store.dispatch(Box::new("noop"));
        store.dispatch(Box::new("inc"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dropping_the_guard_unsubscribes() {
        let store = counter();
        let calls = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&calls);
        let guard = store.subscribe(Rc::new(move || count.set(count.get() + 1)));
        assert_eq!(store.listener_count(), 1);

        drop(guard);
        assert_eq!(store.listener_count(), 0);
        store.dispatch(Box::new("inc"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let store = counter();
        let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let guard = store.subscribe(Rc::new(move || {
            *inner.borrow_mut() = None;
        }));
        *slot.borrow_mut() = Some(guard);

        store.dispatch(Box::new("inc")); // must not panic
        assert_eq!(store.listener_count(), 0);
    }
}
