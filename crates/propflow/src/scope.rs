//! Distribution channel and scope.
//!
//! A [`Channel<T>`] is a typed key; a [`ChannelCell<T>`] is the
//! single-producer broadcast cell a provider publishes into; a [`Scope`] is
//! the chain of `(channel, cell)` bindings threaded down through component
//! construction. Consumers read the nearest enclosing binding for their
//! channel; a consumer with no enclosing producer gets an explicit "no
//! provider" signal rather than a silent default.
//!
//! # Design
//!
//! Subscribers are stored as `Weak` callbacks and pruned lazily during
//! notification. A [`ChannelSubscription`] is the RAII guard keeping a
//! callback alive; dropping it deactivates the callback before the next
//! notification cycle.
//!
//! # Invariants
//!
//! 1. `set` notifies every live subscriber exactly once, in registration
//!    order.
//! 2. A subscriber dropped during a notification cycle is skipped on the
//!    next cycle.
//! 3. Scope lookup walks outward and stops at the nearest binding for the
//!    requested channel id.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use propflow_core::{Snapshot, StoreRef};

// ─── Channel keys ────────────────────────────────────────────────────────────

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Typed key identifying one distribution channel.
///
/// Copyable; two copies of the same channel read the same producer. A fresh
/// `Channel::new()` never collides with any other channel.
pub struct Channel<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Channel<T> {
    /// Allocate a fresh channel key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// Unique identifier (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Channel<T> {}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Channel").field(&self.id).finish()
    }
}

/// The value a store provider distributes: the current snapshot plus the
/// store handle itself. Recreated (new value, not mutated) whenever either
/// part changes identity.
#[derive(Clone)]
pub struct StoreContext {
    pub snapshot: Snapshot,
    pub store: StoreRef,
}

/// The process-wide default channel store providers and connected
/// components agree on when no custom channel is supplied.
#[must_use]
pub fn default_store_channel() -> Channel<StoreContext> {
    static DEFAULT: OnceLock<Channel<StoreContext>> = OnceLock::new();
    *DEFAULT.get_or_init(Channel::new)
}

// ─── ChannelCell ─────────────────────────────────────────────────────────────

struct CellInner<T> {
    value: T,
    subscribers: Vec<Weak<dyn Fn()>>,
}

/// Single-producer broadcast cell. Cloning shares the same cell.
pub struct ChannelCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
}

impl<T> Clone for ChannelCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// RAII guard for a cell subscription. Dropping it deactivates the callback.
pub struct ChannelSubscription {
    _callback: Rc<dyn Fn()>,
}

impl<T: Clone + 'static> ChannelCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CellInner {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Read the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value and notify all live subscribers.
    ///
    /// The deciding logic (publish vs. skip) lives with the producer; the
    /// cell itself notifies unconditionally.
    pub fn set(&self, value: T) {
        // Snapshot live callbacks before invoking any of them, so a callback
        // may subscribe/unsubscribe without invalidating the iteration.
        let live: Vec<Rc<dyn Fn()>> = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.subscribers.retain(|weak| weak.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect()
        };
        for callback in live {
            callback();
        }
    }

    /// Register a change callback. The callback stays active for the
    /// lifetime of the returned guard.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> ChannelSubscription {
        let callback: Rc<dyn Fn()> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&callback));
        ChannelSubscription {
            _callback: callback,
        }
    }

    /// Number of currently live subscribers (diagnostics).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// One frame of channel bindings plus a parent pointer.
///
/// Scopes are immutable: a producer extends the chain with
/// [`Scope::with_channel`] and hands the new scope to its children. Nearest
/// enclosing binding wins.
pub struct Scope {
    binding: Option<(u64, Rc<dyn Any>)>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// The empty root scope (no producers).
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            binding: None,
            parent: None,
        })
    }

    /// Extend this scope with a binding for `channel`.
    #[must_use]
    pub fn with_channel<T: Clone + 'static>(
        self: &Rc<Self>,
        channel: Channel<T>,
        cell: ChannelCell<T>,
    ) -> Rc<Self> {
        Rc::new(Self {
            binding: Some((channel.id, Rc::new(cell))),
            parent: Some(Rc::clone(self)),
        })
    }

    /// Find the nearest enclosing cell for `channel`, or `None` when no
    /// producer is in scope.
    #[must_use]
    pub fn read<T: Clone + 'static>(&self, channel: Channel<T>) -> Option<ChannelCell<T>> {
        let mut scope = self;
        loop {
            if let Some((id, cell)) = &scope.binding
                && *id == channel.id
            {
                // The id is unique per channel, and the channel is typed, so
                // a matching id always holds a cell of the right type.
                return cell.downcast_ref::<ChannelCell<T>>().cloned();
            }
            match &scope.parent {
                Some(parent) => scope = parent,
                None => return None,
            }
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut depth = 0usize;
        let mut scope = self;
        while let Some(parent) = &scope.parent {
            depth += 1;
            scope = parent;
        }
        f.debug_struct("Scope").field("depth", &depth).finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn channels_are_unique() {
        let a = Channel::<u32>::new();
        let b = Channel::<u32>::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn default_store_channel_is_stable() {
        assert_eq!(default_store_channel().id(), default_store_channel().id());
    }

    #[test]
    fn cell_set_notifies_subscribers() {
        let cell = ChannelCell::new(0u32);
        let seen = Rc::new(Cell::new(0u32));
        let seen_in_cb = Rc::clone(&seen);
        let cell_in_cb = cell.clone();
        let _sub = cell.subscribe(move || seen_in_cb.set(cell_in_cb.get()));

        cell.set(7);
        assert_eq!(seen.get(), 7);
        assert_eq!(cell.get(), 7);
    }

    #[test]
    fn dropped_subscription_is_skipped() {
        let cell = ChannelCell::new(0u32);
        let calls = Rc::new(Cell::new(0u32));
        let calls_in_cb = Rc::clone(&calls);
        let sub = cell.subscribe(move || calls_in_cb.set(calls_in_cb.get() + 1));

        cell.set(1);
        assert_eq!(calls.get(), 1);

        drop(sub);
        cell.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_unsubscribe_during_notification() {
        let cell = ChannelCell::new(0u32);
        let slot: Rc<RefCell<Option<ChannelSubscription>>> = Rc::new(RefCell::new(None));
        let slot_in_cb = Rc::clone(&slot);
        let sub = cell.subscribe(move || {
            *slot_in_cb.borrow_mut() = None;
        });
        *slot.borrow_mut() = Some(sub);

        cell.set(1); // must not panic
        cell.set(2);
    }

    #[test]
    fn scope_read_without_producer_is_none() {
        let root = Scope::root();
        assert!(root.read(Channel::<u32>::new()).is_none());
    }

    #[test]
    fn nearest_producer_wins() {
        let channel = Channel::<u32>::new();
        let outer_cell = ChannelCell::new(1u32);
        let inner_cell = ChannelCell::new(2u32);

        let root = Scope::root();
        let outer = root.with_channel(channel, outer_cell);
        let inner = outer.with_channel(channel, inner_cell);

        assert_eq!(outer.read(channel).unwrap().get(), 1);
        assert_eq!(inner.read(channel).unwrap().get(), 2);
    }

    #[test]
    fn distinct_channels_do_not_shadow() {
        let a = Channel::<u32>::new();
        let b = Channel::<u32>::new();
        let root = Scope::root();
        let scope = root
            .with_channel(a, ChannelCell::new(10u32))
            .with_channel(b, ChannelCell::new(20u32));

        assert_eq!(scope.read(a).unwrap().get(), 10);
        assert_eq!(scope.read(b).unwrap().get(), 20);
    }

    #[test]
    fn consumers_see_updates_through_the_scope() {
        let channel = Channel::<u32>::new();
        let cell = ChannelCell::new(1u32);
        let scope = Scope::root().with_channel(channel, cell.clone());

        let reader = scope.read(channel).unwrap();
        cell.set(42);
        assert_eq!(reader.get(), 42);
    }
}
