//! The subscription component: owns the store subscription and republishes
//! snapshots into a channel cell for descendants.
//!
//! # Design
//!
//! A mounted provider is the only part of the layer that subscribes to the
//! store. It captures `get_state()` at mount, publishes
//! `StoreContext { snapshot, store }` into a fresh [`ChannelCell`], and
//! renders its child under a scope extended with that cell. The store
//! listener republishes only when the snapshot identity moved; consumers
//! subscribed to the cell decide for themselves what to recompute.
//!
//! # Invariants
//!
//! 1. Exactly one live store subscription exists per mounted provider.
//! 2. A notification arriving after detach is a no-op: the lifecycle flag
//!    flips before the unsubscribe guard drops.
//! 3. Immediately after subscribing, the provider re-checks `get_state()`
//!    and republishes if the state moved between initial capture and
//!    subscription establishment.

use std::cell::Cell;
use std::rc::Rc;

use propflow_core::error::Result;
use propflow_core::store::{Unsubscribe, same_snapshot, same_store};
use propflow_core::{BindError, PropMap, PropValue, Props, StoreRef};

use crate::component::{ComponentSpec, Element, Invalidate, Mounted, RefSlot, Rendered};
use crate::scope::{Channel, ChannelCell, Scope, StoreContext, default_store_channel};

const PROP_STORE: &str = "store";
const PROP_CHILD: &str = "child";

/// Component spec distributing a store to a subtree.
pub struct Provider {
    channel: Channel<StoreContext>,
}

impl Provider {
    /// A provider publishing on the process-wide default channel.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_channel(default_store_channel())
    }

    /// A provider publishing on a custom channel. Consumers must be
    /// configured with the same channel to see it.
    #[must_use]
    pub fn with_channel(channel: Channel<StoreContext>) -> Rc<Self> {
        Rc::new(Self { channel })
    }

    /// The channel this provider publishes on.
    #[must_use]
    pub fn channel(&self) -> Channel<StoreContext> {
        self.channel
    }

    /// Build an element mounting this provider around `child`.
    #[must_use]
    pub fn element(self: &Rc<Self>, store: StoreRef, child: Element) -> Element {
        let mut props = PropMap::new();
        props.insert(PROP_STORE, PropValue::data(store));
        props.insert(PROP_CHILD, PropValue::data(child));
        Element::new(Rc::clone(self) as Rc<dyn ComponentSpec>, props)
    }
}

impl ComponentSpec for Provider {
    fn display_name(&self) -> &str {
        "Provider"
    }

    fn mount(
        &self,
        props: Props,
        scope: Rc<Scope>,
        _invalidate: Invalidate,
        _ref_slot: Option<RefSlot>,
    ) -> Result<Box<dyn Mounted>> {
        let (store, child) = extract(&props)?;
        let cell = ChannelCell::new(StoreContext {
            snapshot: store.get_state(),
            store: Rc::clone(&store),
        });
        let child_scope = scope.with_channel(self.channel, cell.clone());
        Ok(Box::new(MountedProvider {
            store,
            cell,
            child_scope,
            child,
            lifecycle: Rc::new(Cell::new(Lifecycle::Active)),
            subscription: None,
        }))
    }
}

fn extract(props: &Props) -> Result<(StoreRef, Element)> {
    let absent = |method: &'static str| BindError::InvalidProjection {
        method,
        received: "absent prop".into(),
        display_name: "Provider".into(),
    };
    let store = props
        .get_data::<StoreRef>(PROP_STORE)
        .cloned()
        .ok_or_else(|| absent(PROP_STORE))?;
    let child = props
        .get_data::<Element>(PROP_CHILD)
        .cloned()
        .ok_or_else(|| absent(PROP_CHILD))?;
    Ok((store, child))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Detached,
}

struct MountedProvider {
    store: StoreRef,
    cell: ChannelCell<StoreContext>,
    child_scope: Rc<Scope>,
    child: Element,
    lifecycle: Rc<Cell<Lifecycle>>,
    subscription: Option<Unsubscribe>,
}

/// Publish the store's current snapshot unless the cell already holds it.
fn publish_if_changed(cell: &ChannelCell<StoreContext>, store: &StoreRef) {
    let next = store.get_state();
    let changed = cell.with(|ctx| !same_snapshot(&ctx.snapshot, &next) || !same_store(&ctx.store, store));
    if changed {
        tracing::trace!(target: "propflow::provider", "publishing new store context");
        cell.set(StoreContext {
            snapshot: next,
            store: Rc::clone(store),
        });
    } else {
        tracing::trace!(target: "propflow::provider", "snapshot unchanged, publish skipped");
    }
}

fn make_listener(
    store: &StoreRef,
    cell: &ChannelCell<StoreContext>,
    lifecycle: &Rc<Cell<Lifecycle>>,
) -> Rc<dyn Fn()> {
    let store = Rc::clone(store);
    let cell = cell.clone();
    let lifecycle = Rc::clone(lifecycle);
    Rc::new(move || {
        if lifecycle.get() == Lifecycle::Detached {
            return;
        }
        publish_if_changed(&cell, &store);
    })
}

impl Mounted for MountedProvider {
    fn attach(&mut self) {
        let listener = make_listener(&self.store, &self.cell, &self.lifecycle);
        self.subscription = Some(self.store.subscribe(listener));
        tracing::debug!(target: "propflow::provider", "store subscription established");
        // The state may have moved between mount and attach.
        publish_if_changed(&self.cell, &self.store);
    }

    fn update(&mut self, next_props: Props) {
        let Ok((store, child)) = extract(&next_props) else {
            tracing::warn!(target: "propflow::provider", "update props missing store or child, ignored");
            return;
        };
        self.child = child;
        if same_store(&self.store, &store) {
            return;
        }
        tracing::debug!(target: "propflow::provider", "store handle changed, rebinding subscription");
        // Old guard drops (and unsubscribes) before the new one is taken.
        let was_subscribed = self.subscription.take().is_some();
        self.store = store;
        if was_subscribed {
            let listener = make_listener(&self.store, &self.cell, &self.lifecycle);
            self.subscription = Some(self.store.subscribe(listener));
        }
        publish_if_changed(&self.cell, &self.store);
    }

    fn render(&mut self) -> Result<Rendered> {
        Ok(Rendered::child_in_scope(
            self.child.clone(),
            Rc::clone(&self.child_scope),
        ))
    }

    fn detach(&mut self) {
        // Flip before the guard drops so an in-flight notification from the
        // teardown path is a no-op.
        self.lifecycle.set(Lifecycle::Detached);
        self.subscription = None;
        tracing::debug!(target: "propflow::provider", "store subscription torn down");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
