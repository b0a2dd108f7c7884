//! The public binding entry point: wrap a component so it receives props
//! derived from shared state.
//!
//! # Design
//!
//! [`connect`] resolves the three projection arguments into init functions,
//! validates options, and returns a [`Connector`]; [`Connector::wrap`] then
//! produces one wrapper spec per wrapped component. [`bind_advanced`] is the
//! lower-level seam the default path wires through: it accepts any
//! [`SelectorFactory`] and performs no projection handling of its own.
//!
//! The mounted wrapper reads the store context cell from its scope (a
//! missing producer is a hard error at first mount) and subscribes its
//! invalidate hook directly to the cell, so a context change re-renders the
//! consumer even when intermediate nodes bailed out of the update. Each
//! render derives props through a per-instance memo chain:
//!
//! 1. outer guard — under pure mode, identical `(snapshot, own props)`
//!    handles return the last derived props without touching the pipeline;
//! 2. store-identity guard — a changed store rebuilds the selector against
//!    the new store's dispatch;
//! 3. the final-props selector;
//! 4. child-element memo — an identity-unchanged derived handle returns the
//!    cached child element, letting the host skip the wrapped subtree.

use std::rc::Rc;

use propflow_core::error::Result;
use propflow_core::store::{dispatcher, same_snapshot, same_store};
use propflow_core::{BindError, Dispatch, PropMap, PropValue, Props, Snapshot, StoreRef};

use crate::component::{ComponentSpec, Element, Invalidate, Mounted, RefSlot, Rendered};
use crate::scope::{Channel, ChannelCell, ChannelSubscription, Scope, StoreContext, default_store_channel};
use crate::select::{
    FinalPropsSelector, PropsSelector, SelectorFactory, SelectorFactoryOptions,
};
use crate::wrap::{
    InitMapToProps, InitMergeProps, MapDispatch, MergeFn, MergeProjection, PropsEq, SnapshotEq,
    StateProjection, bind_action_creators, init_constant, init_proxy,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Options accepted by [`connect`] and [`bind_advanced`].
pub struct ConnectOptions {
    /// Memoize the whole pipeline on input identity (default).
    pub pure: bool,
    pub are_states_equal: Option<SnapshotEq>,
    pub are_own_props_equal: Option<PropsEq>,
    pub are_state_props_equal: Option<PropsEq>,
    pub are_merged_props_equal: Option<PropsEq>,
    /// Custom distribution channel; the process-wide default otherwise.
    pub context: Option<Channel<StoreContext>>,
    /// Re-emit the wrapper's incoming ref slot on the wrapped child.
    pub forward_ref: bool,
    /// Passthrough bag for downstream tooling. Removed legacy keys are
    /// rejected here with a migration hint.
    pub extra: PropMap,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            pure: true,
            are_states_equal: None,
            are_own_props_equal: None,
            are_state_props_equal: None,
            are_merged_props_equal: None,
            context: None,
            forward_ref: false,
            extra: PropMap::new(),
        }
    }
}

const REMOVED_OPTIONS: &[(&str, &str)] = &[
    ("storeKey", "pass a custom channel in `context` instead"),
    ("withRef", "use `forward_ref` to access the wrapped instance"),
    ("renderCountProp", "render diagnostics are emitted as tracing events"),
];

fn validate_extra(extra: &PropMap) -> Result<()> {
    for (key, hint) in REMOVED_OPTIONS {
        if extra.contains_key(key) {
            return Err(BindError::RemovedOption {
                key: (*key).to_owned(),
                hint,
            });
        }
    }
    Ok(())
}

// ─── Projection matching ─────────────────────────────────────────────────────

// Candidates are ordered most-specific-first; the enum front-end leaves no
// unrecognized shape, so the hard `InvalidProjection` arm only fires for
// arguments arriving through dynamic props (see the provider).

fn match_map_state(map_state: Option<StateProjection>) -> InitMapToProps<Snapshot> {
    match map_state {
        Some(projection) => init_proxy(projection),
        None => init_constant(|_, _| PropMap::new()),
    }
}

fn match_map_dispatch(map_dispatch: Option<MapDispatch>) -> InitMapToProps<Dispatch> {
    match map_dispatch {
        Some(MapDispatch::Projection(projection)) => init_proxy(projection),
        Some(MapDispatch::ActionCreators(creators)) => {
            init_constant(move |dispatch, _| bind_action_creators(&creators, dispatch))
        }
        None => init_constant(|dispatch, _| {
            let mut map = PropMap::new();
            // `Dispatch` already has the action-callback shape.
            map.insert("dispatch", PropValue::Action(Rc::clone(dispatch)));
            map
        }),
    }
}

fn match_merge(merge: Option<MergeProjection>) -> InitMergeProps {
    match merge {
        Some(f) => Rc::new(move |_dispatch, options| Ok(MergeFn::custom(Rc::clone(&f), options))),
        None => Rc::new(|_dispatch, _options| Ok(MergeFn::Default)),
    }
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// A configured binding, ready to wrap components.
pub struct Connector {
    selector_factory: SelectorFactory,
    template: SelectorFactoryOptions,
    context: Option<Channel<StoreContext>>,
    forward_ref: bool,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").finish_non_exhaustive()
    }
}

/// The lower-level binding entry: bring your own selector factory.
pub fn bind_advanced(
    selector_factory: SelectorFactory,
    options: ConnectOptions,
) -> Result<Connector> {
    validate_extra(&options.extra)?;
    let mut template = SelectorFactoryOptions::new(String::new());
    template.pure = options.pure;
    if let Some(eq) = options.are_states_equal {
        template.are_states_equal = eq;
    }
    if let Some(eq) = options.are_own_props_equal {
        template.are_own_props_equal = eq;
    }
    if let Some(eq) = options.are_state_props_equal {
        template.are_state_props_equal = eq;
    }
    if let Some(eq) = options.are_merged_props_equal {
        template.are_merged_props_equal = eq;
    }
    Ok(Connector {
        selector_factory,
        template,
        context: options.context,
        forward_ref: options.forward_ref,
    })
}

/// Build a binding from up to three projections.
///
/// Absent projections fall back to: empty state props, a single
/// `"dispatch"` prop, the default merge.
pub fn connect(
    map_state: Option<StateProjection>,
    map_dispatch: Option<impl Into<MapDispatch>>,
    merge: Option<MergeProjection>,
    options: ConnectOptions,
) -> Result<Connector> {
    let mut connector = bind_advanced(FinalPropsSelector::factory(), options)?;
    connector.template.init_map_state = Some(match_map_state(map_state));
    connector.template.init_map_dispatch =
        Some(match_map_dispatch(map_dispatch.map(Into::into)));
    connector.template.init_merge_props = Some(match_merge(merge));
    Ok(connector)
}

impl Connector {
    /// Produce the wrapper spec for `inner`: display name
    /// `Connect(<inner>)`, inner statics copied onto the wrapper.
    #[must_use]
    pub fn wrap(&self, inner: Rc<dyn ComponentSpec>) -> Rc<ConnectSpec> {
        let display_name = format!("Connect({})", inner.display_name());
        let mut selector_options = self.template.clone();
        selector_options.display_name = display_name.clone();
        Rc::new(ConnectSpec {
            statics: inner.statics().cloned(),
            inner,
            display_name,
            selector_factory: Rc::clone(&self.selector_factory),
            selector_options,
            channel: self.context.unwrap_or_else(default_store_channel),
            forward_ref: self.forward_ref,
            pure: self.template.pure,
        })
    }
}

// ─── Wrapper spec ────────────────────────────────────────────────────────────

/// The wrapper component spec produced by [`Connector::wrap`].
pub struct ConnectSpec {
    inner: Rc<dyn ComponentSpec>,
    display_name: String,
    statics: Option<PropMap>,
    selector_factory: SelectorFactory,
    selector_options: SelectorFactoryOptions,
    channel: Channel<StoreContext>,
    forward_ref: bool,
    pure: bool,
}

impl ConnectSpec {
    /// The wrapped component spec.
    #[must_use]
    pub fn wrapped(&self) -> &Rc<dyn ComponentSpec> {
        &self.inner
    }
}

impl ComponentSpec for ConnectSpec {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn statics(&self) -> Option<&PropMap> {
        self.statics.as_ref()
    }

    fn mount(
        &self,
        props: Props,
        scope: Rc<Scope>,
        invalidate: Invalidate,
        ref_slot: Option<RefSlot>,
    ) -> Result<Box<dyn Mounted>> {
        let Some(cell) = scope.read(self.channel) else {
            return Err(BindError::NoProvider {
                display_name: self.display_name.clone(),
            });
        };
        let ctx = cell.get();
        let selector = (self.selector_factory)(dispatcher(&ctx.store), &self.selector_options)?;

        // Subscribing the invalidate hook straight to the cell means a
        // context change reaches this consumer even when every intermediate
        // node bailed out of the update.
        let subscription = cell.subscribe(move || invalidate());
        tracing::debug!(
            target: "propflow::connect",
            display_name = %self.display_name,
            "consumer subscribed to store context"
        );

        Ok(Box::new(MountedConnect {
            inner: Rc::clone(&self.inner),
            cell,
            subscription: Some(subscription),
            selector,
            store: ctx.store,
            selector_factory: Rc::clone(&self.selector_factory),
            selector_options: self.selector_options.clone(),
            own_props: props,
            pure: self.pure,
            forward_ref: self.forward_ref,
            ref_slot,
            last_state: None,
            last_own_props: None,
            last_derived: None,
            last_child: None,
        }))
    }
}

// ─── Mounted wrapper ─────────────────────────────────────────────────────────

struct MountedConnect {
    inner: Rc<dyn ComponentSpec>,
    cell: ChannelCell<StoreContext>,
    subscription: Option<ChannelSubscription>,
    selector: Box<dyn PropsSelector>,
    store: StoreRef,
    selector_factory: SelectorFactory,
    selector_options: SelectorFactoryOptions,
    own_props: Props,
    pure: bool,
    forward_ref: bool,
    ref_slot: Option<RefSlot>,
    last_state: Option<Snapshot>,
    last_own_props: Option<Props>,
    last_derived: Option<Props>,
    last_child: Option<Element>,
}

impl MountedConnect {
    fn derive(&mut self, state: &Snapshot) -> Props {
        if self.pure
            && let (Some(last_state), Some(last_own), Some(last_derived)) =
                (&self.last_state, &self.last_own_props, &self.last_derived)
            && same_snapshot(last_state, state)
            && Props::same(last_own, &self.own_props)
        {
            tracing::trace!(target: "propflow::connect", "inputs unchanged, derivation skipped");
            return last_derived.clone();
        }

        let derived = self.selector.select(state, &self.own_props);
        self.last_state = Some(Rc::clone(state));
        self.last_own_props = Some(self.own_props.clone());
        self.last_derived = Some(derived.clone());
        derived
    }
}

impl Mounted for MountedConnect {
    fn update(&mut self, next_props: Props) {
        self.own_props = next_props;
    }

    fn render(&mut self) -> Result<Rendered> {
        let ctx = self.cell.get();
        if !same_store(&ctx.store, &self.store) {
            tracing::debug!(
                target: "propflow::connect",
                display_name = %self.selector_options.display_name,
                "store changed, rebuilding selector"
            );
            self.selector =
                (self.selector_factory)(dispatcher(&ctx.store), &self.selector_options)?;
            self.store = Rc::clone(&ctx.store);
            self.last_state = None;
            self.last_derived = None;
        }

        let derived = self.derive(&ctx.snapshot);

        // Same derived handle: hand the host the cached child element so it
        // can skip the wrapped subtree entirely.
        if let Some(child) = &self.last_child
            && Props::same(&child.props, &derived)
        {
            return Ok(Rendered::child(child.clone()));
        }

        let mut child = Element::new(Rc::clone(&self.inner), derived);
        if self.forward_ref
            && let Some(slot) = &self.ref_slot
        {
            child = child.with_ref(Rc::clone(slot));
        }
        self.last_child = Some(child.clone());
        Ok(Rendered::child(child))
    }

    fn detach(&mut self) {
        self.subscription = None;
        self.last_child = None;
        tracing::debug!(target: "propflow::connect", "consumer unsubscribed from store context");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
