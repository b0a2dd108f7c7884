#![forbid(unsafe_code)]

//! Propflow: a state-propagation binding layer between a centralized,
//! immutable store and a declarative component tree.
//!
//! The layer does four things:
//!
//! 1. Distributes a `{snapshot, store}` pair from one [`Provider`] down to
//!    any depth of descendant through a [`scope::Channel`], without prop
//!    threading.
//! 2. Lets leaf components declare pure projections from shared state (plus
//!    their own props) to exactly the props they need.
//! 3. Re-runs those projections only when an input actually changed, via the
//!    memoizing [`select::FinalPropsSelector`] pipeline.
//! 4. Skips downstream re-renders entirely when the derived props handle is
//!    referentially unchanged.
//!
//! # Architecture
//!
//! Leaves first: [`propflow_core`] supplies prop maps and equality;
//! [`wrap`] normalizes user projections into selectors with a stable
//! `depends_on_own_props` flag; [`select`] is the memoization state machine;
//! [`provider`] owns the store subscription and republishes snapshots;
//! [`connect`] is the public wrapper factory tying it all together against
//! the minimal component contract in [`component`].

pub mod component;
pub mod connect;
pub mod provider;
pub mod scope;
pub mod select;
pub mod wrap;

pub use component::{ComponentSpec, Element, InstanceHandle, Invalidate, Mounted, RefSlot, Rendered};
pub use connect::{ConnectOptions, ConnectSpec, Connector, bind_advanced, connect};
pub use provider::Provider;
pub use scope::{Channel, ChannelCell, Scope, StoreContext, default_store_channel};
pub use select::{FinalPropsSelector, PropsSelector, SelectorFactoryOptions};
pub use wrap::{
    ActionCreatorMap, DispatchProjection, MapDispatch, MergeProjection, Outcome, Projection,
    StateProjection, bind_action_creators,
};

pub use propflow_core as core;
pub use propflow_core::{BindError, PropMap, PropValue, Props, shallow_equal};
