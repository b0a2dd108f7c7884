//! The final-props selector: `(snapshot, own_props) -> Props`, memoized.
//!
//! # Design
//!
//! One [`FinalPropsSelector`] exists per connected instance. In pure mode it
//! carries a cache of the previous inputs and the three intermediate results
//! (state props, dispatch props, merged props) and recomputes only the
//! stages whose inputs changed, consulting the capability flags the wrapped
//! selectors declare. In impure mode it recomputes all three stages on every
//! call.
//!
//! # Invariants
//!
//! 1. Pure mode, both inputs unchanged: returns the cached merged handle
//!    without invoking any user projection.
//! 2. A new snapshot whose state props compare equal to the cached ones
//!    leaves the merged handle unchanged.
//! 3. A selector with `depends_on_own_props() == false` is never re-invoked
//!    for a props-only change.

use std::rc::Rc;

use propflow_core::error::Result;
use propflow_core::store::same_snapshot;
use propflow_core::{BindError, Dispatch, Props, Snapshot, shallow_equal};

use crate::wrap::{
    InitMapToProps, InitMergeProps, InitOptions, MapToProps, MergeFn, PropsEq, SnapshotEq,
};

/// Derives the final props for one connected instance.
pub trait PropsSelector {
    fn select(&mut self, state: &Snapshot, own_props: &Props) -> Props;
}

/// Builds the per-instance selector. The advanced binding seam: everything
/// above this type only ever sees `(snapshot, own_props) -> Props`.
pub type SelectorFactory =
    Rc<dyn Fn(Dispatch, &SelectorFactoryOptions) -> Result<Box<dyn PropsSelector>>>;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Everything a selector factory needs, fixed per binding.
#[derive(Clone)]
pub struct SelectorFactoryOptions {
    pub display_name: String,
    pub pure: bool,
    /// Snapshot identity by default; content equality is opt-in.
    pub are_states_equal: SnapshotEq,
    pub are_own_props_equal: PropsEq,
    pub are_state_props_equal: PropsEq,
    pub are_merged_props_equal: PropsEq,
    pub init_map_state: Option<InitMapToProps<Snapshot>>,
    pub init_map_dispatch: Option<InitMapToProps<Dispatch>>,
    pub init_merge_props: Option<InitMergeProps>,
}

impl SelectorFactoryOptions {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            pure: true,
            are_states_equal: Rc::new(same_snapshot),
            are_own_props_equal: Rc::new(shallow_equal),
            are_state_props_equal: Rc::new(shallow_equal),
            are_merged_props_equal: Rc::new(shallow_equal),
            init_map_state: None,
            init_map_dispatch: None,
            init_merge_props: None,
        }
    }

    fn init_options(&self) -> InitOptions {
        InitOptions {
            display_name: self.display_name.clone(),
            pure: self.pure,
            are_merged_props_equal: Rc::clone(&self.are_merged_props_equal),
        }
    }
}

// ─── FinalPropsSelector ──────────────────────────────────────────────────────

struct CacheEntry {
    state: Snapshot,
    own_props: Props,
    state_props: Props,
    dispatch_props: Props,
    merged_props: Props,
}

/// The standard [`PropsSelector`] implementation, assembled from wrapped
/// state/dispatch selectors and a merge step.
pub struct FinalPropsSelector {
    dispatch: Dispatch,
    map_state: MapToProps<Snapshot>,
    map_dispatch: MapToProps<Dispatch>,
    merge: MergeFn,
    pure: bool,
    are_states_equal: SnapshotEq,
    are_own_props_equal: PropsEq,
    are_state_props_equal: PropsEq,
    cache: Option<CacheEntry>,
}

impl std::fmt::Debug for FinalPropsSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalPropsSelector").finish_non_exhaustive()
    }
}

impl FinalPropsSelector {
    /// Run the three init functions and assemble the selector. Every init
    /// must be present; the binding front-end is responsible for filling in
    /// defaults before this point.
    pub fn new(dispatch: Dispatch, options: &SelectorFactoryOptions) -> Result<Self> {
        let init_options = options.init_options();
        let missing = |method: &'static str| BindError::MissingSelector {
            method,
            display_name: options.display_name.clone(),
        };

        let init_map_state = options
            .init_map_state
            .as_ref()
            .ok_or_else(|| missing("map_state_to_props"))?;
        let init_map_dispatch = options
            .init_map_dispatch
            .as_ref()
            .ok_or_else(|| missing("map_dispatch_to_props"))?;
        let init_merge = options
            .init_merge_props
            .as_ref()
            .ok_or_else(|| missing("merge_props"))?;

        let map_state = init_map_state(&dispatch, &init_options)?;
        let map_dispatch = init_map_dispatch(&dispatch, &init_options)?;
        let merge = init_merge(&dispatch, &init_options)?;

        if cfg!(debug_assertions) {
            for (method, undeclared) in [
                ("map_state_to_props", map_state.undeclared_factory()),
                ("map_dispatch_to_props", map_dispatch.undeclared_factory()),
            ] {
                if undeclared {
                    tracing::warn!(
                        target: "propflow::select",
                        display_name = %options.display_name,
                        method,
                        "factory projection has no explicit depends_on_own_props; \
                         assuming true until first call"
                    );
                }
            }
        }

        tracing::debug!(
            target: "propflow::select",
            display_name = %options.display_name,
            pure = options.pure,
            "selector initialized"
        );

        Ok(Self {
            dispatch,
            map_state,
            map_dispatch,
            merge,
            pure: options.pure,
            are_states_equal: Rc::clone(&options.are_states_equal),
            are_own_props_equal: Rc::clone(&options.are_own_props_equal),
            are_state_props_equal: Rc::clone(&options.are_state_props_equal),
            cache: None,
        })
    }

    /// The conventional factory wrapping [`FinalPropsSelector::new`].
    #[must_use]
    pub fn factory() -> SelectorFactory {
        Rc::new(|dispatch, options| {
            Ok(Box::new(FinalPropsSelector::new(dispatch, options)?) as Box<dyn PropsSelector>)
        })
    }

    fn first_call(&mut self, state: &Snapshot, own_props: &Props) -> CacheEntry {
        let state_props = self.map_state.select(state, own_props);
        let dispatch_props = self.map_dispatch.select(&self.dispatch, own_props);
        let merged_props = self.merge.merge(&state_props, &dispatch_props, own_props);
        CacheEntry {
            state: Rc::clone(state),
            own_props: own_props.clone(),
            state_props,
            dispatch_props,
            merged_props,
        }
    }

    /// Both inputs changed: recompute state props from both, dispatch props
    /// only if they read own props, then merge.
    fn new_props_and_state(&mut self, entry: &mut CacheEntry) {
        entry.state_props = self.map_state.select(&entry.state, &entry.own_props);
        if self.map_dispatch.depends_on_own_props() {
            entry.dispatch_props = self.map_dispatch.select(&self.dispatch, &entry.own_props);
        }
        entry.merged_props =
            self.merge
                .merge(&entry.state_props, &entry.dispatch_props, &entry.own_props);
    }

    /// Only own props changed: re-run each selector that reads own props,
    /// then merge unconditionally (own props feed the merge directly).
    fn new_props(&mut self, entry: &mut CacheEntry) {
        if self.map_state.depends_on_own_props() {
            entry.state_props = self.map_state.select(&entry.state, &entry.own_props);
        }
        if self.map_dispatch.depends_on_own_props() {
            entry.dispatch_props = self.map_dispatch.select(&self.dispatch, &entry.own_props);
        }
        entry.merged_props =
            self.merge
                .merge(&entry.state_props, &entry.dispatch_props, &entry.own_props);
    }

    /// Only the snapshot changed: recompute state props, and re-merge only
    /// when they actually differ from the cached ones.
    fn new_state(&mut self, entry: &mut CacheEntry) {
        let next_state_props = self.map_state.select(&entry.state, &entry.own_props);
        let state_props_changed =
            !(self.are_state_props_equal)(&next_state_props, &entry.state_props);
        entry.state_props = next_state_props;
        if state_props_changed {
            entry.merged_props =
                self.merge
                    .merge(&entry.state_props, &entry.dispatch_props, &entry.own_props);
        }
    }
}

impl PropsSelector for FinalPropsSelector {
    fn select(&mut self, state: &Snapshot, own_props: &Props) -> Props {
        if !self.pure {
            let state_props = self.map_state.select(state, own_props);
            let dispatch_props = self.map_dispatch.select(&self.dispatch, own_props);
            return self.merge.merge(&state_props, &dispatch_props, own_props);
        }

        let entry = match self.cache.take() {
            None => self.first_call(state, own_props),
            Some(mut entry) => {
                let props_changed = !(self.are_own_props_equal)(own_props, &entry.own_props);
                let state_changed = !(self.are_states_equal)(state, &entry.state);
                entry.state = Rc::clone(state);
                entry.own_props = own_props.clone();

                match (props_changed, state_changed) {
                    (true, true) => self.new_props_and_state(&mut entry),
                    (true, false) => self.new_props(&mut entry),
                    (false, true) => self.new_state(&mut entry),
                    (false, false) => {}
                }
                entry
            }
        };

        let merged = entry.merged_props.clone();
        self.cache = Some(entry);
        merged
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
