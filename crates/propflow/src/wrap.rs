//! Selector wrapping: turning user-supplied projections into normalized
//! selectors with a stable `depends_on_own_props` flag.
//!
//! # Design
//!
//! A raw [`Projection`] is a tagged variant: its declared parameter shape is
//! captured at registration, so whether it depends on the component's own
//! props is decided by the variant (plus an optional explicit override),
//! never by runtime introspection.
//!
//! A normalized [`MapToProps`] selector starts `Unresolved` and finalizes on
//! its first invocation. If a `Factory` projection's first call returns
//! another projection, that replacement becomes the permanent delegate and
//! the depends flag is re-derived from it before being used. Resolution
//! happens exactly once; it is never re-triggered.
//!
//! # Invariants
//!
//! 1. `depends_on_own_props()` is `true` while unresolved (conservative) and
//!    stable for the selector's remaining lifetime once resolved.
//! 2. A constant selector returns the same [`Props`] handle on every call.
//! 3. Merge memoization (custom merge, pure mode) preserves the cached
//!    handle whenever the fresh result compares equal.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use propflow_core::error::Result;
use propflow_core::{Action, Dispatch, PropMap, PropValue, Props, Snapshot};

// ─── Equality predicates ─────────────────────────────────────────────────────

pub type SnapshotEq = Rc<dyn Fn(&Snapshot, &Snapshot) -> bool>;
pub type PropsEq = Rc<dyn Fn(&Props, &Props) -> bool>;

/// Options handed to selector init functions, once per binding instance.
#[derive(Clone)]
pub struct InitOptions {
    pub display_name: String,
    pub pure: bool,
    pub are_merged_props_equal: PropsEq,
}

/// Builds a normalized selector for one binding instance.
pub type InitMapToProps<A> = Rc<dyn Fn(&Dispatch, &InitOptions) -> Result<MapToProps<A>>>;

/// Builds the merge step for one binding instance.
pub type InitMergeProps = Rc<dyn Fn(&Dispatch, &InitOptions) -> Result<MergeFn>>;

// ─── Raw projections ─────────────────────────────────────────────────────────

/// First-call result of a `Factory` projection: either a props mapping, or a
/// replacement projection that becomes the permanent delegate.
pub enum Outcome<A> {
    Props(PropMap),
    Projection(Projection<A>),
}

#[derive(Clone)]
enum ProjectionKind<A> {
    /// Depends only on the source argument (state or dispatch).
    Arg(Rc<dyn Fn(&A) -> PropMap>),
    /// Depends on the source argument and the component's own props.
    ArgAndProps(Rc<dyn Fn(&A, &Props) -> PropMap>),
    /// Resolved on first call; may yield a replacement projection.
    Factory(Rc<dyn Fn(&A, &Props) -> Outcome<A>>),
}

/// A raw user projection with its declared parameter shape.
#[derive(Clone)]
pub struct Projection<A> {
    kind: ProjectionKind<A>,
    depends_override: Option<bool>,
}

/// Projection from the state snapshot.
pub type StateProjection = Projection<Snapshot>;

/// Projection from the dispatch function.
pub type DispatchProjection = Projection<Dispatch>;

impl<A: 'static> Projection<A> {
    /// A projection of the source argument alone (`depends_on_own_props`
    /// defaults to `false`).
    pub fn from_arg(f: impl Fn(&A) -> PropMap + 'static) -> Self {
        Self {
            kind: ProjectionKind::Arg(Rc::new(f)),
            depends_override: None,
        }
    }

    /// A projection of the source argument and own props
    /// (`depends_on_own_props` defaults to `true`).
    pub fn from_arg_and_props(f: impl Fn(&A, &Props) -> PropMap + 'static) -> Self {
        Self {
            kind: ProjectionKind::ArgAndProps(Rc::new(f)),
            depends_override: None,
        }
    }

    /// A factory projection, resolved on first call.
    pub fn factory(f: impl Fn(&A, &Props) -> Outcome<A> + 'static) -> Self {
        Self {
            kind: ProjectionKind::Factory(Rc::new(f)),
            depends_override: None,
        }
    }

    /// Explicitly override the declared `depends_on_own_props` flag.
    #[must_use]
    pub fn with_depends_on_own_props(mut self, flag: bool) -> Self {
        self.depends_override = Some(flag);
        self
    }

    fn declared_depends_on_own_props(&self) -> bool {
        self.depends_override.unwrap_or(match self.kind {
            ProjectionKind::Arg(_) => false,
            ProjectionKind::ArgAndProps(_) | ProjectionKind::Factory(_) => true,
        })
    }

    /// Human-readable shape, for error messages.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self.kind {
            ProjectionKind::Arg(_) => "single-argument function",
            ProjectionKind::ArgAndProps(_) => "two-argument function",
            ProjectionKind::Factory(_) => "factory function",
        }
    }
}

impl Projection<Snapshot> {
    pub fn from_state(f: impl Fn(&Snapshot) -> PropMap + 'static) -> Self {
        Self::from_arg(f)
    }

    pub fn from_state_and_props(f: impl Fn(&Snapshot, &Props) -> PropMap + 'static) -> Self {
        Self::from_arg_and_props(f)
    }
}

impl Projection<Dispatch> {
    pub fn from_dispatch(f: impl Fn(&Dispatch) -> PropMap + 'static) -> Self {
        Self::from_arg(f)
    }

    pub fn from_dispatch_and_props(f: impl Fn(&Dispatch, &Props) -> PropMap + 'static) -> Self {
        Self::from_arg_and_props(f)
    }
}

// ─── Action-creator shorthand ────────────────────────────────────────────────

/// Builds an action from an opaque payload.
pub type ActionCreator = Rc<dyn Fn(Box<dyn Any>) -> Action>;

/// The plain-mapping shorthand for the dispatch projection: a keyed set of
/// action creators, each rebound through the instance's dispatch.
#[derive(Clone, Default)]
pub struct ActionCreatorMap {
    entries: Vec<(&'static str, ActionCreator)>,
}

impl ActionCreatorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &'static str, creator: impl Fn(Box<dyn Any>) -> Action + 'static) {
        self.entries.push((key, Rc::new(creator)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ActionCreator)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

/// Rebind every creator through `dispatch`: invoking a bound entry
/// dispatches the created action and returns dispatch's result.
#[must_use]
pub fn bind_action_creators(creators: &ActionCreatorMap, dispatch: &Dispatch) -> PropMap {
    let mut map = PropMap::new();
    for (key, creator) in creators.iter() {
        let creator = Rc::clone(creator);
        let dispatch = Rc::clone(dispatch);
        map.insert(
            key,
            PropValue::action(move |payload| dispatch(creator(payload))),
        );
    }
    map
}

/// The dispatch-projection argument accepts either shape.
pub enum MapDispatch {
    Projection(DispatchProjection),
    ActionCreators(ActionCreatorMap),
}

impl MapDispatch {
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Projection(p) => p.variant_name(),
            Self::ActionCreators(_) => "action-creator mapping",
        }
    }
}

impl From<DispatchProjection> for MapDispatch {
    fn from(projection: DispatchProjection) -> Self {
        Self::Projection(projection)
    }
}

impl From<ActionCreatorMap> for MapDispatch {
    fn from(creators: ActionCreatorMap) -> Self {
        Self::ActionCreators(creators)
    }
}

// ─── Normalized selectors ────────────────────────────────────────────────────

enum Proxy<A> {
    /// Always returns the same handle; never depends on own props.
    Constant(Props),
    /// Not yet invoked; depends flag is provisional.
    Unresolved(Projection<A>),
    /// Finalized delegate; depends flag is stable from here on.
    Resolved {
        delegate: ProjectionKind<A>,
        depends_on_own_props: bool,
    },
}

/// A normalized selector: `(source, own_props) -> Props` with a
/// `depends_on_own_props` capability flag.
pub struct MapToProps<A> {
    proxy: RefCell<Proxy<A>>,
}

impl<A: Clone + 'static> MapToProps<A> {
    /// A selector that returns `props` (same handle) on every call.
    #[must_use]
    pub fn constant(props: Props) -> Self {
        Self {
            proxy: RefCell::new(Proxy::Constant(props)),
        }
    }

    /// A proxy selector that resolves `projection` on first invocation.
    #[must_use]
    pub fn proxied(projection: Projection<A>) -> Self {
        Self {
            proxy: RefCell::new(Proxy::Unresolved(projection)),
        }
    }

    /// Whether this selector reads the component's own props. Conservative
    /// (`true`) until the proxy resolves; stable afterwards.
    #[must_use]
    pub fn depends_on_own_props(&self) -> bool {
        match &*self.proxy.borrow() {
            Proxy::Constant(_) => false,
            Proxy::Unresolved(_) => true,
            Proxy::Resolved {
                depends_on_own_props,
                ..
            } => *depends_on_own_props,
        }
    }

    /// Whether the depends flag is still provisional (never invoked).
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        matches!(&*self.proxy.borrow(), Proxy::Unresolved(_))
    }

    /// An unresolved factory with no explicit depends override: the flag is
    /// a guess until the first call resolves it.
    #[must_use]
    pub fn undeclared_factory(&self) -> bool {
        match &*self.proxy.borrow() {
            Proxy::Unresolved(projection) => {
                matches!(projection.kind, ProjectionKind::Factory(_))
                    && projection.depends_override.is_none()
            }
            _ => false,
        }
    }

    /// Run the selector. The first call finalizes the delegate and the
    /// depends flag; later calls go straight to the delegate.
    pub fn select(&self, arg: &A, own_props: &Props) -> Props {
        enum Plan<A> {
            Done(Props),
            Call(ProjectionKind<A>),
            Resolve(Projection<A>),
        }

        // Clone the plan out so user projections run without the proxy
        // borrowed (a projection may dispatch, which can re-enter rendering).
        let plan = match &*self.proxy.borrow() {
            Proxy::Constant(props) => Plan::Done(props.clone()),
            Proxy::Resolved { delegate, .. } => Plan::Call(delegate.clone()),
            Proxy::Unresolved(projection) => Plan::Resolve(projection.clone()),
        };

        match plan {
            Plan::Done(props) => props,
            Plan::Call(delegate) => call_delegate(&delegate, arg, own_props),
            Plan::Resolve(projection) => {
                let (delegate, depends_on_own_props, props) = resolve(projection, arg, own_props);
                *self.proxy.borrow_mut() = Proxy::Resolved {
                    delegate,
                    depends_on_own_props,
                };
                props
            }
        }
    }
}

fn call_delegate<A: Clone + 'static>(
    delegate: &ProjectionKind<A>,
    arg: &A,
    own_props: &Props,
) -> Props {
    match delegate {
        ProjectionKind::Arg(f) => f(arg).freeze(),
        ProjectionKind::ArgAndProps(f) => f(arg, own_props).freeze(),
        ProjectionKind::Factory(f) => match f(arg, own_props) {
            Outcome::Props(map) => map.freeze(),
            Outcome::Projection(stray) => {
                contract_warn(
                    "factory projection yielded another projection after resolution; \
                     evaluating it once without re-resolving",
                );
                eval_once(&stray.kind, arg, own_props)
            }
        },
    }
}

fn eval_once<A: Clone + 'static>(kind: &ProjectionKind<A>, arg: &A, own_props: &Props) -> Props {
    match kind {
        ProjectionKind::Arg(f) => f(arg).freeze(),
        ProjectionKind::ArgAndProps(f) => f(arg, own_props).freeze(),
        ProjectionKind::Factory(f) => match f(arg, own_props) {
            Outcome::Props(map) => map.freeze(),
            Outcome::Projection(_) => {
                contract_warn("nested factory projections resolve at most one level deep");
                Props::empty()
            }
        },
    }
}

fn resolve<A: Clone + 'static>(
    projection: Projection<A>,
    arg: &A,
    own_props: &Props,
) -> (ProjectionKind<A>, bool, Props) {
    let declared = projection.declared_depends_on_own_props();
    match projection.kind {
        ProjectionKind::Arg(f) => {
            let props = f(arg).freeze();
            (ProjectionKind::Arg(f), declared, props)
        }
        ProjectionKind::ArgAndProps(f) => {
            let props = f(arg, own_props).freeze();
            (ProjectionKind::ArgAndProps(f), declared, props)
        }
        ProjectionKind::Factory(f) => match f(arg, own_props) {
            // The factory itself produces props; it stays the delegate.
            Outcome::Props(map) => (ProjectionKind::Factory(f), declared, map.freeze()),
            // Factory-selector pattern: the replacement becomes the
            // permanent delegate and the flag is re-derived from it.
            Outcome::Projection(replacement) => {
                let depends = replacement.declared_depends_on_own_props();
                let props = eval_once(&replacement.kind, arg, own_props);
                (replacement.kind, depends, props)
            }
        },
    }
}

fn contract_warn(message: &str) {
    if cfg!(debug_assertions) {
        tracing::warn!("{message}");
    }
}

// ─── Init helpers ────────────────────────────────────────────────────────────

/// Init for a proxied projection selector.
pub fn init_proxy<A: Clone + 'static>(projection: Projection<A>) -> InitMapToProps<A> {
    Rc::new(move |_dispatch, _options| Ok(MapToProps::proxied(projection.clone())))
}

/// Init for a constant selector; the constant is computed once per binding
/// instance from `(dispatch, options)`.
pub fn init_constant<A: Clone + 'static>(
    get_constant: impl Fn(&Dispatch, &InitOptions) -> PropMap + 'static,
) -> InitMapToProps<A> {
    Rc::new(move |dispatch, options| {
        Ok(MapToProps::constant(get_constant(dispatch, options).freeze()))
    })
}

// ─── Merge step ──────────────────────────────────────────────────────────────

/// Custom merge: `(state_props, dispatch_props, own_props) -> PropMap`.
pub type MergeProjection = Rc<dyn Fn(&Props, &Props, &Props) -> PropMap>;

/// The merge step combining the three prop sources into the final props.
pub enum MergeFn {
    /// `{ ...own_props, ...state_props, ...dispatch_props }`.
    Default,
    /// A user merge function; memoized under pure mode so the merged handle
    /// is retained while results compare equal.
    Custom {
        f: MergeProjection,
        pure: bool,
        are_merged_props_equal: PropsEq,
        cached: RefCell<Option<Props>>,
    },
}

impl MergeFn {
    #[must_use]
    pub fn custom(f: MergeProjection, options: &InitOptions) -> Self {
        Self::Custom {
            f,
            pure: options.pure,
            are_merged_props_equal: Rc::clone(&options.are_merged_props_equal),
            cached: RefCell::new(None),
        }
    }

    pub fn merge(&self, state_props: &Props, dispatch_props: &Props, own_props: &Props) -> Props {
        match self {
            Self::Default => default_merge(state_props, dispatch_props, own_props),
            Self::Custom {
                f,
                pure,
                are_merged_props_equal,
                cached,
            } => {
                let next = f(state_props, dispatch_props, own_props).freeze();
                if !pure {
                    return next;
                }
                let mut cached = cached.borrow_mut();
                match &*cached {
                    Some(prev) if are_merged_props_equal(&next, prev) => prev.clone(),
                    _ => {
                        *cached = Some(next.clone());
                        next
                    }
                }
            }
        }
    }
}

/// Own props as base, state props next, dispatch props last; later entries
/// win on key collision.
#[must_use]
pub fn default_merge(state_props: &Props, dispatch_props: &Props, own_props: &Props) -> Props {
    let mut merged = PropMap::new();
    merged.extend_from(own_props);
    merged.extend_from(state_props);
    merged.extend_from(dispatch_props);
    merged.freeze()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use propflow_core::store::{DispatchResult, snapshot};
    use propflow_core::{props, shallow_equal};
    use std::cell::Cell;

    fn recording_dispatch() -> (Dispatch, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);
        let dispatch: Dispatch = Rc::new(move |action| -> DispatchResult {
            counter.set(counter.get() + 1);
            action
        });
        (dispatch, calls)
    }

    #[test]
    fn single_argument_projection_does_not_depend_on_own_props() {
        let selector = MapToProps::proxied(StateProjection::from_state(|_| props! {}));
        assert!(selector.depends_on_own_props()); // provisional
        let _ = selector.select(&snapshot(1u32), &Props::empty());
        assert!(!selector.depends_on_own_props());
        assert!(!selector.is_provisional());
    }

    #[test]
    fn two_argument_projection_depends_on_own_props() {
        let selector =
            MapToProps::proxied(StateProjection::from_state_and_props(|_, _| props! {}));
        let _ = selector.select(&snapshot(1u32), &Props::empty());
        assert!(selector.depends_on_own_props());
    }

    #[test]
    fn explicit_override_beats_declared_shape() {
        let projection =
            StateProjection::from_state(|_| props! {}).with_depends_on_own_props(true);
        let selector = MapToProps::proxied(projection);
        let _ = selector.select(&snapshot(1u32), &Props::empty());
        assert!(selector.depends_on_own_props());
    }

    #[test]
    fn factory_replacement_becomes_permanent_delegate() {
        let factory_calls = Rc::new(Cell::new(0u32));
        let counting = Rc::clone(&factory_calls);
        let projection = StateProjection::factory(move |_, _| {
            counting.set(counting.get() + 1);
            Outcome::Projection(StateProjection::from_state(|state| {
                let n = *state.downcast_ref::<u32>().unwrap();
                props! { "n" => n }
            }))
        });

        let selector = MapToProps::proxied(projection);
        let first = selector.select(&snapshot(3u32), &Props::empty());
        assert_eq!(*first.get_data::<u32>("n").unwrap(), 3);
        assert!(!selector.depends_on_own_props()); // re-derived from replacement

        let second = selector.select(&snapshot(9u32), &Props::empty());
        assert_eq!(*second.get_data::<u32>("n").unwrap(), 9);
        assert_eq!(factory_calls.get(), 1); // resolution is one-shot
    }

    #[test]
    fn factory_returning_props_stays_the_delegate() {
        let projection = StateProjection::factory(|state, _| {
            let n = *state.downcast_ref::<u32>().unwrap();
            Outcome::Props(props! { "n" => n })
        });
        let selector = MapToProps::proxied(projection);
        assert_eq!(
            *selector
                .select(&snapshot(1u32), &Props::empty())
                .get_data::<u32>("n")
                .unwrap(),
            1
        );
        assert_eq!(
            *selector
                .select(&snapshot(2u32), &Props::empty())
                .get_data::<u32>("n")
                .unwrap(),
            2
        );
        assert!(selector.depends_on_own_props()); // factory shape declares true
    }

    #[test]
    fn constant_selector_returns_same_handle() {
        let selector = MapToProps::<Snapshot>::constant(props! { "x" => 1u32 }.freeze());
        let a = selector.select(&snapshot(1u32), &Props::empty());
        let b = selector.select(&snapshot(2u32), &Props::empty());
        assert!(Props::same(&a, &b));
        assert!(!selector.depends_on_own_props());
    }

    #[test]
    fn bound_action_creators_dispatch_through_the_store() {
        let (dispatch, calls) = recording_dispatch();
        let mut creators = ActionCreatorMap::new();
        creators.insert("bump", |payload| {
            let by = *payload.downcast::<i64>().unwrap();
            Box::new(by * 10)
        });

        let bound = bind_action_creators(&creators, &dispatch);
        let result = bound
            .get("bump")
            .unwrap()
            .call(Box::new(3i64))
            .expect("bound entry is callable");
        assert_eq!(*result.downcast::<i64>().unwrap(), 30);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_merge_precedence_is_own_state_dispatch() {
        let own = props! { "a" => 1u32, "b" => 1u32, "c" => 1u32 }.freeze();
        let state = props! { "b" => 2u32, "c" => 2u32 }.freeze();
        let dispatch = props! { "c" => 3u32 }.freeze();

        let merged = default_merge(&state, &dispatch, &own);
        assert_eq!(*merged.get_data::<u32>("a").unwrap(), 1);
        assert_eq!(*merged.get_data::<u32>("b").unwrap(), 2);
        assert_eq!(*merged.get_data::<u32>("c").unwrap(), 3);
    }

    #[test]
    fn custom_merge_retains_handle_while_results_compare_equal() {
        let shared = PropValue::data(5u32);
        let merge_fn: MergeProjection = {
            let shared = shared.clone();
            Rc::new(move |_, _, _| {
                let mut map = PropMap::new();
                map.insert("n", shared.clone());
                map
            })
        };
        let options = InitOptions {
            display_name: "Connect(Test)".into(),
            pure: true,
            are_merged_props_equal: Rc::new(|a, b| shallow_equal(a, b)),
        };
        let merge = MergeFn::custom(merge_fn, &options);

        let empty = Props::empty();
        let first = merge.merge(&empty, &empty, &empty);
        let second = merge.merge(&empty, &empty, &empty);
        assert!(Props::same(&first, &second));
    }

    #[test]
    fn custom_merge_impure_recomputes_every_call() {
        let merge_fn: MergeProjection = Rc::new(|_, _, _| props! { "n" => 1u32 });
        let options = InitOptions {
            display_name: "Connect(Test)".into(),
            pure: false,
            are_merged_props_equal: Rc::new(|a, b| shallow_equal(a, b)),
        };
        let merge = MergeFn::custom(merge_fn, &options);

        let empty = Props::empty();
        let first = merge.merge(&empty, &empty, &empty);
        let second = merge.merge(&empty, &empty, &empty);
        assert!(!Props::same(&first, &second));
    }

    #[test]
    fn init_constant_computes_once_per_instance() {
        let (dispatch, _) = recording_dispatch();
        let options = InitOptions {
            display_name: "Connect(Test)".into(),
            pure: true,
            are_merged_props_equal: Rc::new(|a, b| shallow_equal(a, b)),
        };
        let builds = Rc::new(Cell::new(0u32));
        let counting = Rc::clone(&builds);
        let init: InitMapToProps<Snapshot> = init_constant(move |_, _| {
            counting.set(counting.get() + 1);
            props! { "k" => 1u32 }
        });

        let selector = init(&dispatch, &options).unwrap();
        let _ = selector.select(&snapshot(1u32), &Props::empty());
        let _ = selector.select(&snapshot(2u32), &Props::empty());
        assert_eq!(builds.get(), 1);
    }
}
