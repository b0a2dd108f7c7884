//! Dynamic prop maps.
//!
//! # Design
//!
//! Props flowing through the binding layer are keyed mappings from static
//! string keys to reference-counted values. A value is either plain data or
//! a dispatch-bound action callback. Two values are "equal" exactly when
//! they are the same allocation; content is never inspected.
//!
//! [`Props`] is the shared handle form ([`Rc`]-backed). Its identity is what
//! downstream memoization keys on: a component re-renders when it receives a
//! props handle it has not seen before, regardless of content.
//!
//! # Invariants
//!
//! 1. `Props::same(a, b)` implies `shallow_equal(a, b)`.
//! 2. Cloning a [`Props`] or a [`PropValue`] never changes identity.
//! 3. A [`PropMap`] is only mutated while exclusively owned; once wrapped
//!    into [`Props`] it is frozen.

use std::any::Any;
use std::rc::Rc;

use ahash::AHashMap;

use crate::store::DispatchResult;

/// A dispatch-bound callback stored in a prop map.
///
/// The single opaque payload mirrors an action creator's argument; the
/// return value is whatever the store's dispatch returned.
pub type ActionFn = Rc<dyn Fn(Box<dyn Any>) -> DispatchResult>;

/// One prop entry: plain data or a callable bound to a dispatch function.
#[derive(Clone)]
pub enum PropValue {
    /// Plain shared data.
    Data(Rc<dyn Any>),
    /// A dispatch-bound action callback.
    Action(ActionFn),
}

impl PropValue {
    /// Wrap plain data.
    pub fn data<T: 'static>(value: T) -> Self {
        Self::Data(Rc::new(value))
    }

    /// Wrap a callback.
    pub fn action(f: impl Fn(Box<dyn Any>) -> DispatchResult + 'static) -> Self {
        Self::Action(Rc::new(f))
    }

    /// Reference identity: same variant and same allocation.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Self::Data(x), Self::Data(y)) => Rc::as_ptr(x).cast::<()>() == Rc::as_ptr(y).cast(),
            (Self::Action(x), Self::Action(y)) => {
                Rc::as_ptr(x).cast::<()>() == Rc::as_ptr(y).cast()
            }
            _ => false,
        }
    }

    /// Borrow the data payload as `T`, if this is a `Data` entry of that type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Data(value) => value.downcast_ref(),
            Self::Action(_) => None,
        }
    }

    /// Invoke an `Action` entry. Returns `None` for `Data` entries.
    pub fn call(&self, payload: Box<dyn Any>) -> Option<DispatchResult> {
        match self {
            Self::Data(_) => None,
            Self::Action(f) => Some(f(payload)),
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(value) => write!(f, "Data({:p})", Rc::as_ptr(value)),
            Self::Action(value) => write!(f, "Action({:p})", Rc::as_ptr(value)),
        }
    }
}

/// An owned, mutable keyed mapping of prop entries.
#[derive(Clone, Debug, Default)]
pub struct PropMap {
    entries: AHashMap<&'static str, PropValue>,
}

impl PropMap {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: &'static str, value: PropValue) {
        self.entries.insert(key, value);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    /// Borrow a `Data` entry's payload as `T`.
    #[must_use]
    pub fn get_data<T: 'static>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(PropValue::downcast_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Copy every entry of `other` into `self`, overwriting collisions.
    /// Copied entries keep their identity (the `Rc` is cloned, not the data).
    pub fn extend_from(&mut self, other: &PropMap) {
        for (key, value) in other.iter() {
            self.entries.insert(key, value.clone());
        }
    }

    /// Freeze into a shared handle.
    #[must_use]
    pub fn freeze(self) -> Props {
        Props {
            inner: Rc::new(self),
        }
    }
}

/// Shared, frozen props handle. Identity of the handle is the unit of
/// memoization everywhere downstream.
#[derive(Clone, Debug)]
pub struct Props {
    inner: Rc<PropMap>,
}

impl Props {
    /// Freeze an owned map. Equivalent to [`PropMap::freeze`].
    #[must_use]
    pub fn new(map: PropMap) -> Self {
        map.freeze()
    }

    /// A fresh empty handle (distinct identity each call).
    #[must_use]
    pub fn empty() -> Self {
        PropMap::new().freeze()
    }

    /// Handle identity.
    #[inline]
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::ops::Deref for Props {
    type Target = PropMap;

    fn deref(&self) -> &PropMap {
        &self.inner
    }
}

impl From<PropMap> for Props {
    fn from(map: PropMap) -> Self {
        map.freeze()
    }
}

/// Build a [`PropMap`] of `Data` entries: `props! { "count" => 1u32 }`.
#[macro_export]
macro_rules! props {
    () => { $crate::props::PropMap::new() };
    ( $( $key:literal => $value:expr ),+ $(,)? ) => {{
        let mut map = $crate::props::PropMap::new();
        $( map.insert($key, $crate::props::PropValue::data($value)); )+
        map
    }};
}

// ─── Tests ───────────────────────────────────────────────────────────────────
