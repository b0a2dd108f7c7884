#![forbid(unsafe_code)]

//! Core primitives for Propflow: dynamic prop maps, reference and shallow
//! equality, the store contract, and the configuration-error taxonomy.
//!
//! Everything in this crate is single-threaded data plumbing. Values are
//! shared via `Rc` and compared by *identity*, never by content — identity
//! of a [`Props`] handle is the unit of memoization throughout the binding
//! layer built on top of this crate.

pub mod equal;
pub mod error;
pub mod props;
pub mod store;

pub use equal::{same_rc, shallow_equal};
pub use error::BindError;
pub use props::{ActionFn, PropMap, PropValue, Props};
pub use store::{Action, Dispatch, DispatchResult, Snapshot, Store, StoreRef, Unsubscribe};
