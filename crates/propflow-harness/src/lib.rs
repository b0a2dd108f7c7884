#![forbid(unsafe_code)]

//! Test host for the binding layer.
//!
//! Three pieces: [`MemoryStore`], a reducer-driven store double;
//! [`TreeHost`], a miniature retained component tree driving the component
//! contract (mount, update, invalidate-and-flush, detach); and [`Probe`]
//! leaf components with render counters and instance handles.
//!
//! Cross-crate integration tests live in this crate's `tests/` directory.

pub mod host;
pub mod probe;
pub mod store;

pub use host::TreeHost;
pub use probe::{Probe, ProbeHandle, ProbeState};
pub use store::MemoryStore;
