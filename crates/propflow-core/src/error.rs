//! Configuration-error taxonomy for the binding layer.
//!
//! All variants are hard failures raised synchronously at binding
//! construction or first mount. They are never caught or retried
//! internally. Non-fatal contract diagnostics are `tracing::warn!` events
//! in debug builds, not errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Error)]
pub enum BindError {
    /// A projection argument had an unrecognized shape. Carries the
    /// argument's method position, the received variant, and the binding's
    /// display name.
    #[error("invalid {received} value for {method} argument when connecting component {display_name}")]
    InvalidProjection {
        method: &'static str,
        received: String,
        display_name: String,
    },

    /// A consumer mounted outside any matching provider.
    #[error(
        "could not find a store provider above \"{display_name}\"; wrap the tree in a Provider \
         or pass the matching channel in connect options"
    )]
    NoProvider { display_name: String },

    /// A legacy option that no longer exists was supplied.
    #[error("option \"{key}\" has been removed: {hint}")]
    RemovedOption {
        key: String,
        hint: &'static str,
    },

    /// A normalized selector was absent at factory construction.
    #[error("unexpected absent {method} selector in {display_name}")]
    MissingSelector {
        method: &'static str,
        display_name: String,
    },
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_projection_names_method_and_component() {
        let err = BindError::InvalidProjection {
            method: "map_state_to_props",
            received: "ActionCreators".into(),
            display_name: "Connect(Counter)".into(),
        };
        let text = err.to_string();
        assert!(text.contains("map_state_to_props"));
        assert!(text.contains("ActionCreators"));
        assert!(text.contains("Connect(Counter)"));
    }

    #[test]
    fn removed_option_carries_migration_hint() {
        let err = BindError::RemovedOption {
            key: "storeKey".into(),
            hint: "pass a custom channel instead",
        };
        assert!(err.to_string().contains("custom channel"));
    }

    #[test]
    fn no_provider_names_consumer() {
        let err = BindError::NoProvider {
            display_name: "Connect(Row)".into(),
        };
        assert!(err.to_string().contains("Connect(Row)"));
    }
}
