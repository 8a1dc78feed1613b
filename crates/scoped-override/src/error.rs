//! Error types for scoped overrides
//!
//! Only lookups fail with an [`OverrideError`]. Errors produced by the action
//! passed to [`with_current`](crate::with_current) are never wrapped: they
//! reach the caller exactly as the action produced them.

/// Errors reported when reading the current override
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    /// Nothing is installed for this type on the calling thread
    #[error("no current value of type {type_name} on this thread")]
    NoCurrentValue {
        /// Name of the overridden type
        type_name: &'static str,
    },

    /// The calling thread's override storage has already been torn down
    #[error("override storage for {type_name} is unavailable on this thread")]
    StorageUnavailable {
        /// Name of the overridden type
        type_name: &'static str,
    },
}

impl OverrideError {
    /// Whether the caller can reasonably continue, e.g. by supplying a default
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            OverrideError::NoCurrentValue { .. } => true,
            OverrideError::StorageUnavailable { .. } => false,
        }
    }

    /// Whether the error reflects a broken environment rather than caller usage
    #[must_use]
    pub fn is_system_error(&self) -> bool {
        matches!(self, OverrideError::StorageUnavailable { .. })
    }

    /// Name of the type the lookup was for
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            OverrideError::NoCurrentValue { type_name }
            | OverrideError::StorageUnavailable { type_name } => type_name,
        }
    }
}
