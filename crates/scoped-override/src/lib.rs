//! Scoped Override
//!
//! Thread-local "current value" overrides with strict stack discipline.
//!
//! # Overview
//!
//! A value installed with [`with_current`] is current for the dynamic extent of
//! the action it wraps, on the calling thread only:
//! - **Lookup**: [`current`] returns a live view of the innermost value
//! - **Scoped installation**: the value is popped exactly once when the action
//!   returns or unwinds
//! - **Isolation**: every thread, and every overridden type, has its own stack
//! - **Async**: [`OverrideFutureExt::with_override`] keeps a value current
//!   across `.await` points of one future
//!
//! # Example
//!
//! ```rust
//! use scoped_override::{current, with_current, OverrideError};
//!
//! struct Clock {
//!     now_ms: u64,
//! }
//!
//! fn elapsed_since(start_ms: u64) -> Result<u64, OverrideError> {
//!     let clock = current::<Clock>()?;
//!     let now = clock.borrow().now_ms;
//!     Ok(now - start_ms)
//! }
//!
//! let elapsed = with_current(Clock { now_ms: 1_500 }, || elapsed_since(1_000));
//! assert_eq!(elapsed, Ok(500));
//!
//! // Nothing installed outside the scope
//! assert!(matches!(
//!     elapsed_since(0),
//!     Err(OverrideError::NoCurrentValue { .. })
//! ));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod future;
pub mod registry;
mod stack;

// Re-exports
pub use error::OverrideError;
pub use future::{OverrideFutureExt, WithCurrent};
pub use registry::{current, with_current, Current, ScopedOverride};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for scoped overrides
    pub use crate::{
        current, with_current, Current, OverrideError, OverrideFutureExt, ScopedOverride,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
