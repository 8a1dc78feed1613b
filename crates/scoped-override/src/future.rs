//! Overrides that follow a future across `.await` points
//!
//! A future may be suspended and resumed many times, and other futures run on
//! the same thread in between. [`WithCurrent`] therefore installs its value
//! only while the inner future is being polled and removes it again before
//! `poll` returns. Dropping the future (cancellation) never leaves anything on
//! the stack.

use crate::registry::Scope;
use crate::stack::Slot;
use pin_project_lite::pin_project;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

pin_project! {
    /// Future that runs `F` with a `T` installed during every poll
    ///
    /// The same value is re-installed on each poll, so changes made through
    /// [`Current`](crate::Current) persist from one poll to the next.
    #[must_use = "futures do nothing unless polled"]
    pub struct WithCurrent<T, F> {
        slot: Slot<T>,
        #[pin]
        inner: F,
    }
}

impl<T: 'static, F> WithCurrent<T, F> {
    /// Wrap `inner`, installing `value` while it is polled
    pub fn new(value: T, inner: F) -> Self {
        Self {
            slot: Rc::new(RefCell::new(value)),
            inner,
        }
    }

    /// Consume the wrapper, returning the inner future
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<T: 'static, F: Future> Future for WithCurrent<T, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _scope = Scope::enter_slot(Rc::clone(this.slot));
        this.inner.poll(cx)
    }
}

/// Extension for running futures under an override
pub trait OverrideFutureExt: Future + Sized {
    /// Install `value` whenever this future is polled
    ///
    /// ```rust
    /// use scoped_override::{OverrideFutureExt, ScopedOverride};
    ///
    /// let fut = async { ScopedOverride::<u32>::cloned() }.with_override(7_u32);
    /// assert_eq!(futures::executor::block_on(fut), Ok(7));
    /// assert!(!ScopedOverride::<u32>::is_set());
    /// ```
    fn with_override<T: 'static>(self, value: T) -> WithCurrent<T, Self> {
        WithCurrent::new(value, self)
    }
}

impl<F: Future> OverrideFutureExt for F {}
