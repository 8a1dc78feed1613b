//! Per-thread override registry
//!
//! Every thread lazily owns one `ThreadRegistry`, holding one
//! `OverrideStack` per overridden type. Nothing in here is shared across
//! threads, so there are no locks: all state sits behind `RefCell`s that are
//! only borrowed for the duration of a push, pop or lookup, never while user
//! code runs.

use crate::error::OverrideError;
use crate::stack::{OverrideStack, Slot};
use std::any::{type_name, Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

thread_local! {
    static REGISTRY: ThreadRegistry = ThreadRegistry::new();
}

type SharedStack<T> = Rc<RefCell<OverrideStack<T>>>;

/// All override stacks of the current thread, keyed by overridden type
struct ThreadRegistry {
    stacks: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl ThreadRegistry {
    fn new() -> Self {
        tracing::trace!(
            thread = ?std::thread::current().name(),
            "thread override registry created"
        );
        Self {
            stacks: RefCell::new(HashMap::new()),
        }
    }

    /// Stack for `T`, created on first access
    fn stack<T: 'static>(&self) -> SharedStack<T> {
        let existing = self.stacks.borrow().get(&TypeId::of::<T>()).cloned();
        let erased = match existing {
            Some(erased) => erased,
            None => {
                // Built outside the map borrow: creation emits a tracing event
                // and a subscriber may itself read an override.
                let created: Rc<dyn Any> = Rc::new(RefCell::new(OverrideStack::<T>::new()));
                self.stacks
                    .borrow_mut()
                    .entry(TypeId::of::<T>())
                    .or_insert(created)
                    .clone()
            }
        };

        match erased.downcast::<RefCell<OverrideStack<T>>>() {
            Ok(stack) => stack,
            Err(_) => unreachable!("override stack keyed by TypeId of {}", type_name::<T>()),
        }
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        tracing::trace!(
            thread = ?std::thread::current().name(),
            types = self.stacks.get_mut().len(),
            "thread override registry destroyed"
        );
    }
}

fn try_stack<T: 'static>() -> Result<SharedStack<T>, OverrideError> {
    REGISTRY
        .try_with(ThreadRegistry::stack::<T>)
        .map_err(|_| OverrideError::StorageUnavailable {
            type_name: type_name::<T>(),
        })
}

fn stack_or_abort<T: 'static>() -> SharedStack<T> {
    match try_stack::<T>() {
        Ok(stack) => stack,
        Err(err) => panic!("cannot install override: {err}"),
    }
}

/// One installed value; popped when dropped
///
/// Created immediately after the push so that the pop runs on every exit
/// path, including unwinding out of the action.
pub(crate) struct Scope<T: 'static> {
    stack: SharedStack<T>,
    slot: Slot<T>,
}

impl<T: 'static> Scope<T> {
    pub(crate) fn enter(value: T) -> Self {
        let stack = stack_or_abort::<T>();
        let slot = stack.borrow_mut().push(value);
        Self { stack, slot }
    }

    pub(crate) fn enter_slot(slot: Slot<T>) -> Self {
        let stack = stack_or_abort::<T>();
        stack.borrow_mut().push_slot(Rc::clone(&slot));
        Self { stack, slot }
    }
}

impl<T: 'static> Drop for Scope<T> {
    fn drop(&mut self) {
        // The popped value may run arbitrary code when dropped, so release
        // the stack borrow first.
        let popped = self.stack.borrow_mut().pop();
        let own_slot = popped
            .as_ref()
            .is_some_and(|slot| Rc::ptr_eq(slot, &self.slot));

        if cfg!(feature = "strict-debug") {
            assert!(own_slot, "override stack for {} popped out of order", type_name::<T>());
        } else {
            debug_assert!(own_slot, "override stack for {} popped out of order", type_name::<T>());
        }
    }
}

/// Live view of the current override
///
/// Reads and writes go straight to the installed value, so mutations are seen
/// by the installer and by every other reader within the scope. The view is
/// neither `Send` nor `Sync` and cannot leave the thread it was taken on.
///
/// A view may outlive its scope; it then keeps the value alive but the value is
/// no longer current.
pub struct Current<T> {
    slot: Slot<T>,
}

impl<T> Current<T> {
    /// Immutably borrow the value
    ///
    /// # Panics
    /// Panics if the value is currently mutably borrowed through another view.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.slot.borrow()
    }

    /// Mutably borrow the value
    ///
    /// # Panics
    /// Panics if the value is currently borrowed through another view.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.slot.borrow_mut()
    }

    /// Copy of the value
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.slot.borrow().clone()
    }

    /// Whether two views refer to the same installed value
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Clone for Current<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Current<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Current").field(&self.slot.borrow()).finish()
    }
}

/// Scoped, thread-local overrides of a `T`
///
/// A marker type: all operations are associated functions acting on the
/// calling thread's stack for `T`. Distinct types never share a stack.
///
/// ```rust
/// use scoped_override::ScopedOverride;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Verbosity(u8);
///
/// ScopedOverride::with_current(Verbosity(1), || {
///     assert_eq!(ScopedOverride::<Verbosity>::cloned().unwrap(), Verbosity(1));
///
///     ScopedOverride::with_current(Verbosity(3), || {
///         assert_eq!(ScopedOverride::<Verbosity>::cloned().unwrap(), Verbosity(3));
///     });
///
///     assert_eq!(ScopedOverride::<Verbosity>::cloned().unwrap(), Verbosity(1));
/// });
///
/// assert!(ScopedOverride::<Verbosity>::current().is_err());
/// ```
pub struct ScopedOverride<T>(PhantomData<fn() -> T>);

impl<T: 'static> ScopedOverride<T> {
    /// The innermost value installed on this thread
    ///
    /// # Errors
    /// [`OverrideError::NoCurrentValue`] if nothing is installed,
    /// [`OverrideError::StorageUnavailable`] if the thread's storage is gone.
    pub fn current() -> Result<Current<T>, OverrideError> {
        let stack = try_stack::<T>()?;
        let top = stack.borrow().top().cloned();
        top.map(|slot| Current { slot })
            .ok_or(OverrideError::NoCurrentValue {
                type_name: type_name::<T>(),
            })
    }

    /// Install `value` for the duration of `action`
    ///
    /// The value is popped exactly once before this returns, whether `action`
    /// returns or unwinds. The action's result, or its panic, reaches the
    /// caller unchanged.
    ///
    /// # Panics
    /// Panics if the thread's override storage has already been torn down,
    /// which only happens when called from a thread-local destructor.
    pub fn with_current<R, F>(value: T, action: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _scope = Scope::enter(value);
        action()
    }

    /// Apply `f` to the current value
    ///
    /// # Errors
    /// Same as [`ScopedOverride::current`].
    ///
    /// # Panics
    /// Panics if the current value is mutably borrowed, e.g. when called from
    /// inside [`ScopedOverride::update`] for the same `T`.
    pub fn read<R>(f: impl FnOnce(&T) -> R) -> Result<R, OverrideError> {
        let current = Self::current()?;
        let value = current.borrow();
        Ok(f(&value))
    }

    /// Mutate the current value in place
    ///
    /// # Errors
    /// Same as [`ScopedOverride::current`].
    ///
    /// # Panics
    /// Panics if the current value is already borrowed. `f` itself must not
    /// read the same `T` through [`ScopedOverride::read`],
    /// [`ScopedOverride::cloned`] or a [`Current`] view; use the `&mut T` it
    /// is given instead.
    pub fn update<R>(f: impl FnOnce(&mut T) -> R) -> Result<R, OverrideError> {
        let current = Self::current()?;
        let mut value = current.borrow_mut();
        Ok(f(&mut value))
    }

    /// Copy of the current value
    ///
    /// # Errors
    /// Same as [`ScopedOverride::current`].
    ///
    /// # Panics
    /// Panics if the current value is mutably borrowed, e.g. when called from
    /// inside [`ScopedOverride::update`] for the same `T`.
    pub fn cloned() -> Result<T, OverrideError>
    where
        T: Clone,
    {
        Self::current().map(|current| current.get())
    }

    /// Number of values installed on this thread
    ///
    /// Zero once the thread's storage has been torn down.
    #[must_use]
    pub fn depth() -> usize {
        match try_stack::<T>() {
            Ok(stack) => {
                let depth = stack.borrow().depth();
                depth
            }
            Err(_) => 0,
        }
    }

    /// Whether a value is installed on this thread
    #[must_use]
    pub fn is_set() -> bool {
        Self::depth() > 0
    }
}

/// The innermost `T` installed on this thread
///
/// # Errors
/// See [`ScopedOverride::current`].
pub fn current<T: 'static>() -> Result<Current<T>, OverrideError> {
    ScopedOverride::<T>::current()
}

/// Install `value` for the duration of `action`
///
/// See [`ScopedOverride::with_current`].
pub fn with_current<T: 'static, R>(value: T, action: impl FnOnce() -> R) -> R {
    ScopedOverride::<T>::with_current(value, action)
}
