//! Per-type override stack
//!
//! Elements are stored as shared slots so that a [`Current`](crate::Current)
//! view taken during a scope keeps pointing at the live value, and so that a
//! scope can check it pops the exact slot it pushed.

use std::cell::RefCell;
use std::rc::Rc;

/// A single installed value
pub(crate) type Slot<T> = Rc<RefCell<T>>;

#[cfg(feature = "perf")]
type Storage<T> = smallvec::SmallVec<[Slot<T>; 8]>;

#[cfg(not(feature = "perf"))]
type Storage<T> = Vec<Slot<T>>;

/// LIFO stack of installed values for one type on one thread
///
/// Only ever modified at the top. Dropped with the thread's registry.
pub(crate) struct OverrideStack<T: 'static> {
    slots: Storage<T>,
}

impl<T: 'static> OverrideStack<T> {
    pub(crate) fn new() -> Self {
        tracing::trace!(
            thread = ?std::thread::current().name(),
            type_name = std::any::type_name::<T>(),
            "override stack created"
        );
        Self {
            slots: Storage::new(),
        }
    }

    /// Wrap `value` in a fresh slot and push it
    pub(crate) fn push(&mut self, value: T) -> Slot<T> {
        let slot = Rc::new(RefCell::new(value));
        self.push_slot(Rc::clone(&slot));
        slot
    }

    /// Push an existing slot, used when the same value is re-installed
    pub(crate) fn push_slot(&mut self, slot: Slot<T>) {
        self.slots.push(slot);
    }

    pub(crate) fn pop(&mut self) -> Option<Slot<T>> {
        self.slots.pop()
    }

    pub(crate) fn top(&self) -> Option<&Slot<T>> {
        self.slots.last()
    }

    pub(crate) fn depth(&self) -> usize {
        self.slots.len()
    }
}

impl<T: 'static> Drop for OverrideStack<T> {
    fn drop(&mut self) {
        tracing::trace!(
            type_name = std::any::type_name::<T>(),
            remaining = self.slots.len(),
            "override stack destroyed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let stack = OverrideStack::<u32>::new();
        assert_eq!(stack.depth(), 0);
        assert!(stack.top().is_none());
    }

    #[test]
    fn top_is_last_pushed() {
        let mut stack = OverrideStack::new();
        stack.push(1);
        stack.push(2);
        assert_eq!(*stack.top().unwrap().borrow(), 2);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn pop_returns_pushed_slot() {
        let mut stack = OverrideStack::new();
        let outer = stack.push("outer");
        let inner = stack.push("inner");

        assert!(Rc::ptr_eq(&stack.pop().unwrap(), &inner));
        assert!(Rc::ptr_eq(&stack.pop().unwrap(), &outer));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn pushed_slot_is_shared_with_stack() {
        let mut stack = OverrideStack::new();
        let slot = stack.push(5);
        *slot.borrow_mut() += 1;
        assert_eq!(*stack.top().unwrap().borrow(), 6);
    }

    #[test]
    fn push_slot_reuses_value() {
        let mut stack = OverrideStack::new();
        let slot = Rc::new(RefCell::new(7));
        stack.push_slot(Rc::clone(&slot));
        stack.pop();
        stack.push_slot(Rc::clone(&slot));
        assert!(Rc::ptr_eq(stack.top().unwrap(), &slot));
    }
}
