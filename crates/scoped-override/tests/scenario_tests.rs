//! Scenario tests
//!
//! Nesting, failure and thread isolation behaviour of the override stack.
//!
use pretty_assertions::assert_eq;
use scoped_override::prelude::*;
use scoped_override_test_utils::{
    climb_to, climb_until_failure, climb_until_panic, current_level, init_test_tracing, ClimbError,
    ClimbStep, Level,
};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;

#[test]
fn test_fresh_thread_has_no_current_value() {
    init_test_tracing();

    let result = thread::spawn(|| current::<Level>().map(|level| level.get()))
        .join()
        .unwrap();
    assert!(matches!(result, Err(OverrideError::NoCurrentValue { .. })));
}

#[test]
fn test_nested_push_then_failure_leaves_stack_empty() {
    init_test_tracing();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        with_current(Level(10), || {
            assert_eq!(current_level(), Ok(10));
            with_current(Level(11), || {
                assert_eq!(current_level(), Ok(11));
                panic!("inner action failed");
            });
        });
    }));

    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"inner action failed"));
    assert!(matches!(
        current::<Level>(),
        Err(OverrideError::NoCurrentValue { .. })
    ));
}

#[test]
fn test_outer_scope_sees_its_value_after_inner_failure() {
    let seen_after = with_current(Level(10), || {
        let inner: Result<(), &str> = with_current(Level(11), || Err("nope"));
        assert_eq!(inner, Err("nope"));
        current_level()
    });
    assert_eq!(seen_after, Ok(10));
}

#[test]
fn test_climb_restores_every_level() {
    let steps = with_current(Level(10), || climb_to(20)).unwrap();

    assert_eq!(steps.len(), 11);
    assert_eq!(
        steps.first(),
        Some(&ClimbStep {
            before: 20,
            after: 20,
            depth: 11,
        })
    );
    assert_eq!(
        steps.last(),
        Some(&ClimbStep {
            before: 10,
            after: 10,
            depth: 1,
        })
    );
    assert!(steps.iter().all(|step| step.before == step.after));
    assert_eq!(ScopedOverride::<Level>::depth(), 0);
}

#[test]
fn test_failing_climb_unwinds_each_frame() {
    let result = with_current(Level(10), || climb_until_failure(15, 20));

    let (level, unwound) = match result {
        Err(ClimbError::Failed { level, unwound }) => (level, unwound),
        other => panic!("expected the climb to fail, got {other:?}"),
    };
    assert_eq!(level, 15);
    let observed: Vec<_> = unwound.iter().map(|step| (step.before, step.after)).collect();
    assert_eq!(observed, vec![(14, 14), (13, 13), (12, 12), (11, 11), (10, 10)]);
    assert!(!ScopedOverride::<Level>::is_set());
}

#[test]
fn test_panicking_climb_unwinds_each_frame() {
    let mut unwound = Vec::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        with_current(Level(10), || climb_until_panic(15, 20, &mut unwound));
    }));

    let payload = outcome.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<String>().map(String::as_str),
        Some("climb failed at level 15")
    );
    let depths: Vec<_> = unwound.iter().map(|step| step.depth).collect();
    assert_eq!(depths, vec![5, 4, 3, 2, 1]);
    assert!(unwound.iter().all(|step| step.before == step.after));
    assert_eq!(ScopedOverride::<Level>::depth(), 0);
}

#[test]
fn test_missing_start_level_is_reported() {
    let result = climb_to(20);
    assert!(matches!(result, Err(OverrideError::NoCurrentValue { .. })));
}

#[test]
fn test_four_threads_climb_independently() {
    init_test_tracing();

    let handles: Vec<_> = (0..4)
        .map(|_| thread::spawn(|| with_current(Level(18), || climb_to(20))))
        .collect();

    for handle in handles {
        let steps = handle.join().unwrap().unwrap();
        let observed: Vec<_> = steps
            .iter()
            .map(|step| (step.before, step.after, step.depth))
            .collect();
        assert_eq!(observed, vec![(20, 20, 3), (19, 19, 2), (18, 18, 1)]);
    }
}

#[test]
fn test_concurrent_threads_never_see_each_other() {
    let barrier = Arc::new(Barrier::new(2));

    let spawn = |value: i32| {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            with_current(Level(value), || {
                // Both threads have pushed before either reads.
                barrier.wait();
                let seen = current_level();
                barrier.wait();
                seen
            })
        })
    };

    let first = spawn(10);
    let second = spawn(99);
    assert_eq!(first.join().unwrap(), Ok(10));
    assert_eq!(second.join().unwrap(), Ok(99));
}

#[test]
fn test_thread_inside_scope_starts_empty() {
    with_current(Level(1), || {
        let child = thread::spawn(|| {
            let before = ScopedOverride::<Level>::is_set();
            let inside = with_current(Level(2), current_level);
            (before, inside)
        })
        .join()
        .unwrap();

        assert_eq!(child, (false, Ok(2)));
        assert_eq!(current_level(), Ok(1));
    });
}

#[test]
fn test_value_handed_to_thread_explicitly() {
    with_current(Level(7), || {
        let handed = ScopedOverride::<Level>::cloned().unwrap();
        let seen = thread::spawn(move || with_current(handed, current_level))
            .join()
            .unwrap();
        assert_eq!(seen, Ok(7));
    });
}

/// Reports, from its destructor, what the override registry still allows
struct ReportsOnDrop(mpsc::Sender<(Result<u8, OverrideError>, bool)>);

impl Drop for ReportsOnDrop {
    fn drop(&mut self) {
        let seen = current::<u8>().map(|value| value.get());
        let install_panicked = panic::catch_unwind(|| with_current(1_u8, || ())).is_err();
        let _ = self.0.send((seen, install_panicked));
    }
}

thread_local! {
    static REPORTER: RefCell<Option<ReportsOnDrop>> = RefCell::new(None);
}

#[test]
fn test_storage_torn_down_is_reported_and_fatal() {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        // Registered first, so destroyed after the override registry.
        REPORTER.with(|reporter| *reporter.borrow_mut() = Some(ReportsOnDrop(tx)));
        assert_eq!(ScopedOverride::<u8>::depth(), 0);
    })
    .join()
    .unwrap();

    let (seen, install_panicked) = rx.recv().unwrap();
    assert_eq!(
        seen,
        Err(OverrideError::StorageUnavailable { type_name: "u8" })
    );
    assert!(seen.unwrap_err().is_system_error());
    assert!(install_panicked);
}
