//! Testing utilities for the scoped-override workspace
//!
//! Shared fixtures: a fake clock, an integer level override and the recursive
//! "climb" drivers used by the integration tests and the demo.

#![allow(missing_docs)]

use scoped_override::{OverrideError, ScopedOverride};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Manually advanced clock, installed in place of a real time source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeClock {
    now: Duration,
}

impl FakeClock {
    pub fn starting_at(now: Duration) -> Self {
        Self { now }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

/// Time according to the current clock
pub fn clock_now() -> Result<Duration, OverrideError> {
    ScopedOverride::<FakeClock>::read(FakeClock::now)
}

/// Move the current clock forward
pub fn advance_clock(by: Duration) -> Result<(), OverrideError> {
    ScopedOverride::<FakeClock>::update(|clock| clock.advance(by))
}

/// Integer override driving the climb scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level(pub i32);

pub fn current_level() -> Result<i32, OverrideError> {
    ScopedOverride::<Level>::read(|level| level.0)
}

/// What one level of a climb observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimbStep {
    /// Level current when this frame started
    pub before: i32,
    /// Level current after the nested climb returned or failed
    pub after: i32,
    /// Stack depth at that point
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClimbError {
    #[error("climb failed at level {level}")]
    Failed {
        level: i32,
        /// Observations of the frames the failure passed through, innermost first
        unwound: Vec<ClimbStep>,
    },

    #[error(transparent)]
    Override(#[from] OverrideError),
}

/// Install `current + 1` recursively until `limit` is current
///
/// Returns one step per frame, innermost first.
pub fn climb_to(limit: i32) -> Result<Vec<ClimbStep>, OverrideError> {
    let before = current_level()?;
    let mut trace = if before < limit {
        ScopedOverride::with_current(Level(before + 1), || climb_to(limit))?
    } else {
        Vec::new()
    };

    trace.push(ClimbStep {
        before,
        after: current_level()?,
        depth: ScopedOverride::<Level>::depth(),
    });
    Ok(trace)
}

/// Like [`climb_to`], but fails with an error once `fail_at` is current
pub fn climb_until_failure(fail_at: i32, limit: i32) -> Result<(), ClimbError> {
    let before = current_level()?;
    if before == fail_at {
        return Err(ClimbError::Failed {
            level: before,
            unwound: Vec::new(),
        });
    }
    if before >= limit {
        return Ok(());
    }

    match ScopedOverride::with_current(Level(before + 1), || climb_until_failure(fail_at, limit)) {
        Err(ClimbError::Failed { level, mut unwound }) => {
            unwound.push(ClimbStep {
                before,
                after: current_level()?,
                depth: ScopedOverride::<Level>::depth(),
            });
            Err(ClimbError::Failed { level, unwound })
        }
        other => other,
    }
}

/// Like [`climb_until_failure`], but panics once `fail_at` is current
///
/// Each frame catches the unwind, records what it observes into `unwound`
/// and resumes unwinding with the original payload.
pub fn climb_until_panic(fail_at: i32, limit: i32, unwound: &mut Vec<ClimbStep>) {
    let before = current_level().unwrap_or_else(|err| panic!("{err}"));
    if before == fail_at {
        panic!("climb failed at level {before}");
    }
    if before >= limit {
        return;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ScopedOverride::with_current(Level(before + 1), || {
            climb_until_panic(fail_at, limit, unwound);
        });
    }));

    if let Err(payload) = result {
        unwound.push(ClimbStep {
            before,
            after: current_level().unwrap_or(i32::MIN),
            depth: ScopedOverride::<Level>::depth(),
        });
        panic::resume_unwind(payload);
    }
}

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
