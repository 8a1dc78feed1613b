//! Scenario runner
//!
//! Each scenario exercises one guarantee of the override stack and reports
//! the trace it observed plus whether the guarantee held.

use scoped_override::{OverrideError, ScopedOverride};
use scoped_override_test_utils::{
    climb_to, climb_until_failure, ClimbError, ClimbStep, Level,
};
use std::thread;

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub(crate) struct ScenarioReport {
    pub(crate) name: &'static str,
    pub(crate) lines: Vec<String>,
    pub(crate) passed: bool,
}

impl ScenarioReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: Vec::new(),
            passed: true,
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.passed = false;
        self.lines.push(format!("FAILED: {}", reason.into()));
    }

    pub(crate) fn generate_text(&self) -> String {
        let mut out = format!(
            "[{}] {}\n",
            self.name,
            if self.passed { "PASSED" } else { "FAILED" }
        );
        for line in &self.lines {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn describe(step: &ClimbStep, verb: &str) -> String {
    format!(
        "Before call: {}. {verb}: {} (depth {})",
        step.before, step.after, step.depth
    )
}

fn check_steps(report: &mut ScenarioReport, steps: &[ClimbStep]) {
    for step in steps {
        if step.before != step.after {
            report.fail(format!(
                "level {} was not restored (saw {})",
                step.before, step.after
            ));
        }
    }
}

/// Climb from `start` to `limit`; every frame must see its own level again
pub(crate) fn run_nested(start: i32, limit: i32) -> ScenarioReport {
    let mut report = ScenarioReport::new("nested");
    tracing::info!(start, limit, "running nested climb");

    match ScopedOverride::with_current(Level(start), || climb_to(limit)) {
        Ok(steps) => {
            report
                .lines
                .extend(steps.iter().map(|step| describe(step, "After call")));
            check_steps(&mut report, &steps);
        }
        Err(err) => report.fail(err.to_string()),
    }

    if ScopedOverride::<Level>::is_set() {
        report.fail("stack not empty after the scope");
    }
    report
}

/// Climb that fails at `fail_at`; every frame the failure passes must see
/// its own level, and the stack must be empty afterwards
pub(crate) fn run_failing(start: i32, fail_at: i32, limit: i32) -> ScenarioReport {
    let mut report = ScenarioReport::new("failing");
    tracing::info!(start, fail_at, limit, "running failing climb");

    match ScopedOverride::with_current(Level(start), || climb_until_failure(fail_at, limit)) {
        Err(ClimbError::Failed { level, unwound }) => {
            report
                .lines
                .extend(unwound.iter().map(|step| describe(step, "After failure")));
            report
                .lines
                .push(format!("Climb failed with \"climb failed at level {level}\""));
            check_steps(&mut report, &unwound);
        }
        Err(ClimbError::Override(err)) => report.fail(err.to_string()),
        Ok(()) => report.lines.push(format!(
            "Reached {limit} without hitting {fail_at}"
        )),
    }

    match ScopedOverride::<Level>::current() {
        Err(OverrideError::NoCurrentValue { .. }) => {}
        Err(err) => report.fail(err.to_string()),
        Ok(level) => report.fail(format!("level {} left installed", level.get().0)),
    }
    report
}

/// Frames a climb from `start` to `limit` installs; at least the start level
fn expected_depth(start: i32, limit: i32) -> usize {
    let span = i64::from(limit) - i64::from(start);
    usize::try_from(span.max(0)).map_or(usize::MAX, |span| span.saturating_add(1))
}

/// Run the nested climb on `threads` threads at once
pub(crate) fn run_threads(threads: usize, start: i32, limit: i32) -> ScenarioReport {
    let mut report = ScenarioReport::new("threads");
    tracing::info!(threads, start, limit, "running parallel climbs");

    let expected_depth = expected_depth(start, limit);
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| scope.spawn(move || ScopedOverride::with_current(Level(start), || climb_to(limit))))
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    });

    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(steps)) => {
                let deepest = steps.iter().map(|step| step.depth).max().unwrap_or(0);
                let top = steps.iter().map(|step| step.before).max().unwrap_or(start);
                report
                    .lines
                    .push(format!("thread {index}: reached {top} at depth {deepest}"));
                if deepest != expected_depth {
                    report.fail(format!(
                        "thread {index} reached depth {deepest}, expected {expected_depth}"
                    ));
                }
                check_steps(&mut report, &steps);
            }
            Ok(Err(err)) => report.fail(format!("thread {index}: {err}")),
            Err(_) => report.fail(format!("thread {index} panicked")),
        }
    }
    report
}

/// Climbing without installing a start level must report a missing value
pub(crate) fn run_empty(limit: i32) -> ScenarioReport {
    let mut report = ScenarioReport::new("empty");
    tracing::info!(limit, "running climb without a start level");

    let outcome = thread::spawn(move || climb_to(limit)).join();
    match outcome {
        Ok(Err(err @ OverrideError::NoCurrentValue { .. })) => {
            report.lines.push(format!("Failed with \"{err}\""));
        }
        Ok(Err(err)) => report.fail(err.to_string()),
        Ok(Ok(_)) => report.fail("climb succeeded with nothing installed"),
        Err(_) => report.fail("climb panicked"),
    }
    report
}
