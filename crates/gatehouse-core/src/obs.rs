//! Structured lifecycle events for pipeline runs.
//!
//! Each function emits a single `tracing` event with an `event` field naming
//! the lifecycle point (`run.started`, `job.finished`, ...), so log pipelines
//! can filter on it regardless of output format.

use tracing::{info, warn};

use crate::model::{JobStatus, StepStatus};

/// Span that scopes every event of one run.
///
/// Attach it to the run future with `tracing::Instrument` so it follows the
/// task across await points:
///
/// ```ignore
/// execute(run).instrument(obs::run_span("3f2a9c1e0b7d")).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("gatehouse.run", run_id = %run_id)
}

pub fn emit_run_started(
    run_id: &str,
    pipeline: &str,
    event_kind: &str,
    git_ref: &str,
    jobs: usize,
) {
    info!(
        event = "run.started",
        run_id = %run_id,
        pipeline = %pipeline,
        event_kind = %event_kind,
        git_ref = %git_ref,
        jobs = jobs,
    );
}

pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    passed: usize,
    failed: usize,
    success: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        passed = passed,
        failed = failed,
        success = success,
    );
}

/// Event was not in the accepted trigger set.
pub fn emit_event_ignored(event_kind: &str, git_ref: &str) {
    info!(event = "trigger.ignored", event_kind = %event_kind, git_ref = %git_ref);
}

pub fn emit_checkout_failed(run_id: &str, git_ref: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.checkout_failed", run_id = %run_id, git_ref = %git_ref, error = %error);
}

pub fn emit_step_finished(
    job: &str,
    index: usize,
    label: &str,
    status: StepStatus,
    exit_code: Option<i32>,
    duration_ms: u64,
) {
    info!(
        event = "step.finished",
        job = %job,
        step = index,
        command = %label,
        status = ?status,
        exit_code = ?exit_code,
        duration_ms = duration_ms,
    );
}

pub fn emit_job_finished(job: &str, status: JobStatus, reason: Option<&str>, duration_ms: u64) {
    if status == JobStatus::Succeeded {
        info!(event = "job.finished", job = %job, status = %status, duration_ms = duration_ms);
    } else {
        warn!(
            event = "job.finished",
            job = %job,
            status = %status,
            reason = reason.unwrap_or("unknown"),
            duration_ms = duration_ms,
        );
    }
}

pub fn emit_gate_evaluated(run_id: &str, total: usize, failed: usize, passed: bool) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        total = total,
        failed = failed,
        passed = passed,
    );
}

/// Context teardown failed; the job outcome is unaffected.
pub fn emit_context_release_error(job: &str, error: &dyn std::fmt::Display) {
    warn!(event = "context.release_error", job = %job, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_span_enters_without_subscriber() {
        let _span = run_span("test-run-id").entered();
        emit_job_finished("lint", JobStatus::Failed, Some("CommandFailure"), 12);
    }
}
