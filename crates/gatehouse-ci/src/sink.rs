//! Default log sink: step records become `tracing` events.

use gatehouse_core::obs;
use gatehouse_core::{LogSink, StepKind, StepOutcome, StepStatus};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, job: &str, step: &StepKind, outcome: &StepOutcome) {
        obs::emit_step_finished(
            job,
            outcome.index,
            &step.label(),
            outcome.status,
            outcome.exit_code,
            outcome.duration_ms,
        );
        if outcome.status != StepStatus::Succeeded {
            if let Some(detail) = &outcome.detail {
                debug!(job = %job, step = outcome.index, detail = %detail, "Step output");
            }
        }
    }
}
