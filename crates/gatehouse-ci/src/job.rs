//! Sequential, fail-fast execution of one job's steps.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use gatehouse_core::obs;
use gatehouse_core::{
    CommandRunner, ExecutionContext, FailureReason, Job, JobResult, JobStatus, LogSink, StepKind,
    StepOutcome, StepStatus,
};
use tokio::time::Instant as TokioInstant;
use tracing::info;

use crate::provisioner::ToolchainProvisioner;

/// Lines of command output kept in a failed step's detail.
const OUTPUT_TAIL_LINES: usize = 20;

/// Executes a job's steps in order inside its execution context.
#[derive(Clone)]
pub struct JobRunner {
    provisioner: ToolchainProvisioner,
    commands: Arc<dyn CommandRunner>,
    sink: Arc<dyn LogSink>,
}

/// Result of a single step before it is written into the job record.
struct StepRun {
    status: StepStatus,
    exit_code: Option<i32>,
    detail: Option<String>,
    failure: Option<FailureReason>,
}

impl StepRun {
    fn succeeded(exit_code: Option<i32>) -> Self {
        Self {
            status: StepStatus::Succeeded,
            exit_code,
            detail: None,
            failure: None,
        }
    }

    fn errored(detail: String, failure: FailureReason) -> Self {
        Self {
            status: StepStatus::Errored,
            exit_code: None,
            detail: Some(detail),
            failure: Some(failure),
        }
    }
}

impl JobRunner {
    pub fn new(
        provisioner: ToolchainProvisioner,
        commands: Arc<dyn CommandRunner>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            provisioner,
            commands,
            sink,
        }
    }

    /// Run `job` to a terminal status.
    ///
    /// The first step that does not succeed ends the job: a failing command
    /// makes it `Failed`; a provisioning error, spawn error or timeout makes
    /// it `Errored`. Every later step is recorded as skipped and never started.
    pub async fn run(&self, mut job: Job, context: &mut ExecutionContext) -> JobResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = job.timeout().map(|t| TokioInstant::now() + t);

        job.status = JobStatus::Running;
        info!(job = %job.name, steps = job.steps.len(), "Starting job");

        let mut outcomes = Vec::with_capacity(job.steps.len());
        let mut reason: Option<FailureReason> = None;

        for (index, step) in job.steps.iter_mut().enumerate() {
            let label = step.kind.label();

            if reason.is_some() {
                step.status = StepStatus::Skipped;
                outcomes.push(StepOutcome::skipped(index, label));
                continue;
            }

            step.status = StepStatus::Running;
            let step_start = Instant::now();

            let run = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.run_step(&step.kind, context))
                        .await
                    {
                        Ok(run) => run,
                        Err(_) => {
                            let timeout_secs = job.timeout_secs.unwrap_or_default();
                            StepRun::errored(
                                format!("job exceeded its {timeout_secs}s timeout"),
                                FailureReason::TimeoutError { timeout_secs },
                            )
                        }
                    }
                }
                None => self.run_step(&step.kind, context).await,
            };

            step.status = run.status;
            let outcome = StepOutcome {
                index,
                label,
                status: run.status,
                exit_code: run.exit_code,
                duration_ms: step_start.elapsed().as_millis() as u64,
                detail: run.detail,
            };
            self.sink.emit(&job.name, &step.kind, &outcome);
            outcomes.push(outcome);
            reason = run.failure;
        }

        job.status = reason
            .as_ref()
            .map(FailureReason::job_status)
            .unwrap_or(JobStatus::Succeeded);

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_job_finished(
            &job.name,
            job.status,
            reason.as_ref().map(FailureReason::code),
            duration_ms,
        );

        JobResult {
            job: job.name,
            status: job.status,
            reason,
            steps: outcomes,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        }
    }

    async fn run_step(&self, kind: &StepKind, context: &mut ExecutionContext) -> StepRun {
        match kind {
            StepKind::Provision(spec) => match self.provisioner.provision(context, spec).await {
                Ok(()) => StepRun::succeeded(None),
                Err(e) => StepRun::errored(
                    e.to_string(),
                    FailureReason::ProvisionError {
                        detail: e.to_string(),
                    },
                ),
            },
            StepKind::Execute { command, args } => {
                match self.commands.execute(context, command, args).await {
                    Ok(output) if output.success() => StepRun::succeeded(Some(output.exit_code)),
                    Ok(output) => StepRun {
                        status: StepStatus::Failed,
                        exit_code: Some(output.exit_code),
                        detail: Some(output_tail(&output.stderr, &output.stdout)),
                        failure: Some(FailureReason::CommandFailure {
                            exit_code: output.exit_code,
                        }),
                    },
                    Err(e) => StepRun::errored(
                        e.to_string(),
                        FailureReason::CommandError {
                            detail: e.to_string(),
                        },
                    ),
                }
            }
        }
    }
}

/// Last lines of stderr, or of stdout when stderr is empty.
fn output_tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.trim_end().lines().collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[skip..].join("\n")
}
