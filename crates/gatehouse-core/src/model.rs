//! Pipeline runs, jobs and steps.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GatehouseError, Result};
use crate::event::Event;
use crate::toolchain::ToolchainSpec;

/// What a step does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Make a toolchain available and active for the rest of the job.
    Provision(ToolchainSpec),

    /// Run a command in the job's working directory.
    Execute { command: String, args: Vec<String> },
}

impl StepKind {
    pub fn execute<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StepKind::Execute {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Short human-readable description used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            StepKind::Provision(spec) => format!("provision {spec}"),
            StepKind::Execute { command, args } if args.is_empty() => command.clone(),
            StepKind::Execute { command, args } => format!("{} {}", command, args.join(" ")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Errored,
    /// Never started because an earlier step of the job did not succeed.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub status: StepStatus,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Errored,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Errored
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Errored => write!(f, "errored"),
        }
    }
}

/// A named, independent sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub steps: Vec<Step>,
    pub status: JobStatus,

    /// Wall-clock budget for the whole job, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Job {
    pub fn new(name: impl Into<String>, steps: Vec<StepKind>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(Step::new).collect(),
            status: JobStatus::Pending,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Why a job did not succeed. `code()` is the stable machine-readable form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code")]
pub enum FailureReason {
    ProvisionError { detail: String },
    CommandFailure { exit_code: i32 },
    TimeoutError { timeout_secs: u64 },
    CheckoutError { detail: String },
    ContextError { detail: String },
    CommandError { detail: String },
    JobPanicked { detail: String },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::ProvisionError { .. } => "ProvisionError",
            FailureReason::CommandFailure { .. } => "CommandFailure",
            FailureReason::TimeoutError { .. } => "TimeoutError",
            FailureReason::CheckoutError { .. } => "CheckoutError",
            FailureReason::ContextError { .. } => "ContextError",
            FailureReason::CommandError { .. } => "CommandError",
            FailureReason::JobPanicked { .. } => "JobPanicked",
        }
    }

    /// Terminal job status implied by this reason.
    pub fn job_status(&self) -> JobStatus {
        match self {
            FailureReason::CommandFailure { .. } => JobStatus::Failed,
            _ => JobStatus::Errored,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CommandFailure { exit_code } => {
                write!(f, "{} (exit code {})", self.code(), exit_code)
            }
            FailureReason::TimeoutError { timeout_secs } => {
                write!(f, "{} (after {}s)", self.code(), timeout_secs)
            }
            FailureReason::ProvisionError { detail }
            | FailureReason::CheckoutError { detail }
            | FailureReason::ContextError { detail }
            | FailureReason::CommandError { detail }
            | FailureReason::JobPanicked { detail } => write!(f, "{}: {}", self.code(), detail),
        }
    }
}

/// Record of one step of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepOutcome {
    pub fn skipped(index: usize, label: String) -> Self {
        Self {
            index,
            label,
            status: StepStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            detail: None,
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobResult {
    pub job: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl JobResult {
    /// A job that ended without executing any of its steps.
    pub fn not_started(job: &Job, reason: FailureReason) -> Self {
        let now = Utc::now();
        Self {
            job: job.name.clone(),
            status: reason.job_status(),
            steps: job
                .steps
                .iter()
                .enumerate()
                .map(|(i, step)| StepOutcome::skipped(i, step.kind.label()))
                .collect(),
            reason: Some(reason),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn steps_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Lifecycle of a pipeline run: `Pending -> Running -> {Passed, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed)
    }

    fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Passed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One invocation of the pipeline, created when an event is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline: String,
    pub event: Event,
    pub jobs: Vec<Job>,
    pub status: RunStatus,
    pub spec_digest: String,
    pub created_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(pipeline: impl Into<String>, event: Event, jobs: Vec<Job>) -> Self {
        let spec_digest = crate::digest::compute_jobs_digest(&jobs);
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            event,
            jobs,
            status: RunStatus::Pending,
            spec_digest,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GatehouseError::InvalidStatusTransition {
                current: self.status.to_string(),
                requested: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..12].to_string()
    }

    /// Fails if two jobs share a name; results are keyed by job name.
    pub fn ensure_unique_jobs(&self) -> Result<()> {
        ensure_unique_job_names(&self.jobs)
    }
}

/// Reject job sets in which a name appears more than once.
pub fn ensure_unique_job_names(jobs: &[Job]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for job in jobs {
        if !seen.insert(job.name.as_str()) {
            return Err(GatehouseError::DuplicateJob(job.name.clone()));
        }
    }
    Ok(())
}
