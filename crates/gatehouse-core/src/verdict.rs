//! The gate decision and the report that carries it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventKind;
use crate::model::{JobResult, JobStatus, RunStatus};

/// A job that kept the gate closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFailure {
    pub job: String,
    pub status: JobStatus,

    /// Machine-readable reason code (`CommandFailure`, `ProvisionError`, ...).
    pub reason: String,

    /// Human-readable explanation.
    pub detail: String,
}

/// Final pass/fail decision over every job of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PipelineVerdict {
    Pass,
    Fail { failures: Vec<JobFailure> },
}

impl PipelineVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, PipelineVerdict::Pass)
    }

    pub fn failures(&self) -> &[JobFailure] {
        match self {
            PipelineVerdict::Pass => &[],
            PipelineVerdict::Fail { failures } => failures,
        }
    }

    /// Names of the jobs that did not succeed.
    pub fn failed_jobs(&self) -> Vec<&str> {
        self.failures().iter().map(|f| f.job.as_str()).collect()
    }

    /// Job name to reason code, for every non-succeeding job.
    pub fn reasons(&self) -> BTreeMap<String, String> {
        self.failures()
            .iter()
            .map(|f| (f.job.clone(), f.reason.clone()))
            .collect()
    }

    /// Run status this verdict settles the run into.
    pub fn run_status(&self) -> RunStatus {
        if self.passed() {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}

/// Everything an observer needs to know about one finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub event: EventKind,
    pub git_ref: String,
    pub spec_digest: String,
    pub status: RunStatus,
    pub verdict: PipelineVerdict,
    pub jobs: BTreeMap<String, JobResult>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn passed_count(&self) -> usize {
        self.jobs.values().filter(|j| j.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.jobs.values().filter(|j| !j.succeeded()).count()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(job: &str, reason: &str) -> JobFailure {
        JobFailure {
            job: job.to_string(),
            status: JobStatus::Failed,
            reason: reason.to_string(),
            detail: String::new(),
        }
    }

    #[test]
    fn pass_has_no_failures() {
        let verdict = PipelineVerdict::Pass;
        assert!(verdict.passed());
        assert!(verdict.failed_jobs().is_empty());
        assert_eq!(verdict.run_status(), RunStatus::Passed);
    }

    #[test]
    fn fail_exposes_reasons_by_job() {
        let verdict = PipelineVerdict::Fail {
            failures: vec![failure("lint", "CommandFailure")],
        };
        assert!(!verdict.passed());
        assert_eq!(verdict.failed_jobs(), vec!["lint"]);
        assert_eq!(
            verdict.reasons().get("lint").map(String::as_str),
            Some("CommandFailure")
        );
        assert_eq!(verdict.run_status(), RunStatus::Failed);
    }

    #[test]
    fn verdict_serializes_with_tag() {
        let json = serde_json::to_value(PipelineVerdict::Fail {
            failures: vec![failure("lint", "CommandFailure")],
        })
        .unwrap();
        assert_eq!(json["verdict"], "fail");
        assert_eq!(json["failures"][0]["reason"], "CommandFailure");

        let json = serde_json::to_value(PipelineVerdict::Pass).unwrap();
        assert_eq!(json["verdict"], "pass");
    }
}
