//! Workflow file to run record: the pieces a runner stitches together.

use std::collections::BTreeMap;

use chrono::Utc;
use gatehouse_core::{
    Event, EventKind, FailureReason, GatehouseConfig, JobFailure, JobResult, JobStatus,
    PipelineReport, PipelineRun, PipelineVerdict, RunStatus, StepKind, StepStatus, TriggerKind,
    DEFAULT_WORKFLOW,
};

#[test]
fn default_workflow_instantiates_pending_jobs() {
    let config = GatehouseConfig::from_toml_str(DEFAULT_WORKFLOW).unwrap();
    let jobs = config.instantiate_jobs();

    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(matches!(job.steps[0].kind, StepKind::Provision(_)));
        assert!(matches!(job.steps[1].kind, StepKind::Execute { .. }));
    }
    assert_eq!(jobs[0].steps[0].kind.label(), "provision stable+rustfmt");
    assert_eq!(jobs[1].steps[0].kind.label(), "provision stable+clippy");
}

#[test]
fn runs_from_the_same_workflow_share_a_digest() {
    let config = GatehouseConfig::default_workflow();
    let first = PipelineRun::new("ci", Event::push("main"), config.instantiate_jobs());
    let second = PipelineRun::new("ci", Event::pull_request("pr"), config.instantiate_jobs());

    assert_ne!(first.id, second.id);
    assert_eq!(first.spec_digest, second.spec_digest);

    let edited = DEFAULT_WORKFLOW.replace("--all-targets", "--lib");
    let changed = GatehouseConfig::from_toml_str(&edited).unwrap();
    let third = PipelineRun::new("ci", Event::push("main"), changed.instantiate_jobs());
    assert_ne!(first.spec_digest, third.spec_digest);
}

#[test]
fn event_kinds_map_onto_triggers() {
    let config = GatehouseConfig::default_workflow();
    let triggers = config.triggers();

    for raw in ["push", "pull_request", "pull-request"] {
        let kind: EventKind = raw.parse().unwrap();
        let trigger = kind.trigger_kind().unwrap();
        assert!(triggers.contains(&trigger));
    }
    let comment: EventKind = "issue_comment".parse().unwrap();
    assert_eq!(comment.trigger_kind(), None);
    assert_eq!(
        triggers.into_iter().collect::<Vec<_>>(),
        vec![TriggerKind::Push, TriggerKind::PullRequest]
    );
}

#[test]
fn report_round_trips_through_json() {
    let config = GatehouseConfig::default_workflow();
    let mut run = PipelineRun::new("ci", Event::push("refs/heads/main"), config.instantiate_jobs());
    run.transition(RunStatus::Running).unwrap();

    let lint = run.jobs[1].clone();
    let mut jobs = BTreeMap::new();
    jobs.insert(
        "lint".to_string(),
        JobResult::not_started(
            &lint,
            FailureReason::CheckoutError {
                detail: "unknown ref: refs/heads/main".to_string(),
            },
        ),
    );
    let verdict = PipelineVerdict::Fail {
        failures: vec![JobFailure {
            job: "lint".to_string(),
            status: JobStatus::Errored,
            reason: "CheckoutError".to_string(),
            detail: "unknown ref: refs/heads/main".to_string(),
        }],
    };
    run.transition(verdict.run_status()).unwrap();

    let report = PipelineReport {
        run_id: run.id,
        pipeline: run.pipeline.clone(),
        event: run.event.kind.clone(),
        git_ref: run.event.git_ref.clone(),
        spec_digest: run.spec_digest.clone(),
        status: run.status,
        verdict,
        jobs,
        started_at: Utc::now(),
        duration_ms: 3,
    };

    let json = report.to_json_pretty().unwrap();
    let parsed: PipelineReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.status, RunStatus::Failed);
    assert_eq!(parsed.event, EventKind::Push);
    assert_eq!(parsed.verdict.failed_jobs(), vec!["lint"]);
    assert_eq!(parsed.jobs["lint"].steps_with_status(StepStatus::Skipped), 2);
    assert_eq!(parsed.failed_count(), 1);
}
