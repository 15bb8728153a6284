//! Trigger matching: decides whether an incoming event starts a pipeline run.

use std::collections::BTreeSet;

use gatehouse_core::obs;
use gatehouse_core::{Event, EventKind, GatehouseConfig, JobConfig, PipelineRun, TriggerKind};
use tracing::debug;

/// Turns accepted events into fresh pipeline runs.
#[derive(Debug, Clone)]
pub struct TriggerListener {
    pipeline: String,
    accepted: BTreeSet<TriggerKind>,
    jobs: Vec<JobConfig>,
}

impl TriggerListener {
    pub fn new(config: &GatehouseConfig) -> Self {
        Self {
            pipeline: config.pipeline.name.clone(),
            accepted: config.triggers(),
            jobs: config.jobs.clone(),
        }
    }

    pub fn accepts(&self, kind: &EventKind) -> bool {
        kind.trigger_kind()
            .map(|trigger| self.accepted.contains(&trigger))
            .unwrap_or(false)
    }

    /// Create a run for `event` if its kind is in the accepted set.
    ///
    /// Every call instantiates new jobs, so runs never share job state.
    pub fn on_event(&self, event: &Event) -> Option<PipelineRun> {
        if !self.accepts(&event.kind) {
            obs::emit_event_ignored(&event.kind.to_string(), &event.git_ref);
            return None;
        }

        let jobs = self.jobs.iter().map(JobConfig::instantiate).collect();
        let run = PipelineRun::new(self.pipeline.clone(), event.clone(), jobs);
        debug!(
            run_id = %run.id,
            event_kind = %event.kind,
            git_ref = %event.git_ref,
            jobs = run.jobs.len(),
            "Created pipeline run"
        );
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::{JobStatus, RunStatus};

    fn listener(raw: &str) -> TriggerListener {
        TriggerListener::new(&GatehouseConfig::from_toml_str(raw).unwrap())
    }

    #[test]
    fn push_creates_run_with_all_jobs_pending() {
        let listener = TriggerListener::new(&GatehouseConfig::default_workflow());
        let run = listener.on_event(&Event::push("main")).expect("run");
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.event.git_ref, "main");
        assert_eq!(run.jobs.len(), 2);
        assert!(run.jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn pull_request_is_accepted_by_default() {
        let listener = TriggerListener::new(&GatehouseConfig::default_workflow());
        assert!(listener.on_event(&Event::pull_request("feature")).is_some());
    }

    #[test]
    fn unconfigured_event_kind_creates_nothing() {
        let listener = TriggerListener::new(&GatehouseConfig::default_workflow());
        let event = Event::new("issue_comment".parse().unwrap(), "main");
        assert!(listener.on_event(&event).is_none());
    }

    #[test]
    fn respects_narrowed_trigger_set() {
        let listener = listener("[pipeline]\ntriggers = [\"pull_request\"]\n");
        assert!(listener.on_event(&Event::push("main")).is_none());
        assert!(listener.on_event(&Event::pull_request("main")).is_some());
    }

    #[test]
    fn each_run_gets_its_own_identity() {
        let listener = TriggerListener::new(&GatehouseConfig::default_workflow());
        let a = listener.on_event(&Event::push("main")).unwrap();
        let b = listener.on_event(&Event::push("main")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.spec_digest, b.spec_digest);
    }
}
