//! Pipeline run orchestration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use gatehouse_core::obs;
use gatehouse_core::{
    CommandRunner, ContextProvider, FailureReason, JobResult, LogSink, PipelineReport,
    PipelineRun, Result, RunStatus, SourceCheckout, ToolchainInstaller,
};
use tracing::{info, warn, Instrument};

use crate::checkout::{GitCheckout, WorkingCopyCheckout};
use crate::context::LocalContextProvider;
use crate::gate::GateAggregator;
use crate::job::JobRunner;
use crate::process::ProcessCommandRunner;
use crate::provisioner::{RustupInstaller, ToolchainProvisioner};
use crate::scheduler::JobScheduler;
use crate::sink::TracingLogSink;

/// Drives a [`PipelineRun`] from `Pending` to a terminal status.
pub struct PipelineRunner {
    checkout: Arc<dyn SourceCheckout>,
    scheduler: JobScheduler,
}

impl PipelineRunner {
    pub fn new(
        checkout: Arc<dyn SourceCheckout>,
        contexts: Arc<dyn ContextProvider>,
        installer: Arc<dyn ToolchainInstaller>,
        commands: Arc<dyn CommandRunner>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let runner = JobRunner::new(ToolchainProvisioner::new(installer), commands, sink);
        Self {
            checkout,
            scheduler: JobScheduler::new(contexts, runner),
        }
    }

    /// Runner wired to the local machine: git or working-copy checkout,
    /// temp-dir contexts, rustup and real processes.
    pub fn local(repo: impl Into<PathBuf>, in_place: bool) -> Self {
        let repo = repo.into();
        let checkout: Arc<dyn SourceCheckout> = if in_place {
            Arc::new(WorkingCopyCheckout::new(repo))
        } else {
            Arc::new(GitCheckout::new(repo))
        };
        Self::new(
            checkout,
            Arc::new(LocalContextProvider::new()),
            Arc::new(RustupInstaller::default()),
            Arc::new(ProcessCommandRunner),
            Arc::new(TracingLogSink),
        )
    }

    /// Execute every job of `run` and evaluate the gate.
    ///
    /// A checkout failure ends the run without starting any job; each job is
    /// then reported `Errored` with a `CheckoutError` reason. Job-level
    /// problems never surface as `Err`: they are part of the report. A run
    /// whose jobs share a name is refused while still `Pending`.
    pub async fn run(&self, run: PipelineRun) -> Result<PipelineReport> {
        let run_id = run.short_id();
        let span = obs::run_span(&run_id);
        self.execute(run, run_id).instrument(span).await
    }

    async fn execute(&self, mut run: PipelineRun, run_id: String) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        run.ensure_unique_jobs()?;
        run.transition(RunStatus::Running)?;
        obs::emit_run_started(
            &run_id,
            &run.pipeline,
            &run.event.kind.to_string(),
            &run.event.git_ref,
            run.jobs.len(),
        );

        let jobs = std::mem::take(&mut run.jobs);
        let checkout = self.checkout.checkout(&run.event.git_ref).await;
        let results: BTreeMap<String, JobResult> = match checkout {
            Ok(source_dir) => {
                info!(run_id = %run_id, source = %source_dir.display(), "Source ready");
                let results = self.scheduler.run_all(jobs, &source_dir).await;
                if let Err(e) = self.checkout.release(&source_dir).await {
                    warn!(run_id = %run_id, error = %e, "Failed to release source tree");
                }
                results?
            }
            Err(e) => {
                obs::emit_checkout_failed(&run_id, &run.event.git_ref, &e);
                let reason = FailureReason::CheckoutError {
                    detail: e.to_string(),
                };
                jobs.iter()
                    .map(|job| (job.name.clone(), JobResult::not_started(job, reason.clone())))
                    .collect()
            }
        };

        let verdict = GateAggregator::aggregate(&results);
        obs::emit_gate_evaluated(
            &run_id,
            results.len(),
            verdict.failures().len(),
            verdict.passed(),
        );
        run.transition(verdict.run_status())?;

        let report = PipelineReport {
            run_id: run.id,
            pipeline: run.pipeline,
            event: run.event.kind,
            git_ref: run.event.git_ref,
            spec_digest: run.spec_digest,
            status: run.status,
            verdict,
            jobs: results,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        obs::emit_run_finished(
            &run_id,
            report.duration_ms,
            report.passed_count(),
            report.failed_count(),
            report.verdict.passed(),
        );
        Ok(report)
    }
}
