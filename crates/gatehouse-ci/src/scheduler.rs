//! Concurrent execution of independent jobs.
//!
//! Every job runs in its own tokio task with its own execution context. The
//! scheduler joins over all tasks and never cancels one job because another
//! failed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use gatehouse_core::obs;
use gatehouse_core::{
    ensure_unique_job_names, ContextProvider, ContextRequirements, FailureReason, Job, JobResult,
    Result,
};
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::job::JobRunner;

#[derive(Clone)]
pub struct JobScheduler {
    contexts: Arc<dyn ContextProvider>,
    runner: JobRunner,
}

impl JobScheduler {
    pub fn new(contexts: Arc<dyn ContextProvider>, runner: JobRunner) -> Self {
        Self { contexts, runner }
    }

    /// Start every job at once and wait until all are terminal.
    ///
    /// `source_dir` is the checked-out tree each context is prepared from.
    /// Results are keyed by job name, so a job set with a repeated name is
    /// refused before anything starts.
    pub async fn run_all(
        &self,
        jobs: Vec<Job>,
        source_dir: &Path,
    ) -> Result<BTreeMap<String, JobResult>> {
        ensure_unique_job_names(&jobs)?;

        let mut pending = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let requirements = ContextRequirements {
                job: job.name.clone(),
                source_dir: source_dir.to_path_buf(),
            };
            let contexts = Arc::clone(&self.contexts);
            let runner = self.runner.clone();

            pending.push(job.clone());
            handles.push(tokio::spawn(run_isolated(contexts, runner, requirements, job)));
        }

        debug!(jobs = handles.len(), "All jobs started");

        let mut results = BTreeMap::new();
        for (job, joined) in pending.into_iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(job = %job.name, error = %e, "Job task did not complete");
                    panicked(&job, &e)
                }
            };
            results.insert(result.job.clone(), result);
        }
        Ok(results)
    }
}

fn panicked(job: &Job, error: &JoinError) -> JobResult {
    JobResult::not_started(
        job,
        FailureReason::JobPanicked {
            detail: error.to_string(),
        },
    )
}

/// Acquire a context, run the job in it, release the context.
///
/// The job itself runs in a nested task so the context is released even when
/// the job panics.
async fn run_isolated(
    contexts: Arc<dyn ContextProvider>,
    runner: JobRunner,
    requirements: ContextRequirements,
    job: Job,
) -> JobResult {
    let context = match contexts.acquire(&requirements).await {
        Ok(context) => context,
        Err(e) => {
            let result = JobResult::not_started(
                &job,
                FailureReason::ContextError {
                    detail: e.to_string(),
                },
            );
            obs::emit_job_finished(
                &job.name,
                result.status,
                result.reason.as_ref().map(FailureReason::code),
                0,
            );
            return result;
        }
    };

    let fallback = context.clone();
    let task = tokio::spawn({
        let job = job.clone();
        async move {
            let mut context = context;
            let result = runner.run(job, &mut context).await;
            (result, context)
        }
    });

    let (result, context) = match task.await {
        Ok(finished) => finished,
        Err(e) => {
            error!(job = %job.name, error = %e, "Job panicked");
            let result = panicked(&job, &e);
            obs::emit_job_finished(
                &job.name,
                result.status,
                result.reason.as_ref().map(FailureReason::code),
                0,
            );
            (result, fallback)
        }
    };

    if let Err(e) = contexts.release(context).await {
        obs::emit_context_release_error(&requirements.job, &e);
    }
    result
}
