//! Gate evaluation: folds per-job outcomes into one verdict.

use std::collections::BTreeMap;

use gatehouse_core::{JobFailure, JobResult, JobStatus, PipelineVerdict};

/// Reason code for a job that never reached a terminal status.
pub const INCOMPLETE_REASON: &str = "Incomplete";

/// CI gate evaluation rules.
pub struct GateAggregator;

impl GateAggregator {
    /// Evaluate whether every job succeeded.
    ///
    /// Gate rule:
    /// - `Pass` iff every job is `Succeeded` (vacuously true for no jobs)
    /// - otherwise `Fail`, listing each non-succeeding job in name order with
    ///   its reason code
    pub fn aggregate(results: &BTreeMap<String, JobResult>) -> PipelineVerdict {
        let failures: Vec<JobFailure> = results
            .iter()
            .filter(|(_, result)| result.status != JobStatus::Succeeded)
            .map(|(name, result)| match &result.reason {
                Some(reason) => JobFailure {
                    job: name.clone(),
                    status: result.status,
                    reason: reason.code().to_string(),
                    detail: reason.to_string(),
                },
                None => JobFailure {
                    job: name.clone(),
                    status: result.status,
                    reason: INCOMPLETE_REASON.to_string(),
                    detail: format!("job ended in status {}", result.status),
                },
            })
            .collect();

        if failures.is_empty() {
            PipelineVerdict::Pass
        } else {
            PipelineVerdict::Fail { failures }
        }
    }
}
