//! Deterministic identity for a set of job definitions.

use sha2::{Digest, Sha256};

use crate::model::{Job, StepKind};

/// SHA-256 over the ordered job definitions (names, steps, timeouts).
///
/// Two runs built from the same workflow share a digest, whatever their ref.
pub fn compute_jobs_digest(jobs: &[Job]) -> String {
    let mut hasher = Sha256::new();
    for job in jobs {
        hasher.update(job.name.as_bytes());
        hasher.update(b"\0");
        if let Some(timeout) = job.timeout_secs {
            hasher.update(timeout.to_le_bytes());
        }
        for step in &job.steps {
            match &step.kind {
                StepKind::Provision(spec) => {
                    hasher.update(b"provision\0");
                    hasher.update(spec.key().as_bytes());
                }
                StepKind::Execute { command, args } => {
                    hasher.update(b"execute\0");
                    hasher.update(command.as_bytes());
                    for arg in args {
                        hasher.update(b"\0");
                        hasher.update(arg.as_bytes());
                    }
                }
            }
            hasher.update(b"\n");
        }
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// First 12 hex characters of a digest.
pub fn short_digest(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}
