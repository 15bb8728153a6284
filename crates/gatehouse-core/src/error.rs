//! Error taxonomy for the gate runner.
//!
//! Every error that can end a job maps onto a [`FailureReason`](crate::FailureReason)
//! before it reaches the gate aggregator; none of these types cross a job boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while making a toolchain available to a job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// Channel string is not a recognised release channel or version.
    #[error("unknown toolchain channel: {0}")]
    UnknownChannel(String),

    /// Component name is empty or malformed.
    #[error("invalid toolchain component: {0:?}")]
    InvalidComponent(String),

    /// The installer ran but reported a failure.
    #[error("toolchain installation failed for {toolchain}: {detail}")]
    InstallFailed { toolchain: String, detail: String },

    /// The installer binary could not be launched at all.
    #[error("toolchain installer unavailable: {0}")]
    InstallerUnavailable(String),
}

/// Errors raised while obtaining the source tree for a ref.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("source repository not found: {0}")]
    RepositoryNotFound(PathBuf),

    #[error("unknown ref: {0}")]
    UnknownRef(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Errors raised while acquiring or releasing a job's execution context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("failed to prepare execution context for job {job}: {detail}")]
    Acquire { job: String, detail: String },

    #[error("failed to release execution context for job {job}: {detail}")]
    Release { job: String, detail: String },
}

/// Errors raised when a command cannot be started or awaited.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to spawn {command}: {detail}")]
    Spawn { command: String, detail: String },

    #[error("failed waiting on {command}: {detail}")]
    Wait { command: String, detail: String },
}

/// Errors raised while loading or validating a workflow file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("pipeline accepts no trigger events")]
    NoTriggers,

    #[error("job name must not be empty")]
    EmptyJobName,

    #[error("duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("job {job}, step {step}: command must not be empty")]
    EmptyCommand { job: String, step: usize },

    #[error("job {job}, step {step}: provision step has no toolchain and the job declares none")]
    MissingToolchain { job: String, step: usize },

    #[error("job {0}: timeout_secs must be greater than zero")]
    ZeroTimeout(String),
}

/// Top-level domain errors.
#[derive(Error, Debug)]
pub enum GatehouseError {
    #[error("invalid run status transition: {current} -> {requested}")]
    InvalidStatusTransition { current: String, requested: String },

    #[error("duplicate job name in run: {0}")]
    DuplicateJob(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gatehouse domain operations.
pub type Result<T> = std::result::Result<T, GatehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_error_messages_name_the_channel() {
        let err = ProvisionError::UnknownChannel("nightly-invalid".to_string());
        assert_eq!(err.to_string(), "unknown toolchain channel: nightly-invalid");
    }

    #[test]
    fn config_error_converts_into_domain_error() {
        let err: GatehouseError = ConfigError::DuplicateJob("lint".to_string()).into();
        assert!(matches!(err, GatehouseError::Config(ConfigError::DuplicateJob(_))));
        assert!(err.to_string().contains("duplicate job name: lint"));
    }
}
