//! Gatehouse Core
//!
//! Data model and seams for the Gatehouse CI quality gate runner:
//! - Pipeline runs, jobs, steps and their lifecycles
//! - Toolchain specifications and channel parsing
//! - The verdict and run report
//! - Workflow configuration (TOML)
//! - Collaborator ports (checkout, contexts, commands, toolchains, log sink)
//! - Tracing setup and structured lifecycle events

pub mod config;
pub mod digest;
pub mod error;
pub mod event;
pub mod model;
pub mod obs;
pub mod ports;
pub mod telemetry;
pub mod toolchain;
pub mod verdict;

pub use config::{GatehouseConfig, JobConfig, StepConfig, DEFAULT_CONFIG_FILE, DEFAULT_WORKFLOW};
pub use error::{
    CheckoutError, CommandError, ConfigError, ContextError, GatehouseError, ProvisionError, Result,
};
pub use event::{Event, EventKind, TriggerKind};
pub use model::{
    ensure_unique_job_names, FailureReason, Job, JobResult, JobStatus, PipelineRun, RunStatus,
    Step, StepKind, StepOutcome, StepStatus,
};
pub use ports::{
    CommandOutput, CommandRunner, ContextProvider, ContextRequirements, ExecutionContext,
    LogSink, SourceCheckout, ToolchainInstaller, TOOLCHAIN_ENV_VAR,
};
pub use telemetry::init_tracing;
pub use toolchain::{Channel, ToolchainSpec};
pub use verdict::{JobFailure, PipelineReport, PipelineVerdict};

/// Gatehouse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
