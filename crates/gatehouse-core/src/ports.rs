//! Collaborator ports.
//!
//! The gate runner never talks to git, the filesystem layout, process spawning
//! or a log backend directly; it goes through these traits. Default
//! implementations live in `gatehouse-ci`, along with in-memory fakes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CheckoutError, CommandError, ContextError, ProvisionError};
use crate::model::{StepKind, StepOutcome};
use crate::toolchain::{Channel, ToolchainSpec};

/// Environment variable that selects the active toolchain for rustup proxies.
pub const TOOLCHAIN_ENV_VAR: &str = "RUSTUP_TOOLCHAIN";

/// What a job asks of its execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequirements {
    pub job: String,

    /// Checked-out source tree. Read-only; each context gets its own copy.
    pub source_dir: PathBuf,
}

/// Private, per-job place to run commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub job: String,
    pub workdir: PathBuf,
    env: BTreeMap<String, String>,
    provisioned: BTreeSet<String>,
}

impl ExecutionContext {
    pub fn new(job: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
            workdir: workdir.into(),
            env: BTreeMap::new(),
            provisioned: BTreeSet::new(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Variables layered over the inherited process environment for every command.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn is_provisioned(&self, spec: &ToolchainSpec) -> bool {
        self.provisioned.contains(&spec.key())
    }

    pub fn mark_provisioned(&mut self, spec: &ToolchainSpec) {
        self.provisioned.insert(spec.key());
    }

    /// Channel currently selected for this context, if any.
    pub fn active_toolchain(&self) -> Option<&str> {
        self.env.get(TOOLCHAIN_ENV_VAR).map(String::as_str)
    }
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Produces a working tree for a ref.
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    async fn checkout(&self, git_ref: &str) -> Result<PathBuf, CheckoutError>;

    /// Give back a tree returned by [`checkout`](Self::checkout) once no job
    /// reads it any more. Providers that do not own the tree keep it.
    async fn release(&self, _source_dir: &Path) -> Result<(), CheckoutError> {
        Ok(())
    }
}

/// Hands out and reclaims isolated execution contexts.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn acquire(&self, requirements: &ContextRequirements)
        -> Result<ExecutionContext, ContextError>;

    async fn release(&self, context: ExecutionContext) -> Result<(), ContextError>;
}

/// Runs a command inside an execution context.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        context: &ExecutionContext,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, CommandError>;
}

/// Installs toolchains. Activation and idempotence are handled by the caller.
#[async_trait]
pub trait ToolchainInstaller: Send + Sync {
    async fn install(&self, spec: &ToolchainSpec, channel: &Channel)
        -> Result<(), ProvisionError>;
}

/// Receives one record per finished step.
pub trait LogSink: Send + Sync {
    fn emit(&self, job: &str, step: &StepKind, outcome: &StepOutcome);
}
