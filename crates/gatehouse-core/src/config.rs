//! Workflow configuration: parsing, validation and job instantiation.
//!
//! A workflow is a TOML file naming the events that start a run and the
//! independent jobs each run executes:
//!
//! ```toml
//! [pipeline]
//! name = "ci"
//! triggers = ["push", "pull_request"]
//!
//! [[jobs]]
//! name = "format"
//! toolchain = { channel = "stable", components = ["rustfmt"] }
//! steps = [
//!   { provision = {} },
//!   { execute = { command = "cargo", args = ["fmt", "--all", "--", "--check"] } },
//! ]
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::TriggerKind;
use crate::model::{Job, StepKind};
use crate::toolchain::ToolchainSpec;

/// Default file name looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "gatehouse.toml";

/// Formatting and lint gates on the stable toolchain.
///
/// Clippy runs with its default lint levels; warnings are not promoted to errors.
pub const DEFAULT_WORKFLOW: &str = r#"# Gatehouse workflow
[pipeline]
name = "ci"
triggers = ["push", "pull_request"]

[[jobs]]
name = "format"
toolchain = { channel = "stable", components = ["rustfmt"] }
steps = [
  { provision = {} },
  { execute = { command = "cargo", args = ["fmt", "--all", "--", "--check"] } },
]

[[jobs]]
name = "lint"
toolchain = { channel = "stable", components = ["clippy"] }
steps = [
  { provision = {} },
  { execute = { command = "cargo", args = ["clippy", "--workspace", "--all-targets"] } },
]
"#;

fn default_pipeline_name() -> String {
    "ci".to_string()
}

fn default_triggers() -> Vec<TriggerKind> {
    vec![TriggerKind::Push, TriggerKind::PullRequest]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    #[serde(default = "default_triggers")]
    pub triggers: Vec<TriggerKind>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            triggers: default_triggers(),
        }
    }
}

/// A provision step. Without an explicit toolchain it uses the job's.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionStepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteStepConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    Provision(ProvisionStepConfig),
    Execute(ExecuteStepConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl JobConfig {
    /// Build a fresh, pending job from this definition.
    ///
    /// Expects a validated config; a provision step with no toolchain anywhere
    /// falls back to `stable`.
    pub fn instantiate(&self) -> Job {
        let steps = self
            .steps
            .iter()
            .map(|step| match step {
                StepConfig::Provision(provision) => StepKind::Provision(
                    provision
                        .toolchain
                        .clone()
                        .or_else(|| self.toolchain.clone())
                        .unwrap_or_else(|| ToolchainSpec::new("stable")),
                ),
                StepConfig::Execute(execute) => StepKind::Execute {
                    command: execute.command.clone(),
                    args: execute.args.clone(),
                },
            })
            .collect();

        let mut job = Job::new(self.name.clone(), steps);
        job.timeout_secs = self.timeout_secs;
        job
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyJobName);
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout(self.name.clone()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            match step {
                StepConfig::Provision(provision) => {
                    if provision.toolchain.is_none() && self.toolchain.is_none() {
                        return Err(ConfigError::MissingToolchain {
                            job: self.name.clone(),
                            step: index,
                        });
                    }
                }
                StepConfig::Execute(execute) => {
                    if execute.command.trim().is_empty() {
                        return Err(ConfigError::EmptyCommand {
                            job: self.name.clone(),
                            step: index,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// A parsed workflow file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatehouseConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl GatehouseConfig {
    /// Parse and validate a workflow from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GatehouseConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            jobs = config.jobs.len(),
            "Loaded workflow config"
        );
        Ok(config)
    }

    /// The built-in format + lint workflow.
    pub fn default_workflow() -> Self {
        toml::from_str(DEFAULT_WORKFLOW).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.triggers.is_empty() {
            return Err(ConfigError::NoTriggers);
        }
        let mut seen = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
        }
        Ok(())
    }

    pub fn triggers(&self) -> BTreeSet<TriggerKind> {
        self.pipeline.triggers.iter().copied().collect()
    }

    /// Fresh pending jobs, in declaration order.
    pub fn instantiate_jobs(&self) -> Vec<Job> {
        self.jobs.iter().map(JobConfig::instantiate).collect()
    }
}
