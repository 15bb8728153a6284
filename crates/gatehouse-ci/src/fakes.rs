//! In-memory fakes for the collaborator ports (testing only)
//!
//! Each fake records what it was asked to do so tests can assert on side
//! effects: installs performed, commands started, contexts handed out.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{
    Channel, CheckoutError, CommandError, CommandOutput, CommandRunner, ContextError,
    ContextProvider, ContextRequirements, ExecutionContext, LogSink, ProvisionError,
    SourceCheckout, StepKind, StepOutcome, ToolchainInstaller, ToolchainSpec,
};

// ---------------------------------------------------------------------------
// FakeInstaller
// ---------------------------------------------------------------------------

/// Installer that remembers every install and can be told to fail for a channel.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    installed: Mutex<Vec<String>>,
    failing_channels: HashSet<String>,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(channel: &str) -> Self {
        Self {
            failing_channels: HashSet::from([channel.to_string()]),
            ..Self::default()
        }
    }

    pub fn install_count(&self) -> usize {
        self.installed.lock().unwrap().len()
    }

    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolchainInstaller for FakeInstaller {
    async fn install(
        &self,
        spec: &ToolchainSpec,
        _channel: &Channel,
    ) -> Result<(), ProvisionError> {
        if self.failing_channels.contains(&spec.channel) {
            return Err(ProvisionError::InstallFailed {
                toolchain: spec.to_string(),
                detail: "toolchain not available".to_string(),
            });
        }
        self.installed.lock().unwrap().push(spec.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeCommandRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Script {
    exit_code: i32,
    delay: Option<Duration>,
    spawn_error: bool,
    panic: bool,
}

/// A command the fake was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub job: String,
    /// `command arg1 arg2 ...`
    pub label: String,
    pub toolchain: Option<String>,
    pub workdir: PathBuf,
}

/// Command runner whose results are scripted per command line.
///
/// Unscripted commands exit 0 immediately.
#[derive(Debug, Default)]
pub struct FakeCommandRunner {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `label` (e.g. `"cargo clippy"`) exit with `exit_code`.
    pub fn with_exit(mut self, label: &str, exit_code: i32) -> Self {
        self.scripts.entry(label.to_string()).or_default().exit_code = exit_code;
        self
    }

    /// Make `label` take `delay` before returning.
    pub fn with_delay(mut self, label: &str, delay: Duration) -> Self {
        self.scripts.entry(label.to_string()).or_default().delay = Some(delay);
        self
    }

    /// Make `label` fail to spawn.
    pub fn with_spawn_error(mut self, label: &str) -> Self {
        self.scripts.entry(label.to_string()).or_default().spawn_error = true;
        self
    }

    /// Make `label` panic once it has been recorded.
    pub fn with_panic(mut self, label: &str) -> Self {
        self.scripts.entry(label.to_string()).or_default().panic = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines started on behalf of `job`, in order.
    pub fn calls_for(&self, job: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.job == job)
            .map(|c| c.label)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn execute(
        &self,
        context: &ExecutionContext,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, CommandError> {
        let label = StepKind::execute(command, args.iter().cloned()).label();
        self.calls.lock().unwrap().push(RecordedCall {
            job: context.job.clone(),
            label: label.clone(),
            toolchain: context.active_toolchain().map(str::to_string),
            workdir: context.workdir.clone(),
        });

        let script = self.scripts.get(&label).cloned().unwrap_or_default();
        if script.panic {
            panic!("{label} panicked");
        }
        if script.spawn_error {
            return Err(CommandError::Spawn {
                command: command.to_string(),
                detail: "No such file or directory".to_string(),
            });
        }
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(CommandOutput {
            exit_code: script.exit_code,
            stdout: String::new(),
            stderr: if script.exit_code == 0 {
                String::new()
            } else {
                format!("{label} failed")
            },
            duration_ms: script.delay.map(|d| d.as_millis() as u64).unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeCheckout
// ---------------------------------------------------------------------------

/// Checkout that resolves every ref to one directory, except refs marked unknown.
#[derive(Debug)]
pub struct FakeCheckout {
    dir: PathBuf,
    unknown_refs: HashSet<String>,
    checkouts: Mutex<Vec<String>>,
    released: Mutex<Vec<PathBuf>>,
}

impl FakeCheckout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            unknown_refs: HashSet::new(),
            checkouts: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn with_unknown_ref(mut self, git_ref: &str) -> Self {
        self.unknown_refs.insert(git_ref.to_string());
        self
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.checkouts.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<PathBuf> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceCheckout for FakeCheckout {
    async fn checkout(&self, git_ref: &str) -> Result<PathBuf, CheckoutError> {
        self.checkouts.lock().unwrap().push(git_ref.to_string());
        if self.unknown_refs.contains(git_ref) {
            return Err(CheckoutError::UnknownRef(git_ref.to_string()));
        }
        Ok(self.dir.clone())
    }

    async fn release(&self, source_dir: &Path) -> Result<(), CheckoutError> {
        self.released.lock().unwrap().push(source_dir.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeContextProvider
// ---------------------------------------------------------------------------

/// Context provider that hands out contexts rooted at `<source>/<job>` without
/// touching the filesystem.
#[derive(Debug, Default)]
pub struct FakeContextProvider {
    failing_jobs: HashSet<String>,
    acquired: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl FakeContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(job: &str) -> Self {
        Self {
            failing_jobs: HashSet::from([job.to_string()]),
            ..Self::default()
        }
    }

    pub fn acquired(&self) -> Vec<String> {
        self.acquired.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextProvider for FakeContextProvider {
    async fn acquire(
        &self,
        requirements: &ContextRequirements,
    ) -> Result<ExecutionContext, ContextError> {
        if self.failing_jobs.contains(&requirements.job) {
            return Err(ContextError::Acquire {
                job: requirements.job.clone(),
                detail: "no capacity".to_string(),
            });
        }
        self.acquired.lock().unwrap().push(requirements.job.clone());
        Ok(ExecutionContext::new(
            requirements.job.clone(),
            requirements.source_dir.join(&requirements.job),
        ))
    }

    async fn release(&self, context: ExecutionContext) -> Result<(), ContextError> {
        self.released.lock().unwrap().push(context.job);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryLogSink
// ---------------------------------------------------------------------------

/// Log sink that keeps every step record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<(String, StepOutcome)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, StepOutcome)> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_for(&self, job: &str) -> Vec<StepOutcome> {
        self.records()
            .into_iter()
            .filter(|(j, _)| j == job)
            .map(|(_, outcome)| outcome)
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, job: &str, _step: &StepKind, outcome: &StepOutcome) {
        self.records
            .lock()
            .unwrap()
            .push((job.to_string(), outcome.clone()));
    }
}
