//! Gatehouse - CI quality gate runner
//!
//! The `gatehouse` command runs a workflow of independent Rust quality jobs
//! (formatting, linting, ...) against a ref and reports a pass/fail verdict.
//!
//! ## Commands
//!
//! - `init`: Write the default workflow file
//! - `validate`: Check a workflow file and show its jobs
//! - `run`: Run the pipeline for an event and ref
//!
//! Exit codes: `0` the gate passed (or the event does not trigger the
//! pipeline), `1` the gate failed, `2` usage or configuration error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatehouse_ci::{PipelineRunner, TriggerListener};
use gatehouse_core::digest::{compute_jobs_digest, short_digest};
use gatehouse_core::{
    Event, EventKind, GatehouseConfig, JobStatus, PipelineReport, StepKind, StepStatus,
    DEFAULT_CONFIG_FILE, DEFAULT_WORKFLOW,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI quality gate runner for Rust workspaces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workflow file
    #[arg(
        short,
        long,
        global = true,
        env = "GATEHOUSE_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default workflow (format + lint) to a new file
    Init {
        /// Directory to write the workflow into (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load and validate the workflow, then list its jobs
    Validate,

    /// Run the pipeline for an event
    Run {
        /// Event kind (push, pull_request, ...)
        #[arg(short, long, default_value = "push")]
        event: String,

        /// Git ref to check out
        #[arg(short = 'r', long = "ref", default_value = "HEAD")]
        git_ref: String,

        /// Repository to check out from (default: current directory)
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Use the working copy as-is instead of a clean checkout of the ref
        #[arg(long)]
        in_place: bool,

        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

/// How a command finished, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed,
    Ignored,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Passed | Outcome::Ignored => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::from(1),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gatehouse_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Init { path } => cmd_init(&path).map(|_| Outcome::Passed),
        Commands::Validate => cmd_validate(&cli.config).map(|_| Outcome::Passed),
        Commands::Run {
            event,
            git_ref,
            repo,
            in_place,
            report,
        } => {
            cmd_run(
                &cli.config,
                EventKind::from(event),
                &git_ref,
                &repo,
                in_place,
                report.as_deref(),
            )
            .await
        }
    };

    match result {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Write the default workflow into `dir`, refusing to overwrite.
fn cmd_init(dir: &Path) -> Result<PathBuf> {
    let target = dir.join(DEFAULT_CONFIG_FILE);
    if target.exists() {
        anyhow::bail!("{} already exists; not overwriting", target.display());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    std::fs::write(&target, DEFAULT_WORKFLOW)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    info!(path = %target.display(), "Wrote default workflow");
    println!("Initialized Gatehouse workflow at {}", target.display());
    Ok(target)
}

fn load_config(path: &Path) -> Result<GatehouseConfig> {
    GatehouseConfig::load(path).with_context(|| {
        format!(
            "Failed to load workflow {} (run `gatehouse init` to create one)",
            path.display()
        )
    })
}

fn cmd_validate(config_path: &Path) -> Result<GatehouseConfig> {
    let config = load_config(config_path)?;
    let jobs = config.instantiate_jobs();
    let digest = compute_jobs_digest(&jobs);

    let triggers: Vec<&str> = config.triggers().iter().map(|t| t.as_str()).collect();
    println!("Workflow: {} ({})", config.pipeline.name, config_path.display());
    println!("Triggers: {}", triggers.join(", "));
    println!("Digest:   {}", short_digest(&digest));
    println!();

    for job in &jobs {
        let timeout = job
            .timeout_secs
            .map(|t| format!(" (timeout {t}s)"))
            .unwrap_or_default();
        println!("  {}{}", job.name, timeout);
        for (index, step) in job.steps.iter().enumerate() {
            let marker = match step.kind {
                StepKind::Provision(_) => "provision",
                StepKind::Execute { .. } => "execute",
            };
            println!("    {index}. [{marker}] {}", step.kind.label());
        }
    }

    println!();
    println!("✓ {} job(s) valid", jobs.len());
    Ok(config)
}

async fn cmd_run(
    config_path: &Path,
    kind: EventKind,
    git_ref: &str,
    repo: &Path,
    in_place: bool,
    report_path: Option<&Path>,
) -> Result<Outcome> {
    let config = load_config(config_path)?;
    let listener = TriggerListener::new(&config);
    let event = Event::new(kind, git_ref);

    let Some(run) = listener.on_event(&event) else {
        println!(
            "Event '{}' does not trigger pipeline '{}'; nothing to do.",
            event.kind, config.pipeline.name
        );
        return Ok(Outcome::Ignored);
    };

    println!("Running pipeline '{}' for {} {}", run.pipeline, event.kind, git_ref);
    println!("Run ID: {}", run.id);
    println!("Jobs: {}", run.jobs.len());
    println!();

    let runner = PipelineRunner::local(repo, in_place);
    let report = runner.run(run).await.context("Pipeline run failed")?;

    print_report(&report);

    if let Some(path) = report_path {
        let json = report.to_json_pretty().context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(if report.verdict.passed() {
        Outcome::Passed
    } else {
        Outcome::Failed
    })
}

fn print_report(report: &PipelineReport) {
    for (name, job) in &report.jobs {
        let status = if job.status == JobStatus::Succeeded { "✓" } else { "✗" };
        match &job.reason {
            Some(reason) => println!("  {status} {name} ({}ms): {reason}", job.duration_ms),
            None => println!("  {status} {name} ({}ms)", job.duration_ms),
        }
        for step in &job.steps {
            if matches!(step.status, StepStatus::Failed | StepStatus::Errored) {
                println!("      step {} `{}` {:?}", step.index, step.label, step.status);
                if let Some(detail) = &step.detail {
                    for line in detail.lines() {
                        println!("        | {line}");
                    }
                }
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} jobs passed in {}ms",
        report.passed_count(),
        report.jobs.len(),
        report.duration_ms
    );
    println!(
        "Gate: {}",
        if report.verdict.passed() { "✓ PASSED" } else { "✗ FAILED" }
    );

    if !report.verdict.passed() {
        println!("Failures:");
        for failure in report.verdict.failures() {
            println!("  - {}: {}", failure.job, failure.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELL_WORKFLOW: &str = r#"
[pipeline]
name = "shell"
triggers = ["push"]

[[jobs]]
name = "ok"
steps = [{ execute = { command = "sh", args = ["-c", "true"] } }]
"#;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "gatehouse",
            "--config",
            "ci.toml",
            "run",
            "--event",
            "pull_request",
            "--ref",
            "refs/pull/3/head",
            "--in-place",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("ci.toml"));
        match cli.command {
            Commands::Run {
                event,
                git_ref,
                in_place,
                report,
                ..
            } => {
                assert_eq!(EventKind::from(event), EventKind::PullRequest);
                assert_eq!(git_ref, "refs/pull/3/head");
                assert!(in_place);
                assert!(report.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_init_writes_default_workflow_once() {
        let dir = tempfile::tempdir().unwrap();

        let path = cmd_init(dir.path()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, DEFAULT_WORKFLOW);

        let err = cmd_init(dir.path()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_validate_default_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = cmd_init(dir.path()).unwrap();

        let config = cmd_validate(&path).unwrap();
        let names: Vec<&str> = config.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["format", "lint"]);
    }

    #[test]
    fn test_validate_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_validate(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("gatehouse init"));
    }

    #[tokio::test]
    async fn test_run_ignores_untriggered_event() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gatehouse.toml");
        std::fs::write(&config, SHELL_WORKFLOW).unwrap();

        let outcome = cmd_run(
            &config,
            EventKind::PullRequest,
            "HEAD",
            dir.path(),
            true,
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
    }

    #[tokio::test]
    async fn test_run_in_place_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gatehouse.toml");
        std::fs::write(&config, SHELL_WORKFLOW).unwrap();
        let report = dir.path().join("report.json");

        let outcome = cmd_run(
            &config,
            EventKind::Push,
            "HEAD",
            dir.path(),
            true,
            Some(&report),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Passed);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["pipeline"], "shell");
        assert_eq!(json["verdict"]["verdict"], "pass");
    }
}
