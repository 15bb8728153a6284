//! Command execution on the host with `tokio::process`.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use gatehouse_core::{CommandError, CommandOutput, CommandRunner, ExecutionContext};
use tokio::process::Command;
use tracing::debug;

/// Runs commands as child processes of the gate runner.
///
/// The command runs in the context's working directory with the context's
/// environment layered over the inherited one. Children are killed if the
/// future is dropped, so a job timeout does not leave stray processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn execute(
        &self,
        context: &ExecutionContext,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        debug!(
            job = %context.job,
            command = %command,
            args = ?args,
            workdir = %context.workdir.display(),
            "Spawning command"
        );

        let child = Command::new(command)
            .args(args)
            .current_dir(context.workdir())
            .envs(context.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn {
                command: command.to_string(),
                detail: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CommandError::Wait {
                command: command.to_string(),
                detail: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (tempfile::TempDir, ExecutionContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new("echo", dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn execute_simple_command() {
        let (_dir, ctx) = context();
        let output = ProcessCommandRunner::new()
            .execute(&ctx, "echo", &["hello".to_string()])
            .await
            .expect("execute failed");
        assert!(output.success());
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn execute_failing_command() {
        let (_dir, ctx) = context();
        let output = ProcessCommandRunner::new()
            .execute(&ctx, "false", &[])
            .await
            .expect("execute failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn runs_in_context_workdir_with_context_env() {
        let (dir, mut ctx) = context();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        ctx.set_env("GATEHOUSE_TEST_VALUE", "from-context");

        let output = ProcessCommandRunner::new()
            .execute(
                &ctx,
                "sh",
                &[
                    "-c".to_string(),
                    "ls marker.txt && echo $GATEHOUSE_TEST_VALUE".to_string(),
                ],
            )
            .await
            .unwrap();

        assert!(output.success(), "stderr: {}", output.stderr);
        assert!(output.stdout.contains("marker.txt"));
        assert!(output.stdout.contains("from-context"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let (_dir, ctx) = context();
        let err = ProcessCommandRunner::new()
            .execute(&ctx, "/nonexistent-binary-that-does-not-exist", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
