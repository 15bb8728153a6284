//! Toolchain provisioning for job execution contexts.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::{
    Channel, ExecutionContext, ProvisionError, ToolchainInstaller, ToolchainSpec,
    TOOLCHAIN_ENV_VAR,
};
use tokio::process::Command;
use tracing::{debug, info};

/// Makes a toolchain installed and active inside one execution context.
#[derive(Clone)]
pub struct ToolchainProvisioner {
    installer: Arc<dyn ToolchainInstaller>,
}

impl ToolchainProvisioner {
    pub fn new(installer: Arc<dyn ToolchainInstaller>) -> Self {
        Self { installer }
    }

    /// Ensure `spec` is installed and selected for `context`.
    ///
    /// The channel is validated before anything is installed. A spec already
    /// provisioned in this context is a successful no-op.
    pub async fn provision(
        &self,
        context: &mut ExecutionContext,
        spec: &ToolchainSpec,
    ) -> Result<(), ProvisionError> {
        let channel = spec.validate()?;

        if context.is_provisioned(spec) {
            debug!(job = %context.job, toolchain = %spec, "Toolchain already provisioned");
            return Ok(());
        }

        info!(job = %context.job, toolchain = %spec, "Provisioning toolchain");
        self.installer.install(spec, &channel).await?;

        context.set_env(TOOLCHAIN_ENV_VAR, channel.to_string());
        context.mark_provisioned(spec);
        Ok(())
    }
}

/// Installs toolchains with `rustup toolchain install`.
#[derive(Debug, Clone)]
pub struct RustupInstaller {
    binary: String,
    profile: String,
}

impl Default for RustupInstaller {
    fn default() -> Self {
        Self {
            binary: "rustup".to_string(),
            profile: "minimal".to_string(),
        }
    }
}

impl RustupInstaller {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Arguments passed to the installer for `spec`.
    pub fn install_args(&self, spec: &ToolchainSpec, channel: &Channel) -> Vec<String> {
        let mut args = vec![
            "toolchain".to_string(),
            "install".to_string(),
            channel.to_string(),
            "--profile".to_string(),
            self.profile.clone(),
            "--no-self-update".to_string(),
        ];
        for component in spec.normalized_components() {
            args.push("--component".to_string());
            args.push(component);
        }
        args
    }
}

#[async_trait]
impl ToolchainInstaller for RustupInstaller {
    async fn install(
        &self,
        spec: &ToolchainSpec,
        channel: &Channel,
    ) -> Result<(), ProvisionError> {
        let args = self.install_args(spec, channel);
        debug!(binary = %self.binary, args = ?args, "Running toolchain installer");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProvisionError::InstallerUnavailable(format!("{}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("{} exited with {}", self.binary, output.status)
            } else {
                stderr
            };
            return Err(ProvisionError::InstallFailed {
                toolchain: spec.to_string(),
                detail,
            });
        }

        Ok(())
    }
}
