//! Filesystem-backed execution contexts.
//!
//! Each acquired context is a fresh temporary directory holding a private copy
//! of the source tree. Nothing a job writes there is visible to another job.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gatehouse_core::{ContextError, ContextProvider, ContextRequirements, ExecutionContext};
use tracing::debug;

/// Directory names never copied into a context.
const EXCLUDED_DIRS: &[&str] = &["target"];

#[derive(Debug, Clone, Default)]
pub struct LocalContextProvider {
    /// Parent for context directories; the system temp dir when unset.
    root: Option<PathBuf>,
}

impl LocalContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn create_workdir(&self, job: &str) -> io::Result<PathBuf> {
        let prefix = format!("gatehouse-{}-", sanitize(job));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &self.root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir.keep())
    }
}

#[async_trait]
impl ContextProvider for LocalContextProvider {
    async fn acquire(
        &self,
        requirements: &ContextRequirements,
    ) -> Result<ExecutionContext, ContextError> {
        let job = requirements.job.clone();
        let acquire_error = |e: io::Error| ContextError::Acquire {
            job: job.clone(),
            detail: e.to_string(),
        };

        if !requirements.source_dir.is_dir() {
            return Err(acquire_error(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source tree {} does not exist", requirements.source_dir.display()),
            )));
        }

        let workdir = self.create_workdir(&job).map_err(&acquire_error)?;
        let source = requirements.source_dir.clone();
        let target = workdir.clone();

        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|r| r);

        match copied {
            Ok(files) => {
                debug!(
                    job = %job,
                    workdir = %workdir.display(),
                    files,
                    "Prepared execution context"
                );
                Ok(ExecutionContext::new(job, workdir))
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&workdir);
                Err(acquire_error(e))
            }
        }
    }

    async fn release(&self, context: ExecutionContext) -> Result<(), ContextError> {
        let workdir = context.workdir.clone();
        tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&workdir))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|r| r)
            .map_err(|e| ContextError::Release {
                job: context.job.clone(),
                detail: e.to_string(),
            })?;
        debug!(job = %context.job, "Released execution context");
        Ok(())
    }
}

/// Keep job names usable as path components.
fn sanitize(job: &str) -> String {
    job.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Recursively copy `src` into `dst`, skipping excluded directories.
/// Returns the number of files copied.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if file_type.is_dir() {
            if EXCLUDED_DIRS.iter().any(|d| entry.file_name() == *d) {
                continue;
            }
            copied += copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
            copied += 1;
        } else {
            std::fs::copy(&from, &to)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let link = std::fs::read_link(from)?;
    std::os::unix::fs::symlink(link, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_file() {
        std::fs::copy(from, to)?;
    }
    Ok(())
}
