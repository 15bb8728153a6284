//! Source checkout providers.
//!
//! [`GitCheckout`] produces a detached, private clone of a local repository at
//! the requested ref. [`WorkingCopyCheckout`] uses a directory as it is, for
//! running the gate against uncommitted changes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use gatehouse_core::{CheckoutError, SourceCheckout};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Run git in `dir`, returning trimmed stdout on success.
async fn git(dir: &Path, args: &[&str]) -> Result<String, CheckoutError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| CheckoutError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CheckoutError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Checks refs out of a local git repository into temporary clones.
///
/// A clone is removed when it is released, or at the latest when the provider
/// is dropped.
#[derive(Debug)]
pub struct GitCheckout {
    repo: PathBuf,
    checkouts: Mutex<Vec<TempDir>>,
}

impl GitCheckout {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            checkouts: Mutex::new(Vec::new()),
        }
    }

    /// Resolve `git_ref` to a commit SHA in the source repository.
    pub async fn resolve(&self, git_ref: &str) -> Result<String, CheckoutError> {
        if !self.repo.is_dir() {
            return Err(CheckoutError::RepositoryNotFound(self.repo.clone()));
        }
        git(&self.repo, &["rev-parse", "--is-inside-work-tree"]).await?;

        let spec = format!("{git_ref}^{{commit}}");
        git(&self.repo, &["rev-parse", "--verify", "--quiet", &spec])
            .await
            .map_err(|_| CheckoutError::UnknownRef(git_ref.to_string()))
    }
}

#[async_trait]
impl SourceCheckout for GitCheckout {
    async fn checkout(&self, git_ref: &str) -> Result<PathBuf, CheckoutError> {
        let sha = self.resolve(git_ref).await?;
        let repo = self
            .repo
            .canonicalize()
            .map_err(|_| CheckoutError::RepositoryNotFound(self.repo.clone()))?;

        let scratch = tempfile::Builder::new()
            .prefix("gatehouse-src-")
            .tempdir()
            .map_err(|e| CheckoutError::Io(e.to_string()))?;
        let target = scratch.path().join("src");
        let repo = repo.to_string_lossy().to_string();
        let target_str = target.to_string_lossy().to_string();

        debug!(repo = %repo, sha = %sha, "Cloning source tree");
        git(
            scratch.path(),
            &["clone", "--quiet", "--no-checkout", &repo, &target_str],
        )
        .await?;

        // Refs outside branches and tags (e.g. refs/pull/*) are not cloned.
        let commit = format!("{sha}^{{commit}}");
        if git(&target, &["cat-file", "-e", &commit]).await.is_err() {
            git(&target, &["fetch", "--quiet", "origin", git_ref]).await?;
        }
        git(&target, &["checkout", "--quiet", "--detach", &sha]).await?;

        info!(git_ref = %git_ref, sha = %sha, path = %target.display(), "Checked out source");

        match self.checkouts.lock() {
            Ok(mut checkouts) => checkouts.push(scratch),
            Err(_) => {
                // Never delete the tree under a running job.
                warn!(
                    path = %scratch.path().display(),
                    "Checkout registry poisoned; leaving clone in place"
                );
                let _ = scratch.keep();
            }
        }
        Ok(target)
    }

    async fn release(&self, source_dir: &Path) -> Result<(), CheckoutError> {
        let scratch = {
            let mut checkouts = self
                .checkouts
                .lock()
                .map_err(|_| CheckoutError::Io("checkout registry poisoned".to_string()))?;
            let found = checkouts
                .iter()
                .position(|dir| dir.path().join("src") == source_dir);
            match found {
                Some(index) => checkouts.swap_remove(index),
                None => {
                    debug!(path = %source_dir.display(), "Not one of our clones; keeping it");
                    return Ok(());
                }
            }
        };

        let path = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || scratch.close())
            .await
            .map_err(|e| CheckoutError::Io(e.to_string()))?
            .map_err(|e| CheckoutError::Io(format!("failed to remove {}: {e}", path.display())))?;
        debug!(path = %source_dir.display(), "Removed source clone");
        Ok(())
    }
}

/// Uses an existing directory as the source tree, whatever the ref.
#[derive(Debug, Clone)]
pub struct WorkingCopyCheckout {
    dir: PathBuf,
}

impl WorkingCopyCheckout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SourceCheckout for WorkingCopyCheckout {
    async fn checkout(&self, git_ref: &str) -> Result<PathBuf, CheckoutError> {
        if !self.dir.is_dir() {
            return Err(CheckoutError::RepositoryNotFound(self.dir.clone()));
        }
        let dir = self
            .dir
            .canonicalize()
            .map_err(|e| CheckoutError::Io(e.to_string()))?;
        debug!(git_ref = %git_ref, path = %dir.display(), "Using working copy as source");
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "--quiet"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("lib.rs"), "pub fn v1() {}\n").unwrap();
        run_git(dir.path(), &["add", "lib.rs"]);
        run_git(dir.path(), &["commit", "--quiet", "-m", "initial"]);
        run_git(dir.path(), &["tag", "v1"]);
        std::fs::write(dir.path().join("lib.rs"), "pub fn v2() {}\n").unwrap();
        run_git(dir.path(), &["commit", "--quiet", "-am", "second"]);
        dir
    }

    #[tokio::test]
    async fn checks_out_head() {
        let repo = make_git_repo();
        let checkout = GitCheckout::new(repo.path());

        let tree = checkout.checkout("HEAD").await.unwrap();

        let content = std::fs::read_to_string(tree.join("lib.rs")).unwrap();
        assert!(content.contains("v2"));
        assert_ne!(tree, repo.path());
    }

    #[tokio::test]
    async fn checks_out_older_tag() {
        let repo = make_git_repo();
        let checkout = GitCheckout::new(repo.path());

        let tree = checkout.checkout("v1").await.unwrap();

        let content = std::fs::read_to_string(tree.join("lib.rs")).unwrap();
        assert!(content.contains("v1"));
        let head = run_git(&tree, &["rev-parse", "HEAD"]);
        assert_eq!(head, run_git(repo.path(), &["rev-parse", "v1"]));
    }

    #[tokio::test]
    async fn checks_out_ref_outside_branches_and_tags() {
        let repo = make_git_repo();
        let tree_id = run_git(repo.path(), &["rev-parse", "HEAD^{tree}"]);
        let dangling = run_git(repo.path(), &["commit-tree", &tree_id, "-m", "pr head"]);
        run_git(repo.path(), &["update-ref", "refs/pull/1/head", &dangling]);

        let checkout = GitCheckout::new(repo.path());
        let tree = checkout.checkout("refs/pull/1/head").await.unwrap();

        assert_eq!(run_git(&tree, &["rev-parse", "HEAD"]), dangling);
    }

    #[tokio::test]
    async fn resolves_full_sha() {
        let repo = make_git_repo();
        let sha = run_git(repo.path(), &["rev-parse", "HEAD~1"]);
        let resolved = GitCheckout::new(repo.path()).resolve(&sha).await.unwrap();
        assert_eq!(resolved, sha);
    }

    #[tokio::test]
    async fn unknown_ref_is_reported() {
        let repo = make_git_repo();
        let err = GitCheckout::new(repo.path())
            .checkout("does-not-exist")
            .await
            .unwrap_err();
        assert_eq!(err, CheckoutError::UnknownRef("does-not-exist".to_string()));
    }

    #[tokio::test]
    async fn missing_repository_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = GitCheckout::new(&missing).checkout("HEAD").await.unwrap_err();
        assert_eq!(err, CheckoutError::RepositoryNotFound(missing));
    }

    #[tokio::test]
    async fn plain_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitCheckout::new(dir.path()).checkout("HEAD").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Git(_)));
    }

    #[tokio::test]
    async fn release_removes_the_clone() {
        let repo = make_git_repo();
        let checkout = GitCheckout::new(repo.path());
        let first = checkout.checkout("HEAD").await.unwrap();
        let second = checkout.checkout("v1").await.unwrap();

        checkout.release(&first).await.unwrap();

        assert!(!first.exists());
        assert!(!first.parent().unwrap().exists());
        assert!(second.join("lib.rs").exists());

        // Releasing twice, or a foreign path, leaves things alone.
        checkout.release(&first).await.unwrap();
        checkout.release(repo.path()).await.unwrap();
        assert!(repo.path().join("lib.rs").exists());
    }

    #[tokio::test]
    async fn working_copy_is_never_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = WorkingCopyCheckout::new(dir.path());
        let tree = checkout.checkout("HEAD").await.unwrap();

        checkout.release(&tree).await.unwrap();
        assert!(tree.is_dir());
    }

    #[tokio::test]
    async fn working_copy_returns_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingCopyCheckout::new(dir.path())
            .checkout("anything")
            .await
            .unwrap();
        assert_eq!(tree, dir.path().canonicalize().unwrap());
    }
}
