//! Workspace manager - keeps the platform source at the pinned branch.
//!
//! Clones only when the tree is absent, but always fetches and hard-resets
//! to `origin/<branch>` so a re-run also refreshes stale sources.

use crate::config::RepositoryConfig;
use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use crate::home::InstallationHome;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct WorkspaceManager {
    executor: Arc<dyn Executor>,
    repository: RepositoryConfig,
}

impl WorkspaceManager {
    pub fn new(executor: Arc<dyn Executor>, repository: RepositoryConfig) -> Self {
        Self {
            executor,
            repository,
        }
    }

    /// Ensures the home tree exists and the source sits at the pinned branch.
    pub async fn ensure(&self, home: &InstallationHome) -> Result<PathBuf> {
        for dir in home.directories() {
            self.executor.create_dir_all(&dir).await?;
        }
        let source = home.source_dir();
        let branch = self.repository.branch.as_str();
        let remote_ref = format!("origin/{}", branch);

        if source.join(".git").exists() {
            info!(path = %source.display(), branch, "Source present, fetching");
            self.git(&source, &["fetch", "--prune", "origin", branch])
                .await?;
        } else {
            info!(url = %self.repository.url, branch, "Cloning source");
            let spec = CommandSpec::new("git")
                .args(["clone", "--branch", branch, self.repository.url.as_str()])
                .arg(source.display().to_string());
            self.check(&spec).await?;
        }

        self.git(&source, &["checkout", "--force", "-B", branch, remote_ref.as_str()])
            .await?;
        self.git(&source, &["reset", "--hard", remote_ref.as_str()]).await?;

        Ok(source)
    }

    /// Short identifier of the checked-out revision.
    pub async fn revision(&self, home: &InstallationHome) -> Result<String> {
        let spec = Self::git_in(&home.source_dir(), &["rev-parse", "--short", "HEAD"]);
        let output = self.executor.run(&spec).await?;
        if !output.success() {
            return Err(IssuerError::workspace(format!(
                "Cannot read source revision: {}",
                output.combined().trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    fn git_in(dir: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new("git")
            .arg("-C")
            .arg(dir.display().to_string())
            .args(args.iter().copied())
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<()> {
        self.check(&Self::git_in(dir, args)).await
    }

    async fn check(&self, spec: &CommandSpec) -> Result<()> {
        let output = self.executor.run(spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(IssuerError::workspace(format!(
                "`{}` failed: {}",
                spec,
                output.combined().trim()
            )))
        }
    }
}
