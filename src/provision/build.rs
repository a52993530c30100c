//! Build driver - compiles the platform executables.
//!
//! All targets are built into `bin/.staging` first. Only when every target
//! succeeded are the staged executables moved into `bin/`, so a failed
//! build never leaves a mix of old and new binaries behind.

use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use crate::home::InstallationHome;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One executable produced from the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTarget {
    /// Output file name under `bin/`.
    pub name: &'static str,
    /// Package path relative to the source root.
    pub entry_point: &'static str,
}

/// Every executable the platform needs, in build order.
pub const TARGETS: [BuildTarget; 4] = [
    BuildTarget {
        name: "platform",
        entry_point: "./cmd/platform",
    },
    BuildTarget {
        name: "notifications",
        entry_point: "./cmd/notifications",
    },
    BuildTarget {
        name: "pending_publisher",
        entry_point: "./cmd/pending_publisher",
    },
    BuildTarget {
        name: "migrate",
        entry_point: "./cmd/migrate",
    },
];

/// A published executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub name: String,
    pub entry_point: String,
    pub path: PathBuf,
    pub version: String,
}

pub struct BuildDriver {
    executor: Arc<dyn Executor>,
    verify: bool,
}

impl BuildDriver {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            verify: true,
        }
    }

    /// Disables output checks and publishing, for runs that compile nothing.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Builds all targets, stamping each with `version`.
    pub async fn build_all(
        &self,
        home: &InstallationHome,
        version: &str,
    ) -> Result<Vec<BuildArtifact>> {
        if version.trim().is_empty() {
            return Err(IssuerError::build(
                "all",
                "build version identifier is empty",
            ));
        }

        let staging = home.staging_dir();
        if self.verify {
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            std::fs::create_dir_all(&staging)?;
        }

        let mut artifacts = Vec::with_capacity(TARGETS.len());
        for target in TARGETS.iter() {
            match self.build_one(home, &staging, target, version).await {
                Ok(()) => artifacts.push(BuildArtifact {
                    name: target.name.to_string(),
                    entry_point: target.entry_point.to_string(),
                    path: home.binary(target.name),
                    version: version.to_string(),
                }),
                Err(e) => {
                    self.discard(&staging);
                    return Err(e);
                }
            }
        }

        if self.verify {
            self.publish(home, &staging)?;
        }

        info!(version, targets = artifacts.len(), "Build complete");
        Ok(artifacts)
    }

    async fn build_one(
        &self,
        home: &InstallationHome,
        staging: &Path,
        target: &BuildTarget,
        version: &str,
    ) -> Result<()> {
        let output_path = staging.join(target.name);
        let spec = CommandSpec::new("go")
            .args(["build", "-ldflags"])
            .arg(format!("-X main.build={}", version))
            .arg("-o")
            .arg(output_path.display().to_string())
            .arg(target.entry_point)
            .current_dir(home.source_dir());

        info!(target = target.name, "Building");
        let output = self.executor.run(&spec).await?;
        if !output.success() {
            return Err(IssuerError::build(target.name, output.combined().trim()));
        }

        if self.verify {
            if !output_path.is_file() {
                return Err(IssuerError::build(
                    target.name,
                    format!("compiler produced no file at {}", output_path.display()),
                ));
            }
            make_executable(&output_path)?;
        }
        Ok(())
    }

    fn publish(&self, home: &InstallationHome, staging: &Path) -> Result<()> {
        let bin = home.bin_dir();
        for target in TARGETS.iter() {
            std::fs::rename(staging.join(target.name), bin.join(target.name))?;
        }
        std::fs::remove_dir_all(staging)?;
        Ok(())
    }

    fn discard(&self, staging: &Path) {
        if self.verify && staging.exists() {
            if let Err(e) = std::fs::remove_dir_all(staging) {
                warn!(path = %staging.display(), error = %e, "Failed to clean staging directory");
            }
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
