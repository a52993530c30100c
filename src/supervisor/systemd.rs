//! Systemd supervisor implementation.
//!
//! Uses systemctl for lifecycle commands and journalctl for logs.
//! All writes and state changes are privileged.

use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use crate::supervisor::{
    ServiceAction, Supervisor, UnitDefinition, UnitOperationResult, UnitState,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Systemd-backed supervisor.
pub struct SystemdSupervisor {
    executor: Arc<dyn Executor>,
    unit_dir: PathBuf,
}

impl SystemdSupervisor {
    pub fn new(executor: Arc<dyn Executor>, unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            unit_dir: unit_dir.into(),
        }
    }

    /// Path of the unit file for `name`.
    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", name))
    }

    fn systemctl(args: &[&str]) -> CommandSpec {
        CommandSpec::new("systemctl").args(args.iter().copied())
    }

    async fn lifecycle(&self, unit: &str, action: ServiceAction) -> Result<UnitOperationResult> {
        let verb = action.to_string();
        info!(unit = unit, action = %action, "Issuing supervisor command");

        let output = self
            .executor
            .run(&Self::systemctl(&[verb.as_str(), unit]).privileged())
            .await?;

        if output.success() {
            Ok(UnitOperationResult::success(unit, action))
        } else {
            error!(
                unit = unit,
                action = %action,
                output = %output.combined(),
                "Supervisor rejected command"
            );
            Ok(UnitOperationResult::failure(
                unit,
                action,
                output.combined().trim().to_string(),
            ))
        }
    }
}

#[async_trait]
impl Supervisor for SystemdSupervisor {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn write_unit(&self, unit: &UnitDefinition) -> Result<()> {
        let path = self.unit_path(&unit.name);
        debug!(unit = %unit.name, path = %path.display(), "Writing unit file");

        self.executor
            .write_file(&path, &unit.render(), true)
            .await
            .map_err(|e| {
                IssuerError::supervisor_with_source(
                    format!("Failed to write unit file {}", path.display()),
                    e,
                )
            })
    }

    async fn reload(&self) -> Result<()> {
        let output = self
            .executor
            .run(&Self::systemctl(&["daemon-reload"]).privileged())
            .await?;

        if output.success() {
            info!("Supervisor definitions reloaded");
            Ok(())
        } else {
            Err(IssuerError::supervisor(format!(
                "daemon-reload failed: {}",
                output.combined().trim()
            )))
        }
    }

    async fn enable(&self, unit: &str) -> Result<()> {
        let output = self
            .executor
            .run(&Self::systemctl(&["enable", unit]).privileged())
            .await?;

        if output.success() {
            Ok(())
        } else {
            Err(IssuerError::supervisor(format!(
                "enable {} failed: {}",
                unit,
                output.combined().trim()
            )))
        }
    }

    async fn start(&self, unit: &str) -> Result<UnitOperationResult> {
        self.lifecycle(unit, ServiceAction::Start).await
    }

    async fn stop(&self, unit: &str) -> Result<UnitOperationResult> {
        self.lifecycle(unit, ServiceAction::Stop).await
    }

    async fn state(&self, unit: &str) -> Result<UnitState> {
        // is-active exits non-zero for anything but active; the word is what counts
        let output = self
            .executor
            .run(&Self::systemctl(&["is-active", unit]).read_only())
            .await?;
        Ok(UnitState::from_supervisor(&output.stdout))
    }

    async fn stream_logs(&self, unit: &str) -> Result<()> {
        let spec = CommandSpec::new("journalctl")
            .args(["-u", unit, "-f", "--no-pager"])
            .privileged()
            .read_only();
        self.executor.stream(&spec).await
    }
}
