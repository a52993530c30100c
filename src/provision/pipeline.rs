//! Install pipeline - runs the provisioning steps in order.
//!
//! Progress is checkpointed to `<home>/.install-state.yaml` after every
//! step. An interrupted run resumes after its last completed step; a
//! finished run starts over so every idempotent step is re-checked.

use crate::config::Config;
use crate::error::{IssuerError, Result};
use crate::exec::Executor;
use crate::home::{HomeLock, InstallationHome};
use crate::provision::build::{BuildArtifact, BuildDriver};
use crate::provision::database::DatabaseInitializer;
use crate::provision::deps::{self, DependencyProber};
use crate::provision::render::{ConfigMaterializer, EnvironmentConfig};
use crate::provision::workspace::WorkspaceManager;
use crate::supervisor::{ManagedUnit, ServiceRegistrar, Supervisor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Version stamp used when a dry run cannot read the source revision.
const DRY_RUN_VERSION: &str = "dry-run";

/// One checkpointed install step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    Dependencies,
    Workspace,
    DatabaseProvision,
    Config,
    Build,
    Migrate,
    Services,
}

impl InstallStep {
    /// All steps in execution order.
    pub const ALL: [InstallStep; 7] = [
        InstallStep::Dependencies,
        InstallStep::Workspace,
        InstallStep::DatabaseProvision,
        InstallStep::Config,
        InstallStep::Build,
        InstallStep::Migrate,
        InstallStep::Services,
    ];
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStep::Dependencies => "dependencies",
            InstallStep::Workspace => "workspace",
            InstallStep::DatabaseProvision => "database_provision",
            InstallStep::Config => "config",
            InstallStep::Build => "build",
            InstallStep::Migrate => "migrate",
            InstallStep::Services => "services",
        };
        write!(f, "{}", name)
    }
}

/// Persisted install progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: Vec<InstallStep>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub revision: Option<String>,
}

impl InstallState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            updated_at: now,
            completed: Vec::new(),
            finished: false,
            revision: None,
        }
    }

    /// Reads the checkpoint file, if one exists.
    pub fn load(home: &InstallationHome) -> Result<Option<Self>> {
        let path = home.state_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state = serde_yaml::from_str(&content).map_err(|e| {
            IssuerError::config_with_source(
                format!("Corrupt install checkpoint '{}'", path.display()),
                e,
            )
        })?;
        Ok(Some(state))
    }

    pub fn save(&self, home: &InstallationHome) -> Result<()> {
        std::fs::write(home.state_file(), serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn is_completed(&self, step: InstallStep) -> bool {
        self.completed.contains(&step)
    }

    fn mark(&mut self, step: InstallStep) {
        if !self.is_completed(step) {
            self.completed.push(step);
        }
        self.updated_at = Utc::now();
    }
}

impl Default for InstallState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an install run.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallSummary {
    pub run_id: Uuid,
    pub resumed: bool,
    pub executed: Vec<InstallStep>,
    pub skipped: Vec<InstallStep>,
    pub revision: Option<String>,
    pub artifacts: Vec<BuildArtifact>,
    pub units: Vec<String>,
}

/// Result of an update run.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSummary {
    pub revision: String,
    pub artifacts: Vec<BuildArtifact>,
}

pub struct InstallPipeline {
    config: Config,
    home: InstallationHome,
    executor: Arc<dyn Executor>,
    supervisor: Arc<dyn Supervisor>,
    dry_run: bool,
    verify_builds: bool,
}

impl InstallPipeline {
    pub fn new(
        config: Config,
        home: InstallationHome,
        executor: Arc<dyn Executor>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        Self {
            config,
            home,
            executor,
            supervisor,
            dry_run: false,
            verify_builds: true,
        }
    }

    /// Dry runs neither read nor write checkpoints and skip build output checks.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[cfg(test)]
    fn without_build_verification(mut self) -> Self {
        self.verify_builds = false;
        self
    }

    /// Dry runs only lock a home that already exists, so they create nothing.
    fn lock(&self) -> Result<Option<HomeLock>> {
        if self.dry_run && !self.home.root().exists() {
            return Ok(None);
        }
        HomeLock::acquire(&self.home).map(Some)
    }

    /// Runs every step not yet completed by an interrupted earlier run.
    pub async fn run(&self, from_scratch: bool) -> Result<InstallSummary> {
        let _lock = self.lock()?;

        let previous = if self.dry_run || from_scratch {
            None
        } else {
            InstallState::load(&self.home)?
        };
        let (mut state, resumed) = match previous {
            Some(state) if !state.finished => {
                info!(
                    run_id = %state.run_id,
                    completed = state.completed.len(),
                    "Resuming interrupted install"
                );
                (state, true)
            }
            _ => (InstallState::new(), false),
        };

        let mut summary = InstallSummary {
            run_id: state.run_id,
            resumed,
            executed: Vec::new(),
            skipped: Vec::new(),
            revision: state.revision.clone(),
            artifacts: Vec::new(),
            units: Vec::new(),
        };

        for step in InstallStep::ALL {
            if state.is_completed(step) {
                info!(step = %step, "Step already completed, skipping");
                summary.skipped.push(step);
                continue;
            }

            info!(step = %step, "Running install step");
            self.execute(step, &mut state, &mut summary).await?;
            state.mark(step);
            summary.executed.push(step);
            self.checkpoint(&state)?;
        }

        state.finished = true;
        self.checkpoint(&state)?;
        summary.revision = state.revision.clone();

        info!(run_id = %state.run_id, "Install complete");
        Ok(summary)
    }

    /// Syncs sources, re-renders config, rebuilds and migrates.
    ///
    /// Restarting the units afterwards is left to the caller.
    pub async fn update(&self) -> Result<UpdateSummary> {
        let _lock = self.lock()?;

        self.workspace().ensure(&self.home).await?;
        let revision = self.revision().await?;
        let (env, _) = self.materializer().render(&self.home).await?;
        let artifacts = self.builder().build_all(&self.home, &revision).await?;
        self.database().migrate(&self.home, &env).await?;

        info!(revision = %revision, "Update complete");
        Ok(UpdateSummary {
            revision,
            artifacts,
        })
    }

    /// Regenerates the two configuration artifacts only.
    pub async fn render_config(&self) -> Result<EnvironmentConfig> {
        let _lock = self.lock()?;
        let (env, _) = self.materializer().render(&self.home).await?;
        Ok(env)
    }

    async fn execute(
        &self,
        step: InstallStep,
        state: &mut InstallState,
        summary: &mut InstallSummary,
    ) -> Result<()> {
        match step {
            InstallStep::Dependencies => {
                DependencyProber::new(self.executor.clone())
                    .ensure_all(&deps::required())
                    .await?;
            }
            InstallStep::Workspace => {
                self.workspace().ensure(&self.home).await?;
                state.revision = Some(self.revision().await?);
            }
            InstallStep::DatabaseProvision => {
                self.database().provision().await?;
            }
            InstallStep::Config => {
                self.materializer().render(&self.home).await?;
            }
            InstallStep::Build => {
                let revision = match state.revision.clone() {
                    Some(revision) => revision,
                    None => self.revision().await?,
                };
                summary.artifacts = self.builder().build_all(&self.home, &revision).await?;
                state.revision = Some(revision);
            }
            InstallStep::Migrate => {
                let env = self.environment()?;
                self.database().migrate(&self.home, &env).await?;
            }
            InstallStep::Services => {
                let registrar =
                    ServiceRegistrar::new(self.supervisor.clone(), self.config.supervisor.clone());
                summary.units = registrar.register(&self.home).await?;
                self.start_units().await?;
            }
        }
        Ok(())
    }

    async fn start_units(&self) -> Result<()> {
        for unit in ManagedUnit::ALL {
            let name = unit.unit_name(&self.config.supervisor.unit_prefix);
            let result = self.supervisor.start(&name).await?;
            if !result.success {
                return Err(IssuerError::supervisor(format!(
                    "Failed to start {}: {}",
                    name,
                    result.message.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    fn checkpoint(&self, state: &InstallState) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        state.save(&self.home)
    }

    async fn revision(&self) -> Result<String> {
        let revision = self.workspace().revision(&self.home).await?;
        if revision.is_empty() && self.dry_run {
            warn!("No source revision in dry run, using placeholder version");
            return Ok(DRY_RUN_VERSION.to_string());
        }
        Ok(revision)
    }

    /// The rendered file on disk; dry runs never wrote it.
    fn environment(&self) -> Result<EnvironmentConfig> {
        if self.dry_run {
            Ok(EnvironmentConfig::from_settings(&self.config, &self.home))
        } else {
            EnvironmentConfig::load(&self.home.env_file())
        }
    }

    fn workspace(&self) -> WorkspaceManager {
        WorkspaceManager::new(self.executor.clone(), self.config.repository.clone())
    }

    fn materializer(&self) -> ConfigMaterializer {
        ConfigMaterializer::new(self.executor.clone(), self.config.clone())
    }

    fn builder(&self) -> BuildDriver {
        BuildDriver::new(self.executor.clone())
            .with_verification(self.verify_builds && !self.dry_run)
    }

    fn database(&self) -> DatabaseInitializer {
        DatabaseInitializer::new(self.executor.clone(), self.config.database.clone())
    }
}
