//! Service registrar - turns built executables into supervisor units.

use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::home::InstallationHome;
use crate::supervisor::{ManagedUnit, Supervisor, UnitDefinition};
use std::sync::Arc;
use tracing::info;

/// Writes one unit per managed process and reloads the supervisor once.
pub struct ServiceRegistrar {
    supervisor: Arc<dyn Supervisor>,
    settings: SupervisorConfig,
}

impl ServiceRegistrar {
    pub fn new(supervisor: Arc<dyn Supervisor>, settings: SupervisorConfig) -> Self {
        Self {
            supervisor,
            settings,
        }
    }

    /// Builds the definition for one managed process.
    pub fn definition(&self, home: &InstallationHome, unit: ManagedUnit) -> UnitDefinition {
        UnitDefinition {
            name: unit.unit_name(&self.settings.unit_prefix),
            description: unit.description().to_string(),
            working_dir: home.source_dir(),
            env_file: home.env_file(),
            exec_start: home.binary(unit.logical_name()),
            restart_sec: self.settings.restart_sec,
            after: self.settings.after.clone(),
            user: self.settings.user.clone(),
        }
    }

    /// Writes all units, reloads definitions, then enables each unit.
    ///
    /// A failed write aborts before the reload, so the supervisor never
    /// sees a partial set.
    pub async fn register(&self, home: &InstallationHome) -> Result<Vec<String>> {
        let definitions: Vec<UnitDefinition> = ManagedUnit::ALL
            .iter()
            .map(|unit| self.definition(home, *unit))
            .collect();

        for definition in &definitions {
            self.supervisor.write_unit(definition).await?;
            info!(unit = %definition.name, "Unit definition written");
        }

        self.supervisor.reload().await?;

        for definition in &definitions {
            self.supervisor.enable(&definition.name).await?;
        }

        Ok(definitions.into_iter().map(|d| d.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RecordingExecutor;
    use crate::supervisor::testing::MemorySupervisor;
    use crate::supervisor::SystemdSupervisor;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_register_writes_three_units_and_reloads_once() {
        let supervisor = Arc::new(MemorySupervisor::default());
        let registrar = ServiceRegistrar::new(supervisor.clone(), SupervisorConfig::default());
        let home = InstallationHome::new("/opt/issuer");

        let names = registrar.register(&home).await.unwrap();

        assert_eq!(
            names,
            vec![
                "issuer-platform",
                "issuer-notifications",
                "issuer-pending-publisher"
            ]
        );
        assert_eq!(
            supervisor.calls(),
            vec![
                "write issuer-platform",
                "write issuer-notifications",
                "write issuer-pending-publisher",
                "reload",
                "enable issuer-platform",
                "enable issuer-notifications",
                "enable issuer-pending-publisher",
            ]
        );
    }

    #[test]
    fn test_definition_wiring() {
        let supervisor = Arc::new(MemorySupervisor::default());
        let registrar = ServiceRegistrar::new(supervisor, SupervisorConfig::default());
        let home = InstallationHome::new("/opt/issuer");

        let unit = registrar.definition(&home, ManagedUnit::PendingPublisher);
        assert_eq!(unit.working_dir, PathBuf::from("/opt/issuer/source"));
        assert_eq!(unit.env_file, PathBuf::from("/opt/issuer/.env-issuer"));
        assert_eq!(
            unit.exec_start,
            PathBuf::from("/opt/issuer/bin/pending_publisher")
        );
        assert_eq!(unit.restart_sec, 5);
    }

    #[test]
    fn test_relative_home_renders_absolute_paths() {
        let supervisor = Arc::new(MemorySupervisor::default());
        let registrar = ServiceRegistrar::new(supervisor, SupervisorConfig::default());
        let home = InstallationHome::new("issuer-home");
        let root = std::env::current_dir().unwrap().join("issuer-home");

        let text = registrar.definition(&home, ManagedUnit::Platform).render();

        assert!(text.contains(&format!("WorkingDirectory={}", root.join("source").display())));
        assert!(text.contains(&format!("EnvironmentFile={}", root.join(".env-issuer").display())));
        assert!(text.contains(&format!("ExecStart={}", root.join("bin/platform").display())));
    }

    #[tokio::test]
    async fn test_write_failure_aborts_before_reload() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_writes("issuer-notifications");
        let supervisor = Arc::new(SystemdSupervisor::new(
            executor.clone(),
            "/etc/systemd/system",
        ));
        let registrar = ServiceRegistrar::new(supervisor, SupervisorConfig::default());

        let result = registrar.register(&InstallationHome::new("/opt/issuer")).await;

        assert!(result.is_err());
        assert!(!executor
            .commands()
            .iter()
            .any(|c| c.contains("daemon-reload")));
        assert_eq!(executor.writes().len(), 2);
    }
}
