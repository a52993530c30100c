//! Database initializer - creates the application role and database, and
//! applies schema migrations.

use crate::config::DatabaseConfig;
use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use crate::home::InstallationHome;
use crate::provision::render::EnvironmentConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one provisioning statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutcome {
    Applied,
    AlreadyExists,
}

pub struct DatabaseInitializer {
    executor: Arc<dyn Executor>,
    settings: DatabaseConfig,
}

impl DatabaseInitializer {
    pub fn new(executor: Arc<dyn Executor>, settings: DatabaseConfig) -> Self {
        Self { executor, settings }
    }

    /// Statements run as the administrative account, in order.
    pub fn statements(&self) -> Result<Vec<String>> {
        let user = identifier(&self.settings.user)?;
        let name = identifier(&self.settings.name)?;
        let password = self.settings.password.replace('\'', "''");

        Ok(vec![
            format!("CREATE USER {} WITH PASSWORD '{}';", user, password),
            format!("CREATE DATABASE {} OWNER {};", name, user),
            format!("GRANT ALL PRIVILEGES ON DATABASE {} TO {};", name, user),
        ])
    }

    /// Creates the role and database; objects that already exist are kept.
    pub async fn provision(&self) -> Result<Vec<StatementOutcome>> {
        let mut outcomes = Vec::new();
        for statement in self.statements()? {
            let spec = CommandSpec::new("psql")
                .args(["-v", "ON_ERROR_STOP=1", "-c"])
                .arg(statement.as_str())
                .run_as(self.settings.admin_user.as_str());

            let output = self.executor.run(&spec).await?;
            if output.success() {
                outcomes.push(StatementOutcome::Applied);
            } else if output.combined().contains("already exists") {
                warn!(
                    output = %output.combined().trim(),
                    "Database object already exists, keeping it"
                );
                outcomes.push(StatementOutcome::AlreadyExists);
            } else {
                return Err(IssuerError::database(format!(
                    "provisioning statement failed: {}",
                    output.combined().trim()
                )));
            }
        }

        info!(
            database = %self.settings.name,
            user = %self.settings.user,
            "Database provisioned"
        );
        Ok(outcomes)
    }

    /// Runs the migration executable with the rendered configuration.
    pub async fn migrate(&self, home: &InstallationHome, env: &EnvironmentConfig) -> Result<()> {
        let spec = env.apply(
            CommandSpec::new(home.binary("migrate").display().to_string())
                .current_dir(home.source_dir()),
        );

        info!("Applying schema migrations");
        let output = self.executor.run(&spec).await?;
        if output.success() {
            info!("Schema migrations applied");
            Ok(())
        } else {
            Err(IssuerError::database(format!(
                "migration failed: {}",
                output.combined().trim()
            )))
        }
    }
}

/// Accepts only plain SQL identifiers; anything else could break quoting.
fn identifier(value: &str) -> Result<&str> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(value)
    } else {
        Err(IssuerError::config(format!(
            "'{}' is not a valid database identifier",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, Recorded, RecordingExecutor};

    fn initializer(executor: Arc<RecordingExecutor>) -> DatabaseInitializer {
        DatabaseInitializer::new(executor, DatabaseConfig::default())
    }

    #[tokio::test]
    async fn test_provision_runs_three_statements_as_admin() {
        let executor = Arc::new(RecordingExecutor::new());
        let outcomes = initializer(executor.clone()).provision().await.unwrap();

        assert_eq!(outcomes, vec![StatementOutcome::Applied; 3]);
        let recorded = executor.recorded();
        assert_eq!(recorded.len(), 3);
        match &recorded[0] {
            Recorded::Run(spec) => {
                assert_eq!(spec.run_as.as_deref(), Some("postgres"));
                assert_eq!(
                    spec.args.last().map(String::as_str),
                    Some("CREATE USER polygonid WITH PASSWORD 'strongpasswordapp';")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_existing_objects_are_tolerated() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond(
            "CREATE USER",
            CommandOutput::failed(1, "ERROR:  role \"polygonid\" already exists"),
        );
        executor.respond(
            "CREATE DATABASE",
            CommandOutput::failed(1, "ERROR:  database \"platformid\" already exists"),
        );

        let outcomes = initializer(executor).provision().await.unwrap();
        assert_eq!(
            outcomes,
            vec![
                StatementOutcome::AlreadyExists,
                StatementOutcome::AlreadyExists,
                StatementOutcome::Applied,
            ]
        );
    }

    #[tokio::test]
    async fn test_other_failures_are_fatal() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond(
            "CREATE USER",
            CommandOutput::failed(2, "psql: error: connection to server failed"),
        );

        let err = initializer(executor.clone()).provision().await.unwrap_err();
        assert!(matches!(err, IssuerError::Database { .. }));
        assert_eq!(executor.commands().len(), 1);
    }

    #[test]
    fn test_password_quotes_are_escaped() {
        let settings = DatabaseConfig {
            password: "it's".to_string(),
            ..DatabaseConfig::default()
        };
        let init = DatabaseInitializer::new(Arc::new(RecordingExecutor::new()), settings);
        assert!(init.statements().unwrap()[0].contains("PASSWORD 'it''s'"));
    }

    #[test]
    fn test_invalid_identifier_is_rejected() {
        let settings = DatabaseConfig {
            name: "db; DROP".to_string(),
            ..DatabaseConfig::default()
        };
        let init = DatabaseInitializer::new(Arc::new(RecordingExecutor::new()), settings);
        assert!(matches!(init.statements(), Err(IssuerError::Config { .. })));
    }

    #[tokio::test]
    async fn test_migrate_passes_environment() {
        let executor = Arc::new(RecordingExecutor::new());
        let home = InstallationHome::new("/opt/issuer");
        let mut env = EnvironmentConfig::default();
        env.set("ISSUER_DATABASE_URL", "postgres://x");

        initializer(executor.clone()).migrate(&home, &env).await.unwrap();

        match &executor.recorded()[0] {
            Recorded::Run(spec) => {
                assert_eq!(spec.program, "/opt/issuer/bin/migrate");
                assert_eq!(spec.env.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_migrate_failure_is_fatal() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("bin/migrate", CommandOutput::failed(1, "dirty database"));

        let err = initializer(executor)
            .migrate(&InstallationHome::new("/opt/issuer"), &EnvironmentConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dirty database"));
    }
}
