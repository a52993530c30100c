//! Lifecycle controller - runtime operations against an installed node.
//!
//! Every operation here is independent and safe to repeat. Problems with a
//! single unit or endpoint are reported, not raised; only preconditions
//! (a missing environment file, a bad argument) fail the operation.

pub mod report;

use crate::client::{ApiReply, PlatformClient};
use crate::config::Config;
use crate::error::{IssuerError, Result};
use crate::home::InstallationHome;
use crate::provision::render::EnvironmentConfig;
use crate::supervisor::{
    ManagedUnit, ServiceAction, Supervisor, UnitOperationResult, UnitState,
};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub use report::{ConfigCheck, EndpointProbe, KeyImport, Reachability, StatusReport, UnitStatus};

/// Default port when the database URL carries none.
const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default port when the cache URL carries none.
const DEFAULT_CACHE_PORT: u16 = 6379;

pub struct LifecycleController {
    config: Config,
    home: InstallationHome,
    supervisor: Arc<dyn Supervisor>,
}

impl LifecycleController {
    pub fn new(config: Config, home: InstallationHome, supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            config,
            home,
            supervisor,
        }
    }

    fn unit_name(&self, unit: ManagedUnit) -> String {
        unit.unit_name(&self.config.supervisor.unit_prefix)
    }

    /// Reports every unit's state and whether the API answers.
    pub async fn status(&self) -> StatusReport {
        let mut units = Vec::with_capacity(ManagedUnit::ALL.len());
        for unit in ManagedUnit::ALL {
            let name = self.unit_name(unit);
            let state = match self.supervisor.state(&name).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(unit = %name, error = %e, "Cannot read unit state");
                    UnitState::Inactive
                }
            };
            units.push(UnitStatus {
                unit,
                name,
                state,
            });
        }

        let api = self.probe_api().await;
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        StatusReport {
            hostname,
            home: self.home.root().to_path_buf(),
            units,
            api_url: self.config.platform.server_url.clone(),
            api,
        }
    }

    async fn probe_api(&self) -> Reachability {
        let client =
            match PlatformClient::from_settings(&self.config.platform, self.config.timeout.health())
            {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "Cannot build API client");
                    return Reachability::Unreachable;
                }
            };
        match client.health().await {
            Ok(()) => Reachability::Reachable,
            Err(e) => {
                debug!(error = %e, "API health check failed");
                Reachability::Unreachable
            }
        }
    }

    /// Fails unless the environment file exists and carries every required key.
    fn ensure_environment(&self) -> Result<()> {
        let env = EnvironmentConfig::load(&self.home.env_file())?;
        let missing = env.missing_keys();
        if !missing.is_empty() {
            return Err(IssuerError::config(format!(
                "Environment file {} is missing: {}",
                self.home.env_file().display(),
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Starts all units in fixed order once the configuration is complete.
    pub async fn start(&self) -> Result<Vec<UnitOperationResult>> {
        self.ensure_environment()?;
        Ok(self.apply(ServiceAction::Start).await)
    }

    /// Stops all units in fixed order.
    pub async fn stop(&self) -> Result<Vec<UnitOperationResult>> {
        Ok(self.apply(ServiceAction::Stop).await)
    }

    /// Stops, pauses, then starts all units.
    ///
    /// The environment is checked before anything is stopped, so a broken
    /// configuration leaves running units alone.
    pub async fn restart(&self) -> Result<Vec<UnitOperationResult>> {
        self.ensure_environment()?;
        let mut results = self.apply(ServiceAction::Stop).await;
        let pause = self.config.timeout.restart_pause();
        if pause > Duration::ZERO {
            debug!(seconds = pause.as_secs(), "Pausing before start");
            tokio::time::sleep(pause).await;
        }
        results.extend(self.apply(ServiceAction::Start).await);
        Ok(results)
    }

    async fn apply(&self, action: ServiceAction) -> Vec<UnitOperationResult> {
        let mut results = Vec::with_capacity(ManagedUnit::ALL.len());
        for unit in ManagedUnit::ALL {
            let name = self.unit_name(unit);
            let outcome = match action {
                ServiceAction::Start => self.supervisor.start(&name).await,
                ServiceAction::Stop => self.supervisor.stop(&name).await,
            };
            let result = outcome
                .unwrap_or_else(|e| UnitOperationResult::failure(&name, action, e.to_string()));
            info!(unit = %name, action = %action, success = result.success, "Unit command issued");
            results.push(result);
        }
        results
    }

    /// Follows one unit's log until interrupted.
    pub async fn logs(&self, unit: Option<ManagedUnit>) -> Result<()> {
        let name = self.unit_name(unit.unwrap_or(ManagedUnit::Platform));
        self.supervisor.stream_logs(&name).await
    }

    /// Bootstraps the key store and returns the command that completes the import.
    ///
    /// The key itself is never written anywhere by this call.
    pub fn import_key(&self, key: &str) -> Result<KeyImport> {
        let key = key.trim();
        if key.is_empty() {
            return Err(IssuerError::usage("import-key requires a non-empty private key"));
        }

        let key_store = self.home.key_store_file();
        std::fs::create_dir_all(self.home.keys_dir())?;
        let created = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&key_store)
        {
            Ok(mut file) => {
                file.write_all(b"[]")?;
                info!(path = %key_store.display(), "Key store created");
                true
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => return Err(e.into()),
        };

        let command = format!(
            "cd {} && set -a && . {} && set +a && go run ./cmd/kms_priv_key_importer --privateKey={}",
            shell_words::quote(&self.home.source_dir().display().to_string()),
            shell_words::quote(&self.home.env_file().display().to_string()),
            shell_words::quote(key),
        );

        Ok(KeyImport {
            key_store,
            created,
            command,
        })
    }

    /// Creates an identity through the running API. Never starts a unit.
    pub async fn create_identity(&self) -> Result<ApiReply> {
        let client =
            PlatformClient::from_settings(&self.config.platform, self.config.timeout.http())?;
        client.create_identity(&self.config.platform.identity).await
    }

    /// Checks the environment file and probes the database and cache.
    pub async fn check_config(&self) -> Result<ConfigCheck> {
        let env_file = self.home.env_file();
        if !env_file.is_file() {
            return Err(IssuerError::config(format!(
                "Environment file {} not found; run install or render-config first",
                env_file.display()
            )));
        }
        let env = EnvironmentConfig::load(&env_file)?;

        let database = self
            .probe_endpoint("database", env.get("ISSUER_DATABASE_URL"), DEFAULT_DATABASE_PORT)
            .await;
        let cache = self
            .probe_endpoint("cache", env.get("ISSUER_CACHE_URL"), DEFAULT_CACHE_PORT)
            .await;

        Ok(ConfigCheck {
            env_file,
            missing_keys: env.missing_keys(),
            database,
            cache,
        })
    }

    async fn probe_endpoint(
        &self,
        name: &'static str,
        url: Option<&str>,
        default_port: u16,
    ) -> EndpointProbe {
        let unreachable = |target: String, detail: String| EndpointProbe {
            name,
            target,
            status: Reachability::Unreachable,
            detail: Some(detail),
        };

        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return unreachable(String::new(), "no URL configured".to_string());
        };
        let parsed = match reqwest::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return unreachable(String::new(), format!("invalid URL: {}", e)),
        };
        let Some(host) = parsed.host_str().map(str::to_string) else {
            return unreachable(String::new(), "URL has no host".to_string());
        };
        let port = parsed.port().unwrap_or(default_port);
        let target = format!("{}:{}", host, port);

        let timeout = self.config.timeout.probe();
        match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_)) => EndpointProbe {
                name,
                target,
                status: Reachability::Reachable,
                detail: None,
            },
            Ok(Err(e)) => unreachable(target, e.to_string()),
            Err(_) => unreachable(target, format!("no answer within {}s", timeout.as_secs())),
        }
    }
}
