//! Config materializer - renders the environment file and the resolver
//! settings document consumed by the platform binaries.
//!
//! Both artifacts are regenerated wholesale on every run. The environment
//! file is plain `KEY=value` lines with no quoting, exactly what the
//! supervisor's `EnvironmentFile=` and the platform's own loader expect.

use crate::config::Config;
use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use crate::home::InstallationHome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Keys every platform executable reads at startup.
pub const REQUIRED_KEYS: &[&str] = &[
    "ISSUER_SERVER_URL",
    "ISSUER_SERVER_PORT",
    "ISSUER_DATABASE_URL",
    "ISSUER_CACHE_PROVIDER",
    "ISSUER_CACHE_URL",
    "ISSUER_API_AUTH_USER",
    "ISSUER_API_AUTH_PASSWORD",
    "ISSUER_KMS_BJJ_PROVIDER",
    "ISSUER_KMS_ETH_PROVIDER",
    "ISSUER_KMS_PLUGIN_LOCAL_STORAGE_FILE_PATH",
    "ISSUER_CIRCUIT_PATH",
    "ISSUER_IPFS_GATEWAY_URL",
    "ISSUER_RESOLVER_PATH",
    "ISSUER_LOG_LEVEL",
    "ISSUER_LOG_MODE",
];

/// Ordered key/value configuration shared by all supervised processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentConfig {
    entries: Vec<(String, String)>,
}

impl EnvironmentConfig {
    /// Builds the configuration from settings and host paths.
    pub fn from_settings(config: &Config, home: &InstallationHome) -> Self {
        let platform = &config.platform;
        let mut env = Self::default();

        env.set("ISSUER_ENVIRONMENT", "local");
        env.set("ISSUER_SERVER_URL", &platform.server_url);
        env.set("ISSUER_SERVER_PORT", platform.server_port.to_string());
        env.set("ISSUER_NATIVE_PROOF_GENERATION_ENABLED", "true");
        env.set("ISSUER_PUBLISH_KEY_PATH", "pbkey");
        env.set("ISSUER_ONCHAIN_PUBLISH_STATE_FREQUENCY", "1m");
        env.set("ISSUER_ONCHAIN_CHECK_STATUS_FREQUENCY", "1m");
        env.set("ISSUER_DATABASE_URL", config.database.dsn());
        env.set("ISSUER_CACHE_PROVIDER", "redis");
        env.set("ISSUER_CACHE_URL", config.cache.url());
        env.set("ISSUER_API_AUTH_USER", &platform.api_user);
        env.set("ISSUER_API_AUTH_PASSWORD", &platform.api_password);
        env.set("ISSUER_KMS_BJJ_PROVIDER", "localstorage");
        env.set("ISSUER_KMS_ETH_PROVIDER", "localstorage");
        env.set(
            "ISSUER_KMS_PLUGIN_LOCAL_STORAGE_FILE_PATH",
            home.keys_dir().display().to_string(),
        );
        env.set(
            "ISSUER_CIRCUIT_PATH",
            home.circuits_dir().display().to_string(),
        );
        env.set("ISSUER_IPFS_GATEWAY_URL", &platform.ipfs_gateway);
        env.set(
            "ISSUER_RESOLVER_PATH",
            home.resolver_file().display().to_string(),
        );
        env.set("ISSUER_LOG_LEVEL", platform.log_level.to_string());
        env.set("ISSUER_LOG_MODE", platform.log_mode.to_string());
        env
    }

    /// Sets a key, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Required keys that are absent or empty.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| self.get(key).map_or(true, str::is_empty))
            .collect()
    }

    /// Renders `KEY=value` lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }

    /// Parses `KEY=value` lines; blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Result<Self> {
        let mut env = Self::default();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                IssuerError::config(format!(
                    "Line {} of environment file is not KEY=value",
                    index + 1
                ))
            })?;
            env.set(key.trim(), value);
        }
        Ok(env)
    }

    /// Loads the environment file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IssuerError::config_with_source(
                format!("Failed to read environment file '{}'", path.display()),
                e,
            )
        })?;
        Self::parse(&content)
    }

    /// Adds every entry to a command's environment.
    pub fn apply(&self, spec: CommandSpec) -> CommandSpec {
        spec.envs(self.entries.iter().cloned())
    }
}

/// Parameters of one blockchain network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    pub contract_address: String,
    #[serde(rename = "networkURL")]
    pub network_url: String,
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    pub default_gas_limit: u64,
    pub min_gas_price: u64,
    pub max_gas_price: u64,
    pub confirmation_timeout: String,
    pub confirmation_block_count: u64,
    pub receipt_timeout: String,
    pub rpc_response_timeout: String,
    pub wait_receipt_cycle_time: String,
    pub wait_block_cycle_time: String,
    pub gas_less: bool,
    pub multicall_address: String,
    pub publishing_key: String,
}

impl NetworkParams {
    fn with_defaults(contract_address: &str, network_url: &str, chain_id: u64) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            network_url: network_url.to_string(),
            chain_id,
            default_gas_limit: 600_000,
            min_gas_price: 0,
            max_gas_price: 1_000_000,
            confirmation_timeout: "600s".to_string(),
            confirmation_block_count: 5,
            receipt_timeout: "600s".to_string(),
            rpc_response_timeout: "5s".to_string(),
            wait_receipt_cycle_time: "30s".to_string(),
            wait_block_cycle_time: "30s".to_string(),
            gas_less: false,
            multicall_address: "0xcA11bde05977b3631167028862bE2a173976CA11".to_string(),
            publishing_key: "pbkey".to_string(),
        }
    }
}

/// Chain family -> network name -> parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolverSettings {
    pub chains: BTreeMap<String, BTreeMap<String, NetworkParams>>,
}

impl ResolverSettings {
    /// Polygon Amoy and Privado main with the configured RPC endpoints.
    pub fn from_settings(config: &Config) -> Self {
        let mut settings = Self::default();
        settings.insert(
            "polygon",
            "amoy",
            NetworkParams::with_defaults(
                "0x1a4cC30f2aA0377b0c3bc9848766D90cb4404124",
                &config.platform.amoy_rpc_url,
                80002,
            ),
        );
        settings.insert(
            "privado",
            "main",
            NetworkParams::with_defaults(
                "0x975556428F077dB5877Ea2474D783D6C69233742",
                &config.platform.privado_rpc_url,
                21000,
            ),
        );
        settings
    }

    pub fn insert(&mut self, chain: &str, network: &str, params: NetworkParams) {
        self.chains
            .entry(chain.to_string())
            .or_default()
            .insert(network.to_string(), params);
    }

    pub fn network(&self, chain: &str, network: &str) -> Option<&NetworkParams> {
        self.chains.get(chain).and_then(|n| n.get(network))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Writes the two generated artifacts into the installation home.
pub struct ConfigMaterializer {
    executor: Arc<dyn Executor>,
    config: Config,
}

impl ConfigMaterializer {
    pub fn new(executor: Arc<dyn Executor>, config: Config) -> Self {
        Self { executor, config }
    }

    /// Renders and writes both artifacts, overwriting previous versions.
    pub async fn render(
        &self,
        home: &InstallationHome,
    ) -> Result<(EnvironmentConfig, ResolverSettings)> {
        self.executor.create_dir_all(&home.keys_dir()).await?;

        let env = EnvironmentConfig::from_settings(&self.config, home);
        let resolver = ResolverSettings::from_settings(&self.config);

        self.executor
            .write_file(&home.env_file(), &env.render(), false)
            .await?;
        self.executor
            .write_file(&home.resolver_file(), &resolver.to_yaml()?, false)
            .await?;

        info!(
            env_file = %home.env_file().display(),
            resolver_file = %home.resolver_file().display(),
            keys = env.entries().len(),
            "Configuration rendered"
        );

        Ok((env, resolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::SystemExecutor;
    use crate::config::PrivilegeConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn home() -> InstallationHome {
        InstallationHome::new("/opt/issuer")
    }

    #[test]
    fn test_environment_contains_required_keys() {
        let env = EnvironmentConfig::from_settings(&Config::default(), &home());

        assert!(env.missing_keys().is_empty());
        assert_eq!(env.get("ISSUER_SERVER_PORT"), Some("3001"));
        assert_eq!(env.get("ISSUER_API_AUTH_USER"), Some("user-issuer"));
        assert_eq!(
            env.get("ISSUER_RESOLVER_PATH"),
            Some("/opt/issuer/resolver_settings.yaml")
        );
        assert_eq!(
            env.get("ISSUER_KMS_PLUGIN_LOCAL_STORAGE_FILE_PATH"),
            Some("/opt/issuer/keys")
        );
    }

    #[test]
    fn test_render_is_plain_lines() {
        let mut env = EnvironmentConfig::default();
        env.set("A", "1");
        env.set("B", "postgres://u:p@h:5432/d?sslmode=disable");
        env.set("A", "2");

        assert_eq!(
            env.render(),
            "A=2\nB=postgres://u:p@h:5432/d?sslmode=disable\n"
        );
    }

    #[test]
    fn test_round_trip_is_identical() {
        let env = EnvironmentConfig::from_settings(&Config::default(), &home());
        let parsed = EnvironmentConfig::parse(&env.render()).unwrap();

        assert_eq!(parsed, env);
        assert_eq!(parsed.render(), env.render());
    }

    #[test]
    fn test_parse_skips_comments_and_rejects_garbage() {
        let env = EnvironmentConfig::parse("# comment\n\nKEY=a=b\n").unwrap();
        assert_eq!(env.get("KEY"), Some("a=b"));

        let err = EnvironmentConfig::parse("KEY=1\nnot a pair\n").unwrap_err();
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn test_missing_keys() {
        let env = EnvironmentConfig::parse("ISSUER_SERVER_URL=\n").unwrap();
        let missing = env.missing_keys();
        assert!(missing.contains(&"ISSUER_SERVER_URL"));
        assert!(missing.contains(&"ISSUER_DATABASE_URL"));
    }

    #[test]
    fn test_apply_sets_command_env() {
        let mut env = EnvironmentConfig::default();
        env.set("ISSUER_DATABASE_URL", "postgres://x");
        let spec = env.apply(CommandSpec::new("/opt/issuer/bin/migrate"));
        assert_eq!(
            spec.env,
            vec![("ISSUER_DATABASE_URL".to_string(), "postgres://x".to_string())]
        );
    }

    #[test]
    fn test_resolver_document_layout() {
        let resolver = ResolverSettings::from_settings(&Config::default());
        let yaml = resolver.to_yaml().unwrap();

        assert!(yaml.starts_with("polygon:\n  amoy:\n"));
        assert!(yaml.contains("networkURL:"));
        assert!(yaml.contains("rpc-amoy.polygon.technology"));
        assert!(yaml.contains("chainID: 80002"));
        assert!(yaml.contains("contractAddress:"));

        let parsed = ResolverSettings::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.network("privado", "main").unwrap().chain_id, 21000);
    }

    #[tokio::test]
    async fn test_materializer_overwrites_files() {
        let dir = TempDir::new().unwrap();
        let home = InstallationHome::new(dir.path());
        std::fs::write(home.env_file(), "STALE=1\n").unwrap();

        let privilege = PrivilegeConfig {
            escalate: String::new(),
        };
        let executor = Arc::new(SystemExecutor::new(&privilege, Duration::from_secs(5)));
        let materializer = ConfigMaterializer::new(executor, Config::default());

        let (env, _) = materializer.render(&home).await.unwrap();

        let on_disk = EnvironmentConfig::load(&home.env_file()).unwrap();
        assert_eq!(on_disk, env);
        assert!(on_disk.get("STALE").is_none());
        assert!(home.resolver_file().exists());
        assert!(home.keys_dir().is_dir());
    }
}
