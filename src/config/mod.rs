//! Configuration module for issuerctl.
//!
//! This module provides the orchestrator's own settings: where the
//! installation lives, what to build, how to reach the database and cache,
//! and how units are registered with the supervisor. Settings are loaded
//! from YAML; every field has a default.

mod logging;
mod platform;
mod supervisor;
mod timeout;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use platform::{
    CacheConfig, DatabaseConfig, IdentityDefaults, PlatformConfig, RepositoryConfig,
};
pub use supervisor::{PrivilegeConfig, SupervisorConfig};
pub use timeout::TimeoutConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::IssuerError;

/// Environment variable for configuration file path.
pub const ENV_CONFIG_PATH: &str = "ISSUERCTL_CONFIG";

/// Directory name of the installation home under `$HOME`.
pub const DEFAULT_HOME_DIR: &str = "issuer-node";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Installation home root (defaults to `$HOME/issuer-node`).
    pub home: Option<PathBuf>,

    /// Source repository.
    pub repository: RepositoryConfig,

    /// Database settings.
    pub database: DatabaseConfig,

    /// Cache settings.
    pub cache: CacheConfig,

    /// Issuer platform settings.
    pub platform: PlatformConfig,

    /// Supervisor unit settings.
    pub supervisor: SupervisorConfig,

    /// Privilege escalation.
    pub privilege: PrivilegeConfig,

    /// Timeout configuration.
    pub timeout: TimeoutConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from an optional path.
    /// If path is None, uses default search paths.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, IssuerError> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => {
                let default_paths = [
                    "/etc/issuerctl/config.yaml",
                    "/etc/issuerctl/config.yml",
                    "issuerctl.yaml",
                    "issuerctl.yml",
                ];

                for path in &default_paths {
                    if Path::new(path).exists() {
                        return Self::load_from_path(path);
                    }
                }

                // No config file found, use defaults
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, IssuerError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IssuerError::config_with_source(
                format!("Failed to read config file '{}'", path.as_ref().display()),
                e,
            )
        })?;

        Self::load_from_str(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self, IssuerError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| IssuerError::config_with_source("Failed to parse config", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration.
    pub fn validate(&self) -> Result<(), IssuerError> {
        if self.repository.url.trim().is_empty() {
            return Err(IssuerError::config("repository.url must not be empty"));
        }
        if self.repository.branch.trim().is_empty() {
            return Err(IssuerError::config("repository.branch must not be empty"));
        }

        if self.database.port == 0 {
            return Err(IssuerError::config("database.port must be > 0"));
        }
        if self.database.user.trim().is_empty() {
            return Err(IssuerError::config("database.user must not be empty"));
        }
        if self.database.name.trim().is_empty() {
            return Err(IssuerError::config("database.name must not be empty"));
        }

        if self.cache.port == 0 {
            return Err(IssuerError::config("cache.port must be > 0"));
        }

        if self.platform.server_port == 0 {
            return Err(IssuerError::config("platform.server_port must be > 0"));
        }

        if self.supervisor.unit_dir.trim().is_empty() {
            return Err(IssuerError::config("supervisor.unit_dir must not be empty"));
        }
        if self.supervisor.restart_sec == 0 {
            return Err(IssuerError::config("supervisor.restart_sec must be > 0"));
        }

        Ok(())
    }

    /// Returns the installation home root.
    pub fn home_dir(&self) -> PathBuf {
        if let Some(home) = &self.home {
            return home.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/root"))
            .join(DEFAULT_HOME_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.repository.branch, "main");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.cache.port, 6379);
        assert_eq!(config.platform.server_port, 3001);
        assert_eq!(config.platform.api_user, "user-issuer");
        assert_eq!(config.supervisor.restart_sec, 5);
        assert_eq!(config.privilege.escalate, "sudo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
home: /opt/issuer
repository:
  branch: develop
database:
  name: issuer
  password: s3cret
platform:
  server_url: "https://issuer.example.org"
  api_password: rotated
supervisor:
  unit_prefix: idn
  user: issuer
privilege:
  escalate: ""
logging:
  level: debug
  format: json
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = Config::load_from_path(file.path()).unwrap();

        assert_eq!(config.home_dir(), PathBuf::from("/opt/issuer"));
        assert_eq!(config.repository.branch, "develop");
        assert_eq!(
            config.repository.url,
            RepositoryConfig::default().url,
            "unset fields keep their defaults"
        );
        assert_eq!(config.database.name, "issuer");
        assert_eq!(config.platform.api_password, "rotated");
        assert_eq!(config.supervisor.unit_prefix, "idn");
        assert_eq!(config.supervisor.user, Some("issuer".to_string()));
        assert_eq!(config.privilege.program(), None);
        assert_eq!(config.logging.level, Some(LogLevel::Debug));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_port_zero() {
        let result = Config::load_from_str("database:\n  port: 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("database.port"));
    }

    #[test]
    fn test_validation_empty_branch() {
        let result = Config::load_from_str("repository:\n  branch: \"\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("branch"));
    }

    #[test]
    fn test_validation_restart_sec_zero() {
        let result = Config::load_from_str("supervisor:\n  restart_sec: 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("restart_sec"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_from_path("/nonexistent/issuerctl.yaml");
        assert!(matches!(result, Err(IssuerError::Config { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();

        assert!(yaml.contains("repository:"));
        assert!(yaml.contains("unit_dir:"));
        assert!(yaml.contains("restart_pause_seconds:"));
    }
}
