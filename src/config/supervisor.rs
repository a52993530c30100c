//! Process supervisor and privilege escalation settings.

use serde::{Deserialize, Serialize};

/// Supervisor unit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory unit definitions are written into.
    pub unit_dir: String,

    /// Prefix of every unit name (`<prefix>-platform`).
    pub unit_prefix: String,

    /// Delay before the supervisor restarts a crashed unit, in seconds.
    pub restart_sec: u64,

    /// Units that must be up before ours.
    pub after: Vec<String>,

    /// Account the units run as (None = supervisor default).
    pub user: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            unit_dir: "/etc/systemd/system".to_string(),
            unit_prefix: "issuer".to_string(),
            restart_sec: 5,
            after: vec![
                "network.target".to_string(),
                "postgresql.service".to_string(),
                "redis-server.service".to_string(),
            ],
            user: None,
        }
    }
}

/// Privilege escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Program prefixed to privileged commands. Empty runs them directly.
    pub escalate: String,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            escalate: "sudo".to_string(),
        }
    }
}

impl PrivilegeConfig {
    /// Returns the escalation program, if any.
    pub fn program(&self) -> Option<&str> {
        let program = self.escalate.trim();
        if program.is_empty() {
            None
        } else {
            Some(program)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_config_default() {
        let config = SupervisorConfig::default();
        assert_eq!(config.unit_dir, "/etc/systemd/system");
        assert_eq!(config.restart_sec, 5);
        assert!(config.after.contains(&"postgresql.service".to_string()));
    }

    #[test]
    fn test_privilege_program() {
        assert_eq!(PrivilegeConfig::default().program(), Some("sudo"));

        let direct = PrivilegeConfig {
            escalate: "  ".to_string(),
        };
        assert_eq!(direct.program(), None);
    }
}
