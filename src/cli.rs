//! Command-line interface definition for issuerctl.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use crate::config::ENV_CONFIG_PATH;
use crate::supervisor::ManagedUnit;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// issuerctl - Issuer node deployment orchestrator
///
/// Installs, builds and supervises a single-node identity issuer platform.
#[derive(Debug, Parser)]
#[command(name = "issuerctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = ENV_CONFIG_PATH)]
    pub config: Option<PathBuf>,

    /// Installation home (overrides the configuration)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log external commands and writes instead of executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Returns the effective log level based on verbose/quiet flags.
    /// Returns: (level_name, is_quiet)
    pub fn log_level(&self) -> (&'static str, bool) {
        if self.quiet {
            return ("error", true);
        }

        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };

        (level, false)
    }

    /// Whether a verbosity flag was given explicitly.
    pub fn has_level_flag(&self) -> bool {
        self.quiet || self.verbose > 0
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision dependencies, build the platform and register its units
    Install(InstallArgs),

    /// Sync sources, rebuild, migrate and restart all units
    Update,

    /// Regenerate the environment file and resolver settings
    RenderConfig,

    /// Show unit states and API reachability
    Status(StatusArgs),

    /// Start all units
    Start,

    /// Stop all units
    Stop,

    /// Stop, pause, then start all units
    Restart,

    /// Follow the log of one unit
    Logs(LogsArgs),

    /// Prepare the key store and print the key import command
    ImportKey(ImportKeyArgs),

    /// Create an identity through the running API
    CreateIdentity,

    /// Check the environment file and probe the database and cache
    CheckConfig,

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the `install` subcommand.
#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Ignore checkpoints of an interrupted run
    #[arg(long)]
    pub restart_from_scratch: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `logs` subcommand.
#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Unit to follow (platform, notifications, pending_publisher)
    #[arg(value_parser = parse_unit)]
    pub unit: Option<ManagedUnit>,
}

/// Arguments for the `import-key` subcommand.
#[derive(Debug, Args)]
pub struct ImportKeyArgs {
    /// Private key to import
    pub key: Option<String>,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the current configuration
    Show,
}

/// Parse a managed unit from string.
fn parse_unit(s: &str) -> Result<ManagedUnit, String> {
    s.parse().map_err(|e: crate::error::IssuerError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::parse_from(["issuerctl"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_install_command() {
        let cli = Cli::parse_from(["issuerctl", "install"]);
        match cli.command {
            Some(Commands::Install(args)) => assert!(!args.restart_from_scratch),
            _ => panic!("Expected Install command"),
        }

        let cli = Cli::parse_from(["issuerctl", "install", "--restart-from-scratch"]);
        match cli.command {
            Some(Commands::Install(args)) => assert!(args.restart_from_scratch),
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_status_json() {
        let cli = Cli::parse_from(["issuerctl", "status", "--json"]);
        match cli.command {
            Some(Commands::Status(args)) => assert!(args.json),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_logs_unit() {
        let cli = Cli::parse_from(["issuerctl", "logs"]);
        match cli.command {
            Some(Commands::Logs(args)) => assert!(args.unit.is_none()),
            _ => panic!("Expected Logs command"),
        }

        let cli = Cli::parse_from(["issuerctl", "logs", "pending-publisher"]);
        match cli.command {
            Some(Commands::Logs(args)) => {
                assert_eq!(args.unit, Some(ManagedUnit::PendingPublisher))
            }
            _ => panic!("Expected Logs command"),
        }

        assert!(Cli::try_parse_from(["issuerctl", "logs", "database"]).is_err());
    }

    #[test]
    fn test_import_key_argument_is_optional() {
        let cli = Cli::parse_from(["issuerctl", "import-key"]);
        match cli.command {
            Some(Commands::ImportKey(args)) => assert!(args.key.is_none()),
            _ => panic!("Expected ImportKey command"),
        }

        let cli = Cli::parse_from(["issuerctl", "import-key", "0xabc"]);
        match cli.command {
            Some(Commands::ImportKey(args)) => assert_eq!(args.key.as_deref(), Some("0xabc")),
            _ => panic!("Expected ImportKey command"),
        }
    }

    #[test]
    fn test_lifecycle_commands() {
        for word in [
            "start",
            "stop",
            "restart",
            "update",
            "render-config",
            "create-identity",
            "check-config",
        ] {
            let cli = Cli::parse_from(["issuerctl", word]);
            assert!(cli.command.is_some(), "{}", word);
        }

        let cli = Cli::parse_from(["issuerctl", "render-config"]);
        assert!(matches!(cli.command, Some(Commands::RenderConfig)));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["issuerctl", "frobnicate"]).is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["issuerctl", "config", "validate"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigCommands::Validate))
        ));

        let cli = Cli::parse_from(["issuerctl", "config", "show"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigCommands::Show))
        ));
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "issuerctl",
            "status",
            "-c",
            "/custom/config.yaml",
            "--home",
            "/srv/issuer",
            "--dry-run",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.yaml")));
        assert_eq!(cli.home, Some(PathBuf::from("/srv/issuer")));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_verbose_levels() {
        let cli = Cli::parse_from(["issuerctl", "status"]);
        assert_eq!(cli.log_level(), ("info", false));
        assert!(!cli.has_level_flag());

        let cli = Cli::parse_from(["issuerctl", "-v", "status"]);
        assert_eq!(cli.log_level(), ("debug", false));

        let cli = Cli::parse_from(["issuerctl", "-vv", "status"]);
        assert_eq!(cli.log_level(), ("trace", false));
        assert!(cli.has_level_flag());
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["issuerctl", "-q", "status"]);
        assert_eq!(cli.log_level(), ("error", true));
    }
}
