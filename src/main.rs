//! issuerctl - Issuer node deployment orchestrator
//!
//! Entry point for the issuerctl application.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use issuerctl::cli::{Cli, Commands, ConfigCommands};
use issuerctl::config::{Config, LogFormat, LoggingConfig};
use issuerctl::error::exit_code;
use issuerctl::exec::{Executor, RecordingExecutor, SystemExecutor};
use issuerctl::supervisor::{Supervisor, SystemdSupervisor, UnitOperationResult};
use issuerctl::{InstallPipeline, InstallationHome, IssuerError, LifecycleController};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_code::SUCCESS,
                _ => exit_code::CLI_ERROR,
            };
            let _ = e.print();
            return ExitCode::from(code as u8);
        }
    };

    let Some(command) = &cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let config = load_config(&cli);
    init_logging(&cli, config.as_ref().ok().map(|c| &c.logging));

    // validate reports a broken file itself
    if let Commands::Config(ConfigCommands::Validate) = command {
        return match config {
            Ok(config) => {
                println!("✓ Configuration is valid");
                tracing::debug!(?config, "Validated configuration");
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("✗ Configuration is invalid: {}", e);
                ExitCode::from(e.exit_code() as u8)
            }
        };
    }

    let result = config.and_then(|config| run(&cli, command, config));
    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(code = e.code().as_str(), "{}", e);
            if let IssuerError::Usage { .. } = e {
                print_subcommand_help(command);
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the tracing subscriber from CLI flags and the logging section.
///
/// Flags win over the configured level; `RUST_LOG` wins over both.
fn init_logging(cli: &Cli, logging: Option<&LoggingConfig>) {
    let flag = if cli.has_level_flag() {
        cli.log_level().0.parse::<Level>().ok()
    } else {
        None
    };
    let level = logging.cloned().unwrap_or_default().effective_level(flag);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match logging.map(|l| l.format).unwrap_or_default() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main application logic. Returns the process exit code.
fn run(cli: &Cli, command: &Commands, mut config: Config) -> issuerctl::Result<i32> {
    if let Some(home) = &cli.home {
        config.home = Some(home.clone());
    }

    if let Commands::Config(ConfigCommands::Show) = command {
        let yaml = serde_yaml::to_string(&config).map_err(|e| {
            IssuerError::config_with_source("Failed to serialize configuration", e)
        })?;
        println!("{}", yaml);
        return Ok(exit_code::SUCCESS);
    }

    let home = InstallationHome::new(config.home_dir());
    let system: Arc<dyn Executor> = Arc::new(SystemExecutor::new(
        &config.privilege,
        config.timeout.command(),
    ));
    let executor: Arc<dyn Executor> = if cli.dry_run {
        tracing::info!("Dry run: changes are logged, not executed");
        Arc::new(RecordingExecutor::new().with_passthrough(system))
    } else {
        system
    };
    let supervisor: Arc<dyn Supervisor> = Arc::new(SystemdSupervisor::new(
        executor.clone(),
        &config.supervisor.unit_dir,
    ));

    tracing::debug!(
        home = %home.root().display(),
        executor = executor.name(),
        supervisor = supervisor.name(),
        "Resolved installation"
    );

    let pipeline = InstallPipeline::new(
        config.clone(),
        home.clone(),
        executor.clone(),
        supervisor.clone(),
    )
    .with_dry_run(cli.dry_run);
    let controller = LifecycleController::new(config, home.clone(), supervisor);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli, command, &pipeline, &controller, &home))
}

/// Runs one command against the resolved installation.
async fn dispatch(
    cli: &Cli,
    command: &Commands,
    pipeline: &InstallPipeline,
    controller: &LifecycleController,
    home: &InstallationHome,
) -> issuerctl::Result<i32> {
    match command {
        Commands::Install(args) => {
            let summary = pipeline.run(args.restart_from_scratch).await?;
            println!("Install complete");
            println!("Run ID: {}", summary.run_id);
            if summary.resumed {
                println!("Resumed after: {} step(s)", summary.skipped.len());
            }
            if let Some(revision) = &summary.revision {
                println!("Revision: {}", revision);
            }
            for unit in &summary.units {
                println!("  - {}", unit);
            }
            Ok(exit_code::SUCCESS)
        }
        Commands::Update => {
            let summary = pipeline.update().await?;
            println!("Updated to revision {}", summary.revision);
            if cli.dry_run {
                println!("Dry run: units would be restarted now");
                return Ok(exit_code::SUCCESS);
            }
            Ok(report_units(&controller.restart().await?))
        }
        Commands::RenderConfig => {
            pipeline.render_config().await?;
            println!("Rendered {}", home.env_file().display());
            println!("Rendered {}", home.resolver_file().display());
            Ok(exit_code::SUCCESS)
        }
        Commands::Status(args) => {
            let report = controller.status().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            Ok(exit_code::SUCCESS)
        }
        Commands::Start => Ok(report_units(&controller.start().await?)),
        Commands::Stop => Ok(report_units(&controller.stop().await?)),
        Commands::Restart => Ok(report_units(&controller.restart().await?)),
        Commands::Logs(args) => {
            controller.logs(args.unit).await?;
            Ok(exit_code::SUCCESS)
        }
        Commands::ImportKey(args) => {
            let import = controller.import_key(args.key.as_deref().unwrap_or_default())?;
            if import.created {
                println!("Created key store {}", import.key_store.display());
            } else {
                println!("Key store {} already exists", import.key_store.display());
            }
            println!("Run the following command to import the key:");
            println!("  {}", import.command);
            Ok(exit_code::SUCCESS)
        }
        Commands::CreateIdentity => {
            let reply = controller.create_identity().await?;
            println!("Status: {}", reply.status);
            println!("{}", reply.body);
            Ok(exit_code::SUCCESS)
        }
        Commands::CheckConfig => {
            let check = controller.check_config().await?;
            print!("{}", check);
            if check.is_healthy() {
                Ok(exit_code::SUCCESS)
            } else {
                Ok(exit_code::GENERAL_ERROR)
            }
        }
        Commands::Config(_) => Ok(exit_code::SUCCESS),
    }
}

/// Prints one line per unit; non-zero when any unit failed.
fn report_units(results: &[UnitOperationResult]) -> i32 {
    for result in results {
        if result.success {
            println!("✓ {} {}", result.action, result.unit);
        } else {
            println!(
                "✗ {} {}: {}",
                result.action,
                result.unit,
                result.message.as_deref().unwrap_or("failed")
            );
        }
    }
    if results.iter().all(|r| r.success) {
        exit_code::SUCCESS
    } else {
        exit_code::GENERAL_ERROR
    }
}

/// Prints the help of the subcommand that hit a usage error.
fn print_subcommand_help(command: &Commands) {
    let name = match command {
        Commands::Install(_) => "install",
        Commands::Update => "update",
        Commands::RenderConfig => "render-config",
        Commands::Status(_) => "status",
        Commands::Start => "start",
        Commands::Stop => "stop",
        Commands::Restart => "restart",
        Commands::Logs(_) => "logs",
        Commands::ImportKey(_) => "import-key",
        Commands::CreateIdentity => "create-identity",
        Commands::CheckConfig => "check-config",
        Commands::Config(_) => "config",
    };
    let mut cli = Cli::command();
    if let Some(sub) = cli.find_subcommand_mut(name) {
        eprintln!("{}", sub.render_help());
    }
}

/// Load configuration with error handling.
fn load_config(cli: &Cli) -> issuerctl::Result<Config> {
    let config_path = cli.config.as_deref();
    Config::load(config_path)
}
