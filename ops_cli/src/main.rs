use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use ops_core::{
    ClassificationTable, CommandExecutor, ConsoleCommand, ExecOptions, InMemoryRegistry,
    InMemorySnapshot, OpsConfig, WorkflowOrchestrator,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bulk world operations over RCON", long_about = None)]
struct Cli {
    /// JSON config file; defaults to $OPS_CONFIG_PATH, then the builtin config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true, env = "RCON_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Print reports as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove built structures, restoring the ground beneath them.
    Clear {
        /// all, wellbores or rigs.
        #[arg(long, default_value = "all")]
        area: String,
        /// Remove every structure block without restoring ground.
        #[arg(long)]
        no_preserve_terrain: bool,
        /// Structure registry; updated in place after the clear.
        #[arg(long)]
        registry: PathBuf,
        /// Ground materials captured before the structures were built.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Block classification table replacing the builtin one.
        #[arg(long)]
        classification: Option<PathBuf>,
    },
    /// Set the time of day and freeze the daylight cycle.
    LockTime {
        /// day, noon, sunset, night, midnight, sunrise or ticks 0..24000.
        #[arg(long, default_value = "day")]
        time: String,
        /// Restart the daylight cycle instead of freezing it.
        #[arg(long)]
        unlock: bool,
    },
    /// Send one raw console command.
    Exec {
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    info!(address = %config.connection.address(), "ops.starting");
    let executor = CommandExecutor::from_config(&config)?;

    let failed = match cli.command {
        Command::Clear {
            area,
            no_preserve_terrain,
            registry,
            snapshot,
            classification,
        } => {
            let store = InMemoryRegistry::from_file(&registry)?;
            let mut ops = WorkflowOrchestrator::new(executor, store, config);
            if let Some(path) = snapshot {
                ops = ops.with_snapshot(Box::new(InMemorySnapshot::from_file(&path)?));
            }
            if let Some(path) = classification {
                ops = ops.with_classification(ClassificationTable::from_file(&path)?);
            }

            let stop = ops.batcher().stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("ops.interrupted: finishing the chunk in flight");
                    stop.stop();
                }
            });

            let report = ops.clear_environment(&area, !no_preserve_terrain).await;
            ops.executor().close().await;
            save_registry(ops.registry(), &registry)?;
            emit(&report, cli.json)?;
            report.status.is_failure()
        }
        Command::LockTime { time, unlock } => {
            let ops = WorkflowOrchestrator::new(executor, InMemoryRegistry::default(), config);
            let report = ops.lock_world_time(&time, !unlock).await;
            ops.executor().close().await;
            emit(&report, cli.json)?;
            report.status.is_failure()
        }
        Command::Exec {
            timeout_ms,
            command,
        } => {
            let options = ExecOptions {
                timeout: timeout_ms.map(Duration::from_millis),
                verify: None,
            };
            let text = ConsoleCommand::Raw(command.join(" ")).to_string();
            let result = executor.execute(&text, options).await;
            executor.close().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(error) = &result.error {
                println!("[FAILURE] {text}\n  error: {error}\n  hint: {}", error.kind.remediation());
            } else {
                println!("{}", result.response);
            }
            !result.success
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Builtin or file config, then `RCON_*` variables, then flags.
fn resolve_config(cli: &Cli) -> Result<OpsConfig> {
    let mut config = OpsConfig::load(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(password) = &cli.password {
        config.connection.password = password.clone();
    }
    config.validate()?;
    Ok(config)
}

fn save_registry(registry: &InMemoryRegistry, path: &Path) -> Result<()> {
    registry.save(path)?;
    info!(path = %path.display(), "ops.registry_saved");
    Ok(())
}

fn emit<R: Serialize + std::fmt::Display>(report: &R, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
