//! Marshal CLI binary
//!
//! Launches the configured projects, waits for the operator and tears
//! everything down again.

#![allow(unused_crate_dependencies)]

use clap::{Parser, Subcommand};
use cli::{CliError, RunOptions};
use marshal_core::utils::init_tracing;
use schema::LaunchConfig;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "marshal")]
#[command(about = "Launch a fleet of local services and tear them all down on exit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(clap::Args, Clone, Default)]
struct RunArgs {
    /// TOML file listing the projects (default: <ROOT>/marshal.toml, then built-ins)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding the projects
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Seconds to wait after the graceful signal before force-killing
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    grace_secs: Option<u64>,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        RunOptions {
            config: args.config,
            root: args.root,
            grace_secs: args.grace_secs,
            json: args.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Launch every project and wait for Enter or Ctrl+C (default)
    Run(RunArgs),
    /// Show what `run` would execute without starting anything
    Plan(RunArgs),
    /// Print the JSON schema of the configuration file
    Schema,
    /// Kill whatever is listening on the given ports
    Sweep {
        /// Ports to free
        #[arg(required = true, value_parser = clap::value_parser!(u16).range(1..))]
        ports: Vec<u16>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("{}", e);
    }

    let result = match cli.command {
        None => cli::run(cli.run.into()).await.map(|_| ()),
        Some(Commands::Run(args)) => cli::run(args.into()).await.map(|_| ()),
        Some(Commands::Plan(args)) => cli::resolve_config(
            args.config.as_deref(),
            args.root.as_deref(),
            args.grace_secs,
        )
        .map(|cfg| print!("{}", cli::render_plan(&cfg))),
        Some(Commands::Schema) => print_schema(),
        Some(Commands::Sweep { ports, json }) => sweep(&ports, json),
    };

    if let Err(e) = result {
        error!("[{}] {}", e.code(), e);
        return Err(e.into());
    }
    Ok(())
}

fn print_schema() -> cli::Result<()> {
    let schema = schemars::schema_for!(LaunchConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn sweep(ports: &[u16], json: bool) -> cli::Result<()> {
    let (sweeps, warnings) = cli::sweep_ports(ports);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "sweeps": sweeps,
                "warnings": warnings,
            }))?
        );
        return Ok(());
    }
    let report = schema::TeardownReport {
        records: Vec::new(),
        sweeps,
        warnings,
    };
    print!("{}", cli::render_teardown(&report));
    if report
        .sweeps
        .iter()
        .all(|s| matches!(s.outcome, schema::SweepOutcome::Unavailable))
    {
        return Err(CliError::ConfigError(
            "no port discovery backend is available".to_string(),
        ));
    }
    Ok(())
}
