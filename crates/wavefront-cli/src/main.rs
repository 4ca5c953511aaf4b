//! wavefront — run simulated hierarchical releases from the command line.
//!
//! # Usage
//!
//! ```text
//! wavefront run --waves 2 --clusters 3 --apps 4 --app-secs 0.5
//! wavefront run --plan release.toml --fail app_failure --format json
//! wavefront plan --waves 1 --clusters 2
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::{PlanArgs, RunArgs};

#[derive(Parser)]
#[command(
    name = "wavefront",
    about = "Wave-based hierarchical release orchestrator (simulated)",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one release to its end and print the final tree.
    Run(RunArgs),
    /// Print the planned tree without running it.
    Plan(PlanArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Plan(args) => commands::plan::plan(args),
    }
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,wavefront=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
