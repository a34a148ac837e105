//! regwatch - regulation matching for live transcript feeds.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ActCommand, AlertsCommand, ClassifyCommand, RunCommand};

/// regwatch - regulation matching for live transcript feeds.
///
/// Regulation documents are classified, chunked and embedded into a
/// knowledge base; transcript segments are matched against it and turned
/// into deduplicated, severity-ranked alerts.
///
/// State (alerts and documents) is kept in ~/.regwatch/ unless --data-dir
/// says otherwise.
#[derive(Parser)]
#[command(name = "regwatch")]
#[command(about = "Regulation matching for transcript feeds")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML or JSON; default is ~/.regwatch/config.yaml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the state database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON instead of YAML
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a regulation document without ingesting it
    Classify(ClassifyCommand),
    /// Ingest a document folder and match a transcript feed against it
    Run(RunCommand),
    /// List stored alerts or show statistics
    Alerts(AlertsCommand),
    /// Acknowledge an alert
    Ack(ActCommand),
    /// Dismiss an alert
    Dismiss(ActCommand),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Classify(cmd) => cmd.run(&cli),
        Commands::Run(cmd) => cmd.run(&cli).await,
        Commands::Alerts(cmd) => cmd.run(&cli),
        Commands::Ack(cmd) => cmd.run(&cli, regwatch_compliance::AlertAction::Acknowledge),
        Commands::Dismiss(cmd) => cmd.run(&cli, regwatch_compliance::AlertAction::Dismiss),
    }
}
