//! Hytale RAG - installer and client configurator
//!
//! Main entry point for the `hytale-rag` CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;

mod commands;
mod prompt;

use commands::{clients, configure, setup, status, verify};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Hytale RAG - set up the search service and register it with your tools
#[derive(Parser)]
#[command(name = "hytale-rag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Accept the default answer for every question
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Service checkout to provision (default: current directory)
    #[arg(long, global = true, env = "HYTALE_RAG_DIR", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full setup (default)
    Setup(setup::SetupArgs),

    /// Register the service with developer tools
    Configure(configure::ConfigureArgs),

    /// List supported clients and their registration status
    Clients(clients::ClientsArgs),

    /// Show provider, dataset and local runtime status
    Status(status::StatusArgs),

    /// Run the dataset self-test
    Verify(verify::VerifyArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "hytale_rag=debug,hytale_rag_setup=debug,hytale_rag_config=debug,info"
    } else {
        "hytale_rag=info,hytale_rag_setup=info,hytale_rag_config=info,warn"
    };

    let log_dir = dirs::config_dir()
        .map(|d| d.join("hytale-rag").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "hytale-rag.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "hytale_rag=trace,hytale_rag_setup=trace,hytale_rag_config=trace,info",
                )),
        )
        .init();

    let result = run(cli).await;

    // flush the file appender before exiting
    drop(guard);

    if let Err(e) = result {
        eprintln!();
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = commands::Context::new(cli.install_dir, cli.json, cli.verbose, cli.yes)?;
    tracing::debug!(install_dir = %ctx.install_dir.display(), "starting");

    match cli.command {
        None => setup::run(setup::SetupArgs::default(), &ctx).await,
        Some(Commands::Setup(args)) => setup::run(args, &ctx).await,
        Some(Commands::Configure(args)) => configure::run(args, &ctx).await,
        Some(Commands::Clients(args)) => clients::run(args, &ctx).await,
        Some(Commands::Status(args)) => status::run(args, &ctx).await,
        Some(Commands::Verify(args)) => verify::run(args, &ctx).await,
    }
}
