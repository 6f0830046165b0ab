//! msm - server-side session cache manager
//!
//! Main entry point for the msm CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, gc, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// msm - server-side session cache manager
#[derive(Parser)]
#[command(name = "msm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of discovering one
    #[arg(short, long, global = true, env = "MSM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the session server
    Start(start::StartArgs),

    /// Run one garbage-collection pass over the session store
    Gc(gc::GcArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let ctx = commands::Context::load(cli.config.as_deref(), cli.verbose)?;

    // Console output plus a daily-rotated JSON log file
    let filter = if cli.verbose {
        "msm=debug,msm_session=debug,msm_store=debug,msm_server=debug,msm_config=debug,tower_http=debug,info"
    } else {
        "msm=info,msm_session=info,msm_store=info,msm_server=info,warn"
    };

    let log_dir = ctx
        .config
        .logging()
        .dir
        .or_else(|| msm_config::xdg_config_dir().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "msm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "msm=trace,msm_session=trace,msm_store=trace,msm_server=trace,msm_config=trace,info",
                )),
        )
        .init();

    for warning in &ctx.warnings {
        tracing::warn!("{}", warning);
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Gc(args) => gc::run(args, &ctx).await.map(|()| ExitCode::SUCCESS),
        Commands::Config(args) => config::run(args, &ctx).map(|()| ExitCode::SUCCESS),
    }
}
