//! qrkit CLI - QR code generation with logos, exports and plan quotas
//!
//! A command-line front end for composing QR codes, exporting them as
//! PNG, SVG or PDF, and inspecting the monthly quota and export history.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qrkit")]
#[command(author, version, about = "QR code generation and export CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Override database path (or set QRKIT_DB_PATH env var)
    #[arg(long, env = "QRKIT_DB_PATH", global = true)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a QR code and optionally export it
    Generate(commands::generate::GenerateArgs),

    /// Show or change the subscription plan
    Plan {
        #[command(subcommand)]
        action: commands::plan::PlanAction,
    },

    /// View and manage export history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Set up database path if provided
    if let Some(db_path) = &cli.db {
        std::env::set_var(qrkit_core::config::DB_PATH_ENV, db_path);
    }

    // Initialize database
    let db = qrkit_core::Database::new().await?;

    // Create context for commands
    let ctx = commands::Context {
        db,
        format: cli.format,
        quiet: cli.quiet,
    };

    // Execute command
    match cli.command {
        Commands::Generate(args) => commands::generate::execute(&ctx, args).await,
        Commands::Plan { action } => commands::plan::execute(&ctx, action).await,
        Commands::History { action } => commands::history::execute(&ctx, action).await,
    }
}
