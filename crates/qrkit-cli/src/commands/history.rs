//! History commands
//!
//! Commands for listing, clearing and exporting the export history.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::Local;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use qrkit_core::HistoryEntry;

use super::{resolve_out_dir, Context};
use crate::output::{print_info, print_output, print_success, truncate};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List recent exports, newest first
    List {
        /// Maximum number of entries to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Delete every history entry
    Clear,

    /// Export history as comma-separated text
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// History row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "When")]
    pub when: String,
    #[tabled(rename = "Text")]
    pub text: String,
    #[tabled(rename = "Format")]
    pub format: String,
    #[tabled(rename = "File")]
    pub filename: String,
    #[tabled(rename = "Plan")]
    pub plan: String,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            when: entry
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            text: truncate(&entry.text, 40),
            format: entry.format.to_string(),
            filename: entry.filename.clone(),
            plan: entry.plan.label().to_string(),
        }
    }
}

pub async fn execute(ctx: &Context, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List { limit } => list_history(ctx, limit).await,
        HistoryAction::Clear => clear_history(ctx).await,
        HistoryAction::Export { output } => export_history(ctx, output).await,
    }
}

async fn list_history(ctx: &Context, limit: usize) -> Result<()> {
    let studio = ctx.studio(resolve_out_dir(None))?;
    let entries = studio.history().await?;
    let rows: Vec<HistoryRow> = entries.iter().take(limit).map(HistoryRow::from).collect();
    print_output(&rows, ctx.format)
}

async fn clear_history(ctx: &Context) -> Result<()> {
    let studio = ctx.studio(resolve_out_dir(None))?;
    studio.clear_history().await?;
    print_success("History cleared", ctx.quiet);
    Ok(())
}

async fn export_history(ctx: &Context, output: Option<PathBuf>) -> Result<()> {
    let studio = ctx.studio(resolve_out_dir(None))?;
    let Some(text) = studio.export_history_text().await? else {
        print_info("History is empty; nothing to export.", ctx.quiet);
        return Ok(());
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("History exported to {}", path.display()), ctx.quiet);
        }
        None => print!("{}", text),
    }
    Ok(())
}
