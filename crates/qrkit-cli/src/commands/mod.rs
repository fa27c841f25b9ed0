//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod generate;
pub mod history;
pub mod plan;

use std::path::PathBuf;
use std::sync::Arc;

use crate::output::OutputFormat;
use qrkit_core::{Database, FsSink, Studio, StudioConfig};

/// Shared context for all commands
pub struct Context {
    pub db: Database,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    /// Studio over the CLI database, saving exports into `out_dir`
    pub fn studio(&self, out_dir: PathBuf) -> anyhow::Result<Studio> {
        log::debug!("[cli] Export directory: {}", out_dir.display());
        let sink = Arc::new(FsSink::new(out_dir));
        Ok(Studio::open(&self.db, StudioConfig::default(), sink)?)
    }
}

/// Export directory: `--out` (tilde expanded), else Downloads, else cwd
pub fn resolve_out_dir(out: Option<&str>) -> PathBuf {
    match out {
        Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
        None => dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
    }
}
