//! # qrkit-core
//!
//! Core logic for qrkit - shared by every front end.
//!
//! This crate provides:
//! - QR composition with an optional logo (`services::studio`, `services::compositor`)
//! - Raster, vector and document export (`services::export`)
//! - Monthly per-plan export quota (`services::quota`)
//! - Export history (`services::history`)
//! - Database operations (`db` module)
//! - Unified error handling (`error` module)

pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports for convenience
pub use config::StudioConfig;
pub use db::Database;
pub use error::{Error, Result};

// Re-export commonly used types from services
pub use services::{
    export_filename, slugify, ArtifactSink, ComposedArtifact, ExportFormat, ExportOutcome,
    FsSink, GenerateInput, HexColor, HistoryEntry, MemorySink, Notice, Plan, PreviewState,
    QuotaStatus, Remaining, Studio, PLANS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
