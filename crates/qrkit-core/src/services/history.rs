//! Export history
//!
//! Append-only, capped, newest-first log of successful exports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::services::export::ExportFormat;
use crate::services::quota::Plan;
use crate::services::state_store::{StateStore, HISTORY_KEY};

/// One successful export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Input text that was encoded
    pub text: String,
    /// Requested export format
    pub format: ExportFormat,
    /// When the export happened
    pub timestamp: DateTime<Utc>,
    /// Filename offered to the save step
    pub filename: String,
    /// Plan active at export time
    pub plan: Plan,
    /// Inline `data:` reference to the exported image
    pub artifact_reference: String,
}

/// Persisted history log
pub struct HistoryLog {
    store: Arc<dyn StateStore>,
    cap: usize,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn StateStore>, cap: usize) -> Self {
        Self { store, cap }
    }

    /// Insert at the head and evict from the tail beyond the cap
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.list().await?;
        entries.insert(0, entry);
        if entries.len() > self.cap {
            let evicted = entries.len() - self.cap;
            entries.truncate(self.cap);
            log::debug!("[history] Evicted {} oldest entries", evicted);
        }
        self.save(&entries).await
    }

    /// All entries, newest first, read fresh from storage
    ///
    /// An unreadable record is treated as an empty history.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let Some(raw) = self.store.get(HISTORY_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                log::warn!("[history] Stored history unreadable ({}); treating as empty", e);
                Ok(Vec::new())
            }
        }
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<()> {
        log::info!("[history] Clearing export history");
        self.store.remove(HISTORY_KEY).await
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.store.put(HISTORY_KEY, &raw).await
    }
}

/// Header row of the text export
pub const EXPORT_HEADER: [&str; 5] = ["text", "format", "filename", "plan", "timestamp"];

/// Serialize entries as comma-separated text, quoting free text as needed
pub fn export_text(entries: &[HistoryEntry]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(EXPORT_HEADER)?;
    for entry in entries {
        let timestamp = entry.timestamp.to_rfc3339();
        writer.write_record([
            entry.text.as_str(),
            entry.format.as_str(),
            entry.filename.as_str(),
            entry.plan.as_str(),
            timestamp.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
