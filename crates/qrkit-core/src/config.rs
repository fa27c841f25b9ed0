//! Configuration for the composition/export pipeline and database location

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::services::encoder::{EcLevel, PollPolicy};
use crate::services::pdf::PageLayout;
use crate::services::quota::Plan;

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "QRKIT_DB_PATH";

/// Export raster edge length in pixels
pub const DEFAULT_RENDER_SIZE: u32 = 1024;

/// On-screen preview edge length in pixels
pub const DEFAULT_PREVIEW_SIZE: u32 = 320;

/// Logo edge length as a fraction of the surface width
pub const DEFAULT_LOGO_FRACTION: f32 = 0.20;

/// Upper bound accepted for the logo fraction
pub const MAX_LOGO_FRACTION: f32 = 0.5;

/// Quiet interval for the live preview debounce
pub const DEFAULT_QUIET_INTERVAL_MS: u64 = 200;

/// Maximum number of retained history entries
pub const DEFAULT_HISTORY_CAP: usize = 200;

/// Settings for the contrast pad drawn under a logo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadStyle {
    /// Minimum padding in pixels
    pub min_padding: u32,
    /// Padding as a fraction of the logo edge
    pub padding_ratio: f32,
    /// Corner radius of the rounded rectangle in pixels
    pub corner_radius: u32,
}

impl Default for PadStyle {
    fn default() -> Self {
        Self {
            min_padding: 6,
            padding_ratio: 0.06,
            corner_radius: 12,
        }
    }
}

impl PadStyle {
    /// Padding for a logo of the given edge length
    pub fn padding_for(&self, logo_size: u32) -> u32 {
        let scaled = (logo_size as f32 * self.padding_ratio).floor() as u32;
        scaled.max(self.min_padding)
    }
}

/// Studio-wide configuration
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Export raster edge length, independent of display size
    pub render_size: u32,
    /// Preview raster edge length
    pub preview_size: u32,
    /// Error-correction level requested from the encoder
    pub ec_level: EcLevel,
    /// Contrast pad style
    pub pad: PadStyle,
    /// Debounce interval for live preview
    pub quiet_interval: Duration,
    /// Poll policy for encoders that complete late
    pub poll: PollPolicy,
    /// Document page geometry
    pub page: PageLayout,
    /// History retention cap
    pub history_cap: usize,
    /// Plan assigned on first load and on month rollover
    pub default_plan: Plan,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            render_size: DEFAULT_RENDER_SIZE,
            preview_size: DEFAULT_PREVIEW_SIZE,
            ec_level: EcLevel::H,
            pad: PadStyle::default(),
            quiet_interval: Duration::from_millis(DEFAULT_QUIET_INTERVAL_MS),
            poll: PollPolicy::default(),
            page: PageLayout::a4(),
            history_cap: DEFAULT_HISTORY_CAP,
            default_plan: Plan::default(),
        }
    }
}

impl StudioConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.render_size == 0 || self.preview_size == 0 {
            return Err(Error::config("render and preview sizes must be positive"));
        }
        if self.history_cap == 0 {
            return Err(Error::config("history cap must be positive"));
        }
        if self.page.margin * 2.0 >= self.page.width {
            return Err(Error::config("page margin leaves no room for the image"));
        }
        Ok(())
    }
}

/// Resolve the database path
///
/// `QRKIT_DB_PATH` wins (with `~` expanded); otherwise the platform data
/// directory is used.
pub fn get_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let expanded = shellexpand::tilde(&path);
        return Ok(PathBuf::from(expanded.as_ref()));
    }

    let dirs = directories::ProjectDirs::from("com", "qrkit", "qrkit")
        .ok_or_else(|| Error::config("Could not determine project directories"))?;

    Ok(dirs.data_dir().join("qrkit.db"))
}
