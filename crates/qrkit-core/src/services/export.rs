//! Export strategies
//!
//! Three tagged strategies share one `produce` contract. The vector strategy
//! detects a logo and hands off to the raster strategy, reporting the
//! substitution as a notice.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::services::encoder::{EncodeRequest, OutputMode, QrEncoder};
use crate::services::logo::data_url;
use crate::services::pdf::{PageLayout, PdfDocument};
use crate::services::studio::ComposedArtifact;

/// Maximum slug length in filenames
pub const SLUG_MAX_LEN: usize = 40;

// ============================================================================
// Formats
// ============================================================================

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "png")]
    Raster,
    #[serde(rename = "svg")]
    Vector,
    #[serde(rename = "pdf")]
    Document,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Raster,
        ExportFormat::Vector,
        ExportFormat::Document,
    ];

    /// Persisted tag, also the file extension
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Raster => "png",
            ExportFormat::Vector => "svg",
            ExportFormat::Document => "pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Raster => "image/png",
            ExportFormat::Vector => "image/svg+xml",
            ExportFormat::Document => "application/pdf",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" | "raster" => Ok(ExportFormat::Raster),
            "svg" | "vector" => Ok(ExportFormat::Vector),
            "pdf" | "document" => Ok(ExportFormat::Document),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

// ============================================================================
// Filenames
// ============================================================================

/// Filename-safe slug: whitespace runs become `-`, anything outside ASCII
/// alphanumerics and `-` is dropped, lowercased, at most 40 characters
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c.to_ascii_lowercase());
        }
    }
    slug.chars().take(SLUG_MAX_LEN).collect()
}

/// `qr-<slug>.<ext>`, or `qr.<ext>` when nothing survives slugging
pub fn export_filename(text: &str, format: ExportFormat) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        format!("qr.{}", format.extension())
    } else {
        format!("qr-{}.{}", slug, format.extension())
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Non-fatal condition attached to a successful operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Vector export requested with a logo; the raster artifact was offered
    VectorCompositingUnsupported,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::VectorCompositingUnsupported => write!(
                f,
                "Vector output cannot include a logo; the raster image was exported instead"
            ),
        }
    }
}

/// Bytes produced by a strategy
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// Format the caller asked for
    pub requested: ExportFormat,
    /// Format of `bytes`
    pub produced: ExportFormat,
    pub bytes: Vec<u8>,
    /// Inline reference stored in history
    pub reference: String,
    pub notices: Vec<Notice>,
}

impl ExportArtifact {
    pub fn mime(&self) -> &'static str {
        self.produced.mime()
    }
}

/// Encode a raster as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

// ============================================================================
// Strategies
// ============================================================================

/// Format-specific export procedure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportStrategy {
    Raster,
    Vector,
    Document(PageLayout),
}

impl ExportStrategy {
    pub fn for_format(format: ExportFormat, page: PageLayout) -> Self {
        match format {
            ExportFormat::Raster => ExportStrategy::Raster,
            ExportFormat::Vector => ExportStrategy::Vector,
            ExportFormat::Document => ExportStrategy::Document(page),
        }
    }

    /// Produce the artifact for a composition
    pub async fn produce(
        &self,
        composition: &ComposedArtifact,
        encoder: &dyn QrEncoder,
    ) -> Result<ExportArtifact> {
        match self {
            ExportStrategy::Raster => produce_raster(composition),
            ExportStrategy::Vector => produce_vector(composition, encoder).await,
            ExportStrategy::Document(page) => produce_document(composition, page),
        }
    }
}

fn produce_raster(composition: &ComposedArtifact) -> Result<ExportArtifact> {
    let bytes = encode_png(&composition.surface)?;
    let reference = data_url(ExportFormat::Raster.mime(), &bytes);
    Ok(ExportArtifact {
        requested: ExportFormat::Raster,
        produced: ExportFormat::Raster,
        bytes,
        reference,
        notices: Vec::new(),
    })
}

async fn produce_vector(
    composition: &ComposedArtifact,
    encoder: &dyn QrEncoder,
) -> Result<ExportArtifact> {
    if composition.has_logo {
        log::warn!("[export] Logo present; offering raster output for vector request");
        let mut artifact = produce_raster(composition)?;
        artifact.requested = ExportFormat::Vector;
        artifact.notices.push(Notice::VectorCompositingUnsupported);
        return Ok(artifact);
    }

    let input = &composition.input;
    let request = EncodeRequest {
        text: input.text.clone(),
        size: composition.surface.width(),
        dark: input.dark,
        light: input.light,
        ec_level: composition.ec_level,
        mode: OutputMode::Vector,
    };
    let markup = encoder.encode(&request).await?.into_vector()?;
    let bytes = markup.into_bytes();
    let reference = data_url(ExportFormat::Vector.mime(), &bytes);

    Ok(ExportArtifact {
        requested: ExportFormat::Vector,
        produced: ExportFormat::Vector,
        bytes,
        reference,
        notices: Vec::new(),
    })
}

fn produce_document(composition: &ComposedArtifact, page: &PageLayout) -> Result<ExportArtifact> {
    let surface = &composition.surface;
    let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();

    let mut pdf = PdfDocument::new(*page);
    pdf.embed_image(&rgb, page.fit(surface.width(), surface.height()));
    let bytes = pdf.finish()?;

    // History keeps the embedded raster, not the whole document
    let reference = data_url(ExportFormat::Raster.mime(), &encode_png(surface)?);

    Ok(ExportArtifact {
        requested: ExportFormat::Document,
        produced: ExportFormat::Document,
        bytes,
        reference,
        notices: Vec::new(),
    })
}

// ============================================================================
// Save Sinks
// ============================================================================

/// Client-side save step
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Offer the artifact under `filename`; returns where it went
    async fn save(&self, filename: &str, artifact: &ExportArtifact) -> Result<String>;
}

/// Writes artifacts into a directory
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn save(&self, filename: &str, artifact: &ExportArtifact) -> Result<String> {
        if filename.contains(['/', '\\']) {
            return Err(Error::validation(format!("Invalid filename: {}", filename)));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &artifact.bytes).await?;
        log::info!("[export] Saved {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(path.to_string_lossy().into_owned())
    }
}

/// One recorded save
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Keeps saved artifacts in memory
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<SavedArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, oldest first
    pub fn saved(&self) -> Vec<SavedArtifact> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn save(&self, filename: &str, artifact: &ExportArtifact) -> Result<String> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::internal("memory sink lock poisoned"))?;
        saved.push(SavedArtifact {
            filename: filename.to_string(),
            mime: artifact.mime(),
            bytes: artifact.bytes.clone(),
        });
        Ok(format!("memory://{}", filename))
    }
}
