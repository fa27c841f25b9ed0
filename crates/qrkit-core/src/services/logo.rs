//! Logo asset loading and inline data references

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;

use crate::error::{Error, Result};

/// A decoded user logo, shared by reference
#[derive(Debug, Clone)]
pub struct LogoAsset {
    image: Arc<RgbaImage>,
}

impl LogoAsset {
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Decode an uploaded image file off the async executor
///
/// # Errors
/// `AssetDecodeFailure` when the bytes are empty or not a supported image.
pub async fn decode_logo(bytes: Vec<u8>) -> Result<LogoAsset> {
    if bytes.is_empty() {
        return Err(Error::AssetDecodeFailure("file is empty".to_string()));
    }

    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await?;
    match decoded {
        Ok(img) => {
            let rgba = img.to_rgba8();
            log::debug!("[logo] Decoded {}x{} logo", rgba.width(), rgba.height());
            Ok(LogoAsset::new(Arc::new(rgba)))
        }
        Err(e) => Err(Error::AssetDecodeFailure(e.to_string())),
    }
}

/// Inline `data:` reference, usable as an image source or download payload
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
