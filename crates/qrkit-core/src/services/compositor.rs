//! Logo compositing
//!
//! Builds the composed raster: background fill, encoded symbol at full size,
//! and an optional centered logo sitting on a rounded contrast pad.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::config::PadStyle;
use crate::error::{Error, Result};
use crate::services::logo::LogoAsset;

// ============================================================================
// Colors
// ============================================================================

/// Opaque RGB color written as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const BLACK: HexColor = HexColor { r: 0, g: 0, b: 0 };
    pub const WHITE: HexColor = HexColor {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }

    /// Parse, falling back to `default` for blank input
    pub fn parse_or(input: &str, default: HexColor) -> Result<HexColor> {
        if input.trim().is_empty() {
            return Ok(default);
        }
        input.parse()
    }
}

impl std::fmt::Display for HexColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::str::FromStr for HexColor {
    type Err = Error;

    /// Accepts `#rrggbb` and `#rgb`, with or without the leading `#`
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || Error::validation(format!("Invalid color: {}", s));
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(HexColor {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(HexColor {
                    r: expand(0)?,
                    g: expand(1)?,
                    b: expand(2)?,
                })
            }
            _ => Err(invalid()),
        }
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Logo placement for one composition
#[derive(Debug, Clone, Copy)]
pub struct LogoOverlay<'a> {
    pub asset: &'a LogoAsset,
    /// Logo edge as a fraction of the surface width
    pub fraction: f32,
    pub pad: PadStyle,
}

/// Geometry of a placed logo, in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoPlacement {
    pub x: u32,
    pub y: u32,
    pub size: u32,
    pub padding: u32,
}

impl LogoPlacement {
    /// Center a logo of `fraction * surface` pixels
    pub fn centered(surface: u32, fraction: f32, pad: &PadStyle) -> Self {
        let size = (surface as f32 * fraction).floor() as u32;
        let offset = (surface - size.min(surface)) / 2;
        Self {
            x: offset,
            y: offset,
            size,
            padding: pad.padding_for(size),
        }
    }
}

/// Compose the final raster
///
/// The encoded symbol is scaled to the surface if the encoder produced a
/// different size.
pub fn compose(
    encoded: &RgbaImage,
    size: u32,
    background: HexColor,
    logo: Option<LogoOverlay<'_>>,
) -> RgbaImage {
    let mut surface = RgbaImage::from_pixel(size, size, background.to_rgba());

    if encoded.dimensions() == (size, size) {
        imageops::overlay(&mut surface, encoded, 0, 0);
    } else {
        let scaled = imageops::resize(encoded, size, size, FilterType::Nearest);
        imageops::overlay(&mut surface, &scaled, 0, 0);
    }

    if let Some(overlay) = logo {
        let placement = LogoPlacement::centered(size, overlay.fraction, &overlay.pad);
        if placement.size > 0 {
            draw_logo(&mut surface, background, &overlay, placement);
        }
    }

    surface
}

fn draw_logo(
    surface: &mut RgbaImage,
    background: HexColor,
    overlay: &LogoOverlay<'_>,
    placement: LogoPlacement,
) {
    let pad = placement.padding as i64;
    fill_rounded_rect(
        surface,
        placement.x as i64 - pad,
        placement.y as i64 - pad,
        (placement.size + placement.padding * 2) as i64,
        (placement.size + placement.padding * 2) as i64,
        overlay.pad.corner_radius as i64,
        background.to_rgba(),
    );

    let logo = imageops::resize(
        overlay.asset.image(),
        placement.size,
        placement.size,
        FilterType::Lanczos3,
    );
    imageops::overlay(surface, &logo, placement.x as i64, placement.y as i64);
}

/// Fill a rounded rectangle, clipped to the surface
pub fn fill_rounded_rect(
    surface: &mut RgbaImage,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    radius: i64,
    color: Rgba<u8>,
) {
    let radius = radius.min(w / 2).min(h / 2).max(0);
    let (sw, sh) = (surface.width() as i64, surface.height() as i64);

    for py in y.max(0)..(y + h).min(sh) {
        for px in x.max(0)..(x + w).min(sw) {
            // Distance from the nearest corner circle center, if in a corner
            let cx = if px < x + radius {
                x + radius
            } else if px >= x + w - radius {
                x + w - radius - 1
            } else {
                px
            };
            let cy = if py < y + radius {
                y + radius
            } else if py >= y + h - radius {
                y + h - radius - 1
            } else {
                py
            };
            let (dx, dy) = (px - cx, py - cy);
            if dx * dx + dy * dy <= radius * radius {
                surface.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Down-scaled copy for display only
pub fn preview(composed: &RgbaImage, size: u32) -> RgbaImage {
    imageops::resize(composed, size, size, FilterType::Triangle)
}
