//! Tile codec.
//!
//! Finished `T×T` RGBA canvases are encoded into the bytes that get hashed,
//! stored and served.
//!
//! # Codec Backends
//!
//! - **WebP** (default): uses the lossless encoder shipped with the `image`
//!   crate. The quality value is accepted but has no effect on this backend,
//!   and the transparent padding survives exactly.
//!
//! - **JPEG**: honours quality (1-100). JPEG has no alpha channel, so the
//!   canvas is flattened to RGB and the padded area renders black.
//!
//! Both backends are deterministic: the same canvas and quality always yield
//! byte-identical output, which the content hash relies on.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, RgbaImage};

use crate::error::TileError;

/// Default encode quality (1-100).
pub const DEFAULT_TILE_QUALITY: u8 = 80;

/// Minimum allowed encode quality.
pub const MIN_TILE_QUALITY: u8 = 1;

/// Maximum allowed encode quality.
pub const MAX_TILE_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Output format for encoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum TileFormat {
    /// Lossless WebP with alpha (quality is ignored)
    #[default]
    #[value(name = "webp")]
    WebP,

    /// Baseline JPEG without alpha
    #[value(name = "jpeg")]
    Jpeg,
}

impl TileFormat {
    /// File extension used in storage keys.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::WebP => "webp",
            TileFormat::Jpeg => "jpg",
        }
    }

    /// MIME type served for tiles of this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::WebP => "image/webp",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    /// Whether the quality setting changes the encoded output.
    pub fn honours_quality(&self) -> bool {
        matches!(self, TileFormat::Jpeg)
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TileFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(TileFormat::WebP),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            other => Err(TileError::InvalidParameter {
                message: format!("unknown tile format: {}", other),
            }),
        }
    }
}

// =============================================================================
// Tile Encoder
// =============================================================================

/// Encodes padded tile canvases in a fixed format and quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileEncoder {
    format: TileFormat,
    quality: u8,
}

impl TileEncoder {
    /// Create an encoder for the given format and quality.
    ///
    /// Quality must be within 1-100 even for formats that ignore it, so a
    /// bad value is never silently accepted.
    pub fn new(format: TileFormat, quality: u8) -> Result<Self, TileError> {
        if !is_valid_quality(quality) {
            return Err(TileError::InvalidParameter {
                message: format!("quality {} is outside 1-100", quality),
            });
        }
        Ok(Self { format, quality })
    }

    /// The output format.
    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// The configured quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one finished canvas.
    pub fn encode(&self, canvas: &RgbaImage) -> Result<Bytes, TileError> {
        let mut output = Vec::new();

        match self.format {
            TileFormat::WebP => {
                WebPEncoder::new_lossless(&mut output)
                    .encode(
                        canvas.as_raw(),
                        canvas.width(),
                        canvas.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
            TileFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut output, self.quality)
                    .encode_image(&rgb)
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(Bytes::from(output))
    }
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self {
            format: TileFormat::default(),
            quality: DEFAULT_TILE_QUALITY,
        }
    }
}

/// Validate an encode quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_TILE_QUALITY..=MAX_TILE_QUALITY).contains(&quality)
}

// =============================================================================
// Tests
// =============================================================================
