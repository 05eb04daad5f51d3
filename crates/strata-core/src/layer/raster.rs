//! Raster content: a bitmap plus per-channel multipliers.

use super::LayerContent;
use crate::color::Rgba8;
use crate::error::{ContentError, ContentResult};
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Returns a process-unique content revision.
///
/// Renderers key cached pixmaps on this so that a changed bitmap never
/// reuses a stale cache entry, even across scenes.
pub(crate) fn next_revision() -> u64 {
    static REVISION: AtomicU64 = AtomicU64::new(1);
    REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Straight-alpha RGBA8 pixels, row-major.
///
/// Deserialization rejects a pixel buffer that does not match the
/// dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBitmap")]
pub struct Bitmap {
    width: u32,
    height: u32,
    /// Stored as base64 so documents stay plain JSON.
    #[serde(serialize_with = "pixels_base64::serialize")]
    pixels: Vec<u8>,
}

impl Bitmap {
    /// A fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba8::transparent())
    }

    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&color.to_array());
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> ContentResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ContentError::BufferSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes PNG, JPEG or WebP bytes.
    pub fn decode(data: &[u8]) -> ContentResult<Self> {
        let decoded =
            image::load_from_memory(data).map_err(|e| ContentError::Decode(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(ContentError::EmptyBitmap);
        }
        Self::from_rgba(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.pixels[i..i + 4];
        Some(Rgba8::new(p[0], p[1], p[2], p[3]))
    }

    /// Writes one pixel; out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&color.to_array());
    }
}

#[derive(Deserialize)]
struct RawBitmap {
    width: u32,
    height: u32,
    #[serde(with = "pixels_base64")]
    pixels: Vec<u8>,
}

impl TryFrom<RawBitmap> for Bitmap {
    type Error = ContentError;

    fn try_from(raw: RawBitmap) -> ContentResult<Self> {
        Self::from_rgba(raw.width, raw.height, raw.pixels)
    }
}

mod pixels_base64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pixels: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(pixels))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Per-channel multipliers applied at render time (R, G, B, A).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMultipliers(pub [f32; 4]);

impl Default for ChannelMultipliers {
    fn default() -> Self {
        Self([1.0; 4])
    }
}

impl ChannelMultipliers {
    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|m| *m == 1.0)
    }
}

/// A layer holding editable pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterLayer {
    pub(crate) bitmap: Bitmap,
    #[serde(default)]
    pub(crate) channel_multipliers: ChannelMultipliers,
    #[serde(skip, default = "next_revision")]
    pub(crate) revision: u64,
}

impl RasterLayer {
    pub fn new(bitmap: Bitmap) -> Self {
        Self {
            bitmap,
            channel_multipliers: ChannelMultipliers::default(),
            revision: next_revision(),
        }
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn channel_multipliers(&self) -> ChannelMultipliers {
        self.channel_multipliers
    }

    /// Changes whenever pixels or multipliers change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn touch(&mut self) {
        self.revision = next_revision();
    }
}

impl LayerContent for RasterLayer {
    fn natural_rect(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            f64::from(self.bitmap.width),
            f64::from(self.bitmap.height),
        )
    }

    fn uses_custom_opacity(&self) -> bool {
        true
    }
}
