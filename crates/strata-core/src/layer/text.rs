//! Text content and its shaped glyph cache.

use super::LayerContent;
use crate::color::Rgba8;
use kurbo::Rect;
use peniko::FontData;
use serde::{Deserialize, Serialize};

/// Font and paint settings for a text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Family name, or one of `sans-serif`, `serif`, `monospace`.
    pub family: String,
    /// Font size in pixels.
    pub size: f32,
    /// Synthetic skew in degrees (positive leans right).
    #[serde(default)]
    pub skew: f32,
    #[serde(default = "default_true")]
    pub anti_alias: bool,
    /// Multiplier on the font's natural line height.
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
    pub color: Rgba8,
}

fn default_true() -> bool {
    true
}

fn default_line_spacing() -> f32 {
    1.0
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: 24.0,
            skew: 0.0,
            anti_alias: true,
            line_spacing: 1.0,
            color: Rgba8::black(),
        }
    }
}

/// A glyph positioned in layer-local coordinates (baseline origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedGlyph {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// Glyphs sharing one font and size.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub font: FontData,
    pub font_size: f32,
    /// Total skew in degrees: style skew plus any synthesized oblique.
    pub skew: f32,
    pub glyphs: Vec<PositionedGlyph>,
}

/// Result of shaping a text layer.
#[derive(Debug, Clone, Default)]
pub struct GlyphCache {
    pub runs: Vec<GlyphRun>,
    /// Local-space extent of the laid out text.
    pub bounds: Rect,
    /// Set when the text is non-empty but no font produced glyphs.
    pub fallback: bool,
}

impl GlyphCache {
    pub fn glyph_count(&self) -> usize {
        self.runs.iter().map(|r| r.glyphs.len()).sum()
    }

    /// Nothing to draw, not even a fallback box.
    pub fn is_empty(&self) -> bool {
        !self.fallback && self.glyph_count() == 0
    }
}

/// A layer showing a run of shaped text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLayer {
    pub(crate) text: String,
    pub(crate) style: TextStyle,
    #[serde(skip)]
    pub(crate) cache: Option<GlyphCache>,
}

impl TextLayer {
    /// Creates unshaped text; the scene shapes it on insertion.
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
            cache: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn glyph_cache(&self) -> Option<&GlyphCache> {
        self.cache.as_ref()
    }
}

impl LayerContent for TextLayer {
    fn natural_rect(&self) -> Rect {
        self.cache.as_ref().map(|c| c.bounds).unwrap_or(Rect::ZERO)
    }

    fn uses_custom_opacity(&self) -> bool {
        true
    }
}
