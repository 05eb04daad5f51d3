//! Text shaping with Parley.

use crate::layer::text::{GlyphCache, GlyphRun, PositionedGlyph, TextStyle};
use kurbo::Rect;
use parley::layout::PositionedLayoutItem;
use parley::{
    Alignment, AlignmentOptions, FontContext, FontFamily, FontStack, GenericFamily, Layout,
    LayoutContext, StyleProperty,
};
use std::borrow::Cow;
use std::fmt;

/// Shared font and layout contexts.
pub struct TextEngine {
    font_cx: FontContext,
    layout_cx: LayoutContext<()>,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TextEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEngine").finish_non_exhaustive()
    }
}

fn font_family(name: &str) -> FontFamily<'_> {
    match name {
        "sans-serif" => FontFamily::Generic(GenericFamily::SansSerif),
        "serif" => FontFamily::Generic(GenericFamily::Serif),
        "monospace" => FontFamily::Generic(GenericFamily::Monospace),
        other => FontFamily::Named(Cow::Borrowed(other)),
    }
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            font_cx: FontContext::new(),
            layout_cx: LayoutContext::new(),
        }
    }

    /// Registers font bytes and returns the family names they provide.
    pub fn register_font(&mut self, data: Vec<u8>) -> Vec<String> {
        let families = self
            .font_cx
            .collection
            .register_fonts(parley::fontique::Blob::from(data), None);
        let mut names = Vec::with_capacity(families.len());
        for (id, _) in families {
            if let Some(name) = self.font_cx.collection.family_name(id) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Shapes `text` into a glyph cache.
    ///
    /// When the text is non-empty but no font yields glyphs, the cache is
    /// marked as fallback with an estimated extent.
    pub fn shape(&mut self, text: &str, style: &TextStyle) -> GlyphCache {
        if text.is_empty() {
            return GlyphCache::default();
        }
        let size = if style.size.is_finite() && style.size > 0.0 {
            style.size
        } else {
            log::warn!("Invalid font size {}, using 1.0", style.size);
            1.0
        };

        let mut builder = self
            .layout_cx
            .ranged_builder(&mut self.font_cx, text, 1.0, false);
        builder.push_default(StyleProperty::FontSize(size));
        builder.push_default(StyleProperty::FontStack(FontStack::Single(font_family(
            &style.family,
        ))));
        let mut layout: Layout<()> = builder.build(text);
        layout.break_all_lines(None);
        layout.align(None, Alignment::Start, AlignmentOptions::default());

        let spacing = if style.line_spacing.is_finite() {
            style.line_spacing.max(0.0)
        } else {
            1.0
        };

        let mut runs = Vec::new();
        let mut extra_height = 0.0f32;
        for (line_index, line) in layout.lines().enumerate() {
            let line_shift = (spacing - 1.0) * line.metrics().line_height * line_index as f32;
            extra_height = line_shift;
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let mut x = glyph_run.offset();
                let y = glyph_run.baseline() + line_shift;
                let run = glyph_run.run();
                let synthetic = run.synthesis().skew().unwrap_or(0.0);
                let glyphs: Vec<PositionedGlyph> = glyph_run
                    .glyphs()
                    .map(|glyph| {
                        let positioned = PositionedGlyph {
                            id: glyph.id,
                            x: x + glyph.x,
                            y: y - glyph.y,
                        };
                        x += glyph.advance;
                        positioned
                    })
                    .collect();
                if glyphs.is_empty() {
                    continue;
                }
                runs.push(GlyphRun {
                    font: run.font().clone(),
                    font_size: run.font_size(),
                    skew: style.skew + synthetic,
                    glyphs,
                });
            }
        }

        let mut cache = GlyphCache {
            runs,
            bounds: Rect::new(
                0.0,
                0.0,
                f64::from(layout.width()),
                f64::from((layout.height() + extra_height).max(0.0)),
            ),
            fallback: false,
        };
        if cache.glyph_count() == 0 {
            log::warn!("No glyphs for family '{}', using fallback box", style.family);
            let width = text.chars().count() as f64 * f64::from(size) * 0.6;
            let height = f64::from(size) * 1.2;
            cache.bounds = Rect::new(0.0, 0.0, width.max(20.0), height);
            cache.fallback = true;
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_shapes_to_empty_cache() {
        let mut engine = TextEngine::new();
        let cache = engine.shape("", &TextStyle::default());
        assert!(cache.is_empty());
        assert_eq!(cache.bounds, Rect::ZERO);
    }

    #[test]
    fn test_non_empty_text_always_has_extent() {
        // Either real glyphs or the fallback box, depending on installed fonts.
        let mut engine = TextEngine::new();
        let cache = engine.shape("Hello", &TextStyle::default());
        assert!(!cache.is_empty());
        assert!(cache.bounds.width() > 0.0);
        assert!(cache.bounds.height() > 0.0);
    }

    #[test]
    fn test_missing_family_degrades() {
        let mut engine = TextEngine::new();
        let style = TextStyle {
            family: "No Such Family 1234".to_string(),
            ..Default::default()
        };
        let cache = engine.shape("abc", &style);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_register_garbage_font_yields_no_families() {
        let mut engine = TextEngine::new();
        assert!(engine.register_font(vec![1, 2, 3]).is_empty());
    }
}
