//! CPU rendering built on `vello_cpu`.

use crate::renderer::{
    LayerRenderer, RenderContext, RenderResult, RendererError, Surface, VisibilityMode,
};
use kurbo::{Affine, Rect, Stroke};
use peniko::{
    Blob, Color, Fill, ImageAlphaType, ImageData, ImageFormat, ImageQuality, ImageSampler,
};
use std::collections::HashMap;
use std::fmt;
use strata_core::{
    Bitmap, BlendMode, ChannelMultipliers, LayerId, RasterLayer, Rgba8, Scene, ShapeLayer,
    TextLayer, opacity_to_alpha,
};
use vello_cpu::{Glyph, Image, ImageSource, Pixmap, RenderMode, RenderSettings};

/// Raster paint with opacity and channel multipliers already applied.
struct CachedRaster {
    revision: u64,
    alpha: u8,
    image: Image,
}

/// Per-layer raster paints, reused while a layer's pixels and opacity
/// stay the same.
#[derive(Default)]
pub(crate) struct RasterCache {
    entries: HashMap<LayerId, CachedRaster>,
}

impl fmt::Debug for RasterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl RasterCache {
    fn image_for(&mut self, id: LayerId, raster: &RasterLayer, alpha: u8) -> Option<Image> {
        if let Some(entry) = self.entries.get(&id) {
            if entry.revision == raster.revision() && entry.alpha == alpha {
                return Some(entry.image.clone());
            }
        }

        let bitmap = raster.bitmap();
        if bitmap.is_empty() {
            return None;
        }
        if bitmap.width() > u32::from(u16::MAX) || bitmap.height() > u32::from(u16::MAX) {
            log::warn!(
                "Skipping {id:?}: {}x{} bitmap exceeds the surface limit",
                bitmap.width(),
                bitmap.height()
            );
            return None;
        }

        let pixels = apply_color_matrix(bitmap, raster.channel_multipliers(), alpha);
        let data = ImageData {
            data: Blob::from(pixels),
            format: ImageFormat::Rgba8,
            alpha_type: ImageAlphaType::Alpha,
            width: bitmap.width(),
            height: bitmap.height(),
        };
        let image = Image {
            image: ImageSource::from_peniko_image_data(&data),
            // Pixel layers scale without smoothing.
            sampler: ImageSampler {
                quality: ImageQuality::Low,
                ..ImageSampler::default()
            },
        };
        log::trace!("Rebuilt raster paint for {id:?}");
        self.entries.insert(
            id,
            CachedRaster {
                revision: raster.revision(),
                alpha,
                image: image.clone(),
            },
        );
        Some(image)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn retain_live(&mut self, scene: &Scene) {
        self.entries.retain(|id, _| scene.contains_layer(*id));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Scales straight RGBA by the channel multipliers and `alpha`.
fn apply_color_matrix(bitmap: &Bitmap, multipliers: ChannelMultipliers, alpha: u8) -> Vec<u8> {
    let [mr, mg, mb, ma] = multipliers.0;
    let opacity = f32::from(alpha) / 255.0;
    let scale = |c: u8, m: f32| (f32::from(c) * m.clamp(0.0, 1.0)).round() as u8;
    let mut out = Vec::with_capacity(bitmap.pixels().len());
    for px in bitmap.pixels().chunks_exact(4) {
        out.extend_from_slice(&[
            scale(px[0], mr),
            scale(px[1], mg),
            scale(px[2], mb),
            scale(px[3], ma * opacity),
        ]);
    }
    out
}

fn unpremultiply(px: [u8; 4]) -> [u8; 4] {
    let a = px[3];
    if a == 0 {
        return [0, 0, 0, 0];
    }
    if a == 255 {
        return px;
    }
    let un = |c: u8| ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), a]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackEntry {
    Noop,
    Pushed,
}

/// A [`Surface`] drawing into a `vello_cpu` render context.
pub struct CpuSurface {
    ctx: vello_cpu::RenderContext,
    rasters: RasterCache,
    stack: Vec<StackEntry>,
    width: u16,
    height: u16,
}

impl fmt::Debug for CpuSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.stack.len())
            .field("rasters", &self.rasters)
            .finish()
    }
}

impl CpuSurface {
    /// Create a transparent surface.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        Self::with_cache(width, height, RasterCache::default())
    }

    fn with_cache(width: u32, height: u32, rasters: RasterCache) -> RenderResult<Self> {
        let invalid = || RendererError::InvalidSize { width, height };
        let w: u16 = width.try_into().map_err(|_| invalid())?;
        let h: u16 = height.try_into().map_err(|_| invalid())?;
        if w == 0 || h == 0 {
            return Err(invalid());
        }
        let settings = RenderSettings {
            render_mode: RenderMode::OptimizeSpeed,
            ..RenderSettings::default()
        };
        Ok(Self {
            ctx: vello_cpu::RenderContext::new_with(w, h, settings),
            rasters,
            stack: Vec::new(),
            width: w,
            height: h,
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    /// Fill the whole surface with `color`.
    pub fn fill(&mut self, color: Color) {
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(color);
        self.ctx.fill_rect(&Rect::new(
            0.0,
            0.0,
            f64::from(self.width),
            f64::from(self.height),
        ));
    }

    /// Rasterize everything drawn so far.
    pub fn finish(self) -> RenderedImage {
        self.finish_with_cache().0
    }

    fn finish_with_cache(mut self) -> (RenderedImage, RasterCache) {
        debug_assert!(self.stack.is_empty(), "unbalanced surface layers");
        while let Some(entry) = self.stack.pop() {
            if entry == StackEntry::Pushed {
                self.ctx.pop_layer();
            }
        }
        let mut pixmap = Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);

        let mut pixels = Vec::with_capacity(usize::from(self.width) * usize::from(self.height) * 4);
        for p in pixmap.data() {
            pixels.extend_from_slice(&[p.r, p.g, p.b, p.a]);
        }
        let image = RenderedImage {
            width: u32::from(self.width),
            height: u32::from(self.height),
            pixels,
        };
        (image, self.rasters)
    }
}

impl Surface for CpuSurface {
    fn push_isolation(&mut self, opacity: f32, blend: BlendMode) {
        let blend = (!blend.is_normal()).then(|| peniko::BlendMode::from(blend));
        self.ctx.push_layer(None, blend, Some(opacity), None, None);
        self.stack.push(StackEntry::Pushed);
    }

    fn push_plain(&mut self) {
        self.stack.push(StackEntry::Noop);
    }

    fn pop(&mut self) {
        match self.stack.pop() {
            Some(StackEntry::Noop) => {}
            Some(StackEntry::Pushed) => self.ctx.pop_layer(),
            None => panic!("pop with empty layer stack"),
        }
    }

    fn draw_raster(&mut self, id: LayerId, raster: &RasterLayer, transform: Affine, opacity: f32) {
        let Some(image) = self.rasters.image_for(id, raster, opacity_to_alpha(opacity)) else {
            return;
        };
        let bitmap = raster.bitmap();
        self.ctx.set_transform(transform);
        self.ctx.set_paint_transform(Affine::IDENTITY);
        self.ctx.set_paint(image);
        self.ctx.fill_rect(&Rect::new(
            0.0,
            0.0,
            f64::from(bitmap.width()),
            f64::from(bitmap.height()),
        ));
    }

    fn draw_text(&mut self, text: &TextLayer, transform: Affine, opacity: f32) {
        let Some(cache) = text.glyph_cache() else {
            return;
        };
        let style = text.style();
        self.ctx.set_transform(transform);
        self.ctx.set_paint(Color::from(style.color.with_opacity(opacity)));

        if cache.fallback {
            // No usable font: show where the text would be.
            self.ctx.fill_rect(&cache.bounds);
            return;
        }

        for run in &cache.runs {
            let glyphs = run.glyphs.iter().map(|g| Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            let mut builder = self
                .ctx
                .glyph_run(&run.font)
                .font_size(run.font_size)
                .hint(!style.anti_alias);
            if run.skew != 0.0 {
                let skew = f64::from(run.skew).to_radians().tan();
                builder = builder.glyph_transform(Affine::skew(skew, 0.0));
            }
            builder.fill_glyphs(glyphs);
        }
    }

    fn draw_shape(&mut self, shape: &ShapeLayer, transform: Affine, opacity: f32) {
        let path = shape.geometry().to_path();
        let style = shape.style();
        self.ctx.set_transform(transform);

        if let Some(fill) = style.fill {
            self.ctx.set_fill_rule(Fill::NonZero);
            self.ctx.set_paint(Color::from(fill.with_opacity(opacity)));
            self.ctx.fill_path(&path);
        }
        if let Some(stroke) = style.stroke {
            if style.stroke_width > 0.0 {
                self.ctx.set_stroke(Stroke::new(style.stroke_width));
                self.ctx.set_paint(Color::from(stroke.with_opacity(opacity)));
                self.ctx.stroke_path(&path);
            }
        }
    }
}

/// A flattened render: premultiplied RGBA8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RenderedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Premultiplied RGBA8 bytes.
    pub fn premultiplied(&self) -> &[u8] {
        &self.pixels
    }

    /// Straight-alpha color at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = unpremultiply([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]);
        Some(Rgba8::new(px[0], px[1], px[2], px[3]))
    }

    /// Straight-alpha RGBA8 bytes.
    pub fn to_unpremultiplied(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len());
        for px in self.pixels.chunks_exact(4) {
            out.extend_from_slice(&unpremultiply([px[0], px[1], px[2], px[3]]));
        }
        out
    }

    pub fn to_bitmap(&self) -> RenderResult<Bitmap> {
        Ok(Bitmap::from_rgba(
            self.width,
            self.height,
            self.to_unpremultiplied(),
        )?)
    }

    /// Encode as an 8-bit RGBA PNG.
    pub fn to_png(&self) -> RenderResult<Vec<u8>> {
        let encode = |e: png::EncodingError| RendererError::Encode(e.to_string());
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(encode)?;
            writer
                .write_image_data(&self.to_unpremultiplied())
                .map_err(encode)?;
            writer.finish().map_err(encode)?;
        }
        Ok(out)
    }
}

/// Renders canvases and layer subtrees on the CPU.
///
/// Keeps raster paints between passes; they are rebuilt when a layer's
/// pixels, channel multipliers or opacity change.
#[derive(Debug, Default)]
pub struct CpuRenderer {
    rasters: RasterCache,
}

impl CpuRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached raster paints.
    pub fn cached_rasters(&self) -> usize {
        self.rasters.len()
    }

    /// Composite the canvas named by `ctx`.
    pub fn render(&mut self, scene: &mut Scene, ctx: &RenderContext) -> RenderResult<RenderedImage> {
        let size = scene.canvas(ctx.canvas)?.size();
        if ctx.full_invalidate {
            self.rasters.clear();
        }
        let mut surface = CpuSurface::with_cache(
            size.width,
            size.height,
            std::mem::take(&mut self.rasters),
        )?;
        if let Some(background) = ctx.background {
            surface.fill(background);
        }

        let mut renderer = LayerRenderer::new(&mut surface, ctx.visibility);
        let result = renderer.render_canvas(scene, ctx.canvas);
        let stats = renderer.stats();
        let (image, mut rasters) = surface.finish_with_cache();
        rasters.retain_live(scene);
        self.rasters = rasters;
        result?;

        log::debug!(
            "Rendered {:?} at {}x{}: {} drawn, {} skipped, {} isolated",
            ctx.canvas,
            size.width,
            size.height,
            stats.drawn,
            stats.skipped,
            stats.isolations
        );
        Ok(image)
    }

    /// Render `layer` and its subtree in the layer's own coordinate space,
    /// as it would appear in an export.
    ///
    /// The bitmap covers the layer's natural rectangle; a detached group
    /// covers the union of its children instead. An empty extent yields an
    /// empty bitmap.
    pub fn rasterize_layer(&mut self, scene: &mut Scene, layer: LayerId) -> RenderResult<Bitmap> {
        let extent = local_extent(scene, layer)?;
        let width = extent.width().ceil().max(0.0) as u32;
        let height = extent.height().ceil().max(0.0) as u32;
        if width == 0 || height == 0 {
            return Ok(Bitmap::new(0, 0));
        }

        let base = Affine::translate(-extent.origin().to_vec2())
            * scene.absolute_inverse_transformation_matrix(layer)?;
        let mut surface =
            CpuSurface::with_cache(width, height, std::mem::take(&mut self.rasters))?;
        let result = LayerRenderer::new(&mut surface, VisibilityMode::Export)
            .with_base_transform(base)
            .render_layer(scene, layer);
        let (image, mut rasters) = surface.finish_with_cache();
        rasters.retain_live(scene);
        self.rasters = rasters;
        result?;

        log::debug!("Rasterized {layer:?} into {width}x{height}");
        image.to_bitmap()
    }
}

fn local_extent(scene: &Scene, layer: LayerId) -> RenderResult<Rect> {
    let natural = scene.natural_rect(layer)?;
    if natural.area() > 0.0 || !scene.layer(layer)?.kind().is_composition() {
        return Ok(natural);
    }

    let to_local = scene.absolute_inverse_transformation_matrix(layer)?;
    let mut extent: Option<Rect> = None;
    for id in scene.descendants(layer) {
        if scene.layer(id)?.kind().is_composition() {
            continue;
        }
        let matrix = to_local * scene.absolute_transformation_matrix(id)?;
        let bounds = matrix.transform_rect_bbox(scene.natural_rect(id)?);
        extent = Some(extent.map_or(bounds, |e| e.union(bounds)));
    }
    Ok(extent.unwrap_or(Rect::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpremultiply() {
        assert_eq!(unpremultiply([0, 0, 0, 0]), [0, 0, 0, 0]);
        assert_eq!(unpremultiply([10, 20, 30, 255]), [10, 20, 30, 255]);
        assert_eq!(unpremultiply([64, 0, 0, 128]), [128, 0, 0, 128]);
    }

    #[test]
    fn test_color_matrix_scales_channels_and_alpha() {
        let bitmap = Bitmap::filled(1, 1, Rgba8::new(200, 100, 50, 255));
        let out = apply_color_matrix(&bitmap, ChannelMultipliers([0.5, 1.0, 0.0, 1.0]), 128);
        assert_eq!(out, vec![100, 100, 0, 128]);
    }

    #[test]
    fn test_surface_rejects_bad_sizes() {
        assert!(matches!(
            CpuSurface::new(0, 10),
            Err(RendererError::InvalidSize { .. })
        ));
        assert!(CpuSurface::new(70_000, 1).is_err());
    }

    #[test]
    fn test_fill_covers_surface() {
        let mut surface = CpuSurface::new(4, 2).unwrap();
        surface.fill(Color::from_rgba8(0, 255, 0, 255));
        let image = surface.finish();
        assert_eq!(image.pixel(3, 1), Some(Rgba8::new(0, 255, 0, 255)));
        assert_eq!(image.pixel(4, 0), None);
    }

    #[test]
    fn test_png_has_signature() {
        let surface = CpuSurface::new(2, 2).unwrap();
        let png = surface.finish().to_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
