//! Renderer abstraction and the layer compositing pass.

use kurbo::Affine;
use peniko::Color;
use strata_core::color::{is_effectively_opaque, is_effectively_transparent};
use strata_core::{
    BlendMode, CanvasId, ContentError, LayerError, LayerId, LayerKind, RasterLayer, Scene,
    ShapeLayer, TextLayer,
};
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),
    #[error("Content error: {0}")]
    Content(#[from] ContentError),
    #[error("Invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Which visibility flags decide whether a layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityMode {
    /// Editor view: honors `visible` and the canvas solo layer.
    #[default]
    Preview,
    /// Output file: honors `export_visible` only.
    Export,
    /// Draws every layer with non-zero opacity.
    IgnoreVisibility,
}

/// Context for a single render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    /// The canvas to render.
    pub canvas: CanvasId,
    pub visibility: VisibilityMode,
    /// Drop cached intermediate results before rendering.
    pub full_invalidate: bool,
    /// Fill color under all layers. `None` leaves the surface transparent.
    pub background: Option<Color>,
}

impl RenderContext {
    /// Create a preview render context for `canvas`.
    pub fn new(canvas: CanvasId) -> Self {
        Self {
            canvas,
            visibility: VisibilityMode::Preview,
            full_invalidate: false,
            background: None,
        }
    }

    /// Set the visibility mode.
    pub fn with_visibility(mut self, visibility: VisibilityMode) -> Self {
        self.visibility = visibility;
        self
    }

    /// Request that cached intermediate results be rebuilt.
    pub fn with_full_invalidate(mut self, full_invalidate: bool) -> Self {
        self.full_invalidate = full_invalidate;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Option<Color>) -> Self {
        self.background = color;
        self
    }
}

/// Drawing target for the compositing pass.
///
/// Pushes and pops are balanced. Transforms map layer-local coordinates to
/// surface pixels; `opacity` is the layer opacity to fold into the paint.
pub trait Surface {
    /// Start an offscreen group composited with `opacity` and `blend`.
    fn push_isolation(&mut self, opacity: f32, blend: BlendMode);

    /// Start a group that needs no offscreen buffer.
    fn push_plain(&mut self);

    fn pop(&mut self);

    fn draw_raster(&mut self, id: LayerId, raster: &RasterLayer, transform: Affine, opacity: f32);

    fn draw_text(&mut self, text: &TextLayer, transform: Affine, opacity: f32);

    fn draw_shape(&mut self, shape: &ShapeLayer, transform: Affine, opacity: f32);
}

/// Counters collected during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Leaves handed to the surface.
    pub drawn: usize,
    /// Layers skipped by visibility, opacity or empty content.
    pub skipped: usize,
    /// Offscreen groups opened.
    pub isolations: usize,
}

/// Walks a layer tree back to front and drives a [`Surface`].
pub struct LayerRenderer<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
    visibility: VisibilityMode,
    base: Affine,
    stats: RenderStats,
}

impl<'a, S: Surface + ?Sized> LayerRenderer<'a, S> {
    pub fn new(surface: &'a mut S, visibility: VisibilityMode) -> Self {
        Self {
            surface,
            visibility,
            base: Affine::IDENTITY,
            stats: RenderStats::default(),
        }
    }

    /// Transform applied on top of every absolute layer matrix.
    pub fn with_base_transform(mut self, base: Affine) -> Self {
        self.base = base;
        self
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Render the root composition of `canvas`.
    pub fn render_canvas(&mut self, scene: &mut Scene, canvas: CanvasId) -> RenderResult<()> {
        let root = scene.canvas(canvas)?.root();
        self.render_layer(scene, root)
    }

    fn is_hidden(&self, scene: &Scene, id: LayerId) -> RenderResult<bool> {
        let visual = scene.layer(id)?.visual();
        let hidden = match self.visibility {
            VisibilityMode::Preview => !visual.is_visible() || !scene.is_on_solo_path(id),
            VisibilityMode::Export => !visual.is_export_visible(),
            VisibilityMode::IgnoreVisibility => false,
        };
        Ok(hidden || is_effectively_transparent(visual.opacity()))
    }

    /// Render `id` and, for compositions, its subtree.
    ///
    /// The walk keeps its own stack, so tree depth is not limited by the
    /// call stack.
    pub fn render_layer(&mut self, scene: &mut Scene, id: LayerId) -> RenderResult<()> {
        let mut stack = vec![Frame::Enter(id)];
        while let Some(frame) = stack.pop() {
            let step = match frame {
                Frame::Enter(layer) => self.enter(scene, layer, &mut stack),
                Frame::Exit(layer) => self.exit(scene, layer),
            };
            if let Err(err) = step {
                // Close open groups so surface layers and render flags balance.
                while let Some(frame) = stack.pop() {
                    if let Frame::Exit(layer) = frame {
                        let _ = self.exit(scene, layer);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn enter(
        &mut self,
        scene: &mut Scene,
        id: LayerId,
        stack: &mut Vec<Frame>,
    ) -> RenderResult<()> {
        if self.is_hidden(scene, id)? {
            log::trace!("Skipping hidden {id:?}");
            self.stats.skipped += 1;
            return Ok(());
        }
        if !scene.prepare_render(id)? {
            log::trace!("Nothing to draw for {id:?}");
            self.stats.skipped += 1;
            return Ok(());
        }

        let transform = self.base * scene.absolute_transformation_matrix(id)?;
        scene.begin_layer_render(id)?;
        let layer = scene.layer(id)?;
        let opacity = layer.visual().opacity();
        let blend = layer.visual().blend_mode();
        let isolate = (!is_effectively_opaque(opacity) && !layer.kind().uses_custom_opacity())
            || !blend.is_normal();

        if let LayerKind::Composition(composition) = layer.kind() {
            if isolate {
                self.stats.isolations += 1;
                self.surface.push_isolation(opacity, blend);
            } else {
                self.surface.push_plain();
            }
            stack.push(Frame::Exit(id));
            // Index 0 is the top of the stack: pushed first, popped and
            // painted last.
            stack.extend(composition.children().iter().map(|&child| Frame::Enter(child)));
            return Ok(());
        }

        log::trace!("Drawing {} layer {id:?}", layer.kind().kind_name());
        self.stats.drawn += 1;
        if isolate {
            self.stats.isolations += 1;
            self.surface.push_isolation(opacity, blend);
            draw_leaf(&mut *self.surface, id, layer.kind(), transform, 1.0);
            self.surface.pop();
        } else {
            draw_leaf(&mut *self.surface, id, layer.kind(), transform, opacity);
        }
        scene.end_layer_render(id)?;
        Ok(())
    }

    fn exit(&mut self, scene: &mut Scene, id: LayerId) -> RenderResult<()> {
        self.surface.pop();
        scene.end_layer_render(id)?;
        Ok(())
    }
}

/// One step of the compositing walk.
enum Frame {
    Enter(LayerId),
    /// Closes a composition opened by `Enter`.
    Exit(LayerId),
}

/// Dispatch one leaf to the matching surface call.
///
/// # Panics
///
/// If `kind` is a composition: groups are drawn by [`LayerRenderer`]
/// through their children.
pub fn draw_leaf<S: Surface + ?Sized>(
    surface: &mut S,
    id: LayerId,
    kind: &LayerKind,
    transform: Affine,
    opacity: f32,
) {
    match kind {
        LayerKind::Raster(raster) => surface.draw_raster(id, raster, transform, opacity),
        LayerKind::Text(text) => surface.draw_text(text, transform, opacity),
        LayerKind::Shape(shape) => surface.draw_shape(shape, transform, opacity),
        LayerKind::Composition(_) => {
            panic!("composition {id:?} drawn as a leaf")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Point, Size};
    use strata_core::{
        Bitmap, CanvasConfig, CompositionLayer, ShapeGeometry, ShapeStyle, TextStyle,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Isolate(f32, BlendMode),
        Plain,
        Pop,
        Raster(LayerId, f32),
        Text(f32),
        Shape(f32),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl Surface for Recorder {
        fn push_isolation(&mut self, opacity: f32, blend: BlendMode) {
            self.ops.push(Op::Isolate(opacity, blend));
        }
        fn push_plain(&mut self) {
            self.ops.push(Op::Plain);
        }
        fn pop(&mut self) {
            self.ops.push(Op::Pop);
        }
        fn draw_raster(&mut self, id: LayerId, _: &RasterLayer, _: Affine, opacity: f32) {
            self.ops.push(Op::Raster(id, opacity));
        }
        fn draw_text(&mut self, _: &TextLayer, _: Affine, opacity: f32) {
            self.ops.push(Op::Text(opacity));
        }
        fn draw_shape(&mut self, _: &ShapeLayer, _: Affine, opacity: f32) {
            self.ops.push(Op::Shape(opacity));
        }
    }

    fn setup() -> (Scene, CanvasId, LayerId) {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::new("c", 16, 16));
        let root = scene.canvas(canvas).unwrap().root();
        (scene, canvas, root)
    }

    fn raster(scene: &mut Scene, parent: LayerId, index: usize) -> LayerId {
        let id = scene.create_raster_layer("r", Bitmap::new(4, 4));
        scene.insert_layer(parent, index, id).unwrap();
        id
    }

    fn record(scene: &mut Scene, canvas: CanvasId, mode: VisibilityMode) -> Vec<Op> {
        let mut surface = Recorder::default();
        LayerRenderer::new(&mut surface, mode)
            .render_canvas(scene, canvas)
            .unwrap();
        surface.ops
    }

    #[test]
    fn test_children_paint_from_last_to_first() {
        let (mut scene, canvas, root) = setup();
        let bottom = raster(&mut scene, root, 0);
        let top = raster(&mut scene, root, 0);
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Preview),
            vec![
                Op::Plain,
                Op::Raster(bottom, 1.0),
                Op::Raster(top, 1.0),
                Op::Pop
            ]
        );
    }

    #[test]
    fn test_group_opacity_isolates() {
        let (mut scene, canvas, root) = setup();
        let group = scene.create_composition_layer("g");
        scene.insert_layer(root, 0, group).unwrap();
        let leaf = raster(&mut scene, group, 0);
        scene.set_opacity(group, 0.5).unwrap();
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Preview),
            vec![
                Op::Plain,
                Op::Isolate(0.5, BlendMode::Normal),
                Op::Raster(leaf, 1.0),
                Op::Pop,
                Op::Pop
            ]
        );
    }

    #[test]
    fn test_leaf_opacity_is_folded() {
        let (mut scene, canvas, root) = setup();
        let leaf = raster(&mut scene, root, 0);
        scene.set_opacity(leaf, 0.25).unwrap();
        let ops = record(&mut scene, canvas, VisibilityMode::Preview);
        assert_eq!(ops[1], Op::Raster(leaf, 0.25));
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn test_leaf_blend_mode_isolates() {
        let (mut scene, canvas, root) = setup();
        let leaf = scene.create_shape_layer(
            "s",
            ShapeGeometry::Rectangle {
                size: Size::new(4.0, 4.0),
                corner_radius: 0.0,
            },
            ShapeStyle::default(),
        );
        scene.insert_layer(root, 0, leaf).unwrap();
        scene.set_blend_mode(leaf, BlendMode::Multiply).unwrap();
        scene.set_opacity(leaf, 0.5).unwrap();
        let ops = record(&mut scene, canvas, VisibilityMode::Preview);
        assert_eq!(
            ops[1..4],
            [
                Op::Isolate(0.5, BlendMode::Multiply),
                Op::Shape(1.0),
                Op::Pop
            ]
        );
    }

    #[test]
    fn test_visibility_axes_are_independent() {
        let (mut scene, canvas, root) = setup();
        let leaf = raster(&mut scene, root, 0);
        scene.set_visible(leaf, false).unwrap();
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Preview),
            vec![Op::Plain, Op::Pop]
        );
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Export),
            vec![Op::Plain, Op::Raster(leaf, 1.0), Op::Pop]
        );

        scene.set_visible(leaf, true).unwrap();
        scene.set_export_visible(leaf, false).unwrap();
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Export),
            vec![Op::Plain, Op::Pop]
        );
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::IgnoreVisibility).len(),
            3
        );
    }

    #[test]
    fn test_zero_opacity_always_skipped() {
        let (mut scene, canvas, root) = setup();
        let leaf = raster(&mut scene, root, 0);
        scene.set_opacity(leaf, 0.0).unwrap();
        for mode in [
            VisibilityMode::Preview,
            VisibilityMode::Export,
            VisibilityMode::IgnoreVisibility,
        ] {
            assert_eq!(record(&mut scene, canvas, mode), vec![Op::Plain, Op::Pop]);
        }
    }

    #[test]
    fn test_solo_limits_preview_only() {
        let (mut scene, canvas, root) = setup();
        let a = raster(&mut scene, root, 0);
        let b = raster(&mut scene, root, 0);
        scene.set_solo(a, true).unwrap();
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Preview),
            vec![Op::Plain, Op::Raster(a, 1.0), Op::Pop]
        );
        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Export),
            vec![Op::Plain, Op::Raster(a, 1.0), Op::Raster(b, 1.0), Op::Pop]
        );
    }

    #[test]
    fn test_empty_content_skipped() {
        let (mut scene, canvas, root) = setup();
        let empty = scene.create_raster_layer("empty", Bitmap::new(0, 0));
        scene.insert_layer(root, 0, empty).unwrap();
        let mut surface = Recorder::default();
        let mut renderer = LayerRenderer::new(&mut surface, VisibilityMode::Preview);
        renderer.render_canvas(&mut scene, canvas).unwrap();
        assert_eq!(renderer.stats().skipped, 1);
        assert_eq!(renderer.stats().drawn, 0);
    }

    #[test]
    fn test_unshaped_text_prepares_inside_isolated_group() {
        let (mut scene, canvas, root) = setup();
        let group = scene.create_composition_layer("g");
        scene.insert_layer(root, 0, group).unwrap();
        let text = scene.create_text_layer("t", "Hello", TextStyle::default());
        scene.insert_layer(group, 0, text).unwrap();
        scene.set_opacity(group, 0.5).unwrap();
        scene.set_scale_origin(text, Point::ZERO).unwrap();

        // Glyph caches are not saved; a plain deserialize leaves them unshaped.
        let mut scene: Scene = serde_json::from_str(&scene.to_json().unwrap()).unwrap();
        let strata_core::LayerKind::Text(loaded) = scene.layer(text).unwrap().kind() else {
            panic!("expected a text layer");
        };
        assert!(loaded.glyph_cache().is_none());
        scene.absolute_transformation_matrix(text).unwrap();

        assert_eq!(
            record(&mut scene, canvas, VisibilityMode::Preview),
            vec![
                Op::Plain,
                Op::Isolate(0.5, BlendMode::Normal),
                Op::Text(1.0),
                Op::Pop,
                Op::Pop
            ]
        );
        let layer = scene.layer(text).unwrap();
        let strata_core::LayerKind::Text(shaped) = layer.kind() else {
            panic!("expected a text layer");
        };
        assert!(shaped.glyph_cache().is_some());
        let center = scene.natural_rect(text).unwrap().center();
        assert_eq!(layer.visual().scale_origin(), center);
        assert_ne!(center, Point::ZERO);
        assert!(!scene.layer(group).unwrap().visual().is_rendering());
    }

    #[test]
    fn test_deep_nesting_renders_balanced() {
        let (mut scene, canvas, root) = setup();
        let depth = 3000;
        let mut parent = root;
        for _ in 0..depth {
            let group = scene.create_composition_layer("g");
            scene.insert_layer(parent, 0, group).unwrap();
            scene.drain_events();
            parent = group;
        }
        let leaf = raster(&mut scene, parent, 0);

        let ops = record(&mut scene, canvas, VisibilityMode::Preview);
        assert_eq!(ops.len(), 2 * (depth + 1) + 1);
        assert_eq!(ops[depth + 1], Op::Raster(leaf, 1.0));
        assert!(ops[..=depth].iter().all(|op| *op == Op::Plain));
        assert!(ops[depth + 2..].iter().all(|op| *op == Op::Pop));
        assert!(!scene.layer(parent).unwrap().visual().is_rendering());
    }

    #[test]
    fn test_rendering_flag_cleared_after_pass() {
        let (mut scene, canvas, root) = setup();
        let leaf = raster(&mut scene, root, 0);
        record(&mut scene, canvas, VisibilityMode::Preview);
        assert!(!scene.layer(leaf).unwrap().visual().is_rendering());
        scene.set_position(leaf, Point::new(1.0, 1.0)).unwrap();
    }

    #[test]
    #[should_panic(expected = "drawn as a leaf")]
    fn test_composition_as_leaf_panics() {
        let mut surface = Recorder::default();
        let kind = LayerKind::Composition(CompositionLayer::new());
        let (_scene, _canvas, root) = setup();
        draw_leaf(&mut surface, root, &kind, Affine::IDENTITY, 1.0);
    }
}
