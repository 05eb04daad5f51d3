//! Visual properties, matrix caching, content edits and invalidation.

use super::Scene;
use crate::error::{LayerError, LayerResult};
use crate::event::{LifecycleHook, SceneEvent};
use crate::id::LayerId;
use crate::layer::{
    BlendMode, Bitmap, ChannelMultipliers, LayerEffect, LayerKind, RasterLayer, ShapeGeometry,
    ShapeLayer, ShapeStyle, TextLayer, TextStyle, VisualProps,
};
use crate::transform::{LayerMatrices, Placement};
use kurbo::{Affine, Point, Rect, Vec2};

impl Scene {
    // --- invalidation ---

    /// Announces that `id` changed appearance, walking up to the canvas.
    pub(crate) fn invalidate_visual(&mut self, id: LayerId) {
        let mut current = Some(id);
        let mut canvas = None;
        while let Some(layer_id) = current {
            let Some(layer) = self.layers.get(layer_id.idx, layer_id.generation) else {
                break;
            };
            canvas = layer.canvas;
            current = layer.parent;
            self.emit(SceneEvent::RenderInvalidated { layer: layer_id });
        }
        if let Some(canvas) = canvas {
            self.emit(SceneEvent::CanvasRenderInvalidated { canvas });
        }
    }

    /// Marks the matrix caches of `id` and its subtree dirty.
    ///
    /// # Panics
    ///
    /// If `id` is inside an active render pass.
    pub(crate) fn invalidate_matrices(&self, id: LayerId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(layer) = self.layers.get(next.idx, next.generation) else {
                continue;
            };
            assert!(
                !layer.visual.rendering,
                "transformation matrix of {next:?} invalidated while it is rendering"
            );
            // A dirty layer's subtree is already dirty.
            if layer.visual.matrices_dirty() && next != id {
                continue;
            }
            layer.visual.mark_matrices_dirty();
            stack.extend_from_slice(layer.children());
        }
    }

    // --- matrices ---

    /// All four matrices of `id`, recomputing any dirty ancestors first.
    pub fn matrices(&self, id: LayerId) -> LayerResult<LayerMatrices> {
        let layer = self.layer(id)?;
        if let Some(cached) = layer.visual.matrices.get() {
            return Ok(cached);
        }
        let mut chain = vec![id];
        let mut parent_matrices = None;
        let mut current = layer.parent;
        while let Some(parent_id) = current {
            let parent = self.layer(parent_id)?;
            if let Some(cached) = parent.visual.matrices.get() {
                parent_matrices = Some(cached);
                break;
            }
            chain.push(parent_id);
            current = parent.parent;
        }
        let mut computed = parent_matrices;
        for layer_id in chain.into_iter().rev() {
            let layer = self.layer(layer_id)?;
            let matrices = LayerMatrices::compute(&layer.visual.placement, computed.as_ref());
            layer.visual.matrices.set(Some(matrices));
            computed = Some(matrices);
        }
        computed.ok_or(LayerError::StaleLayer(id))
    }

    pub fn transformation_matrix(&self, id: LayerId) -> LayerResult<Affine> {
        Ok(self.matrices(id)?.local)
    }

    pub fn inverse_transformation_matrix(&self, id: LayerId) -> LayerResult<Affine> {
        Ok(self.matrices(id)?.local_inverse)
    }

    pub fn absolute_transformation_matrix(&self, id: LayerId) -> LayerResult<Affine> {
        Ok(self.matrices(id)?.absolute)
    }

    pub fn absolute_inverse_transformation_matrix(&self, id: LayerId) -> LayerResult<Affine> {
        Ok(self.matrices(id)?.absolute_inverse)
    }

    // --- natural size and automatic origins ---

    /// Local-space extent: content bounds for leaves, the canvas rectangle
    /// for compositions (empty when detached).
    pub fn natural_rect(&self, id: LayerId) -> LayerResult<Rect> {
        let layer = self.layer(id)?;
        if let Some(rect) = layer.kind.leaf_natural_rect() {
            return Ok(rect);
        }
        Ok(layer
            .canvas
            .and_then(|c| self.canvas(c).ok())
            .map(|c| c.size.to_rect())
            .unwrap_or(Rect::ZERO))
    }

    /// Moves automatic origins to the center of the natural rectangle.
    /// Returns whether anything moved; only the matrices are invalidated.
    pub(crate) fn refresh_automatic_origins(&mut self, id: LayerId) -> bool {
        let Ok(center) = self.natural_rect(id).map(|r| r.center()) else {
            return false;
        };
        let Some(layer) = self.layers.get_mut(id.idx, id.generation) else {
            return false;
        };
        let visual = &mut layer.visual;
        let mut changed = false;
        if visual.scale_origin_automatic && visual.placement.scale_origin != center {
            visual.placement.scale_origin = center;
            changed = true;
        }
        if visual.rotation_origin_automatic && visual.placement.rotation_origin != center {
            visual.placement.rotation_origin = center;
            changed = true;
        }
        if changed {
            self.invalidate_matrices(id);
        }
        changed
    }

    /// Emits the size change and re-centers automatic origins.
    pub(crate) fn natural_size_changed(&mut self, id: LayerId, old: Rect) -> LayerResult<()> {
        let new = self.natural_rect(id)?;
        if new != old {
            self.emit(SceneEvent::NaturalSizeChanged { layer: id, old, new });
            self.refresh_automatic_origins(id);
        }
        Ok(())
    }

    // --- visual properties ---

    fn update_visual(
        &mut self,
        id: LayerId,
        affects_matrix: bool,
        f: impl FnOnce(&mut VisualProps) -> bool,
    ) -> LayerResult<()> {
        let changed = f(&mut self.layer_mut(id)?.visual);
        if !changed {
            return Ok(());
        }
        if affects_matrix {
            self.invalidate_matrices(id);
        }
        self.invalidate_visual(id);
        Ok(())
    }

    /// Sets opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> LayerResult<()> {
        let opacity = if opacity.is_nan() {
            log::warn!("NaN opacity for {id:?}, using 0");
            0.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        self.update_visual(id, false, |v| {
            let changed = v.opacity != opacity;
            v.opacity = opacity;
            changed
        })
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> LayerResult<()> {
        self.update_visual(id, false, |v| {
            let changed = v.visible != visible;
            v.visible = visible;
            changed
        })
    }

    pub fn set_export_visible(&mut self, id: LayerId, visible: bool) -> LayerResult<()> {
        self.update_visual(id, false, |v| {
            let changed = v.export_visible != visible;
            v.export_visible = visible;
            changed
        })
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> LayerResult<()> {
        self.update_visual(id, false, |v| {
            let changed = v.blend_mode != mode;
            v.blend_mode = mode;
            changed
        })
    }

    pub fn set_placement(&mut self, id: LayerId, placement: Placement) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement != placement;
            v.placement = placement;
            changed
        })
    }

    pub fn set_position(&mut self, id: LayerId, position: Point) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement.position != position;
            v.placement.position = position;
            changed
        })
    }

    pub fn set_scale(&mut self, id: LayerId, scale: Vec2) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement.scale != scale;
            v.placement.scale = scale;
            changed
        })
    }

    /// Sets rotation in degrees.
    pub fn set_rotation(&mut self, id: LayerId, degrees: f64) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement.rotation != degrees;
            v.placement.rotation = degrees;
            changed
        })
    }

    /// Sets the scale origin. An automatic origin is overwritten again on
    /// the next natural-size change.
    pub fn set_scale_origin(&mut self, id: LayerId, origin: Point) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement.scale_origin != origin;
            v.placement.scale_origin = origin;
            changed
        })
    }

    pub fn set_rotation_origin(&mut self, id: LayerId, origin: Point) -> LayerResult<()> {
        self.update_visual(id, true, |v| {
            let changed = v.placement.rotation_origin != origin;
            v.placement.rotation_origin = origin;
            changed
        })
    }

    /// Turning this on snaps the origin to the natural center; turning it
    /// off keeps the last value.
    pub fn set_scale_origin_automatic(&mut self, id: LayerId, automatic: bool) -> LayerResult<()> {
        self.layer_mut(id)?.visual.scale_origin_automatic = automatic;
        if automatic && self.refresh_automatic_origins(id) {
            self.invalidate_visual(id);
        }
        Ok(())
    }

    pub fn set_rotation_origin_automatic(
        &mut self,
        id: LayerId,
        automatic: bool,
    ) -> LayerResult<()> {
        self.layer_mut(id)?.visual.rotation_origin_automatic = automatic;
        if automatic && self.refresh_automatic_origins(id) {
            self.invalidate_visual(id);
        }
        Ok(())
    }

    pub fn set_layer_name(&mut self, id: LayerId, name: impl Into<String>) -> LayerResult<()> {
        self.layer_mut(id)?.name = name.into();
        Ok(())
    }

    // --- content ---

    fn raster_mut(&mut self, id: LayerId) -> LayerResult<&mut RasterLayer> {
        match &mut self.layer_mut(id)?.kind {
            LayerKind::Raster(raster) => Ok(raster),
            _ => Err(LayerError::WrongKind(id)),
        }
    }

    fn text_mut(&mut self, id: LayerId) -> LayerResult<&mut TextLayer> {
        match &mut self.layer_mut(id)?.kind {
            LayerKind::Text(text) => Ok(text),
            _ => Err(LayerError::WrongKind(id)),
        }
    }

    fn shape_mut(&mut self, id: LayerId) -> LayerResult<&mut ShapeLayer> {
        match &mut self.layer_mut(id)?.kind {
            LayerKind::Shape(shape) => Ok(shape),
            _ => Err(LayerError::WrongKind(id)),
        }
    }

    fn content_changed(&mut self, id: LayerId, old: Rect) -> LayerResult<()> {
        self.natural_size_changed(id, old)?;
        self.invalidate_visual(id);
        Ok(())
    }

    pub fn set_bitmap(&mut self, id: LayerId, bitmap: Bitmap) -> LayerResult<()> {
        let old = self.natural_rect(id)?;
        let raster = self.raster_mut(id)?;
        raster.bitmap = bitmap;
        raster.touch();
        self.content_changed(id, old)
    }

    /// Edits pixels in place.
    pub fn edit_bitmap<R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut Bitmap) -> R,
    ) -> LayerResult<R> {
        let old = self.natural_rect(id)?;
        let raster = self.raster_mut(id)?;
        let out = f(&mut raster.bitmap);
        raster.touch();
        self.content_changed(id, old)?;
        Ok(out)
    }

    pub fn set_channel_multipliers(
        &mut self,
        id: LayerId,
        multipliers: ChannelMultipliers,
    ) -> LayerResult<()> {
        let raster = self.raster_mut(id)?;
        if raster.channel_multipliers == multipliers {
            return Ok(());
        }
        raster.channel_multipliers = multipliers;
        raster.touch();
        self.invalidate_visual(id);
        Ok(())
    }

    pub fn set_text(&mut self, id: LayerId, text: impl Into<String>) -> LayerResult<()> {
        let old = self.natural_rect(id)?;
        let layer = self.text_mut(id)?;
        layer.text = text.into();
        self.reshape_text(id)?;
        self.content_changed(id, old)
    }

    pub fn set_text_style(&mut self, id: LayerId, style: TextStyle) -> LayerResult<()> {
        let old = self.natural_rect(id)?;
        self.text_mut(id)?.style = style;
        self.reshape_text(id)?;
        self.content_changed(id, old)
    }

    fn reshape_text(&mut self, id: LayerId) -> LayerResult<()> {
        let Some(layer) = self.layers.get_mut(id.idx, id.generation) else {
            return Err(LayerError::StaleLayer(id));
        };
        let LayerKind::Text(text) = &mut layer.kind else {
            return Err(LayerError::WrongKind(id));
        };
        text.cache = Some(self.text.shape(&text.text, &text.style));
        Ok(())
    }

    pub fn set_shape_geometry(&mut self, id: LayerId, geometry: ShapeGeometry) -> LayerResult<()> {
        let old = self.natural_rect(id)?;
        self.shape_mut(id)?.geometry = geometry;
        self.content_changed(id, old)
    }

    pub fn set_shape_style(&mut self, id: LayerId, style: ShapeStyle) -> LayerResult<()> {
        self.shape_mut(id)?.style = style;
        self.invalidate_visual(id);
        Ok(())
    }

    // --- effects ---

    /// Appends an effect; it picks up the layer's canvas immediately.
    pub fn add_effect(&mut self, id: LayerId, mut effect: LayerEffect) -> LayerResult<usize> {
        let layer = self.layer_mut(id)?;
        let canvas = layer.canvas;
        effect.canvas = canvas;
        layer.effects.push(effect);
        let index = layer.effects.len() - 1;
        if canvas.is_some() {
            self.hook(id, LifecycleHook::EffectAttached { effect: index }, id);
        }
        self.invalidate_visual(id);
        Ok(index)
    }

    pub fn remove_effect(&mut self, id: LayerId, index: usize) -> LayerResult<LayerEffect> {
        let layer = self.layer_mut(id)?;
        let len = layer.effects.len();
        if index >= len {
            return Err(LayerError::EffectOutOfRange { index, len });
        }
        let mut effect = layer.effects.remove(index);
        if effect.canvas.take().is_some() {
            self.hook(id, LifecycleHook::EffectDetached { effect: index }, id);
        }
        self.invalidate_visual(id);
        Ok(effect)
    }

    // --- render pass support ---

    /// Makes sure `id` has what it needs to draw. Regenerates a missing
    /// glyph cache. Returns `false` if there is nothing to draw.
    ///
    /// Call before [`begin_layer_render`](Self::begin_layer_render): a cache
    /// rebuild may move automatic origins.
    pub fn prepare_render(&mut self, id: LayerId) -> LayerResult<bool> {
        let needs_shaping = matches!(
            &self.layer(id)?.kind,
            LayerKind::Text(text) if text.cache.is_none()
        );
        if needs_shaping {
            log::debug!("Regenerating glyph cache for {id:?}");
            let old = self.natural_rect(id)?;
            self.reshape_text(id)?;
            self.natural_size_changed(id, old)?;
        }
        Ok(match &self.layer(id)?.kind {
            LayerKind::Raster(raster) => !raster.bitmap.is_empty(),
            LayerKind::Text(text) => text.cache.as_ref().is_some_and(|c| !c.is_empty()),
            LayerKind::Shape(shape) => shape.is_drawable(),
            LayerKind::Composition(_) => true,
        })
    }

    /// Flags `id` as rendering; matrix invalidation panics until
    /// [`end_layer_render`](Self::end_layer_render).
    pub fn begin_layer_render(&mut self, id: LayerId) -> LayerResult<()> {
        self.layer_mut(id)?.visual.rendering = true;
        Ok(())
    }

    pub fn end_layer_render(&mut self, id: LayerId) -> LayerResult<()> {
        self.layer_mut(id)?.visual.rendering = false;
        Ok(())
    }
}
