//! Canvas lifecycle, active and solo layers, and selection.

use super::Scene;
use crate::canvas::{Canvas, CanvasConfig, PixelSize};
use crate::error::{LayerError, LayerResult};
use crate::event::SceneEvent;
use crate::id::{CanvasId, LayerId};
use crate::selection::SelectionChange;

impl Scene {
    /// Creates a canvas with an empty root composition.
    pub fn create_canvas(&mut self, config: CanvasConfig) -> CanvasId {
        let root = self.create_composition_layer("Root");
        let (idx, generation) = self.canvases.insert(Canvas::new(config, root));
        let canvas = CanvasId::new(idx, generation);
        self.add_as_top_level(root, canvas);
        log::debug!("Created canvas {canvas:?} with root {root:?}");
        canvas
    }

    /// Removes a canvas. Its root composition, with all children, is
    /// returned detached for the caller to keep or delete.
    pub fn destroy_canvas(&mut self, canvas: CanvasId) -> LayerResult<LayerId> {
        let root = self.canvas(canvas)?.root;
        self.batched(|scene| {
            if let Some(change) = scene.canvas_mut(canvas)?.selection.clear() {
                scene.emit_selection(canvas, change);
            }
            scene.remove_as_top_level(root);
            scene.canvases.remove(canvas.idx, canvas.generation);
            scene.invalidate_matrices(root);
            log::debug!("Destroyed canvas {canvas:?}");
            Ok(root)
        })
    }

    pub fn set_canvas_name(&mut self, canvas: CanvasId, name: impl Into<String>) -> LayerResult<()> {
        self.canvas_mut(canvas)?.name = name.into();
        Ok(())
    }

    /// Resizes the canvas; compositions on it re-center automatic origins.
    pub fn set_canvas_size(&mut self, canvas: CanvasId, size: PixelSize) -> LayerResult<()> {
        let target = self.canvas_mut(canvas)?;
        let old = target.size;
        if old == size {
            return Ok(());
        }
        target.size = size;
        let root = target.root;

        self.batched(|scene| {
            scene.emit(SceneEvent::CanvasSizeChanged {
                canvas,
                old,
                new: size,
            });
            let mut tree = vec![root];
            tree.extend(scene.descendants(root));
            for id in tree {
                let is_composition = scene.layer(id).is_ok_and(|l| l.kind.is_composition());
                if is_composition {
                    scene.emit(SceneEvent::NaturalSizeChanged {
                        layer: id,
                        old: old.to_rect(),
                        new: size.to_rect(),
                    });
                    scene.refresh_automatic_origins(id);
                }
            }
            scene.emit(SceneEvent::CanvasRenderInvalidated { canvas });
        });
        Ok(())
    }

    fn require_on_canvas(&self, canvas: CanvasId, id: LayerId) -> LayerResult<()> {
        self.canvas(canvas)?;
        if self.layer(id)?.canvas != Some(canvas) {
            return Err(LayerError::NotOnCanvas { layer: id, canvas });
        }
        Ok(())
    }

    /// Sets the layer user edits target. `None` clears it.
    pub fn set_active_layer(&mut self, canvas: CanvasId, layer: Option<LayerId>) -> LayerResult<()> {
        if let Some(id) = layer {
            self.require_on_canvas(canvas, id)?;
        }
        let target = self.canvas_mut(canvas)?;
        let old = target.active_layer;
        if old == layer {
            return Ok(());
        }
        target.active_layer = layer;
        self.emit(SceneEvent::ActiveLayerChanged {
            canvas,
            old,
            new: layer,
        });
        Ok(())
    }

    /// Sets or clears a layer's solo flag.
    ///
    /// On a canvas, soloing a layer un-solos the previous one. A detached
    /// layer just stores the flag and claims solo when it is attached.
    pub fn set_solo(&mut self, id: LayerId, solo: bool) -> LayerResult<()> {
        let layer = self.layer_mut(id)?;
        if layer.visual.solo == solo {
            return Ok(());
        }
        layer.visual.solo = solo;
        let Some(canvas) = layer.canvas else {
            return Ok(());
        };

        if solo {
            self.adopt_solo(canvas, id);
        } else {
            let target = self.canvas_mut(canvas)?;
            if target.solo_layer == Some(id) {
                target.solo_layer = None;
                self.emit(SceneEvent::SoloLayerChanged {
                    canvas,
                    old: Some(id),
                    new: None,
                });
            }
        }
        self.emit(SceneEvent::CanvasRenderInvalidated { canvas });
        Ok(())
    }

    /// Records `id` as the canvas solo layer, clearing the previous one's flag.
    pub(crate) fn adopt_solo(&mut self, canvas: CanvasId, id: LayerId) {
        let Ok(target) = self.canvas_mut(canvas) else {
            return;
        };
        let previous = target.solo_layer;
        if previous == Some(id) {
            return;
        }
        target.solo_layer = Some(id);
        if let Some(prev) = previous {
            if let Some(layer) = self.layers.get_mut(prev.idx, prev.generation) {
                layer.visual.solo = false;
            }
        }
        self.emit(SceneEvent::SoloLayerChanged {
            canvas,
            old: previous,
            new: Some(id),
        });
    }

    /// Whether `id` survives the solo filter of its canvas: no solo layer is
    /// set, or `id` is the solo layer, one of its ancestors or descendants.
    pub fn is_on_solo_path(&self, id: LayerId) -> bool {
        let Some(solo) = self
            .layer(id)
            .ok()
            .and_then(|l| l.canvas)
            .and_then(|c| self.canvas(c).ok())
            .and_then(|c| c.solo_layer)
        else {
            return true;
        };
        id == solo || self.is_ancestor(id, solo) || self.is_ancestor(solo, id)
    }

    // --- selection ---

    fn emit_selection(&mut self, canvas: CanvasId, change: SelectionChange) {
        self.emit(SceneEvent::SelectionChanged {
            canvas,
            added: change.added,
            removed: change.removed,
        });
    }

    fn apply_selection(
        &mut self,
        canvas: CanvasId,
        f: impl FnOnce(&mut crate::selection::SelectionManager) -> Option<SelectionChange>,
    ) -> LayerResult<bool> {
        let change = f(&mut self.canvas_mut(canvas)?.selection);
        Ok(match change {
            Some(change) => {
                self.emit_selection(canvas, change);
                true
            }
            None => false,
        })
    }

    /// Adds to the selection. Returns whether the selection changed.
    pub fn select(&mut self, canvas: CanvasId, id: LayerId) -> LayerResult<bool> {
        self.select_many(canvas, &[id])
    }

    pub fn select_many(&mut self, canvas: CanvasId, ids: &[LayerId]) -> LayerResult<bool> {
        for &id in ids {
            self.require_on_canvas(canvas, id)?;
        }
        self.apply_selection(canvas, |sel| sel.select_many(ids.iter().copied()))
    }

    pub fn unselect(&mut self, canvas: CanvasId, id: LayerId) -> LayerResult<bool> {
        self.unselect_many(canvas, &[id])
    }

    pub fn unselect_many(&mut self, canvas: CanvasId, ids: &[LayerId]) -> LayerResult<bool> {
        self.apply_selection(canvas, |sel| sel.unselect_many(ids.iter().copied()))
    }

    /// Replaces the selection with exactly `ids`.
    pub fn set_selection(&mut self, canvas: CanvasId, ids: &[LayerId]) -> LayerResult<bool> {
        for &id in ids {
            self.require_on_canvas(canvas, id)?;
        }
        self.apply_selection(canvas, |sel| sel.set(ids.iter().copied()))
    }

    pub fn clear_selection(&mut self, canvas: CanvasId) -> LayerResult<bool> {
        self.apply_selection(canvas, |sel| sel.clear())
    }

    pub fn is_selected(&self, canvas: CanvasId, id: LayerId) -> bool {
        self.canvas(canvas).is_ok_and(|c| c.selection.contains(id))
    }
}
