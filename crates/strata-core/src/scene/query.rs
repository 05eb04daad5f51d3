//! Read-only tree queries and hit testing.

use super::Scene;
use crate::error::LayerResult;
use crate::id::{CanvasId, LayerId};
use kurbo::{Point, Rect};

impl Scene {
    /// Children of `id`, index 0 on top; empty for leaves.
    pub fn children(&self, id: LayerId) -> LayerResult<&[LayerId]> {
        Ok(self.layer(id)?.children())
    }

    /// Every layer below `id`, preorder, excluding `id` itself.
    pub fn descendants(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        let mut stack: Vec<LayerId> = match self.layer(id) {
            Ok(layer) => layer.children().iter().rev().copied().collect(),
            Err(_) => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Ok(layer) = self.layer(next) {
                stack.extend(layer.children().iter().rev().copied());
            }
        }
        out
    }

    /// Whether `ancestor` is a strict ancestor of `layer`.
    pub fn is_ancestor(&self, ancestor: LayerId, layer: LayerId) -> bool {
        let mut current = self.layer(layer).ok().and_then(|l| l.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.layer(id).ok().and_then(|l| l.parent);
        }
        false
    }

    pub fn index_of(&self, parent: LayerId, child: LayerId) -> Option<usize> {
        let layer = self.layer(child).ok()?;
        (layer.parent == Some(parent)).then_some(layer.index_in_parent)
    }

    /// Whether `child` is a direct child of `parent`.
    pub fn contains(&self, parent: LayerId, child: LayerId) -> bool {
        self.index_of(parent, child).is_some()
    }

    /// Bounding box of the layer in canvas space.
    pub fn layer_bounds(&self, id: LayerId) -> LayerResult<Rect> {
        let rect = self.natural_rect(id)?;
        let absolute = self.absolute_transformation_matrix(id)?;
        Ok(absolute.transform_rect_bbox(rect))
    }

    /// Visible leaves under `point` (canvas space), frontmost first.
    pub fn layers_at_point(&self, canvas: CanvasId, point: Point) -> LayerResult<Vec<LayerId>> {
        let root = self.canvas(canvas)?.root;
        let mut hits = Vec::new();
        // Index 0 paints on top; pushing in reverse pops it first.
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let layer = self.layer(id)?;
            if !layer.visual.visible {
                continue;
            }
            if layer.kind.is_composition() {
                stack.extend(layer.children().iter().rev().copied());
                continue;
            }
            let placement_ok = !layer.visual.placement.is_degenerate();
            if placement_ok {
                let local = self.absolute_inverse_transformation_matrix(id)? * point;
                if layer.kind.hit_test(local) {
                    hits.push(id);
                }
            }
        }
        Ok(hits)
    }
}
