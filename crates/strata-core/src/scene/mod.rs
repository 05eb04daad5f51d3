//! The scene: owner of every layer and canvas.
//!
//! Layers live in a generational arena and refer to each other by
//! [`LayerId`]. All structural and property mutation goes through `Scene`
//! methods so that parent links, canvas links, matrix caches and
//! notifications stay consistent.

mod canvases;
mod props;
mod query;
mod tree;

use crate::arena::Arena;
use crate::canvas::Canvas;
use crate::error::{LayerError, LayerResult};
use crate::event::{EventQueue, LifecycleHook, SceneEvent};
use crate::id::{CanvasId, LayerId};
use crate::layer::{
    Bitmap, CompositionLayer, Layer, LayerKind, RasterLayer, ShapeGeometry, ShapeLayer,
    ShapeStyle, TextLayer, TextStyle,
};
use crate::text_engine::TextEngine;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;

/// Owner of all layers and canvases.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Scene {
    layers: Arena<Layer>,
    canvases: Arena<Canvas>,
    #[serde(skip)]
    events: EventQueue,
    #[serde(skip)]
    text: TextEngine,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // --- creation and deletion ---

    /// Allocates a detached layer.
    pub fn create_layer(&mut self, name: impl Into<String>, mut kind: LayerKind) -> LayerId {
        if let LayerKind::Text(text) = &mut kind {
            if text.cache.is_none() {
                text.cache = Some(self.text.shape(&text.text, &text.style));
            }
        }
        let mut layer = Layer::new(name, kind);
        let center = layer
            .kind
            .leaf_natural_rect()
            .map(|r| r.center())
            .unwrap_or_default();
        layer.visual.placement.scale_origin = center;
        layer.visual.placement.rotation_origin = center;
        let (idx, generation) = self.layers.insert(layer);
        let id = LayerId::new(idx, generation);
        log::debug!("Created layer {id:?}");
        id
    }

    pub fn create_raster_layer(&mut self, name: impl Into<String>, bitmap: Bitmap) -> LayerId {
        self.create_layer(name, LayerKind::Raster(RasterLayer::new(bitmap)))
    }

    pub fn create_text_layer(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
        style: TextStyle,
    ) -> LayerId {
        self.create_layer(name, LayerKind::Text(TextLayer::new(text, style)))
    }

    pub fn create_shape_layer(
        &mut self,
        name: impl Into<String>,
        geometry: ShapeGeometry,
        style: ShapeStyle,
    ) -> LayerId {
        self.create_layer(name, LayerKind::Shape(ShapeLayer::new(geometry, style)))
    }

    pub fn create_composition_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.create_layer(name, LayerKind::Composition(CompositionLayer::new()))
    }

    /// Frees a detached layer and its whole subtree.
    pub fn delete_layer(&mut self, id: LayerId) -> LayerResult<()> {
        let layer = self.layer(id)?;
        if layer.is_canvas_root() {
            return Err(LayerError::CanvasRoot(id));
        }
        if !layer.is_detached() {
            return Err(LayerError::StillAttached(id));
        }
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        for layer_id in &doomed {
            self.layers.remove(layer_id.idx, layer_id.generation);
        }
        log::debug!("Deleted {} layer(s) rooted at {id:?}", doomed.len());
        Ok(())
    }

    /// Deep-copies a subtree into fresh, detached layers.
    ///
    /// Solo flags are cleared on the copies.
    pub fn duplicate_layer(&mut self, id: LayerId) -> LayerResult<LayerId> {
        self.layer(id)?;
        let mut order = vec![id];
        order.extend(self.descendants(id));

        let mut remap: HashMap<LayerId, LayerId> = HashMap::with_capacity(order.len());
        for &old in &order {
            let mut copy = self.layer(old)?.clone();
            copy.canvas = None;
            for effect in &mut copy.effects {
                effect.canvas = None;
            }
            copy.visual.matrices = Cell::new(None);
            copy.visual.rendering = false;
            copy.visual.solo = false;
            if let LayerKind::Raster(raster) = &mut copy.kind {
                raster.touch();
            }
            let (idx, generation) = self.layers.insert(copy);
            remap.insert(old, LayerId::new(idx, generation));
        }

        for (&old, &new) in &remap {
            let Some(layer) = self.layers.get_mut(new.idx, new.generation) else {
                continue;
            };
            if old == id {
                layer.parent = None;
                layer.index_in_parent = 0;
            } else {
                layer.parent = layer.parent.and_then(|p| remap.get(&p).copied());
            }
            if let Some(composition) = layer.kind.as_composition_mut() {
                for child in &mut composition.children {
                    if let Some(mapped) = remap.get(child) {
                        *child = *mapped;
                    }
                }
            }
        }

        let copy = remap.get(&id).copied().ok_or(LayerError::StaleLayer(id))?;
        log::debug!("Duplicated {id:?} as {copy:?}");
        Ok(copy)
    }

    // --- access ---

    pub fn layer(&self, id: LayerId) -> LayerResult<&Layer> {
        self.layers
            .get(id.idx, id.generation)
            .ok_or(LayerError::StaleLayer(id))
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> LayerResult<&mut Layer> {
        self.layers
            .get_mut(id.idx, id.generation)
            .ok_or(LayerError::StaleLayer(id))
    }

    pub fn contains_layer(&self, id: LayerId) -> bool {
        self.layers.get(id.idx, id.generation).is_some()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers
            .iter()
            .map(|(idx, generation, _)| LayerId::new(idx, generation))
    }

    pub fn canvas(&self, id: CanvasId) -> LayerResult<&Canvas> {
        self.canvases
            .get(id.idx, id.generation)
            .ok_or(LayerError::StaleCanvas(id))
    }

    pub(crate) fn canvas_mut(&mut self, id: CanvasId) -> LayerResult<&mut Canvas> {
        self.canvases
            .get_mut(id.idx, id.generation)
            .ok_or(LayerError::StaleCanvas(id))
    }

    pub fn canvas_ids(&self) -> impl Iterator<Item = CanvasId> + '_ {
        self.canvases
            .iter()
            .map(|(idx, generation, _)| CanvasId::new(idx, generation))
    }

    pub fn text_engine_mut(&mut self) -> &mut TextEngine {
        &mut self.text
    }

    // --- events ---

    /// Takes every event emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain()
    }

    /// Installs a listener called synchronously for each event.
    pub fn set_event_listener(&mut self, listener: impl FnMut(&SceneEvent) + 'static) {
        self.events.set_listener(Some(Box::new(listener)));
    }

    pub fn clear_event_listener(&mut self) {
        self.events.set_listener(None);
    }

    pub(crate) fn emit(&mut self, event: SceneEvent) {
        self.events.emit(event);
    }

    fn hook(&mut self, layer: LayerId, hook: LifecycleHook, origin: LayerId) {
        self.events.emit(SceneEvent::Lifecycle {
            layer,
            hook,
            origin,
        });
    }

    /// Runs `f` with listener delivery deferred until it returns.
    pub(crate) fn batched<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.events.begin_batch();
        let out = f(self);
        self.events.end_batch();
        out
    }

    // --- persistence ---

    /// Serialize the scene to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a scene from JSON, reshaping all text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut scene: Scene = serde_json::from_str(json)?;
        let text = &mut scene.text;
        for (_, _, layer) in scene.layers.iter_mut() {
            if let LayerKind::Text(t) = &mut layer.kind {
                t.cache = Some(text.shape(&t.text, &t.style));
            }
        }
        Ok(scene)
    }
}
