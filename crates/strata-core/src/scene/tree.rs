//! Tree structure: the attach/detach protocol and composition child lists.

use super::Scene;
use crate::error::{LayerError, LayerResult};
use crate::event::{ChildrenChange, LifecycleHook, SceneEvent};
use crate::id::{CanvasId, LayerId};
use crate::layer::CompositionLayer;
use std::collections::HashSet;

impl Scene {
    pub(crate) fn composition(&self, id: LayerId) -> LayerResult<&CompositionLayer> {
        self.layer(id)?
            .kind
            .as_composition()
            .ok_or(LayerError::NotAComposition(id))
    }

    fn composition_mut(&mut self, id: LayerId) -> LayerResult<&mut CompositionLayer> {
        self.layer_mut(id)?
            .kind
            .as_composition_mut()
            .ok_or(LayerError::NotAComposition(id))
    }

    // --- protocol ---

    fn attach_node_to_canvas(&mut self, id: LayerId, canvas: CanvasId, origin: LayerId) {
        let Some(layer) = self.layers.get_mut(id.idx, id.generation) else {
            return;
        };
        let old = layer.canvas.replace(canvas);
        for effect in &mut layer.effects {
            effect.canvas = Some(canvas);
        }
        let effect_count = layer.effects.len();
        let solo = layer.visual.solo;

        self.hook(id, LifecycleHook::AttachedToCanvas, origin);
        self.emit(SceneEvent::CanvasChanged {
            layer: id,
            old,
            new: Some(canvas),
        });
        for effect in 0..effect_count {
            self.hook(id, LifecycleHook::EffectAttached { effect }, origin);
        }

        self.refresh_automatic_origins(id);
        if solo {
            self.adopt_solo(canvas, id);
        }
    }

    fn detach_node_from_canvas(&mut self, id: LayerId, origin: LayerId) {
        let Some(layer) = self.layers.get_mut(id.idx, id.generation) else {
            return;
        };
        let Some(old) = layer.canvas.take() else {
            return;
        };
        for effect in &mut layer.effects {
            effect.canvas = None;
        }
        let effect_count = layer.effects.len();

        for effect in 0..effect_count {
            self.hook(id, LifecycleHook::EffectDetached { effect }, origin);
        }
        self.hook(id, LifecycleHook::DetachedFromCanvas, origin);
        self.emit(SceneEvent::CanvasChanged {
            layer: id,
            old: Some(old),
            new: None,
        });

        if let Ok(canvas) = self.canvas_mut(old) {
            if canvas.solo_layer == Some(id) {
                canvas.solo_layer = None;
                self.emit(SceneEvent::SoloLayerChanged {
                    canvas: old,
                    old: Some(id),
                    new: None,
                });
            }
        }
    }

    /// Makes `node` a child of `parent` and cascades canvas attachment.
    ///
    /// The caller has already placed `node` in the parent's child list.
    fn add_to_parent(&mut self, node: LayerId, parent: LayerId) {
        let canvas = self.layers.get(parent.idx, parent.generation).and_then(|p| p.canvas);
        if let Some(layer) = self.layers.get_mut(node.idx, node.generation) {
            layer.parent = Some(parent);
        }
        self.hook(node, LifecycleHook::AddedToLayer, node);
        self.emit(SceneEvent::ParentChanged {
            layer: node,
            old: None,
            new: Some(parent),
        });
        if let Some(canvas) = canvas {
            self.attach_node_to_canvas(node, canvas, node);
        }
        for descendant in self.descendants(node) {
            self.hook(descendant, LifecycleHook::HierarchicalParentAdded, node);
            if let Some(canvas) = canvas {
                self.attach_node_to_canvas(descendant, canvas, node);
            }
        }
    }

    /// Reverse of [`add_to_parent`](Self::add_to_parent): canvas detachment
    /// first, then the parent link.
    fn remove_from_parent_link(&mut self, node: LayerId) {
        let on_canvas = self
            .layers
            .get(node.idx, node.generation)
            .is_some_and(|l| l.canvas.is_some());
        if on_canvas {
            self.detach_node_from_canvas(node, node);
        }
        let old = self
            .layers
            .get_mut(node.idx, node.generation)
            .and_then(|l| l.parent.take());
        self.hook(node, LifecycleHook::RemovedFromLayer, node);
        self.emit(SceneEvent::ParentChanged {
            layer: node,
            old,
            new: None,
        });
        for descendant in self.descendants(node) {
            if on_canvas {
                self.detach_node_from_canvas(descendant, node);
            }
            self.hook(descendant, LifecycleHook::HierarchicalParentRemoved, node);
        }
    }

    /// Attaches a parentless tree to a canvas (used for canvas roots).
    pub(crate) fn add_as_top_level(&mut self, node: LayerId, canvas: CanvasId) {
        self.attach_node_to_canvas(node, canvas, node);
        for descendant in self.descendants(node) {
            self.attach_node_to_canvas(descendant, canvas, node);
        }
    }

    pub(crate) fn remove_as_top_level(&mut self, node: LayerId) {
        self.detach_node_from_canvas(node, node);
        for descendant in self.descendants(node) {
            self.detach_node_from_canvas(descendant, node);
        }
    }

    /// Drops selection, active and solo references into the subtree rooted
    /// at `node` before it leaves its canvas.
    fn release_canvas_references(&mut self, node: LayerId) {
        let Some(canvas_id) = self.layers.get(node.idx, node.generation).and_then(|l| l.canvas)
        else {
            return;
        };
        let mut subtree: HashSet<LayerId> = self.descendants(node).into_iter().collect();
        subtree.insert(node);

        let Ok(canvas) = self.canvas_mut(canvas_id) else {
            return;
        };
        let selection = canvas.selection.unselect_many(subtree.iter().copied());
        let active = canvas.active_layer.filter(|a| subtree.contains(a));
        if active.is_some() {
            canvas.active_layer = None;
        }
        let solo = canvas.solo_layer.filter(|s| subtree.contains(s));
        if solo.is_some() {
            canvas.solo_layer = None;
        }

        if let Some(change) = selection {
            self.emit(SceneEvent::SelectionChanged {
                canvas: canvas_id,
                added: change.added,
                removed: change.removed,
            });
        }
        if active.is_some() {
            self.emit(SceneEvent::ActiveLayerChanged {
                canvas: canvas_id,
                old: active,
                new: None,
            });
        }
        if solo.is_some() {
            self.emit(SceneEvent::SoloLayerChanged {
                canvas: canvas_id,
                old: solo,
                new: None,
            });
        }
    }

    // --- child list operations ---

    /// Inserts a detached layer into a composition at `index`.
    pub fn insert_layer(&mut self, parent: LayerId, index: usize, child: LayerId) -> LayerResult<()> {
        self.insert_layers(parent, index, &[child])
    }

    /// Inserts detached layers at consecutive positions starting at `index`.
    ///
    /// Equivalent to inserting them one by one at increasing indices, but
    /// sends one children-changed notification and one invalidation.
    pub fn insert_layers(
        &mut self,
        parent: LayerId,
        index: usize,
        children: &[LayerId],
    ) -> LayerResult<()> {
        let len = self.composition(parent)?.len();
        if index > len {
            return Err(LayerError::IndexOutOfRange { index, len });
        }
        let mut seen = HashSet::with_capacity(children.len());
        for &child in children {
            if !seen.insert(child) {
                return Err(LayerError::Duplicate(child));
            }
            let layer = self.layer(child)?;
            if layer.is_canvas_root() {
                return Err(LayerError::CanvasRoot(child));
            }
            if layer.parent.is_some() {
                return Err(LayerError::AlreadyParented(child));
            }
            if child == parent || self.is_ancestor(child, parent) {
                return Err(LayerError::Cycle { parent, child });
            }
        }
        if children.is_empty() {
            return Ok(());
        }

        let count = children.len();
        self.batched(|scene| {
            let shifted = scene.composition(parent)?.children[index..].to_vec();
            for sibling in shifted.iter().rev() {
                scene.layer_mut(*sibling)?.index_in_parent += count;
            }
            scene
                .composition_mut(parent)?
                .children
                .splice(index..index, children.iter().copied());
            for (offset, &child) in children.iter().enumerate() {
                scene.layer_mut(child)?.index_in_parent = index + offset;
                scene.invalidate_matrices(child);
                scene.add_to_parent(child, parent);
            }
            scene.emit(SceneEvent::ChildrenChanged {
                parent,
                change: ChildrenChange::Inserted { index, count },
            });
            scene.invalidate_visual(parent);
            log::debug!("Inserted {count} layer(s) into {parent:?} at {index}");
            Ok(())
        })
    }

    /// Removes the child at `index` and returns it, now detached.
    pub fn remove_layer_at(&mut self, parent: LayerId, index: usize) -> LayerResult<LayerId> {
        let composition = self.composition(parent)?;
        let len = composition.len();
        let Some(&child) = composition.children.get(index) else {
            return Err(LayerError::IndexOutOfRange { index, len });
        };

        self.batched(|scene| {
            scene.release_canvas_references(child);
            let shifted = scene.composition(parent)?.children[index + 1..].to_vec();
            for sibling in &shifted {
                scene.layer_mut(*sibling)?.index_in_parent -= 1;
            }
            scene.composition_mut(parent)?.children.remove(index);
            scene.remove_from_parent_link(child);
            scene.layer_mut(child)?.index_in_parent = 0;
            scene.invalidate_matrices(child);
            scene.emit(SceneEvent::ChildrenChanged {
                parent,
                change: ChildrenChange::Removed {
                    index,
                    layer: child,
                },
            });
            scene.invalidate_visual(parent);
            log::debug!("Removed {child:?} from {parent:?} at {index}");
            Ok(child)
        })
    }

    pub fn remove_layer(&mut self, parent: LayerId, child: LayerId) -> LayerResult<()> {
        self.composition(parent)?;
        let index = self
            .index_of(parent, child)
            .ok_or(LayerError::NotAChild { parent, child })?;
        self.remove_layer_at(parent, index).map(|_| ())
    }

    /// Detaches `child` from whatever composition holds it and returns the
    /// former parent.
    pub fn remove_from_parent(&mut self, child: LayerId) -> LayerResult<LayerId> {
        let layer = self.layer(child)?;
        if layer.is_canvas_root() {
            return Err(LayerError::CanvasRoot(child));
        }
        let parent = layer.parent.ok_or(LayerError::NoParent(child))?;
        let index = layer.index_in_parent;
        self.remove_layer_at(parent, index)?;
        Ok(parent)
    }

    /// Reorders `child` within its parent without a detach/attach cascade.
    pub fn move_layer(&mut self, child: LayerId, new_index: usize) -> LayerResult<()> {
        let layer = self.layer(child)?;
        let parent = layer.parent.ok_or(LayerError::NoParent(child))?;
        let from = layer.index_in_parent;
        let len = self.composition(parent)?.len();
        if new_index >= len {
            return Err(LayerError::IndexOutOfRange {
                index: new_index,
                len,
            });
        }
        if from == new_index {
            return Ok(());
        }

        self.batched(|scene| {
            let composition = scene.composition_mut(parent)?;
            composition.children.remove(from);
            composition.children.insert(new_index, child);
            let (lo, hi) = (from.min(new_index), from.max(new_index));
            let moved = composition.children[lo..=hi].to_vec();
            for (offset, id) in moved.iter().enumerate() {
                scene.layer_mut(*id)?.index_in_parent = lo + offset;
            }
            scene.emit(SceneEvent::ChildrenChanged {
                parent,
                change: ChildrenChange::Moved { from, to: new_index },
            });
            scene.invalidate_visual(parent);
            Ok(())
        })
    }

    /// Moves `child` under `new_parent` at `index`.
    ///
    /// Validated up front so a failure leaves the tree untouched.
    pub fn reparent_layer(
        &mut self,
        child: LayerId,
        new_parent: LayerId,
        index: usize,
    ) -> LayerResult<()> {
        let layer = self.layer(child)?;
        if layer.is_canvas_root() {
            return Err(LayerError::CanvasRoot(child));
        }
        let old_parent = layer.parent;
        let mut len = self.composition(new_parent)?.len();
        if old_parent == Some(new_parent) {
            len -= 1;
        }
        if index > len {
            return Err(LayerError::IndexOutOfRange { index, len });
        }
        if child == new_parent || self.is_ancestor(child, new_parent) {
            return Err(LayerError::Cycle {
                parent: new_parent,
                child,
            });
        }

        self.batched(|scene| {
            if old_parent.is_some() {
                scene.remove_from_parent(child)?;
            }
            scene.insert_layer(new_parent, index, child)
        })
    }

    /// Moves one step toward the top (index 0). Returns whether it moved.
    pub fn bring_forward(&mut self, id: LayerId) -> LayerResult<bool> {
        let index = self.sibling_position(id)?.0;
        if index == 0 {
            return Ok(false);
        }
        self.move_layer(id, index - 1)?;
        Ok(true)
    }

    /// Moves one step toward the bottom. Returns whether it moved.
    pub fn send_backward(&mut self, id: LayerId) -> LayerResult<bool> {
        let (index, len) = self.sibling_position(id)?;
        if index + 1 >= len {
            return Ok(false);
        }
        self.move_layer(id, index + 1)?;
        Ok(true)
    }

    pub fn bring_to_front(&mut self, id: LayerId) -> LayerResult<bool> {
        let index = self.sibling_position(id)?.0;
        if index == 0 {
            return Ok(false);
        }
        self.move_layer(id, 0)?;
        Ok(true)
    }

    pub fn send_to_back(&mut self, id: LayerId) -> LayerResult<bool> {
        let (index, len) = self.sibling_position(id)?;
        if index + 1 >= len {
            return Ok(false);
        }
        self.move_layer(id, len - 1)?;
        Ok(true)
    }

    fn sibling_position(&self, id: LayerId) -> LayerResult<(usize, usize)> {
        let layer = self.layer(id)?;
        let parent = layer.parent.ok_or(LayerError::NoParent(id))?;
        Ok((layer.index_in_parent, self.composition(parent)?.len()))
    }

    /// Wraps siblings in a new composition placed where the top-most of
    /// them was. Their relative order is kept.
    pub fn group_layers(&mut self, ids: &[LayerId]) -> LayerResult<LayerId> {
        let first = *ids.first().ok_or(LayerError::Empty)?;
        let parent = self.layer(first)?.parent.ok_or(LayerError::NoParent(first))?;
        let mut members = Vec::with_capacity(ids.len());
        let mut seen = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(LayerError::Duplicate(id));
            }
            let layer = self.layer(id)?;
            if layer.parent != Some(parent) {
                return Err(LayerError::MixedParents);
            }
            members.push((layer.index_in_parent, id));
        }
        members.sort_by_key(|(index, _)| *index);
        let top_index = members[0].0;

        self.batched(|scene| {
            let group = scene.create_composition_layer("Group");
            for (index, _) in members.iter().rev() {
                scene.remove_layer_at(parent, *index)?;
            }
            let ordered: Vec<LayerId> = members.iter().map(|(_, id)| *id).collect();
            scene.insert_layers(group, 0, &ordered)?;
            scene.insert_layer(parent, top_index, group)?;
            log::debug!("Grouped {} layer(s) into {group:?}", ordered.len());
            Ok(group)
        })
    }

    /// Splices a group's children into its parent at the group's position
    /// and deletes the group. The group's own placement is discarded.
    pub fn ungroup_layer(&mut self, group: LayerId) -> LayerResult<Vec<LayerId>> {
        let layer = self.layer(group)?;
        if layer.is_canvas_root() {
            return Err(LayerError::CanvasRoot(group));
        }
        let parent = layer.parent.ok_or(LayerError::NoParent(group))?;
        let index = layer.index_in_parent;
        let children = self.composition(group)?.children.clone();

        self.batched(|scene| {
            scene.remove_layer_at(parent, index)?;
            for i in (0..children.len()).rev() {
                scene.remove_layer_at(group, i)?;
            }
            scene.insert_layers(parent, index, &children)?;
            scene.delete_layer(group)?;
            Ok(children)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::canvas::CanvasConfig;
    use crate::error::LayerError;
    use crate::event::{ChildrenChange, LifecycleHook, SceneEvent};
    use crate::id::LayerId;
    use crate::layer::Bitmap;
    use crate::scene::Scene;

    fn raster(scene: &mut Scene, name: &str) -> LayerId {
        scene.create_raster_layer(name, Bitmap::new(4, 4))
    }

    /// Checks parent links, indices and canvas links for the whole scene.
    fn assert_tree_consistent(scene: &Scene) {
        for id in scene.layer_ids() {
            let layer = scene.layer(id).unwrap();
            for (i, child) in layer.children().iter().enumerate() {
                let c = scene.layer(*child).unwrap();
                assert_eq!(c.parent(), Some(id), "parent link of {child:?}");
                assert_eq!(c.index_in_parent(), i, "index of {child:?}");
                assert_eq!(c.canvas(), layer.canvas(), "canvas of {child:?}");
            }
            if let Some(p) = layer.parent() {
                assert!(scene.layer(p).unwrap().children().contains(&id));
            }
        }
    }

    fn lifecycle(events: &[SceneEvent]) -> Vec<(LayerId, LifecycleHook, LayerId)> {
        events
            .iter()
            .filter_map(|e| match e {
                SceneEvent::Lifecycle {
                    layer,
                    hook,
                    origin,
                } => Some((*layer, *hook, *origin)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_insert_shifts_indices() {
        let mut scene = Scene::new();
        let group = scene.create_composition_layer("g");
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        let c = raster(&mut scene, "c");
        scene.insert_layer(group, 0, a).unwrap();
        scene.insert_layer(group, 1, b).unwrap();
        scene.insert_layer(group, 0, c).unwrap();
        assert_eq!(scene.layer(group).unwrap().children(), &[c, a, b]);
        assert_eq!(scene.index_of(group, b), Some(2));
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_insert_rejects_parented_child() {
        let mut scene = Scene::new();
        let g1 = scene.create_composition_layer("g1");
        let g2 = scene.create_composition_layer("g2");
        let a = raster(&mut scene, "a");
        scene.insert_layer(g1, 0, a).unwrap();
        assert_eq!(
            scene.insert_layer(g2, 0, a),
            Err(LayerError::AlreadyParented(a))
        );
    }

    #[test]
    fn test_insert_index_out_of_range() {
        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let a = raster(&mut scene, "a");
        assert_eq!(
            scene.insert_layer(g, 1, a),
            Err(LayerError::IndexOutOfRange { index: 1, len: 0 })
        );
    }

    #[test]
    fn test_insert_into_leaf_fails() {
        let mut scene = Scene::new();
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        assert_eq!(scene.insert_layer(a, 0, b), Err(LayerError::NotAComposition(a)));
    }

    #[test]
    fn test_insert_cycle_rejected() {
        let mut scene = Scene::new();
        let outer = scene.create_composition_layer("outer");
        let inner = scene.create_composition_layer("inner");
        scene.insert_layer(outer, 0, inner).unwrap();
        assert!(matches!(
            scene.insert_layer(inner, 0, outer),
            Err(LayerError::Cycle { .. })
        ));
        assert!(matches!(
            scene.insert_layer(outer, 0, outer),
            Err(LayerError::Cycle { .. })
        ));
    }

    #[test]
    fn test_canvas_root_cannot_be_inserted() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let g = scene.create_composition_layer("g");
        assert_eq!(scene.insert_layer(g, 0, root), Err(LayerError::CanvasRoot(root)));
    }

    #[test]
    fn test_remove_shifts_indices_and_detaches() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        let c = raster(&mut scene, "c");
        scene.insert_layers(root, 0, &[a, b, c]).unwrap();
        let removed = scene.remove_layer_at(root, 0).unwrap();
        assert_eq!(removed, a);
        assert_eq!(scene.layer(root).unwrap().children(), &[b, c]);
        assert_eq!(scene.layer(b).unwrap().index_in_parent(), 0);
        assert_eq!(scene.layer(c).unwrap().index_in_parent(), 1);
        assert!(scene.layer(a).unwrap().is_detached());
        assert!(!scene.contains(root, a));
        assert_eq!(scene.index_of(root, a), None);
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_remove_non_child_fails() {
        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let a = raster(&mut scene, "a");
        assert_eq!(
            scene.remove_layer(g, a),
            Err(LayerError::NotAChild { parent: g, child: a })
        );
        assert_eq!(
            scene.remove_layer_at(g, 0),
            Err(LayerError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_attach_cascade_order() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let group = scene.create_composition_layer("g");
        let leaf = raster(&mut scene, "leaf");
        scene.insert_layer(group, 0, leaf).unwrap();
        scene.drain_events();

        scene.insert_layer(root, 0, group).unwrap();
        let hooks = lifecycle(&scene.drain_events());
        assert_eq!(
            hooks,
            vec![
                (group, LifecycleHook::AddedToLayer, group),
                (group, LifecycleHook::AttachedToCanvas, group),
                (leaf, LifecycleHook::HierarchicalParentAdded, group),
                (leaf, LifecycleHook::AttachedToCanvas, group),
            ]
        );
        assert_eq!(scene.layer(leaf).unwrap().canvas(), Some(canvas));
    }

    #[test]
    fn test_detach_cascade_order() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let group = scene.create_composition_layer("g");
        let leaf = raster(&mut scene, "leaf");
        scene.insert_layer(group, 0, leaf).unwrap();
        scene.insert_layer(root, 0, group).unwrap();
        scene.drain_events();

        scene.remove_layer(root, group).unwrap();
        let hooks = lifecycle(&scene.drain_events());
        assert_eq!(
            hooks,
            vec![
                (group, LifecycleHook::DetachedFromCanvas, group),
                (group, LifecycleHook::RemovedFromLayer, group),
                (leaf, LifecycleHook::DetachedFromCanvas, group),
                (leaf, LifecycleHook::HierarchicalParentRemoved, group),
            ]
        );
        assert_eq!(scene.layer(leaf).unwrap().canvas(), None);
        assert_eq!(scene.layer(leaf).unwrap().parent(), Some(group));
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_detached_tree_attaches_without_canvas_hooks() {
        let mut scene = Scene::new();
        let group = scene.create_composition_layer("g");
        let leaf = raster(&mut scene, "leaf");
        scene.drain_events();
        scene.insert_layer(group, 0, leaf).unwrap();
        let hooks = lifecycle(&scene.drain_events());
        assert_eq!(hooks, vec![(leaf, LifecycleHook::AddedToLayer, leaf)]);
    }

    #[test]
    fn test_batch_insert_single_notification() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let existing = raster(&mut scene, "existing");
        scene.insert_layer(root, 0, existing).unwrap();
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        let c = raster(&mut scene, "c");
        scene.drain_events();

        scene.insert_layers(root, 0, &[a, b, c]).unwrap();
        let events = scene.drain_events();
        let changes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SceneEvent::ChildrenChanged { .. }))
            .collect();
        assert_eq!(
            changes,
            vec![&SceneEvent::ChildrenChanged {
                parent: root,
                change: ChildrenChange::Inserted { index: 0, count: 3 },
            }]
        );
        let canvas_invalidations = events
            .iter()
            .filter(|e| matches!(e, SceneEvent::CanvasRenderInvalidated { .. }))
            .count();
        assert_eq!(canvas_invalidations, 1);
        assert_eq!(scene.layer(root).unwrap().children(), &[a, b, c, existing]);
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_batch_insert_matches_sequential() {
        let mut batch = Scene::new();
        let mut seq = Scene::new();
        let bg = batch.create_composition_layer("g");
        let sg = seq.create_composition_layer("g");
        let b_ids: Vec<_> = (0..3).map(|i| raster(&mut batch, &i.to_string())).collect();
        let s_ids: Vec<_> = (0..3).map(|i| raster(&mut seq, &i.to_string())).collect();
        batch.insert_layers(bg, 0, &b_ids).unwrap();
        for (i, id) in s_ids.iter().enumerate() {
            seq.insert_layer(sg, i, *id).unwrap();
        }
        let names = |scene: &Scene, g: LayerId| -> Vec<String> {
            scene
                .layer(g)
                .unwrap()
                .children()
                .iter()
                .map(|c| scene.layer(*c).unwrap().name().to_string())
                .collect()
        };
        assert_eq!(names(&batch, bg), names(&seq, sg));
    }

    #[test]
    fn test_batch_insert_rejects_duplicates_atomically() {
        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let a = raster(&mut scene, "a");
        assert_eq!(scene.insert_layers(g, 0, &[a, a]), Err(LayerError::Duplicate(a)));
        assert!(scene.layer(g).unwrap().children().is_empty());
        assert!(scene.layer(a).unwrap().is_detached());
    }

    #[test]
    fn test_listener_sees_batch_after_completion() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        scene.set_event_listener(move |e| sink.borrow_mut().push(e.clone()));
        scene.insert_layers(g, 0, &[a, b]).unwrap();
        assert_eq!(*seen.borrow(), scene.drain_events());
    }

    #[test]
    fn test_move_layer_updates_indices() {
        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let ids: Vec<_> = (0..4).map(|i| raster(&mut scene, &i.to_string())).collect();
        scene.insert_layers(g, 0, &ids).unwrap();
        scene.drain_events();
        scene.move_layer(ids[0], 3).unwrap();
        assert_eq!(
            scene.layer(g).unwrap().children(),
            &[ids[1], ids[2], ids[3], ids[0]]
        );
        assert_tree_consistent(&scene);
        let events = scene.drain_events();
        assert!(events.contains(&SceneEvent::ChildrenChanged {
            parent: g,
            change: ChildrenChange::Moved { from: 0, to: 3 },
        }));
        assert!(lifecycle(&events).is_empty());
    }

    #[test]
    fn test_z_order_helpers() {
        let mut scene = Scene::new();
        let g = scene.create_composition_layer("g");
        let ids: Vec<_> = (0..3).map(|i| raster(&mut scene, &i.to_string())).collect();
        scene.insert_layers(g, 0, &ids).unwrap();

        assert!(!scene.bring_forward(ids[0]).unwrap());
        assert!(scene.send_backward(ids[0]).unwrap());
        assert_eq!(scene.layer(g).unwrap().children(), &[ids[1], ids[0], ids[2]]);
        assert!(scene.send_to_back(ids[1]).unwrap());
        assert_eq!(scene.layer(g).unwrap().children(), &[ids[0], ids[2], ids[1]]);
        assert!(scene.bring_to_front(ids[1]).unwrap());
        assert_eq!(scene.layer(g).unwrap().children(), &[ids[1], ids[0], ids[2]]);
        assert!(!scene.send_to_back(ids[2]).unwrap());
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_reparent_layer() {
        let mut scene = Scene::new();
        let g1 = scene.create_composition_layer("g1");
        let g2 = scene.create_composition_layer("g2");
        let a = raster(&mut scene, "a");
        scene.insert_layer(g1, 0, a).unwrap();
        scene.reparent_layer(a, g2, 0).unwrap();
        assert!(scene.layer(g1).unwrap().children().is_empty());
        assert_eq!(scene.layer(a).unwrap().parent(), Some(g2));
        assert!(matches!(
            scene.reparent_layer(g2, g2, 0),
            Err(LayerError::Cycle { .. })
        ));
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_group_and_ungroup() {
        let mut scene = Scene::new();
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        let ids: Vec<_> = (0..4).map(|i| raster(&mut scene, &i.to_string())).collect();
        scene.insert_layers(root, 0, &ids).unwrap();

        let group = scene.group_layers(&[ids[2], ids[1]]).unwrap();
        assert_eq!(scene.layer(root).unwrap().children(), &[ids[0], group, ids[3]]);
        assert_eq!(scene.layer(group).unwrap().children(), &[ids[1], ids[2]]);
        assert_eq!(scene.layer(ids[1]).unwrap().canvas(), Some(canvas));
        assert_tree_consistent(&scene);

        let children = scene.ungroup_layer(group).unwrap();
        assert_eq!(children, vec![ids[1], ids[2]]);
        assert_eq!(scene.layer(root).unwrap().children(), &ids[..]);
        assert!(!scene.contains_layer(group));
        assert_tree_consistent(&scene);
    }

    #[test]
    fn test_group_requires_shared_parent() {
        let mut scene = Scene::new();
        let g1 = scene.create_composition_layer("g1");
        let g2 = scene.create_composition_layer("g2");
        let a = raster(&mut scene, "a");
        let b = raster(&mut scene, "b");
        scene.insert_layer(g1, 0, a).unwrap();
        scene.insert_layer(g2, 0, b).unwrap();
        assert_eq!(scene.group_layers(&[a, b]), Err(LayerError::MixedParents));
        assert_eq!(scene.group_layers(&[]), Err(LayerError::Empty));
    }

    #[test]
    fn test_deep_tree_attach_is_iterative() {
        let mut scene = Scene::new();
        let top = scene.create_composition_layer("top");
        let mut current = top;
        for i in 0..2_000 {
            let next = scene.create_composition_layer(format!("n{i}"));
            scene.insert_layer(current, 0, next).unwrap();
            scene.drain_events();
            current = next;
        }
        let canvas = scene.create_canvas(CanvasConfig::default());
        let root = scene.canvas(canvas).unwrap().root();
        scene.insert_layer(root, 0, top).unwrap();
        assert_eq!(scene.layer(current).unwrap().canvas(), Some(canvas));
        scene.remove_layer(root, top).unwrap();
        assert_eq!(scene.layer(current).unwrap().canvas(), None);
    }
}
