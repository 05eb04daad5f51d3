//! Notifications emitted by the scene.
//!
//! Every structural or visual change is recorded as a [`SceneEvent`]. Hosts
//! either drain the queue after each command or install a listener.

use crate::canvas::PixelSize;
use crate::id::{CanvasId, LayerId};
use kurbo::Rect;
use std::fmt;

/// Per-layer lifecycle hooks fired by the attach/detach protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    /// The layer became a direct child of a composition.
    AddedToLayer,
    /// The layer stopped being a direct child of a composition.
    RemovedFromLayer,
    /// An ancestor of the layer was added to a composition.
    HierarchicalParentAdded,
    /// An ancestor of the layer was removed from a composition.
    HierarchicalParentRemoved,
    AttachedToCanvas,
    DetachedFromCanvas,
    /// An effect on the layer picked up the layer's canvas.
    EffectAttached { effect: usize },
    /// An effect on the layer lost the layer's canvas.
    EffectDetached { effect: usize },
}

/// How a composition's child list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenChange {
    Inserted { index: usize, count: usize },
    Removed { index: usize, layer: LayerId },
    Moved { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// The layer's rendered appearance changed.
    RenderInvalidated { layer: LayerId },
    /// Something on the canvas needs a repaint.
    CanvasRenderInvalidated { canvas: CanvasId },
    CanvasSizeChanged {
        canvas: CanvasId,
        old: PixelSize,
        new: PixelSize,
    },
    ActiveLayerChanged {
        canvas: CanvasId,
        old: Option<LayerId>,
        new: Option<LayerId>,
    },
    SoloLayerChanged {
        canvas: CanvasId,
        old: Option<LayerId>,
        new: Option<LayerId>,
    },
    ParentChanged {
        layer: LayerId,
        old: Option<LayerId>,
        new: Option<LayerId>,
    },
    CanvasChanged {
        layer: LayerId,
        old: Option<CanvasId>,
        new: Option<CanvasId>,
    },
    /// A lifecycle hook fired on `layer`; `origin` is the node the
    /// structural operation was invoked on.
    Lifecycle {
        layer: LayerId,
        hook: LifecycleHook,
        origin: LayerId,
    },
    ChildrenChanged {
        parent: LayerId,
        change: ChildrenChange,
    },
    SelectionChanged {
        canvas: CanvasId,
        added: Vec<LayerId>,
        removed: Vec<LayerId>,
    },
    NaturalSizeChanged {
        layer: LayerId,
        old: Rect,
        new: Rect,
    },
}

type Listener = Box<dyn FnMut(&SceneEvent)>;

/// Ordered event log with optional synchronous listener.
///
/// While a batch is open the listener is held back; the events it missed
/// are delivered in order when the outermost batch closes.
#[derive(Default)]
pub(crate) struct EventQueue {
    events: Vec<SceneEvent>,
    batch_depth: u32,
    batch_start: usize,
    listener: Option<Listener>,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.events.len())
            .field("batch_depth", &self.batch_depth)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl EventQueue {
    pub(crate) fn emit(&mut self, event: SceneEvent) {
        if self.batch_depth == 0 {
            if let Some(listener) = self.listener.as_mut() {
                listener(&event);
            }
        }
        self.events.push(event);
    }

    pub(crate) fn begin_batch(&mut self) {
        if self.batch_depth == 0 {
            self.batch_start = self.events.len();
        }
        self.batch_depth += 1;
    }

    pub(crate) fn end_batch(&mut self) {
        debug_assert!(self.batch_depth > 0, "unbalanced end_batch");
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 {
            if let Some(listener) = self.listener.as_mut() {
                for event in &self.events[self.batch_start..] {
                    listener(event);
                }
            }
        }
    }

    pub(crate) fn set_listener(&mut self, listener: Option<Listener>) {
        self.listener = listener;
    }

    pub(crate) fn drain(&mut self) -> Vec<SceneEvent> {
        debug_assert_eq!(self.batch_depth, 0, "draining inside a batch");
        std::mem::take(&mut self.events)
    }
}
