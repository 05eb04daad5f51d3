//! Layer definitions.

pub mod composition;
pub mod effect;
pub mod raster;
pub mod shape;
pub mod text;
pub mod visual;

pub use composition::CompositionLayer;
pub use effect::{EffectKind, LayerEffect};
pub use raster::{Bitmap, ChannelMultipliers, RasterLayer};
pub use shape::{ShapeGeometry, ShapeLayer, ShapeStyle};
pub use text::{GlyphCache, GlyphRun, PositionedGlyph, TextLayer, TextStyle};
pub use visual::{BlendMode, VisualProps};

use crate::id::{CanvasId, LayerId};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Behavior every leaf content type provides.
pub trait LayerContent {
    /// Local-space extent of the content.
    fn natural_rect(&self) -> Rect;

    /// Whether the content applies layer opacity itself while drawing,
    /// making an isolation group unnecessary.
    fn uses_custom_opacity(&self) -> bool;

    /// Check if a point in layer-local coordinates hits the content.
    fn hit_test(&self, local: Point) -> bool {
        self.natural_rect().contains(local)
    }
}

/// The concrete content of a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerKind {
    Raster(RasterLayer),
    Text(TextLayer),
    Shape(ShapeLayer),
    Composition(CompositionLayer),
}

impl LayerKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LayerKind::Raster(_) => "raster",
            LayerKind::Text(_) => "text",
            LayerKind::Shape(_) => "shape",
            LayerKind::Composition(_) => "composition",
        }
    }

    /// Compositions always need an isolation group for opacity.
    pub fn uses_custom_opacity(&self) -> bool {
        match self {
            LayerKind::Raster(l) => l.uses_custom_opacity(),
            LayerKind::Text(l) => l.uses_custom_opacity(),
            LayerKind::Shape(l) => l.uses_custom_opacity(),
            LayerKind::Composition(_) => false,
        }
    }

    /// Extent of leaf content; `None` for compositions, whose extent
    /// comes from their canvas.
    pub fn leaf_natural_rect(&self) -> Option<Rect> {
        match self {
            LayerKind::Raster(l) => Some(l.natural_rect()),
            LayerKind::Text(l) => Some(l.natural_rect()),
            LayerKind::Shape(l) => Some(l.natural_rect()),
            LayerKind::Composition(_) => None,
        }
    }

    pub fn hit_test(&self, local: Point) -> bool {
        match self {
            LayerKind::Raster(l) => l.hit_test(local),
            LayerKind::Text(l) => l.hit_test(local),
            LayerKind::Shape(l) => l.hit_test(local),
            LayerKind::Composition(_) => false,
        }
    }

    pub fn as_composition(&self) -> Option<&CompositionLayer> {
        match self {
            LayerKind::Composition(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn as_composition_mut(&mut self) -> Option<&mut CompositionLayer> {
        match self {
            LayerKind::Composition(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_composition(&self) -> bool {
        matches!(self, LayerKind::Composition(_))
    }
}

/// A node in the layer tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub(crate) name: String,
    pub(crate) parent: Option<LayerId>,
    pub(crate) canvas: Option<CanvasId>,
    pub(crate) index_in_parent: usize,
    #[serde(default)]
    pub(crate) effects: Vec<LayerEffect>,
    #[serde(default)]
    pub(crate) visual: VisualProps,
    pub(crate) kind: LayerKind,
}

impl Layer {
    pub(crate) fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            canvas: None,
            index_in_parent: 0,
            effects: Vec::new(),
            visual: VisualProps::default(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub fn canvas(&self) -> Option<CanvasId> {
        self.canvas
    }

    /// Position within the parent's child list; meaningless without a parent.
    pub fn index_in_parent(&self) -> usize {
        self.index_in_parent
    }

    pub fn effects(&self) -> &[LayerEffect] {
        &self.effects
    }

    pub fn visual(&self) -> &VisualProps {
        &self.visual
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Canvas roots are the only attached layers without a parent.
    pub fn is_canvas_root(&self) -> bool {
        self.parent.is_none() && self.canvas.is_some()
    }

    /// Neither parented nor on a canvas.
    pub fn is_detached(&self) -> bool {
        self.parent.is_none() && self.canvas.is_none()
    }

    pub fn children(&self) -> &[LayerId] {
        self.kind
            .as_composition()
            .map(CompositionLayer::children)
            .unwrap_or(&[])
    }
}
