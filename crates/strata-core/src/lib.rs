//! Strata Core Library
//!
//! Layer tree, transformation and canvas model for the Strata image editor.
//! Rendering lives in `strata-render`.

mod arena;
pub mod canvas;
pub mod color;
pub mod error;
pub mod event;
pub mod id;
pub mod layer;
pub mod scene;
pub mod selection;
pub mod text_engine;
pub mod transform;

pub use canvas::{Canvas, CanvasConfig, PixelSize};
pub use color::{OPACITY_EPSILON, Rgba8, opacity_to_alpha};
pub use error::{ContentError, ContentResult, LayerError, LayerResult};
pub use event::{ChildrenChange, LifecycleHook, SceneEvent};
pub use id::{CanvasId, LayerId};
pub use layer::{
    Bitmap, BlendMode, ChannelMultipliers, CompositionLayer, EffectKind, Layer, LayerContent,
    LayerEffect, LayerKind, RasterLayer, ShapeGeometry, ShapeLayer, ShapeStyle, TextLayer,
    TextStyle, VisualProps,
};
pub use scene::Scene;
pub use selection::{SelectionChange, SelectionManager};
pub use text_engine::TextEngine;
pub use transform::{LayerMatrices, Placement};
