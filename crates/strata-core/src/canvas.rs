//! Canvas: a document surface owning one root composition.

use crate::id::LayerId;
use crate::selection::SelectionManager;
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn to_rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Settings for a new canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub name: String,
    pub size: PixelSize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            size: PixelSize::new(800, 600),
        }
    }
}

impl CanvasConfig {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            size: PixelSize::new(width, height),
        }
    }
}

/// Canvas-level state; the layer tree itself lives in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub(crate) name: String,
    pub(crate) size: PixelSize,
    pub(crate) root: LayerId,
    pub(crate) active_layer: Option<LayerId>,
    pub(crate) solo_layer: Option<LayerId>,
    #[serde(skip)]
    pub(crate) selection: SelectionManager,
}

impl Canvas {
    pub(crate) fn new(config: CanvasConfig, root: LayerId) -> Self {
        Self {
            name: config.name,
            size: config.size,
            root,
            active_layer: None,
            solo_layer: None,
            selection: SelectionManager::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// The root composition.
    pub fn root(&self) -> LayerId {
        self.root
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.active_layer
    }

    /// The one layer whose solo flag is set, if any.
    pub fn solo_layer(&self) -> Option<LayerId> {
        self.solo_layer
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }
}
