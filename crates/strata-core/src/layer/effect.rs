//! Layer effects.
//!
//! Effects ride along with a layer and follow its canvas attachment. The
//! renderer does not draw them yet; they are kept so documents round-trip.

use crate::color::Rgba8;
use crate::id::CanvasId;
use kurbo::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectKind {
    DropShadow {
        offset: Vec2,
        blur_radius: f64,
        color: Rgba8,
    },
    GaussianBlur {
        radius: f64,
    },
    Stroke {
        width: f64,
        color: Rgba8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEffect {
    pub kind: EffectKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Mirrors the owning layer's canvas.
    #[serde(default)]
    pub(crate) canvas: Option<CanvasId>,
}

fn default_enabled() -> bool {
    true
}

impl LayerEffect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            enabled: true,
            canvas: None,
        }
    }

    pub fn canvas(&self) -> Option<CanvasId> {
        self.canvas
    }
}
