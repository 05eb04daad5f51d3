//! Visual properties shared by every layer kind.

use crate::transform::{LayerMatrices, Placement};
use kurbo::{Point, Vec2};
use peniko::{Compose, Mix};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// How a layer's pixels combine with what is beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub fn is_normal(self) -> bool {
        self == BlendMode::Normal
    }

    pub fn to_mix(self) -> Mix {
        match self {
            BlendMode::Normal => Mix::Normal,
            BlendMode::Multiply => Mix::Multiply,
            BlendMode::Screen => Mix::Screen,
            BlendMode::Overlay => Mix::Overlay,
            BlendMode::Darken => Mix::Darken,
            BlendMode::Lighten => Mix::Lighten,
            BlendMode::ColorDodge => Mix::ColorDodge,
            BlendMode::ColorBurn => Mix::ColorBurn,
            BlendMode::HardLight => Mix::HardLight,
            BlendMode::SoftLight => Mix::SoftLight,
            BlendMode::Difference => Mix::Difference,
            BlendMode::Exclusion => Mix::Exclusion,
            BlendMode::Hue => Mix::Hue,
            BlendMode::Saturation => Mix::Saturation,
            BlendMode::Color => Mix::Color,
            BlendMode::Luminosity => Mix::Luminosity,
        }
    }
}

impl From<BlendMode> for peniko::BlendMode {
    fn from(mode: BlendMode) -> Self {
        peniko::BlendMode::new(mode.to_mix(), Compose::SrcOver)
    }
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

/// Opacity, visibility, blending and placement of a layer, plus the lazily
/// computed matrix cache.
///
/// Mutation goes through [`Scene`](crate::Scene) so that caches and
/// notifications stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualProps {
    #[serde(default = "default_opacity")]
    pub(crate) opacity: f32,
    #[serde(default = "default_true")]
    pub(crate) visible: bool,
    #[serde(default = "default_true")]
    pub(crate) export_visible: bool,
    #[serde(default)]
    pub(crate) solo: bool,
    #[serde(default)]
    pub(crate) blend_mode: BlendMode,
    #[serde(default)]
    pub(crate) placement: Placement,
    #[serde(default = "default_true")]
    pub(crate) scale_origin_automatic: bool,
    #[serde(default = "default_true")]
    pub(crate) rotation_origin_automatic: bool,
    /// `None` means dirty.
    #[serde(skip)]
    pub(crate) matrices: Cell<Option<LayerMatrices>>,
    #[serde(skip)]
    pub(crate) rendering: bool,
}

impl Default for VisualProps {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            export_visible: true,
            solo: false,
            blend_mode: BlendMode::Normal,
            placement: Placement::default(),
            scale_origin_automatic: true,
            rotation_origin_automatic: true,
            matrices: Cell::new(None),
            rendering: false,
        }
    }
}

impl VisualProps {
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_export_visible(&self) -> bool {
        self.export_visible
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn position(&self) -> Point {
        self.placement.position
    }

    pub fn scale(&self) -> Vec2 {
        self.placement.scale
    }

    pub fn scale_origin(&self) -> Point {
        self.placement.scale_origin
    }

    /// Rotation in degrees.
    pub fn rotation(&self) -> f64 {
        self.placement.rotation
    }

    pub fn rotation_origin(&self) -> Point {
        self.placement.rotation_origin
    }

    pub fn is_scale_origin_automatic(&self) -> bool {
        self.scale_origin_automatic
    }

    pub fn is_rotation_origin_automatic(&self) -> bool {
        self.rotation_origin_automatic
    }

    /// Whether the layer is inside an active render pass.
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Whether the matrix cache needs recomputing.
    pub fn matrices_dirty(&self) -> bool {
        self.matrices.get().is_none()
    }

    pub(crate) fn mark_matrices_dirty(&self) {
        self.matrices.set(None);
    }
}
