//! Color and opacity helpers shared by layer content and the renderer.

use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (straight RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// This color with its alpha scaled by `opacity`.
    pub fn with_opacity(self, opacity: f32) -> Self {
        let a = (f32::from(self.a) * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

impl From<Color> for Rgba8 {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<Rgba8> for Color {
    fn from(color: Rgba8) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Converts a unit opacity to an 8-bit alpha.
///
/// Rounds to nearest and clamps to `[0, 255]`; NaN maps to 0.
pub fn opacity_to_alpha(opacity: f32) -> u8 {
    if opacity.is_nan() {
        return 0;
    }
    (opacity * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Opacities at or below this are treated as fully transparent.
pub const OPACITY_EPSILON: f32 = 1.0 / 512.0;

/// Whether `opacity` is close enough to zero that nothing would be drawn.
pub fn is_effectively_transparent(opacity: f32) -> bool {
    opacity.is_nan() || opacity <= OPACITY_EPSILON
}

/// Whether `opacity` is close enough to one that no group is needed.
pub fn is_effectively_opaque(opacity: f32) -> bool {
    opacity >= 1.0 - OPACITY_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opacity_to_alpha_rounds_and_clamps() {
        assert_eq!(opacity_to_alpha(0.0), 0);
        assert_eq!(opacity_to_alpha(1.0), 255);
        assert_eq!(opacity_to_alpha(0.5), 128);
        assert_eq!(opacity_to_alpha(-3.0), 0);
        assert_eq!(opacity_to_alpha(7.0), 255);
        assert_eq!(opacity_to_alpha(f32::NAN), 0);
    }

    #[test]
    fn test_color_roundtrip_through_peniko() {
        let c = Rgba8::new(10, 20, 30, 40);
        let p: Color = c.into();
        assert_eq!(Rgba8::from(p), c);
    }

    #[test]
    fn test_with_opacity() {
        assert_eq!(Rgba8::white().with_opacity(0.5).a, 128);
        assert_eq!(Rgba8::white().with_opacity(2.0).a, 255);
    }

    #[test]
    fn test_transparency_thresholds() {
        assert!(is_effectively_transparent(0.0));
        assert!(is_effectively_transparent(f32::NAN));
        assert!(!is_effectively_transparent(0.01));
        assert!(is_effectively_opaque(1.0));
        assert!(!is_effectively_opaque(0.9));
    }
}
