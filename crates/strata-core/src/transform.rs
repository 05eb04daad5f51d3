//! Layer placement and the matrices derived from it.
//!
//! A layer is placed by translating to `position`, scaling by `scale` about
//! `scale_origin` and rotating by `rotation` degrees about `rotation_origin`.
//! Applied to a local point, rotation happens first, then scale, then the
//! translation.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

/// The transform-affecting properties of a visual layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Point,
    pub scale: Vec2,
    pub scale_origin: Point,
    /// Rotation in degrees.
    pub rotation: f64,
    pub rotation_origin: Point,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Point::ORIGIN,
            scale: Vec2::new(1.0, 1.0),
            scale_origin: Point::ORIGIN,
            rotation: 0.0,
            rotation_origin: Point::ORIGIN,
        }
    }
}

impl Placement {
    /// Whether either scale factor collapses the layer to zero area.
    pub fn is_degenerate(&self) -> bool {
        self.scale.x == 0.0
            || self.scale.y == 0.0
            || !self.scale.x.is_finite()
            || !self.scale.y.is_finite()
    }

    /// Local-to-parent matrix.
    pub fn matrix(&self) -> Affine {
        let scale = about(self.scale_origin, Affine::scale_non_uniform(self.scale.x, self.scale.y));
        let rotation = about(self.rotation_origin, Affine::rotate(self.rotation.to_radians()));
        Affine::translate(self.position.to_vec2()) * scale * rotation
    }

    /// Parent-to-local matrix, built from the inverted steps in reverse order.
    ///
    /// A degenerate scale has no inverse; identity is returned in that case.
    pub fn inverse_matrix(&self) -> Affine {
        if self.is_degenerate() {
            return Affine::IDENTITY;
        }
        let rotation = about(self.rotation_origin, Affine::rotate(-self.rotation.to_radians()));
        let scale = about(
            self.scale_origin,
            Affine::scale_non_uniform(1.0 / self.scale.x, 1.0 / self.scale.y),
        );
        rotation * scale * Affine::translate(-self.position.to_vec2())
    }
}

fn about(origin: Point, affine: Affine) -> Affine {
    let o = origin.to_vec2();
    Affine::translate(o) * affine * Affine::translate(-o)
}

/// The four cached matrices of a visual layer, always computed together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerMatrices {
    /// Local-to-parent.
    pub local: Affine,
    /// Parent-to-local.
    pub local_inverse: Affine,
    /// Local-to-canvas.
    pub absolute: Affine,
    /// Canvas-to-local.
    pub absolute_inverse: Affine,
}

impl LayerMatrices {
    /// Computes a layer's matrices given its parent's absolute pair
    /// (identity for a root or detached layer).
    pub fn compute(placement: &Placement, parent: Option<&LayerMatrices>) -> Self {
        let local = placement.matrix();
        let local_inverse = placement.inverse_matrix();
        let (absolute, absolute_inverse) = match parent {
            Some(p) => (p.absolute * local, local_inverse * p.absolute_inverse),
            None => (local, local_inverse),
        };
        Self {
            local,
            local_inverse,
            absolute,
            absolute_inverse,
        }
    }
}
