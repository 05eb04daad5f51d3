//! Vector shape content.

use super::LayerContent;
use crate::color::Rgba8;
use kurbo::{BezPath, Ellipse, Point, Rect, RoundedRect, Shape as KurboShape, Size};
use serde::{Deserialize, Serialize};

const PATH_TOLERANCE: f64 = 0.1;

/// Geometry of a shape layer, in layer-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Rectangle { size: Size, corner_radius: f64 },
    Ellipse { size: Size },
    /// Closed polygon through the given points.
    Polygon { points: Vec<Point> },
    Path { path: BezPath },
}

impl ShapeGeometry {
    pub fn to_path(&self) -> BezPath {
        match self {
            ShapeGeometry::Rectangle {
                size,
                corner_radius,
            } => {
                let rect = size.to_rect();
                if *corner_radius > 0.0 {
                    RoundedRect::from_rect(rect, *corner_radius).to_path(PATH_TOLERANCE)
                } else {
                    rect.to_path(PATH_TOLERANCE)
                }
            }
            ShapeGeometry::Ellipse { size } => {
                Ellipse::from_rect(size.to_rect()).to_path(PATH_TOLERANCE)
            }
            ShapeGeometry::Polygon { points } => {
                let mut path = BezPath::new();
                let mut iter = points.iter();
                if let Some(first) = iter.next() {
                    path.move_to(*first);
                    for p in iter {
                        path.line_to(*p);
                    }
                    path.close_path();
                }
                path
            }
            ShapeGeometry::Path { path } => path.clone(),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            ShapeGeometry::Rectangle { size, .. } | ShapeGeometry::Ellipse { size } => {
                size.to_rect()
            }
            ShapeGeometry::Polygon { points } if points.is_empty() => Rect::ZERO,
            _ => self.to_path().bounding_box(),
        }
    }
}

/// Fill and stroke settings for a shape layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub fill: Option<Rgba8>,
    pub stroke: Option<Rgba8>,
    pub stroke_width: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill: Some(Rgba8::black()),
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

/// A layer drawing one filled and/or stroked shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeLayer {
    pub(crate) geometry: ShapeGeometry,
    pub(crate) style: ShapeStyle,
}

impl ShapeLayer {
    pub fn new(geometry: ShapeGeometry, style: ShapeStyle) -> Self {
        Self { geometry, style }
    }

    pub fn geometry(&self) -> &ShapeGeometry {
        &self.geometry
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    /// Whether drawing would produce any pixels.
    pub fn is_drawable(&self) -> bool {
        let has_paint = self.style.fill.is_some()
            || (self.style.stroke.is_some() && self.style.stroke_width > 0.0);
        has_paint && !self.geometry.to_path().elements().is_empty()
    }
}

impl LayerContent for ShapeLayer {
    fn natural_rect(&self) -> Rect {
        self.geometry.bounds()
    }

    fn uses_custom_opacity(&self) -> bool {
        true
    }

    fn hit_test(&self, local: Point) -> bool {
        if self.style.fill.is_some() {
            return self.geometry.to_path().contains(local);
        }
        let half = self.style.stroke_width / 2.0;
        self.natural_rect().inflate(half, half).contains(local)
    }
}
