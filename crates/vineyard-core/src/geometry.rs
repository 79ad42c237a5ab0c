//! Pixel-space geometry: points, implicit lines, rays and polygon centroids

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Point (or vector) in raster pixel space. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians, image axes: +x right, +y down)
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        (*other - *self).norm()
    }

    /// Normalized copy, `None` for a (near) zero vector
    pub fn normalized(&self) -> Option<PixelPoint> {
        let n = self.norm();
        if n.is_finite() && n > f64::EPSILON {
            Some(Self::new(self.x / n, self.y / n))
        } else {
            None
        }
    }

    /// Counter-clockwise perpendicular `(-y, x)`
    pub fn perpendicular(&self) -> PixelPoint {
        Self::new(-self.y, self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for PixelPoint {
    fn from(p: [f64; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<PixelPoint> for [f64; 2] {
    fn from(p: PixelPoint) -> Self {
        p.to_array()
    }
}

impl From<(u32, u32)> for PixelPoint {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x as f64, y as f64)
    }
}

impl Add for PixelPoint {
    type Output = PixelPoint;

    fn add(self, rhs: PixelPoint) -> PixelPoint {
        PixelPoint::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for PixelPoint {
    type Output = PixelPoint;

    fn sub(self, rhs: PixelPoint) -> PixelPoint {
        PixelPoint::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for PixelPoint {
    type Output = PixelPoint;

    fn mul(self, rhs: f64) -> PixelPoint {
        PixelPoint::new(self.x * rhs, self.y * rhs)
    }
}

// ============================================================================
// LINES & RAYS
// ============================================================================

/// Line through two points in implicit form `a·x + b·y = c`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImplicitLine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ImplicitLine {
    pub fn through(p1: PixelPoint, p2: PixelPoint) -> Self {
        let a = p2.y - p1.y;
        let b = p1.x - p2.x;
        let c = a * p1.x + b * p1.y;
        Self { a, b, c }
    }
}

/// Half-line starting at `origin` along the unit vector `direction`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: PixelPoint,
    pub direction: PixelPoint,
}

impl Ray {
    pub fn new(origin: PixelPoint, direction: PixelPoint) -> Self {
        Self { origin, direction }
    }

    /// Ray leaving `origin` at `angle` radians
    pub fn from_heading(origin: PixelPoint, angle: f64) -> Self {
        Self::new(origin, PixelPoint::from_angle(angle))
    }

    /// Ray parameter where the supporting line meets `line`.
    ///
    /// Returns `None` when the ray is parallel to the line. The parameter may be
    /// negative (the crossing lies behind the origin).
    pub fn intersect(&self, line: &ImplicitLine) -> Option<f64> {
        let numerator = line.c - line.a * self.origin.x - line.b * self.origin.y;
        let denominator = line.a * self.direction.x + line.b * self.direction.y;
        if denominator == 0.0 {
            return None;
        }
        Some(numerator / denominator)
    }

    pub fn point_at(&self, t: f64) -> PixelPoint {
        self.origin + self.direction * t
    }
}

// ============================================================================
// POLYGONS
// ============================================================================

/// Signed area of a closed polygon (shoelace formula)
pub fn polygon_signed_area(vertices: &[PixelPoint]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..n {
        let p = vertices[i];
        let q = vertices[(i + 1) % n];
        twice_area += p.x * q.y - q.x * p.y;
    }
    twice_area / 2.0
}

/// Centroid (center of mass) of a simple polygon.
///
/// Fails with [`CoreError::Geometry`] when the absolute area is below `epsilon`.
pub fn polygon_centroid(vertices: &[PixelPoint], epsilon: f64) -> CoreResult<PixelPoint> {
    let area = polygon_signed_area(vertices);
    if !area.is_finite() || area.abs() < epsilon {
        return Err(CoreError::geometry(format!(
            "degenerate polygon with {} vertices (area {area})",
            vertices.len()
        )));
    }

    let n = vertices.len();
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let p = vertices[i];
        let q = vertices[(i + 1) % n];
        let factor = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * factor;
        cy += (p.y + q.y) * factor;
    }

    Ok(PixelPoint::new(cx / (6.0 * area), cy / (6.0 * area)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_centroid() {
        let square = [
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(10.0, 0.0),
            PixelPoint::new(10.0, 10.0),
            PixelPoint::new(0.0, 10.0),
        ];
        let c = polygon_centroid(&square, 1e-9).unwrap();
        assert!((c.x - 5.0).abs() < 1e-12);
        assert!((c.y - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_is_orientation_independent() {
        let cw = [
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(0.0, 4.0),
            PixelPoint::new(8.0, 4.0),
            PixelPoint::new(8.0, 0.0),
        ];
        let c = polygon_centroid(&cw, 1e-9).unwrap();
        assert!((c.x - 4.0).abs() < 1e-12);
        assert!((c.y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_polygon_is_error() {
        let flat = [
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(5.0, 0.0),
            PixelPoint::new(10.0, 0.0),
            PixelPoint::new(2.0, 0.0),
        ];
        let err = polygon_centroid(&flat, 1e-6).unwrap_err();
        assert!(matches!(err, CoreError::Geometry(_)));
    }

    #[test]
    fn test_ray_row_intersection() {
        let ray = Ray::from_heading(PixelPoint::ORIGIN, 0.0);
        let row = ImplicitLine::through(PixelPoint::new(10.0, -5.0), PixelPoint::new(10.0, 5.0));
        let t = ray.intersect(&row).unwrap();
        let hit = ray.point_at(t);
        assert!((t - 10.0).abs() < 1e-12);
        assert!((hit.x - 10.0).abs() < 1e-12);
        assert!(hit.y.abs() < 1e-12);
    }

    #[test]
    fn test_parallel_ray_has_no_intersection() {
        let ray = Ray::from_heading(PixelPoint::ORIGIN, 0.0);
        let row = ImplicitLine::through(PixelPoint::new(0.0, 3.0), PixelPoint::new(10.0, 3.0));
        assert!(ray.intersect(&row).is_none());
    }

    #[test]
    fn test_perpendicular_and_normalize() {
        let d = PixelPoint::new(3.0, 4.0).normalized().unwrap();
        assert!((d.norm() - 1.0).abs() < 1e-12);
        let p = d.perpendicular();
        assert!((p.x * d.x + p.y * d.y).abs() < 1e-12);
        assert!(PixelPoint::ORIGIN.normalized().is_none());
    }
}
