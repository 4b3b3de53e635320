//! Points and triangles for piecewise-linear interpolation.

use super::range::TOLERANCE;

/// A breakpoint `(x, y)` of a univariate piecewise function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A vertex `(x, y, z)` of a triangulated surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Triangle of a surface over the `(x, y)` plane.
///
/// Barycentric coordinates `(u, v)` are taken relative to `p1`, so a point is
/// `p1 + u·(p2 − p1) + v·(p3 − p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle3 {
    pub p1: Point3,
    pub p2: Point3,
    pub p3: Point3,
}

/// Affine map `a·x + b·y + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineForm {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl AffineForm {
    #[must_use]
    pub fn at(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }
}

impl Triangle3 {
    #[must_use]
    pub const fn new(p1: Point3, p2: Point3, p3: Point3) -> Self {
        Self { p1, p2, p3 }
    }

    /// Twice the signed area of the projection onto `(x, y)`.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        let (e1x, e1y) = (self.p2.x - self.p1.x, self.p2.y - self.p1.y);
        let (e2x, e2y) = (self.p3.x - self.p1.x, self.p3.y - self.p1.y);
        e1x * e2y - e1y * e2x
    }

    /// True when the projection has zero area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.determinant().abs() <= TOLERANCE
    }

    /// The affine forms computing `u` and `v` from `(x, y)`.
    #[must_use]
    pub fn barycentric_forms(&self) -> Option<(AffineForm, AffineForm)> {
        if self.is_degenerate() {
            return None;
        }
        let det = self.determinant();
        let (e1x, e1y) = (self.p2.x - self.p1.x, self.p2.y - self.p1.y);
        let (e2x, e2y) = (self.p3.x - self.p1.x, self.p3.y - self.p1.y);
        let u = AffineForm {
            a: e2y / det,
            b: -e2x / det,
            c: (e2x * self.p1.y - e2y * self.p1.x) / det,
        };
        let v = AffineForm {
            a: -e1y / det,
            b: e1x / det,
            c: (e1y * self.p1.x - e1x * self.p1.y) / det,
        };
        Some((u, v))
    }

    /// `(u, v)` of a point, whether or not it lies inside.
    #[must_use]
    pub fn barycentric(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (u, v) = self.barycentric_forms()?;
        Some((u.at(x, y), v.at(x, y)))
    }

    /// True when `(x, y)` lies inside or on the border.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.barycentric(x, y).is_some_and(|(u, v)| {
            u >= -TOLERANCE && v >= -TOLERANCE && u + v <= 1.0 + TOLERANCE
        })
    }

    /// Linear interpolation of `z` at `(x, y)`.
    #[must_use]
    pub fn interpolate(&self, x: f64, y: f64) -> Option<f64> {
        let (u, v) = self.barycentric(x, y)?;
        Some(self.p1.z + u * (self.p2.z - self.p1.z) + v * (self.p3.z - self.p1.z))
    }

    pub fn vertices(&self) -> [Point3; 3] {
        [self.p1, self.p2, self.p3]
    }
}

/// Triangulate the rectangular grid `xs × ys`, two triangles per cell, with
/// `z = f(x, y)` at every vertex.
pub fn grid_triangles<F>(xs: &[f64], ys: &[f64], f: F) -> Vec<Triangle3>
where
    F: Fn(f64, f64) -> f64,
{
    let vertex = |x: f64, y: f64| Point3::new(x, y, f(x, y));
    let mut triangles = Vec::new();
    for i in 0..xs.len().saturating_sub(1) {
        for j in 0..ys.len().saturating_sub(1) {
            let (x0, x1, y0, y1) = (xs[i], xs[i + 1], ys[j], ys[j + 1]);
            triangles.push(Triangle3::new(vertex(x0, y0), vertex(x1, y0), vertex(x0, y1)));
            triangles.push(Triangle3::new(vertex(x1, y1), vertex(x0, y1), vertex(x1, y0)));
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Triangle3 {
        Triangle3::new(
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 3.0),
            Point3::new(0.0, 1.0, 5.0),
        )
    }

    #[test]
    fn test_barycentric_of_vertices() {
        let t = unit();
        assert_eq!(t.barycentric(1.0, 0.0), Some((1.0, 0.0)));
        assert_eq!(t.barycentric(0.0, 1.0), Some((0.0, 1.0)));
    }

    #[test]
    fn test_interpolate_inside() {
        let t = unit();
        let z = t.interpolate(0.25, 0.25).unwrap();
        assert!((z - (1.0 + 0.25 * 2.0 + 0.25 * 4.0)).abs() < 1e-12);
        assert!(t.contains(0.25, 0.25));
        assert!(!t.contains(0.75, 0.75));
    }

    #[test]
    fn test_degenerate_triangle() {
        let t = Triangle3::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
        );
        assert!(t.is_degenerate());
        assert_eq!(t.barycentric(0.5, 0.5), None);
    }

    #[test]
    fn test_grid_covers_every_cell() {
        let triangles = grid_triangles(&[0.0, 1.0, 2.0], &[0.0, 1.0], |x, y| x + y);
        assert_eq!(triangles.len(), 4);
        assert!(triangles.iter().any(|t| t.contains(1.5, 0.5)));
        let z = triangles
            .iter()
            .find(|t| t.contains(1.5, 0.5))
            .and_then(|t| t.interpolate(1.5, 0.5))
            .unwrap();
        assert!((z - 2.0).abs() < 1e-12);
    }
}
