//! Convex polygon shape.

use nalgebra::{Point2, Vector2};

use crate::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::math::{cross, Pose};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::shapes::MassData;
use crate::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A convex polygon with at most
/// [`MAX_POLYGON_VERTICES`] vertices.
///
/// Construction computes the convex hull of the input points: near-
/// duplicates are welded (tolerance half a [`LINEAR_SLOP`]) and the hull
/// is gift-wrapped, so the stored vertices are always strictly convex and
/// CCW-wound with positive area. Inputs that collapse to fewer than three
/// hull points are rejected.
///
/// # Example
///
/// ```
/// use planar_types::PolygonShape;
/// use nalgebra::Point2;
///
/// let triangle = PolygonShape::new(&[
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.0, 1.0),
/// ]).unwrap();
/// assert_eq!(triangle.count(), 3);
/// assert!(triangle.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolygonShape {
    vertices: [Point2<f64>; MAX_POLYGON_VERTICES],
    normals: [Vector2<f64>; MAX_POLYGON_VERTICES],
    centroid: Point2<f64>,
    count: usize,
}

impl PolygonShape {
    /// Build a polygon as the convex hull of the given points.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidPolygon`] when fewer than three
    /// points remain after welding, when more than
    /// [`MAX_POLYGON_VERTICES`] are supplied, or when the hull collapses
    /// to a degenerate (near-collinear) polygon.
    pub fn new(points: &[Point2<f64>]) -> Result<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::invalid_polygon(
                "fewer than 3 points supplied",
            ));
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::invalid_polygon(format!(
                "{} points exceed the maximum of {MAX_POLYGON_VERTICES}",
                points.len()
            )));
        }

        // Weld near-duplicate points.
        let weld_tolerance_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut unique: Vec<Point2<f64>> = Vec::with_capacity(points.len());
        for p in points {
            if unique
                .iter()
                .all(|q| (p - q).norm_squared() > weld_tolerance_sq)
            {
                unique.push(*p);
            }
        }

        if unique.len() < 3 {
            return Err(PhysicsError::invalid_polygon(
                "fewer than 3 unique points after welding",
            ));
        }

        // Gift wrapping from the rightmost (lowest-y tie-break) point.
        let mut i0 = 0;
        let mut x0 = unique[0].x;
        for (i, p) in unique.iter().enumerate().skip(1) {
            if p.x > x0 || (p.x == x0 && p.y < unique[i0].y) {
                i0 = i;
                x0 = p.x;
            }
        }

        let mut hull = [0usize; MAX_POLYGON_VERTICES];
        let mut m = 0;
        let mut ih = i0;
        loop {
            debug_assert!(m < MAX_POLYGON_VERTICES);
            hull[m] = ih;

            let mut ie = 0;
            for j in 1..unique.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }

                let r = unique[ie] - unique[ih];
                let v = unique[j] - unique[ih];
                let c = cross(r, v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinear: keep the farthest point.
                if c == 0.0 && v.norm_squared() > r.norm_squared() {
                    ie = j;
                }
            }

            m += 1;
            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if m < 3 {
            return Err(PhysicsError::invalid_polygon(
                "hull is degenerate (collinear points)",
            ));
        }

        let mut vertices = [Point2::origin(); MAX_POLYGON_VERTICES];
        for i in 0..m {
            vertices[i] = unique[hull[i]];
        }

        let mut normals = [Vector2::zeros(); MAX_POLYGON_VERTICES];
        for i in 0..m {
            let i2 = if i + 1 < m { i + 1 } else { 0 };
            let edge = vertices[i2] - vertices[i];
            if edge.norm_squared() <= f64::EPSILON * f64::EPSILON {
                return Err(PhysicsError::invalid_polygon("zero-length edge"));
            }
            normals[i] = Vector2::new(edge.y, -edge.x).normalize();
        }

        let centroid = Self::compute_centroid(&vertices[..m]);

        Ok(Self {
            vertices,
            normals,
            centroid,
            count: m,
        })
    }

    /// Build an axis-aligned box with the given half-extents.
    #[must_use]
    pub fn new_box(hx: f64, hy: f64) -> Self {
        let vertices = [
            Point2::new(-hx, -hy),
            Point2::new(hx, -hy),
            Point2::new(hx, hy),
            Point2::new(-hx, hy),
            Point2::origin(),
            Point2::origin(),
            Point2::origin(),
            Point2::origin(),
        ];
        let normals = [
            Vector2::new(0.0, -1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(-1.0, 0.0),
            Vector2::zeros(),
            Vector2::zeros(),
            Vector2::zeros(),
            Vector2::zeros(),
        ];
        Self {
            vertices,
            normals,
            centroid: Point2::origin(),
            count: 4,
        }
    }

    /// Build a box with the given half-extents, centered at `center` and
    /// rotated by `angle`.
    #[must_use]
    pub fn new_oriented_box(hx: f64, hy: f64, center: Point2<f64>, angle: f64) -> Self {
        let mut shape = Self::new_box(hx, hy);
        shape.centroid = center;

        let pose = Pose::from_position_angle(center, angle);
        for i in 0..4 {
            shape.vertices[i] = pose.transform_point(&shape.vertices[i]);
            shape.normals[i] = pose.transform_vector(&shape.normals[i]);
        }
        shape
    }

    /// Number of hull vertices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Hull vertices in CCW order.
    #[must_use]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices[..self.count]
    }

    /// Outward edge normals; `normals()[i]` belongs to the edge from
    /// `vertices()[i]` to the next vertex.
    #[must_use]
    pub fn normals(&self) -> &[Vector2<f64>] {
        &self.normals[..self.count]
    }

    /// The area centroid in local coordinates.
    #[must_use]
    pub fn centroid(&self) -> Point2<f64> {
        self.centroid
    }

    /// Skin radius of the polygon.
    #[must_use]
    pub fn radius(&self) -> f64 {
        POLYGON_RADIUS
    }

    /// Verify convexity and winding. Hull construction guarantees this;
    /// the check exists for tests and debug validation.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidPolygon`] if any vertex lies outside
    /// an edge's half plane.
    pub fn validate(&self) -> Result<()> {
        for i in 0..self.count {
            let i2 = (i + 1) % self.count;
            let edge = self.vertices[i2] - self.vertices[i];
            for j in 0..self.count {
                if j == i || j == i2 {
                    continue;
                }
                let r = self.vertices[j] - self.vertices[i];
                if cross(edge, r) < 0.0 {
                    return Err(PhysicsError::invalid_polygon("polygon is not convex"));
                }
            }
        }
        Ok(())
    }

    fn compute_centroid(vertices: &[Point2<f64>]) -> Point2<f64> {
        debug_assert!(vertices.len() >= 3);

        // Reference point keeps the triangle fan well conditioned.
        let s = vertices[0].coords;

        let inv3 = 1.0 / 3.0;
        let mut area = 0.0;
        let mut c = Vector2::zeros();
        for i in 1..vertices.len() - 1 {
            let e1 = vertices[i].coords - s;
            let e2 = vertices[i + 1].coords - s;
            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            c += triangle_area * inv3 * (e1 + e2);
        }

        debug_assert!(area > f64::EPSILON);
        Point2::from(c / area + s)
    }

    /// Compute the world-space AABB under the given pose.
    #[must_use]
    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        let mut min = pose.transform_point(&self.vertices[0]);
        let mut max = min;
        for v in &self.vertices[1..self.count] {
            let p = pose.transform_point(v);
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        Aabb::new(min, max).expanded(self.radius())
    }

    /// Compute mass properties at the given density.
    ///
    /// The inertia is reported about the shape's local origin; the
    /// parallel-axis shift from the centroid is folded in.
    #[must_use]
    pub fn compute_mass(&self, density: f64) -> MassData {
        debug_assert!(self.count >= 3);

        // Reference point inside the polygon for numeric conditioning.
        let mut s = Vector2::zeros();
        for v in &self.vertices[..self.count] {
            s += v.coords;
        }
        s /= self.count as f64;

        let inv3 = 1.0 / 3.0;
        let mut area = 0.0;
        let mut center = Vector2::zeros();
        let mut inertia = 0.0;

        for i in 0..self.count {
            let e1 = self.vertices[i].coords - s;
            let i2 = (i + 1) % self.count;
            let e2 = self.vertices[i2].coords - s;

            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;

            center += triangle_area * inv3 * (e1 + e2);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        center /= area;
        let world_center = center + s;

        // Shift inertia from the reference point to the local origin.
        let inertia = density * inertia
            + mass * (world_center.dot(&world_center) - center.dot(&center));

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    /// Test whether a world point lies inside the polygon.
    #[must_use]
    pub fn test_point(&self, pose: &Pose, point: &Point2<f64>) -> bool {
        let local = pose.inverse_transform_point(point);
        for i in 0..self.count {
            if self.normals[i].dot(&(local - self.vertices[i])) > 0.0 {
                return false;
            }
        }
        true
    }

    /// Cast a ray against the polygon by clipping the segment to each
    /// edge half plane.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        let p = pose.inverse_transform_point(&input.p1);
        let p2 = pose.inverse_transform_point(&input.p2);
        let d = p2 - p;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p + t * d is on the plane when
            // dot(normal, vertex - p) = t * dot(normal, d).
            let numerator = self.normals[i].dot(&(self.vertices[i] - p));
            let denominator = self.normals[i].dot(&d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else {
                let t = numerator / denominator;
                if denominator < 0.0 && t > lower {
                    lower = t;
                    index = Some(i);
                } else if denominator > 0.0 && t < upper {
                    upper = t;
                }
            }

            if upper < lower {
                return None;
            }
        }

        debug_assert!((0.0..=input.max_fraction).contains(&lower));

        index.map(|i| RayCastOutput {
            normal: pose.transform_vector(&self.normals[i]),
            fraction: lower,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hull_is_ccw_and_convex() {
        // Scrambled input order; one interior point that must be dropped.
        let polygon = PolygonShape::new(&[
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, -1.0),
            Point2::new(0.0, 0.1),
            Point2::new(1.0, -1.0),
            Point2::new(-1.0, 1.0),
        ])
        .expect("valid hull");

        assert_eq!(polygon.count(), 4, "interior point should be dropped");
        assert!(polygon.validate().is_ok());

        // CCW winding: positive signed area.
        let vs = polygon.vertices();
        let mut area = 0.0;
        for i in 0..vs.len() {
            let j = (i + 1) % vs.len();
            area += cross(vs[i].coords, vs[j].coords);
        }
        assert!(area > 0.0, "winding should be CCW");
    }

    #[test]
    fn test_welding_rejects_degenerate() {
        let eps = 0.1 * LINEAR_SLOP;
        let result = PolygonShape::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(eps, 0.0),
            Point2::new(0.0, eps),
        ]);
        assert!(matches!(
            result,
            Err(PhysicsError::InvalidPolygon { .. })
        ));
    }

    #[test]
    fn test_collinear_rejected() {
        let result = PolygonShape::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_box_mass() {
        let shape = PolygonShape::new_box(0.5, 1.5);
        let mass = shape.compute_mass(1.0);
        assert_relative_eq!(mass.mass, 3.0, epsilon = 1e-12);
        assert_relative_eq!(mass.center, Vector2::zeros(), epsilon = 1e-12);
        // I = m/3 * (hx² + hy²) for a centered box.
        assert_relative_eq!(mass.inertia, 3.0 / 3.0 * (0.25 + 2.25), epsilon = 1e-12);
    }

    #[test]
    fn test_offset_box_mass_parallel_axis() {
        // A 1x3 box (hx = 0.5, hy = 1.5) at (100, -50), rotated 0.25 rad.
        let center = Point2::new(100.0, -50.0);
        let shape = PolygonShape::new_oriented_box(0.5, 1.5, center, 0.25);
        let mass = shape.compute_mass(1.0);

        let expected_mass = 4.0 * 0.5 * 1.5;
        assert_relative_eq!(mass.mass, expected_mass, epsilon = 1e-10);

        let tol = f64::EPSILON + f64::EPSILON * center.coords.norm();
        assert_relative_eq!(mass.center.x, center.x, epsilon = 40.0 * tol.max(1e-10));
        assert_relative_eq!(mass.center.y, center.y, epsilon = 40.0 * tol.max(1e-10));

        let expected_inertia = expected_mass / 3.0 * (0.25 + 2.25)
            + expected_mass * center.coords.norm_squared();
        assert_relative_eq!(
            mass.inertia,
            expected_inertia,
            epsilon = 40.0 * (f64::EPSILON + f64::EPSILON * expected_inertia)
        );
    }

    #[test]
    fn test_point_containment() {
        let shape = PolygonShape::new_box(1.0, 1.0);
        let pose = Pose::from_position_angle(Point2::new(5.0, 0.0), 0.3);
        assert!(shape.test_point(&pose, &Point2::new(5.0, 0.0)));
        assert!(!shape.test_point(&pose, &Point2::new(7.0, 0.0)));
    }

    #[test]
    fn test_ray_cast_box() {
        let shape = PolygonShape::new_box(1.0, 1.0);
        let input = RayCastInput {
            p1: Point2::new(-3.0, 0.0),
            p2: Point2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let out = shape.ray_cast(&input, &Pose::identity()).expect("hit");
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_from_inside_misses() {
        let shape = PolygonShape::new_box(1.0, 1.0);
        let input = RayCastInput {
            p1: Point2::origin(),
            p2: Point2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        assert!(shape.ray_cast(&input, &Pose::identity()).is_none());
    }
}
