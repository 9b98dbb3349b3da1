//! Edge shape: a line segment, optionally one-sided.

use nalgebra::{Point2, Vector2};

use crate::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Pose;
use crate::settings::POLYGON_RADIUS;
use crate::shapes::MassData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A line segment between two vertices.
///
/// Edges are boundary geometry: massless, with a thin skin radius. An
/// edge may carry ghost vertices (`v0` before `v1`, `v3` after `v2`) that
/// describe its neighbors in a chain. One-sided edges use the ghosts to
/// suppress ghost collisions (internal hits against chain seams) and only
/// collide on the side of the normal `(e.y, -e.x)`, the right side when
/// looking from `v1` at `v2`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeShape {
    /// First endpoint.
    pub v1: Point2<f64>,
    /// Second endpoint.
    pub v2: Point2<f64>,
    /// Ghost vertex preceding `v1`, if part of a chain.
    pub v0: Option<Point2<f64>>,
    /// Ghost vertex following `v2`, if part of a chain.
    pub v3: Option<Point2<f64>>,
    /// Whether collision is restricted to the left side of `v1 → v2`.
    pub one_sided: bool,
}

impl EdgeShape {
    /// Create a two-sided edge.
    #[must_use]
    pub const fn new(v1: Point2<f64>, v2: Point2<f64>) -> Self {
        Self {
            v1,
            v2,
            v0: None,
            v3: None,
            one_sided: false,
        }
    }

    /// Create a one-sided edge with ghost vertices.
    ///
    /// Collisions approaching against the edge normal (from the left of
    /// `v1 → v2`) are skipped.
    #[must_use]
    pub const fn new_one_sided(
        v0: Point2<f64>,
        v1: Point2<f64>,
        v2: Point2<f64>,
        v3: Point2<f64>,
    ) -> Self {
        Self {
            v1,
            v2,
            v0: Some(v0),
            v3: Some(v3),
            one_sided: true,
        }
    }

    /// Skin radius of the edge.
    #[must_use]
    pub fn radius(&self) -> f64 {
        POLYGON_RADIUS
    }

    /// Compute the world-space AABB under the given pose.
    #[must_use]
    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        let p1 = pose.transform_point(&self.v1);
        let p2 = pose.transform_point(&self.v2);

        let min = Point2::new(p1.x.min(p2.x), p1.y.min(p2.y));
        let max = Point2::new(p1.x.max(p2.x), p1.y.max(p2.y));
        Aabb::new(min, max).expanded(self.radius())
    }

    /// Mass properties: edges are massless.
    #[must_use]
    pub fn compute_mass(&self) -> MassData {
        MassData {
            mass: 0.0,
            center: 0.5 * (self.v1.coords + self.v2.coords),
            inertia: 0.0,
        }
    }

    /// Cast a ray against the edge.
    ///
    /// The reported normal points against the incoming ray. One-sided
    /// edges only report front-face hits.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        // Work in the edge's local frame.
        let p1 = pose.inverse_transform_point(&input.p1);
        let p2 = pose.inverse_transform_point(&input.p2);
        let d = p2 - p1;

        let e = self.v2 - self.v1;
        // Normal points to the right, looking from v1 at v2.
        let normal = Vector2::new(e.y, -e.x).normalize();

        // Solve p1 + t * d on the edge plane: dot(normal, v1 - (p1 + t*d)) = 0.
        let numerator = normal.dot(&(self.v1 - p1));
        if self.one_sided && numerator > 0.0 {
            return None;
        }

        let denominator = normal.dot(&d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + t * d;

        // The hit must lie between the endpoints.
        let rr = e.norm_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - self.v1).dot(&e) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let world_normal = if numerator > 0.0 {
            -pose.transform_vector(&normal)
        } else {
            pose.transform_vector(&normal)
        };

        Some(RayCastOutput {
            normal: world_normal,
            fraction: t,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_includes_skin() {
        let edge = EdgeShape::new(Point2::new(0.0, 0.0), Point2::new(2.0, 0.0));
        let aabb = edge.compute_aabb(&Pose::identity());
        assert!(aabb.min.y < 0.0);
        assert!(aabb.max.x > 2.0);
    }

    #[test]
    fn test_ray_cast_hits_segment() {
        let edge = EdgeShape::new(Point2::new(-1.0, 0.0), Point2::new(1.0, 0.0));
        let input = RayCastInput {
            p1: Point2::new(0.0, 2.0),
            p2: Point2::new(0.0, -2.0),
            max_fraction: 1.0,
        };
        let out = edge.ray_cast(&input, &Pose::identity()).expect("hit");
        assert_relative_eq!(out.fraction, 0.5, epsilon = 1e-12);
        assert_relative_eq!(out.normal.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_misses_past_endpoint() {
        let edge = EdgeShape::new(Point2::new(-1.0, 0.0), Point2::new(1.0, 0.0));
        let input = RayCastInput {
            p1: Point2::new(3.0, 2.0),
            p2: Point2::new(3.0, -2.0),
            max_fraction: 1.0,
        };
        assert!(edge.ray_cast(&input, &Pose::identity()).is_none());
    }

    #[test]
    fn test_one_sided_back_face_skipped() {
        let edge = EdgeShape::new_one_sided(
            Point2::new(-2.0, 0.0),
            Point2::new(-1.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        );
        // Edge runs +x, so its normal (e.y, -e.x) = (0, -1) points down and
        // the collidable side is below. A ray from above hits the back face.
        let from_above = RayCastInput {
            p1: Point2::new(0.0, 2.0),
            p2: Point2::new(0.0, -2.0),
            max_fraction: 1.0,
        };
        assert!(edge.ray_cast(&from_above, &Pose::identity()).is_none());

        let from_below = RayCastInput {
            p1: Point2::new(0.0, -2.0),
            p2: Point2::new(0.0, 2.0),
            max_fraction: 1.0,
        };
        assert!(edge.ray_cast(&from_below, &Pose::identity()).is_some());
    }
}
