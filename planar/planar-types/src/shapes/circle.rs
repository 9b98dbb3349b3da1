//! Circle shape.

use nalgebra::{Point2, Vector2};

use crate::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Pose;
use crate::shapes::MassData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A circle at a local offset.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CircleShape {
    /// Center in shape-local coordinates.
    pub position: Point2<f64>,
    /// Radius in meters.
    pub radius: f64,
}

impl CircleShape {
    /// Create a circle with the given local center and radius.
    #[must_use]
    pub const fn new(position: Point2<f64>, radius: f64) -> Self {
        Self { position, radius }
    }

    /// Create a circle centered at the local origin.
    #[must_use]
    pub fn with_radius(radius: f64) -> Self {
        Self {
            position: Point2::origin(),
            radius,
        }
    }

    /// Compute the world-space AABB under the given pose.
    #[must_use]
    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        let center = pose.transform_point(&self.position);
        Aabb::from_center(center, Vector2::new(self.radius, self.radius))
    }

    /// Compute mass properties at the given density.
    ///
    /// Inertia about the local origin includes the parallel-axis term for
    /// the offset center.
    #[must_use]
    pub fn compute_mass(&self, density: f64) -> MassData {
        let mass = density * std::f64::consts::PI * self.radius * self.radius;
        let center = self.position.coords;
        // I about origin = I_com + m * |offset|².
        let inertia = mass * (0.5 * self.radius * self.radius + center.norm_squared());
        MassData {
            mass,
            center,
            inertia,
        }
    }

    /// Test whether a world point lies inside the circle.
    #[must_use]
    pub fn test_point(&self, pose: &Pose, point: &Point2<f64>) -> bool {
        let center = pose.transform_point(&self.position);
        (point - center).norm_squared() <= self.radius * self.radius
    }

    /// Cast a ray against the circle.
    ///
    /// Solves the quadratic for the entry intersection; rays starting
    /// inside report a miss.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        let position = pose.transform_point(&self.position);
        let s = input.p1 - position;
        let b = s.norm_squared() - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(&r);
        let rr = r.norm_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < f64::EPSILON {
            return None;
        }

        let mut t = -(c + sigma.sqrt());
        if 0.0 <= t && t <= input.max_fraction * rr {
            t /= rr;
            let normal = (s + t * r).normalize();
            return Some(RayCastOutput {
                normal,
                fraction: t,
            });
        }

        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mass_at_origin() {
        let circle = CircleShape::with_radius(2.0);
        let mass = circle.compute_mass(1.0);
        let expected = std::f64::consts::PI * 4.0;
        assert_relative_eq!(mass.mass, expected, epsilon = 1e-12);
        assert_relative_eq!(mass.inertia, expected * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mass_parallel_axis() {
        let offset = CircleShape::new(Point2::new(3.0, 0.0), 1.0);
        let centered = CircleShape::with_radius(1.0);
        let m_off = offset.compute_mass(1.0);
        let m_cen = centered.compute_mass(1.0);
        assert_relative_eq!(
            m_off.inertia,
            m_cen.inertia + m_off.mass * 9.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_point_containment() {
        let circle = CircleShape::with_radius(1.0);
        let pose = Pose::from_position(Point2::new(5.0, 0.0));
        assert!(circle.test_point(&pose, &Point2::new(5.5, 0.0)));
        assert!(!circle.test_point(&pose, &Point2::new(6.5, 0.0)));
    }

    #[test]
    fn test_ray_cast_head_on() {
        let circle = CircleShape::with_radius(1.0);
        let pose = Pose::identity();
        let input = RayCastInput {
            p1: Point2::new(-3.0, 0.0),
            p2: Point2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let out = circle.ray_cast(&input, &pose).expect("should hit");
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_tangent_miss() {
        let circle = CircleShape::with_radius(1.0);
        let pose = Pose::identity();
        let input = RayCastInput {
            p1: Point2::new(-3.0, 1.5),
            p2: Point2::new(3.0, 1.5),
            max_fraction: 1.0,
        };
        assert!(circle.ray_cast(&input, &pose).is_none());
    }
}
