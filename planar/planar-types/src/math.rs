//! 2D rigid-transform math built on nalgebra.
//!
//! This module provides the planar analogues of the usual rigid-body
//! kit: [`Pose`] (position + rotation), [`Sweep`] (motion of a body's
//! center of mass over one step, used for time of impact), scalar cross
//! products, and small linear solves that degrade gracefully on singular
//! systems.
//!
//! # Example
//!
//! ```
//! use planar_types::Pose;
//! use nalgebra::{Point2, Vector2};
//!
//! let pose = Pose::from_position(Point2::new(1.0, 2.0));
//! let world = pose.transform_point(&Point2::new(1.0, 0.0));
//! assert_eq!(world, Point2::new(2.0, 2.0));
//! ```

use nalgebra::{Matrix2, Matrix3, Point2, UnitComplex, Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scalar 2D cross product: `a × b`.
#[must_use]
pub fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (out-of-plane) and a vector: `s × v`.
#[must_use]
pub fn cross_sv(s: f64, v: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-s * v.y, s * v.x)
}

/// Cross product of a vector and a scalar: `v × s`.
#[must_use]
pub fn cross_vs(v: Vector2<f64>, s: f64) -> Vector2<f64> {
    Vector2::new(s * v.y, -s * v.x)
}

/// Solve `A x = b` for a 2×2 system by Cramer's rule.
///
/// Returns the zero vector when the system is singular; callers in the
/// solver treat that as "no impulse" rather than an error.
#[must_use]
pub fn solve22(a: &Matrix2<f64>, b: Vector2<f64>) -> Vector2<f64> {
    let mut det = a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)];
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vector2::new(
        det * (a[(1, 1)] * b.x - a[(0, 1)] * b.y),
        det * (a[(0, 0)] * b.y - a[(1, 0)] * b.x),
    )
}

/// Solve `A x = b` for a symmetric 3×3 system by Cramer's rule.
///
/// Returns the zero vector when the system is singular.
#[must_use]
pub fn solve33(a: &Matrix3<f64>, b: Vector3<f64>) -> Vector3<f64> {
    let ex = a.column(0).into_owned();
    let ey = a.column(1).into_owned();
    let ez = a.column(2).into_owned();

    let mut det = ex.dot(&ey.cross(&ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vector3::new(
        det * b.dot(&ey.cross(&ez)),
        det * ex.dot(&b.cross(&ez)),
        det * ex.dot(&ey.cross(&b)),
    )
}

/// Position and orientation of a rigid body in the plane.
///
/// The 2D counterpart of a pose: a position plus a unit-complex rotation.
///
/// # Example
///
/// ```
/// use planar_types::Pose;
/// use nalgebra::{Point2, UnitComplex, Vector2};
///
/// let pose = Pose::new(Point2::new(0.0, 1.0), UnitComplex::new(std::f64::consts::FRAC_PI_2));
/// let v = pose.transform_vector(&Vector2::x());
/// assert!((v.y - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point2<f64>,
    /// Orientation as a unit complex number.
    pub rotation: UnitComplex<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn new(position: Point2<f64>, rotation: UnitComplex<f64>) -> Self {
        Self { position, rotation }
    }

    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point2::origin(),
            rotation: UnitComplex::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point2<f64>) -> Self {
        Self {
            position,
            rotation: UnitComplex::identity(),
        }
    }

    /// Create a pose from position and angle in radians.
    #[must_use]
    pub fn from_position_angle(position: Point2<f64>, angle: f64) -> Self {
        Self {
            position,
            rotation: UnitComplex::new(angle),
        }
    }

    /// Get the rotation angle in radians.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point2<f64>) -> Point2<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point2<f64>) -> Point2<f64> {
        Point2::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector2<f64>) -> Vector2<f64> {
        self.rotation.inverse() * world
    }

    /// Compute the inverse pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: Point2::from(-(inv_rotation * self.position.coords)),
            rotation: inv_rotation,
        }
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Compute `self⁻¹ * other`, the pose of `other` in `self`'s frame.
    #[must_use]
    pub fn inverse_compose(&self, other: &Self) -> Self {
        Self {
            position: self.inverse_transform_point(&other.position),
            rotation: self.rotation.inverse() * other.rotation,
        }
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.complex().re.is_finite()
            && self.rotation.complex().im.is_finite()
    }
}

/// Motion of a body's center of mass over one step.
///
/// A sweep interpolates between two center-of-mass transforms: `(c0, a0)`
/// at time `alpha0` and `(c, a)` at the end of the step. The time of
/// impact solver samples poses at fractions in between.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sweep {
    /// Center of mass offset in body-local coordinates.
    pub local_center: Vector2<f64>,
    /// Center of mass world position at time `alpha0`.
    pub c0: Vector2<f64>,
    /// Center of mass world position at the end of the step.
    pub c: Vector2<f64>,
    /// World angle at time `alpha0`.
    pub a0: f64,
    /// World angle at the end of the step.
    pub a: f64,
    /// Fraction of the current step already consumed by TOI events.
    /// Must stay in `[0, 1)`.
    pub alpha0: f64,
}

impl Sweep {
    /// Interpolate the body-origin pose at `beta ∈ [0, 1]`.
    ///
    /// `beta = 0` yields the pose at `(c0, a0)`, `beta = 1` the pose at
    /// `(c, a)`. The returned pose is shifted from the center of mass back
    /// to the body origin.
    #[must_use]
    pub fn pose_at(&self, beta: f64) -> Pose {
        let center = self.c0.lerp(&self.c, beta);
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let rotation = UnitComplex::new(angle);
        Pose {
            position: Point2::from(center - rotation * self.local_center),
            rotation,
        }
    }

    /// Advance the baseline to `alpha`, keeping the endpoint fixed.
    ///
    /// Used by the TOI solver to move a body's sweep start to the impact
    /// time before resolving.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += beta * (self.c - self.c0);
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles to keep `a0` within `[-π, π]`.
    ///
    /// Both endpoints shift by the same multiple of 2π so the
    /// interpolation is unchanged.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f64::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }

    /// Check if the sweep contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.local_center.iter().all(|x| x.is_finite())
            && self.c0.iter().all(|x| x.is_finite())
            && self.c.iter().all(|x| x.is_finite())
            && self.a0.is_finite()
            && self.a.is_finite()
            && self.alpha0.is_finite()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cross_identities() {
        let a = Vector2::new(1.0, 2.0);
        let b = Vector2::new(3.0, 4.0);
        assert_relative_eq!(cross(a, b), -cross(b, a), epsilon = 1e-12);

        // s × v is perpendicular to v and scales with s.
        let v = Vector2::new(2.0, 0.0);
        let r = cross_sv(3.0, v);
        assert_relative_eq!(r.dot(&v), 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.norm(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve22() {
        let a = Matrix2::new(2.0, 1.0, 1.0, 3.0);
        let b = Vector2::new(5.0, 10.0);
        let x = solve22(&a, b);
        assert_relative_eq!(a * x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_solve22_singular_returns_zero() {
        let a = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let x = solve22(&a, Vector2::new(1.0, 1.0));
        assert_relative_eq!(x, Vector2::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_solve33() {
        let a = Matrix3::new(4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0);
        let b = Vector3::new(1.0, 2.0, 3.0);
        let x = solve33(&a, b);
        assert_relative_eq!(a * x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_roundtrip() {
        let pose = Pose::from_position_angle(Point2::new(1.0, -2.0), 0.7);
        let p = Point2::new(3.0, 4.0);
        let back = pose.inverse_transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back.coords, p.coords, epsilon = 1e-12);

        let composed = pose.compose(&pose.inverse());
        assert_relative_eq!(composed.position.coords, Vector2::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_endpoints() {
        // With zero local center the pose positions are the sweep centers.
        let sweep = Sweep {
            local_center: Vector2::zeros(),
            c0: Vector2::new(-2.0, 4.0),
            c: Vector2::new(3.0, 8.0),
            a0: 0.5,
            a: 5.0,
            alpha0: 0.0,
        };

        let start = sweep.pose_at(0.0);
        assert_relative_eq!(start.position.coords, sweep.c0, epsilon = 1e-12);
        assert_relative_eq!(start.rotation.complex().re, 0.5_f64.cos(), epsilon = 1e-12);

        let end = sweep.pose_at(1.0);
        assert_relative_eq!(end.position.coords, sweep.c, epsilon = 1e-12);
        assert_relative_eq!(end.rotation.complex().re, 5.0_f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_local_center_offset() {
        let sweep = Sweep {
            local_center: Vector2::new(1.0, 0.0),
            c0: Vector2::zeros(),
            c: Vector2::zeros(),
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        };
        // Body origin sits one unit behind the center of mass.
        let pose = sweep.pose_at(0.0);
        assert_relative_eq!(pose.position.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_advance() {
        let mut sweep = Sweep {
            local_center: Vector2::zeros(),
            c0: Vector2::zeros(),
            c: Vector2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        sweep.advance(0.5);
        assert_relative_eq!(sweep.c0.x, 5.0, epsilon = 1e-12);
        assert_relative_eq!(sweep.a0, 0.5, epsilon = 1e-12);
        assert_relative_eq!(sweep.alpha0, 0.5, epsilon = 1e-12);
        // Endpoint unchanged.
        assert_relative_eq!(sweep.c.x, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_normalize() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 8.0,
            ..Sweep::default()
        };
        sweep.normalize();
        let two_pi = 2.0 * std::f64::consts::PI;
        assert!(sweep.a0 >= 0.0 && sweep.a0 < two_pi);
        assert_relative_eq!(sweep.a - sweep.a0, 1.0, epsilon = 1e-12);
    }
}
