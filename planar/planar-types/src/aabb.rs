//! Axis-aligned bounding boxes and ray-cast query types.

use nalgebra::{Point2, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Input for a ray cast: a segment from `p1` to `p2`, optionally clipped
/// to `p1 + max_fraction * (p2 - p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayCastInput {
    /// Segment start point.
    pub p1: Point2<f64>,
    /// Segment end point.
    pub p2: Point2<f64>,
    /// Fraction of the segment to consider, usually 1.
    pub max_fraction: f64,
}

/// Result of a ray cast hit: the surface normal at the hit point and the
/// fraction along the segment where it occurred.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayCastOutput {
    /// Outward surface normal at the point of first intersection.
    pub normal: Vector2<f64>,
    /// Fraction in `[0, max_fraction]` along the segment.
    pub fraction: f64,
}

/// An axis-aligned bounding box.
///
/// Invariant: `min ≤ max` componentwise. Construction from center and
/// half-extents keeps this automatically; `new` debug-asserts it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point2<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point2<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub fn new(min: Point2<f64>, max: Point2<f64>) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y);
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point2<f64>, half_extents: Vector2<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Get the center of the box.
    #[must_use]
    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Get the half-extents of the box.
    #[must_use]
    pub fn extents(&self) -> Vector2<f64> {
        0.5 * (self.max - self.min)
    }

    /// Get the perimeter of the box.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    /// Check if this AABB overlaps with another AABB.
    ///
    /// Overlap is symmetric and reflexive on non-empty boxes; touching
    /// boundaries count as overlapping.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Check if this AABB fully contains another.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Grow this AABB to also cover `other`.
    pub fn combine(&mut self, other: &Self) {
        self.min = Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y));
        self.max = Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y));
    }

    /// The smallest AABB covering both inputs.
    #[must_use]
    pub fn combined(a: &Self, b: &Self) -> Self {
        let mut out = *a;
        out.combine(b);
        out
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: Point2::new(self.min.x - margin, self.min.y - margin),
            max: Point2::new(self.max.x + margin, self.max.y + margin),
        }
    }

    /// Translate the box.
    #[must_use]
    pub fn translated(&self, v: Vector2<f64>) -> Self {
        Self {
            min: self.min + v,
            max: self.max + v,
        }
    }

    /// Cast a ray against the box using the slab method.
    ///
    /// Returns the entry fraction and normal, or `None` when the segment
    /// misses, starts past `max_fraction`, or runs parallel outside a slab.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let mut normal = Vector2::zeros();

        for i in 0..2 {
            if d[i].abs() < f64::EPSILON {
                // Parallel to this slab.
                if p[i] < self.min[i] || self.max[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (self.min[i] - p[i]) * inv_d;
                let mut t2 = (self.max[i] - p[i]) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }

                if t1 > tmin {
                    normal = Vector2::zeros();
                    normal[i] = s;
                    tmin = t1;
                }
                tmax = tmax.min(t2);

                if tmin > tmax {
                    return None;
                }
            }
        }

        // The intersection must lie inside the requested segment span.
        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }

    /// Check if the box contains `NaN` or `Inf` values or is inverted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0
            && d.y >= 0.0
            && self.min.coords.iter().all(|x| x.is_finite())
            && self.max.coords.iter().all(|x| x.is_finite())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Point2::origin(),
            max: Point2::origin(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_overlaps_symmetric_reflexive() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let b = Aabb::from_center(Point2::new(1.5, 0.0), Vector2::new(1.0, 1.0));
        let c = Aabb::from_center(Point2::new(5.0, 0.0), Vector2::new(1.0, 1.0));

        assert!(a.overlaps(&a), "overlap is reflexive");
        assert!(a.overlaps(&b) && b.overlaps(&a), "overlap is symmetric");
        assert!(!a.overlaps(&c) && !c.overlaps(&a));
    }

    #[test]
    fn test_combine_contains_both() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let b = Aabb::from_center(Point2::new(3.0, -2.0), Vector2::new(0.5, 0.5));
        let c = Aabb::combined(&a, &b);
        assert!(c.contains(&a));
        assert!(c.contains(&b));
    }

    #[test]
    fn test_perimeter() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(2.0, 1.0));
        assert_relative_eq!(a.perimeter(), 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_hit() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Point2::new(-3.0, 0.0),
            p2: Point2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let out = a.ray_cast(&input).expect("ray should hit");
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_miss() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Point2::new(-3.0, 5.0),
            p2: Point2::new(3.0, 5.0),
            max_fraction: 1.0,
        };
        assert!(a.ray_cast(&input).is_none());
    }

    #[test]
    fn test_ray_cast_respects_max_fraction() {
        let a = Aabb::from_center(Point2::new(10.0, 0.0), Vector2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Point2::origin(),
            p2: Point2::new(20.0, 0.0),
            max_fraction: 0.1,
        };
        assert!(a.ray_cast(&input).is_none(), "hit lies past max_fraction");
    }

    #[test]
    fn test_ray_cast_starting_inside() {
        // Slab entry time is negative when starting inside; the cast
        // reports a miss, matching the tree walk's expectations.
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Point2::origin(),
            p2: Point2::new(5.0, 0.0),
            max_fraction: 1.0,
        };
        assert!(a.ray_cast(&input).is_none());
    }
}
