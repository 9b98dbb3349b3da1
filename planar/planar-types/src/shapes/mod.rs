//! Collision shapes.
//!
//! Shapes are immutable local geometry: they carry no position or
//! velocity of their own and are placed in the world by the pose of the
//! body they are attached to. The engine models them as a sum type and
//! dispatches on the variant in the collision and mass routines.
//!
//! - [`CircleShape`]: a disc at a local offset.
//! - [`EdgeShape`]: a line segment, optionally one-sided with ghost
//!   vertices for smooth chain traversal.
//! - [`PolygonShape`]: a convex polygon of up to
//!   [`MAX_POLYGON_VERTICES`](crate::settings::MAX_POLYGON_VERTICES)
//!   vertices, CCW wound, with a small skin radius.
//! - [`ChainShape`]: a sequence of edges, open or looped, that
//!   decomposes into one-sided edge children.

mod chain;
mod circle;
mod edge;
mod polygon;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

use nalgebra::{Point2, Vector2};

use crate::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mass, center of mass, and rotational inertia of a shape at a given
/// density. The inertia is taken about the shape's local origin, not the
/// center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassData {
    /// Total mass in kg.
    pub mass: f64,
    /// Center of mass in shape-local coordinates.
    pub center: Vector2<f64>,
    /// Rotational inertia about the local origin (kg·m²).
    pub inertia: f64,
}

/// Discriminant for [`Shape`] variants. Narrow-phase dispatch keys on the
/// ordered pair of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeType {
    /// A circle.
    Circle,
    /// A line segment.
    Edge,
    /// A convex polygon.
    Polygon,
    /// A chain of edges.
    Chain,
}

/// A collision shape: local geometry shared by the collision kernels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// A circle.
    Circle(CircleShape),
    /// A line segment.
    Edge(EdgeShape),
    /// A convex polygon.
    Polygon(PolygonShape),
    /// A chain of edges.
    Chain(ChainShape),
}

impl Shape {
    /// Get the shape type discriminant.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Circle(_) => ShapeType::Circle,
            Self::Edge(_) => ShapeType::Edge,
            Self::Polygon(_) => ShapeType::Polygon,
            Self::Chain(_) => ShapeType::Chain,
        }
    }

    /// Get the skin radius. Circles use their full radius; polygons carry
    /// a thin skin; edges and chains a skin of [`POLYGON_RADIUS`].
    ///
    /// [`POLYGON_RADIUS`]: crate::settings::POLYGON_RADIUS
    #[must_use]
    pub fn radius(&self) -> f64 {
        match self {
            Self::Circle(c) => c.radius,
            Self::Edge(e) => e.radius(),
            Self::Polygon(p) => p.radius(),
            Self::Chain(c) => c.radius(),
        }
    }

    /// Number of child shapes seen by the broad phase. Chains have one
    /// child per edge; everything else has one.
    #[must_use]
    pub fn child_count(&self) -> usize {
        match self {
            Self::Circle(_) | Self::Edge(_) | Self::Polygon(_) => 1,
            Self::Chain(c) => c.child_count(),
        }
    }

    /// Compute the AABB of one child under the given pose.
    #[must_use]
    pub fn compute_aabb(&self, pose: &Pose, child_index: usize) -> Aabb {
        match self {
            Self::Circle(c) => c.compute_aabb(pose),
            Self::Edge(e) => e.compute_aabb(pose),
            Self::Polygon(p) => p.compute_aabb(pose),
            Self::Chain(c) => c.compute_aabb(pose, child_index),
        }
    }

    /// Compute mass properties at the given density.
    ///
    /// Edges and chains are massless boundary geometry and report zero
    /// mass regardless of density.
    #[must_use]
    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Self::Circle(c) => c.compute_mass(density),
            Self::Edge(e) => e.compute_mass(),
            Self::Polygon(p) => p.compute_mass(density),
            Self::Chain(c) => c.compute_mass(),
        }
    }

    /// Test whether a world point is inside the shape. Only solid shapes
    /// (circle, polygon) can contain points.
    #[must_use]
    pub fn test_point(&self, pose: &Pose, point: &Point2<f64>) -> bool {
        match self {
            Self::Circle(c) => c.test_point(pose, point),
            Self::Polygon(p) => p.test_point(pose, point),
            Self::Edge(_) | Self::Chain(_) => false,
        }
    }

    /// Cast a ray against one child of the shape in world space.
    #[must_use]
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        pose: &Pose,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Self::Circle(c) => c.ray_cast(input, pose),
            Self::Edge(e) => e.ray_cast(input, pose),
            Self::Polygon(p) => p.ray_cast(input, pose),
            Self::Chain(c) => c.child_edge(child_index).ray_cast(input, pose),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Self::Circle(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Self::Edge(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Self::Polygon(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Self::Chain(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_child_counts() {
        let circle = Shape::from(CircleShape::new(Point2::origin(), 1.0));
        assert_eq!(circle.child_count(), 1);

        let chain = ChainShape::create_chain(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(2.0, 1.0),
            ],
            None,
            None,
        )
        .expect("valid chain");
        assert_eq!(Shape::from(chain).child_count(), 2);
    }

    #[test]
    fn test_massless_boundary_shapes() {
        let edge = Shape::from(EdgeShape::new(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
        ));
        let mass = edge.compute_mass(5.0);
        assert_eq!(mass.mass, 0.0);
        assert_eq!(mass.inertia, 0.0);
    }

    #[test]
    fn test_dispatch_type() {
        let polygon = PolygonShape::new_box(1.0, 1.0);
        assert_eq!(Shape::from(polygon).shape_type(), ShapeType::Polygon);
    }
}
