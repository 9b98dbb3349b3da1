//! Chain shape: a sequence of one-sided edges.

use nalgebra::{Point2, Vector2};

use crate::aabb::Aabb;
use crate::error::PhysicsError;
use crate::math::Pose;
use crate::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::shapes::{EdgeShape, MassData};
use crate::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An ordered sequence of vertices forming connected edges.
///
/// Chains decompose into one child [`EdgeShape`] per segment. Each child
/// carries its neighbors as ghost vertices so circles and polygons slide
/// across the seams without catching on interior endpoints.
///
/// A chain is either a loop (closed, last vertex connects back to the
/// first) or open, in which case optional `prev_vertex` / `next_vertex`
/// ghosts describe the continuation beyond the ends.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainShape {
    vertices: Vec<Point2<f64>>,
    prev_vertex: Option<Point2<f64>>,
    next_vertex: Option<Point2<f64>>,
    is_loop: bool,
}

impl ChainShape {
    /// Create a closed loop. The closing segment from the last vertex
    /// back to the first is added automatically.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfig`] for fewer than 3 vertices
    /// or consecutive vertices closer than half a [`LINEAR_SLOP`].
    pub fn create_loop(vertices: &[Point2<f64>]) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::invalid_config(
                "chain loop needs at least 3 vertices",
            ));
        }
        Self::validate_spacing(vertices, true)?;

        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex: None,
            next_vertex: None,
            is_loop: true,
        })
    }

    /// Create an open chain with optional ghost continuation vertices.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfig`] for fewer than 2 vertices
    /// or consecutive vertices closer than half a [`LINEAR_SLOP`].
    pub fn create_chain(
        vertices: &[Point2<f64>],
        prev_vertex: Option<Point2<f64>>,
        next_vertex: Option<Point2<f64>>,
    ) -> Result<Self> {
        if vertices.len() < 2 {
            return Err(PhysicsError::invalid_config(
                "chain needs at least 2 vertices",
            ));
        }
        Self::validate_spacing(vertices, false)?;

        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex,
            next_vertex,
            is_loop: false,
        })
    }

    fn validate_spacing(vertices: &[Point2<f64>], closed: bool) -> Result<()> {
        let min_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let end = if closed {
            vertices.len()
        } else {
            vertices.len() - 1
        };
        for i in 0..end {
            let j = (i + 1) % vertices.len();
            if (vertices[j] - vertices[i]).norm_squared() <= min_sq {
                return Err(PhysicsError::invalid_config(
                    "chain vertices are too close together",
                ));
            }
        }
        Ok(())
    }

    /// The chain vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    /// Whether the chain closes back on itself.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// Skin radius of every child edge.
    #[must_use]
    pub fn radius(&self) -> f64 {
        POLYGON_RADIUS
    }

    /// Number of edge children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// Extract one child as a one-sided edge with ghost vertices.
    #[must_use]
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());
        let n = self.vertices.len();

        let v1 = self.vertices[index];
        let v2 = self.vertices[(index + 1) % n];

        let v0 = if index > 0 {
            Some(self.vertices[index - 1])
        } else if self.is_loop {
            Some(self.vertices[n - 1])
        } else {
            self.prev_vertex
        };

        let v3 = if index + 2 < n {
            Some(self.vertices[index + 2])
        } else if self.is_loop {
            Some(self.vertices[(index + 2) % n])
        } else {
            self.next_vertex
        };

        EdgeShape {
            v1,
            v2,
            v0,
            v3,
            one_sided: true,
        }
    }

    /// Compute the world-space AABB of one child edge.
    #[must_use]
    pub fn compute_aabb(&self, pose: &Pose, child_index: usize) -> Aabb {
        self.child_edge(child_index).compute_aabb(pose)
    }

    /// Mass properties: chains are massless boundary geometry.
    #[must_use]
    pub fn compute_mass(&self) -> MassData {
        MassData {
            mass: 0.0,
            center: Vector2::zeros(),
            inertia: 0.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn square_loop() -> ChainShape {
        ChainShape::create_loop(&[
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(0.0, 4.0),
        ])
        .expect("valid loop")
    }

    #[test]
    fn test_loop_child_count() {
        assert_eq!(square_loop().child_count(), 4);
    }

    #[test]
    fn test_open_chain_child_count() {
        let chain = ChainShape::create_chain(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(2.0, 0.5),
            ],
            None,
            None,
        )
        .expect("valid chain");
        assert_eq!(chain.child_count(), 2);
    }

    #[test]
    fn test_loop_ghost_vertices_wrap() {
        let chain = square_loop();

        let first = chain.child_edge(0);
        assert_eq!(first.v0, Some(Point2::new(0.0, 4.0)));
        assert_eq!(first.v3, Some(Point2::new(4.0, 4.0)));
        assert!(first.one_sided);

        let last = chain.child_edge(3);
        assert_eq!(last.v2, Point2::new(0.0, 0.0));
        assert_eq!(last.v3, Some(Point2::new(4.0, 0.0)));
    }

    #[test]
    fn test_open_chain_end_ghosts() {
        let chain = ChainShape::create_chain(
            &[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
            Some(Point2::new(-1.0, 0.5)),
            Some(Point2::new(2.0, 0.5)),
        )
        .expect("valid chain");

        let edge = chain.child_edge(0);
        assert_eq!(edge.v0, Some(Point2::new(-1.0, 0.5)));
        assert_eq!(edge.v3, Some(Point2::new(2.0, 0.5)));
    }

    #[test]
    fn test_rejects_tiny_segments() {
        let result = ChainShape::create_chain(
            &[Point2::new(0.0, 0.0), Point2::new(1e-4, 0.0)],
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_short_loop() {
        let result = ChainShape::create_loop(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]);
        assert!(result.is_err());
    }
}
