//! Core data types for the planar 2D physics engine.
//!
//! This crate provides the foundational types the collision and dynamics
//! crates build on:
//!
//! - [`Pose`], [`Sweep`] - rigid transforms and swept motion
//! - [`Aabb`], [`RayCastInput`], [`RayCastOutput`] - bounds and queries
//! - [`Shape`] and its variants - immutable local collision geometry
//! - [`Filter`] - category/mask/group collision filtering
//! - [`settings`] - the solver and broad-phase tuning constants
//! - [`PhysicsError`] - precondition errors for the construction surface
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no stepping, no collision
//! response, no world state. They're the common language between the
//! broad/narrow phase kernels (`planar-collision`) and the simulation
//! pipeline (`planar-dynamics`).
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up
//! - Angles counter-clockwise, in radians
//! - Right-handed scalar cross: `cross(x, y) = 1`
//!
//! # Example
//!
//! ```
//! use planar_types::{Pose, PolygonShape, Shape};
//! use nalgebra::Point2;
//!
//! let shape = Shape::from(PolygonShape::new_box(0.5, 0.5));
//! let pose = Pose::from_position(Point2::new(2.0, 3.0));
//! let aabb = shape.compute_aabb(&pose, 0);
//! assert!(aabb.min.x < 2.0 && aabb.max.x > 2.0);
//! ```

#![doc(html_root_url = "https://docs.rs/planar-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod aabb;
mod error;
mod filter;
mod math;
pub mod settings;
mod shapes;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use error::PhysicsError;
pub use filter::Filter;
pub use math::{cross, cross_sv, cross_vs, solve22, solve33, Pose, Sweep};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};

// Re-export math types for convenience
pub use nalgebra::{Matrix2, Matrix3, Point2, UnitComplex, Vector2, Vector3};

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_pose_roundtrip() {
        let shape = Shape::from(CircleShape::new(Point2::new(1.0, 0.0), 0.5));
        let pose = Pose::from_position_angle(Point2::new(0.0, 2.0), std::f64::consts::FRAC_PI_2);

        // The circle's world center is the pose applied to its local offset.
        let aabb = shape.compute_aabb(&pose, 0);
        let center = aabb.center();
        assert!((center.x - 0.0).abs() < 1e-12);
        assert!((center.y - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_result_alias() {
        fn build() -> Result<PolygonShape> {
            PolygonShape::new(&[
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
            ])
        }
        assert!(build().is_ok());
    }
}
