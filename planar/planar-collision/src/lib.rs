//! Geometric kernels for the planar 2D physics engine.
//!
//! This crate provides everything between raw shapes and the dynamics
//! pipeline:
//!
//! - [`DynamicTree`] / [`BroadPhase`] - fat-AABB spatial index and the
//!   moved-proxy pair generator
//! - [`distance`] / [`shape_cast`] - GJK closest points and casting
//! - [`time_of_impact`] - conservative advancement for swept shapes
//! - [`Manifold`] and the `collide_*` functions - contact generation for
//!   every supported shape pair
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      BroadPhase                           │
//! │  move buffer → tree queries → deduplicated proxy pairs   │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ candidate pairs
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │             collide_* / distance / time_of_impact        │
//! │  shape pair + poses → Manifold / closest points / TOI    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The dynamics crate owns contacts and solving; nothing in here keeps
//! state between calls except the tree and the warm-start caches the
//! caller threads through explicitly.

#![doc(html_root_url = "https://docs.rs/planar-collision/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
)]

mod broad_phase;
mod collide_circle;
mod collide_edge;
mod collide_polygon;
mod distance;
mod dynamic_tree;
mod manifold;
mod toi;

pub use broad_phase::BroadPhase;
pub use collide_circle::{collide_circles, collide_polygon_and_circle};
pub use collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
pub use collide_polygon::collide_polygons;
pub use distance::{
    distance, shape_cast, DistanceInput, DistanceOutput, DistanceProxy, ShapeCastInput,
    ShapeCastOutput, SimplexCache,
};
pub use dynamic_tree::{DynamicTree, NULL_NODE};
pub use manifold::{
    clip_segment_to_line, ClipVertex, ContactFeatureType, ContactId, Manifold, ManifoldKind,
    ManifoldPoint, WorldManifold,
};
pub use toi::{time_of_impact, ToiInput, ToiOutput, ToiState};

use planar_types::{Pose, Shape};

/// Exact overlap test between two shape children using GJK.
///
/// Unlike the broad phase's fat-AABB test this consults the actual
/// geometry (including radii).
#[must_use]
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Pose,
    xf_b: &Pose,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::from_shape(shape_a, index_a),
        proxy_b: DistanceProxy::from_shape(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * f64::EPSILON
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use planar_types::CircleShape;

    #[test]
    fn test_overlap_is_symmetric() {
        let a = Shape::from(CircleShape::with_radius(1.0));
        let b = Shape::from(CircleShape::with_radius(1.0));
        let xf_a = Pose::identity();
        let xf_b = Pose::from_position(Point2::new(1.5, 0.0));

        assert!(test_overlap(&a, 0, &b, 0, &xf_a, &xf_b));
        assert!(test_overlap(&b, 0, &a, 0, &xf_b, &xf_a));

        let far = Pose::from_position(Point2::new(5.0, 0.0));
        assert!(!test_overlap(&a, 0, &b, 0, &xf_a, &far));
    }
}
