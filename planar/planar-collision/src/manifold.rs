//! Contact manifolds and the clipping primitive that builds them.
//!
//! A manifold describes up to two contact points between two shapes in
//! the local frame of the reference shape, so it stays valid while the
//! bodies move slightly between narrow-phase updates. Each point carries
//! a [`ContactId`] naming the features that produced it; ids are stable
//! across frames, which is what lets the solver carry impulses over
//! (warm starting).
//!
//! [`WorldManifold`] converts a manifold into world-space points and a
//! shared normal for the solver and for user callbacks.

use nalgebra::{Point2, Vector2};
use planar_types::settings::MAX_MANIFOLD_POINTS;
use planar_types::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of contact feature a manifold point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactFeatureType {
    /// A polygon/edge vertex.
    #[default]
    Vertex,
    /// A polygon/edge face.
    Face,
}

/// Identifies the pair of features that produced a contact point.
///
/// Two points with equal ids across frames are the same physical contact,
/// so the solver may transfer the accumulated impulse between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactId {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    /// Feature type on shape A.
    pub type_a: ContactFeatureType,
    /// Feature type on shape B.
    pub type_b: ContactFeatureType,
}

impl ContactId {
    /// Create an id from explicit features.
    #[must_use]
    pub const fn new(
        index_a: u8,
        index_b: u8,
        type_a: ContactFeatureType,
        type_b: ContactFeatureType,
    ) -> Self {
        Self {
            index_a,
            index_b,
            type_a,
            type_b,
        }
    }

    /// Pack the feature quadruple into a single comparison key.
    #[must_use]
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// The id with shape roles A and B exchanged.
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// One contact point inside a manifold.
///
/// The interpretation of `local_point` depends on the manifold kind:
/// circle center of B for `Circles`, clip point on B for `FaceA`, clip
/// point on A for `FaceB`.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifoldPoint {
    /// Contact point in the frame the manifold kind dictates.
    pub local_point: Point2<f64>,
    /// Accumulated normal impulse, carried across frames.
    pub normal_impulse: f64,
    /// Accumulated tangent impulse, carried across frames.
    pub tangent_impulse: f64,
    /// Feature id for cross-frame matching.
    pub id: ContactId,
}

/// How a manifold's normal and points are anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ManifoldKind {
    /// Two circles; normal runs between the centers.
    #[default]
    Circles,
    /// Normal and reference face belong to shape A.
    FaceA,
    /// Normal and reference face belong to shape B.
    FaceB,
}

/// Contact data between two shapes in the reference shape's local frame.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Manifold {
    /// Contact points; only the first `point_count` are meaningful.
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Normal in the reference shape's frame (unused for `Circles`).
    pub local_normal: Vector2<f64>,
    /// Anchor point in the reference shape's frame.
    pub local_point: Point2<f64>,
    /// Which shape owns the reference frame.
    pub kind: ManifoldKind,
    /// Number of valid points: 0, 1 or 2.
    pub point_count: usize,
}

/// A manifold evaluated in world coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldManifold {
    /// Shared contact normal, pointing from A to B.
    pub normal: Vector2<f64>,
    /// World contact points (midway between the surfaces).
    pub points: [Point2<f64>; MAX_MANIFOLD_POINTS],
    /// Signed surface separations; negative means penetration.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Evaluate a manifold at the given poses and shape radii.
    #[must_use]
    pub fn initialize(
        manifold: &Manifold,
        xf_a: &Pose,
        radius_a: f64,
        xf_b: &Pose,
        radius_b: f64,
    ) -> Self {
        let mut out = Self::default();
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.kind {
            ManifoldKind::Circles => {
                out.normal = Vector2::new(1.0, 0.0);
                let point_a = xf_a.transform_point(&manifold.local_point);
                let point_b = xf_b.transform_point(&manifold.points[0].local_point);
                if (point_a - point_b).norm_squared() > f64::EPSILON * f64::EPSILON {
                    out.normal = (point_b - point_a).normalize();
                }

                let c_a = point_a + radius_a * out.normal;
                let c_b = point_b - radius_b * out.normal;
                out.points[0] = nalgebra::center(&c_a, &c_b);
                out.separations[0] = (c_b - c_a).dot(&out.normal);
            }
            ManifoldKind::FaceA => {
                out.normal = xf_a.transform_vector(&manifold.local_normal);
                let plane_point = xf_a.transform_point(&manifold.local_point);

                for i in 0..manifold.point_count {
                    let clip_point = xf_b.transform_point(&manifold.points[i].local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(&out.normal)) * out.normal;
                    let c_b = clip_point - radius_b * out.normal;
                    out.points[i] = nalgebra::center(&c_a, &c_b);
                    out.separations[i] = (c_b - c_a).dot(&out.normal);
                }
            }
            ManifoldKind::FaceB => {
                out.normal = xf_b.transform_vector(&manifold.local_normal);
                let plane_point = xf_b.transform_point(&manifold.local_point);

                for i in 0..manifold.point_count {
                    let clip_point = xf_a.transform_point(&manifold.points[i].local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(&out.normal)) * out.normal;
                    let c_a = clip_point - radius_a * out.normal;
                    out.points[i] = nalgebra::center(&c_a, &c_b);
                    out.separations[i] = (c_a - c_b).dot(&out.normal);
                }

                // Report the normal pointing from A to B regardless of the
                // reference shape.
                out.normal = -out.normal;
            }
        }

        out
    }
}

/// A vertex being clipped against reference side planes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipVertex {
    /// Vertex position.
    pub v: Point2<f64>,
    /// Feature id the vertex descends from.
    pub id: ContactId,
}

/// Sutherland-Hodgman clip of a two-vertex segment against the half plane
/// `dot(normal, x) - offset <= 0`.
///
/// Vertices inside the plane pass through with their ids intact; when the
/// segment straddles the plane the intersection point enters tagged with
/// the clipping vertex `vertex_index_a`. Returns the output vertices and
/// how many are valid.
#[must_use]
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: &Vector2<f64>,
    offset: f64,
    vertex_index_a: u8,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    // Signed distances of the endpoints to the line.
    let distance0 = normal.dot(&v_in[0].v.coords) - offset;
    let distance1 = normal.dot(&v_in[1].v.coords) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    if distance0 * distance1 < 0.0 {
        // The segment crosses the plane.
        let interp = distance0 / (distance0 - distance1);
        v_out[count].v = v_in[0].v + interp * (v_in[1].v - v_in[0].v);
        v_out[count].id = ContactId {
            index_a: vertex_index_a,
            index_b: v_in[0].id.index_b,
            type_a: ContactFeatureType::Vertex,
            type_b: ContactFeatureType::Face,
        };
        count += 1;
    }

    (v_out, count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_contact_id_key_roundtrip() {
        let id = ContactId::new(3, 7, ContactFeatureType::Face, ContactFeatureType::Vertex);
        let same = ContactId::new(3, 7, ContactFeatureType::Face, ContactFeatureType::Vertex);
        let other = ContactId::new(7, 3, ContactFeatureType::Vertex, ContactFeatureType::Face);

        assert_eq!(id.key(), same.key());
        assert_ne!(id.key(), other.key());
        assert_eq!(id.swapped(), other);
    }

    #[test]
    fn test_clip_both_inside() {
        let v_in = [
            ClipVertex {
                v: Point2::new(-1.0, 0.0),
                ..ClipVertex::default()
            },
            ClipVertex {
                v: Point2::new(1.0, 0.0),
                ..ClipVertex::default()
            },
        ];
        // Plane x <= 2 keeps both.
        let (out, count) = clip_segment_to_line(&v_in, &Vector2::new(1.0, 0.0), 2.0, 0);
        assert_eq!(count, 2);
        assert_eq!(out[0].v, v_in[0].v);
        assert_eq!(out[1].v, v_in[1].v);
    }

    #[test]
    fn test_clip_straddling_creates_intersection() {
        let v_in = [
            ClipVertex {
                v: Point2::new(-1.0, 0.0),
                ..ClipVertex::default()
            },
            ClipVertex {
                v: Point2::new(1.0, 0.0),
                ..ClipVertex::default()
            },
        ];
        // Plane x <= 0 keeps the first vertex and the midpoint crossing.
        let (out, count) = clip_segment_to_line(&v_in, &Vector2::new(1.0, 0.0), 0.0, 5);
        assert_eq!(count, 2);
        assert_relative_eq!(out[1].v.x, 0.0, epsilon = 1e-12);
        assert_eq!(out[1].id.index_a, 5);
        assert_eq!(out[1].id.type_a, ContactFeatureType::Vertex);
        assert_eq!(out[1].id.type_b, ContactFeatureType::Face);
    }

    #[test]
    fn test_clip_both_outside() {
        let v_in = [
            ClipVertex {
                v: Point2::new(2.0, 0.0),
                ..ClipVertex::default()
            },
            ClipVertex {
                v: Point2::new(3.0, 0.0),
                ..ClipVertex::default()
            },
        ];
        let (_, count) = clip_segment_to_line(&v_in, &Vector2::new(1.0, 0.0), 0.0, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_world_manifold_circles() {
        let mut manifold = Manifold {
            kind: ManifoldKind::Circles,
            local_point: Point2::origin(),
            point_count: 1,
            ..Manifold::default()
        };
        manifold.points[0].local_point = Point2::origin();

        let xf_a = Pose::identity();
        let xf_b = Pose::from_position(Point2::new(1.5, 0.0));

        let world = WorldManifold::initialize(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert_relative_eq!(world.normal, Vector2::new(1.0, 0.0), epsilon = 1e-12);
        // Overlap of 0.5 between unit circles 1.5 apart.
        assert_relative_eq!(world.separations[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(world.points[0].x, 0.75, epsilon = 1e-12);
    }
}
