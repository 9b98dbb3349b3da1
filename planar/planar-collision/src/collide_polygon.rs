//! Narrow phase for polygon-polygon contact.
//!
//! Classic SAT clipping: find the axis of maximum separation over both
//! polygons' face normals, pick the reference face (with a slop-sized
//! hysteresis so the roles don't flip-flop between frames), find the
//! incident edge as the most anti-parallel face on the other polygon,
//! and clip it against the reference face's side planes. Surviving
//! points within the combined radius become the manifold.

use nalgebra::Vector2;
use planar_types::settings::{LINEAR_SLOP, MAX_MANIFOLD_POINTS};
use planar_types::{cross_vs, PolygonShape, Pose};

use crate::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeatureType, ContactId, Manifold, ManifoldKind,
};

/// Find the edge of `poly1` with the maximum separation against `poly2`.
///
/// Works in `poly2`'s frame; the returned separation is the min distance
/// of `poly2`'s vertices past the best face plane of `poly1`.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Pose,
    poly2: &PolygonShape,
    xf2: &Pose,
) -> (usize, f64) {
    let count1 = poly1.count();
    let count2 = poly2.count();

    // Pose of poly1 in poly2's frame.
    let xf = xf2.inverse_compose(xf1);

    let mut best_index = 0;
    let mut max_separation = f64::NEG_INFINITY;
    for i in 0..count1 {
        // Face normal and vertex of poly1 in poly2's frame.
        let n = xf.transform_vector(&poly1.normals()[i]);
        let v1 = xf.transform_point(&poly1.vertices()[i]);

        // Deepest vertex of poly2 against this face.
        let mut si = f64::INFINITY;
        for j in 0..count2 {
            let sij = n.dot(&(poly2.vertices()[j] - v1));
            si = si.min(sij);
        }

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

/// Find the incident edge on `poly2`: the face whose normal is most
/// anti-parallel to the given reference face of `poly1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Pose,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Pose,
) -> [ClipVertex; 2] {
    let normals1 = poly1.normals();
    debug_assert!(edge1 < poly1.count());

    let vertices2 = poly2.vertices();
    let normals2 = poly2.normals();
    let count2 = poly2.count();

    // Reference normal in poly2's frame.
    let normal1 = xf2.inverse_transform_vector(&xf1.transform_vector(&normals1[edge1]));

    let mut index = 0;
    let mut min_dot = f64::INFINITY;
    for (i, n) in normals2.iter().enumerate() {
        let dot = normal1.dot(n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % count2;

    [
        ClipVertex {
            v: xf2.transform_point(&vertices2[i1]),
            id: ContactId {
                index_a: edge1 as u8,
                index_b: i1 as u8,
                type_a: ContactFeatureType::Face,
                type_b: ContactFeatureType::Vertex,
            },
        },
        ClipVertex {
            v: xf2.transform_point(&vertices2[i2]),
            id: ContactId {
                index_a: edge1 as u8,
                index_b: i2 as u8,
                type_a: ContactFeatureType::Face,
                type_b: ContactFeatureType::Vertex,
            },
        },
    ]
}

/// Collide two polygons.
#[must_use]
pub fn collide_polygons(
    polygon_a: &PolygonShape,
    xf_a: &Pose,
    polygon_b: &PolygonShape,
    xf_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = polygon_a.radius() + polygon_b.radius();

    let (edge_a, separation_a) = find_max_separation(polygon_a, xf_a, polygon_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(polygon_b, xf_b, polygon_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Reference/incident role selection with hysteresis; the tie-break
    // toward A keeps the choice stable frame to frame.
    let (poly1, poly2, xf1, xf2, edge1, flip) =
        if separation_b > separation_a + 0.1 * LINEAR_SLOP {
            manifold.kind = ManifoldKind::FaceB;
            (polygon_b, polygon_a, xf_b, xf_a, edge_b, true)
        } else {
            manifold.kind = ManifoldKind::FaceA;
            (polygon_a, polygon_b, xf_a, xf_b, edge_a, false)
        };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.count();
    let vertices1 = poly1.vertices();

    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let mut v11 = vertices1[iv1];
    let mut v12 = vertices1[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = nalgebra::center(&v11, &v12);

    let tangent = xf1.transform_vector(&local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.transform_point(&v11);
    v12 = xf1.transform_point(&v12);

    // Face offset and side plane extents, padded by the combined radius.
    let front_offset = normal.dot(&v11.coords);
    let side_offset1 = -tangent.dot(&v11.coords) + total_radius;
    let side_offset2 = tangent.dot(&v12.coords) + total_radius;

    let (clip1, np) = clip_segment_to_line(&incident_edge, &-tangent, side_offset1, iv1 as u8);
    if np < 2 {
        return manifold;
    }
    let (clip2, np) = clip_segment_to_line(&clip1, &tangent, side_offset2, iv2 as u8);
    if np < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in clip2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(&clip.v.coords) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.inverse_transform_point(&clip.v);
            cp.id = if flip { clip.id.swapped() } else { clip.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
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
    use crate::manifold::WorldManifold;
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use planar_types::settings::POLYGON_RADIUS;

    #[test]
    fn test_stacked_boxes_two_points() {
        let a = PolygonShape::new_box(1.0, 1.0);
        let b = PolygonShape::new_box(1.0, 1.0);
        let xf_a = Pose::identity();
        // B resting on top of A with slight overlap.
        let xf_b = Pose::from_position(Point2::new(0.0, 1.99));

        let manifold = collide_polygons(&a, &xf_a, &b, &xf_b);
        assert_eq!(manifold.point_count, 2);

        let world =
            WorldManifold::initialize(&manifold, &xf_a, POLYGON_RADIUS, &xf_b, POLYGON_RADIUS);
        assert_relative_eq!(world.normal.y.abs(), 1.0, epsilon = 1e-9);
        assert!(world.separations[0] < 0.0);
        assert!(world.separations[1] < 0.0);
    }

    #[test]
    fn test_separated_boxes_empty() {
        let a = PolygonShape::new_box(1.0, 1.0);
        let b = PolygonShape::new_box(1.0, 1.0);
        let manifold = collide_polygons(
            &a,
            &Pose::identity(),
            &b,
            &Pose::from_position(Point2::new(5.0, 0.0)),
        );
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_corner_overlap_single_point() {
        let a = PolygonShape::new_box(1.0, 1.0);
        let b = PolygonShape::new_box(1.0, 1.0);
        // Rotated 45 degrees, corner pressing into A's right face.
        let xf_b = Pose::from_position_angle(
            Point2::new(2.4, 0.0),
            std::f64::consts::FRAC_PI_4,
        );

        let manifold = collide_polygons(&a, &Pose::identity(), &b, &xf_b);
        assert_eq!(manifold.point_count, 1);
    }

    #[test]
    fn test_point_ids_are_distinct() {
        let a = PolygonShape::new_box(1.0, 1.0);
        let b = PolygonShape::new_box(1.0, 1.0);
        let manifold = collide_polygons(
            &a,
            &Pose::identity(),
            &b,
            &Pose::from_position(Point2::new(0.0, 1.99)),
        );
        assert_eq!(manifold.point_count, 2);
        assert_ne!(
            manifold.points[0].id.key(),
            manifold.points[1].id.key(),
            "the two contact points must have distinct feature ids"
        );
    }

    #[test]
    fn test_reference_face_stable_under_jitter() {
        // Nearly equal separations: the hysteresis keeps shape A as the
        // reference across tiny pose changes.
        let a = PolygonShape::new_box(1.0, 1.0);
        let b = PolygonShape::new_box(1.0, 1.0);

        let m1 = collide_polygons(
            &a,
            &Pose::identity(),
            &b,
            &Pose::from_position(Point2::new(0.0, 1.99)),
        );
        let m2 = collide_polygons(
            &a,
            &Pose::identity(),
            &b,
            &Pose::from_position(Point2::new(1e-5, 1.99)),
        );
        assert_eq!(m1.kind, m2.kind);
    }
}
