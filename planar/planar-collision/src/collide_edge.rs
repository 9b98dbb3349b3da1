//! Narrow phase for edge shapes: edge-circle and edge-polygon.
//!
//! Edges are usually chain children, and chains introduce the ghost
//! collision problem: a shape sliding across a seam between two edges
//! must not catch on the interior endpoint. One-sided edges carry their
//! neighbors as ghost vertices; the circle path skips contacts that
//! belong to a neighbor's Voronoi region, and the polygon path classifies
//! each seam corner as convex or reflex on the Gauss map to decide
//! whether an off-axis normal is admissible or must snap to the edge
//! normal.

use nalgebra::{Point2, Vector2};
use planar_types::settings::MAX_MANIFOLD_POINTS;
use planar_types::{cross, EdgeShape, PolygonShape, Pose};

use crate::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeatureType, ContactId, Manifold, ManifoldKind,
};

/// Collide an edge (shape A) and a circle (shape B).
#[must_use]
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Pose,
    circle_b: &planar_types::CircleShape,
    xf_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the edge's frame.
    let q = xf_a.inverse_transform_point(&xf_b.transform_point(&circle_b.position));

    let a = edge_a.v1;
    let b = edge_a.v2;
    let e = b - a;

    // Normal points to the right, looking from v1 at v2.
    let n = Vector2::new(e.y, -e.x);
    let offset = n.dot(&(q - a));

    if edge_a.one_sided && offset < 0.0 {
        return manifold;
    }

    // Barycentric coordinates of the center on the segment.
    let u = e.dot(&(b - q));
    let v = e.dot(&(q - a));

    let radius = edge_a.radius() + circle_b.radius;

    if v <= 0.0 {
        // Region A: closest to the first endpoint.
        let p = a;
        let dd = (q - p).norm_squared();
        if dd > radius * radius {
            return manifold;
        }

        // If a neighbor edge owns this region, let it produce the contact.
        if let Some(a1) = edge_a.v0 {
            let e1 = a - a1;
            let u1 = e1.dot(&(a - q));
            if u1 > 0.0 {
                return manifold;
            }
        }

        manifold.kind = ManifoldKind::Circles;
        manifold.point_count = 1;
        manifold.local_point = p;
        manifold.points[0].local_point = circle_b.position;
        manifold.points[0].id = ContactId::default();
        return manifold;
    }

    if u <= 0.0 {
        // Region B: closest to the second endpoint.
        let p = b;
        let dd = (q - p).norm_squared();
        if dd > radius * radius {
            return manifold;
        }

        if let Some(b2) = edge_a.v3 {
            let e2 = b2 - b;
            let v2 = e2.dot(&(q - b));
            if v2 > 0.0 {
                return manifold;
            }
        }

        manifold.kind = ManifoldKind::Circles;
        manifold.point_count = 1;
        manifold.local_point = p;
        manifold.points[0].local_point = circle_b.position;
        manifold.points[0].id = ContactId {
            index_a: 1,
            ..ContactId::default()
        };
        return manifold;
    }

    // Region AB: closest to the interior of the segment.
    let den = e.norm_squared();
    debug_assert!(den > 0.0);
    let p = Point2::from((u * a.coords + v * b.coords) / den);
    let dd = (q - p).norm_squared();
    if dd > radius * radius {
        return manifold;
    }

    let n = if offset < 0.0 { -n } else { n }.normalize();

    manifold.kind = ManifoldKind::FaceA;
    manifold.point_count = 1;
    manifold.local_normal = n;
    manifold.local_point = a;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId {
        type_a: ContactFeatureType::Face,
        ..ContactId::default()
    };
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpAxisKind {
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct EpAxis {
    normal: Vector2<f64>,
    kind: EpAxisKind,
    index: usize,
    separation: f64,
}

/// Polygon B's geometry pulled into the edge's frame once up front.
struct TempPolygon {
    vertices: Vec<Point2<f64>>,
    normals: Vec<Vector2<f64>>,
}

fn compute_edge_separation(polygon_b: &TempPolygon, v1: Point2<f64>, normal1: Vector2<f64>) -> EpAxis {
    let mut axis = EpAxis {
        kind: EpAxisKind::EdgeA,
        index: usize::MAX,
        separation: f64::NEG_INFINITY,
        normal: Vector2::zeros(),
    };

    // The edge supports both its normal and the reverse; pick whichever
    // separates less (min-max).
    let axes = [normal1, -normal1];
    for (j, axis_j) in axes.iter().enumerate() {
        let mut sj = f64::INFINITY;
        for v in &polygon_b.vertices {
            let si = axis_j.dot(&(v - v1));
            sj = sj.min(si);
        }

        if sj > axis.separation {
            axis.index = j;
            axis.separation = sj;
            axis.normal = *axis_j;
        }
    }

    axis
}

fn compute_polygon_separation(
    polygon_b: &TempPolygon,
    v1: Point2<f64>,
    v2: Point2<f64>,
) -> EpAxis {
    let mut axis = EpAxis {
        kind: EpAxisKind::EdgeB,
        index: usize::MAX,
        separation: f64::NEG_INFINITY,
        normal: Vector2::zeros(),
    };

    for i in 0..polygon_b.vertices.len() {
        let n = -polygon_b.normals[i];
        let s1 = n.dot(&(polygon_b.vertices[i] - v1));
        let s2 = n.dot(&(polygon_b.vertices[i] - v2));
        let s = s1.min(s2);

        if s > axis.separation {
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }

    axis
}

/// Collide a one- or two-sided edge (shape A) and a polygon (shape B).
#[must_use]
#[allow(clippy::too_many_lines)] // reference-face setup and clip, ported as a unit
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Pose,
    polygon_b: &PolygonShape,
    xf_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Work entirely in the edge's frame.
    let xf = xf_a.inverse_compose(xf_b);
    let centroid_b = xf.transform_point(&polygon_b.centroid());

    let v1 = edge_a.v1;
    let v2 = edge_a.v2;

    let edge1 = (v2 - v1).normalize();

    // Normal points to the right for a CCW winding.
    let normal1 = Vector2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(&(centroid_b - v1));

    if edge_a.one_sided && offset1 < 0.0 {
        return manifold;
    }

    let temp = TempPolygon {
        vertices: polygon_b
            .vertices()
            .iter()
            .map(|v| xf.transform_point(v))
            .collect(),
        normals: polygon_b
            .normals()
            .iter()
            .map(|n| xf.transform_vector(n))
            .collect(),
    };
    let count_b = temp.vertices.len();

    let radius = polygon_b.radius() + edge_a.radius();

    let edge_axis = compute_edge_separation(&temp, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }

    let polygon_axis = compute_polygon_separation(&temp, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Hysteresis: prefer the edge axis unless the polygon axis is clearly
    // better, so the manifold kind doesn't flicker between frames.
    let relative_tol = 0.98;
    let absolute_tol = 0.001;
    let mut primary_axis =
        if polygon_axis.separation - radius > relative_tol * (edge_axis.separation - radius) + absolute_tol {
            polygon_axis
        } else {
            edge_axis
        };

    if edge_a.one_sided {
        // Gauss-map classification of the two seam corners. In a convex
        // corner, normals between the neighbors' normals are admissible;
        // outside that arc the neighbor owns the contact. In a reflex
        // corner only the edge normal is safe.
        let sin_tol = 0.1;
        let side1 = primary_axis.normal.dot(&edge1) <= 0.0;

        if side1 {
            if let Some(v0) = edge_a.v0 {
                let edge0 = (v1 - v0).normalize();
                let normal0 = Vector2::new(edge0.y, -edge0.x);
                let convex1 = cross(edge0, edge1) >= 0.0;
                if convex1 {
                    if cross(primary_axis.normal, normal0) > sin_tol {
                        // Skip region: the previous edge owns this normal.
                        return manifold;
                    }
                } else {
                    primary_axis = edge_axis;
                }
            }
        } else if let Some(v3) = edge_a.v3 {
            let edge2 = (v3 - v2).normalize();
            let normal2 = Vector2::new(edge2.y, -edge2.x);
            let convex2 = cross(edge1, edge2) >= 0.0;
            if convex2 {
                if cross(normal2, primary_axis.normal) > sin_tol {
                    return manifold;
                }
            } else {
                primary_axis = edge_axis;
            }
        }
    }

    // Reference face and the incident points to clip against it.
    let (clip_points, ref_i1, ref_i2, ref_v1, ref_v2, ref_normal, ref_side1, ref_side2);
    if primary_axis.kind == EpAxisKind::EdgeA {
        manifold.kind = ManifoldKind::FaceA;

        // Incident face: the polygon normal most anti-parallel to the axis.
        let mut best_index = 0;
        let mut best_value = primary_axis.normal.dot(&temp.normals[0]);
        for i in 1..count_b {
            let value = primary_axis.normal.dot(&temp.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = (i1 + 1) % count_b;

        clip_points = [
            ClipVertex {
                v: temp.vertices[i1],
                id: ContactId {
                    index_a: 0,
                    index_b: i1 as u8,
                    type_a: ContactFeatureType::Face,
                    type_b: ContactFeatureType::Vertex,
                },
            },
            ClipVertex {
                v: temp.vertices[i2],
                id: ContactId {
                    index_a: 0,
                    index_b: i2 as u8,
                    type_a: ContactFeatureType::Face,
                    type_b: ContactFeatureType::Vertex,
                },
            },
        ];

        ref_i1 = 0;
        ref_i2 = 1;
        ref_v1 = v1;
        ref_v2 = v2;
        ref_normal = primary_axis.normal;
        ref_side1 = -edge1;
        ref_side2 = edge1;
    } else {
        manifold.kind = ManifoldKind::FaceB;

        clip_points = [
            ClipVertex {
                v: v2,
                id: ContactId {
                    index_a: 1,
                    index_b: primary_axis.index as u8,
                    type_a: ContactFeatureType::Vertex,
                    type_b: ContactFeatureType::Face,
                },
            },
            ClipVertex {
                v: v1,
                id: ContactId {
                    index_a: 0,
                    index_b: primary_axis.index as u8,
                    type_a: ContactFeatureType::Vertex,
                    type_b: ContactFeatureType::Face,
                },
            },
        ];

        ref_i1 = primary_axis.index;
        ref_i2 = (ref_i1 + 1) % count_b;
        ref_v1 = temp.vertices[ref_i1];
        ref_v2 = temp.vertices[ref_i2];
        ref_normal = temp.normals[ref_i1];
        // CCW winding.
        ref_side1 = Vector2::new(ref_normal.y, -ref_normal.x);
        ref_side2 = -ref_side1;
    }

    let side_offset1 = ref_side1.dot(&ref_v1.coords);
    let side_offset2 = ref_side2.dot(&ref_v2.coords);

    let (clip1, np) = clip_segment_to_line(&clip_points, &ref_side1, side_offset1, ref_i1 as u8);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }
    let (clip2, np) = clip_segment_to_line(&clip1, &ref_side2, side_offset2, ref_i2 as u8);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    if primary_axis.kind == EpAxisKind::EdgeA {
        manifold.local_normal = ref_normal;
        manifold.local_point = ref_v1;
    } else {
        manifold.local_normal = polygon_b.normals()[ref_i1];
        manifold.local_point = polygon_b.vertices()[ref_i1];
    }

    let mut point_count = 0;
    for clip in &clip2 {
        let separation = ref_normal.dot(&(clip.v - ref_v1));
        if separation <= radius {
            let cp = &mut manifold.points[point_count];
            if primary_axis.kind == EpAxisKind::EdgeA {
                cp.local_point = xf.inverse_transform_point(&clip.v);
                cp.id = clip.id;
            } else {
                cp.local_point = clip.v;
                cp.id = clip.id.swapped();
            }
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
    use approx::assert_relative_eq;
    use planar_types::{ChainShape, CircleShape};

    fn flat_edge() -> EdgeShape {
        EdgeShape::new(Point2::new(-2.0, 0.0), Point2::new(2.0, 0.0))
    }

    #[test]
    fn test_edge_circle_face_contact() {
        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(0.0, 0.4));

        let manifold = collide_edge_and_circle(&flat_edge(), &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::FaceA);
        assert_relative_eq!(manifold.local_normal.y.abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_circle_endpoint_contact() {
        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(2.3, 0.0));

        let manifold = collide_edge_and_circle(&flat_edge(), &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::Circles);
        assert_eq!(manifold.points[0].id.index_a, 1, "vertex B feature");
    }

    #[test]
    fn test_edge_circle_miss() {
        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(0.0, 2.0));

        let manifold = collide_edge_and_circle(&flat_edge(), &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_ghost_vertex_suppresses_seam_contact() {
        // A flat chain; its one-sided children collide from below (their
        // normals point down). The circle sits under the seam, in the
        // interior Voronoi region of the second edge: the first edge must
        // defer to its neighbor instead of reporting an endpoint contact.
        let chain = ChainShape::create_chain(
            &[
                Point2::new(-4.0, 0.0),
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
            ],
            None,
            None,
        )
        .expect("valid chain");

        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(0.5, -0.3));

        let first = chain.child_edge(0);
        let second = chain.child_edge(1);

        let m_first =
            collide_edge_and_circle(&first, &Pose::identity(), &circle, &xf_b);
        let m_second =
            collide_edge_and_circle(&second, &Pose::identity(), &circle, &xf_b);

        assert_eq!(m_first.point_count, 0, "seam contact belongs to edge 2");
        assert_eq!(m_second.point_count, 1);
    }

    #[test]
    fn test_one_sided_edge_circle_behind() {
        let chain = ChainShape::create_loop(&[
            Point2::new(-4.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(0.0, 4.0),
        ])
        .expect("valid loop");

        // The bottom edge runs left-to-right... in CCW loop order the
        // first child goes from (-4,0) to (4,0), normal (0,-1): its
        // collidable side is below.
        let edge = chain.child_edge(0);
        let circle = CircleShape::with_radius(0.5);

        let above = collide_edge_and_circle(
            &edge,
            &Pose::identity(),
            &circle,
            &Pose::from_position(Point2::new(0.0, 0.3)),
        );
        assert_eq!(above.point_count, 0, "back side must not collide");

        let below = collide_edge_and_circle(
            &edge,
            &Pose::identity(),
            &circle,
            &Pose::from_position(Point2::new(0.0, -0.3)),
        );
        assert_eq!(below.point_count, 1);
    }

    #[test]
    fn test_edge_polygon_flat_contact() {
        let edge = flat_edge();
        let polygon = PolygonShape::new_box(0.5, 0.5);
        let xf_b = Pose::from_position(Point2::new(0.0, 0.49));

        let manifold =
            collide_edge_and_polygon(&edge, &Pose::identity(), &polygon, &xf_b);
        assert_eq!(manifold.point_count, 2);
        assert_eq!(manifold.kind, ManifoldKind::FaceA);
    }

    #[test]
    fn test_edge_polygon_miss() {
        let edge = flat_edge();
        let polygon = PolygonShape::new_box(0.5, 0.5);
        let xf_b = Pose::from_position(Point2::new(0.0, 3.0));

        let manifold =
            collide_edge_and_polygon(&edge, &Pose::identity(), &polygon, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_one_sided_edge_polygon_behind() {
        let edge = EdgeShape::new_one_sided(
            Point2::new(-4.0, 0.0),
            Point2::new(-2.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(4.0, 0.0),
        );
        let polygon = PolygonShape::new_box(0.5, 0.5);

        // Normal (0,-1): a polygon above presses on the back side.
        let above = collide_edge_and_polygon(
            &edge,
            &Pose::identity(),
            &polygon,
            &Pose::from_position(Point2::new(0.0, 0.4)),
        );
        assert_eq!(above.point_count, 0);

        let below = collide_edge_and_polygon(
            &edge,
            &Pose::identity(),
            &polygon,
            &Pose::from_position(Point2::new(0.0, -0.4)),
        );
        assert_eq!(below.point_count, 2);
    }
}
