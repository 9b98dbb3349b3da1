//! Narrow phase for circle pairs: circle-circle and polygon-circle.

use planar_types::{CircleShape, PolygonShape, Pose};

use crate::manifold::{ContactFeatureType, ContactId, Manifold, ManifoldKind};

/// Collide two circles.
///
/// Produces at most one point; the manifold stores both centers in their
/// own local frames and the world normal is derived when needed.
#[must_use]
pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Pose,
    circle_b: &CircleShape,
    xf_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.transform_point(&circle_a.position);
    let p_b = xf_b.transform_point(&circle_b.position);

    let d = p_b - p_a;
    let dist_sqr = d.norm_squared();
    let radius = circle_a.radius + circle_b.radius;
    if dist_sqr > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldKind::Circles;
    manifold.local_point = circle_a.position;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId::default();
    manifold
}

/// Collide a polygon (shape A) and a circle (shape B).
///
/// Finds the polygon edge with the maximum signed distance to the circle
/// center; depending on where the center projects, the contact is against
/// that face or clamped to one of its vertices.
#[must_use]
pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Pose,
    circle_b: &CircleShape,
    xf_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon's frame.
    let c = xf_b.transform_point(&circle_b.position);
    let c_local = xf_a.inverse_transform_point(&c);

    let radius = polygon_a.radius() + circle_b.radius;
    let count = polygon_a.count();
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();

    // Deepest penetrating edge.
    let mut normal_index = 0;
    let mut separation = f64::NEG_INFINITY;
    for i in 0..count {
        let s = normals[i].dot(&(c_local - vertices[i]));
        if s > radius {
            // Early out: the center is beyond this face by more than the
            // combined radius.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    if separation < f64::EPSILON {
        // Center inside the polygon.
        manifold.point_count = 1;
        manifold.kind = ManifoldKind::FaceA;
        manifold.local_normal = normals[normal_index];
        manifold.local_point = nalgebra::center(&v1, &v2);
        manifold.points[0].local_point = circle_b.position;
        manifold.points[0].id = ContactId::default();
        return manifold;
    }

    // Barycentric position of the center on the face.
    let u1 = (c_local - v1).dot(&(v2 - v1));
    let u2 = (c_local - v2).dot(&(v1 - v2));
    if u1 <= 0.0 {
        if (c_local - v1).norm_squared() > radius * radius {
            return manifold;
        }
        manifold.kind = ManifoldKind::FaceA;
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if (c_local - v2).norm_squared() > radius * radius {
            return manifold;
        }
        manifold.kind = ManifoldKind::FaceA;
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = nalgebra::center(&v1, &v2);
        let s = (c_local - face_center).dot(&normals[normal_index]);
        if s > radius {
            return manifold;
        }
        manifold.kind = ManifoldKind::FaceA;
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }

    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId {
        type_a: ContactFeatureType::Face,
        ..ContactId::default()
    };
    manifold
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::manifold::WorldManifold;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Vector2};

    #[test]
    fn test_circles_touching() {
        let a = CircleShape::with_radius(1.0);
        let b = CircleShape::with_radius(1.0);
        let xf_a = Pose::identity();
        let xf_b = Pose::from_position(Point2::new(1.5, 0.0));

        let manifold = collide_circles(&a, &xf_a, &b, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::Circles);

        let world = WorldManifold::initialize(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert_relative_eq!(world.normal, Vector2::new(1.0, 0.0), epsilon = 1e-12);
        assert!(world.separations[0] < 0.0);
    }

    #[test]
    fn test_circles_apart() {
        let a = CircleShape::with_radius(1.0);
        let b = CircleShape::with_radius(1.0);
        let manifold = collide_circles(
            &a,
            &Pose::identity(),
            &b,
            &Pose::from_position(Point2::new(3.0, 0.0)),
        );
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_polygon_circle_face_contact() {
        let polygon = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::with_radius(0.5);
        // Circle resting against the right face.
        let xf_b = Pose::from_position(Point2::new(1.4, 0.0));

        let manifold =
            collide_polygon_and_circle(&polygon, &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::FaceA);
        assert_relative_eq!(manifold.local_normal, Vector2::new(1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_circle_vertex_contact() {
        let polygon = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::with_radius(0.5);
        // Circle just beyond the top-right corner, diagonal approach.
        let xf_b = Pose::from_position(Point2::new(1.3, 1.3));

        let manifold =
            collide_polygon_and_circle(&polygon, &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        // The normal should point along the corner diagonal.
        let expected = Vector2::new(1.0, 1.0).normalize();
        assert_relative_eq!(manifold.local_normal, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_polygon_circle_center_inside() {
        let polygon = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(0.5, 0.0));

        let manifold =
            collide_polygon_and_circle(&polygon, &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1, "deep contact still collides");
    }

    #[test]
    fn test_polygon_circle_miss() {
        let polygon = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::with_radius(0.5);
        let xf_b = Pose::from_position(Point2::new(3.0, 0.0));

        let manifold =
            collide_polygon_and_circle(&polygon, &Pose::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }
}
