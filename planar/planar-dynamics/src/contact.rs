//! Persistent contacts between fixture pairs.

use planar_collision::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon,
    collide_polygon_and_circle, collide_polygons, Manifold,
};
use planar_types::{Pose, Shape, ShapeType};

use crate::fixture::FixtureId;

/// A persistent record for one potentially-colliding fixture pair.
///
/// Contacts are created when fat AABBs start overlapping and destroyed
/// when they stop; in between, [`evaluate`](Contact::evaluate) refreshes
/// the manifold each step and the touching flag tracks whether the
/// shapes actually intersect.
#[derive(Debug, Clone)]
pub(crate) struct Contact {
    pub fixture_a: FixtureId,
    pub fixture_b: FixtureId,
    pub child_a: usize,
    pub child_b: usize,

    pub manifold: Manifold,

    /// Mixed friction of the two fixtures.
    pub friction: f64,
    /// Mixed restitution of the two fixtures.
    pub restitution: f64,
    /// Surface translation speed along the tangent (conveyor belts).
    pub tangent_speed: f64,

    pub touching: bool,
    /// Cleared by `pre_solve` to skip this contact for one step.
    pub enabled: bool,
    /// Set when a fixture's filter changed; re-checked next collide pass.
    pub filter_pending: bool,
    pub island_flag: bool,
    /// Whether `toi` below is valid for the current sub-step.
    pub toi_valid: bool,
    pub toi: f64,
    pub toi_count: usize,
    /// Set when continuous collision resolves a TOI event involving a
    /// bullet body.
    pub bullet_hit: bool,
}

/// Geometric mean of the two friction coefficients.
#[must_use]
pub(crate) fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixes with max so a bouncy ball bounces off anything.
#[must_use]
pub(crate) fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}

/// Whether a contact can exist for this shape-type pair, and whether the
/// fixtures must be swapped so the pair is in dispatch order (reference
/// shape first).
#[must_use]
pub(crate) fn dispatch_order(type_a: ShapeType, type_b: ShapeType) -> Option<bool> {
    use ShapeType::{Chain, Circle, Edge, Polygon};
    match (type_a, type_b) {
        (Circle, Circle) | (Polygon, Polygon | Circle) | (Edge | Chain, Circle | Polygon) => {
            Some(false)
        }
        (Circle, Polygon | Edge | Chain) | (Polygon, Edge | Chain) => Some(true),
        // Edge and chain shapes have no volume; they never collide with
        // each other.
        (Edge | Chain, Edge | Chain) => None,
    }
}

impl Contact {
    pub(crate) fn new(
        fixture_a: FixtureId,
        child_a: usize,
        fixture_b: FixtureId,
        child_b: usize,
        friction: f64,
        restitution: f64,
    ) -> Self {
        Self {
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            manifold: Manifold::default(),
            friction,
            restitution,
            tangent_speed: 0.0,
            touching: false,
            enabled: true,
            filter_pending: false,
            island_flag: false,
            toi_valid: false,
            toi: 1.0,
            toi_count: 0,
            bullet_hit: false,
        }
    }

    /// Compute the manifold for the current shape poses.
    ///
    /// The shapes arrive in dispatch order (see [`dispatch_order`]);
    /// chain children are extracted to edges here.
    #[must_use]
    pub(crate) fn evaluate(
        &self,
        shape_a: &Shape,
        xf_a: &Pose,
        shape_b: &Shape,
        xf_b: &Pose,
    ) -> Manifold {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => {
                collide_polygon_and_circle(a, xf_a, b, xf_b)
            }
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
            (Shape::Chain(chain), Shape::Circle(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_circle(&edge, xf_a, b, xf_b)
            }
            (Shape::Chain(chain), Shape::Polygon(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_polygon(&edge, xf_a, b, xf_b)
            }
            _ => {
                debug_assert!(false, "contact created for unsupported shape pair");
                Manifold::default()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_order() {
        use ShapeType::{Chain, Circle, Edge, Polygon};

        assert_eq!(dispatch_order(Circle, Circle), Some(false));
        assert_eq!(dispatch_order(Circle, Polygon), Some(true));
        assert_eq!(dispatch_order(Polygon, Circle), Some(false));
        assert_eq!(dispatch_order(Edge, Polygon), Some(false));
        assert_eq!(dispatch_order(Polygon, Chain), Some(true));
        assert_eq!(dispatch_order(Edge, Edge), None);
        assert_eq!(dispatch_order(Chain, Edge), None);
    }

    #[test]
    fn test_friction_mixing() {
        assert_eq!(mix_friction(0.0, 1.0), 0.0, "ice beats rubber");
        assert!((mix_friction(0.5, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_restitution_mixing() {
        assert_eq!(mix_restitution(0.2, 0.9), 0.9, "bounciest wins");
    }
}
