//! Breakable bodies: multi-fixture bodies that shatter under impact.
//!
//! A registered body watches the normal impulses the contact solver
//! stored on its manifolds. When any single impulse exceeds the break
//! strength, the body is decomposed: every fixture beyond the first
//! moves onto a fresh dynamic body that inherits the pose and the
//! velocity of its part, and the pieces fly apart under their own
//! momentum from then on.

use planar_types::{PhysicsError, Vector2};

use crate::body::{BodyDef, BodyId, BodyType};
use crate::fixture::FixtureDef;
use crate::world::World;
use crate::Result;

/// One entry in the world's breakable registry.
#[derive(Debug, Clone)]
pub(crate) struct BreakableRegistration {
    pub body: BodyId,
    /// Normal impulse above which the body shatters.
    pub strength: f64,
}

impl World {
    /// Register a body to break apart when a contact impulse exceeds
    /// `strength`. The body should carry several fixtures; breaking
    /// splits one fixture per piece.
    pub fn register_breakable(&mut self, body: BodyId, strength: f64) -> Result<()> {
        if self.body(body).is_none() {
            return Err(PhysicsError::InvalidBodyId(body.raw()));
        }
        if strength <= 0.0 {
            return Err(PhysicsError::invalid_config(
                "break strength must be positive",
            ));
        }
        self.breakables_mut().push(BreakableRegistration { body, strength });
        Ok(())
    }

    /// Remove a body from the breakable registry.
    pub fn unregister_breakable(&mut self, body: BodyId) {
        self.breakables_mut().retain(|entry| entry.body != body);
    }

    /// Check the registry against the impulses stored by the most recent
    /// solve and shatter anything over its threshold. Runs at the end of
    /// every step.
    pub(crate) fn process_breakables(&mut self) {
        let entries: Vec<BreakableRegistration> = self.breakables_mut().clone();

        let mut broken = Vec::new();
        for entry in &entries {
            if self.max_contact_impulse(entry.body) > entry.strength {
                broken.push(entry.body);
            }
        }

        for body in broken {
            self.unregister_breakable(body);
            self.shatter(body);
        }
    }

    /// Largest normal impulse applied to any of the body's contacts this
    /// step, including impulses from the continuous-collision pass.
    fn max_contact_impulse(&self, body: BodyId) -> f64 {
        let Some(body) = self.body(body) else {
            return 0.0;
        };

        let mut max_impulse = 0.0_f64;
        for edge in &body.contact_edges {
            max_impulse = max_impulse.max(self.contact_impulse(edge.contact));
        }
        max_impulse
    }

    /// Split every fixture beyond the first onto its own body.
    fn shatter(&mut self, body_id: BodyId) {
        let Some(body) = self.body(body_id) else {
            return;
        };
        if body.body_type() != BodyType::Dynamic || body.fixtures().len() < 2 {
            return;
        }

        let pose = *body.pose();
        let angular_velocity = body.angular_velocity();
        let parts: Vec<_> = body.fixtures()[1..].to_vec();

        for fixture_id in parts {
            let Some(fixture) = self.fixture(fixture_id) else {
                continue;
            };
            let def = FixtureDef {
                shape: fixture.shape().clone(),
                density: fixture.density(),
                friction: fixture.friction(),
                restitution: fixture.restitution(),
                is_sensor: fixture.is_sensor(),
                filter: *fixture.filter(),
                user_data: fixture.user_data(),
            };

            // The piece keeps the velocity its material had as part of
            // the whole, including the rotational contribution. Unit
            // density is fine here: the center is density-independent.
            let center = pose.transform_point(&nalgebra::Point2::from(
                def.shape.compute_mass(1.0).center,
            ));
            let velocity = self
                .body(body_id)
                .map_or_else(Vector2::zeros, |b| b.velocity_at_point(&center));

            if self.destroy_fixture(fixture_id).is_err() {
                continue;
            }

            let piece_def = BodyDef {
                body_type: BodyType::Dynamic,
                position: pose.position,
                angle: pose.angle(),
                linear_velocity: velocity,
                angular_velocity,
                ..BodyDef::default()
            };
            if let Ok(piece) = self.create_body(&piece_def) {
                let _ = self.create_fixture(piece, def);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use planar_types::{PolygonShape, Vector2};

    #[test]
    fn test_register_validates() {
        let mut world = World::new(Vector2::zeros());
        let body = world
            .create_body(&BodyDef::dynamic(Point2::origin()))
            .expect("create");

        assert!(world.register_breakable(body, 5.0).is_ok());
        assert!(world.register_breakable(body, 0.0).is_err());
        assert!(world
            .register_breakable(BodyId::new(999), 5.0)
            .is_err());
    }

    #[test]
    fn test_hard_impact_shatters() {
        let mut world = World::new(Vector2::zeros());

        let wall = world
            .create_body(&BodyDef::fixed(Point2::origin()))
            .expect("wall");
        world
            .create_fixture(wall, FixtureDef::new(PolygonShape::new_box(0.5, 10.0)))
            .expect("wall fixture");

        // A two-part projectile flying fast at the wall.
        let projectile = world
            .create_body(
                &BodyDef::dynamic(Point2::new(-8.0, 0.0))
                    .with_linear_velocity(Vector2::new(30.0, 0.0))
                    .with_bullet(true),
            )
            .expect("projectile");
        world
            .create_fixture(
                projectile,
                FixtureDef::new(PolygonShape::new_oriented_box(
                    0.5,
                    0.5,
                    Point2::new(-0.5, 0.0),
                    0.0,
                ))
                .with_density(1.0),
            )
            .expect("left half");
        world
            .create_fixture(
                projectile,
                FixtureDef::new(PolygonShape::new_oriented_box(
                    0.5,
                    0.5,
                    Point2::new(0.5, 0.0),
                    0.0,
                ))
                .with_density(1.0),
            )
            .expect("right half");

        world.register_breakable(projectile, 1.0).expect("register");
        assert_eq!(world.body_count(), 2);

        for _ in 0..120 {
            world.step(1.0 / 60.0, 8, 3);
        }

        // The impact exceeded the tiny strength: one extra piece exists
        // and the original kept a single fixture.
        assert_eq!(world.body_count(), 3, "projectile should have split");
        assert_eq!(
            world.body(projectile).map(|b| b.fixtures().len()),
            Some(1)
        );
    }

    #[test]
    fn test_soft_impact_survives() {
        let mut world = World::new(Vector2::zeros());

        let wall = world
            .create_body(&BodyDef::fixed(Point2::origin()))
            .expect("wall");
        world
            .create_fixture(wall, FixtureDef::new(PolygonShape::new_box(0.5, 10.0)))
            .expect("wall fixture");

        let projectile = world
            .create_body(
                &BodyDef::dynamic(Point2::new(-5.0, 0.0))
                    .with_linear_velocity(Vector2::new(2.0, 0.0)),
            )
            .expect("projectile");
        for offset in [-0.5, 0.5] {
            world
                .create_fixture(
                    projectile,
                    FixtureDef::new(PolygonShape::new_oriented_box(
                        0.5,
                        0.5,
                        Point2::new(offset, 0.0),
                        0.0,
                    ))
                    .with_density(1.0),
                )
                .expect("half");
        }

        // Enormous strength: a slow bump must not break it.
        world
            .register_breakable(projectile, 1.0e6)
            .expect("register");

        for _ in 0..300 {
            world.step(1.0 / 60.0, 8, 3);
        }

        assert_eq!(world.body_count(), 2, "slow impact must not split");
    }
}
