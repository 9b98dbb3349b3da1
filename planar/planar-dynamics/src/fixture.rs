//! Fixtures: shapes attached to bodies with material properties.

use planar_collision::BroadPhase;
use planar_types::{Aabb, Filter, MassData, Pose, Shape, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::BodyId;

/// Unique identifier for a fixture in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixtureId(pub u32);

impl FixtureId {
    /// Create a fixture ID from its raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FixtureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fixture({})", self.0)
    }
}

/// Broad-phase user data: one proxy belongs to one child of one fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureProxyKey {
    /// The owning fixture.
    pub fixture: FixtureId,
    /// Which shape child the proxy covers (chains have many).
    pub child_index: usize,
}

/// One broad-phase proxy of a fixture.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixtureProxy {
    pub proxy_id: i32,
    pub child_index: usize,
}

/// Construction parameters for a fixture.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixtureDef {
    /// The collision geometry.
    pub shape: Shape,
    /// Mass density in kg/m².
    pub density: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Restitution (bounciness) in `[0, 1]`.
    pub restitution: f64,
    /// Whether the fixture only senses contacts without responding.
    pub is_sensor: bool,
    /// Collision filter.
    pub filter: Filter,
    /// Opaque user handle.
    pub user_data: u64,
}

impl FixtureDef {
    /// A fixture with default material properties for the given shape.
    #[must_use]
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    /// Set the density.
    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Make the fixture a sensor.
    #[must_use]
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Set the collision filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// A shape attached to a body, carrying material properties and one
/// broad-phase proxy per shape child.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyId,
    pub(crate) shape: Shape,
    pub(crate) density: f64,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub(crate) user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyId, def: FixtureDef) -> Self {
        debug_assert!(def.density >= 0.0);
        Self {
            body,
            shape: def.shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            user_data: def.user_data,
        }
    }

    /// The body this fixture is attached to.
    #[must_use]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// The collision geometry.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Mass density.
    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Restitution.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Whether this fixture is a sensor.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// The collision filter.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Opaque user handle.
    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Mass properties of the shape at this fixture's density.
    #[must_use]
    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    pub(crate) fn create_proxies(
        &mut self,
        fixture_id: FixtureId,
        broad_phase: &mut BroadPhase<FixtureProxyKey>,
        pose: &Pose,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(pose, child_index);
            let proxy_id = broad_phase.create_proxy(
                &aabb,
                FixtureProxyKey {
                    fixture: fixture_id,
                    child_index,
                },
            );
            self.proxies.push(FixtureProxy {
                proxy_id,
                child_index,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<FixtureProxyKey>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Move every child proxy to cover the swept volume between the two
    /// poses, so tunneling motion still generates pairs.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<FixtureProxyKey>,
        pose1: &Pose,
        pose2: &Pose,
    ) {
        for proxy in &self.proxies {
            let aabb1 = self.shape.compute_aabb(pose1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(pose2, proxy.child_index);
            let aabb = Aabb::combined(&aabb1, &aabb2);
            let displacement: Vector2<f64> = aabb2.center() - aabb1.center();
            broad_phase.move_proxy(proxy.proxy_id, &aabb, displacement);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use planar_types::{ChainShape, CircleShape};

    #[test]
    fn test_fixture_def_builder() {
        let def = FixtureDef::new(CircleShape::with_radius(1.0))
            .with_density(2.0)
            .with_friction(0.5)
            .with_restitution(0.3)
            .sensor();
        assert_eq!(def.density, 2.0);
        assert!(def.is_sensor);
    }

    #[test]
    fn test_chain_fixture_has_proxy_per_child() {
        let chain = ChainShape::create_chain(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(3.0, 1.0),
            ],
            None,
            None,
        )
        .expect("valid chain");

        let mut fixture = Fixture::new(BodyId::new(0), FixtureDef::new(chain));
        let mut broad_phase = BroadPhase::new();
        fixture.create_proxies(FixtureId::new(0), &mut broad_phase, &Pose::identity());

        assert_eq!(fixture.proxies.len(), 3);
        assert_eq!(broad_phase.proxy_count(), 3);

        fixture.destroy_proxies(&mut broad_phase);
        assert_eq!(broad_phase.proxy_count(), 0);
    }

    #[test]
    fn test_synchronize_covers_swept_volume() {
        let mut fixture = Fixture::new(
            BodyId::new(0),
            FixtureDef::new(CircleShape::with_radius(0.5)),
        );
        let mut broad_phase = BroadPhase::new();
        fixture.create_proxies(FixtureId::new(0), &mut broad_phase, &Pose::identity());

        let pose1 = Pose::identity();
        let pose2 = Pose::from_position(Point2::new(5.0, 0.0));
        fixture.synchronize(&mut broad_phase, &pose1, &pose2);

        let fat = broad_phase.fat_aabb(fixture.proxies[0].proxy_id);
        assert!(fat.min.x < 0.0 && fat.max.x > 5.0, "covers both endpoints");
    }
}
