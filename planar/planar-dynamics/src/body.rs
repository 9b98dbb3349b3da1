//! Rigid bodies.

use nalgebra::{Point2, UnitComplex, Vector2};
use planar_types::{cross, MassData, Pose, Sweep};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::fixture::FixtureId;
use crate::joints::JointId;

/// Unique identifier for a body in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u32);

impl BodyId {
    /// Create a body ID from its raw value.
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

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyType {
    /// Never moves; infinite mass. Terminates island propagation.
    #[default]
    Static,
    /// Moves under its own velocity but ignores forces and impacts.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Construction parameters for a body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyDef {
    /// Body type.
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Point2<f64>,
    /// World angle in radians.
    pub angle: f64,
    /// Initial linear velocity.
    pub linear_velocity: Vector2<f64>,
    /// Initial angular velocity.
    pub angular_velocity: f64,
    /// Linear velocity damping coefficient.
    pub linear_damping: f64,
    /// Angular velocity damping coefficient.
    pub angular_damping: f64,
    /// Whether this body may fall asleep.
    pub allow_sleep: bool,
    /// Whether the body starts awake.
    pub awake: bool,
    /// Prevent all rotation (infinite rotational inertia).
    pub fixed_rotation: bool,
    /// Continuous collision against static and bullet bodies.
    pub bullet: bool,
    /// Whether the body starts enabled.
    pub enabled: bool,
    /// Scale applied to world gravity for this body.
    pub gravity_scale: f64,
    /// Opaque user handle.
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Point2::origin(),
            angle: 0.0,
            linear_velocity: Vector2::zeros(),
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// A dynamic body at the given position.
    #[must_use]
    pub fn dynamic(position: Point2<f64>) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Self::default()
        }
    }

    /// A static body at the given position.
    #[must_use]
    pub fn fixed(position: Point2<f64>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// A kinematic body at the given position.
    #[must_use]
    pub fn kinematic(position: Point2<f64>) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Self::default()
        }
    }

    /// Set the initial angle.
    #[must_use]
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// Set the initial linear velocity.
    #[must_use]
    pub fn with_linear_velocity(mut self, v: Vector2<f64>) -> Self {
        self.linear_velocity = v;
        self
    }

    /// Set the initial angular velocity.
    #[must_use]
    pub fn with_angular_velocity(mut self, w: f64) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Mark the body as a bullet for continuous collision.
    #[must_use]
    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    /// Lock the body's rotation.
    #[must_use]
    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    /// Set damping coefficients.
    #[must_use]
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set the gravity scale.
    #[must_use]
    pub fn with_gravity_scale(mut self, scale: f64) -> Self {
        self.gravity_scale = scale;
        self
    }
}

/// An edge in a body's joint graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JointEdge {
    pub other: BodyId,
    pub joint: JointId,
}

/// An edge in a body's contact graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContactEdge {
    pub other: BodyId,
    pub contact: u32,
}

/// A rigid body: transform, velocity, mass, and its attachment lists.
///
/// Bodies are created through [`World::create_body`] and addressed by
/// [`BodyId`]; the world owns the storage.
///
/// [`World::create_body`]: crate::World::create_body
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) pose: Pose,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vector2<f64>,
    pub(crate) angular_velocity: f64,

    pub(crate) force: Vector2<f64>,
    pub(crate) torque: f64,

    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_inertia: f64,

    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,

    pub(crate) sleep_time: f64,

    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    pub(crate) toi_flag: bool,

    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joint_edges: Vec<JointEdge>,
    pub(crate) contact_edges: Vec<ContactEdge>,

    pub(crate) user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let pose = Pose::from_position_angle(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vector2::zeros(),
            c0: def.position.coords,
            c: def.position.coords,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };

        Self {
            body_type: def.body_type,
            pose,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vector2::zeros(),
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && def.body_type != BodyType::Static,
            allow_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            island_flag: false,
            toi_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            joint_edges: Vec::new(),
            contact_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    /// Body type.
    #[must_use]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// World pose of the body origin.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// World position of the body origin.
    #[must_use]
    pub fn position(&self) -> Point2<f64> {
        self.pose.position
    }

    /// World angle in radians.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    /// World position of the center of mass.
    #[must_use]
    pub fn world_center(&self) -> Point2<f64> {
        Point2::from(self.sweep.c)
    }

    /// Center of mass in body-local coordinates.
    #[must_use]
    pub fn local_center(&self) -> Vector2<f64> {
        self.sweep.local_center
    }

    /// Linear velocity of the center of mass.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector2<f64> {
        self.linear_velocity
    }

    /// Angular velocity in rad/s.
    #[must_use]
    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    /// Set the linear velocity, waking the body if it becomes nonzero.
    pub fn set_linear_velocity(&mut self, v: Vector2<f64>) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.norm_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    /// Set the angular velocity, waking the body if it becomes nonzero.
    pub fn set_angular_velocity(&mut self, w: f64) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Mass in kg (zero for static and kinematic bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Rotational inertia about the center of mass.
    #[must_use]
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Apply a force at a world point. Non-center forces generate torque.
    pub fn apply_force(&mut self, force: Vector2<f64>, point: Point2<f64>, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        // Sleeping bodies don't accumulate forces.
        if self.awake {
            self.force += force;
            self.torque += cross(point.coords - self.sweep.c, force);
        }
    }

    /// Apply a force at the center of mass.
    pub fn apply_force_to_center(&mut self, force: Vector2<f64>, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.force += force;
        }
    }

    /// Apply a torque.
    pub fn apply_torque(&mut self, torque: f64, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.torque += torque;
        }
    }

    /// Apply a linear impulse at a world point, immediately changing
    /// velocity.
    pub fn apply_linear_impulse(&mut self, impulse: Vector2<f64>, point: Point2<f64>, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.linear_velocity += self.inv_mass * impulse;
            self.angular_velocity += self.inv_inertia * cross(point.coords - self.sweep.c, impulse);
        }
    }

    /// Apply an angular impulse.
    pub fn apply_angular_impulse(&mut self, impulse: f64, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.angular_velocity += self.inv_inertia * impulse;
        }
    }

    /// Wake or sleep the body. Sleeping zeroes velocities and
    /// accumulators.
    pub fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            self.awake = true;
            self.sleep_time = 0.0;
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vector2::zeros();
            self.angular_velocity = 0.0;
            self.force = Vector2::zeros();
            self.torque = 0.0;
        }
    }

    /// Whether the body is awake.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Whether the body participates in simulation at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the body is continuously collided.
    #[must_use]
    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    /// Opaque user handle.
    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Set the opaque user handle.
    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    /// Fixtures attached to this body.
    #[must_use]
    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    /// Transform a local point to world coordinates.
    #[must_use]
    pub fn world_point(&self, local: &Point2<f64>) -> Point2<f64> {
        self.pose.transform_point(local)
    }

    /// Transform a world point to local coordinates.
    #[must_use]
    pub fn local_point(&self, world: &Point2<f64>) -> Point2<f64> {
        self.pose.inverse_transform_point(world)
    }

    /// Velocity of a world point attached to this body.
    #[must_use]
    pub fn velocity_at_point(&self, world_point: &Point2<f64>) -> Vector2<f64> {
        self.linear_velocity
            + planar_types::cross_sv(self.angular_velocity, world_point.coords - self.sweep.c)
    }

    /// Install mass properties computed from the fixtures; the world
    /// calls this whenever fixtures change.
    pub(crate) fn set_mass_data(&mut self, mass_data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
            self.sweep.local_center = Vector2::zeros();
            self.sweep.c0 = self.pose.position.coords;
            self.sweep.c = self.pose.position.coords;
            return;
        }

        let old_center = self.sweep.c;

        self.mass = mass_data.mass;
        if self.mass <= 0.0 {
            // Dynamic bodies always have some mass so impulses act on them.
            self.mass = 1.0;
        }
        self.inv_mass = 1.0 / self.mass;

        if !self.fixed_rotation && mass_data.inertia > 0.0 {
            // Shift inertia from the shape origin to the center of mass.
            self.inertia = mass_data.inertia - self.mass * mass_data.center.norm_squared();
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        self.sweep.local_center = mass_data.center;
        let new_center = self.pose.transform_point(&Point2::from(mass_data.center)).coords;
        self.sweep.c0 = new_center;
        self.sweep.c = new_center;

        // The center moved: fix the velocity of the new center.
        self.linear_velocity +=
            planar_types::cross_sv(self.angular_velocity, new_center - old_center);
    }

    /// Move the pose to match the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let rotation = UnitComplex::new(self.sweep.a);
        self.pose = Pose {
            position: Point2::from(self.sweep.c - rotation * self.sweep.local_center),
            rotation,
        };
    }

    /// Advance the sweep baseline to `alpha` and place the pose there.
    /// Used by the continuous-collision solver.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Whether a joint with `collide_connected = false` links this body
    /// to `other`, which suppresses contacts between them.
    pub(crate) fn should_collide_connected(&self, other: BodyId) -> impl Iterator<Item = JointId> + '_ {
        self.joint_edges
            .iter()
            .filter(move |edge| edge.other == other)
            .map(|edge| edge.joint)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_body_has_no_mass() {
        let body = Body::new(&BodyDef::fixed(Point2::origin()));
        assert_eq!(body.mass(), 0.0);
        assert_eq!(body.inv_mass, 0.0);
        assert!(!body.is_awake(), "static bodies don't sleep-track");
    }

    #[test]
    fn test_force_on_static_ignored() {
        let mut body = Body::new(&BodyDef::fixed(Point2::origin()));
        body.apply_force_to_center(Vector2::new(100.0, 0.0), true);
        assert_eq!(body.force, Vector2::zeros());
    }

    #[test]
    fn test_impulse_changes_velocity() {
        let mut body = Body::new(&BodyDef::dynamic(Point2::origin()));
        body.set_mass_data(&MassData {
            mass: 2.0,
            center: Vector2::zeros(),
            inertia: 1.0,
        });
        body.apply_linear_impulse(Vector2::new(4.0, 0.0), Point2::origin(), true);
        assert_relative_eq!(body.linear_velocity().x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_off_center_impulse_spins() {
        let mut body = Body::new(&BodyDef::dynamic(Point2::origin()));
        body.set_mass_data(&MassData {
            mass: 1.0,
            center: Vector2::zeros(),
            inertia: 2.0,
        });
        body.apply_linear_impulse(Vector2::new(0.0, 1.0), Point2::new(1.0, 0.0), true);
        assert_relative_eq!(body.angular_velocity(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sleep_clears_velocity() {
        let mut body = Body::new(&BodyDef::dynamic(Point2::origin()));
        body.set_linear_velocity(Vector2::new(3.0, 0.0));
        body.set_awake(false);
        assert_eq!(body.linear_velocity(), Vector2::zeros());
        assert!(!body.is_awake());
    }

    #[test]
    fn test_mass_data_offset_center() {
        let mut body = Body::new(&BodyDef::dynamic(Point2::origin()));
        body.set_mass_data(&MassData {
            mass: 1.0,
            center: Vector2::new(2.0, 0.0),
            inertia: 5.0,
        });
        // Inertia shifts to the center of mass.
        assert_relative_eq!(body.inertia(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.world_center().x, 2.0, epsilon = 1e-12);
    }
}
