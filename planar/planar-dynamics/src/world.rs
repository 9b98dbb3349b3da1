//! The world: body/fixture/joint storage and the step pipeline.
//!
//! # Step anatomy
//!
//! ```text
//! step(dt, velocity_iterations, position_iterations)
//! ├── find_new_contacts        (pairs from the broad phase, if dirty)
//! ├── collide                  (manifolds, begin/end/pre-solve events)
//! ├── solve                    (island DFS → integrate → solve → sleep)
//! │     └── synchronize fixtures, find_new_contacts
//! └── solve_toi                (continuous collision for fast bodies)
//! ```
//!
//! The world is locked while stepping. Listeners receive plain data and
//! cannot re-enter; explicit `destroy_*` calls made while locked (by a
//! hypothetical future internal caller) are queued and drained at the
//! step boundary.

use std::time::Instant;

use planar_collision::{time_of_impact, DistanceProxy, ToiInput, ToiState};
use planar_types::settings::{MAX_SUB_STEPS, MAX_TOI_CONTACTS};
use planar_types::{Aabb, PhysicsError, Point2, RayCastInput, Vector2};
use tracing::debug;

use crate::arena::Arena;
use crate::body::{Body, BodyDef, BodyId, BodyType, JointEdge};
use crate::contact_manager::ContactManager;
use crate::events::{
    ContactFilterHook, ContactListener, RayCastBehavior, RayCastHit,
};
use crate::fixture::{Fixture, FixtureDef, FixtureId};
use crate::island::Island;
use crate::joints::{GearJointDef, Joint, JointDef, JointId};
use crate::time_step::StepConfig;
use crate::Result;

/// Wall-clock timings of the most recent step, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Profile {
    /// Whole step.
    pub step: f64,
    /// Narrow-phase manifold refresh.
    pub collide: f64,
    /// Discrete island solving.
    pub solve: f64,
    /// Continuous collision resolution.
    pub solve_toi: f64,
}

struct NoopListener;

impl ContactListener for NoopListener {}

struct AllowAllFilter;

impl ContactFilterHook for AllowAllFilter {
    fn should_collide(&mut self, _a: FixtureId, _b: FixtureId) -> bool {
        true
    }
}

/// A 2D physics world.
///
/// # Example
///
/// ```
/// use planar_dynamics::{BodyDef, FixtureDef, World};
/// use planar_types::{CircleShape, Vector2};
/// use nalgebra::Point2;
///
/// let mut world = World::new(Vector2::new(0.0, -10.0));
///
/// let body = world
///     .create_body(&BodyDef::dynamic(Point2::new(0.0, 10.0)))
///     .unwrap();
/// world
///     .create_fixture(body, FixtureDef::new(CircleShape::with_radius(0.5)))
///     .unwrap();
///
/// for _ in 0..60 {
///     world.step(1.0 / 60.0, 8, 3);
/// }
///
/// assert!(world.body(body).unwrap().position().y < 10.0);
/// ```
pub struct World {
    bodies: Arena<Body>,
    fixtures: Arena<Fixture>,
    joints: Arena<Joint>,
    contact_manager: ContactManager,

    gravity: Vector2<f64>,
    listener: Box<dyn ContactListener>,
    filter_hook: Box<dyn ContactFilterHook>,

    island: Island,
    toi_island: Island,

    locked: bool,
    new_contacts: bool,
    step_complete: bool,

    allow_sleeping: bool,
    warm_starting: bool,
    continuous_physics: bool,
    sub_stepping: bool,
    auto_clear_forces: bool,

    inv_dt0: f64,
    profile: Profile,

    pending_destroy_bodies: Vec<BodyId>,
    pending_destroy_joints: Vec<JointId>,

    breakables: Vec<crate::breakable::BreakableRegistration>,
    /// Max normal impulse per contact this step, discrete and TOI passes
    /// combined. Consumed by the breakable registry.
    impulse_log: hashbrown::HashMap<u32, f64>,
}

impl World {
    /// Create an empty world with the given gravity.
    #[must_use]
    pub fn new(gravity: Vector2<f64>) -> Self {
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(),
            gravity,
            listener: Box::new(NoopListener),
            filter_hook: Box::new(AllowAllFilter),
            island: Island::new(),
            toi_island: Island::new(),
            locked: false,
            new_contacts: false,
            step_complete: true,
            allow_sleeping: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
            inv_dt0: 0.0,
            profile: Profile::default(),
            pending_destroy_bodies: Vec::new(),
            pending_destroy_joints: Vec::new(),
            breakables: Vec::new(),
            impulse_log: hashbrown::HashMap::new(),
        }
    }

    pub(crate) fn contact_impulse(&self, contact_id: u32) -> f64 {
        self.impulse_log.get(&contact_id).copied().unwrap_or(0.0)
    }

    fn log_reported_impulses(reported: &[(u32, f64)], log: &mut hashbrown::HashMap<u32, f64>) {
        for &(contact_id, impulse) in reported {
            let entry = log.entry(contact_id).or_insert(0.0);
            *entry = entry.max(impulse);
        }
    }

    pub(crate) fn breakables_mut(&mut self) -> &mut Vec<crate::breakable::BreakableRegistration> {
        &mut self.breakables
    }

    /// World gravity.
    #[must_use]
    pub fn gravity(&self) -> Vector2<f64> {
        self.gravity
    }

    /// Set the world gravity, waking nothing.
    pub fn set_gravity(&mut self, gravity: Vector2<f64>) {
        self.gravity = gravity;
    }

    /// Whether the world is mid-step.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Install the contact event listener.
    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = listener;
    }

    /// Install the contact creation filter hook.
    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilterHook>) {
        self.filter_hook = filter;
    }

    /// Toggle warm starting (on by default; turning it off is mainly a
    /// debugging aid).
    pub fn set_warm_starting(&mut self, flag: bool) {
        self.warm_starting = flag;
    }

    /// Toggle continuous collision.
    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.continuous_physics = flag;
    }

    /// Toggle single-TOI sub-stepping (debugging aid).
    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.sub_stepping = flag;
    }

    /// Toggle sleeping. Disabling wakes every body.
    pub fn set_allow_sleeping(&mut self, flag: bool) {
        if flag == self.allow_sleeping {
            return;
        }
        self.allow_sleeping = flag;
        if !flag {
            for id in self.bodies.ids() {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Timings of the most recent step.
    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of fixtures.
    #[must_use]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Number of joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of contacts (touching or not).
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    /// Height of the broad-phase tree.
    #[must_use]
    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree().height()
    }

    /// Quality metric of the broad-phase tree (1 is ideal).
    #[must_use]
    pub fn tree_quality(&self) -> f64 {
        self.contact_manager.broad_phase.tree().area_ratio()
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Create a body from a definition.
    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyId> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let id = BodyId(self.bodies.insert(Body::new(def)));
        Ok(id)
    }

    /// Destroy a body, cascading to its joints, contacts, and fixtures.
    ///
    /// While the world is locked the destruction is queued and performed
    /// at the end of the step.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        if !self.bodies.contains(id.raw()) {
            return Err(PhysicsError::InvalidBodyId(id.raw()));
        }
        if self.locked {
            self.pending_destroy_bodies.push(id);
            return Ok(());
        }
        self.destroy_body_now(id);
        Ok(())
    }

    fn destroy_body_now(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get(id.raw()) else {
            return;
        };

        // Joints first: their destruction unlinks edges on both sides.
        let joint_ids: Vec<JointId> = body.joint_edges.iter().map(|e| e.joint).collect();
        for joint_id in joint_ids {
            self.destroy_joint_now(joint_id);
        }

        // Contacts next.
        let contact_ids: Vec<u32> = self
            .bodies
            .get(id.raw())
            .map(|b| b.contact_edges.iter().map(|e| e.contact).collect())
            .unwrap_or_default();
        for contact_id in contact_ids {
            self.contact_manager.destroy(
                contact_id,
                &mut self.bodies,
                &self.fixtures,
                self.listener.as_mut(),
            );
        }

        // Fixtures and their proxies last.
        let fixture_ids: Vec<FixtureId> = self
            .bodies
            .get(id.raw())
            .map(|b| b.fixtures.clone())
            .unwrap_or_default();
        for fixture_id in fixture_ids {
            if let Some(mut fixture) = self.fixtures.remove(fixture_id.0) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        self.bodies.remove(id.raw());
    }

    /// Borrow a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.raw())
    }

    /// Mutably borrow a body.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.raw())
    }

    /// Iterate bodies as `(id, &body)`.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter().map(|(id, body)| (BodyId(id), body))
    }

    /// Enable or disable a body. Disabled bodies keep their state but
    /// drop out of the broad phase entirely: no proxies, no contacts, no
    /// solving.
    pub fn set_body_enabled(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(id.raw()) else {
            return Err(PhysicsError::InvalidBodyId(id.raw()));
        };
        if body.enabled == enabled {
            return Ok(());
        }
        body.enabled = enabled;
        let pose = body.pose;
        let fixture_ids = body.fixtures.clone();

        if enabled {
            for fixture_id in fixture_ids {
                if let Some(fixture) = self.fixtures.get_mut(fixture_id.0) {
                    fixture.create_proxies(
                        fixture_id,
                        &mut self.contact_manager.broad_phase,
                        &pose,
                    );
                }
            }
            self.new_contacts = true;
        } else {
            for fixture_id in fixture_ids {
                if let Some(fixture) = self.fixtures.get_mut(fixture_id.0) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            let contact_ids: Vec<u32> = self
                .bodies
                .get(id.raw())
                .map(|b| b.contact_edges.iter().map(|e| e.contact).collect())
                .unwrap_or_default();
            for contact_id in contact_ids {
                self.contact_manager.destroy(
                    contact_id,
                    &mut self.bodies,
                    &self.fixtures,
                    self.listener.as_mut(),
                );
            }
        }
        Ok(())
    }

    /// Teleport a body, updating its sweep and broad-phase proxies.
    pub fn set_body_transform(
        &mut self,
        id: BodyId,
        position: Point2<f64>,
        angle: f64,
    ) -> Result<()> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(id.raw()) else {
            return Err(PhysicsError::InvalidBodyId(id.raw()));
        };

        body.pose = planar_types::Pose::from_position_angle(position, angle);
        let center = body
            .pose
            .transform_point(&Point2::from(body.sweep.local_center));
        body.sweep.c = center.coords;
        body.sweep.c0 = center.coords;
        body.sweep.a = angle;
        body.sweep.a0 = angle;

        let pose = body.pose;
        let fixture_ids = body.fixtures.clone();
        for fixture_id in fixture_ids {
            if let Some(fixture) = self.fixtures.get_mut(fixture_id.0) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &pose, &pose);
            }
        }
        self.new_contacts = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Attach a fixture to a body and recompute the body's mass.
    pub fn create_fixture(&mut self, body_id: BodyId, def: FixtureDef) -> Result<FixtureId> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if !self.bodies.contains(body_id.raw()) {
            return Err(PhysicsError::InvalidBodyId(body_id.raw()));
        }

        let fixture = Fixture::new(body_id, def);
        let fixture_id = FixtureId(self.fixtures.insert(fixture));

        let pose = self
            .bodies
            .get(body_id.raw())
            .map_or_else(planar_types::Pose::identity, |body| body.pose);

        if let Some(fixture) = self.fixtures.get_mut(fixture_id.0) {
            if self.bodies.get(body_id.raw()).is_some_and(Body::is_enabled) {
                fixture.create_proxies(
                    fixture_id,
                    &mut self.contact_manager.broad_phase,
                    &pose,
                );
            }
        }

        if let Some(body) = self.bodies.get_mut(body_id.raw()) {
            body.fixtures.push(fixture_id);
        }
        self.reset_mass_data(body_id);

        // New proxies need a pair pass before the next collide.
        self.new_contacts = true;
        Ok(fixture_id)
    }

    /// Detach and destroy a fixture. Not allowed while the world is
    /// locked.
    pub fn destroy_fixture(&mut self, fixture_id: FixtureId) -> Result<()> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(fixture) = self.fixtures.get(fixture_id.0) else {
            return Err(PhysicsError::InvalidFixtureId(fixture_id.0));
        };
        let body_id = fixture.body;

        // Destroy any contact touching this fixture.
        let contact_ids: Vec<u32> = self
            .bodies
            .get(body_id.raw())
            .map(|b| b.contact_edges.iter().map(|e| e.contact).collect())
            .unwrap_or_default();
        for contact_id in contact_ids {
            let involved = self
                .contact_manager
                .contacts
                .get(contact_id)
                .is_some_and(|c| c.fixture_a == fixture_id || c.fixture_b == fixture_id);
            if involved {
                self.contact_manager.destroy(
                    contact_id,
                    &mut self.bodies,
                    &self.fixtures,
                    self.listener.as_mut(),
                );
            }
        }

        if let Some(mut fixture) = self.fixtures.remove(fixture_id.0) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_id.raw()) {
            body.fixtures.retain(|&f| f != fixture_id);
        }
        self.reset_mass_data(body_id);
        Ok(())
    }

    /// Borrow a fixture.
    #[must_use]
    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.get(id.0)
    }

    /// Change a fixture's collision filter; affected contacts re-filter
    /// on the next step.
    pub fn set_fixture_filter(
        &mut self,
        fixture_id: FixtureId,
        filter: planar_types::Filter,
    ) -> Result<()> {
        let Some(fixture) = self.fixtures.get_mut(fixture_id.0) else {
            return Err(PhysicsError::InvalidFixtureId(fixture_id.0));
        };
        fixture.filter = filter;
        let body_id = fixture.body;
        let proxies: Vec<i32> = fixture.proxies.iter().map(|p| p.proxy_id).collect();

        // Flag the fixture's contacts for re-filtering.
        if let Some(body) = self.bodies.get(body_id.raw()) {
            for edge in body.contact_edges.clone() {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    if contact.fixture_a == fixture_id || contact.fixture_b == fixture_id {
                        contact.filter_pending = true;
                    }
                }
            }
        }

        // Touch the proxies so new pairs can form.
        for proxy_id in proxies {
            self.contact_manager.broad_phase.touch_proxy(proxy_id);
        }
        self.new_contacts = true;
        Ok(())
    }

    /// Recompute a body's mass from its fixtures.
    fn reset_mass_data(&mut self, body_id: BodyId) {
        let Some(body) = self.bodies.get(body_id.raw()) else {
            return;
        };
        let mut mass_data = planar_types::MassData::default();
        let mut center = Vector2::zeros();
        for &fixture_id in &body.fixtures {
            if let Some(fixture) = self.fixtures.get(fixture_id.0) {
                if fixture.density == 0.0 {
                    continue;
                }
                let fd = fixture.mass_data();
                mass_data.mass += fd.mass;
                center += fd.mass * fd.center;
                mass_data.inertia += fd.inertia;
            }
        }
        if mass_data.mass > 0.0 {
            mass_data.center = center / mass_data.mass;
        }

        if let Some(body) = self.bodies.get_mut(body_id.raw()) {
            body.set_mass_data(&mass_data);
        }
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    /// Create a joint from a definition.
    pub fn create_joint(&mut self, def: JointDef) -> Result<JointId> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }

        let joint = match def {
            JointDef::Distance(ref d) => Joint::Distance(crate::joints::DistanceJoint::new(d)),
            JointDef::Revolute(ref d) => Joint::Revolute(crate::joints::RevoluteJoint::new(d)),
            JointDef::Prismatic(ref d) => {
                Joint::Prismatic(crate::joints::PrismaticJoint::new(d))
            }
            JointDef::Pulley(ref d) => {
                if d.ratio == 0.0 || !d.ratio.is_finite() {
                    return Err(PhysicsError::InvalidRatio(d.ratio));
                }
                Joint::Pulley(crate::joints::PulleyJoint::new(d))
            }
            JointDef::Gear(ref d) => Joint::Gear(self.build_gear(d)?),
            JointDef::Wheel(ref d) => Joint::Wheel(crate::joints::WheelJoint::new(d)),
            JointDef::Weld(ref d) => Joint::Weld(crate::joints::WeldJoint::new(d)),
            JointDef::Friction(ref d) => Joint::Friction(crate::joints::FrictionJoint::new(d)),
            JointDef::Motor(ref d) => Joint::Motor(crate::joints::MotorJoint::new(d)),
            JointDef::Mouse(ref d) => Joint::Mouse(crate::joints::MouseJoint::new(d)),
            JointDef::Rope(ref d) => Joint::Rope(crate::joints::RopeJoint::new(d)),
            JointDef::Angle(ref d) => Joint::Angle(crate::joints::AngleJoint::new(d)),
        };

        let body_a = joint.body_a();
        let body_b = joint.body_b();
        if !self.bodies.contains(body_a.raw()) {
            return Err(PhysicsError::InvalidBodyId(body_a.raw()));
        }
        if !self.bodies.contains(body_b.raw()) {
            return Err(PhysicsError::InvalidBodyId(body_b.raw()));
        }

        let collide_connected = joint.collide_connected();
        let joint_id = JointId(self.joints.insert(joint));

        if let Some(body) = self.bodies.get_mut(body_a.raw()) {
            body.joint_edges.push(JointEdge {
                other: body_b,
                joint: joint_id,
            });
        }
        if let Some(body) = self.bodies.get_mut(body_b.raw()) {
            body.joint_edges.push(JointEdge {
                other: body_a,
                joint: joint_id,
            });
        }

        // Contacts between newly non-colliding bodies must re-filter.
        if !collide_connected {
            self.flag_contacts_for_filtering(body_a, body_b);
        }

        Ok(joint_id)
    }

    fn build_gear(&self, def: &GearJointDef) -> Result<crate::joints::GearJoint> {
        if def.ratio == 0.0 || !def.ratio.is_finite() {
            return Err(PhysicsError::InvalidRatio(def.ratio));
        }

        let snapshot = |joint_id: JointId| {
            let Some(joint) = self.joints.get(joint_id.raw()) else {
                return Err(PhysicsError::InvalidJointId(joint_id.raw()));
            };
            crate::joints::snapshot_gear_side(joint, &self.bodies)
        };

        let (frames_1, coordinate_1) = snapshot(def.joint_1)?;
        let (frames_2, coordinate_2) = snapshot(def.joint_2)?;

        let constant = coordinate_1 + def.ratio * coordinate_2;
        Ok(crate::joints::GearJoint::new(
            frames_1,
            frames_2,
            def.ratio,
            constant,
            def.collide_connected,
        ))
    }

    /// Destroy a joint, waking the connected bodies.
    pub fn destroy_joint(&mut self, id: JointId) -> Result<()> {
        if !self.joints.contains(id.raw()) {
            return Err(PhysicsError::InvalidJointId(id.raw()));
        }
        if self.locked {
            self.pending_destroy_joints.push(id);
            return Ok(());
        }
        self.destroy_joint_now(id);
        Ok(())
    }

    fn destroy_joint_now(&mut self, id: JointId) {
        let Some(joint) = self.joints.remove(id.raw()) else {
            return;
        };
        let body_a = joint.body_a();
        let body_b = joint.body_b();
        let collide_connected = joint.collide_connected();

        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id.raw()) {
                body.joint_edges.retain(|edge| edge.joint != id);
                body.set_awake(true);
            }
        }

        // The pair may collide again; force a filter re-check.
        if !collide_connected {
            self.flag_contacts_for_filtering(body_a, body_b);
        }
    }

    fn flag_contacts_for_filtering(&mut self, body_a: BodyId, body_b: BodyId) {
        if let Some(body) = self.bodies.get(body_a.raw()) {
            for edge in body.contact_edges.clone() {
                if edge.other == body_b {
                    if let Some(contact) =
                        self.contact_manager.contacts.get_mut(edge.contact)
                    {
                        contact.filter_pending = true;
                    }
                }
            }
        }
    }

    /// Borrow a joint.
    #[must_use]
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.raw())
    }

    /// Mutably borrow a joint (to retarget motors, mouse targets, ...).
    #[must_use]
    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.joints.get_mut(id.raw())
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    ///
    /// Must not be called re-entrantly; the world is locked for the
    /// duration.
    pub fn step(&mut self, dt: f64, velocity_iterations: usize, position_iterations: usize) {
        debug_assert!(!self.locked);
        let step_timer = Instant::now();

        if self.new_contacts {
            self.contact_manager.find_new_contacts(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                self.filter_hook.as_mut(),
            );
            self.new_contacts = false;
        }

        self.locked = true;
        self.impulse_log.clear();

        let step = StepConfig {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.warm_starting,
        };

        // Narrow phase: refresh manifolds, fire events, drop dead pairs.
        let timer = Instant::now();
        self.contact_manager.collide(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            self.filter_hook.as_mut(),
            self.listener.as_mut(),
        );
        self.profile.collide = timer.elapsed().as_secs_f64();

        // Discrete solve.
        if self.step_complete && step.dt > 0.0 {
            let timer = Instant::now();
            self.solve(&step);
            self.profile.solve = timer.elapsed().as_secs_f64();
        }

        // Continuous collision.
        if self.continuous_physics && step.dt > 0.0 {
            let timer = Instant::now();
            self.solve_toi(&step);
            self.profile.solve_toi = timer.elapsed().as_secs_f64();
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;

        // Drain deferred destruction.
        let joints: Vec<JointId> = self.pending_destroy_joints.drain(..).collect();
        for id in joints {
            self.destroy_joint_now(id);
        }
        let bodies: Vec<BodyId> = self.pending_destroy_bodies.drain(..).collect();
        for id in bodies {
            self.destroy_body_now(id);
        }

        // Breakables read the impulses the solve just stored.
        self.process_breakables();

        self.profile.step = step_timer.elapsed().as_secs_f64();
    }

    /// Zero all force and torque accumulators.
    pub fn clear_forces(&mut self) {
        for id in self.bodies.ids() {
            if let Some(body) = self.bodies.get_mut(id) {
                body.force = Vector2::zeros();
                body.torque = 0.0;
            }
        }
    }

    /// Shift the world origin, e.g. to re-center a drifting play field.
    pub fn shift_origin(&mut self, new_origin: Vector2<f64>) {
        debug_assert!(!self.locked);
        for id in self.bodies.ids() {
            if let Some(body) = self.bodies.get_mut(id) {
                body.pose.position -= new_origin;
                body.sweep.c0 -= new_origin;
                body.sweep.c -= new_origin;
            }
        }
        self.contact_manager.broad_phase.shift_origin(new_origin);
    }

    fn solve(&mut self, step: &StepConfig) {
        // Clear island flags everywhere.
        for id in self.bodies.ids() {
            if let Some(body) = self.bodies.get_mut(id) {
                body.island_flag = false;
            }
        }
        for id in self.contact_manager.contacts.ids() {
            if let Some(contact) = self.contact_manager.contacts.get_mut(id) {
                contact.island_flag = false;
            }
        }
        let mut joint_visited: hashbrown::HashSet<u32> = hashbrown::HashSet::new();

        // DFS from every awake dynamic seed.
        let mut stack: Vec<BodyId> = Vec::new();
        for seed_raw in self.bodies.ids() {
            let seed_id = BodyId(seed_raw);
            {
                let Some(seed) = self.bodies.get(seed_raw) else {
                    continue;
                };
                if seed.island_flag || !seed.awake || !seed.enabled {
                    continue;
                }
                if seed.body_type == BodyType::Static {
                    continue;
                }
            }

            self.island.clear();
            stack.clear();
            stack.push(seed_id);
            if let Some(seed) = self.bodies.get_mut(seed_raw) {
                seed.island_flag = true;
            }

            while let Some(body_id) = stack.pop() {
                let is_static;
                {
                    let Some(body) = self.bodies.get_mut(body_id.raw()) else {
                        continue;
                    };
                    debug_assert!(body.enabled);
                    self.island.add_body(body_id, body);
                    is_static = body.body_type == BodyType::Static;
                    if !is_static {
                        // Everything connected to an awake body stays up.
                        body.awake = true;
                    }
                }

                // Statics anchor the island but don't propagate it.
                if is_static {
                    continue;
                }

                let contact_edges = self
                    .bodies
                    .get(body_id.raw())
                    .map(|b| b.contact_edges.clone())
                    .unwrap_or_default();
                for edge in contact_edges {
                    let admit = {
                        let Some(contact) = self.contact_manager.contacts.get(edge.contact)
                        else {
                            continue;
                        };
                        if contact.island_flag || !contact.enabled || !contact.touching {
                            false
                        } else {
                            let sensor = self
                                .fixtures
                                .get(contact.fixture_a.0)
                                .is_some_and(|f| f.is_sensor)
                                || self
                                    .fixtures
                                    .get(contact.fixture_b.0)
                                    .is_some_and(|f| f.is_sensor);
                            !sensor
                        }
                    };
                    if !admit {
                        continue;
                    }

                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.island_flag = true;
                    }
                    self.island.contacts.push(edge.contact);

                    if let Some(other) = self.bodies.get_mut(edge.other.raw()) {
                        if !other.island_flag {
                            other.island_flag = true;
                            stack.push(edge.other);
                        }
                    }
                }

                let joint_edges = self
                    .bodies
                    .get(body_id.raw())
                    .map(|b| b.joint_edges.clone())
                    .unwrap_or_default();
                for edge in joint_edges {
                    if joint_visited.contains(&edge.joint.raw()) {
                        continue;
                    }
                    let other_enabled = self
                        .bodies
                        .get(edge.other.raw())
                        .is_some_and(|b| b.enabled);
                    if !other_enabled {
                        continue;
                    }

                    joint_visited.insert(edge.joint.raw());
                    self.island.joints.push(edge.joint);

                    // Gears also anchor to the ground bodies of their
                    // underlying joints.
                    let extra = self
                        .joints
                        .get(edge.joint.raw())
                        .map_or([None, None], Joint::extra_bodies);
                    for other_id in
                        std::iter::once(edge.other).chain(extra.into_iter().flatten())
                    {
                        if let Some(other) = self.bodies.get_mut(other_id.raw()) {
                            if !other.island_flag {
                                other.island_flag = true;
                                stack.push(other_id);
                            }
                        }
                    }
                }
            }

            self.island.solve(
                step,
                self.gravity,
                self.allow_sleeping,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &self.fixtures,
                &mut self.joints,
                self.listener.as_mut(),
            );
            Self::log_reported_impulses(&self.island.reported, &mut self.impulse_log);

            // Statics may participate in several islands.
            for &body_id in &self.island.bodies {
                if let Some(body) = self.bodies.get_mut(body_id.raw()) {
                    if body.body_type == BodyType::Static {
                        body.island_flag = false;
                    }
                }
            }
        }

        // Broad-phase sync for everything that moved, then new pairs.
        for raw in self.bodies.ids() {
            let sync = self.bodies.get(raw).is_some_and(|b| {
                b.island_flag && b.body_type != BodyType::Static
            });
            if sync {
                self.synchronize_fixtures(BodyId(raw));
            }
        }
        self.contact_manager.find_new_contacts(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            self.filter_hook.as_mut(),
        );
    }

    fn synchronize_fixtures(&mut self, body_id: BodyId) {
        let Some(body) = self.bodies.get(body_id.raw()) else {
            return;
        };
        let pose1 = body.sweep.pose_at(0.0);
        let pose2 = body.pose;
        let fixture_ids = body.fixtures.clone();
        for fixture_id in fixture_ids {
            if let Some(fixture) = self.fixtures.get_mut(fixture_id.0) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &pose1, &pose2);
            }
        }
    }

    /// Continuous collision: find the earliest TOI among eligible
    /// contacts, advance and resolve it, and repeat until the step is
    /// consumed.
    #[allow(clippy::too_many_lines)]
    fn solve_toi(&mut self, step: &StepConfig) {
        if self.step_complete {
            for raw in self.bodies.ids() {
                if let Some(body) = self.bodies.get_mut(raw) {
                    body.island_flag = false;
                    body.sweep.alpha0 = 0.0;
                }
            }
            for id in self.contact_manager.contacts.ids() {
                if let Some(contact) = self.contact_manager.contacts.get_mut(id) {
                    contact.island_flag = false;
                    contact.toi_valid = false;
                    contact.toi_count = 0;
                    contact.toi = 1.0;
                }
            }
        }

        // Find TOI events and solve them.
        loop {
            // Find the first TOI.
            let mut min_contact: Option<u32> = None;
            let mut min_alpha = 1.0_f64;

            for contact_id in self.contact_manager.contacts.ids() {
                let alpha = {
                    let Some(contact) = self.contact_manager.contacts.get(contact_id) else {
                        continue;
                    };
                    if !contact.enabled {
                        continue;
                    }
                    // Cap the number of sub-steps per contact to bound
                    // runaway tunneling loops.
                    if contact.toi_count > MAX_SUB_STEPS {
                        continue;
                    }

                    if contact.toi_valid {
                        contact.toi
                    } else {
                        let (fixture_a_id, fixture_b_id) =
                            (contact.fixture_a, contact.fixture_b);
                        let (child_a, child_b) = (contact.child_a, contact.child_b);

                        let (Some(fixture_a), Some(fixture_b)) = (
                            self.fixtures.get(fixture_a_id.0),
                            self.fixtures.get(fixture_b_id.0),
                        ) else {
                            continue;
                        };
                        if fixture_a.is_sensor || fixture_b.is_sensor {
                            continue;
                        }

                        let body_a_id = fixture_a.body;
                        let body_b_id = fixture_b.body;

                        let eligible = {
                            let (Some(body_a), Some(body_b)) = (
                                self.bodies.get(body_a_id.raw()),
                                self.bodies.get(body_b_id.raw()),
                            ) else {
                                continue;
                            };
                            let type_a = body_a.body_type;
                            let type_b = body_b.body_type;
                            debug_assert!(
                                type_a == BodyType::Dynamic || type_b == BodyType::Dynamic
                            );

                            let active_a =
                                body_a.awake && type_a != BodyType::Static;
                            let active_b =
                                body_b.awake && type_b != BodyType::Static;
                            let collide_a =
                                body_a.bullet || type_a != BodyType::Dynamic;
                            let collide_b =
                                body_b.bullet || type_b != BodyType::Dynamic;

                            (active_a || active_b) && (collide_a || collide_b)
                        };
                        if !eligible {
                            continue;
                        }

                        // Advance the lagging body's sweep to a common
                        // baseline time.
                        let alpha0 = {
                            let a0_a = self
                                .bodies
                                .get(body_a_id.raw())
                                .map_or(0.0, |b| b.sweep.alpha0);
                            let a0_b = self
                                .bodies
                                .get(body_b_id.raw())
                                .map_or(0.0, |b| b.sweep.alpha0);
                            let alpha0 = a0_a.max(a0_b);
                            if a0_a < alpha0 {
                                if let Some(body) = self.bodies.get_mut(body_a_id.raw()) {
                                    body.sweep.advance(alpha0);
                                }
                            } else if a0_b < alpha0 {
                                if let Some(body) = self.bodies.get_mut(body_b_id.raw()) {
                                    body.sweep.advance(alpha0);
                                }
                            }
                            alpha0
                        };
                        debug_assert!(alpha0 < 1.0);

                        let (sweep_a, sweep_b, shape_a, shape_b) = {
                            let (Some(body_a), Some(body_b)) = (
                                self.bodies.get(body_a_id.raw()),
                                self.bodies.get(body_b_id.raw()),
                            ) else {
                                continue;
                            };
                            (
                                body_a.sweep,
                                body_b.sweep,
                                fixture_a.shape.clone(),
                                fixture_b.shape.clone(),
                            )
                        };

                        let input = ToiInput {
                            proxy_a: DistanceProxy::from_shape(&shape_a, child_a),
                            proxy_b: DistanceProxy::from_shape(&shape_b, child_b),
                            sweep_a,
                            sweep_b,
                            t_max: 1.0,
                        };
                        let output = time_of_impact(&input);

                        // Beta is the TOI within the remaining interval.
                        let beta = output.t;
                        let alpha = if output.state == ToiState::Touching {
                            (alpha0 + (1.0 - alpha0) * beta).min(1.0)
                        } else {
                            // A failed TOI still yields a conservative
                            // safe time; anything else means no impact.
                            1.0
                        };

                        if let Some(contact) =
                            self.contact_manager.contacts.get_mut(contact_id)
                        {
                            contact.toi = alpha;
                            contact.toi_valid = true;
                        }
                        alpha
                    }
                };

                if alpha < min_alpha {
                    min_contact = Some(contact_id);
                    min_alpha = alpha;
                }
            }

            let Some(contact_id) = min_contact else {
                self.step_complete = true;
                break;
            };
            if min_alpha > 1.0 - 10.0 * f64::EPSILON {
                // No more TOI events this step.
                self.step_complete = true;
                break;
            }

            // Advance the two bodies to the TOI.
            let (body_a_id, body_b_id) = {
                let Some(contact) = self.contact_manager.contacts.get(contact_id) else {
                    continue;
                };
                let (Some(fixture_a), Some(fixture_b)) = (
                    self.fixtures.get(contact.fixture_a.0),
                    self.fixtures.get(contact.fixture_b.0),
                ) else {
                    continue;
                };
                (fixture_a.body, fixture_b.body)
            };

            let backup_a = self.bodies.get(body_a_id.raw()).map(|b| b.sweep);
            let backup_b = self.bodies.get(body_b_id.raw()).map(|b| b.sweep);

            if let Some(body) = self.bodies.get_mut(body_a_id.raw()) {
                body.advance(min_alpha);
            }
            if let Some(body) = self.bodies.get_mut(body_b_id.raw()) {
                body.advance(min_alpha);
            }

            // The TOI contact needs a fresh manifold at the new poses.
            self.contact_manager.update_contact(
                contact_id,
                &mut self.bodies,
                &self.fixtures,
                self.listener.as_mut(),
            );
            if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                contact.toi_valid = false;
                contact.toi_count += 1;
            }

            let (is_enabled, is_touching) = self
                .contact_manager
                .contacts
                .get(contact_id)
                .map_or((false, false), |c| (c.enabled, c.touching));
            if !is_enabled || !is_touching {
                // Spurious event: restore the sweeps and move on.
                if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                    contact.enabled = false;
                }
                if let (Some(backup), Some(body)) =
                    (backup_a, self.bodies.get_mut(body_a_id.raw()))
                {
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                if let (Some(backup), Some(body)) =
                    (backup_b, self.bodies.get_mut(body_b_id.raw()))
                {
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                continue;
            }

            let mut involved_bullet = false;
            for body_id in [body_a_id, body_b_id] {
                if let Some(body) = self.bodies.get_mut(body_id.raw()) {
                    body.set_awake(true);
                    involved_bullet |= body.bullet;
                }
            }
            if involved_bullet {
                if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                    contact.bullet_hit = true;
                }
            }

            // Build the sub-island: the two TOI bodies plus whatever
            // their (dynamic-vs-bullet eligible) contacts can reach.
            self.toi_island.clear();
            for body_id in [body_a_id, body_b_id] {
                if let Some(body) = self.bodies.get_mut(body_id.raw()) {
                    body.island_flag = true;
                    self.toi_island.add_body(body_id, body);
                }
            }
            if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                contact.island_flag = true;
            }
            self.toi_island.contacts.push(contact_id);

            for seed_id in [body_a_id, body_b_id] {
                let seed_is_dynamic = self
                    .bodies
                    .get(seed_id.raw())
                    .is_some_and(|b| b.body_type == BodyType::Dynamic);
                if !seed_is_dynamic {
                    continue;
                }

                let seed_bullet = self
                    .bodies
                    .get(seed_id.raw())
                    .is_some_and(|b| b.bullet);

                let edges = self
                    .bodies
                    .get(seed_id.raw())
                    .map(|b| b.contact_edges.clone())
                    .unwrap_or_default();
                for edge in edges {
                    if self.toi_island.bodies.len() >= 2 * MAX_TOI_CONTACTS
                        || self.toi_island.contacts.len() >= MAX_TOI_CONTACTS
                    {
                        break;
                    }

                    let admit = {
                        let Some(contact) = self.contact_manager.contacts.get(edge.contact)
                        else {
                            continue;
                        };
                        if contact.island_flag {
                            continue;
                        }
                        let other_dynamic = self
                            .bodies
                            .get(edge.other.raw())
                            .is_some_and(|b| b.body_type == BodyType::Dynamic);
                        let other_bullet = self
                            .bodies
                            .get(edge.other.raw())
                            .is_some_and(|b| b.bullet);
                        // Only bullets collide dynamic-on-dynamic mid
                        // sub-step.
                        if other_dynamic && !seed_bullet && !other_bullet {
                            continue;
                        }
                        let sensor = self
                            .fixtures
                            .get(contact.fixture_a.0)
                            .is_some_and(|f| f.is_sensor)
                            || self
                                .fixtures
                                .get(contact.fixture_b.0)
                                .is_some_and(|f| f.is_sensor);
                        !sensor
                    };
                    if !admit {
                        continue;
                    }

                    // Tentatively advance the other body to the TOI.
                    let other_flagged = self
                        .bodies
                        .get(edge.other.raw())
                        .is_some_and(|b| b.island_flag);
                    let backup = self.bodies.get(edge.other.raw()).map(|b| b.sweep);
                    if !other_flagged {
                        if let Some(other) = self.bodies.get_mut(edge.other.raw()) {
                            other.advance(min_alpha);
                        }
                    }

                    self.contact_manager.update_contact(
                        edge.contact,
                        &mut self.bodies,
                        &self.fixtures,
                        self.listener.as_mut(),
                    );

                    let (enabled, touching) = self
                        .contact_manager
                        .contacts
                        .get(edge.contact)
                        .map_or((false, false), |c| (c.enabled, c.touching));
                    if !enabled || !touching {
                        if !other_flagged {
                            if let (Some(backup), Some(other)) =
                                (backup, self.bodies.get_mut(edge.other.raw()))
                            {
                                other.sweep = backup;
                                other.synchronize_transform();
                            }
                        }
                        continue;
                    }

                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact)
                    {
                        contact.island_flag = true;
                    }
                    self.toi_island.contacts.push(edge.contact);

                    if !other_flagged {
                        if let Some(other) = self.bodies.get_mut(edge.other.raw()) {
                            other.island_flag = true;
                            if other.body_type != BodyType::Static {
                                other.set_awake(true);
                            }
                            self.toi_island.add_body(edge.other, other);
                        }
                    }
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = StepConfig {
                dt,
                inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: 20,
                warm_starting: false,
            };

            let toi_index_a = self
                .bodies
                .get(body_a_id.raw())
                .map_or(0, |b| b.island_index);
            let toi_index_b = self
                .bodies
                .get(body_b_id.raw())
                .map_or(0, |b| b.island_index);
            self.toi_island.solve_toi(
                &sub_step,
                toi_index_a,
                toi_index_b,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &self.fixtures,
                self.listener.as_mut(),
            );
            Self::log_reported_impulses(&self.toi_island.reported, &mut self.impulse_log);

            // Reset flags, sync moved bodies, and invalidate cached TOIs
            // on everything they touch.
            let island_bodies = self.toi_island.bodies.clone();
            for body_id in island_bodies {
                if let Some(body) = self.bodies.get_mut(body_id.raw()) {
                    body.island_flag = false;
                    if body.body_type != BodyType::Dynamic {
                        continue;
                    }
                }
                self.synchronize_fixtures(body_id);

                let edges = self
                    .bodies
                    .get(body_id.raw())
                    .map(|b| b.contact_edges.clone())
                    .unwrap_or_default();
                for edge in edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact)
                    {
                        contact.toi_valid = false;
                        contact.island_flag = false;
                    }
                }
            }

            // Moved bodies may have tunneled into fresh pairs; the next
            // TOI search must see them.
            self.contact_manager.find_new_contacts(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                self.filter_hook.as_mut(),
            );

            if self.sub_stepping {
                debug!("sub-stepping: yielding after one TOI event");
                self.step_complete = false;
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Visit every fixture whose fat AABB overlaps `aabb`. Return `false`
    /// from the callback to stop early.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(FixtureId) -> bool) {
        self.contact_manager.broad_phase.query(aabb, |proxy_id| {
            let key = self.contact_manager.broad_phase.user_data(proxy_id);
            callback(key.fixture)
        });
    }

    /// Cast a ray from `p1` to `p2`, reporting exact shape hits.
    ///
    /// The callback's [`RayCastBehavior`] controls the traversal: clip to
    /// find the closest hit, continue to enumerate all hits, terminate
    /// to stop.
    pub fn ray_cast(
        &self,
        p1: Point2<f64>,
        p2: Point2<f64>,
        mut callback: impl FnMut(RayCastHit) -> RayCastBehavior,
    ) {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        self.contact_manager
            .broad_phase
            .ray_cast(&input, |sub_input, proxy_id| {
                let key = self.contact_manager.broad_phase.user_data(proxy_id);
                let Some(fixture) = self.fixtures.get(key.fixture.0) else {
                    return -1.0;
                };
                let Some(body) = self.bodies.get(fixture.body.raw()) else {
                    return -1.0;
                };

                let Some(output) =
                    fixture
                        .shape
                        .ray_cast(sub_input, &body.pose, key.child_index)
                else {
                    // Fat-AABB hit but the shape itself missed.
                    return -1.0;
                };

                let fraction = output.fraction;
                let point = p1 + fraction * (p2 - p1);
                match callback(RayCastHit {
                    fixture: key.fixture,
                    point,
                    normal: output.normal,
                    fraction,
                }) {
                    RayCastBehavior::Terminate => 0.0,
                    RayCastBehavior::Ignore => -1.0,
                    RayCastBehavior::Clip(f) => f,
                    RayCastBehavior::Continue => sub_input.max_fraction,
                }
            });
    }

    /// Exact overlap test between two fixtures' current shapes.
    #[must_use]
    pub fn test_overlap(&self, fixture_a: FixtureId, fixture_b: FixtureId) -> bool {
        let (Some(fa), Some(fb)) = (self.fixtures.get(fixture_a.0), self.fixtures.get(fixture_b.0))
        else {
            return false;
        };
        let (Some(ba), Some(bb)) = (
            self.bodies.get(fa.body.raw()),
            self.bodies.get(fb.body.raw()),
        ) else {
            return false;
        };
        // Multi-child shapes overlap when any child pair does.
        for child_a in 0..fa.shape.child_count() {
            for child_b in 0..fb.shape.child_count() {
                if planar_collision::test_overlap(
                    &fa.shape, child_a, &fb.shape, child_b, &ba.pose, &bb.pose,
                ) {
                    return true;
                }
            }
        }
        false
    }
}
