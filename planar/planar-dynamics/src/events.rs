//! Listener traits and callback data for contact events and queries.
//!
//! Listeners receive plain data (ids, manifold copies, impulses) rather
//! than world references, so a listener cannot re-enter the world while
//! it is mid-step; re-entrant mutation is a programming error the type
//! system rules out here.

use planar_collision::Manifold;
use planar_types::settings::MAX_MANIFOLD_POINTS;
use planar_types::{Point2, Vector2};

use crate::body::BodyId;
use crate::fixture::FixtureId;

/// Identifies a contact to a listener: the two fixtures, their chain
/// child indices, and the owning bodies.
#[derive(Debug, Clone, Copy)]
pub struct ContactView {
    /// First fixture of the pair.
    pub fixture_a: FixtureId,
    /// Second fixture of the pair.
    pub fixture_b: FixtureId,
    /// Chain child index on fixture A.
    pub child_a: usize,
    /// Chain child index on fixture B.
    pub child_b: usize,
    /// Body owning fixture A.
    pub body_a: BodyId,
    /// Body owning fixture B.
    pub body_b: BodyId,
    /// The contact's current manifold.
    pub manifold: Manifold,
}

/// Impulses applied by the solver at one contact, reported to
/// [`ContactListener::post_solve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactImpulse {
    /// Normal impulses per manifold point.
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    /// Tangent impulses per manifold point.
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    /// Number of valid entries.
    pub count: usize,
}

/// Contact lifecycle callbacks, fired synchronously during
/// [`World::step`](crate::World::step).
///
/// All methods default to no-ops so implementers override only what they
/// need.
pub trait ContactListener {
    /// Two fixtures began touching.
    fn begin_contact(&mut self, contact: &ContactView) {
        let _ = contact;
    }

    /// Two fixtures stopped touching.
    fn end_contact(&mut self, contact: &ContactView) {
        let _ = contact;
    }

    /// A touching non-sensor contact is about to enter the solver.
    ///
    /// `old_manifold` is the manifold from the previous step. Return
    /// `false` to disable the contact for this step only.
    fn pre_solve(&mut self, contact: &ContactView, old_manifold: &Manifold) -> bool {
        let _ = (contact, old_manifold);
        true
    }

    /// The velocity solver finished with this contact; the impulses are
    /// what it applied. Useful for impulse-driven game logic such as
    /// breakage thresholds.
    fn post_solve(&mut self, contact: &ContactView, impulse: &ContactImpulse) {
        let _ = (contact, impulse);
    }
}

/// Creation-time contact filtering hook, consulted after the fixtures'
/// own [`Filter`](planar_types::Filter) bits allow the pair.
pub trait ContactFilterHook {
    /// Return `false` to prevent the contact from ever being created.
    fn should_collide(&mut self, fixture_a: FixtureId, fixture_b: FixtureId) -> bool;
}

/// One ray-cast hit reported to the world's ray-cast callback.
#[derive(Debug, Clone, Copy)]
pub struct RayCastHit {
    /// The fixture that was hit.
    pub fixture: FixtureId,
    /// World-space hit point.
    pub point: Point2<f64>,
    /// Surface normal at the hit point.
    pub normal: Vector2<f64>,
    /// Fraction along the ray at the hit.
    pub fraction: f64,
}

/// What the ray-cast callback wants next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayCastBehavior {
    /// Stop the ray cast entirely.
    Terminate,
    /// Ignore this hit and keep the current ray length.
    Ignore,
    /// Clip the ray to the given fraction and continue.
    Clip(f64),
    /// Continue with the full ray length.
    Continue,
}
