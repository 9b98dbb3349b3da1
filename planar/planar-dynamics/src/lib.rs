//! Rigid-body dynamics for the planar 2D physics engine.
//!
//! This crate turns the geometric kernels of `planar-collision` into a
//! stepping simulation: bodies carry shapes through the world, contacts
//! and joints constrain them, and [`World::step`] advances everything by
//! one timestep.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          World                               │
//! │  bodies, fixtures, joints, contact manager, listeners       │
//! └──────────────┬──────────────────────────┬───────────────────┘
//!                │ per step                 │ per TOI event
//!                ▼                          ▼
//! ┌──────────────────────────┐  ┌──────────────────────────────┐
//! │          Island           │  │        TOI sub-island        │
//! │  DFS over the contact/   │  │  min-TOI contact + advance + │
//! │  joint graph, staged     │  │  strict position resolution  │
//! │  solve, island sleep     │  │  + remainder integration     │
//! └──────────────┬───────────┘  └──────────────────────────────┘
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │              ContactSolver / joint constraints               │
//! │  warm-started sequential impulses + block LCP + Baumgarte    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use planar_dynamics::{BodyDef, FixtureDef, World};
//! use planar_types::{PolygonShape, Vector2};
//! use nalgebra::Point2;
//!
//! let mut world = World::new(Vector2::new(0.0, -10.0));
//!
//! // Ground.
//! let ground = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
//! world
//!     .create_fixture(ground, FixtureDef::new(PolygonShape::new_box(50.0, 1.0)))
//!     .unwrap();
//!
//! // A falling crate.
//! let body = world
//!     .create_body(&BodyDef::dynamic(Point2::new(0.0, 10.0)))
//!     .unwrap();
//! world
//!     .create_fixture(
//!         body,
//!         FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
//!     )
//!     .unwrap();
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0, 8, 3);
//! }
//!
//! // Resting on the ground: top of the ground box + half extent.
//! let y = world.body(body).unwrap().position().y;
//! assert!((y - 1.5).abs() < 0.05, "body should rest at y=1.5, got {y}");
//! ```

#![doc(html_root_url = "https://docs.rs/planar-dynamics/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions,   // ContactListener etc. read better qualified
)]

mod arena;
mod body;
mod breakable;
mod contact;
mod contact_manager;
mod contact_solver;
mod events;
mod fixture;
mod island;
mod joints;
mod time_step;
mod world;

pub use body::{Body, BodyDef, BodyId, BodyType};
pub use events::{
    ContactFilterHook, ContactImpulse, ContactListener, ContactView, RayCastBehavior, RayCastHit,
};
pub use fixture::{Fixture, FixtureDef, FixtureId, FixtureProxyKey};
pub use joints::{
    AngleJoint, AngleJointDef, DistanceJoint, DistanceJointDef, FrictionJoint, FrictionJointDef,
    GearJoint, GearJointDef, Joint, JointDef, JointId, MotorJoint, MotorJointDef, MouseJoint,
    MouseJointDef, PrismaticJoint, PrismaticJointDef, PulleyJoint, PulleyJointDef, RevoluteJoint,
    RevoluteJointDef, RopeJoint, RopeJointDef, WeldJoint, WeldJointDef, WheelJoint, WheelJointDef,
};
pub use world::{Profile, World};

// Re-export the error surface and the manifold types that appear in the
// listener API, so most callers only need this crate plus nalgebra.
pub use planar_collision::{Manifold, ManifoldKind, WorldManifold};
pub use planar_types::{PhysicsError, Result};
