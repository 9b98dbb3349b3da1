//! Joint constraints connecting pairs of bodies.
//!
//! Every joint removes some degrees of freedom between two bodies. The
//! solver treats them uniformly: each variant implements three
//! operations against the island's staged state,
//!
//! - `init_velocity_constraints` - cache anchors and effective masses,
//!   apply warm-start impulses,
//! - `solve_velocity_constraints` - one sequential-impulse iteration,
//! - `solve_position_constraints` - one position correction, reporting
//!   whether the error is inside the slop.
//!
//! Soft joints (distance, weld, wheel, mouse) take **stiffness** (N/m)
//! and **damping** (N·s/m) directly. For callers who think in terms of
//! frequency and damping ratio,
//! [`linear_stiffness`](planar_types::settings::linear_stiffness) and
//! [`angular_stiffness`](planar_types::settings::angular_stiffness)
//! convert.
//!
//! | Joint | DOF removed | Key state |
//! |-------|-------------|-----------|
//! | Distance | 1 | length, min/max, stiffness, damping |
//! | Revolute | 2 | reference angle, limit, motor |
//! | Prismatic | 2 | axis, limit, motor |
//! | Wheel | 1 | axis, suspension stiffness/damping, motor |
//! | Weld | 3 | reference angle, stiffness, damping |
//! | Pulley | 1 | ground anchors, ratio |
//! | Gear | 1 | two revolute/prismatic joints, ratio |
//! | Friction | 2+1 | max force, max torque |
//! | Motor | 2+1 | target offsets, max force/torque |
//! | Mouse | 2 | target point, stiffness, damping |
//! | Rope | 1 | max length |
//! | Angle | 1 | target relative angle |

mod angle;
mod distance;
mod friction;
mod gear;
mod motor;
mod mouse;
mod prismatic;
mod pulley;
mod revolute;
mod rope;
mod weld;
mod wheel;

pub use angle::{AngleJoint, AngleJointDef};
pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use motor::{MotorJoint, MotorJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use rope::{RopeJoint, RopeJointDef};
pub use weld::{WeldJoint, WeldJointDef};
pub use wheel::{WheelJoint, WheelJointDef};

pub(crate) use gear::snapshot_side as snapshot_gear_side;

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a joint in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub u32);

impl JointId {
    /// Create a joint ID from its raw value.
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

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Construction parameters for any joint variant.
#[derive(Debug, Clone)]
pub enum JointDef {
    /// Keep two anchor points at a distance.
    Distance(DistanceJointDef),
    /// Pin two bodies at a point, free rotation.
    Revolute(RevoluteJointDef),
    /// Slide along an axis, no relative rotation.
    Prismatic(PrismaticJointDef),
    /// Idealized pulley between two bodies and two ground anchors.
    Pulley(PulleyJointDef),
    /// Couple the coordinates of two revolute/prismatic joints.
    Gear(GearJointDef),
    /// Suspension: line constraint + spring + motor.
    Wheel(WheelJointDef),
    /// Rigid (or softly rigid) attachment.
    Weld(WeldJointDef),
    /// Top-down friction between two bodies.
    Friction(FrictionJointDef),
    /// Drive a body toward a target offset from another.
    Motor(MotorJointDef),
    /// Drag a body toward a world point (mouse picking).
    Mouse(MouseJointDef),
    /// Rope: a hard upper bound on anchor distance.
    Rope(RopeJointDef),
    /// Keep the relative angle of two bodies at a target.
    Angle(AngleJointDef),
}

/// A joint constraint between two bodies.
///
/// Variants are constructed through
/// [`World::create_joint`](crate::World::create_joint).
#[derive(Debug, Clone)]
pub enum Joint {
    /// See [`DistanceJoint`].
    Distance(DistanceJoint),
    /// See [`RevoluteJoint`].
    Revolute(RevoluteJoint),
    /// See [`PrismaticJoint`].
    Prismatic(PrismaticJoint),
    /// See [`PulleyJoint`].
    Pulley(PulleyJoint),
    /// See [`GearJoint`].
    Gear(GearJoint),
    /// See [`WheelJoint`].
    Wheel(WheelJoint),
    /// See [`WeldJoint`].
    Weld(WeldJoint),
    /// See [`FrictionJoint`].
    Friction(FrictionJoint),
    /// See [`MotorJoint`].
    Motor(MotorJoint),
    /// See [`MouseJoint`].
    Mouse(MouseJoint),
    /// See [`RopeJoint`].
    Rope(RopeJoint),
    /// See [`AngleJoint`].
    Angle(AngleJoint),
}

macro_rules! dispatch {
    ($self:expr, $joint:ident => $body:expr) => {
        match $self {
            Joint::Distance($joint) => $body,
            Joint::Revolute($joint) => $body,
            Joint::Prismatic($joint) => $body,
            Joint::Pulley($joint) => $body,
            Joint::Gear($joint) => $body,
            Joint::Wheel($joint) => $body,
            Joint::Weld($joint) => $body,
            Joint::Friction($joint) => $body,
            Joint::Motor($joint) => $body,
            Joint::Mouse($joint) => $body,
            Joint::Rope($joint) => $body,
            Joint::Angle($joint) => $body,
        }
    };
}

impl Joint {
    /// First connected body.
    #[must_use]
    pub fn body_a(&self) -> BodyId {
        dispatch!(self, j => j.body_a)
    }

    /// Second connected body.
    #[must_use]
    pub fn body_b(&self) -> BodyId {
        dispatch!(self, j => j.body_b)
    }

    /// Whether the connected bodies may still collide with each other.
    #[must_use]
    pub fn collide_connected(&self) -> bool {
        dispatch!(self, j => j.collide_connected)
    }

    /// Additional bodies the joint constrains beyond A and B (gear
    /// joints reference the bodies of their underlying joints).
    pub(crate) fn extra_bodies(&self) -> [Option<BodyId>; 2] {
        match self {
            Joint::Gear(g) => g.extra_bodies(),
            _ => [None, None],
        }
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        bodies: &Arena<Body>,
    ) {
        dispatch!(self, j => j.init_velocity_constraints(data, bodies));
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        dispatch!(self, j => j.solve_velocity_constraints(data));
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        dispatch!(self, j => j.solve_position_constraints(data))
    }
}

/// Mass data a joint caches from its bodies at solver init.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BodySolverInfo {
    pub index: usize,
    pub local_center: planar_types::Vector2<f64>,
    pub inv_mass: f64,
    pub inv_inertia: f64,
}

pub(crate) fn body_solver_info(bodies: &Arena<Body>, id: BodyId) -> BodySolverInfo {
    bodies.get(id.raw()).map_or_else(BodySolverInfo::default, |body| BodySolverInfo {
        index: body.island_index,
        local_center: body.sweep.local_center,
        inv_mass: body.inv_mass,
        inv_inertia: body.inv_inertia,
    })
}

/// Shared scaffolding for the per-joint unit tests: bodies staged the
/// way an island stages them, with flat position/velocity arrays indexed
/// by island index.
#[cfg(test)]
pub(crate) mod test_util {
    use nalgebra::Point2;
    use planar_types::{MassData, Vector2};

    use crate::arena::Arena;
    use crate::body::{Body, BodyDef, BodyId};
    use crate::time_step::{Position, SolverData, StepConfig, Velocity};

    /// Step parameters the joint tests solve against.
    pub fn step_config(dt: f64) -> StepConfig {
        StepConfig {
            dt,
            inv_dt: 1.0 / dt,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    /// A unit-mass, unit-inertia dynamic body at `position`.
    pub fn dynamic_body(position: Point2<f64>) -> Body {
        let mut body = Body::new(&BodyDef::dynamic(position));
        body.set_mass_data(&MassData {
            mass: 1.0,
            center: Vector2::zeros(),
            inertia: 1.0,
        });
        body
    }

    /// An immovable body at `position`.
    pub fn static_body(position: Point2<f64>) -> Body {
        Body::new(&BodyDef::fixed(position))
    }

    /// Bodies plus the staged island-local state.
    pub struct Rig {
        pub bodies: Arena<Body>,
        pub ids: Vec<BodyId>,
        pub positions: Vec<Position>,
        pub velocities: Vec<Velocity>,
    }

    impl Rig {
        /// Stage the given bodies in order; each gets the island index
        /// matching its slot in the position/velocity arrays.
        pub fn new(list: Vec<Body>) -> Self {
            let mut bodies = Arena::new();
            let mut ids = Vec::new();
            let mut positions = Vec::new();
            let mut velocities = Vec::new();
            for (index, mut body) in list.into_iter().enumerate() {
                body.island_index = index;
                positions.push(Position {
                    c: body.sweep.c,
                    a: body.sweep.a,
                });
                velocities.push(Velocity {
                    v: body.linear_velocity,
                    w: body.angular_velocity,
                });
                ids.push(BodyId(bodies.insert(body)));
            }
            Self {
                bodies,
                ids,
                positions,
                velocities,
            }
        }
    }

    /// Split a rig into the solver view a joint consumes.
    pub fn split(rig: &mut Rig, step: StepConfig) -> (SolverData<'_>, &Arena<Body>) {
        (
            SolverData {
                step,
                positions: &mut rig.positions,
                velocities: &mut rig.velocities,
            },
            &rig.bodies,
        )
    }
}
