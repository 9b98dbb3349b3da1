//! Gear joint: couples the coordinates of two revolute or prismatic
//! joints so `coordinate_1 + ratio * coordinate_2` stays constant.
//!
//! A gear involves four bodies: the two joints' ground bodies (C, D) and
//! their moving bodies (A, B). The gear's frames are snapshotted from
//! the underlying joints when it is created; destroying those joints
//! afterwards leaves the gear operating on the snapshot.

use nalgebra::UnitComplex;
use planar_types::settings::LINEAR_SLOP;
use planar_types::{cross, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo, Joint, JointId};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`GearJoint`].
///
/// Both referenced joints must be revolute or prismatic, and the moving
/// body of each becomes body A / body B of the gear.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GearJointDef {
    /// First underlying joint (its body B becomes the gear's body A).
    pub joint_1: JointId,
    /// Second underlying joint (its body B becomes the gear's body B).
    pub joint_2: JointId,
    /// Transmission ratio. Must be non-zero.
    pub ratio: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl GearJointDef {
    /// A gear with the given ratio.
    #[must_use]
    pub fn new(joint_1: JointId, joint_2: JointId, ratio: f64) -> Self {
        Self {
            joint_1,
            joint_2,
            ratio,
            collide_connected: false,
        }
    }
}

/// Snapshot of one side of the gear: the frames of an underlying
/// revolute or prismatic joint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GearSide {
    /// Ground body of the underlying joint.
    pub body_ground: BodyId,
    /// Moving body of the underlying joint.
    pub body_moving: BodyId,
    /// Anchor on the ground body, in its local frame.
    pub local_anchor_ground: Point2<f64>,
    /// Anchor on the moving body, in its local frame.
    pub local_anchor_moving: Point2<f64>,
    /// Reference angle (revolute only).
    pub reference_angle: f64,
    /// Slide axis in the ground body's frame (prismatic only).
    pub local_axis: Vector2<f64>,
    /// True for revolute, false for prismatic.
    pub revolute: bool,
}

/// Snapshot one side of a gear from an existing revolute or prismatic
/// joint: its frames plus the current coordinate value.
pub(crate) fn snapshot_side(
    joint: &Joint,
    bodies: &Arena<Body>,
) -> planar_types::Result<(GearSide, f64)> {
    match joint {
        Joint::Revolute(revolute) => {
            let body_ground = revolute.body_a;
            let body_moving = revolute.body_b;
            let (Some(ground), Some(moving)) = (
                bodies.get(body_ground.raw()),
                bodies.get(body_moving.raw()),
            ) else {
                return Err(planar_types::PhysicsError::InvalidBodyId(
                    body_moving.raw(),
                ));
            };

            let coordinate = moving.sweep.a - ground.sweep.a - revolute.reference_angle();
            Ok((
                GearSide {
                    body_ground,
                    body_moving,
                    local_anchor_ground: revolute.local_anchor_a(),
                    local_anchor_moving: revolute.local_anchor_b(),
                    reference_angle: revolute.reference_angle(),
                    local_axis: Vector2::zeros(),
                    revolute: true,
                },
                coordinate,
            ))
        }
        Joint::Prismatic(prismatic) => {
            let body_ground = prismatic.body_a;
            let body_moving = prismatic.body_b;
            let (Some(ground), Some(moving)) = (
                bodies.get(body_ground.raw()),
                bodies.get(body_moving.raw()),
            ) else {
                return Err(planar_types::PhysicsError::InvalidBodyId(
                    body_moving.raw(),
                ));
            };

            let p_ground = prismatic.local_anchor_a();
            let p_moving = ground
                .pose()
                .inverse_transform_point(&moving.pose().transform_point(&prismatic.local_anchor_b()));
            let coordinate = (p_moving - p_ground).dot(&prismatic.local_axis_a());
            Ok((
                GearSide {
                    body_ground,
                    body_moving,
                    local_anchor_ground: prismatic.local_anchor_a(),
                    local_anchor_moving: prismatic.local_anchor_b(),
                    reference_angle: 0.0,
                    local_axis: prismatic.local_axis_a(),
                    revolute: false,
                },
                coordinate,
            ))
        }
        _ => Err(planar_types::PhysicsError::invalid_config(
            "gear joints must reference revolute or prismatic joints",
        )),
    }
}

/// A coordinate coupling between two joints.
#[derive(Debug, Clone)]
pub struct GearJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    side_1: GearSide,
    side_2: GearSide,
    ratio: f64,
    constant: f64,

    impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    c: BodySolverInfo,
    d: BodySolverInfo,
    jv_ac: Vector2<f64>,
    jv_bd: Vector2<f64>,
    jw_a: f64,
    jw_b: f64,
    jw_c: f64,
    jw_d: f64,
    mass: f64,
}

impl GearJoint {
    pub(crate) fn new(side_1: GearSide, side_2: GearSide, ratio: f64, constant: f64, collide_connected: bool) -> Self {
        debug_assert!(ratio != 0.0);
        Self {
            body_a: side_1.body_moving,
            body_b: side_2.body_moving,
            collide_connected,
            side_1,
            side_2,
            ratio,
            constant,
            impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            c: BodySolverInfo::default(),
            d: BodySolverInfo::default(),
            jv_ac: Vector2::zeros(),
            jv_bd: Vector2::zeros(),
            jw_a: 0.0,
            jw_b: 0.0,
            jw_c: 0.0,
            jw_d: 0.0,
            mass: 0.0,
        }
    }

    /// The transmission ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub(crate) fn extra_bodies(&self) -> [Option<BodyId>; 2] {
        [Some(self.side_1.body_ground), Some(self.side_2.body_ground)]
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        bodies: &Arena<Body>,
    ) {
        self.a = body_solver_info(bodies, self.body_a);
        self.b = body_solver_info(bodies, self.body_b);
        self.c = body_solver_info(bodies, self.side_1.body_ground);
        self.d = body_solver_info(bodies, self.side_2.body_ground);

        let c_a = data.positions[self.a.index];
        let c_b = data.positions[self.b.index];
        let c_c = data.positions[self.c.index];
        let c_d = data.positions[self.d.index];

        let q_a = UnitComplex::new(c_a.a);
        let q_b = UnitComplex::new(c_b.a);
        let q_c = UnitComplex::new(c_c.a);
        let q_d = UnitComplex::new(c_d.a);

        self.mass = 0.0;

        if self.side_1.revolute {
            self.jv_ac = Vector2::zeros();
            self.jw_a = 1.0;
            self.jw_c = 1.0;
            self.mass += self.a.inv_inertia + self.c.inv_inertia;
        } else {
            let u = q_c * self.side_1.local_axis;
            let r_c = q_c * (self.side_1.local_anchor_ground.coords - self.c.local_center);
            let r_a = q_a * (self.side_1.local_anchor_moving.coords - self.a.local_center);
            self.jv_ac = u;
            self.jw_c = cross(r_c, u);
            self.jw_a = cross(r_a, u);
            self.mass += self.c.inv_mass
                + self.a.inv_mass
                + self.c.inv_inertia * self.jw_c * self.jw_c
                + self.a.inv_inertia * self.jw_a * self.jw_a;
        }

        if self.side_2.revolute {
            self.jv_bd = Vector2::zeros();
            self.jw_b = self.ratio;
            self.jw_d = self.ratio;
            self.mass += self.ratio * self.ratio * (self.b.inv_inertia + self.d.inv_inertia);
        } else {
            let u = q_d * self.side_2.local_axis;
            let r_d = q_d * (self.side_2.local_anchor_ground.coords - self.d.local_center);
            let r_b = q_b * (self.side_2.local_anchor_moving.coords - self.b.local_center);
            self.jv_bd = self.ratio * u;
            self.jw_d = self.ratio * cross(r_d, u);
            self.jw_b = self.ratio * cross(r_b, u);
            self.mass += self.ratio * self.ratio * (self.d.inv_mass + self.b.inv_mass)
                + self.d.inv_inertia * self.jw_d * self.jw_d
                + self.b.inv_inertia * self.jw_b * self.jw_b;
        }

        self.mass = if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 };

        if data.step.warm_starting {
            let mut v_a = data.velocities[self.a.index];
            let mut v_b = data.velocities[self.b.index];
            let mut v_c = data.velocities[self.c.index];
            let mut v_d = data.velocities[self.d.index];

            v_a.v += self.a.inv_mass * self.impulse * self.jv_ac;
            v_a.w += self.a.inv_inertia * self.impulse * self.jw_a;
            v_b.v += self.b.inv_mass * self.impulse * self.jv_bd;
            v_b.w += self.b.inv_inertia * self.impulse * self.jw_b;
            v_c.v -= self.c.inv_mass * self.impulse * self.jv_ac;
            v_c.w -= self.c.inv_inertia * self.impulse * self.jw_c;
            v_d.v -= self.d.inv_mass * self.impulse * self.jv_bd;
            v_d.w -= self.d.inv_inertia * self.impulse * self.jw_d;

            data.velocities[self.a.index] = v_a;
            data.velocities[self.b.index] = v_b;
            data.velocities[self.c.index] = v_c;
            data.velocities[self.d.index] = v_d;
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];
        let mut v_c = data.velocities[self.c.index];
        let mut v_d = data.velocities[self.d.index];

        let c_dot = self.jv_ac.dot(&(v_a.v - v_c.v))
            + self.jv_bd.dot(&(v_b.v - v_d.v))
            + self.jw_a * v_a.w
            - self.jw_c * v_c.w
            + self.jw_b * v_b.w
            - self.jw_d * v_d.w;

        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        v_a.v += self.a.inv_mass * impulse * self.jv_ac;
        v_a.w += self.a.inv_inertia * impulse * self.jw_a;
        v_b.v += self.b.inv_mass * impulse * self.jv_bd;
        v_b.w += self.b.inv_inertia * impulse * self.jw_b;
        v_c.v -= self.c.inv_mass * impulse * self.jv_ac;
        v_c.w -= self.c.inv_inertia * impulse * self.jw_c;
        v_d.v -= self.d.inv_mass * impulse * self.jv_bd;
        v_d.w -= self.d.inv_inertia * impulse * self.jw_d;

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
        data.velocities[self.c.index] = v_c;
        data.velocities[self.d.index] = v_d;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut c_a = data.positions[self.a.index];
        let mut c_b = data.positions[self.b.index];
        let mut c_c = data.positions[self.c.index];
        let mut c_d = data.positions[self.d.index];

        let q_a = UnitComplex::new(c_a.a);
        let q_b = UnitComplex::new(c_b.a);
        let q_c = UnitComplex::new(c_c.a);
        let q_d = UnitComplex::new(c_d.a);

        let mut mass = 0.0;

        let (jv_ac, jw_a, jw_c, coordinate_a);
        if self.side_1.revolute {
            jv_ac = Vector2::zeros();
            jw_a = 1.0;
            jw_c = 1.0;
            mass += self.a.inv_inertia + self.c.inv_inertia;
            coordinate_a = c_a.a - c_c.a - self.side_1.reference_angle;
        } else {
            let u = q_c * self.side_1.local_axis;
            let r_c = q_c * (self.side_1.local_anchor_ground.coords - self.c.local_center);
            let r_a = q_a * (self.side_1.local_anchor_moving.coords - self.a.local_center);
            jv_ac = u;
            jw_c = cross(r_c, u);
            jw_a = cross(r_a, u);
            mass += self.c.inv_mass
                + self.a.inv_mass
                + self.c.inv_inertia * jw_c * jw_c
                + self.a.inv_inertia * jw_a * jw_a;

            let p_c = self.side_1.local_anchor_ground.coords - self.c.local_center;
            let p_a = q_c.inverse() * (r_a + (c_a.c - c_c.c));
            coordinate_a = (p_a - p_c).dot(&self.side_1.local_axis);
        }

        let (jv_bd, jw_b, jw_d, coordinate_b);
        if self.side_2.revolute {
            jv_bd = Vector2::zeros();
            jw_b = self.ratio;
            jw_d = self.ratio;
            mass += self.ratio * self.ratio * (self.b.inv_inertia + self.d.inv_inertia);
            coordinate_b = c_b.a - c_d.a - self.side_2.reference_angle;
        } else {
            let u = q_d * self.side_2.local_axis;
            let r_d = q_d * (self.side_2.local_anchor_ground.coords - self.d.local_center);
            let r_b = q_b * (self.side_2.local_anchor_moving.coords - self.b.local_center);
            jv_bd = self.ratio * u;
            jw_d = self.ratio * cross(r_d, u);
            jw_b = self.ratio * cross(r_b, u);
            mass += self.ratio * self.ratio * (self.d.inv_mass + self.b.inv_mass)
                + self.d.inv_inertia * jw_d * jw_d
                + self.b.inv_inertia * jw_b * jw_b;

            let p_d = self.side_2.local_anchor_ground.coords - self.d.local_center;
            let p_b = q_d.inverse() * (r_b + (c_b.c - c_d.c));
            coordinate_b = (p_b - p_d).dot(&self.side_2.local_axis);
        }

        let c = (coordinate_a + self.ratio * coordinate_b) - self.constant;

        let impulse = if mass > 0.0 { -c / mass } else { 0.0 };

        c_a.c += self.a.inv_mass * impulse * jv_ac;
        c_a.a += self.a.inv_inertia * impulse * jw_a;
        c_b.c += self.b.inv_mass * impulse * jv_bd;
        c_b.a += self.b.inv_inertia * impulse * jw_b;
        c_c.c -= self.c.inv_mass * impulse * jv_ac;
        c_c.a -= self.c.inv_inertia * impulse * jw_c;
        c_d.c -= self.d.inv_mass * impulse * jv_bd;
        c_d.a -= self.d.inv_inertia * impulse * jw_d;

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;
        data.positions[self.c.index] = c_c;
        data.positions[self.d.index] = c_d;

        c.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;
    const RATIO: f64 = 2.0;

    /// Ground plus two hinged wheels, both revolute around the ground.
    fn geared_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::new(-1.0, 0.0)),
            dynamic_body(Point2::new(1.0, 0.0)),
        ])
    }

    fn revolute_side(rig: &Rig, moving: usize) -> GearSide {
        GearSide {
            body_ground: rig.ids[0],
            body_moving: rig.ids[moving],
            local_anchor_ground: Point2::origin(),
            local_anchor_moving: Point2::origin(),
            reference_angle: 0.0,
            local_axis: Vector2::zeros(),
            revolute: true,
        }
    }

    fn geared_joint(rig: &Rig) -> GearJoint {
        GearJoint::new(
            revolute_side(rig, 1),
            revolute_side(rig, 2),
            RATIO,
            0.0,
            false,
        )
    }

    #[test]
    fn test_velocity_coupling_holds_the_ratio() {
        let mut rig = geared_rig();
        rig.velocities[1].w = 3.0;

        let mut joint = geared_joint(&rig);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // The coupled coordinate rate w_a + ratio * w_b drops to zero.
        let (w_a, w_b) = (rig.velocities[1].w, rig.velocities[2].w);
        assert_relative_eq!(w_a + RATIO * w_b, 0.0, epsilon = 1e-12);
        assert!(w_a > 0.0, "wheel A keeps spinning, got {w_a}");
        assert!(w_b < 0.0, "wheel B counter-rotates, got {w_b}");
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = geared_rig();
        rig.velocities[1].w = 3.0;

        let mut joint = geared_joint(&rig);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        rig.velocities[1].w = 0.0;
        rig.velocities[2].w = 0.0;
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        assert!(
            rig.velocities[1].w != 0.0 && rig.velocities[2].w != 0.0,
            "warm start should spin both wheels"
        );
    }

    #[test]
    fn test_position_correction_converges() {
        let mut rig = geared_rig();
        // Wheel A rotated while B stayed put: coordinate sum violated.
        rig.positions[1].a = 0.4;

        let mut joint = geared_joint(&rig);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }

        let mut solved = false;
        for _ in 0..10 {
            let (mut data, _) = split(&mut rig, step);
            if joint.solve_position_constraints(&mut data) {
                solved = true;
                break;
            }
        }

        assert!(solved, "position solver should report convergence");
        assert_relative_eq!(
            rig.positions[1].a + RATIO * rig.positions[2].a,
            0.0,
            epsilon = LINEAR_SLOP
        );
    }

    #[test]
    fn test_extra_bodies_name_the_grounds() {
        let rig = geared_rig();
        let joint = geared_joint(&rig);
        assert_eq!(joint.extra_bodies(), [Some(rig.ids[0]), Some(rig.ids[0])]);
    }
}
