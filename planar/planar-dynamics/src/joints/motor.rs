//! Motor joint: drives a body toward a target pose offset from another
//! body, clamped by maximum force and torque. Useful for character
//! movement that should remain physically pushable.

use nalgebra::{Matrix2, UnitComplex};
use planar_types::{cross, cross_sv, solve22, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`MotorJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotorJointDef {
    /// First body (the reference frame).
    pub body_a: BodyId,
    /// Second body (the driven one).
    pub body_b: BodyId,
    /// Target position of B's origin in A's frame.
    pub linear_offset: Vector2<f64>,
    /// Target angle of B relative to A.
    pub angular_offset: f64,
    /// Maximum corrective force.
    pub max_force: f64,
    /// Maximum corrective torque.
    pub max_torque: f64,
    /// Position correction strength in `[0, 1]`.
    pub correction_factor: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl MotorJointDef {
    /// Drive B toward its current offset from A.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            linear_offset: Vector2::zeros(),
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
            collide_connected: false,
        }
    }

    /// Set the target offsets.
    #[must_use]
    pub fn with_offsets(mut self, linear: Vector2<f64>, angular: f64) -> Self {
        self.linear_offset = linear;
        self.angular_offset = angular;
        self
    }

    /// Set the force and torque bounds.
    #[must_use]
    pub fn with_limits(mut self, max_force: f64, max_torque: f64) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

/// A clamped pose-driving constraint.
#[derive(Debug, Clone)]
pub struct MotorJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    linear_offset: Vector2<f64>,
    angular_offset: f64,
    max_force: f64,
    max_torque: f64,
    correction_factor: f64,

    linear_impulse: Vector2<f64>,
    angular_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    linear_error: Vector2<f64>,
    angular_error: f64,
    linear_k: Matrix2<f64>,
    angular_mass: f64,
}

impl MotorJoint {
    pub(crate) fn new(def: &MotorJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            linear_offset: def.linear_offset,
            angular_offset: def.angular_offset,
            max_force: def.max_force,
            max_torque: def.max_torque,
            correction_factor: def.correction_factor.clamp(0.0, 1.0),
            linear_impulse: Vector2::zeros(),
            angular_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            linear_error: Vector2::zeros(),
            angular_error: 0.0,
            linear_k: Matrix2::zeros(),
            angular_mass: 0.0,
        }
    }

    /// Update the target linear offset.
    pub fn set_linear_offset(&mut self, offset: Vector2<f64>) {
        self.linear_offset = offset;
    }

    /// Update the target angular offset.
    pub fn set_angular_offset(&mut self, offset: f64) {
        self.angular_offset = offset;
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        bodies: &Arena<Body>,
    ) {
        self.a = body_solver_info(bodies, self.body_a);
        self.b = body_solver_info(bodies, self.body_b);

        let c_a = data.positions[self.a.index];
        let c_b = data.positions[self.b.index];
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        let q_a = UnitComplex::new(c_a.a);
        let q_b = UnitComplex::new(c_b.a);

        self.r_a = q_a * (self.linear_offset - self.a.local_center);
        self.r_b = q_b * -self.b.local_center;

        self.linear_error = c_b.c + self.r_b - c_a.c - self.r_a;
        self.angular_error = c_b.a - c_a.a - self.angular_offset;

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        self.linear_k = Matrix2::new(
            m_a + m_b + i_a * self.r_a.y * self.r_a.y + i_b * self.r_b.y * self.r_b.y,
            -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y,
            -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y,
            m_a + m_b + i_a * self.r_a.x * self.r_a.x + i_b * self.r_b.x * self.r_b.x,
        );

        let inv_angular = i_a + i_b;
        self.angular_mass = if inv_angular > 0.0 {
            1.0 / inv_angular
        } else {
            0.0
        };

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a.v -= m_a * p;
            v_a.w -= i_a * (cross(self.r_a, p) + self.angular_impulse);
            v_b.v += m_b * p;
            v_b.w += i_b * (cross(self.r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vector2::zeros();
            self.angular_impulse = 0.0;
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        let h = data.step.dt;
        let inv_h = data.step.inv_dt;

        // Angular drive.
        {
            let c_dot = v_b.w - v_a.w + inv_h * self.correction_factor * self.angular_error;
            let impulse = -self.angular_mass * c_dot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse =
                (self.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;

            v_a.w -= i_a * impulse;
            v_b.w += i_b * impulse;
        }

        // Linear drive.
        {
            let c_dot = v_b.v + cross_sv(v_b.w, self.r_b)
                - v_a.v
                - cross_sv(v_a.w, self.r_a)
                + inv_h * self.correction_factor * self.linear_error;

            let mut impulse = -solve22(&self.linear_k, c_dot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.norm_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }
            impulse = self.linear_impulse - old_impulse;

            v_a.v -= m_a * impulse;
            v_a.w -= i_a * cross(self.r_a, impulse);
            v_b.v += m_b * impulse;
            v_b.w += i_b * cross(self.r_b, impulse);
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        // Position error is folded into the velocity bias.
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    fn motor_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::origin()),
        ])
    }

    #[test]
    fn test_drives_toward_linear_offset() {
        let mut rig = motor_rig();
        let mut joint = MotorJoint::new(
            &MotorJointDef::new(rig.ids[0], rig.ids[1])
                .with_offsets(Vector2::new(1.0, 0.0), 0.0)
                .with_limits(60.0, 0.0),
        );

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert!(
            rig.velocities[1].v.x > 0.0,
            "the drive should push toward the offset"
        );
        // Unit mass: at most h * max_force of speed per step.
        assert!(rig.velocities[1].v.x <= 60.0 * DT + 1e-12);
    }

    #[test]
    fn test_angular_drive_is_clamped() {
        let mut rig = motor_rig();
        let max_torque = 30.0;
        let mut joint = MotorJoint::new(
            &MotorJointDef::new(rig.ids[0], rig.ids[1])
                .with_offsets(Vector2::zeros(), 0.5)
                .with_limits(0.0, max_torque),
        );

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].w, max_torque * DT, epsilon = 1e-12);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = motor_rig();
        let mut joint = MotorJoint::new(
            &MotorJointDef::new(rig.ids[0], rig.ids[1])
                .with_offsets(Vector2::new(1.0, 0.0), 0.0)
                .with_limits(60.0, 0.0),
        );

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        rig.velocities[1].v = Vector2::zeros();
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        assert!(
            rig.velocities[1].v.x > 0.0,
            "warm start should apply the stored drive impulse"
        );
    }

    #[test]
    fn test_position_pass_is_a_no_op() {
        let mut rig = motor_rig();
        let mut joint = MotorJoint::new(&MotorJointDef::new(rig.ids[0], rig.ids[1]));
        let step = step_config(DT);
        let (mut data, bodies) = split(&mut rig, step);
        joint.init_velocity_constraints(&mut data, bodies);
        assert!(joint.solve_position_constraints(&mut data));
    }
}
