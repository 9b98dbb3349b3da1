//! Revolute joint: pins two bodies at a point, leaving only relative
//! rotation, with optional angle limits and a motor.

use nalgebra::{Matrix2, UnitComplex};
use planar_types::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION};
use planar_types::{cross, cross_sv, solve22, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`RevoluteJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RevoluteJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// `angle_b - angle_a` at rest.
    pub reference_angle: f64,
    /// Whether the angle limit is active.
    pub enable_limit: bool,
    /// Lower relative angle.
    pub lower_angle: f64,
    /// Upper relative angle.
    pub upper_angle: f64,
    /// Whether the motor is active.
    pub enable_motor: bool,
    /// Target angular velocity of the motor.
    pub motor_speed: f64,
    /// Maximum torque the motor can exert.
    pub max_motor_torque: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    /// A free hinge at the given local anchors.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    /// Enable the angle limit.
    #[must_use]
    pub fn with_limit(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    /// Enable the motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// A hinge between two bodies.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    reference_angle: f64,
    enable_limit: bool,
    lower_angle: f64,
    upper_angle: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_torque: f64,

    impulse: Vector2<f64>,
    motor_impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    k: Matrix2<f64>,
    axial_mass: f64,
    angle: f64,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: Vector2::zeros(),
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            k: Matrix2::zeros(),
            axial_mass: 0.0,
            angle: 0.0,
        }
    }

    /// Set the motor's target speed.
    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub(crate) fn local_anchor_a(&self) -> Point2<f64> {
        self.local_anchor_a
    }

    pub(crate) fn local_anchor_b(&self) -> Point2<f64> {
        self.local_anchor_b
    }

    pub(crate) fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    /// Enable or disable the motor.
    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
        if !enable {
            self.motor_impulse = 0.0;
        }
    }

    fn fixed_rotation(&self) -> bool {
        self.a.inv_inertia + self.b.inv_inertia == 0.0
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

        self.r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
        self.r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        self.k = Matrix2::new(
            m_a + m_b + i_a * self.r_a.y * self.r_a.y + i_b * self.r_b.y * self.r_b.y,
            -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y,
            -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y,
            m_a + m_b + i_a * self.r_a.x * self.r_a.x + i_b * self.r_b.x * self.r_b.x,
        );

        let inv_axial = i_a + i_b;
        self.axial_mass = if inv_axial > 0.0 { 1.0 / inv_axial } else { 0.0 };

        self.angle = c_b.a - c_a.a - self.reference_angle;
        if !self.enable_limit || self.fixed_rotation() {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor || self.fixed_rotation() {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            self.lower_impulse *= data.step.dt_ratio;
            self.upper_impulse *= data.step.dt_ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse;

            v_a.v -= m_a * p;
            v_a.w -= i_a * (cross(self.r_a, p) + axial_impulse);
            v_b.v += m_b * p;
            v_b.w += i_b * (cross(self.r_b, p) + axial_impulse);
        } else {
            self.impulse = Vector2::zeros();
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
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

        let fixed_rotation = self.fixed_rotation();

        // Motor.
        if self.enable_motor && !fixed_rotation {
            let c_dot = v_b.w - v_a.w - self.motor_speed;
            let impulse = -self.axial_mass * c_dot;
            let old_impulse = self.motor_impulse;
            let max_impulse = self.max_motor_torque * data.step.dt;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            v_a.w -= i_a * impulse;
            v_b.w += i_b * impulse;
        }

        // Limits, solved as speculative one-sided constraints.
        if self.enable_limit && !fixed_rotation {
            // Lower.
            {
                let c = self.angle - self.lower_angle;
                let c_dot = v_b.w - v_a.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (self.lower_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;

                v_a.w -= i_a * impulse;
                v_b.w += i_b * impulse;
            }
            // Upper.
            {
                let c = self.upper_angle - self.angle;
                let c_dot = v_a.w - v_b.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (self.upper_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;

                v_a.w += i_a * impulse;
                v_b.w -= i_b * impulse;
            }
        }

        // Point-to-point.
        {
            let c_dot =
                v_b.v + cross_sv(v_b.w, self.r_b) - v_a.v - cross_sv(v_a.w, self.r_a);
            let impulse = solve22(&self.k, -c_dot);
            self.impulse += impulse;

            v_a.v -= m_a * impulse;
            v_a.w -= i_a * cross(self.r_a, impulse);
            v_b.v += m_b * impulse;
            v_b.w += i_b * cross(self.r_b, impulse);
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut c_a = data.positions[self.a.index];
        let mut c_b = data.positions[self.b.index];

        let mut angular_error = 0.0_f64;

        // Angle limit correction.
        if self.enable_limit && !self.fixed_rotation() {
            let angle = c_b.a - c_a.a - self.reference_angle;
            let mut c = 0.0;

            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                c = (angle - self.lower_angle)
                    .clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
            } else if angle <= self.lower_angle {
                c = (angle - self.lower_angle + ANGULAR_SLOP)
                    .clamp(-MAX_ANGULAR_CORRECTION, 0.0);
            } else if angle >= self.upper_angle {
                c = (angle - self.upper_angle - ANGULAR_SLOP)
                    .clamp(0.0, MAX_ANGULAR_CORRECTION);
            }

            let limit_impulse = -self.axial_mass * c;
            c_a.a -= self.a.inv_inertia * limit_impulse;
            c_b.a += self.b.inv_inertia * limit_impulse;
            angular_error = c.abs();
        }

        // Point-to-point correction.
        let position_error;
        {
            let q_a = UnitComplex::new(c_a.a);
            let q_b = UnitComplex::new(c_b.a);
            let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
            let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);

            let c = c_b.c + r_b - c_a.c - r_a;
            position_error = c.norm();

            let m_a = self.a.inv_mass;
            let m_b = self.b.inv_mass;
            let i_a = self.a.inv_inertia;
            let i_b = self.b.inv_inertia;

            let k = Matrix2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            );

            let impulse = -solve22(&k, c);

            c_a.c -= m_a * impulse;
            c_a.a -= i_a * cross(r_a, impulse);
            c_b.c += m_b * impulse;
            c_b.a += i_b * cross(r_b, impulse);
        }

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    /// Static anchor and dynamic body sharing the pivot at the origin.
    fn pivot_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::origin()),
        ])
    }

    fn pivot_joint(rig: &Rig) -> RevoluteJointDef {
        RevoluteJointDef::new(rig.ids[0], rig.ids[1], Point2::origin(), Point2::origin())
    }

    #[test]
    fn test_point_constraint_pins_the_pivot() {
        // Pivot at the origin, body center two units away: after one
        // velocity iteration the pivot point on the body must be still.
        let mut rig = Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::new(2.0, 0.0)),
        ]);
        rig.velocities[1].v = Vector2::new(0.0, 3.0);

        let mut joint = RevoluteJoint::new(&RevoluteJointDef::new(
            rig.ids[0],
            rig.ids[1],
            Point2::origin(),
            Point2::new(-2.0, 0.0),
        ));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        let v = rig.velocities[1];
        let pivot_velocity = v.v + cross_sv(v.w, Vector2::new(-2.0, 0.0));
        assert_relative_eq!(pivot_velocity.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_motor_torque_is_clamped() {
        let mut rig = pivot_rig();
        let max_torque = 0.5;
        let mut joint =
            RevoluteJoint::new(&pivot_joint(&rig).with_motor(10.0, max_torque));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            for _ in 0..3 {
                joint.solve_velocity_constraints(&mut data);
            }
        }

        // Unit inertia: the angular speed equals the clamped impulse.
        assert_relative_eq!(rig.velocities[1].w, max_torque * DT, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_limit_stops_rotation() {
        let mut rig = pivot_rig();
        rig.positions[1].a = 0.5;
        rig.velocities[1].w = 2.0;

        let mut joint =
            RevoluteJoint::new(&pivot_joint(&rig).with_limit(-0.5, 0.5));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].w, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lower_limit_stops_rotation() {
        let mut rig = pivot_rig();
        rig.positions[1].a = -0.5;
        rig.velocities[1].w = -2.0;

        let mut joint =
            RevoluteJoint::new(&pivot_joint(&rig).with_limit(-0.5, 0.5));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].w, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_warm_start_reapplies_motor_impulse() {
        let mut rig = pivot_rig();
        let mut joint = RevoluteJoint::new(&pivot_joint(&rig).with_motor(10.0, 0.5));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        rig.velocities[1].w = 0.0;
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        assert!(
            rig.velocities[1].w > 0.0,
            "warm start should apply the stored motor impulse"
        );
    }

    #[test]
    fn test_position_correction_converges() {
        // Angle past the upper limit and the pivot pulled apart.
        let mut rig = pivot_rig();
        rig.positions[1].a = 1.0;
        rig.positions[1].c = Vector2::new(0.1, 0.0);

        let mut joint =
            RevoluteJoint::new(&pivot_joint(&rig).with_limit(-0.5, 0.5));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }

        let mut solved = false;
        for _ in 0..20 {
            let (mut data, _) = split(&mut rig, step);
            if joint.solve_position_constraints(&mut data) {
                solved = true;
                break;
            }
        }

        assert!(solved, "position solver should report convergence");
        assert!(rig.positions[1].a <= 0.5 + 2.0 * ANGULAR_SLOP);
        assert_relative_eq!(rig.positions[1].c.norm(), 0.0, epsilon = LINEAR_SLOP);
    }
}
