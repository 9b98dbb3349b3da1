//! Prismatic joint: relative motion restricted to translation along one
//! axis, with optional limits and a motor.

use nalgebra::{Matrix2, UnitComplex};
use planar_types::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use planar_types::{cross, cross_sv, solve22, solve33, Point2, Vector2, Vector3};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`PrismaticJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrismaticJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Slide axis in A's local frame (normalized on construction).
    pub local_axis_a: Vector2<f64>,
    /// `angle_b - angle_a` at rest.
    pub reference_angle: f64,
    /// Whether the translation limit is active.
    pub enable_limit: bool,
    /// Lower translation along the axis.
    pub lower_translation: f64,
    /// Upper translation along the axis.
    pub upper_translation: f64,
    /// Whether the motor is active.
    pub enable_motor: bool,
    /// Target translation speed of the motor.
    pub motor_speed: f64,
    /// Maximum force the motor can exert.
    pub max_motor_force: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl PrismaticJointDef {
    /// A free slider along `local_axis_a`.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
        local_axis_a: Vector2<f64>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            local_axis_a,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            collide_connected: false,
        }
    }

    /// Enable the translation limit.
    #[must_use]
    pub fn with_limit(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    /// Enable the motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_force: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }
}

/// A slider between two bodies.
#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    local_axis_a: Vector2<f64>,
    local_perp_a: Vector2<f64>,
    reference_angle: f64,
    enable_limit: bool,
    lower_translation: f64,
    upper_translation: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_force: f64,

    /// Accumulated (perpendicular, angular) impulse.
    impulse: Vector2<f64>,
    motor_impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    axis: Vector2<f64>,
    perp: Vector2<f64>,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    axial_mass: f64,
    k: Matrix2<f64>,
    translation: f64,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let local_axis_a = def.local_axis_a.normalize();
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_axis_a,
            local_perp_a: planar_types::cross_sv(1.0, local_axis_a),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            impulse: Vector2::zeros(),
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            axis: Vector2::zeros(),
            perp: Vector2::zeros(),
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            axial_mass: 0.0,
            k: Matrix2::zeros(),
            translation: 0.0,
        }
    }

    pub(crate) fn local_anchor_a(&self) -> Point2<f64> {
        self.local_anchor_a
    }

    pub(crate) fn local_anchor_b(&self) -> Point2<f64> {
        self.local_anchor_b
    }

    pub(crate) fn local_axis_a(&self) -> Vector2<f64> {
        self.local_axis_a
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

        let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
        let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);
        let d = (c_b.c - c_a.c) + r_b - r_a;

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        // Axial (motor + limit) jacobian.
        self.axis = q_a * self.local_axis_a;
        self.a1 = cross(d + r_a, self.axis);
        self.a2 = cross(r_b, self.axis);

        let inv_axial = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        self.axial_mass = if inv_axial > 0.0 { 1.0 / inv_axial } else { 0.0 };

        // Perpendicular + angular jacobian.
        self.perp = q_a * self.local_perp_a;
        self.s1 = cross(d + r_a, self.perp);
        self.s2 = cross(r_b, self.perp);

        let k11 = m_a + m_b + i_a * self.s1 * self.s1 + i_b * self.s2 * self.s2;
        let k12 = i_a * self.s1 + i_b * self.s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // Both bodies have fixed rotation.
            k22 = 1.0;
        }
        self.k = Matrix2::new(k11, k12, k12, k22);

        self.translation = self.axis.dot(&d);
        if !self.enable_limit {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            self.lower_impulse *= data.step.dt_ratio;
            self.upper_impulse *= data.step.dt_ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse.x * self.perp + axial_impulse * self.axis;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial_impulse * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial_impulse * self.a2;

            v_a.v -= m_a * p;
            v_a.w -= i_a * l_a;
            v_b.v += m_b * p;
            v_b.w += i_b * l_b;
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

        // Motor.
        if self.enable_motor {
            let c_dot = self.axis.dot(&(v_b.v - v_a.v)) + self.a2 * v_b.w - self.a1 * v_a.w;
            let impulse = self.axial_mass * (self.motor_speed - c_dot);
            let old_impulse = self.motor_impulse;
            let max_impulse = self.max_motor_force * data.step.dt;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            let p = impulse * self.axis;
            let l_a = impulse * self.a1;
            let l_b = impulse * self.a2;

            v_a.v -= m_a * p;
            v_a.w -= i_a * l_a;
            v_b.v += m_b * p;
            v_b.w += i_b * l_b;
        }

        if self.enable_limit {
            // Lower limit.
            {
                let c = self.translation - self.lower_translation;
                let c_dot =
                    self.axis.dot(&(v_b.v - v_a.v)) + self.a2 * v_b.w - self.a1 * v_a.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (self.lower_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;

                let p = impulse * self.axis;
                v_a.v -= m_a * p;
                v_a.w -= i_a * impulse * self.a1;
                v_b.v += m_b * p;
                v_b.w += i_b * impulse * self.a2;
            }

            // Upper limit.
            {
                let c = self.upper_translation - self.translation;
                let c_dot =
                    self.axis.dot(&(v_a.v - v_b.v)) + self.a1 * v_a.w - self.a2 * v_b.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (self.upper_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;

                let p = -impulse * self.axis;
                v_a.v -= m_a * p;
                v_a.w -= i_a * -impulse * self.a1;
                v_b.v += m_b * p;
                v_b.w += i_b * -impulse * self.a2;
            }
        }

        // Perpendicular and angular constraint.
        {
            let c_dot = Vector2::new(
                self.perp.dot(&(v_b.v - v_a.v)) + self.s2 * v_b.w - self.s1 * v_a.w,
                v_b.w - v_a.w,
            );
            let df = solve22(&self.k, -c_dot);
            self.impulse += df;

            let p = df.x * self.perp;
            let l_a = df.x * self.s1 + df.y;
            let l_b = df.x * self.s2 + df.y;

            v_a.v -= m_a * p;
            v_a.w -= i_a * l_a;
            v_b.v += m_b * p;
            v_b.w += i_b * l_b;
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut c_a = data.positions[self.a.index];
        let mut c_b = data.positions[self.b.index];

        let q_a = UnitComplex::new(c_a.a);
        let q_b = UnitComplex::new(c_b.a);

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
        let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);
        let d = c_b.c + r_b - c_a.c - r_a;

        let axis = q_a * self.local_axis_a;
        let a1 = cross(d + r_a, axis);
        let a2 = cross(r_b, axis);
        let perp = cross_sv(1.0, axis);

        let s1 = cross(d + r_a, perp);
        let s2 = cross(r_b, perp);

        let c1 = Vector2::new(perp.dot(&d), c_b.a - c_a.a - self.reference_angle);

        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        // Limit correction participates only when the limit is hit.
        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(&d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                c2 = translation.clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation + LINEAR_SLOP)
                    .clamp(-MAX_LINEAR_CORRECTION, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP)
                    .clamp(0.0, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse;
        if active {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let k13 = i_a * s1 * a1 + i_b * s2 * a2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k23 = i_a * a1 + i_b * a2;
            let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;

            let k = nalgebra::Matrix3::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);
            impulse = solve33(&k, -Vector3::new(c1.x, c1.y, c2));
        } else {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k = Matrix2::new(k11, k12, k12, k22);
            let impulse1 = solve22(&k, -c1);
            impulse = Vector3::new(impulse1.x, impulse1.y, 0.0);
        }

        let p = impulse.x * perp + impulse.z * axis;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        c_a.c -= m_a * p;
        c_a.a -= i_a * l_a;
        c_b.c += m_b * p;
        c_b.a += i_b * l_b;

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    /// Static anchor and dynamic slider sharing the origin; slide axis +x.
    fn slider_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::origin()),
        ])
    }

    fn slider_def(rig: &Rig) -> PrismaticJointDef {
        PrismaticJointDef::new(
            rig.ids[0],
            rig.ids[1],
            Point2::origin(),
            Point2::origin(),
            Vector2::new(1.0, 0.0),
        )
    }

    #[test]
    fn test_off_axis_motion_removed() {
        let mut rig = slider_rig();
        rig.velocities[1].v = Vector2::new(1.0, 1.0);
        rig.velocities[1].w = 0.3;

        let mut joint = PrismaticJoint::new(&slider_def(&rig));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        let v = rig.velocities[1];
        assert_relative_eq!(v.v.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.w, 0.0, epsilon = 1e-12);
        // Motion along the axis is free.
        assert_relative_eq!(v.v.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_motor_force_is_clamped() {
        let mut rig = slider_rig();
        let max_force = 0.6;
        let mut joint =
            PrismaticJoint::new(&slider_def(&rig).with_motor(5.0, max_force));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            for _ in 0..3 {
                joint.solve_velocity_constraints(&mut data);
            }
        }

        // Unit mass: the speed equals the clamped impulse.
        assert_relative_eq!(rig.velocities[1].v.x, max_force * DT, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_limit_stops_extension() {
        // Slider sitting at the upper limit, moving outward.
        let mut rig = slider_rig();
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint =
            PrismaticJoint::new(&slider_def(&rig).with_limit(-1.0, 0.0));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_warm_start_reapplies_motor_impulse() {
        let mut rig = slider_rig();
        let mut joint = PrismaticJoint::new(&slider_def(&rig).with_motor(5.0, 0.6));

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
            "warm start should apply the stored motor impulse"
        );
    }

    #[test]
    fn test_position_correction_converges() {
        // Perpendicular offset and a relative rotation, both illegal.
        let mut rig = slider_rig();
        rig.positions[1].c = Vector2::new(0.0, 0.3);
        rig.positions[1].a = 0.2;

        let mut joint = PrismaticJoint::new(&slider_def(&rig));
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
        assert!(rig.positions[1].c.y.abs() <= LINEAR_SLOP);
        assert!(rig.positions[1].a.abs() <= ANGULAR_SLOP);
    }
}
