//! Wheel joint: a line constraint with a suspension spring along the
//! axis and a rotational motor. The standard vehicle suspension joint.

use nalgebra::UnitComplex;
use planar_types::settings::LINEAR_SLOP;
use planar_types::{cross, cross_sv, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`WheelJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WheelJointDef {
    /// Chassis body.
    pub body_a: BodyId,
    /// Wheel body.
    pub body_b: BodyId,
    /// Anchor on the chassis, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on the wheel, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Suspension axis in A's local frame.
    pub local_axis_a: Vector2<f64>,
    /// Whether the translation limit is active.
    pub enable_limit: bool,
    /// Lower suspension travel.
    pub lower_translation: f64,
    /// Upper suspension travel.
    pub upper_translation: f64,
    /// Whether the wheel motor is active.
    pub enable_motor: bool,
    /// Target angular velocity of the motor.
    pub motor_speed: f64,
    /// Maximum torque the motor can exert.
    pub max_motor_torque: f64,
    /// Suspension stiffness in N/m.
    pub stiffness: f64,
    /// Suspension damping in N·s/m.
    pub damping: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl WheelJointDef {
    /// A wheel joint with a free (unsprung) axis.
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
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: false,
        }
    }

    /// Set the suspension spring.
    #[must_use]
    pub fn with_suspension(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }

    /// Enable the drive motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    /// Enable the suspension travel limit.
    #[must_use]
    pub fn with_limit(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }
}

/// A suspension joint: the wheel slides along an axis fixed in the
/// chassis, sprung by stiffness/damping, with an optional drive motor.
#[derive(Debug, Clone)]
pub struct WheelJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    local_axis_a: Vector2<f64>,
    local_perp_a: Vector2<f64>,
    enable_limit: bool,
    lower_translation: f64,
    upper_translation: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_torque: f64,
    stiffness: f64,
    damping: f64,

    impulse: f64,
    motor_impulse: f64,
    spring_impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    ax: Vector2<f64>,
    ay: Vector2<f64>,
    s_ax: f64,
    s_bx: f64,
    s_ay: f64,
    s_by: f64,
    mass: f64,
    motor_mass: f64,
    axial_mass: f64,
    spring_mass: f64,
    bias: f64,
    gamma: f64,
    translation: f64,
}

impl WheelJoint {
    pub(crate) fn new(def: &WheelJointDef) -> Self {
        let local_axis_a = def.local_axis_a.normalize();
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_axis_a,
            local_perp_a: cross_sv(1.0, local_axis_a),
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: 0.0,
            motor_impulse: 0.0,
            spring_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            ax: Vector2::zeros(),
            ay: Vector2::zeros(),
            s_ax: 0.0,
            s_bx: 0.0,
            s_ay: 0.0,
            s_by: 0.0,
            mass: 0.0,
            motor_mass: 0.0,
            axial_mass: 0.0,
            spring_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
            translation: 0.0,
        }
    }

    /// Set the motor's target speed.
    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
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
        let d = c_b.c + r_b - c_a.c - r_a;

        let m_a = self.a.inv_mass;
        let m_b = self.b.inv_mass;
        let i_a = self.a.inv_inertia;
        let i_b = self.b.inv_inertia;

        // Point-on-line constraint (perpendicular direction).
        self.ay = q_a * self.local_perp_a;
        self.s_ay = cross(d + r_a, self.ay);
        self.s_by = cross(r_b, self.ay);

        let inv_mass = m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by;
        self.mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };

        // Spring and limits along the axis.
        self.ax = q_a * self.local_axis_a;
        self.s_ax = cross(d + r_a, self.ax);
        self.s_bx = cross(r_b, self.ax);

        let inv_axial = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
        self.axial_mass = if inv_axial > 0.0 { 1.0 / inv_axial } else { 0.0 };

        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;

        if self.stiffness > 0.0 && inv_axial > 0.0 {
            let c = d.dot(&self.ax);
            let h = data.step.dt;

            self.gamma = h * (self.damping + h * self.stiffness);
            if self.gamma > 0.0 {
                self.gamma = 1.0 / self.gamma;
            }
            self.bias = c * h * self.stiffness * self.gamma;

            self.spring_mass = inv_axial + self.gamma;
            if self.spring_mass > 0.0 {
                self.spring_mass = 1.0 / self.spring_mass;
            }
        } else {
            self.spring_impulse = 0.0;
        }

        if self.enable_limit {
            self.translation = self.ax.dot(&d);
        } else {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        if self.enable_motor {
            let inv_motor = i_a + i_b;
            self.motor_mass = if inv_motor > 0.0 { 1.0 / inv_motor } else { 0.0 };
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.spring_impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            self.lower_impulse *= data.step.dt_ratio;
            self.upper_impulse *= data.step.dt_ratio;

            let axial_impulse = self.spring_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse * self.ay + axial_impulse * self.ax;
            let l_a = self.impulse * self.s_ay + axial_impulse * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + axial_impulse * self.s_bx + self.motor_impulse;

            v_a.v -= m_a * p;
            v_a.w -= i_a * l_a;
            v_b.v += m_b * p;
            v_b.w += i_b * l_b;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
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

        // Suspension spring.
        if self.stiffness > 0.0 {
            let c_dot = self.ax.dot(&(v_b.v - v_a.v)) + self.s_bx * v_b.w - self.s_ax * v_a.w;
            let impulse =
                -self.spring_mass * (c_dot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = impulse * self.ax;
            let l_a = impulse * self.s_ax;
            let l_b = impulse * self.s_bx;

            v_a.v -= m_a * p;
            v_a.w -= i_a * l_a;
            v_b.v += m_b * p;
            v_b.w += i_b * l_b;
        }

        // Drive motor.
        if self.enable_motor {
            let c_dot = v_b.w - v_a.w - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old_impulse = self.motor_impulse;
            let max_impulse = self.max_motor_torque * data.step.dt;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            v_a.w -= i_a * impulse;
            v_b.w += i_b * impulse;
        }

        // Travel limits.
        if self.enable_limit {
            // Lower.
            {
                let c = self.translation - self.lower_translation;
                let c_dot =
                    self.ax.dot(&(v_b.v - v_a.v)) + self.s_bx * v_b.w - self.s_ax * v_a.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (self.lower_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;

                let p = impulse * self.ax;
                v_a.v -= m_a * p;
                v_a.w -= i_a * impulse * self.s_ax;
                v_b.v += m_b * p;
                v_b.w += i_b * impulse * self.s_bx;
            }

            // Upper.
            {
                let c = self.upper_translation - self.translation;
                let c_dot =
                    self.ax.dot(&(v_a.v - v_b.v)) + self.s_ax * v_a.w - self.s_bx * v_b.w;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (self.upper_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;

                let p = -impulse * self.ax;
                v_a.v -= m_a * p;
                v_a.w -= i_a * -impulse * self.s_ax;
                v_b.v += m_b * p;
                v_b.w += i_b * -impulse * self.s_bx;
            }
        }

        // Point-on-line.
        {
            let c_dot = self.ay.dot(&(v_b.v - v_a.v)) + self.s_by * v_b.w - self.s_ay * v_a.w;
            let impulse = -self.mass * c_dot;
            self.impulse += impulse;

            let p = impulse * self.ay;
            let l_a = impulse * self.s_ay;
            let l_b = impulse * self.s_by;

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

        let mut linear_error = 0.0_f64;

        // Travel limit correction.
        if self.enable_limit {
            let q_a = UnitComplex::new(c_a.a);
            let q_b = UnitComplex::new(c_b.a);

            let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
            let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);
            let d = c_b.c - c_a.c + r_b - r_a;

            let ax = q_a * self.local_axis_a;
            let s_ax = cross(d + r_a, ax);
            let s_bx = cross(r_b, ax);

            let translation = ax.dot(&d);
            let c = if (self.upper_translation - self.lower_translation).abs()
                < 2.0 * LINEAR_SLOP
            {
                translation
            } else if translation <= self.lower_translation {
                (translation - self.lower_translation).min(0.0)
            } else if translation >= self.upper_translation {
                (translation - self.upper_translation).max(0.0)
            } else {
                0.0
            };

            if c != 0.0 {
                let inv_mass = self.a.inv_mass
                    + self.b.inv_mass
                    + self.a.inv_inertia * s_ax * s_ax
                    + self.b.inv_inertia * s_bx * s_bx;
                let impulse = if inv_mass > 0.0 { -c / inv_mass } else { 0.0 };

                let p = impulse * ax;
                c_a.c -= self.a.inv_mass * p;
                c_a.a -= self.a.inv_inertia * impulse * s_ax;
                c_b.c += self.b.inv_mass * p;
                c_b.a += self.b.inv_inertia * impulse * s_bx;

                linear_error = c.abs();
            }
        }

        // Perpendicular correction.
        {
            let q_a = UnitComplex::new(c_a.a);
            let q_b = UnitComplex::new(c_b.a);

            let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
            let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);
            let d = c_b.c - c_a.c + r_b - r_a;

            let ay = q_a * self.local_perp_a;
            let s_ay = cross(d + r_a, ay);
            let s_by = cross(r_b, ay);

            let c = d.dot(&ay);
            let inv_mass = self.a.inv_mass
                + self.b.inv_mass
                + self.a.inv_inertia * s_ay * s_ay
                + self.b.inv_inertia * s_by * s_by;
            let impulse = if inv_mass > 0.0 { -c / inv_mass } else { 0.0 };

            let p = impulse * ay;
            c_a.c -= self.a.inv_mass * p;
            c_a.a -= self.a.inv_inertia * impulse * s_ay;
            c_b.c += self.b.inv_mass * p;
            c_b.a += self.b.inv_inertia * impulse * s_by;

            linear_error = linear_error.max(c.abs());
        }

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

        linear_error <= LINEAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    /// Static chassis anchor and dynamic wheel at `position`; suspension
    /// axis +y.
    fn suspension_rig(position: Point2<f64>) -> Rig {
        Rig::new(vec![static_body(Point2::origin()), dynamic_body(position)])
    }

    fn suspension_def(rig: &Rig) -> WheelJointDef {
        WheelJointDef::new(
            rig.ids[0],
            rig.ids[1],
            Point2::origin(),
            Point2::origin(),
            Vector2::new(0.0, 1.0),
        )
    }

    #[test]
    fn test_point_on_line_removes_perpendicular_motion() {
        let mut rig = suspension_rig(Point2::origin());
        rig.velocities[1].v = Vector2::new(1.0, 1.0);

        let mut joint = WheelJoint::new(&suspension_def(&rig));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        let v = rig.velocities[1];
        assert_relative_eq!(v.v.x, 0.0, epsilon = 1e-12);
        // Travel along the suspension axis is free without a spring.
        assert_relative_eq!(v.v.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spring_pulls_toward_rest() {
        // Wheel displaced half a unit along the axis.
        let mut rig = suspension_rig(Point2::new(0.0, 0.5));
        let mut joint =
            WheelJoint::new(&suspension_def(&rig).with_suspension(100.0, 10.0));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert!(
            rig.velocities[1].v.y < 0.0,
            "spring should push the wheel back toward rest"
        );
    }

    #[test]
    fn test_motor_torque_is_clamped() {
        let mut rig = suspension_rig(Point2::origin());
        let max_torque = 0.3;
        let mut joint =
            WheelJoint::new(&suspension_def(&rig).with_motor(8.0, max_torque));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            for _ in 0..3 {
                joint.solve_velocity_constraints(&mut data);
            }
        }

        assert_relative_eq!(rig.velocities[1].w, max_torque * DT, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_limit_stops_travel() {
        // Wheel at the top of its travel, still moving up.
        let mut rig = suspension_rig(Point2::origin());
        rig.velocities[1].v = Vector2::new(0.0, 1.0);

        let mut joint = WheelJoint::new(&suspension_def(&rig).with_limit(-0.2, 0.0));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_warm_start_reapplies_spring_impulse() {
        let mut rig = suspension_rig(Point2::new(0.0, 0.5));
        let mut joint =
            WheelJoint::new(&suspension_def(&rig).with_suspension(100.0, 10.0));

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
            rig.velocities[1].v.y < 0.0,
            "warm start should apply the stored spring impulse"
        );
    }

    #[test]
    fn test_position_correction_converges() {
        // Perpendicular offset off the suspension line.
        let mut rig = suspension_rig(Point2::new(0.3, 0.0));
        let mut joint = WheelJoint::new(&suspension_def(&rig));

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
        assert!(rig.positions[1].c.x.abs() <= LINEAR_SLOP);
    }
}
