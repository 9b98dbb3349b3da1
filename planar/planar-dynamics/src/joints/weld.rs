//! Weld joint: locks two bodies together, optionally with a torsional
//! spring on the angular part.

use nalgebra::{Matrix2, Matrix3, UnitComplex};
use planar_types::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use planar_types::{cross, cross_sv, solve22, solve33, Point2, Vector2, Vector3};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`WeldJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeldJointDef {
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
    /// Angular spring stiffness; zero welds rigidly.
    pub stiffness: f64,
    /// Angular spring damping.
    pub damping: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl WeldJointDef {
    /// A rigid weld at the given local anchors.
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
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: false,
        }
    }

    /// Soften the angular part with a torsional spring.
    #[must_use]
    pub fn with_spring(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }
}

/// A rigid (or torsionally sprung) attachment removing all three
/// relative degrees of freedom.
#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    reference_angle: f64,
    stiffness: f64,
    damping: f64,

    impulse: Vector3<f64>,

    a: BodySolverInfo,
    b: BodySolverInfo,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    k: Matrix3<f64>,
    angular_mass: f64,
    bias: f64,
    gamma: f64,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: Vector3::zeros(),
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            k: Matrix3::zeros(),
            angular_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
        }
    }

    fn linear_block(&self) -> Matrix2<f64> {
        Matrix2::new(self.k[(0, 0)], self.k[(0, 1)], self.k[(1, 0)], self.k[(1, 1)])
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

        let k11 = m_a + m_b + i_a * self.r_a.y * self.r_a.y + i_b * self.r_b.y * self.r_b.y;
        let k12 = -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y;
        let k13 = -i_a * self.r_a.y - i_b * self.r_b.y;
        let k22 = m_a + m_b + i_a * self.r_a.x * self.r_a.x + i_b * self.r_b.x * self.r_b.x;
        let k23 = i_a * self.r_a.x + i_b * self.r_b.x;
        let k33 = i_a + i_b;
        self.k = Matrix3::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        if self.stiffness > 0.0 {
            let c = c_b.a - c_a.a - self.reference_angle;
            let h = data.step.dt;

            self.gamma = h * (self.damping + h * self.stiffness);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * self.stiffness * self.gamma;

            let inv_m = k33 + self.gamma;
            self.angular_mass = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
            self.angular_mass = if k33 != 0.0 { 1.0 / k33 } else { 0.0 };
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = Vector2::new(self.impulse.x, self.impulse.y);
            v_a.v -= m_a * p;
            v_a.w -= i_a * (cross(self.r_a, p) + self.impulse.z);
            v_b.v += m_b * p;
            v_b.w += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vector3::zeros();
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

        if self.stiffness > 0.0 {
            // Soft angular constraint solved separately.
            let c_dot2 = v_b.w - v_a.w;
            let impulse2 =
                -self.angular_mass * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            v_a.w -= i_a * impulse2;
            v_b.w += i_b * impulse2;

            // Rigid linear part.
            let c_dot1 =
                v_b.v + cross_sv(v_b.w, self.r_b) - v_a.v - cross_sv(v_a.w, self.r_a);
            let impulse1 = -solve22(&self.linear_block(), c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a.v -= m_a * impulse1;
            v_a.w -= i_a * cross(self.r_a, impulse1);
            v_b.v += m_b * impulse1;
            v_b.w += i_b * cross(self.r_b, impulse1);
        } else {
            let c_dot1 =
                v_b.v + cross_sv(v_b.w, self.r_b) - v_a.v - cross_sv(v_a.w, self.r_a);
            let c_dot2 = v_b.w - v_a.w;
            let c_dot = Vector3::new(c_dot1.x, c_dot1.y, c_dot2);

            let impulse = -solve33(&self.k, c_dot);
            self.impulse += impulse;

            let p = Vector2::new(impulse.x, impulse.y);
            v_a.v -= m_a * p;
            v_a.w -= i_a * (cross(self.r_a, p) + impulse.z);
            v_b.v += m_b * p;
            v_b.w += i_b * (cross(self.r_b, p) + impulse.z);
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

        let position_error;
        let angular_error;

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k13 = -i_a * r_a.y - i_b * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        let k23 = i_a * r_a.x + i_b * r_b.x;
        let k33 = i_a + i_b;
        let k = Matrix3::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        if self.stiffness > 0.0 {
            let c1 = c_b.c + r_b - c_a.c - r_a;
            position_error = c1.norm();
            angular_error = 0.0;

            let block = Matrix2::new(k11, k12, k12, k22);
            let p = -solve22(&block, c1);

            c_a.c -= m_a * p;
            c_a.a -= i_a * cross(r_a, p);
            c_b.c += m_b * p;
            c_b.a += i_b * cross(r_b, p);
        } else {
            let c1 = c_b.c + r_b - c_a.c - r_a;
            let c2 = c_b.a - c_a.a - self.reference_angle;

            position_error = c1.norm();
            angular_error = c2.abs();

            let c = Vector3::new(c1.x, c1.y, c2);
            let impulse = -solve33(&k, c);

            let p = Vector2::new(impulse.x, impulse.y);
            c_a.c -= m_a * p;
            c_a.a -= i_a * (cross(r_a, p) + impulse.z);
            c_b.c += m_b * p;
            c_b.a += i_b * (cross(r_b, p) + impulse.z);
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

    fn welded_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::origin()),
        ])
    }

    fn weld_def(rig: &Rig) -> WeldJointDef {
        WeldJointDef::new(rig.ids[0], rig.ids[1], Point2::origin(), Point2::origin())
    }

    #[test]
    fn test_rigid_weld_removes_all_motion() {
        let mut rig = welded_rig();
        rig.velocities[1].v = Vector2::new(1.0, 0.5);
        rig.velocities[1].w = 0.7;

        let mut joint = WeldJoint::new(&weld_def(&rig));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        let v = rig.velocities[1];
        assert_relative_eq!(v.v.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.w, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_soft_weld_keeps_linear_rigid() {
        let mut rig = welded_rig();
        rig.velocities[1].v = Vector2::new(1.0, 0.0);
        rig.velocities[1].w = 0.7;

        let mut joint = WeldJoint::new(&weld_def(&rig).with_spring(50.0, 2.0));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        let v = rig.velocities[1];
        // Linear part stays a hard constraint; the angular part is
        // sprung, so it only damps.
        assert_relative_eq!(v.v.norm(), 0.0, epsilon = 1e-12);
        assert!(v.w.abs() < 0.7, "angular speed should be damped, got {}", v.w);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = welded_rig();
        rig.velocities[1].v = Vector2::new(1.0, 0.0);
        rig.velocities[1].w = 0.7;

        let mut joint = WeldJoint::new(&weld_def(&rig));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        rig.velocities[1].v = Vector2::zeros();
        rig.velocities[1].w = 0.0;
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        let v = rig.velocities[1];
        assert!(v.v.x < 0.0, "warm start should reapply the linear impulse");
        assert!(v.w < 0.0, "warm start should reapply the angular impulse");
    }

    #[test]
    fn test_position_correction_converges() {
        let mut rig = welded_rig();
        rig.positions[1].c = Vector2::new(0.1, 0.0);
        rig.positions[1].a = 0.2;

        let mut joint = WeldJoint::new(&weld_def(&rig));
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
        assert_relative_eq!(rig.positions[1].c.norm(), 0.0, epsilon = LINEAR_SLOP);
        assert!(rig.positions[1].a.abs() <= ANGULAR_SLOP);
    }
}
