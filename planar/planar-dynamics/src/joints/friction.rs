//! Friction joint: top-down friction, resisting relative linear and
//! angular motion up to a maximum force and torque.

use nalgebra::{Matrix2, UnitComplex};
use planar_types::{cross, cross_sv, solve22, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`FrictionJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Maximum friction force.
    pub max_force: f64,
    /// Maximum friction torque.
    pub max_torque: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl FrictionJointDef {
    /// Friction between two bodies at the given anchors.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
        max_force: f64,
        max_torque: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            max_force,
            max_torque,
            collide_connected: false,
        }
    }
}

/// A clamped 2D + angular friction constraint.
#[derive(Debug, Clone)]
pub struct FrictionJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    max_force: f64,
    max_torque: f64,

    linear_impulse: Vector2<f64>,
    angular_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    linear_k: Matrix2<f64>,
    angular_mass: f64,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            max_torque: def.max_torque,
            linear_impulse: Vector2::zeros(),
            angular_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            linear_k: Matrix2::zeros(),
            angular_mass: 0.0,
        }
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

        // Angular friction.
        {
            let c_dot = v_b.w - v_a.w;
            let impulse = -self.angular_mass * c_dot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse =
                (self.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;

            v_a.w -= i_a * impulse;
            v_b.w += i_b * impulse;
        }

        // Linear friction.
        {
            let c_dot =
                v_b.v + cross_sv(v_b.w, self.r_b) - v_a.v - cross_sv(v_a.w, self.r_a);

            let mut impulse = -solve22(&self.linear_k, c_dot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            // Clamp to the friction disc.
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
        // Friction has no position target.
        true
    }
}
