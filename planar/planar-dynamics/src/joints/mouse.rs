//! Mouse joint: a soft spring dragging a body anchor toward a moving
//! world target. The classic interactive picking constraint.

use nalgebra::{Matrix2, UnitComplex};
use planar_types::{cross, cross_sv, solve22, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`MouseJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MouseJointDef {
    /// A ground body (unused dynamically, anchors the joint in the
    /// world's joint graph).
    pub body_a: BodyId,
    /// The dragged body.
    pub body_b: BodyId,
    /// The grab point on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// The world point to drag toward.
    pub target: Point2<f64>,
    /// Maximum drag force; keeps violent mouse motion from launching
    /// the body.
    pub max_force: f64,
    /// Spring stiffness.
    pub stiffness: f64,
    /// Spring damping.
    pub damping: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl MouseJointDef {
    /// Grab `body_b` at the given local anchor.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_b: Point2<f64>,
        target: Point2<f64>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_b,
            target,
            max_force: 0.0,
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: true,
        }
    }

    /// Set the spring parameters.
    #[must_use]
    pub fn with_spring(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }

    /// Set the maximum force.
    #[must_use]
    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.max_force = max_force;
        self
    }
}

/// A target-tracking soft constraint on one body.
#[derive(Debug, Clone)]
pub struct MouseJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_b: Point2<f64>,
    target: Point2<f64>,
    max_force: f64,
    stiffness: f64,
    damping: f64,

    impulse: Vector2<f64>,

    b: BodySolverInfo,
    r_b: Vector2<f64>,
    k: Matrix2<f64>,
    c: Vector2<f64>,
    gamma: f64,
    beta: f64,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_b: def.local_anchor_b,
            target: def.target,
            max_force: def.max_force,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: Vector2::zeros(),
            b: BodySolverInfo::default(),
            r_b: Vector2::zeros(),
            k: Matrix2::zeros(),
            c: Vector2::zeros(),
            gamma: 0.0,
            beta: 0.0,
        }
    }

    /// Move the drag target.
    pub fn set_target(&mut self, target: Point2<f64>) {
        self.target = target;
    }

    /// The current drag target.
    #[must_use]
    pub fn target(&self) -> Point2<f64> {
        self.target
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        bodies: &Arena<Body>,
    ) {
        self.b = body_solver_info(bodies, self.body_b);

        let c_b = data.positions[self.b.index];
        let mut v_b = data.velocities[self.b.index];

        let q_b = UnitComplex::new(c_b.a);

        let m_b = self.b.inv_mass;
        let i_b = self.b.inv_inertia;

        let h = data.step.dt;
        self.gamma = h * (self.damping + h * self.stiffness);
        if self.gamma != 0.0 {
            self.gamma = 1.0 / self.gamma;
        }
        self.beta = h * self.stiffness * self.gamma;

        self.r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);

        // K = M + gamma*I, the soft effective-mass matrix.
        self.k = Matrix2::new(
            m_b + i_b * self.r_b.y * self.r_b.y + self.gamma,
            -i_b * self.r_b.x * self.r_b.y,
            -i_b * self.r_b.x * self.r_b.y,
            m_b + i_b * self.r_b.x * self.r_b.x + self.gamma,
        );

        self.c = (c_b.c + self.r_b - self.target.coords) * self.beta;

        // Some extra angular damping keeps dragged bodies from spinning.
        v_b.w *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b.v += m_b * self.impulse;
            v_b.w += i_b * cross(self.r_b, self.impulse);
        } else {
            self.impulse = Vector2::zeros();
        }

        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_b = data.velocities[self.b.index];

        let c_dot = v_b.v + cross_sv(v_b.w, self.r_b);
        let mut impulse = solve22(&self.k, -(c_dot + self.c + self.gamma * self.impulse));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.norm_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.norm();
        }
        impulse = self.impulse - old_impulse;

        v_b.v += self.b.inv_mass * impulse;
        v_b.w += self.b.inv_inertia * cross(self.r_b, impulse);

        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        // The soft constraint corrects position through the bias.
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    fn dragged_rig() -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::origin()),
        ])
    }

    fn drag_joint(rig: &Rig, target: Point2<f64>, max_force: f64) -> MouseJoint {
        MouseJoint::new(
            &MouseJointDef::new(rig.ids[0], rig.ids[1], Point2::origin(), target)
                .with_spring(40.0, 5.0)
                .with_max_force(max_force),
        )
    }

    #[test]
    fn test_pulls_toward_target() {
        let mut rig = dragged_rig();
        let mut joint = drag_joint(&rig, Point2::new(2.0, 0.0), 1000.0);

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert!(
            rig.velocities[1].v.x > 0.0,
            "the spring should pull the body toward the target"
        );
    }

    #[test]
    fn test_max_force_clamps_the_pull() {
        let mut rig = dragged_rig();
        let max_force = 0.6;
        let mut joint = drag_joint(&rig, Point2::new(2.0, 0.0), max_force);

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // Unit mass: speed is bounded by h * max_force.
        assert!(rig.velocities[1].v.norm() <= max_force * DT + 1e-12);
        assert!(rig.velocities[1].v.x > 0.0);
    }

    #[test]
    fn test_init_damps_spin() {
        let mut rig = dragged_rig();
        rig.velocities[1].w = 1.0;

        let mut joint = drag_joint(&rig, Point2::new(2.0, 0.0), 1000.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }

        assert_relative_eq!(rig.velocities[1].w, 0.98, epsilon = 1e-12);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = dragged_rig();
        let mut joint = drag_joint(&rig, Point2::new(2.0, 0.0), 1000.0);

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
        assert!(
            rig.velocities[1].v.x > 0.0,
            "warm start should apply the stored drag impulse"
        );
    }

    #[test]
    fn test_position_pass_is_a_no_op() {
        let mut rig = dragged_rig();
        let mut joint = drag_joint(&rig, Point2::new(2.0, 0.0), 1000.0);
        let step = step_config(DT);
        let (mut data, bodies) = split(&mut rig, step);
        joint.init_velocity_constraints(&mut data, bodies);
        assert!(joint.solve_position_constraints(&mut data));
    }
}
