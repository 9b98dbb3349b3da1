//! Angle joint: drives the relative angle of two bodies toward a target
//! without constraining their positions.

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for an [`AngleJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AngleJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Target `angle_b - angle_a`.
    pub target_angle: f64,
    /// Bias factor in `[0, 1]`: how aggressively the error is removed.
    pub bias_factor: f64,
    /// Softness in `[0, 1]`: fraction of the constraint left unsolved.
    pub softness: f64,
    /// Clamp on the per-iteration corrective impulse.
    pub max_impulse: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl AngleJointDef {
    /// Hold the relative angle at `target_angle`.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, target_angle: f64) -> Self {
        Self {
            body_a,
            body_b,
            target_angle,
            bias_factor: 0.2,
            softness: 0.0,
            max_impulse: f64::MAX,
            collide_connected: true,
        }
    }
}

/// A relative-angle servo between two bodies.
#[derive(Debug, Clone)]
pub struct AngleJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    target_angle: f64,
    bias_factor: f64,
    softness: f64,
    max_impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    bias: f64,
    mass_factor: f64,
}

impl AngleJoint {
    pub(crate) fn new(def: &AngleJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            target_angle: def.target_angle,
            bias_factor: def.bias_factor,
            softness: def.softness,
            max_impulse: def.max_impulse,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            bias: 0.0,
            mass_factor: 0.0,
        }
    }

    /// Set the target relative angle.
    pub fn set_target_angle(&mut self, angle: f64) {
        self.target_angle = angle;
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

        let joint_error = c_b.a - c_a.a - self.target_angle;
        self.bias = -self.bias_factor * data.step.inv_dt * joint_error;

        let inv_inertia = self.a.inv_inertia + self.b.inv_inertia;
        self.mass_factor = if inv_inertia > 0.0 {
            (1.0 - self.softness) / inv_inertia
        } else {
            0.0
        };
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        let p = (self.bias - v_b.w + v_a.w) * self.mass_factor;
        let clamped = p.signum() * p.abs().min(self.max_impulse);

        v_a.w -= self.a.inv_inertia * clamped;
        v_b.w += self.b.inv_inertia * clamped;

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        // The bias term removes the error over a few steps.
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    use crate::joints::test_util::{dynamic_body, split, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    fn paired_rig() -> Rig {
        Rig::new(vec![
            dynamic_body(Point2::new(-1.0, 0.0)),
            dynamic_body(Point2::new(1.0, 0.0)),
        ])
    }

    #[test]
    fn test_drives_relative_angle_rate() {
        let mut rig = paired_rig();
        let target = 0.5;
        let mut joint =
            AngleJoint::new(&AngleJointDef::new(rig.ids[0], rig.ids[1], target));

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // Both bodies turn toward the target, splitting the correction.
        let (w_a, w_b) = (rig.velocities[0].w, rig.velocities[1].w);
        assert!(w_b > 0.0, "body B should spin forward, got {w_b}");
        assert!(w_a < 0.0, "body A should counter-spin, got {w_a}");

        // The relative rate equals the bias velocity for the full error.
        let bias = 0.2 * (1.0 / DT) * target;
        assert_relative_eq!(w_b - w_a, bias, epsilon = 1e-9);
    }

    #[test]
    fn test_impulse_is_clamped() {
        let mut rig = paired_rig();
        let max_impulse = 0.5;
        let mut def = AngleJointDef::new(rig.ids[0], rig.ids[1], 2.0);
        def.max_impulse = max_impulse;
        let mut joint = AngleJoint::new(&def);

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // Unit inertia on both sides: each gains at most the clamp.
        assert_relative_eq!(rig.velocities[1].w, max_impulse, epsilon = 1e-12);
        assert_relative_eq!(rig.velocities[0].w, -max_impulse, epsilon = 1e-12);
    }

    #[test]
    fn test_settled_joint_applies_nothing() {
        // Already at the target with no relative rate.
        let mut rig = paired_rig();
        rig.positions[1].a = 0.5;

        let mut joint = AngleJoint::new(&AngleJointDef::new(rig.ids[0], rig.ids[1], 0.5));
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[0].w, 0.0, epsilon = 1e-12);
        assert_relative_eq!(rig.velocities[1].w, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_position_pass_is_a_no_op() {
        let mut rig = paired_rig();
        let mut joint = AngleJoint::new(&AngleJointDef::new(rig.ids[0], rig.ids[1], 0.0));
        let step = step_config(DT);
        let (mut data, bodies) = split(&mut rig, step);
        joint.init_velocity_constraints(&mut data, bodies);
        assert!(joint.solve_position_constraints(&mut data));
    }
}
