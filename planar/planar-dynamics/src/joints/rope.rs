//! Rope joint: a hard upper bound on the distance between two anchors.
//! Slack below the maximum length, rigid at it.

use nalgebra::UnitComplex;
use planar_types::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use planar_types::{cross, cross_sv, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`RopeJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RopeJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Maximum distance between the anchors.
    pub max_length: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl RopeJointDef {
    /// A rope of the given maximum length.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
        max_length: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            max_length,
            collide_connected: false,
        }
    }
}

/// A maximum-distance constraint between two anchors.
#[derive(Debug, Clone)]
pub struct RopeJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    max_length: f64,

    impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    u: Vector2<f64>,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    length: f64,
    mass: f64,
}

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            u: Vector2::zeros(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            length: 0.0,
            mass: 0.0,
        }
    }

    /// The rope's maximum length.
    #[must_use]
    pub fn max_length(&self) -> f64 {
        self.max_length
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
        self.u = c_b.c + self.r_b - c_a.c - self.r_a;

        self.length = self.u.norm();
        if self.length > LINEAR_SLOP {
            self.u /= self.length;
        } else {
            self.u = Vector2::zeros();
            self.mass = 0.0;
            self.impulse = 0.0;
            data.velocities[self.a.index] = v_a;
            data.velocities[self.b.index] = v_b;
            return;
        }

        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        let inv_mass = self.a.inv_mass
            + self.a.inv_inertia * cr_a * cr_a
            + self.b.inv_mass
            + self.b.inv_inertia * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            v_a.v -= self.a.inv_mass * p;
            v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
            v_b.v += self.b.inv_mass * p;
            v_b.w += self.b.inv_inertia * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        // Speculative: start removing approach speed just before the rope
        // goes taut.
        let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
        let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);
        let c = self.length - self.max_length;
        let mut c_dot = self.u.dot(&(vp_b - vp_a));

        if c < 0.0 {
            c_dot += data.step.inv_dt * c;
        }

        let impulse = -self.mass * c_dot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old_impulse;

        let p = impulse * self.u;
        v_a.v -= self.a.inv_mass * p;
        v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
        v_b.v += self.b.inv_mass * p;
        v_b.w += self.b.inv_inertia * cross(self.r_b, p);

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut c_a = data.positions[self.a.index];
        let mut c_b = data.positions[self.b.index];

        let q_a = UnitComplex::new(c_a.a);
        let q_b = UnitComplex::new(c_b.a);

        let r_a = q_a * (self.local_anchor_a.coords - self.a.local_center);
        let r_b = q_b * (self.local_anchor_b.coords - self.b.local_center);
        let mut u = c_b.c + r_b - c_a.c - r_a;

        let length = u.norm();
        if length > f64::EPSILON {
            u /= length;
        }
        let c = (length - self.max_length).clamp(0.0, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a.c -= self.a.inv_mass * p;
        c_a.a -= self.a.inv_inertia * cross(r_a, p);
        c_b.c += self.b.inv_mass * p;
        c_b.a += self.b.inv_inertia * cross(r_b, p);

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

        length - self.max_length < LINEAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, static_body, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    fn roped_rig(x: f64) -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::new(x, 0.0)),
        ])
    }

    fn rope_joint(rig: &Rig, max_length: f64) -> RopeJoint {
        RopeJoint::new(&RopeJointDef::new(
            rig.ids[0],
            rig.ids[1],
            Point2::origin(),
            Point2::origin(),
            max_length,
        ))
    }

    #[test]
    fn test_slack_rope_applies_nothing() {
        // Well inside the maximum length: free motion.
        let mut rig = roped_rig(1.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = rope_joint(&rig, 2.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_taut_rope_stops_extension() {
        // Exactly at the maximum length, still moving outward.
        let mut rig = roped_rig(2.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = rope_joint(&rig, 2.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_taut_rope_allows_return() {
        // At the limit but moving back inward: no impulse needed.
        let mut rig = roped_rig(2.0);
        rig.velocities[1].v = Vector2::new(-1.0, 0.0);

        let mut joint = rope_joint(&rig, 2.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = roped_rig(2.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = rope_joint(&rig, 2.0);
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
            rig.velocities[1].v.x < 0.0,
            "warm start should apply the stored rope impulse"
        );
    }

    #[test]
    fn test_position_correction_reels_back() {
        // Overstretched half a unit; corrections are capped per
        // iteration, so this takes a few passes.
        let mut rig = roped_rig(2.5);
        let mut joint = rope_joint(&rig, 2.0);

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
        assert!(rig.positions[1].c.x <= 2.0 + LINEAR_SLOP);
    }
}
