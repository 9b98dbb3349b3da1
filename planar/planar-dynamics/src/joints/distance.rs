//! Distance joint: keeps two local anchor points a fixed (or sprung,
//! or range-limited) distance apart.

use nalgebra::UnitComplex;
use planar_types::settings::LINEAR_SLOP;
use planar_types::{cross, cross_sv, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`DistanceJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Rest length.
    pub length: f64,
    /// Minimum length (clamped up to at least a slop).
    pub min_length: f64,
    /// Maximum length.
    pub max_length: f64,
    /// Spring stiffness in N/m; zero makes the joint rigid.
    pub stiffness: f64,
    /// Spring damping in N·s/m.
    pub damping: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl DistanceJointDef {
    /// A rigid distance joint between two anchors.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
        length: f64,
    ) -> Self {
        let length = length.max(LINEAR_SLOP);
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length,
            min_length: length,
            max_length: length,
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: false,
        }
    }

    /// Make the joint springy with the given stiffness and damping.
    #[must_use]
    pub fn with_spring(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }

    /// Allow the length to range between bounds.
    #[must_use]
    pub fn with_length_range(mut self, min_length: f64, max_length: f64) -> Self {
        self.min_length = min_length.max(LINEAR_SLOP);
        self.max_length = max_length.max(self.min_length);
        self
    }
}

/// A point-to-point distance constraint, optionally soft and optionally
/// with min/max length limits.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    length: f64,
    min_length: f64,
    max_length: f64,
    stiffness: f64,
    damping: f64,

    // Accumulated impulses, warm-started across steps.
    impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,

    // Solver caches.
    a: BodySolverInfo,
    b: BodySolverInfo,
    u: Vector2<f64>,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    current_length: f64,
    soft_mass: f64,
    mass: f64,
    bias: f64,
    gamma: f64,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length.max(LINEAR_SLOP),
            min_length: def.min_length.max(LINEAR_SLOP),
            max_length: def.max_length.max(def.min_length),
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            u: Vector2::zeros(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            current_length: 0.0,
            soft_mass: 0.0,
            mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
        }
    }

    /// Rest length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Set the rest length, returning the old value.
    pub fn set_length(&mut self, length: f64) -> f64 {
        self.impulse = 0.0;
        std::mem::replace(&mut self.length, length.max(LINEAR_SLOP))
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

        self.current_length = self.u.norm();
        if self.current_length > LINEAR_SLOP {
            self.u /= self.current_length;
        } else {
            self.u = Vector2::zeros();
            self.mass = 0.0;
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        let cr_a_u = cross(self.r_a, self.u);
        let cr_b_u = cross(self.r_b, self.u);
        let mut inv_mass = self.a.inv_mass
            + self.a.inv_inertia * cr_a_u * cr_a_u
            + self.b.inv_mass
            + self.b.inv_inertia * cr_b_u * cr_b_u;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.stiffness > 0.0 && self.min_length < self.max_length {
            // Soft constraint toward the rest length.
            let c = self.current_length - self.length;
            let h = data.step.dt;

            self.gamma = h * (self.damping + h * self.stiffness);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * self.stiffness * self.gamma;

            inv_mass += self.gamma;
            self.soft_mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
            self.soft_mass = self.mass;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable timestep.
            self.impulse *= data.step.dt_ratio;
            self.lower_impulse *= data.step.dt_ratio;
            self.upper_impulse *= data.step.dt_ratio;

            let p = (self.impulse + self.lower_impulse - self.upper_impulse) * self.u;
            v_a.v -= self.a.inv_mass * p;
            v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
            v_b.v += self.b.inv_mass * p;
            v_b.w += self.b.inv_inertia * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        if self.min_length < self.max_length {
            if self.stiffness > 0.0 {
                let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
                let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);
                let c_dot = self.u.dot(&(vp_b - vp_a));

                let impulse = -self.soft_mass * (c_dot + self.bias + self.gamma * self.impulse);
                self.impulse += impulse;

                let p = impulse * self.u;
                v_a.v -= self.a.inv_mass * p;
                v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
                v_b.v += self.b.inv_mass * p;
                v_b.w += self.b.inv_inertia * cross(self.r_b, p);
            }

            // Lower limit.
            {
                let c = self.current_length - self.min_length;
                let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
                let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);
                let c_dot = self.u.dot(&(vp_b - vp_a));

                let impulse = -self.mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (self.lower_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;

                let p = impulse * self.u;
                v_a.v -= self.a.inv_mass * p;
                v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
                v_b.v += self.b.inv_mass * p;
                v_b.w += self.b.inv_inertia * cross(self.r_b, p);
            }

            // Upper limit.
            {
                let c = self.max_length - self.current_length;
                let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
                let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);
                let c_dot = self.u.dot(&(vp_a - vp_b));

                let impulse = -self.mass * (c_dot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (self.upper_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;

                let p = -impulse * self.u;
                v_a.v -= self.a.inv_mass * p;
                v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
                v_b.v += self.b.inv_mass * p;
                v_b.w += self.b.inv_inertia * cross(self.r_b, p);
            }
        } else {
            // Rigid: drive the length rate to zero.
            let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
            let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);
            let c_dot = self.u.dot(&(vp_b - vp_a));

            let impulse = -self.mass * c_dot;
            self.impulse += impulse;

            let p = impulse * self.u;
            v_a.v -= self.a.inv_mass * p;
            v_a.w -= self.a.inv_inertia * cross(self.r_a, p);
            v_b.v += self.b.inv_mass * p;
            v_b.w += self.b.inv_inertia * cross(self.r_b, p);
        }

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
        let c = if self.min_length == self.max_length {
            length - self.min_length
        } else if length < self.min_length {
            length - self.min_length
        } else if length > self.max_length {
            length - self.max_length
        } else {
            return true;
        };

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a.c -= self.a.inv_mass * p;
        c_a.a -= self.a.inv_inertia * cross(r_a, p);
        c_b.c += self.b.inv_mass * p;
        c_b.a += self.b.inv_inertia * cross(r_b, p);

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

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

    fn anchored_rig(x: f64) -> Rig {
        Rig::new(vec![
            static_body(Point2::origin()),
            dynamic_body(Point2::new(x, 0.0)),
        ])
    }

    fn rigid_joint(rig: &Rig, length: f64) -> DistanceJoint {
        DistanceJoint::new(&DistanceJointDef::new(
            rig.ids[0],
            rig.ids[1],
            Point2::origin(),
            Point2::origin(),
            length,
        ))
    }

    #[test]
    fn test_rigid_removes_length_rate() {
        let mut rig = anchored_rig(3.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = rigid_joint(&rig, 3.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = anchored_rig(3.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = rigid_joint(&rig, 3.0);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // Fresh step with the motion gone: the carried impulse alone
        // must move the body back along the axis.
        rig.velocities[1].v = Vector2::zeros();
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        assert!(
            rig.velocities[1].v.x < 0.0,
            "warm start should apply the stored impulse"
        );
    }

    #[test]
    fn test_lower_limit_stops_approach() {
        // Body sitting at the minimum length, moving inward.
        let mut rig = anchored_rig(4.0);
        rig.velocities[1].v = Vector2::new(-1.0, 0.0);

        let mut joint = DistanceJoint::new(
            &DistanceJointDef::new(
                rig.ids[0],
                rig.ids[1],
                Point2::origin(),
                Point2::origin(),
                4.0,
            )
            .with_length_range(4.0, 6.0),
        );

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_upper_limit_stops_extension() {
        // Body sitting at the maximum length, moving outward.
        let mut rig = anchored_rig(2.0);
        rig.velocities[1].v = Vector2::new(1.0, 0.0);

        let mut joint = DistanceJoint::new(
            &DistanceJointDef::new(
                rig.ids[0],
                rig.ids[1],
                Point2::origin(),
                Point2::origin(),
                1.5,
            )
            .with_length_range(1.0, 2.0),
        );

        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        assert_relative_eq!(rig.velocities[1].v.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_position_correction_converges() {
        // Stretched one unit past its rigid length.
        let mut rig = anchored_rig(4.0);
        let mut joint = rigid_joint(&rig, 3.0);

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
        assert_relative_eq!(rig.positions[1].c.x, 3.0, epsilon = LINEAR_SLOP);
    }
}
