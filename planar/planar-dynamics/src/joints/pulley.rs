//! Pulley joint: an idealized rope over two ground anchors with a
//! transmission ratio, holding `length_a + ratio * length_b` constant.

use nalgebra::UnitComplex;
use planar_types::settings::LINEAR_SLOP;
use planar_types::{cross, cross_sv, Point2, Vector2};

use crate::arena::Arena;
use crate::body::{Body, BodyId};
use crate::joints::{body_solver_info, BodySolverInfo};
use crate::time_step::SolverData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`PulleyJoint`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulleyJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Fixed world anchor for side A.
    pub ground_anchor_a: Point2<f64>,
    /// Fixed world anchor for side B.
    pub ground_anchor_b: Point2<f64>,
    /// Anchor on body A, in A's local frame.
    pub local_anchor_a: Point2<f64>,
    /// Anchor on body B, in B's local frame.
    pub local_anchor_b: Point2<f64>,
    /// Rope length on side A at rest.
    pub length_a: f64,
    /// Rope length on side B at rest.
    pub length_b: f64,
    /// Transmission ratio (side A moves `ratio` times side B). Must be
    /// non-zero.
    pub ratio: f64,
    /// Whether the connected bodies may collide.
    pub collide_connected: bool,
}

impl PulleyJointDef {
    /// A pulley with the given anchors and a 1:1 ratio.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Point2<f64>,
        ground_anchor_b: Point2<f64>,
        local_anchor_a: Point2<f64>,
        local_anchor_b: Point2<f64>,
        length_a: f64,
        length_b: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a,
            local_anchor_b,
            length_a,
            length_b,
            ratio: 1.0,
            collide_connected: true,
        }
    }

    /// Set the transmission ratio.
    #[must_use]
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }
}

/// A two-sided pulley constraint.
#[derive(Debug, Clone)]
pub struct PulleyJoint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,

    ground_anchor_a: Point2<f64>,
    ground_anchor_b: Point2<f64>,
    local_anchor_a: Point2<f64>,
    local_anchor_b: Point2<f64>,
    constant: f64,
    ratio: f64,

    impulse: f64,

    a: BodySolverInfo,
    b: BodySolverInfo,
    u_a: Vector2<f64>,
    u_b: Vector2<f64>,
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    mass: f64,
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Self {
        debug_assert!(def.ratio != 0.0);
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            constant: def.length_a + def.ratio * def.length_b,
            ratio: def.ratio,
            impulse: 0.0,
            a: BodySolverInfo::default(),
            b: BodySolverInfo::default(),
            u_a: Vector2::zeros(),
            u_b: Vector2::zeros(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            mass: 0.0,
        }
    }

    /// The transmission ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
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

        // Rope directions from the ground anchors.
        self.u_a = c_a.c + self.r_a - self.ground_anchor_a.coords;
        self.u_b = c_b.c + self.r_b - self.ground_anchor_b.coords;

        let length_a = self.u_a.norm();
        let length_b = self.u_b.norm();

        if length_a > 10.0 * LINEAR_SLOP {
            self.u_a /= length_a;
        } else {
            self.u_a = Vector2::zeros();
        }
        if length_b > 10.0 * LINEAR_SLOP {
            self.u_b /= length_b;
        } else {
            self.u_b = Vector2::zeros();
        }

        let ru_a = cross(self.r_a, self.u_a);
        let ru_b = cross(self.r_b, self.u_b);

        let m_a = self.a.inv_mass + self.a.inv_inertia * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_inertia * ru_b * ru_b;

        self.mass = m_a + self.ratio * self.ratio * m_b;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p_a = -self.impulse * self.u_a;
            let p_b = -self.ratio * self.impulse * self.u_b;

            v_a.v += self.a.inv_mass * p_a;
            v_a.w += self.a.inv_inertia * cross(self.r_a, p_a);
            v_b.v += self.b.inv_mass * p_b;
            v_b.w += self.b.inv_inertia * cross(self.r_b, p_b);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[self.a.index] = v_a;
        data.velocities[self.b.index] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut v_a = data.velocities[self.a.index];
        let mut v_b = data.velocities[self.b.index];

        let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
        let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);

        let c_dot = -self.u_a.dot(&vp_a) - self.ratio * self.u_b.dot(&vp_b);
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        let p_a = -impulse * self.u_a;
        let p_b = -self.ratio * impulse * self.u_b;

        v_a.v += self.a.inv_mass * p_a;
        v_a.w += self.a.inv_inertia * cross(self.r_a, p_a);
        v_b.v += self.b.inv_mass * p_b;
        v_b.w += self.b.inv_inertia * cross(self.r_b, p_b);

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

        let mut u_a = c_a.c + r_a - self.ground_anchor_a.coords;
        let mut u_b = c_b.c + r_b - self.ground_anchor_b.coords;

        let length_a = u_a.norm();
        let length_b = u_b.norm();

        if length_a > 10.0 * LINEAR_SLOP {
            u_a /= length_a;
        } else {
            u_a = Vector2::zeros();
        }
        if length_b > 10.0 * LINEAR_SLOP {
            u_b /= length_b;
        } else {
            u_b = Vector2::zeros();
        }

        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);

        let m_a = self.a.inv_mass + self.a.inv_inertia * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_inertia * ru_b * ru_b;

        let mut mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            mass = 1.0 / mass;
        }

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = -self.ratio * impulse * u_b;

        c_a.c += self.a.inv_mass * p_a;
        c_a.a += self.a.inv_inertia * cross(r_a, p_a);
        c_b.c += self.b.inv_mass * p_b;
        c_b.a += self.b.inv_inertia * cross(r_b, p_b);

        data.positions[self.a.index] = c_a;
        data.positions[self.b.index] = c_b;

        linear_error < LINEAR_SLOP
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::joints::test_util::{dynamic_body, split, step_config, Rig};

    const DT: f64 = 1.0 / 60.0;

    fn ground_a() -> Point2<f64> {
        Point2::new(-1.0, 0.0)
    }

    fn ground_b() -> Point2<f64> {
        Point2::new(1.0, 0.0)
    }

    /// Two unit-mass bodies hanging one unit below their ground anchors.
    fn hanging_rig() -> Rig {
        Rig::new(vec![
            dynamic_body(Point2::new(-1.0, -1.0)),
            dynamic_body(Point2::new(1.0, -1.0)),
        ])
    }

    fn pulley_joint(rig: &Rig) -> PulleyJoint {
        PulleyJoint::new(&PulleyJointDef::new(
            rig.ids[0],
            rig.ids[1],
            ground_a(),
            ground_b(),
            Point2::origin(),
            Point2::origin(),
            1.0,
            1.0,
        ))
    }

    #[test]
    fn test_velocity_transfers_across_the_rope() {
        let mut rig = hanging_rig();
        rig.velocities[0].v = Vector2::new(0.0, -1.0);

        let mut joint = pulley_joint(&rig);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        // Side A descends, side B rises, and the summed length rate is
        // zero: -(uA . vA) - (uB . vB) with both ropes pointing down.
        let (v_a, v_b) = (rig.velocities[0].v, rig.velocities[1].v);
        assert_relative_eq!(v_a.y, -0.5, epsilon = 1e-12);
        assert_relative_eq!(v_b.y, 0.5, epsilon = 1e-12);
        let u = Vector2::new(0.0, -1.0);
        assert_relative_eq!(-u.dot(&v_a) - u.dot(&v_b), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut rig = hanging_rig();
        rig.velocities[0].v = Vector2::new(0.0, -1.0);

        let mut joint = pulley_joint(&rig);
        let step = step_config(DT);
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
            joint.solve_velocity_constraints(&mut data);
        }

        rig.velocities[0].v = Vector2::zeros();
        rig.velocities[1].v = Vector2::zeros();
        {
            let (mut data, bodies) = split(&mut rig, step);
            joint.init_velocity_constraints(&mut data, bodies);
        }
        assert!(
            rig.velocities[0].v.y > 0.0,
            "warm start should pull side A back up the rope"
        );
    }

    #[test]
    fn test_position_correction_restores_total_length() {
        let mut rig = hanging_rig();
        // Side A overextended by half a unit.
        rig.positions[0].c = Vector2::new(-1.0, -1.5);

        let mut joint = pulley_joint(&rig);
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

        let len_a = (rig.positions[0].c - ground_a().coords).norm();
        let len_b = (rig.positions[1].c - ground_b().coords).norm();
        assert!(solved, "position solver should report convergence");
        assert_relative_eq!(len_a + len_b, 2.0, epsilon = 10.0 * LINEAR_SLOP);
    }
}
