//! Sequential-impulse contact solver.
//!
//! Velocity constraints are warm-started from the previous step's
//! impulses and iterated: friction first (clamped by the friction cone),
//! then the normal impulses. Two-point manifolds are solved as a 2x2
//! block LCP, trying the four active-set cases in order; this resolves
//! both points simultaneously and removes the jitter a point-by-point
//! pass leaves on box stacks.
//!
//! Position constraints run after integration as pseudo-impulses with a
//! Baumgarte factor, pushing penetration back to the slop without adding
//! momentum. The TOI pass reuses the same machinery with a stricter
//! tolerance and only the two sub-step bodies mobile.

use nalgebra::{Matrix2, Point2, UnitComplex};
use planar_collision::{ManifoldKind, WorldManifold};
use planar_types::settings::{
    BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};
use planar_types::{cross, cross_sv, Pose, Vector2};

use crate::arena::Arena;
use crate::body::Body;
use crate::contact::Contact;
use crate::fixture::Fixture;
use crate::time_step::{Position, StepConfig, Velocity};

/// Switch for the simultaneous two-point solve.
const BLOCK_SOLVE: bool = true;

/// Condition-number bound above which the 2x2 block is treated as
/// degenerate and solved point by point.
const MAX_CONDITION_NUMBER: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vector2<f64>,
    r_b: Vector2<f64>,
    normal_impulse: f64,
    tangent_impulse: f64,
    normal_mass: f64,
    tangent_mass: f64,
    velocity_bias: f64,
}

#[derive(Debug, Clone)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vector2<f64>,
    normal_mass: Matrix2<f64>,
    k: Matrix2<f64>,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_inertia_a: f64,
    inv_inertia_b: f64,
    friction: f64,
    restitution: f64,
    tangent_speed: f64,
    point_count: usize,
    contact_id: u32,
}

#[derive(Debug, Clone)]
struct ContactPositionConstraint {
    local_points: [Point2<f64>; MAX_MANIFOLD_POINTS],
    local_normal: Vector2<f64>,
    local_point: Point2<f64>,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    local_center_a: Vector2<f64>,
    local_center_b: Vector2<f64>,
    inv_inertia_a: f64,
    inv_inertia_b: f64,
    kind: ManifoldKind,
    radius_a: f64,
    radius_b: f64,
    point_count: usize,
}

/// The solver over one island's touching contacts.
pub(crate) struct ContactSolver {
    step: StepConfig,
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

fn body_pose(position: &Position, local_center: Vector2<f64>) -> Pose {
    let rotation = UnitComplex::new(position.a);
    Pose {
        position: Point2::from(position.c - rotation * local_center),
        rotation,
    }
}

impl ContactSolver {
    /// Gather position-independent constraint data for the island's
    /// contacts. Warm-start impulses are scaled by the step ratio so a
    /// changed timestep doesn't over- or under-apply them.
    pub fn new(
        step: StepConfig,
        contact_ids: &[u32],
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
        bodies: &Arena<Body>,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(contact_ids.len());
        let mut position_constraints = Vec::with_capacity(contact_ids.len());

        for &contact_id in contact_ids {
            let Some(contact) = contacts.get(contact_id) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) = (
                fixtures.get(contact.fixture_a.0),
                fixtures.get(contact.fixture_b.0),
            ) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (
                bodies.get(fixture_a.body.raw()),
                bodies.get(fixture_b.body.raw()),
            ) else {
                continue;
            };

            let manifold = &contact.manifold;
            debug_assert!(manifold.point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vector2::zeros(),
                normal_mass: Matrix2::zeros(),
                k: Matrix2::zeros(),
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count: manifold.point_count,
                contact_id,
            };

            let mut pc = ContactPositionConstraint {
                local_points: [Point2::origin(); MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                kind: manifold.kind,
                radius_a: fixture_a.shape.radius(),
                radius_b: fixture_b.shape.radius(),
                point_count: manifold.point_count,
            };

            for j in 0..manifold.point_count {
                let mp = &manifold.points[j];
                let vcp = &mut vc.points[j];

                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }

                pc.local_points[j] = mp.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            step,
            velocity_constraints,
            position_constraints,
        }
    }

    /// Compute effective masses, restitution bias, and the block matrix
    /// from the staged island positions.
    pub fn init_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
        contacts: &Arena<Contact>,
    ) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
        {
            let Some(contact) = contacts.get(vc.contact_id) else {
                continue;
            };
            let manifold = &contact.manifold;

            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;

            let c_a = positions[vc.index_a];
            let c_b = positions[vc.index_b];
            let v_a = velocities[vc.index_a];
            let v_b = velocities[vc.index_b];

            let xf_a = body_pose(&c_a, pc.local_center_a);
            let xf_b = body_pose(&c_b, pc.local_center_b);

            let world_manifold =
                WorldManifold::initialize(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = world_manifold.normal;
            let tangent = planar_types::cross_vs(vc.normal, 1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];

                vcp.r_a = world_manifold.points[j].coords - c_a.c;
                vcp.r_b = world_manifold.points[j].coords - c_b.c;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias from the approach speed.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    &(v_b.v + cross_sv(v_b.w, vcp.r_b) - v_a.v - cross_sv(v_a.w, vcp.r_a)),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Prepare the block solver for two-point manifolds.
            if vc.point_count == 2 && BLOCK_SOLVE {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = cross(vcp1.r_a, vc.normal);
                let rn1_b = cross(vcp1.r_b, vc.normal);
                let rn2_a = cross(vcp2.r_a, vc.normal);
                let rn2_b = cross(vcp2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Matrix2::new(k11, k12, k12, k22);
                    let det = k11 * k22 - k12 * k12;
                    let inv_det = 1.0 / det;
                    vc.normal_mass = Matrix2::new(
                        inv_det * k22,
                        -inv_det * k12,
                        -inv_det * k12,
                        inv_det * k11,
                    );
                } else {
                    // The two points are nearly redundant; keep only one.
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply the carried-over impulses before iterating.
    pub fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;

            let normal = vc.normal;
            let tangent = planar_types::cross_vs(normal, 1.0);

            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];

            for vcp in vc.points.iter().take(vc.point_count) {
                let p = vcp.normal_impulse * normal + vcp.tangent_impulse * tangent;
                v_a.w -= i_a * cross(vcp.r_a, p);
                v_a.v -= m_a * p;
                v_b.w += i_b * cross(vcp.r_b, p);
                v_b.v += m_b * p;
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// One velocity iteration over all constraints.
    #[allow(clippy::too_many_lines)] // friction, single-point, and block cases as one pass
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;

            let normal = vc.normal;
            let tangent = planar_types::cross_vs(normal, 1.0);
            let friction = vc.friction;

            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];

            debug_assert!(vc.point_count == 1 || vc.point_count == 2);

            // Solve tangent constraints first so the normal solve sees
            // friction-consistent velocities.
            for vcp in vc.points.iter_mut().take(vc.point_count) {
                let dv = v_b.v + cross_sv(v_b.w, vcp.r_b) - v_a.v - cross_sv(v_a.w, vcp.r_a);

                let vt = dv.dot(&tangent) - vc.tangent_speed;
                let mut lambda = vcp.tangent_mass * -vt;

                // Coulomb cone: |tangent impulse| <= friction * normal.
                let max_friction = friction * vcp.normal_impulse;
                let new_impulse =
                    (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a.v -= m_a * p;
                v_a.w -= i_a * cross(vcp.r_a, p);
                v_b.v += m_b * p;
                v_b.w += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 || !BLOCK_SOLVE {
                for vcp in vc.points.iter_mut().take(vc.point_count) {
                    let dv =
                        v_b.v + cross_sv(v_b.w, vcp.r_b) - v_a.v - cross_sv(v_a.w, vcp.r_a);

                    let vn = dv.dot(&normal);
                    let mut lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    // Accumulated impulses stay non-negative.
                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;

                    let p = lambda * normal;
                    v_a.v -= m_a * p;
                    v_a.w -= i_a * cross(vcp.r_a, p);
                    v_b.v += m_b * p;
                    v_b.w += i_b * cross(vcp.r_b, p);
                }
            } else {
                // Block solve: resolve both normal impulses together by
                // trying the four active-set cases of the 2x2 LCP
                //
                //   vn = A * x + b,  x >= 0, vn >= 0, x . vn = 0
                //
                // in order; the first consistent case wins.
                let cp1_ra = vc.points[0].r_a;
                let cp1_rb = vc.points[0].r_b;
                let cp2_ra = vc.points[1].r_a;
                let cp2_rb = vc.points[1].r_b;

                let a = Vector2::new(vc.points[0].normal_impulse, vc.points[1].normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b.v + cross_sv(v_b.w, cp1_rb) - v_a.v - cross_sv(v_a.w, cp1_ra);
                let dv2 = v_b.v + cross_sv(v_b.w, cp2_rb) - v_a.v - cross_sv(v_a.w, cp2_ra);

                let vn1 = dv1.dot(&normal);
                let vn2 = dv2.dot(&normal);

                let mut b = Vector2::new(
                    vn1 - vc.points[0].velocity_bias,
                    vn2 - vc.points[1].velocity_bias,
                );
                // The b vector accounts for the current accumulated
                // impulse so each case solves from scratch.
                b -= vc.k * a;

                let mut apply = |x: Vector2<f64>,
                                 v_a: &mut Velocity,
                                 v_b: &mut Velocity,
                                 points: &mut [VelocityConstraintPoint;
                                     MAX_MANIFOLD_POINTS]| {
                    let d = x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a.v -= m_a * (p1 + p2);
                    v_a.w -= i_a * (cross(cp1_ra, p1) + cross(cp2_ra, p2));
                    v_b.v += m_b * (p1 + p2);
                    v_b.w += i_b * (cross(cp1_rb, p1) + cross(cp2_rb, p2));
                    points[0].normal_impulse = x.x;
                    points[1].normal_impulse = x.y;
                };

                'block: {
                    // Case 1: both points active.
                    let x = -(vc.normal_mass * b);
                    if x.x >= 0.0 && x.y >= 0.0 {
                        apply(x, &mut v_a, &mut v_b, &mut vc.points);
                        break 'block;
                    }

                    // Case 2: point 1 active, point 2 separating.
                    let x = Vector2::new(-vc.points[0].normal_mass * b.x, 0.0);
                    let vn2 = vc.k[(1, 0)] * x.x + b.y;
                    if x.x >= 0.0 && vn2 >= 0.0 {
                        apply(x, &mut v_a, &mut v_b, &mut vc.points);
                        break 'block;
                    }

                    // Case 3: point 2 active, point 1 separating.
                    let x = Vector2::new(0.0, -vc.points[1].normal_mass * b.y);
                    let vn1 = vc.k[(0, 1)] * x.y + b.x;
                    if x.y >= 0.0 && vn1 >= 0.0 {
                        apply(x, &mut v_a, &mut v_b, &mut vc.points);
                        break 'block;
                    }

                    // Case 4: both separating.
                    let x = Vector2::zeros();
                    if b.x >= 0.0 && b.y >= 0.0 {
                        apply(x, &mut v_a, &mut v_b, &mut vc.points);
                        break 'block;
                    }

                    // No case matched: numerical trouble; keep impulses.
                }
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// Write accumulated impulses back into the manifolds for the next
    /// step's warm start.
    pub fn store_impulses(&self, contacts: &mut Arena<Contact>) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact_id) else {
                continue;
            };
            for j in 0..vc.point_count {
                contact.manifold.points[j].normal_impulse = vc.points[j].normal_impulse;
                contact.manifold.points[j].tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// Impulses for post-solve reporting, per constraint.
    pub fn impulses(&self) -> impl Iterator<Item = (u32, crate::events::ContactImpulse)> + '_ {
        self.velocity_constraints.iter().map(|vc| {
            let mut impulse = crate::events::ContactImpulse {
                count: vc.point_count,
                ..Default::default()
            };
            for j in 0..vc.point_count {
                impulse.normal_impulses[j] = vc.points[j].normal_impulse;
                impulse.tangent_impulses[j] = vc.points[j].tangent_impulse;
            }
            (vc.contact_id, impulse)
        })
    }

    /// One position iteration. Returns true when every contact is within
    /// triple slop of separation.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let min_separation = self.position_iteration(positions, BAUMGARTE, None);
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position iteration for the TOI solver: only the two sub-step
    /// bodies move, the correction is stiffer, and the tolerance is
    /// tighter.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation =
            self.position_iteration(positions, TOI_BAUMGARTE, Some((toi_index_a, toi_index_b)));
        min_separation >= -1.5 * LINEAR_SLOP
    }

    fn position_iteration(
        &self,
        positions: &mut [Position],
        baumgarte: f64,
        toi_bodies: Option<(usize, usize)>,
    ) -> f64 {
        let mut min_separation = 0.0_f64;

        for pc in &self.position_constraints {
            // In the TOI pass everything except the two advanced bodies
            // is an infinite-mass anchor.
            let (m_a, i_a, m_b, i_b) = match toi_bodies {
                None => (
                    pc.inv_mass_a,
                    pc.inv_inertia_a,
                    pc.inv_mass_b,
                    pc.inv_inertia_b,
                ),
                Some((toi_a, toi_b)) => {
                    let mobile_a = pc.index_a == toi_a || pc.index_a == toi_b;
                    let mobile_b = pc.index_b == toi_a || pc.index_b == toi_b;
                    (
                        if mobile_a { pc.inv_mass_a } else { 0.0 },
                        if mobile_a { pc.inv_inertia_a } else { 0.0 },
                        if mobile_b { pc.inv_mass_b } else { 0.0 },
                        if mobile_b { pc.inv_inertia_b } else { 0.0 },
                    )
                }
            };

            let mut c_a = positions[pc.index_a];
            let mut c_b = positions[pc.index_b];

            for j in 0..pc.point_count {
                let xf_a = body_pose(&c_a, pc.local_center_a);
                let xf_b = body_pose(&c_b, pc.local_center_b);

                let (normal, point, separation) = position_solver_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point.coords - c_a.c;
                let r_b = point.coords - c_b.c;

                min_separation = min_separation.min(separation);

                // Clamped correction keeps the push stable against large
                // overlaps.
                let c = (baumgarte * (separation + LINEAR_SLOP))
                    .clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * normal;

                c_a.c -= m_a * p;
                c_a.a -= i_a * cross(r_a, p);
                c_b.c += m_b * p;
                c_b.a += i_b * cross(r_b, p);
            }

            positions[pc.index_a] = c_a;
            positions[pc.index_b] = c_b;
        }

        min_separation
    }
}

/// Evaluate one manifold point at the current trial positions: returns
/// (normal, world point, separation).
fn position_solver_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Pose,
    xf_b: &Pose,
    index: usize,
) -> (Vector2<f64>, Point2<f64>, f64) {
    debug_assert!(pc.point_count > 0);

    match pc.kind {
        ManifoldKind::Circles => {
            let point_a = xf_a.transform_point(&pc.local_point);
            let point_b = xf_b.transform_point(&pc.local_points[0]);
            let normal = (point_b - point_a).normalize();
            let point = nalgebra::center(&point_a, &point_b);
            let separation = (point_b - point_a).norm() - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldKind::FaceA => {
            let normal = xf_a.transform_vector(&pc.local_normal);
            let plane_point = xf_a.transform_point(&pc.local_point);
            let clip_point = xf_b.transform_point(&pc.local_points[index]);
            let separation =
                (clip_point - plane_point).dot(&normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldKind::FaceB => {
            let normal = xf_b.transform_vector(&pc.local_normal);
            let plane_point = xf_b.transform_point(&pc.local_point);
            let clip_point = xf_a.transform_point(&pc.local_points[index]);
            let separation =
                (clip_point - plane_point).dot(&normal) - pc.radius_a - pc.radius_b;
            // Flip so the normal points from A to B.
            (-normal, clip_point, separation)
        }
    }
}
