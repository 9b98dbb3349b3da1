//! Islands: connected components of awake bodies solved together.
//!
//! Each step, a depth-first search from every awake dynamic body walks
//! the contact and joint graphs, gathering everything reachable without
//! crossing a static body. The island stages positions and velocities in
//! flat arrays, runs the contact and joint solvers over them, and writes
//! the results back. Sleep is an island-wide decision: a body may only
//! sleep when its whole island has been quiet long enough, otherwise a
//! stack would fall asleep one body at a time from the top.

use planar_types::settings::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};
use planar_types::Vector2;

use crate::arena::Arena;
use crate::body::{Body, BodyId, BodyType};
use crate::contact::Contact;
use crate::contact_solver::ContactSolver;
use crate::events::{ContactListener, ContactView};
use crate::fixture::Fixture;
use crate::joints::{Joint, JointId};
use crate::time_step::{Position, SolverData, StepConfig, Velocity};

/// Scratch space for one island, reused across islands and steps.
#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<u32>,
    pub joints: Vec<JointId>,
    /// `(contact id, max normal impulse)` pairs from the last solve,
    /// for impulse-driven logic such as breakable bodies.
    pub reported: Vec<(u32, f64)>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.reported.clear();
        self.positions.clear();
        self.velocities.clear();
    }

    /// Add a body, assigning its island index.
    pub fn add_body(&mut self, id: BodyId, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(id);
    }

    /// Solve one discrete sub-step for this island: integrate, solve
    /// velocity constraints, integrate positions, correct positions,
    /// write back, and run the sleep logic.
    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    pub fn solve(
        &mut self,
        step: &StepConfig,
        gravity: Vector2<f64>,
        allow_sleep: bool,
        bodies: &mut Arena<Body>,
        contacts: &mut Arena<Contact>,
        fixtures: &Arena<Fixture>,
        joints: &mut Arena<Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let h = step.dt;

        // Stage state and integrate velocities.
        self.positions.clear();
        self.velocities.clear();
        for &body_id in &self.bodies {
            let Some(body) = bodies.get_mut(body_id.raw()) else {
                self.positions.push(Position::default());
                self.velocities.push(Velocity::default());
                continue;
            };

            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Remember the step-start pose for continuous collision.
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                // Implicit damping: v2 = v1 / (1 + h * d).
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        let mut contact_solver =
            ContactSolver::new(*step, &self.contacts, contacts, fixtures, bodies);
        contact_solver.init_velocity_constraints(&self.positions, &self.velocities, contacts);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        for &joint_id in &self.joints {
            if let Some(joint) = joints.get_mut(joint_id.raw()) {
                let mut data = SolverData {
                    step: *step,
                    positions: &mut self.positions,
                    velocities: &mut self.velocities,
                };
                joint.init_velocity_constraints(&mut data, bodies);
            }
        }

        for _ in 0..step.velocity_iterations {
            for &joint_id in &self.joints {
                if let Some(joint) = joints.get_mut(joint_id.raw()) {
                    let mut data = SolverData {
                        step: *step,
                        positions: &mut self.positions,
                        velocities: &mut self.velocities,
                    };
                    joint.solve_velocity_constraints(&mut data);
                }
            }
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Impulses feed next step's warm start.
        contact_solver.store_impulses(contacts);

        // Integrate positions with per-step motion clamps.
        for i in 0..self.positions.len() {
            let mut c = self.positions[i].c;
            let mut a = self.positions[i].a;
            let mut v = self.velocities[i].v;
            let mut w = self.velocities[i].w;

            let translation = h * v;
            if translation.norm_squared() > MAX_TRANSLATION_SQUARED {
                v *= MAX_TRANSLATION / translation.norm();
            }
            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                w *= MAX_ROTATION / rotation.abs();
            }

            c += h * v;
            a += h * w;

            self.positions[i] = Position { c, a };
            self.velocities[i] = Velocity { v, w };
        }

        // Position correction.
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(&mut self.positions);

            let mut joints_okay = true;
            for &joint_id in &self.joints {
                if let Some(joint) = joints.get_mut(joint_id.raw()) {
                    let mut data = SolverData {
                        step: *step,
                        positions: &mut self.positions,
                        velocities: &mut self.velocities,
                    };
                    joints_okay = joint.solve_position_constraints(&mut data) && joints_okay;
                }
            }

            if contacts_okay && joints_okay {
                position_solved = true;
                break;
            }
        }

        // Write back.
        for (i, &body_id) in self.bodies.iter().enumerate() {
            if let Some(body) = bodies.get_mut(body_id.raw()) {
                body.sweep.c = self.positions[i].c;
                body.sweep.a = self.positions[i].a;
                body.linear_velocity = self.velocities[i].v;
                body.angular_velocity = self.velocities[i].w;
                body.synchronize_transform();
            }
        }

        self.report(&contact_solver, contacts, fixtures, listener);

        if allow_sleep {
            let mut min_sleep_time = f64::MAX;

            let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
            let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

            for &body_id in &self.bodies {
                let Some(body) = bodies.get_mut(body_id.raw()) else {
                    continue;
                };
                if body.body_type == BodyType::Static {
                    continue;
                }

                if !body.allow_sleep
                    || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                    || body.linear_velocity.norm_squared() > lin_tol_sqr
                {
                    body.sleep_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    body.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(body.sleep_time);
                }
            }

            // The island sleeps or stays awake as a whole.
            if min_sleep_time >= TIME_TO_SLEEP && position_solved {
                for &body_id in &self.bodies {
                    if let Some(body) = bodies.get_mut(body_id.raw()) {
                        body.set_awake(false);
                    }
                }
            }
        }
    }

    /// Solve the remainder of a TOI sub-step: positions only against a
    /// stricter tolerance, then velocities, then integrate to the end of
    /// the step.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_toi(
        &mut self,
        sub_step: &StepConfig,
        toi_index_a: usize,
        toi_index_b: usize,
        bodies: &mut Arena<Body>,
        contacts: &mut Arena<Contact>,
        fixtures: &Arena<Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        // Stage current state; no force integration in the sub-step.
        self.positions.clear();
        self.velocities.clear();
        for &body_id in &self.bodies {
            let Some(body) = bodies.get(body_id.raw()) else {
                self.positions.push(Position::default());
                self.velocities.push(Velocity::default());
                continue;
            };
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let mut contact_solver =
            ContactSolver::new(*sub_step, &self.contacts, contacts, fixtures, bodies);

        // Resolve penetration at the TOI with only the two advanced
        // bodies mobile.
        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                toi_index_a,
                toi_index_b,
            ) {
                break;
            }
        }

        // Anchor the sweep start at the resolved TOI poses.
        for body_index in [toi_index_a, toi_index_b] {
            if let Some(&body_id) = self.bodies.get(body_index) {
                if let Some(body) = bodies.get_mut(body_id.raw()) {
                    body.sweep.c0 = self.positions[body_index].c;
                    body.sweep.a0 = self.positions[body_index].a;
                }
            }
        }

        // No warm starting here: the discrete solver already applied the
        // carried impulses, and TOI impulses can be large.
        contact_solver.init_velocity_constraints(&self.positions, &self.velocities, contacts);

        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Impulses are deliberately not stored for warm starting.

        let h = sub_step.dt;
        for i in 0..self.positions.len() {
            let mut c = self.positions[i].c;
            let mut a = self.positions[i].a;
            let mut v = self.velocities[i].v;
            let mut w = self.velocities[i].w;

            let translation = h * v;
            if translation.norm_squared() > MAX_TRANSLATION_SQUARED {
                v *= MAX_TRANSLATION / translation.norm();
            }
            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                w *= MAX_ROTATION / rotation.abs();
            }

            c += h * v;
            a += h * w;

            self.positions[i] = Position { c, a };
            self.velocities[i] = Velocity { v, w };

            if let Some(&body_id) = self.bodies.get(i) {
                if let Some(body) = bodies.get_mut(body_id.raw()) {
                    body.sweep.c = c;
                    body.sweep.a = a;
                    body.linear_velocity = v;
                    body.angular_velocity = w;
                    body.synchronize_transform();
                }
            }
        }

        self.report(&contact_solver, contacts, fixtures, listener);
    }

    fn report(
        &mut self,
        contact_solver: &ContactSolver,
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        for (contact_id, impulse) in contact_solver.impulses() {
            let max_normal = impulse.normal_impulses[..impulse.count]
                .iter()
                .fold(0.0_f64, |acc, &v| acc.max(v));
            self.reported.push((contact_id, max_normal));

            let Some(contact) = contacts.get(contact_id) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) = (
                fixtures.get(contact.fixture_a.0),
                fixtures.get(contact.fixture_b.0),
            ) else {
                continue;
            };

            listener.post_solve(
                &ContactView {
                    fixture_a: contact.fixture_a,
                    fixture_b: contact.fixture_b,
                    child_a: contact.child_a,
                    child_b: contact.child_b,
                    body_a: fixture_a.body,
                    body_b: fixture_b.body,
                    manifold: contact.manifold,
                },
                &impulse,
            );
        }
    }
}
