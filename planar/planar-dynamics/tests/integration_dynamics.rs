//! End-to-end simulation tests: collision response, events, continuous
//! collision, sleeping, filtering, and one scenario per joint type.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use nalgebra::Point2;
use planar_dynamics::{
    AngleJointDef, BodyDef, ContactImpulse, ContactListener, ContactView, DistanceJointDef,
    FixtureDef, FrictionJointDef, GearJointDef, JointDef, MotorJointDef, MouseJointDef,
    PrismaticJointDef, PulleyJointDef, RayCastBehavior, RevoluteJointDef, RopeJointDef, WeldJointDef,
    WheelJointDef, World,
};
use planar_types::settings::LINEAR_SLOP;
use planar_types::{CircleShape, Filter, PolygonShape, Vector2};

const DT: f64 = 1.0 / 60.0;

fn step(world: &mut World) {
    world.step(DT, 8, 3);
}

/// Shared event recorder installed as the world's contact listener.
#[derive(Default)]
struct EventLog {
    begins: usize,
    ends: usize,
    max_normal_impulse: f64,
}

#[derive(Clone, Default)]
struct SharedLog(Rc<RefCell<EventLog>>);

impl ContactListener for SharedLog {
    fn begin_contact(&mut self, _contact: &ContactView) {
        self.0.borrow_mut().begins += 1;
    }

    fn end_contact(&mut self, _contact: &ContactView) {
        self.0.borrow_mut().ends += 1;
    }

    fn post_solve(&mut self, _contact: &ContactView, impulse: &ContactImpulse) {
        let mut log = self.0.borrow_mut();
        for i in 0..impulse.count {
            log.max_normal_impulse = log.max_normal_impulse.max(impulse.normal_impulses[i]);
        }
    }
}

#[test]
fn test_head_on_circles_reverse() {
    // Two unit circles approaching at 1 m/s each, no gravity, fully
    // elastic. They must collide, report a positive impulse, reverse,
    // and never interpenetrate by more than one step of travel.
    let mut world = World::new(Vector2::zeros());
    let log = SharedLog::default();
    world.set_contact_listener(Box::new(log.clone()));

    let make = |world: &mut World, x: f64, vx: f64| {
        let body = world
            .create_body(
                &BodyDef::dynamic(Point2::new(x, 0.0))
                    .with_linear_velocity(Vector2::new(vx, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(CircleShape::with_radius(1.0))
                    .with_density(1.0)
                    .with_restitution(1.0),
            )
            .unwrap();
        body
    };

    let left = make(&mut world, -5.0, 1.0);
    let right = make(&mut world, 5.0, -1.0);

    let mut min_separation = f64::MAX;
    let mut contact_step = None;
    for i in 0..300 {
        step(&mut world);

        let pa = world.body(left).unwrap().position();
        let pb = world.body(right).unwrap().position();
        let separation = (pb - pa).norm() - 2.0;
        min_separation = min_separation.min(separation);

        if contact_step.is_none() && log.0.borrow().begins > 0 {
            contact_step = Some(i);
        }
    }

    assert!(contact_step.is_some(), "begin_contact should fire");
    assert!(log.0.borrow().max_normal_impulse > 0.0);

    let va = world.body(left).unwrap().linear_velocity();
    let vb = world.body(right).unwrap().linear_velocity();
    assert!(va.x < 0.0, "left body should have reversed, vx = {}", va.x);
    assert!(vb.x > 0.0, "right body should have reversed, vx = {}", vb.x);

    // Post-step penetration never exceeds one step of closing travel
    // (the overlap that can appear before the manifold exists) and ends
    // fully separated after the bounce.
    let closing_travel = 2.0 * DT;
    assert!(
        min_separation > -(closing_travel + LINEAR_SLOP),
        "worst separation {min_separation}"
    );
    let final_gap = (world.body(right).unwrap().position()
        - world.body(left).unwrap().position())
    .norm()
        - 2.0;
    assert!(final_gap >= -LINEAR_SLOP);
}

#[test]
fn test_box_settles_and_sleeps() {
    let mut world = World::new(Vector2::new(0.0, -10.0));

    let ground = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
    world
        .create_fixture(ground, FixtureDef::new(PolygonShape::new_box(20.0, 1.0)))
        .unwrap();

    let falling = world
        .create_body(&BodyDef::dynamic(Point2::new(0.0, 5.0)))
        .unwrap();
    world
        .create_fixture(
            falling,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        )
        .unwrap();

    for _ in 0..300 {
        step(&mut world);
    }

    let body = world.body(falling).unwrap();
    assert_relative_eq!(body.position().y, 1.5, epsilon = 0.05);
    assert!(!body.is_awake(), "settled body should be asleep");
    assert_eq!(body.linear_velocity(), Vector2::zeros());
}

#[test]
fn test_sensor_reports_without_response() {
    let mut world = World::new(Vector2::zeros());
    let log = SharedLog::default();
    world.set_contact_listener(Box::new(log.clone()));

    let sensor_body = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
    world
        .create_fixture(
            sensor_body,
            FixtureDef::new(CircleShape::with_radius(1.0)).sensor(),
        )
        .unwrap();

    let mover = world
        .create_body(
            &BodyDef::dynamic(Point2::new(-5.0, 0.0))
                .with_linear_velocity(Vector2::new(2.0, 0.0)),
        )
        .unwrap();
    world
        .create_fixture(
            mover,
            FixtureDef::new(CircleShape::with_radius(0.5)).with_density(1.0),
        )
        .unwrap();

    for _ in 0..400 {
        step(&mut world);
    }

    let log = log.0.borrow();
    assert!(log.begins >= 1, "sensor overlap should begin");
    assert!(log.ends >= 1, "sensor overlap should end");
    assert_eq!(
        log.max_normal_impulse, 0.0,
        "sensors never enter the solver"
    );

    // The mover passed straight through.
    assert!(world.body(mover).unwrap().position().x > 2.0);
    assert_relative_eq!(
        world.body(mover).unwrap().linear_velocity().x,
        2.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_bullet_does_not_tunnel() {
    let mut world = World::new(Vector2::zeros());

    // A thin static wall at x = 0.
    let wall = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
    world
        .create_fixture(wall, FixtureDef::new(PolygonShape::new_box(0.05, 5.0)))
        .unwrap();

    // A small, very fast bullet: 200 m/s covers 3.3 m per step, far more
    // than the wall is thick.
    let bullet = world
        .create_body(
            &BodyDef::dynamic(Point2::new(-10.0, 0.0))
                .with_linear_velocity(Vector2::new(200.0, 0.0))
                .with_bullet(true),
        )
        .unwrap();
    world
        .create_fixture(
            bullet,
            FixtureDef::new(CircleShape::with_radius(0.1)).with_density(1.0),
        )
        .unwrap();

    for _ in 0..30 {
        step(&mut world);
    }

    assert!(
        world.body(bullet).unwrap().position().x < 0.0,
        "bullet must stop at the wall, got x = {}",
        world.body(bullet).unwrap().position().x
    );
}

struct DisableEverything;

impl ContactListener for DisableEverything {
    fn pre_solve(&mut self, _contact: &ContactView, _old: &planar_dynamics::Manifold) -> bool {
        false
    }
}

#[test]
fn test_pre_solve_disable_skips_response() {
    let mut world = World::new(Vector2::zeros());
    world.set_contact_listener(Box::new(DisableEverything));

    let wall = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
    world
        .create_fixture(wall, FixtureDef::new(PolygonShape::new_box(0.5, 5.0)))
        .unwrap();

    let mover = world
        .create_body(
            &BodyDef::dynamic(Point2::new(-5.0, 0.0))
                .with_linear_velocity(Vector2::new(3.0, 0.0)),
        )
        .unwrap();
    world
        .create_fixture(
            mover,
            FixtureDef::new(CircleShape::with_radius(0.4)).with_density(1.0),
        )
        .unwrap();

    for _ in 0..300 {
        step(&mut world);
    }

    assert!(
        world.body(mover).unwrap().position().x > 2.0,
        "disabled contacts apply no impulse"
    );
}

#[test]
fn test_negative_group_never_collides() {
    let mut world = World::new(Vector2::zeros());
    let log = SharedLog::default();
    world.set_contact_listener(Box::new(log.clone()));

    let filter = Filter::default().with_group(-7);
    let make = |world: &mut World, x: f64, vx: f64| {
        let body = world
            .create_body(
                &BodyDef::dynamic(Point2::new(x, 0.0))
                    .with_linear_velocity(Vector2::new(vx, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(CircleShape::with_radius(1.0))
                    .with_density(1.0)
                    .with_filter(filter),
            )
            .unwrap();
        body
    };

    let left = make(&mut world, -3.0, 1.0);
    make(&mut world, 3.0, -1.0);

    for _ in 0..400 {
        step(&mut world);
    }

    assert_eq!(log.0.borrow().begins, 0, "filtered pair has no contact");
    assert!(world.body(left).unwrap().position().x > 3.0, "passed through");
}

#[test]
fn test_kinematic_pushes_dynamic() {
    let mut world = World::new(Vector2::zeros());

    let pusher = world
        .create_body(
            &BodyDef::kinematic(Point2::new(-5.0, 0.0))
                .with_linear_velocity(Vector2::new(1.0, 0.0)),
        )
        .unwrap();
    world
        .create_fixture(pusher, FixtureDef::new(PolygonShape::new_box(0.5, 0.5)))
        .unwrap();

    let pushed = world
        .create_body(&BodyDef::dynamic(Point2::new(0.0, 0.0)))
        .unwrap();
    world
        .create_fixture(
            pushed,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        )
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    // Kinematic bodies ignore forces and keep their velocity.
    assert_relative_eq!(
        world.body(pusher).unwrap().linear_velocity().x,
        1.0,
        epsilon = 1e-9
    );
    assert!(
        world.body(pushed).unwrap().position().x > 4.0,
        "dynamic body should be shoved along"
    );
}

#[test]
fn test_world_queries() {
    let mut world = World::new(Vector2::zeros());

    let body = world
        .create_body(&BodyDef::fixed(Point2::new(3.0, 0.0)))
        .unwrap();
    let fixture = world
        .create_fixture(body, FixtureDef::new(CircleShape::with_radius(1.0)))
        .unwrap();

    // Stepping refreshes the broad phase.
    step(&mut world);

    let mut found = Vec::new();
    world.query_aabb(
        &planar_types::Aabb::from_center(Point2::new(3.0, 0.0), Vector2::new(0.5, 0.5)),
        |f| {
            found.push(f);
            true
        },
    );
    assert_eq!(found, vec![fixture]);

    let mut hits = Vec::new();
    world.ray_cast(Point2::new(-10.0, 0.0), Point2::new(10.0, 0.0), |hit| {
        hits.push(hit);
        RayCastBehavior::Clip(hit.fraction)
    });
    assert_eq!(hits.len(), 1);
    assert_relative_eq!(hits[0].point.x, 2.0, epsilon = 1e-6);
    assert!(hits[0].normal.x < 0.0);

    // Exact overlap against a nearby and a distant fixture.
    let near = world
        .create_body(&BodyDef::fixed(Point2::new(3.5, 0.0)))
        .unwrap();
    let near_fixture = world
        .create_fixture(near, FixtureDef::new(CircleShape::with_radius(1.0)))
        .unwrap();
    let far = world
        .create_body(&BodyDef::fixed(Point2::new(30.0, 0.0)))
        .unwrap();
    let far_fixture = world
        .create_fixture(far, FixtureDef::new(CircleShape::with_radius(1.0)))
        .unwrap();

    assert!(world.test_overlap(fixture, near_fixture));
    assert!(!world.test_overlap(fixture, far_fixture));
}

// ----------------------------------------------------------------------
// Joints
// ----------------------------------------------------------------------

fn anchored_pair(world: &mut World, separation: f64) -> (planar_dynamics::BodyId, planar_dynamics::BodyId) {
    let anchor = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();

    let swinging = world
        .create_body(&BodyDef::dynamic(Point2::new(separation, 0.0)))
        .unwrap();
    world
        .create_fixture(
            swinging,
            FixtureDef::new(CircleShape::with_radius(0.2)).with_density(1.0),
        )
        .unwrap();

    (anchor, swinging)
}

#[test]
fn test_distance_joint_holds_length() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, bob) = anchored_pair(&mut world, 3.0);

    world
        .create_joint(JointDef::Distance(DistanceJointDef::new(
            anchor,
            bob,
            Point2::origin(),
            Point2::origin(),
            3.0,
        )))
        .unwrap();

    for _ in 0..300 {
        step(&mut world);
    }

    let distance = world.body(bob).unwrap().position().coords.norm();
    assert_relative_eq!(distance, 3.0, epsilon = 0.05);
}

#[test]
fn test_revolute_pendulum_swings() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, bob) = anchored_pair(&mut world, 2.0);

    // Hinge at the anchor's origin: the bob's anchor is its own local
    // point that coincides with the pivot at setup time.
    world
        .create_joint(JointDef::Revolute(RevoluteJointDef::new(
            anchor,
            bob,
            Point2::origin(),
            Point2::new(-2.0, 0.0),
        )))
        .unwrap();

    let mut max_drift = 0.0_f64;
    let mut min_y = f64::MAX;
    for _ in 0..600 {
        step(&mut world);
        let pivot_on_bob = world
            .body(bob)
            .unwrap()
            .world_point(&Point2::new(-2.0, 0.0));
        max_drift = max_drift.max(pivot_on_bob.coords.norm());
        min_y = min_y.min(world.body(bob).unwrap().position().y);
    }

    assert!(max_drift < 0.05, "pivot drifted {max_drift}");
    // The pendulum actually swung through the bottom of its arc.
    assert!(min_y < -1.0, "lowest point reached was {min_y}");
}

#[test]
fn test_prismatic_constrains_to_axis() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, slider) = anchored_pair(&mut world, 1.0);

    // Horizontal axis: gravity cannot move the slider vertically.
    world
        .create_joint(JointDef::Prismatic(PrismaticJointDef::new(
            anchor,
            slider,
            Point2::origin(),
            Point2::origin(),
            Vector2::new(1.0, 0.0),
        )))
        .unwrap();

    for _ in 0..300 {
        step(&mut world);
    }

    let position = world.body(slider).unwrap().position();
    assert_relative_eq!(position.y, 0.0, epsilon = 0.01);
    assert_relative_eq!(world.body(slider).unwrap().angle(), 0.0, epsilon = 0.01);
}

#[test]
fn test_prismatic_motor_drives() {
    let mut world = World::new(Vector2::zeros());
    let (anchor, slider) = anchored_pair(&mut world, 0.0);

    world
        .create_joint(JointDef::Prismatic(
            PrismaticJointDef::new(
                anchor,
                slider,
                Point2::origin(),
                Point2::origin(),
                Vector2::new(1.0, 0.0),
            )
            .with_motor(2.0, 100.0)
            .with_limit(-10.0, 5.0),
        ))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    // Motor drives at 2 m/s until the upper limit stops it.
    let x = world.body(slider).unwrap().position().x;
    assert_relative_eq!(x, 5.0, epsilon = 0.05);
}

#[test]
fn test_rope_joint_limits_range() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, bob) = anchored_pair(&mut world, 1.0);

    world
        .create_joint(JointDef::Rope(RopeJointDef::new(
            anchor,
            bob,
            Point2::origin(),
            Point2::origin(),
            4.0,
        )))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    let distance = world.body(bob).unwrap().position().coords.norm();
    assert!(
        distance <= 4.0 + 10.0 * LINEAR_SLOP,
        "rope stretched to {distance}"
    );
}

#[test]
fn test_pulley_conserves_total_length() {
    let mut world = World::new(Vector2::new(0.0, -10.0));

    let make_hanging = |world: &mut World, x: f64, density: f64| {
        let body = world
            .create_body(&BodyDef::dynamic(Point2::new(x, -2.0)))
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(PolygonShape::new_box(0.3, 0.3)).with_density(density),
            )
            .unwrap();
        body
    };

    let heavy = make_hanging(&mut world, -2.0, 4.0);
    let light = make_hanging(&mut world, 2.0, 1.0);

    let ground_a = Point2::new(-2.0, 0.0);
    let ground_b = Point2::new(2.0, 0.0);
    world
        .create_joint(JointDef::Pulley(PulleyJointDef::new(
            heavy,
            light,
            ground_a,
            ground_b,
            Point2::origin(),
            Point2::origin(),
            2.0,
            2.0,
        )))
        .unwrap();

    // Short run: the light side accelerates upward fast and must not
    // reach its ground anchor, where the constraint degenerates.
    for _ in 0..30 {
        step(&mut world);
    }

    let len_a = (world.body(heavy).unwrap().position() - ground_a).norm();
    let len_b = (world.body(light).unwrap().position() - ground_b).norm();

    // The heavy side descends, the light side rises, the rope total holds.
    assert!(len_a > 2.2 && len_b < 1.8, "lengths {len_a} / {len_b}");
    assert_relative_eq!(len_a + len_b, 4.0, epsilon = 0.05);
}

#[test]
fn test_gear_couples_revolutes() {
    let mut world = World::new(Vector2::zeros());

    let ground = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();

    let make_wheel = |world: &mut World, x: f64| {
        let body = world
            .create_body(&BodyDef::dynamic(Point2::new(x, 0.0)))
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(CircleShape::with_radius(0.5)).with_density(1.0),
            )
            .unwrap();
        body
    };

    let wheel_a = make_wheel(&mut world, -1.0);
    let wheel_b = make_wheel(&mut world, 1.0);

    let hinge_a = world
        .create_joint(JointDef::Revolute(RevoluteJointDef::new(
            ground,
            wheel_a,
            Point2::new(-1.0, 0.0),
            Point2::origin(),
        )))
        .unwrap();
    let hinge_b = world
        .create_joint(JointDef::Revolute(RevoluteJointDef::new(
            ground,
            wheel_b,
            Point2::new(1.0, 0.0),
            Point2::origin(),
        )))
        .unwrap();

    let ratio = 2.0;
    world
        .create_joint(JointDef::Gear(GearJointDef::new(hinge_a, hinge_b, ratio)))
        .unwrap();

    // Spin wheel A; the gear forces B to counter-rotate at the ratio.
    world
        .body_mut(wheel_a)
        .unwrap()
        .set_angular_velocity(3.0);

    for _ in 0..120 {
        step(&mut world);
    }

    let angle_a = world.body(wheel_a).unwrap().angle();
    let angle_b = world.body(wheel_b).unwrap().angle();
    assert_relative_eq!(angle_a + ratio * angle_b, 0.0, epsilon = 0.02);
    assert!(angle_a.abs() > 0.5, "wheel A should have spun");
}

#[test]
fn test_zero_gear_ratio_rejected() {
    let mut world = World::new(Vector2::zeros());
    let (anchor, bob) = anchored_pair(&mut world, 1.0);

    let hinge = world
        .create_joint(JointDef::Revolute(RevoluteJointDef::new(
            anchor,
            bob,
            Point2::origin(),
            Point2::origin(),
        )))
        .unwrap();

    let err = world
        .create_joint(JointDef::Gear(GearJointDef::new(hinge, hinge, 0.0)))
        .expect_err("zero ratio");
    assert!(matches!(err, planar_dynamics::PhysicsError::InvalidRatio(_)));
}

#[test]
fn test_wheel_suspension_settles() {
    let mut world = World::new(Vector2::new(0.0, -10.0));

    let chassis = world
        .create_body(&BodyDef::dynamic(Point2::new(0.0, 2.0)))
        .unwrap();
    world
        .create_fixture(
            chassis,
            FixtureDef::new(PolygonShape::new_box(1.0, 0.25)).with_density(1.0),
        )
        .unwrap();

    let wheel = world
        .create_body(&BodyDef::dynamic(Point2::new(0.0, 1.0)))
        .unwrap();
    world
        .create_fixture(
            wheel,
            FixtureDef::new(CircleShape::with_radius(0.4)).with_density(1.0),
        )
        .unwrap();

    let ground = world.create_body(&BodyDef::fixed(Point2::origin())).unwrap();
    world
        .create_fixture(ground, FixtureDef::new(PolygonShape::new_box(20.0, 0.5)))
        .unwrap();

    // Suspension axis pointing up, stiff spring.
    let (stiffness, damping) =
        planar_types::settings::linear_stiffness(4.0, 0.7, 1.0, 0.0);
    world
        .create_joint(JointDef::Wheel(
            WheelJointDef::new(
                chassis,
                wheel,
                Point2::new(0.0, -1.0),
                Point2::origin(),
                Vector2::new(0.0, 1.0),
            )
            .with_suspension(stiffness, damping),
        ))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    // The wheel rests on the ground and the chassis hangs above it on
    // the spring; both ended up at sane heights.
    let wheel_y = world.body(wheel).unwrap().position().y;
    let chassis_y = world.body(chassis).unwrap().position().y;
    assert_relative_eq!(wheel_y, 0.9, epsilon = 0.1);
    assert!(chassis_y > wheel_y + 0.5, "chassis sits above the wheel");
}

#[test]
fn test_weld_locks_relative_pose() {
    let mut world = World::new(Vector2::new(0.0, -10.0));

    let a = world
        .create_body(&BodyDef::dynamic(Point2::new(0.0, 5.0)))
        .unwrap();
    world
        .create_fixture(
            a,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        )
        .unwrap();

    let b = world
        .create_body(&BodyDef::dynamic(Point2::new(1.0, 5.0)))
        .unwrap();
    world
        .create_fixture(
            b,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        )
        .unwrap();

    world
        .create_joint(JointDef::Weld(WeldJointDef::new(
            a,
            b,
            Point2::new(0.5, 0.0),
            Point2::new(-0.5, 0.0),
        )))
        .unwrap();

    for _ in 0..120 {
        step(&mut world);
    }

    // Falling freely, but rigidly attached: relative pose preserved.
    let pa = world.body(a).unwrap().position();
    let pb = world.body(b).unwrap().position();
    assert_relative_eq!((pb - pa).norm(), 1.0, epsilon = 0.01);
    assert_relative_eq!(
        world.body(a).unwrap().angle(),
        world.body(b).unwrap().angle(),
        epsilon = 0.01
    );
}

#[test]
fn test_friction_joint_damps_sliding() {
    let mut world = World::new(Vector2::zeros());
    let (anchor, slider) = anchored_pair(&mut world, 0.0);

    world
        .body_mut(slider)
        .unwrap()
        .set_linear_velocity(Vector2::new(5.0, 0.0));

    world
        .create_joint(JointDef::Friction(FrictionJointDef::new(
            anchor,
            slider,
            Point2::origin(),
            Point2::origin(),
            10.0,
            10.0,
        )))
        .unwrap();

    for _ in 0..300 {
        step(&mut world);
    }

    let speed = world.body(slider).unwrap().linear_velocity().norm();
    assert!(speed < 0.01, "friction should stop the body, v = {speed}");
}

#[test]
fn test_motor_joint_tracks_offset() {
    let mut world = World::new(Vector2::zeros());
    let (anchor, follower) = anchored_pair(&mut world, 0.0);

    world
        .create_joint(JointDef::Motor(
            MotorJointDef::new(anchor, follower)
                .with_offsets(Vector2::new(3.0, 1.0), 0.0)
                .with_limits(50.0, 50.0),
        ))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    let p = world.body(follower).unwrap().position();
    assert_relative_eq!(p.x, 3.0, epsilon = 0.05);
    assert_relative_eq!(p.y, 1.0, epsilon = 0.05);
}

#[test]
fn test_mouse_joint_drags_body() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, dragged) = anchored_pair(&mut world, 0.0);

    let mass = world.body(dragged).unwrap().mass();
    let (stiffness, damping) =
        planar_types::settings::linear_stiffness(5.0, 0.7, mass, 0.0);
    world
        .create_joint(JointDef::Mouse(
            MouseJointDef::new(anchor, dragged, Point2::origin(), Point2::new(4.0, 4.0))
                .with_spring(stiffness, damping)
                .with_max_force(1000.0 * mass),
        ))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    let p = world.body(dragged).unwrap().position();
    // Hangs near the target, sagging slightly under gravity.
    assert_relative_eq!(p.x, 4.0, epsilon = 0.2);
    assert_relative_eq!(p.y, 4.0, epsilon = 0.2);
}

#[test]
fn test_angle_joint_matches_target() {
    let mut world = World::new(Vector2::zeros());

    let a = world
        .create_body(&BodyDef::dynamic(Point2::new(-1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(
            a,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.1)).with_density(1.0),
        )
        .unwrap();

    let b = world
        .create_body(&BodyDef::dynamic(Point2::new(1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(
            b,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.1)).with_density(1.0),
        )
        .unwrap();

    let target = 0.5;
    world
        .create_joint(JointDef::Angle(AngleJointDef::new(a, b, target)))
        .unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    let relative = world.body(b).unwrap().angle() - world.body(a).unwrap().angle();
    assert_relative_eq!(relative, target, epsilon = 0.01);
}

#[test]
fn test_joint_destruction_unlinks() {
    let mut world = World::new(Vector2::new(0.0, -10.0));
    let (anchor, bob) = anchored_pair(&mut world, 2.0);

    let joint = world
        .create_joint(JointDef::Distance(DistanceJointDef::new(
            anchor,
            bob,
            Point2::origin(),
            Point2::origin(),
            2.0,
        )))
        .unwrap();

    for _ in 0..60 {
        step(&mut world);
    }
    world.destroy_joint(joint).unwrap();
    assert_eq!(world.joint_count(), 0);

    for _ in 0..120 {
        step(&mut world);
    }

    // Freed from the joint, the bob just falls.
    assert!(world.body(bob).unwrap().position().y < -3.0);
}
