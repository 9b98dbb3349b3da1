//! Microbenchmarks for the broad-phase tree and the GJK distance query.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Point2, Vector2};
use planar_collision::{distance, DistanceInput, DistanceProxy, DynamicTree, SimplexCache};
use planar_types::{Aabb, PolygonShape, Pose, Shape};

/// Number of proxies churned through the tree per iteration. Large enough
/// that rebalancing dominates over fixed costs.
const PROXY_COUNT: usize = 1_000;

/// Number of overlap queries issued against the populated tree.
const QUERY_COUNT: usize = 1_000;

fn lcg(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    f64::from(*seed >> 8) / f64::from(1u32 << 24)
}

fn bench_tree_churn(c: &mut Criterion) {
    c.bench_function("tree_create_move_destroy", |b| {
        b.iter(|| {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            let mut seed = 0xDEAD_BEEF_u32;
            let extent = 50.0;

            let ids: Vec<i32> = (0..PROXY_COUNT)
                .map(|i| {
                    let x = extent * (2.0 * lcg(&mut seed) - 1.0);
                    let y = extent * (2.0 * lcg(&mut seed) - 1.0);
                    tree.create_proxy(
                        &Aabb::from_center(Point2::new(x, y), Vector2::new(0.5, 0.5)),
                        i,
                    )
                })
                .collect();

            for &id in &ids {
                let x = extent * (2.0 * lcg(&mut seed) - 1.0);
                let y = extent * (2.0 * lcg(&mut seed) - 1.0);
                tree.move_proxy(
                    id,
                    &Aabb::from_center(Point2::new(x, y), Vector2::new(0.5, 0.5)),
                    Vector2::new(0.1, 0.1),
                );
            }

            for &id in &ids {
                tree.destroy_proxy(id);
            }
            tree.capacity()
        });
    });
}

fn bench_tree_query(c: &mut Criterion) {
    let mut tree: DynamicTree<usize> = DynamicTree::new();
    let mut seed = 0x1234_5678_u32;
    let extent = 50.0;
    for i in 0..PROXY_COUNT {
        let x = extent * (2.0 * lcg(&mut seed) - 1.0);
        let y = extent * (2.0 * lcg(&mut seed) - 1.0);
        tree.create_proxy(
            &Aabb::from_center(Point2::new(x, y), Vector2::new(0.5, 0.5)),
            i,
        );
    }

    c.bench_function("tree_query", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            let mut seed = 0x0BAD_F00D_u32;
            for _ in 0..QUERY_COUNT {
                let x = extent * (2.0 * lcg(&mut seed) - 1.0);
                let y = extent * (2.0 * lcg(&mut seed) - 1.0);
                tree.query(
                    &Aabb::from_center(Point2::new(x, y), Vector2::new(2.0, 2.0)),
                    |_| {
                        hits += 1;
                        true
                    },
                );
            }
            hits
        });
    });
}

fn bench_gjk_distance(c: &mut Criterion) {
    let proxy_a = DistanceProxy::from_shape(
        &Shape::from(PolygonShape::new_oriented_box(
            10.0,
            0.2,
            Point2::new(0.0, -0.2),
            0.0,
        )),
        0,
    );
    let proxy_b = DistanceProxy::from_shape(&Shape::from(PolygonShape::new_box(2.0, 0.1)), 0);

    c.bench_function("gjk_distance_thin_boxes", |b| {
        b.iter(|| {
            let input = DistanceInput {
                proxy_a,
                proxy_b,
                transform_a: Pose::identity(),
                transform_b: Pose::from_position_angle(
                    Point2::new(12.017_401, 0.136_785_08),
                    -0.010_926_5,
                ),
                use_radii: false,
            };
            let mut cache = SimplexCache::default();
            distance(&mut cache, &input).distance
        });
    });
}

criterion_group!(benches, bench_tree_churn, bench_tree_query, bench_gjk_distance);
criterion_main!(benches);
