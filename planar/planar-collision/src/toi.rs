//! Time of impact between two swept convex shapes.
//!
//! Conservative advancement: repeatedly compute the distance between the
//! shapes at the current time, build a separating axis from the GJK
//! witness simplex, and root-find the earliest time at which the deepest
//! point along that axis reaches the contact target. The outer loop
//! advances until the shapes touch, separate, or the iteration caps hit.
//!
//! The contact target sits just inside the summed shape radii so the
//! narrow phase still sees a slight overlap at the reported time and can
//! build a manifold.

use nalgebra::{Point2, Vector2};
use planar_types::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS};
use planar_types::{cross_vs, Sweep};
use tracing::warn;

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};

/// Input for a time-of-impact query.
#[derive(Debug, Clone)]
pub struct ToiInput {
    /// Proxy for the first shape.
    pub proxy_a: DistanceProxy,
    /// Proxy for the second shape.
    pub proxy_b: DistanceProxy,
    /// Sweep of the first body over the step.
    pub sweep_a: Sweep,
    /// Sweep of the second body over the step.
    pub sweep_b: Sweep,
    /// Largest time fraction to consider, in `[0, 1]`.
    pub t_max: f64,
}

/// Terminal state of a time-of-impact query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    /// Query did not run (initial value).
    Unknown,
    /// The root finder stalled; `t` is the best known safe time.
    Failed,
    /// The shapes already overlap at the start of the interval.
    Overlapped,
    /// The shapes reach the contact target at `t`.
    Touching,
    /// The shapes stay separated through `t_max`.
    Separated,
}

/// Result of a time-of-impact query.
#[derive(Debug, Clone, Copy)]
pub struct ToiOutput {
    /// How the query terminated.
    pub state: ToiState,
    /// The time of impact (meaning depends on `state`).
    pub t: f64,
    /// Outer-loop iterations used.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    /// Vertex-vertex: axis connects two witness points.
    Points,
    /// Vertex of B against a face of A.
    FaceA,
    /// Vertex of A against a face of B.
    FaceB,
}

/// A swept separating axis extracted from a GJK witness simplex.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Point2<f64>,
    axis: Vector2<f64>,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.pose_at(t1);
        let xf_b = sweep_b.pose_at(t1);

        if cache.count == 1 {
            // Vertex-vertex.
            let local_point_a = proxy_a.vertex(cache.index_a[0] as usize);
            let local_point_b = proxy_b.vertex(cache.index_b[0] as usize);
            let point_a = xf_a.transform_point(&local_point_a);
            let point_b = xf_b.transform_point(&local_point_b);
            let axis = (point_b - point_a).normalize();
            return Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::Points,
                local_point: Point2::origin(),
                axis,
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two witness points on B: vertex of A against B's face.
            let local_point_b1 = proxy_b.vertex(cache.index_b[0] as usize);
            let local_point_b2 = proxy_b.vertex(cache.index_b[1] as usize);

            let mut axis = cross_vs(local_point_b2 - local_point_b1, 1.0).normalize();
            let normal = xf_b.transform_vector(&axis);

            let local_point = nalgebra::center(&local_point_b1, &local_point_b2);
            let point_b = xf_b.transform_point(&local_point);

            let local_point_a = proxy_a.vertex(cache.index_a[0] as usize);
            let point_a = xf_a.transform_point(&local_point_a);

            let s = (point_a - point_b).dot(&normal);
            if s < 0.0 {
                axis = -axis;
            }
            return Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::FaceB,
                local_point,
                axis,
            };
        }

        // Two witness points on A: vertex of B against A's face.
        let local_point_a1 = proxy_a.vertex(cache.index_a[0] as usize);
        let local_point_a2 = proxy_a.vertex(cache.index_a[1] as usize);

        let mut axis = cross_vs(local_point_a2 - local_point_a1, 1.0).normalize();
        let normal = xf_a.transform_vector(&axis);

        let local_point = nalgebra::center(&local_point_a1, &local_point_a2);
        let point_a = xf_a.transform_point(&local_point);

        let local_point_b = proxy_b.vertex(cache.index_b[0] as usize);
        let point_b = xf_b.transform_point(&local_point_b);

        let s = (point_b - point_a).dot(&normal);
        if s < 0.0 {
            axis = -axis;
        }
        Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::FaceA,
            local_point,
            axis,
        }
    }

    /// Minimum separation over all vertex pairs at time `t`, with the
    /// achieving support indices.
    fn find_min_separation(&self, t: f64) -> (f64, usize, usize) {
        let xf_a = self.sweep_a.pose_at(t);
        let xf_b = self.sweep_b.pose_at(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.inverse_transform_vector(&self.axis);
                let axis_b = xf_b.inverse_transform_vector(&-self.axis);

                let index_a = self.proxy_a.support(&axis_a);
                let index_b = self.proxy_b.support(&axis_b);

                let point_a = xf_a.transform_point(&self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(&self.proxy_b.vertex(index_b));

                ((point_b - point_a).dot(&self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.transform_vector(&self.axis);
                let point_a = xf_a.transform_point(&self.local_point);

                let axis_b = xf_b.inverse_transform_vector(&-normal);
                let index_b = self.proxy_b.support(&axis_b);
                let point_b = xf_b.transform_point(&self.proxy_b.vertex(index_b));

                ((point_b - point_a).dot(&normal), usize::MAX, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.transform_vector(&self.axis);
                let point_b = xf_b.transform_point(&self.local_point);

                let axis_a = xf_a.inverse_transform_vector(&-normal);
                let index_a = self.proxy_a.support(&axis_a);
                let point_a = xf_a.transform_point(&self.proxy_a.vertex(index_a));

                ((point_a - point_b).dot(&normal), index_a, usize::MAX)
            }
        }
    }

    /// Separation of a fixed vertex pair at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let xf_a = self.sweep_a.pose_at(t);
        let xf_b = self.sweep_b.pose_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.transform_point(&self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(&self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(&self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.transform_vector(&self.axis);
                let point_a = xf_a.transform_point(&self.local_point);
                let point_b = xf_b.transform_point(&self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(&normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.transform_vector(&self.axis);
                let point_b = xf_b.transform_point(&self.local_point);
                let point_a = xf_a.transform_point(&self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(&normal)
            }
        }
    }
}

/// Compute the first time in `[0, t_max]` at which two swept shapes reach
/// the contact target.
///
/// Numeric degeneracies never panic: a stalled root finder reports
/// [`ToiState::Failed`] with the best known safe time, which the caller
/// treats as a touching event.
#[must_use]
#[allow(clippy::too_many_lines)] // one loop, ported as a unit
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
        iterations: 0,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations make the root finder hunt; keep angles small.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius() + proxy_b.radius();
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.pose_at(t1);
        let xf_b = sweep_b.pose_at(t1);

        // Distance at the current time; the cache warm-starts each call.
        let dist_input = DistanceInput {
            proxy_a: *proxy_a,
            proxy_b: *proxy_b,
            transform_a: xf_a,
            transform_b: xf_b,
            use_radii: false,
        };
        let dist_output = distance(&mut cache, &dist_input);

        if dist_output.distance <= 0.0 {
            // Failure: initial overlap.
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if dist_output.distance < target + tolerance {
            // Victory: touching within tolerance.
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point by computing the TOI on the separating
        // axis. Non-linear sweeps may invalidate the axis; the push-back
        // loop bounds how often it is rebuilt.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_count = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                // Victory: separated through the whole interval.
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                // Advance the sweeps and re-run the outer loop.
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                // The interval start is already past the target: the
                // tolerance was likely too small for this geometry.
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                // Touching exactly at t1.
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // Root-find s(t) = target on [t1, t2], alternating secant and
            // bisection steps.
            let mut root_iterations = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iterations & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iterations += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iterations == 50 {
                    break;
                }
            }

            push_back_count += 1;
            if push_back_count == MAX_POLYGON_VERTICES {
                break;
            }
        }

        output.iterations += 1;

        if done {
            break;
        }

        if output.iterations == MAX_TOI_ITERATIONS {
            // Root finder got stuck; use the last safe time.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    if output.state == ToiState::Failed {
        warn!(
            t = output.t,
            iterations = output.iterations,
            "time-of-impact root finder stalled; reporting best safe time"
        );
    }

    output
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names,
    clippy::unreadable_literal
)]
mod tests {
    use super::*;
    use planar_types::{CircleShape, PolygonShape, Shape};

    fn circle_proxy(radius: f64) -> DistanceProxy {
        DistanceProxy::from_shape(&Shape::from(CircleShape::with_radius(radius)), 0)
    }

    fn static_sweep(x: f64, y: f64) -> Sweep {
        Sweep {
            local_center: Vector2::zeros(),
            c0: Vector2::new(x, y),
            c: Vector2::new(x, y),
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    fn moving_sweep(from: Vector2<f64>, to: Vector2<f64>) -> Sweep {
        Sweep {
            local_center: Vector2::zeros(),
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_head_on_circles_touch() {
        let input = ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0, 0.0),
            sweep_b: moving_sweep(Vector2::new(10.0, 0.0), Vector2::new(0.0, 0.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Touching);
        // Surfaces meet when centers are 2 apart: t slightly before 0.8.
        assert!((output.t - 0.8).abs() < 0.01, "t = {}", output.t);
    }

    #[test]
    fn test_initial_overlap() {
        let input = ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0, 0.0),
            sweep_b: moving_sweep(Vector2::new(0.5, 0.0), Vector2::new(5.0, 0.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Overlapped);
        assert_eq!(output.t, 0.0);
    }

    #[test]
    fn test_separated_through_interval() {
        let input = ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0, 0.0),
            sweep_b: moving_sweep(Vector2::new(10.0, 5.0), Vector2::new(0.0, 5.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.t, 1.0);
    }

    #[test]
    fn test_miss_passing_by() {
        // Fast lateral pass above the target: no impact.
        let input = ToiInput {
            proxy_a: circle_proxy(0.25),
            proxy_b: circle_proxy(0.25),
            sweep_a: static_sweep(0.0, 0.0),
            sweep_b: moving_sweep(Vector2::new(-10.0, 1.0), Vector2::new(10.0, 1.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Separated);
    }

    #[test]
    fn test_rotating_rectangles_known_sweep() {
        // A long thin platform and a small box with measured sweeps; the
        // query must terminate cleanly within its iteration caps.
        let proxy_a =
            DistanceProxy::from_shape(&Shape::from(PolygonShape::new_box(25.0, 5.0)), 0);
        let proxy_b =
            DistanceProxy::from_shape(&Shape::from(PolygonShape::new_box(2.5, 2.5)), 0);

        let sweep_a = Sweep {
            local_center: Vector2::zeros(),
            c0: Vector2::new(24.0, -60.0),
            c: Vector2::new(24.0, -60.0),
            a0: 2.95,
            a: 2.95,
            alpha0: 0.0,
        };
        let sweep_b = Sweep {
            local_center: Vector2::zeros(),
            c0: Vector2::new(53.474274, -50.252514),
            c: Vector2::new(54.595478, -51.083473),
            a0: 513.36676,
            a: 513.62781,
            alpha0: 0.0,
        };

        let input = ToiInput {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            t_max: 1.0,
        };
        let output = time_of_impact(&input);

        assert!(
            matches!(output.state, ToiState::Touching | ToiState::Separated),
            "state = {:?}",
            output.state
        );
        assert!((0.0..=1.0).contains(&output.t));
        assert!(output.iterations < MAX_TOI_ITERATIONS);
    }

    #[test]
    fn test_touching_time_leaves_slight_overlap() {
        // The contact target sits three slops inside the summed radii, so
        // at the reported time the surfaces overlap slightly; the narrow
        // phase needs that skin to produce a manifold.
        let input = ToiInput {
            proxy_a: circle_proxy(0.5),
            proxy_b: circle_proxy(0.5),
            sweep_a: static_sweep(0.0, 0.0),
            sweep_b: moving_sweep(Vector2::new(3.0, 0.0), Vector2::new(0.0, 0.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Touching);

        let xf_b = input.sweep_b.pose_at(output.t);
        let gap = xf_b.position.x.abs() - 1.0;
        assert!(gap > -4.0 * LINEAR_SLOP, "overlap {gap} too deep");
        assert!(gap < 0.0, "gap {gap}: surfaces should overlap slightly");
    }
}
