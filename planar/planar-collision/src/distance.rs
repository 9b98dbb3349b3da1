//! GJK closest-point queries and shape casting.
//!
//! The distance query works on the configuration space obstacle (CSO,
//! the Minkowski difference of two convex shapes): the origin's distance
//! to the CSO equals the distance between the shapes. GJK iteratively
//! builds a simplex of at most three support points whose closest feature
//! to the origin shrinks every iteration.
//!
//! A [`SimplexCache`] survives between calls, warm-starting repeated
//! queries on the same pair; the time-of-impact solver relies on this.
//!
//! # Example
//!
//! ```
//! use planar_collision::{distance, DistanceInput, DistanceProxy, SimplexCache};
//! use planar_types::{CircleShape, Pose, Shape};
//! use nalgebra::Point2;
//!
//! let a = Shape::from(CircleShape::with_radius(1.0));
//! let b = Shape::from(CircleShape::with_radius(1.0));
//!
//! let input = DistanceInput {
//!     proxy_a: DistanceProxy::from_shape(&a, 0),
//!     proxy_b: DistanceProxy::from_shape(&b, 0),
//!     transform_a: Pose::identity(),
//!     transform_b: Pose::from_position(Point2::new(5.0, 0.0)),
//!     use_radii: true,
//! };
//!
//! let mut cache = SimplexCache::default();
//! let output = distance(&mut cache, &input);
//! assert!((output.distance - 3.0).abs() < 1e-9);
//! ```

use nalgebra::{Point2, Vector2};
use planar_types::settings::{LINEAR_SLOP, MAX_GJK_ITERATIONS, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use planar_types::{cross, cross_sv, cross_vs, Pose, Shape};

/// A convex point cloud plus radius, the view of a shape child the GJK
/// kernels consume. Fixed capacity: no allocation on the hot path.
#[derive(Debug, Clone, Copy)]
pub struct DistanceProxy {
    vertices: [Point2<f64>; MAX_POLYGON_VERTICES],
    count: usize,
    radius: f64,
}

impl Default for DistanceProxy {
    fn default() -> Self {
        Self {
            vertices: [Point2::origin(); MAX_POLYGON_VERTICES],
            count: 0,
            radius: 0.0,
        }
    }
}

impl DistanceProxy {
    /// Build a proxy from raw vertices and a radius.
    #[must_use]
    pub fn new(points: &[Point2<f64>], radius: f64) -> Self {
        debug_assert!((1..=MAX_POLYGON_VERTICES).contains(&points.len()));
        let mut vertices = [Point2::origin(); MAX_POLYGON_VERTICES];
        vertices[..points.len()].copy_from_slice(points);
        Self {
            vertices,
            count: points.len(),
            radius,
        }
    }

    /// Build a proxy from one child of a shape.
    #[must_use]
    pub fn from_shape(shape: &Shape, child_index: usize) -> Self {
        match shape {
            Shape::Circle(c) => Self::new(&[c.position], c.radius),
            Shape::Edge(e) => Self::new(&[e.v1, e.v2], POLYGON_RADIUS),
            Shape::Polygon(p) => Self::new(p.vertices(), p.radius()),
            Shape::Chain(c) => {
                let edge = c.child_edge(child_index);
                Self::new(&[edge.v1, edge.v2], POLYGON_RADIUS)
            }
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Radius around the point cloud.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// A vertex by index.
    #[must_use]
    pub fn vertex(&self, index: usize) -> Point2<f64> {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    /// Index of the support vertex: the one farthest along `d`.
    #[must_use]
    pub fn support(&self, d: &Vector2<f64>) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].coords.dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].coords.dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

/// Witness cache carried between distance calls on the same shape pair.
///
/// Stores the support indices of the previous result plus a size metric;
/// [`distance`] flushes the cache when the metric says the cached simplex
/// has become badly scaled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f64,
    /// Number of cached support pairs (0 = empty cache).
    pub count: usize,
    /// Support indices on proxy A.
    pub index_a: [u8; 3],
    /// Support indices on proxy B.
    pub index_b: [u8; 3],
}

/// Input for a distance query.
#[derive(Debug, Clone)]
pub struct DistanceInput {
    /// Proxy for the first shape.
    pub proxy_a: DistanceProxy,
    /// Proxy for the second shape.
    pub proxy_b: DistanceProxy,
    /// World pose of the first shape.
    pub transform_a: Pose,
    /// World pose of the second shape.
    pub transform_b: Pose,
    /// Whether to account for the proxies' radii in the result.
    pub use_radii: bool,
}

/// Output of a distance query.
#[derive(Debug, Clone, Copy)]
pub struct DistanceOutput {
    /// Closest point on shape A in world coordinates.
    pub point_a: Point2<f64>,
    /// Closest point on shape B in world coordinates.
    pub point_b: Point2<f64>,
    /// Distance between the closest points.
    pub distance: f64,
    /// Iterations used by the GJK loop.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point on proxy A in world coordinates.
    wa: Point2<f64>,
    /// Support point on proxy B in world coordinates.
    wb: Point2<f64>,
    /// CSO point: `wb - wa`.
    w: Vector2<f64>,
    /// Barycentric coordinate for the closest feature.
    a: f64,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        &mut self,
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        transform_a: &Pose,
        proxy_b: &DistanceProxy,
        transform_b: &Pose,
    ) {
        debug_assert!(cache.count <= 3);

        self.count = cache.count;
        for i in 0..self.count {
            let v = &mut self.v[i];
            v.index_a = cache.index_a[i] as usize;
            v.index_b = cache.index_b[i] as usize;
            let local_a = proxy_a.vertex(v.index_a);
            let local_b = proxy_b.vertex(v.index_b);
            v.wa = transform_a.transform_point(&local_a);
            v.wb = transform_b.transform_point(&local_b);
            v.w = v.wb - v.wa;
            v.a = 0.0;
        }

        // Flush the cache if the simplex shape has drifted too far.
        if self.count > 1 {
            let metric1 = cache.metric;
            let metric2 = self.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f64::EPSILON {
                self.count = 0;
            }
        }

        if self.count == 0 {
            let v = &mut self.v[0];
            v.index_a = 0;
            v.index_b = 0;
            let local_a = proxy_a.vertex(0);
            let local_b = proxy_b.vertex(0);
            v.wa = transform_a.transform_point(&local_a);
            v.wb = transform_b.transform_point(&local_b);
            v.w = v.wb - v.wa;
            v.a = 1.0;
            self.count = 1;
        }
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            1 => 0.0,
            2 => (self.v[1].w - self.v[0].w).norm(),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => {
                debug_assert!(false);
                0.0
            }
        }
    }

    fn search_direction(&self) -> Vector2<f64> {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    // Origin is right of e12.
                    cross_vs(e12, 1.0)
                }
            }
            _ => {
                debug_assert!(false);
                Vector2::zeros()
            }
        }
    }

    fn closest_point(&self) -> Vector2<f64> {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            3 => Vector2::zeros(),
            _ => {
                debug_assert!(false);
                Vector2::zeros()
            }
        }
    }

    fn witness_points(&self) -> (Point2<f64>, Point2<f64>) {
        match self.count {
            1 => (self.v[0].wa, self.v[0].wb),
            2 => (
                Point2::from(self.v[0].a * self.v[0].wa.coords + self.v[1].a * self.v[1].wa.coords),
                Point2::from(self.v[0].a * self.v[0].wb.coords + self.v[1].a * self.v[1].wb.coords),
            ),
            3 => {
                let p = self.v[0].a * self.v[0].wa.coords
                    + self.v[1].a * self.v[1].wa.coords
                    + self.v[2].a * self.v[2].wa.coords;
                (Point2::from(p), Point2::from(p))
            }
            _ => {
                debug_assert!(false);
                (Point2::origin(), Point2::origin())
            }
        }
    }

    /// Solve the line-segment simplex: pick the Voronoi region of the
    /// origin and reduce to the closest feature.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // Origin in the w1 vertex region?
        let d12_2 = -w1.dot(&e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // Origin in the w2 vertex region?
        let d12_1 = w2.dot(&e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.v[0] = self.v[1];
            self.count = 1;
            return;
        }

        // Origin in the edge region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Solve the triangle simplex over the seven Voronoi regions.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(&e12);
        let d12_2 = -w1.dot(&e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(&e13);
        let d13_2 = -w1.dot(&e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(&e23);
        let d23_2 = -w2.dot(&e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 vertex region.
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12 edge region.
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv_d12;
            self.v[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13 edge region.
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv_d13;
            self.v[2].a = d13_2 * inv_d13;
            self.v[1] = self.v[2];
            self.count = 2;
            return;
        }

        // w2 vertex region.
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.v[0] = self.v[1];
            self.count = 1;
            return;
        }

        // w3 vertex region.
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.v[0] = self.v[2];
            self.count = 1;
            return;
        }

        // e23 edge region.
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv_d23;
            self.v[2].a = d23_2 * inv_d23;
            self.v[0] = self.v[2];
            self.count = 2;
            return;
        }

        // Interior: the origin is inside the triangle.
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv_d123;
        self.v[1].a = d123_2 * inv_d123;
        self.v[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

/// Compute the closest points between two convex shapes.
///
/// On return `cache` holds the final simplex for warm-starting the next
/// call on the same pair. With `use_radii` the witness points are pushed
/// to the shape surfaces (or collapsed to the midpoint on overlap).
#[must_use]
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let transform_a = input.transform_a;
    let transform_b = input.transform_b;

    let mut simplex = Simplex::default();
    simplex.read_cache(cache, proxy_a, &transform_a, proxy_b, &transform_b);

    // Support indices from prior iterations, used to detect cycling.
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iterations = 0;
    while iterations < MAX_GJK_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            1 => {}
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => debug_assert!(false),
        }

        // Origin inside the CSO: the shapes overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.norm_squared() < f64::EPSILON * f64::EPSILON {
            // The origin sits on a simplex feature. Termination here keeps
            // the best witness points rather than risking a division blowup.
            break;
        }

        // New support point in the search direction.
        let vertex = &mut simplex.v[simplex.count];
        vertex.index_a = proxy_a.support(&transform_a.inverse_transform_vector(&-d));
        vertex.wa = transform_a.transform_point(&proxy_a.vertex(vertex.index_a));
        vertex.index_b = proxy_b.support(&transform_b.inverse_transform_vector(&d));
        vertex.wb = transform_b.transform_point(&proxy_b.vertex(vertex.index_b));
        vertex.w = vertex.wb - vertex.wa;

        iterations += 1;

        // A repeated support pair means no further progress is possible.
        let duplicate = (0..save_count).any(|i| {
            simplex.v[simplex.count].index_a == save_a[i]
                && simplex.v[simplex.count].index_b == save_b[i]
        });
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_a - point_b).norm();
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;

        if dist > r_a + r_b && dist > f64::EPSILON {
            // Shapes still separate: move the witness points to the
            // surfaces along the connecting axis.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        } else {
            // Overlapped by the radii: collapse to a midpoint.
            let p = nalgebra::center(&point_a, &point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

/// Input for a shape cast: translate shape B by `translation_b` and find
/// the first time of contact with shape A.
#[derive(Debug, Clone)]
pub struct ShapeCastInput {
    /// Proxy for the stationary shape.
    pub proxy_a: DistanceProxy,
    /// Proxy for the moving shape.
    pub proxy_b: DistanceProxy,
    /// World pose of shape A.
    pub transform_a: Pose,
    /// World pose of shape B at the start of the cast.
    pub transform_b: Pose,
    /// Translation applied to shape B over the cast.
    pub translation_b: Vector2<f64>,
}

/// Result of a successful shape cast.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCastOutput {
    /// Contact point at the time of impact.
    pub point: Point2<f64>,
    /// Contact normal at the time of impact.
    pub normal: Vector2<f64>,
    /// Fraction of the translation at which contact occurs.
    pub lambda: f64,
    /// Iterations used.
    pub iterations: usize,
}

/// Cast shape B against shape A along a translation.
///
/// Conservative advancement on the CSO: each iteration supports in the
/// current closest direction and advances the cast fraction past the
/// separating plane. Returns `None` for a miss, for `λ > 1`, and for
/// initial overlap.
#[must_use]
pub fn shape_cast(input: &ShapeCastInput) -> Option<ShapeCastOutput> {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let radius_a = proxy_a.radius.max(POLYGON_RADIUS);
    let radius_b = proxy_b.radius.max(POLYGON_RADIUS);
    let radius = radius_a + radius_b;

    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let r = input.translation_b;
    let mut n = Vector2::zeros();
    let mut lambda = 0.0;

    let mut simplex = Simplex::default();

    let mut index_a = proxy_a.support(&xf_a.inverse_transform_vector(&-r));
    let mut w_a = xf_a.transform_point(&proxy_a.vertex(index_a));
    let mut index_b = proxy_b.support(&xf_b.inverse_transform_vector(&r));
    let mut w_b = xf_b.transform_point(&proxy_b.vertex(index_b));
    let mut v = w_a - w_b;

    // Target surface distance, kept slightly inside the summed radii so
    // the result leaves a skin for the manifold.
    let sigma = POLYGON_RADIUS.max(radius - POLYGON_RADIUS);
    let tolerance = 0.5 * LINEAR_SLOP;

    let mut iterations = 0;
    while iterations < MAX_GJK_ITERATIONS && v.norm() - sigma > tolerance {
        debug_assert!(simplex.count < 3);

        iterations += 1;

        // Support on the CSO in direction -v.
        index_a = proxy_a.support(&xf_a.inverse_transform_vector(&-v));
        w_a = xf_a.transform_point(&proxy_a.vertex(index_a));
        index_b = proxy_b.support(&xf_b.inverse_transform_vector(&v));
        w_b = xf_b.transform_point(&proxy_b.vertex(index_b));
        let p = w_a - w_b;

        let v_unit = v.normalize();

        // Advance the cast fraction past the separating plane.
        let vp = v_unit.dot(&p);
        let vr = v_unit.dot(&r);
        if vp - sigma > lambda * vr {
            if vr <= 0.0 {
                return None;
            }
            lambda = (vp - sigma) / vr;
            if lambda > 1.0 {
                return None;
            }
            n = -v_unit;
            simplex.count = 0;
        }

        // The simplex works on B - A with B shifted by the current
        // fraction; the support point stays unshifted so the plane
        // equation above is formed in unshifted space.
        let vertex = &mut simplex.v[simplex.count];
        vertex.index_a = index_b;
        vertex.wa = w_b + lambda * r;
        vertex.index_b = index_a;
        vertex.wb = w_a;
        vertex.w = vertex.wb - vertex.wa;
        vertex.a = 1.0;
        simplex.count += 1;

        match simplex.count {
            1 => {}
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => debug_assert!(false),
        }

        // Origin inside the shifted CSO: the shapes overlap at this
        // fraction, which means the cast started overlapped.
        if simplex.count == 3 {
            return None;
        }

        v = simplex.closest_point();
    }

    if iterations == 0 {
        // Initial overlap (within the skin): no sensible normal.
        return None;
    }

    let (point_b, point_a) = simplex.witness_points();

    if v.norm_squared() > 0.0 {
        n = (-v).normalize();
    }

    Some(ShapeCastOutput {
        point: point_a + radius_a * n,
        normal: n,
        lambda,
        iterations,
    })
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
    use approx::assert_relative_eq;
    use planar_types::{CircleShape, PolygonShape};

    fn circle_proxy(radius: f64) -> DistanceProxy {
        DistanceProxy::from_shape(&Shape::from(CircleShape::with_radius(radius)), 0)
    }

    fn box_proxy(hx: f64, hy: f64) -> DistanceProxy {
        DistanceProxy::from_shape(&Shape::from(PolygonShape::new_box(hx, hy)), 0)
    }

    #[test]
    fn test_circle_circle_distance() {
        let input = DistanceInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(10.0, 0.0)),
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let output = distance(&mut cache, &input);
        assert_relative_eq!(output.distance, 8.0, epsilon = 1e-9);
        assert_relative_eq!(output.point_a.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(output.point_b.x, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pose_a = Pose::from_position_angle(Point2::new(0.0, -0.2), 0.0);
        let pose_b = Pose::from_position_angle(Point2::new(3.5, 1.0), 0.4);

        let forward = DistanceInput {
            proxy_a: box_proxy(1.0, 0.5),
            proxy_b: box_proxy(0.5, 0.5),
            transform_a: pose_a,
            transform_b: pose_b,
            use_radii: false,
        };
        let backward = DistanceInput {
            proxy_a: box_proxy(0.5, 0.5),
            proxy_b: box_proxy(1.0, 0.5),
            transform_a: pose_b,
            transform_b: pose_a,
            use_radii: false,
        };

        let mut c1 = SimplexCache::default();
        let mut c2 = SimplexCache::default();
        let d1 = distance(&mut c1, &forward);
        let d2 = distance(&mut c2, &backward);
        assert_relative_eq!(d1.distance, d2.distance, epsilon = 1e-9);
    }

    #[test]
    fn test_thin_rectangles_known_pose() {
        // Two thin boxes at a measured pose; the closest feature is the
        // right edge of A against the lower-left vertex of B.
        let proxy_a = DistanceProxy::from_shape(
            &Shape::from(PolygonShape::new_oriented_box(
                10.0,
                0.2,
                Point2::new(0.0, -0.2),
                0.0,
            )),
            0,
        );
        let proxy_b = box_proxy(2.0, 0.1);

        let input = DistanceInput {
            proxy_a,
            proxy_b,
            transform_a: Pose::identity(),
            transform_b: Pose::from_position_angle(
                Point2::new(12.017401, 0.13678508),
                -0.0109265,
            ),
            use_radii: false,
        };

        let mut cache = SimplexCache::default();
        let output = distance(&mut cache, &input);

        // Analytic closest feature: B's lower-left corner to A's right edge.
        let corner = input
            .transform_b
            .transform_point(&Point2::new(-2.0, -0.1));
        let expected = ((corner.x - 10.0).powi(2)
            + if corner.y > 0.0 {
                (corner.y - 0.0).powi(2)
            } else {
                0.0
            })
        .sqrt();
        assert_relative_eq!(output.distance, expected, epsilon = 4.0 * f64::EPSILON.sqrt());
        assert!(output.iterations <= MAX_GJK_ITERATIONS);
    }

    #[test]
    fn test_overlap_collapses_witnesses() {
        let input = DistanceInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(0.5, 0.0)),
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let output = distance(&mut cache, &input);
        assert_eq!(output.distance, 0.0);
        assert_relative_eq!(
            output.point_a.coords,
            output.point_b.coords,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_warm_cache_reuse() {
        let mut cache = SimplexCache::default();
        let mut input = DistanceInput {
            proxy_a: box_proxy(1.0, 1.0),
            proxy_b: box_proxy(1.0, 1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(5.0, 0.3)),
            use_radii: false,
        };

        let cold = distance(&mut cache, &input);

        // Nudge B and re-query with the warm cache.
        input.transform_b = Pose::from_position(Point2::new(5.0, 0.31));
        let warm = distance(&mut cache, &input);

        assert_relative_eq!(cold.distance, warm.distance, epsilon = 0.05);
        assert!(warm.iterations <= cold.iterations);
    }

    #[test]
    fn test_shape_cast_hits() {
        let input = ShapeCastInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(10.0, 0.0)),
            translation_b: Vector2::new(-10.0, 0.0),
        };
        let output = shape_cast(&input).expect("cast should hit");
        // Contact when centers are 2 apart: after travelling 8 of 10.
        assert_relative_eq!(output.lambda, 0.8, epsilon = 1e-2);
        assert!(output.normal.x > 0.9);
    }

    #[test]
    fn test_shape_cast_miss() {
        let input = ShapeCastInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(10.0, 5.0)),
            translation_b: Vector2::new(-10.0, 0.0),
        };
        assert!(shape_cast(&input).is_none());
    }

    #[test]
    fn test_shape_cast_zero_translation() {
        // Spec law: zero translation reports miss or lambda = 0.
        let input = ShapeCastInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            transform_a: Pose::identity(),
            transform_b: Pose::from_position(Point2::new(10.0, 0.0)),
            translation_b: Vector2::zeros(),
        };
        match shape_cast(&input) {
            None => {}
            Some(output) => assert_eq!(output.lambda, 0.0),
        }
    }
}
