//! Tunable constants shared by the collision and dynamics crates.
//!
//! These are the knobs that shape solver tolerances and broad-phase
//! behavior. They are compile-time constants: the engine assumes they are
//! stable across steps, and several derived quantities (contact targets,
//! polygon skin) are computed from them in multiple crates.
//!
//! All lengths are in meters, angles in radians, times in seconds.

use std::f64::consts::PI;

/// Allowed positional constraint violation. Penetration below this is
/// left alone so contacts don't jitter against the position solver.
pub const LINEAR_SLOP: f64 = 0.005;

/// Allowed angular constraint violation (about 2 degrees).
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// Skin thickness around polygons. Keeps polygon-polygon manifolds stable
/// when faces slide across each other.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Broad-phase AABB fattening. Proxies only reinsert after moving out of
/// this margin, which keeps tree churn low for jittering bodies.
pub const AABB_EXTENSION: f64 = 0.1;

/// Displacement lookahead multiplier for moving proxies.
pub const AABB_MULTIPLIER: f64 = 4.0;

/// Maximum vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Maximum contact points in a manifold.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Iteration cap for the GJK distance loop.
pub const MAX_GJK_ITERATIONS: usize = 20;

/// Iteration cap for the outer time-of-impact loop.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Maximum contacts gathered into a single TOI sub-island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Maximum continuous-collision sub-steps for one body in one step.
pub const MAX_SUB_STEPS: usize = 8;

/// Position correction factor for the discrete solver. Using 1 would try
/// to remove all overlap in one iteration, which overshoots.
pub const BAUMGARTE: f64 = 0.2;

/// Position correction factor for the TOI solver.
pub const TOI_BAUMGARTE: f64 = 0.75;

/// Maximum position correction applied per solver iteration.
pub const MAX_LINEAR_CORRECTION: f64 = 0.2;

/// Maximum angular position correction applied per solver iteration.
pub const MAX_ANGULAR_CORRECTION: f64 = 8.0 / 180.0 * PI;

/// Relative normal velocity below which restitution is suppressed.
pub const VELOCITY_THRESHOLD: f64 = 1.0;

/// Maximum translation of a body per step. Limits numeric blowup.
pub const MAX_TRANSLATION: f64 = 2.0;

/// Squared form of [`MAX_TRANSLATION`].
pub const MAX_TRANSLATION_SQUARED: f64 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step.
pub const MAX_ROTATION: f64 = 0.5 * PI;

/// Squared form of [`MAX_ROTATION`].
pub const MAX_ROTATION_SQUARED: f64 = MAX_ROTATION * MAX_ROTATION;

/// Linear speed below which a body accumulates sleep time.
pub const LINEAR_SLEEP_TOLERANCE: f64 = 0.01;

/// Angular speed below which a body accumulates sleep time.
pub const ANGULAR_SLEEP_TOLERANCE: f64 = 2.0 / 180.0 * PI;

/// Time a body must stay below the sleep tolerances before sleeping.
pub const TIME_TO_SLEEP: f64 = 0.5;

/// Convert a (frequency, damping ratio) pair into the (stiffness, damping)
/// values soft joints consume.
///
/// The conversion is `ω = 2πf`, `k = mω²`, `d = 2mζω`, with `m` the
/// reduced mass of the two bodies. Joints take stiffness and damping
/// directly; this is the convenience surface for callers who think in
/// Hertz.
#[must_use]
pub fn linear_stiffness(
    frequency_hertz: f64,
    damping_ratio: f64,
    mass_a: f64,
    mass_b: f64,
) -> (f64, f64) {
    let mass = reduced_mass(mass_a, mass_b);
    let omega = 2.0 * PI * frequency_hertz;
    (mass * omega * omega, 2.0 * mass * damping_ratio * omega)
}

/// Angular analogue of [`linear_stiffness`], taking rotational inertias.
#[must_use]
pub fn angular_stiffness(
    frequency_hertz: f64,
    damping_ratio: f64,
    inertia_a: f64,
    inertia_b: f64,
) -> (f64, f64) {
    let inertia = reduced_mass(inertia_a, inertia_b);
    let omega = 2.0 * PI * frequency_hertz;
    (
        inertia * omega * omega,
        2.0 * inertia * damping_ratio * omega,
    )
}

fn reduced_mass(a: f64, b: f64) -> f64 {
    if a > 0.0 && b > 0.0 {
        a * b / (a + b)
    } else if a > 0.0 {
        a
    } else {
        b
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_derived_constants() {
        assert_relative_eq!(POLYGON_RADIUS, 2.0 * LINEAR_SLOP);
        assert!(MAX_LINEAR_CORRECTION > LINEAR_SLOP);
        assert!(TOI_BAUMGARTE > BAUMGARTE);
    }

    #[test]
    fn test_linear_stiffness_single_body() {
        // One static body (mass 0): reduced mass is the dynamic body's mass.
        let (k, d) = linear_stiffness(1.0, 0.0, 2.0, 0.0);
        let omega = 2.0 * PI;
        assert_relative_eq!(k, 2.0 * omega * omega, epsilon = 1e-12);
        assert_relative_eq!(d, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stiffness_uses_reduced_mass() {
        // Equal masses: reduced mass is half of either.
        let (k_pair, _) = linear_stiffness(2.0, 0.5, 4.0, 4.0);
        let (k_single, _) = linear_stiffness(2.0, 0.5, 2.0, 0.0);
        assert_relative_eq!(k_pair, k_single, epsilon = 1e-12);
    }

    #[test]
    fn test_angular_stiffness_damping() {
        let (_, d) = angular_stiffness(0.5, 1.0, 3.0, 0.0);
        let omega = PI;
        assert_relative_eq!(d, 2.0 * 3.0 * omega, epsilon = 1e-12);
    }
}
