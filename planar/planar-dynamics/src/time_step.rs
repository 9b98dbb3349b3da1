//! Per-step solver parameters and the position/velocity staging arrays.

use planar_types::Vector2;

/// Parameters for one solver pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepConfig {
    /// Timestep in seconds.
    pub dt: f64,
    /// Inverse timestep (0 when dt is 0).
    pub inv_dt: f64,
    /// `dt / previous dt`, used to scale warm-start impulses when the
    /// timestep changes between steps.
    pub dt_ratio: f64,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

/// Island-local position state: center of mass and angle.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Position {
    pub c: Vector2<f64>,
    pub a: f64,
}

/// Island-local velocity state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Velocity {
    pub v: Vector2<f64>,
    pub w: f64,
}

/// What joints see while solving: the step parameters plus the island's
/// staged position and velocity arrays, indexed by body island index.
pub(crate) struct SolverData<'a> {
    pub step: StepConfig,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}
