//! Box-constrained particle swarm minimizer.
//!
//! A small, dependency-light global-best PSO used as the black-box optimizer
//! behind patch refinement, usable for any bounded real-valued problem.
//!
//! ```
//! use particle_swarm::{Bounds, ParticleSwarm, SwarmParams};
//!
//! let bounds = Bounds::new(vec![-2.0, -2.0], vec![2.0, 2.0]).unwrap();
//! let objective = |x: &[f64]| (x[0] - 0.5).powi(2) + (x[1] + 1.0).powi(2);
//! let params = SwarmParams { seed: Some(1), ..SwarmParams::default() };
//!
//! let mut swarm = ParticleSwarm::new(bounds, objective, params).unwrap();
//! swarm.seed(&[0.0, 0.0]).unwrap();
//! let result = swarm.run(false);
//! assert!(result.score < 1e-3);
//! ```

mod bounds;
mod swarm;

pub use bounds::Bounds;
pub use swarm::{ParticleSwarm, SwarmParams, SwarmResult};

/// Optimizer configuration errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SwarmError {
    #[error("dimension mismatch (expected {expected}, got {got})")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("bounds must have at least one dimension")]
    EmptyBounds,
    #[error("invalid bounds on axis {axis}: [{lower}, {upper}]")]
    InvalidBounds { axis: usize, lower: f64, upper: f64 },
    #[error("invalid swarm parameters: {0}")]
    InvalidParams(&'static str),
}
