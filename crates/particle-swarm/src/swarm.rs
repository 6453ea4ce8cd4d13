use crate::{Bounds, SwarmError};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Swarm budget and update coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmParams {
    /// Maximum number of swarm updates after the initial evaluation.
    pub max_iterations: usize,
    /// Number of particles (raised automatically to fit all seeds plus the midpoint).
    pub population: usize,
    /// Velocity inertia weight.
    pub inertia: f64,
    /// Attraction towards each particle's own best.
    pub cognitive: f64,
    /// Attraction towards the swarm best.
    pub social: f64,
    /// Velocity limit per axis as a fraction of the box width.
    pub max_velocity_frac: f64,
    /// Stop after this many iterations without improving the best score by `tolerance`.
    pub stall_iterations: Option<usize>,
    pub tolerance: f64,
    /// RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SwarmParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            population: 20,
            // Constriction-equivalent coefficients (Clerc & Kennedy).
            inertia: 0.7298,
            cognitive: 1.4962,
            social: 1.4962,
            max_velocity_frac: 0.2,
            stall_iterations: Some(20),
            tolerance: 1e-9,
            seed: None,
        }
    }
}

impl SwarmParams {
    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.population == 0 {
            return Err(SwarmError::InvalidParams("population must be positive"));
        }
        let coeffs = [
            self.inertia,
            self.cognitive,
            self.social,
            self.max_velocity_frac,
            self.tolerance,
        ];
        if coeffs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(SwarmError::InvalidParams(
                "coefficients must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Outcome of [`ParticleSwarm::run`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwarmResult {
    pub best: Vec<f64>,
    pub score: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

#[derive(Clone, Debug)]
struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_score: f64,
}

/// Global-best particle swarm minimizer over a [`Bounds`] box.
///
/// The objective is evaluated only at points inside the box. The box
/// midpoint and every seeded candidate are evaluated before the first
/// update, so the reported best score never exceeds theirs.
pub struct ParticleSwarm<F> {
    bounds: Bounds,
    objective: F,
    params: SwarmParams,
    rng: StdRng,
    seeds: Vec<Vec<f64>>,
    best: Vec<f64>,
    best_score: f64,
    iterations: usize,
    evaluations: usize,
}

#[inline]
fn sanitize(score: f64) -> f64 {
    if score.is_nan() {
        f64::INFINITY
    } else {
        score
    }
}

impl<F> ParticleSwarm<F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(bounds: Bounds, objective: F, params: SwarmParams) -> Result<Self, SwarmError> {
        params.validate()?;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let best = bounds.midpoint();
        Ok(Self {
            bounds,
            objective,
            params,
            rng,
            seeds: Vec::new(),
            best,
            best_score: f64::INFINITY,
            iterations: 0,
            evaluations: 0,
        })
    }

    /// Add an initial candidate; it is clamped into the box.
    pub fn seed(&mut self, guess: &[f64]) -> Result<(), SwarmError> {
        if guess.len() != self.bounds.dim() {
            return Err(SwarmError::DimensionMismatch {
                expected: self.bounds.dim(),
                got: guess.len(),
            });
        }
        let mut g = guess.to_vec();
        self.bounds.clamp(&mut g);
        self.seeds.push(g);
        Ok(())
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn best_parameters(&self) -> &[f64] {
        &self.best
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn iterations_run(&self) -> usize {
        self.iterations
    }

    fn evaluate(&mut self, x: &[f64]) -> f64 {
        debug_assert!(self.bounds.contains(x));
        self.evaluations += 1;
        sanitize((self.objective)(x))
    }

    fn velocity_limits(&self) -> Vec<f64> {
        (0..self.bounds.dim())
            .map(|axis| self.bounds.width(axis) * self.params.max_velocity_frac)
            .collect()
    }

    fn initial_particles(&mut self, vmax: &[f64]) -> Vec<Particle> {
        let dim = self.bounds.dim();
        let mut starts = Vec::with_capacity(self.params.population.max(self.seeds.len() + 1));
        starts.push(self.bounds.midpoint());
        starts.extend(self.seeds.iter().cloned());
        while starts.len() < self.params.population {
            let p: Vec<f64> = (0..dim)
                .map(|axis| {
                    let lo = self.bounds.lower()[axis];
                    let hi = self.bounds.upper()[axis];
                    self.rng.gen_range(lo..=hi)
                })
                .collect();
            starts.push(p);
        }

        let mut particles = Vec::with_capacity(starts.len());
        for position in starts {
            let velocity = vmax
                .iter()
                .map(|&v| self.rng.gen_range(-v..=v))
                .collect();
            let score = self.evaluate(&position);
            particles.push(Particle {
                best_position: position.clone(),
                position,
                velocity,
                best_score: score,
            });
        }
        particles
    }

    /// Run the swarm until the iteration budget is spent or the search stalls.
    ///
    /// With `verbose`, per-iteration progress is logged at `info` level.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(dim = self.bounds.dim()))
    )]
    pub fn run(&mut self, verbose: bool) -> SwarmResult {
        let dim = self.bounds.dim();
        let vmax = self.velocity_limits();
        self.iterations = 0;
        self.evaluations = 0;

        let mut particles = self.initial_particles(&vmax);

        // Ties keep the earliest particle, so the midpoint and seeds win over random starts.
        let mut best_idx = 0;
        for (i, p) in particles.iter().enumerate() {
            if p.best_score < particles[best_idx].best_score {
                best_idx = i;
            }
        }
        let mut gbest = particles[best_idx].best_position.clone();
        let mut gbest_score = particles[best_idx].best_score;

        let mut stall = 0usize;
        for iteration in 0..self.params.max_iterations {
            let before = gbest_score;
            for particle in particles.iter_mut() {
                for axis in 0..dim {
                    let r1: f64 = self.rng.gen();
                    let r2: f64 = self.rng.gen();
                    let x = particle.position[axis];
                    let v = self.params.inertia * particle.velocity[axis]
                        + self.params.cognitive * r1 * (particle.best_position[axis] - x)
                        + self.params.social * r2 * (gbest[axis] - x);
                    particle.velocity[axis] = v.clamp(-vmax[axis], vmax[axis]);
                    particle.position[axis] = x + particle.velocity[axis];
                }
                let lower = self.bounds.lower();
                let upper = self.bounds.upper();
                for axis in 0..dim {
                    let x = particle.position[axis];
                    if x < lower[axis] || x > upper[axis] {
                        // Absorbing walls: stop at the boundary.
                        particle.position[axis] = x.clamp(lower[axis], upper[axis]);
                        particle.velocity[axis] = 0.0;
                    }
                }

                debug_assert!(self.bounds.contains(&particle.position));
                self.evaluations += 1;
                let score = sanitize((self.objective)(&particle.position));
                if score < particle.best_score {
                    particle.best_score = score;
                    particle.best_position.clone_from(&particle.position);
                    if score < gbest_score {
                        gbest_score = score;
                        gbest.clone_from(&particle.position);
                    }
                }
            }
            self.iterations = iteration + 1;

            if verbose {
                info!(
                    "pso iteration {:>4}: best {:.6} ({} evaluations)",
                    self.iterations, gbest_score, self.evaluations
                );
            }

            if before - gbest_score > self.params.tolerance {
                stall = 0;
            } else {
                stall += 1;
            }
            if self.params.stall_iterations.is_some_and(|limit| stall >= limit) {
                debug!("pso stalled after {} iterations", self.iterations);
                break;
            }
        }

        self.best = gbest;
        self.best_score = gbest_score;
        debug!(
            "pso finished: score {:.6}, {} iterations, {} evaluations",
            self.best_score, self.iterations, self.evaluations
        );

        SwarmResult {
            best: self.best.clone(),
            score: self.best_score,
            iterations: self.iterations,
            evaluations: self.evaluations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn sphere(center: [f64; 3]) -> impl Fn(&[f64]) -> f64 {
        move |x: &[f64]| {
            x.iter()
                .zip(center.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum()
        }
    }

    fn box3() -> Bounds {
        Bounds::new(vec![-5.0, -5.0, -5.0], vec![5.0, 5.0, 5.0]).expect("bounds")
    }

    fn seeded(seed: u64) -> SwarmParams {
        SwarmParams {
            seed: Some(seed),
            ..SwarmParams::default()
        }
    }

    #[test]
    fn converges_on_a_sphere() {
        let target = [1.5, -2.0, 0.25];
        let params = SwarmParams {
            max_iterations: 200,
            population: 30,
            stall_iterations: None,
            ..seeded(7)
        };
        let mut swarm = ParticleSwarm::new(box3(), sphere(target), params).expect("swarm");
        let result = swarm.run(false);
        assert!(result.score < 1e-4, "score {}", result.score);
        for (got, want) in result.best.iter().zip(target) {
            assert!((got - want).abs() < 1e-2);
        }
        assert_eq!(swarm.iterations_run(), 200);
        assert_eq!(result.evaluations, 30 * 201);
    }

    #[test]
    fn zero_iterations_returns_best_of_seed_and_midpoint() {
        let params = SwarmParams {
            max_iterations: 0,
            population: 1,
            ..seeded(3)
        };
        let mut swarm = ParticleSwarm::new(box3(), sphere([1.0, 1.0, 1.0]), params).expect("swarm");
        swarm.seed(&[1.0, 1.0, 1.2]).expect("seed");
        let result = swarm.run(false);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.evaluations, 2);
        assert_eq!(result.best, vec![1.0, 1.0, 1.2]);
        assert_relative_eq!(result.score, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn never_worse_than_seed_or_midpoint() {
        let objective = sphere([4.9, -4.9, 4.9]);
        let seed = [4.0, -4.0, 4.0];
        let seed_score = objective(&seed);
        let mid_score = objective(&[0.0, 0.0, 0.0]);
        let params = SwarmParams {
            max_iterations: 3,
            population: 4,
            ..seeded(11)
        };
        let mut swarm = ParticleSwarm::new(box3(), objective, params).expect("swarm");
        swarm.seed(&seed).expect("seed");
        let result = swarm.run(false);
        assert!(result.score <= seed_score);
        assert!(result.score <= mid_score);
    }

    #[test]
    fn every_evaluation_stays_in_the_box() {
        let outside = Cell::new(0usize);
        let bounds = Bounds::new(vec![0.0, 10.0], vec![1.0, 10.5]).expect("bounds");
        let check = bounds.clone();
        let objective = |x: &[f64]| {
            if !check.contains(x) {
                outside.set(outside.get() + 1);
            }
            -(x[0] + x[1])
        };
        let mut swarm = ParticleSwarm::new(bounds, objective, seeded(5)).expect("swarm");
        swarm.seed(&[7.0, 0.0]).expect("seed is clamped");
        let result = swarm.run(false);
        assert_eq!(outside.get(), 0);
        assert_relative_eq!(result.score, -11.5, epsilon = 1e-3);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let mut swarm =
                ParticleSwarm::new(box3(), sphere([0.3, 0.2, -0.1]), seeded(42)).expect("swarm");
            swarm.run(false)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn nan_scores_are_treated_as_infeasible() {
        let objective = |x: &[f64]| if x[0] > 0.0 { f64::NAN } else { x[0].abs() };
        let mut swarm = ParticleSwarm::new(box3(), objective, seeded(9)).expect("swarm");
        let result = swarm.run(false);
        assert!(result.score.is_finite());
        assert!(result.best[0] <= 0.0);
    }

    #[test]
    fn rejects_mismatched_seed_and_bad_params() {
        let mut swarm = ParticleSwarm::new(box3(), sphere([0.0; 3]), seeded(1)).expect("swarm");
        assert!(matches!(
            swarm.seed(&[0.0, 0.0]),
            Err(SwarmError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
        let bad = SwarmParams {
            population: 0,
            ..SwarmParams::default()
        };
        assert!(ParticleSwarm::new(box3(), sphere([0.0; 3]), bad).is_err());
    }
}
