//! GLIS-style surrogate search behind a pluggable optimizer.
//!
//! The sampler asks the optimizer for a point in `[0,1]^d`, remembers it by
//! draw, and reports the robustness value back once it arrives. Feedback of
//! exactly `1.0` asks for the optimizer to be re-initialized on the next draw.

use std::collections::BTreeMap;

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::sampler::{from_state, require, to_state, DomainSampler};
use crate::{DrawId, Feedback};

/// Feedback value that requests re-initialization.
pub const REINITIALIZE_FEEDBACK: f64 = 1.0;

/// A black-box minimizer over the unit cube.
pub trait SurrogateOptimizer: Send {
    /// Reset to a fresh search over `dimension` coordinates.
    fn initialize(&mut self, dimension: usize, rng: &mut SamplerRng);

    /// Next point to evaluate, in `[0,1]^d`.
    fn propose(&mut self, rng: &mut SamplerRng) -> Vec<f64>;

    /// Report the objective value of an earlier proposal.
    fn observe(&mut self, x: Vec<f64>, value: f64);

    fn save_state(&self) -> Result<serde_json::Value, SamplingError>;

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlisParams {
    pub n_initial_random: usize,
    /// Exploration weight of the inverse-distance term.
    pub delta: f64,
    /// Shape parameter of the inverse-quadratic RBF.
    pub epsilon: f64,
    pub candidates: usize,
}

impl Default for GlisParams {
    fn default() -> Self {
        Self {
            n_initial_random: 10,
            delta: 0.5,
            epsilon: 1.0,
            candidates: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RbfIdwState {
    dimension: usize,
    initial: Vec<Vec<f64>>,
    xs: Vec<Vec<f64>>,
    fs: Vec<f64>,
}

/// Inverse-quadratic RBF surrogate with inverse-distance-weighting exploration.
pub struct RbfIdwOptimizer {
    params: GlisParams,
    state: RbfIdwState,
}

impl RbfIdwOptimizer {
    pub fn new(params: GlisParams) -> Self {
        Self {
            params,
            state: RbfIdwState::default(),
        }
    }

    pub fn observations(&self) -> usize {
        self.state.xs.len()
    }

    fn phi(&self, d2: f64) -> f64 {
        1.0 / (1.0 + self.params.epsilon * self.params.epsilon * d2)
    }

    fn weights(&self) -> Option<DVector<f64>> {
        let n = self.state.xs.len();
        let m = DMatrix::from_fn(n, n, |i, j| {
            let v = self.phi(dist2(&self.state.xs[i], &self.state.xs[j]));
            if i == j {
                v + 1e-8
            } else {
                v
            }
        });
        let f = DVector::from_column_slice(&self.state.fs);
        Cholesky::new(m).map(|c| c.solve(&f))
    }

    fn acquisition(&self, x: &[f64], w: &DVector<f64>, range: f64) -> f64 {
        let mut surrogate = 0.0;
        let mut inv_sum = 0.0;
        for (i, xi) in self.state.xs.iter().enumerate() {
            let d2 = dist2(x, xi);
            surrogate += w[i] * self.phi(d2);
            if d2 == 0.0 {
                // coincides with a sample: no exploration value
                return surrogate;
            }
            inv_sum += 1.0 / d2;
        }
        let z = if inv_sum > 0.0 {
            std::f64::consts::FRAC_2_PI * (1.0 / inv_sum).atan()
        } else {
            0.0
        };
        surrogate - self.params.delta * range * z
    }
}

impl SurrogateOptimizer for RbfIdwOptimizer {
    fn initialize(&mut self, dimension: usize, rng: &mut SamplerRng) {
        let n = self.params.n_initial_random.max(1);
        let columns: Vec<Vec<usize>> = (0..dimension)
            .map(|_| {
                let mut perm: Vec<usize> = (0..n).collect();
                perm.shuffle(rng);
                perm
            })
            .collect();
        let mut initial: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                columns
                    .iter()
                    .map(|perm| (perm[i] as f64 + rng.gen::<f64>()) / n as f64)
                    .collect()
            })
            .collect();
        // proposals pop from the back
        initial.reverse();
        self.state = RbfIdwState {
            dimension,
            initial,
            xs: Vec::new(),
            fs: Vec::new(),
        };
    }

    fn propose(&mut self, rng: &mut SamplerRng) -> Vec<f64> {
        let dim = self.state.dimension;
        if let Some(x) = self.state.initial.pop() {
            return x;
        }
        let random = |rng: &mut SamplerRng| (0..dim).map(|_| rng.gen::<f64>()).collect::<Vec<f64>>();
        if self.state.xs.is_empty() {
            return random(rng);
        }
        let Some(w) = self.weights() else {
            return random(rng);
        };
        let max = self.state.fs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = self.state.fs.iter().copied().fold(f64::INFINITY, f64::min);
        let range = if max > min { max - min } else { 1.0 };

        (0..self.params.candidates.max(1))
            .map(|_| {
                let c = random(rng);
                (self.acquisition(&c, &w, range), c)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c)
            .unwrap_or_else(|| random(rng))
    }

    fn observe(&mut self, x: Vec<f64>, value: f64) {
        self.state.xs.push(x);
        self.state.fs.push(value);
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&self.state)
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        self.state = from_state(state)?;
        Ok(())
    }
}

fn dist2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[derive(Debug, Serialize, Deserialize)]
struct GlisState {
    initialized: bool,
    pending: Vec<(DrawId, Vec<f64>)>,
    optimizer: serde_json::Value,
}

pub struct GlisSampler {
    domain: Domain,
    dim: usize,
    optimizer: Box<dyn SurrogateOptimizer>,
    initialized: bool,
    pending: BTreeMap<DrawId, Vec<f64>>,
}

impl GlisSampler {
    pub fn new(domain: Domain, params: &GlisParams) -> Result<Self, SamplingError> {
        Self::with_optimizer(domain, Box::new(RbfIdwOptimizer::new(params.clone())))
    }

    pub fn with_optimizer(
        domain: Domain,
        optimizer: Box<dyn SurrogateOptimizer>,
    ) -> Result<Self, SamplingError> {
        require(domain.is_continuous_standardizable(), "glis", &domain)?;
        let dim = domain.standardized_dimension().unwrap_or(0);
        Ok(Self {
            domain,
            dim,
            optimizer,
            initialized: false,
            pending: BTreeMap::new(),
        })
    }
}

impl DomainSampler for GlisSampler {
    fn name(&self) -> &str {
        "glis"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        if !self.initialized {
            self.optimizer.initialize(self.dim, rng);
            self.initialized = true;
        }
        let x: Vec<f64> = self
            .optimizer
            .propose(rng)
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0))
            .collect();
        let point = self
            .domain
            .unstandardize(&StandardVector::continuous(x.clone()))?;
        self.pending.insert(draw, x);
        Ok(point)
    }

    fn update(&mut self, draw: DrawId, feedback: Feedback) {
        let Some(x) = self.pending.remove(&draw) else {
            return;
        };
        match feedback {
            Feedback::Value(rho) if rho == REINITIALIZE_FEEDBACK => {
                tracing::debug!(%draw, "glis re-initialization requested");
                self.initialized = false;
            }
            Feedback::Value(rho) => self.optimizer.observe(x, rho),
            Feedback::Rejected => {}
        }
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&GlisState {
            initialized: self.initialized,
            pending: self.pending.iter().map(|(k, v)| (*k, v.clone())).collect(),
            optimizer: self.optimizer.save_state()?,
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        let state: GlisState = from_state(state)?;
        self.optimizer.restore_state(&state.optimizer)?;
        self.initialized = state.initialized;
        self.pending = state.pending.into_iter().collect();
        Ok(())
    }
}
