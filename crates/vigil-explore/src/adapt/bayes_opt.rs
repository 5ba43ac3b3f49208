//! Bayesian optimization sampler over continuous standardizable domains.
//!
//! The first `init_num` draws are uniform. After that a GP surrogate is fit
//! on the accumulated `(x, f(x))` pairs and the next point maximizes
//! expected improvement over random candidates plus local perturbations of
//! the incumbent. The objective is evaluated inside the sampler.

use rand::Rng;
use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use super::annealing::LossFn;
use super::gp::{expected_improvement, GaussianProcess};
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::sampler::{from_state, require, to_state, DomainSampler};
use crate::DrawId;

/// Number of incumbent perturbations added to the random candidates.
const LOCAL_CANDIDATES: usize = 64;
const LOCAL_RADIUS: f64 = 0.05;

#[derive(Clone)]
pub struct BayesOptParams {
    pub init_num: usize,
    pub objective: LossFn,
    pub candidates: usize,
    pub length_scale: f64,
    pub noise: f64,
    pub xi: f64,
}

impl BayesOptParams {
    pub fn new(objective: LossFn) -> Self {
        Self {
            init_num: 5,
            objective,
            candidates: 512,
            length_scale: 0.25,
            noise: 1e-6,
            xi: 0.01,
        }
    }
}

impl std::fmt::Debug for BayesOptParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayesOptParams")
            .field("init_num", &self.init_num)
            .field("candidates", &self.candidates)
            .field("length_scale", &self.length_scale)
            .field("noise", &self.noise)
            .field("xi", &self.xi)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct History {
    xs: Vec<Vec<f64>>,
    ys: Vec<f64>,
}

pub struct BayesOptSampler {
    domain: Domain,
    dim: usize,
    params: BayesOptParams,
    history: History,
}

impl BayesOptSampler {
    pub fn new(domain: Domain, params: BayesOptParams) -> Result<Self, SamplingError> {
        require(domain.is_continuous_standardizable(), "bo", &domain)?;
        if params.length_scale <= 0.0 || params.candidates == 0 {
            return Err(SamplingError::InvalidParams(
                "bo needs a positive length scale and candidate count".to_string(),
            ));
        }
        let dim = domain.standardized_dimension().unwrap_or(0);
        Ok(Self {
            domain,
            dim,
            params,
            history: History::default(),
        })
    }

    /// Number of evaluated points so far.
    pub fn evaluations(&self) -> usize {
        self.history.xs.len()
    }

    /// Lowest objective value seen so far.
    pub fn best_value(&self) -> Option<f64> {
        self.history.ys.iter().copied().reduce(f64::min)
    }

    fn uniform(&self, rng: &mut SamplerRng) -> Vec<f64> {
        (0..self.dim).map(|_| rng.gen::<f64>()).collect()
    }

    fn propose(&self, rng: &mut SamplerRng) -> Vec<f64> {
        let Some(gp) = GaussianProcess::fit(
            &self.history.xs,
            &self.history.ys,
            self.params.length_scale,
            self.params.noise,
        ) else {
            tracing::warn!("gp fit failed, falling back to a random point");
            return self.uniform(rng);
        };

        let (best_idx, best_y) = self
            .history
            .ys
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let best = gp.standardize_target(best_y);
        let incumbent = &self.history.xs[best_idx];

        let mut candidates: Vec<Vec<f64>> =
            (0..self.params.candidates).map(|_| self.uniform(rng)).collect();
        for _ in 0..LOCAL_CANDIDATES {
            candidates.push(
                incumbent
                    .iter()
                    .map(|&x| (x + rng.gen_range(-LOCAL_RADIUS..LOCAL_RADIUS)).clamp(0.0, 1.0))
                    .collect(),
            );
        }

        let score = |x: &Vec<f64>| {
            let (m, s) = gp.predict_standardized(x);
            expected_improvement(m, s, best, self.params.xi)
        };
        candidates
            .into_iter()
            .map(|c| (score(&c), c))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c)
            .unwrap_or_else(|| incumbent.clone())
    }
}

impl DomainSampler for BayesOptSampler {
    fn name(&self) -> &str {
        "bo"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, _draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        let x = if self.history.xs.len() < self.params.init_num.max(1) {
            self.uniform(rng)
        } else {
            self.propose(rng)
        };
        let point = self
            .domain
            .unstandardize(&StandardVector::continuous(x.clone()))?;
        let y = (self.params.objective)(&point);
        self.history.xs.push(x);
        self.history.ys.push(y);
        Ok(point)
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&self.history)
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        self.history = from_state(state)?;
        Ok(())
    }
}
