//! Simulated annealing over continuous standardizable domains.
//!
//! The loss is evaluated inside the sampler on each proposal; robustness
//! feedback is not consumed. After every step the temperature cools and the
//! in-epoch counter advances. A new epoch starts when the temperature falls
//! below the reset threshold or the epoch's iteration budget is spent.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::sampler::{from_state, require, to_state, DomainSampler};
use crate::DrawId;

pub type LossFn = Arc<dyn Fn(&Point) -> f64 + Send + Sync>;
pub type CoolingFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;
pub type GrowthFn = Arc<dyn Fn(usize) -> usize + Send + Sync>;
/// `(current, iteration_in_epoch, decay_rate, rng) -> proposal`, all in `[0,1]`.
pub type ProposalFn = Arc<dyn Fn(&[f64], usize, f64, &mut SamplerRng) -> Vec<f64> + Send + Sync>;

#[derive(Clone)]
pub struct AnnealingParams {
    pub initial_temperature: f64,
    pub decay_rate: f64,
    pub iterations: usize,
    pub num_epochs: usize,
    pub reset_temperature: f64,
    pub loss: LossFn,
    pub cooling: Option<CoolingFn>,
    pub iteration_growth: Option<GrowthFn>,
    pub proposal: Option<ProposalFn>,
}

impl AnnealingParams {
    pub fn new(loss: LossFn) -> Self {
        Self {
            initial_temperature: 1.0,
            decay_rate: 0.9,
            iterations: 10,
            num_epochs: 5,
            reset_temperature: 0.01,
            loss,
            cooling: None,
            iteration_growth: None,
            proposal: None,
        }
    }
}

impl std::fmt::Debug for AnnealingParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnealingParams")
            .field("initial_temperature", &self.initial_temperature)
            .field("decay_rate", &self.decay_rate)
            .field("iterations", &self.iterations)
            .field("num_epochs", &self.num_epochs)
            .field("reset_temperature", &self.reset_temperature)
            .finish_non_exhaustive()
    }
}

/// Default schedule: `0.8 * T`.
pub fn default_cooling(t: f64) -> f64 {
    0.8 * t
}

/// Default growth: `ceil(1.1 * n)`.
pub fn default_growth(n: usize) -> usize {
    (1.1 * n as f64).ceil() as usize
}

/// Uniform draw from a hyper-cube of width `decay_rate^iteration` around
/// `current`, clipped to the unit cube.
pub fn shrinking_cube_proposal(
    current: &[f64],
    iteration: usize,
    decay_rate: f64,
    rng: &mut SamplerRng,
) -> Vec<f64> {
    let half = decay_rate.powi(iteration as i32) / 2.0;
    current
        .iter()
        .map(|&x| {
            let lo = (x - half).max(0.0);
            let hi = (x + half).min(1.0);
            if hi > lo {
                rng.gen_range(lo..hi)
            } else {
                lo
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnealingState {
    temperature: f64,
    iterations: usize,
    epochs_left: usize,
    iter_in_epoch: usize,
    current: Option<Vec<f64>>,
    current_loss: Option<f64>,
}

pub struct AnnealingSampler {
    domain: Domain,
    dim: usize,
    params: AnnealingParams,
    state: AnnealingState,
}

impl AnnealingSampler {
    pub fn new(domain: Domain, params: AnnealingParams) -> Result<Self, SamplingError> {
        require(domain.is_continuous_standardizable(), "sa", &domain)?;
        if !(params.initial_temperature > 0.0) {
            return Err(SamplingError::InvalidParams(
                "initial temperature must be positive".to_string(),
            ));
        }
        let dim = domain.standardized_dimension().unwrap_or(0);
        let state = AnnealingState {
            temperature: params.initial_temperature,
            iterations: params.iterations,
            epochs_left: params.num_epochs,
            iter_in_epoch: 0,
            current: None,
            current_loss: None,
        };
        Ok(Self {
            domain,
            dim,
            params,
            state,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.state.temperature
    }

    pub fn epochs_left(&self) -> usize {
        self.state.epochs_left
    }

    fn loss_of(&self, v: &[f64]) -> Result<(Point, f64), SamplingError> {
        let point = self
            .domain
            .unstandardize(&StandardVector::continuous(v.to_vec()))?;
        let loss = (self.params.loss)(&point);
        Ok((point, loss))
    }

    fn cool(&mut self) {
        let t = self.state.temperature;
        self.state.temperature = match &self.params.cooling {
            Some(f) => f(t),
            None => default_cooling(t),
        };
        self.state.iter_in_epoch += 1;
    }
}

impl DomainSampler for AnnealingSampler {
    fn name(&self) -> &str {
        "sa"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, _draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        if self.state.epochs_left == 0 {
            tracing::debug!("simulated annealing finished all epochs");
            return Err(SamplingError::Exhausted);
        }

        let (Some(current), Some(current_loss)) =
            (self.state.current.clone(), self.state.current_loss)
        else {
            let v: Vec<f64> = (0..self.dim).map(|_| rng.gen::<f64>()).collect();
            let (point, loss) = self.loss_of(&v)?;
            self.state.current = Some(v);
            self.state.current_loss = Some(loss);
            self.cool();
            return Ok(point);
        };

        let proposal = match &self.params.proposal {
            Some(f) => f(&current, self.state.iter_in_epoch, self.params.decay_rate, rng),
            None => shrinking_cube_proposal(
                &current,
                self.state.iter_in_epoch,
                self.params.decay_rate,
                rng,
            ),
        };
        let (point, loss) = self.loss_of(&proposal)?;

        let accept_prob = ((current_loss - loss) / self.state.temperature).exp().min(1.0);
        if loss < current_loss || rng.gen::<f64>() < accept_prob {
            self.state.current = Some(proposal);
            self.state.current_loss = Some(loss);
        }

        self.cool();
        if self.state.temperature < self.params.reset_temperature
            || self.state.iter_in_epoch > self.state.iterations
        {
            self.state.temperature = self.params.initial_temperature;
            self.state.iterations = match &self.params.iteration_growth {
                Some(f) => f(self.state.iterations),
                None => default_growth(self.state.iterations),
            };
            self.state.epochs_left -= 1;
            self.state.iter_in_epoch = 0;
        }
        Ok(point)
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&self.state)
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        self.state = from_state(state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::sampler_rng;

    fn distance_to_corner() -> LossFn {
        Arc::new(|p: &Point| {
            let x = p.get(0).and_then(Point::scalar).unwrap_or(0.0);
            let y = p.get(1).and_then(Point::scalar).unwrap_or(0.0);
            (1.0 - x).powi(2) + (1.0 - y).powi(2)
        })
    }

    #[test]
    fn test_exhausts_after_epochs() {
        let domain = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let mut params = AnnealingParams::new(distance_to_corner());
        params.iterations = 3;
        params.num_epochs = 2;
        params.iteration_growth = Some(Arc::new(|n: usize| n));
        let mut s = AnnealingSampler::new(domain, params).unwrap();
        let mut rng = sampler_rng(42, 0);

        let mut draws = 0;
        while s.next_sample(DrawId(draws), &mut rng).is_ok() {
            draws += 1;
            assert!(draws < 100, "annealing never exhausted");
        }
        assert_eq!(s.epochs_left(), 0);
        // first epoch: initial point plus steps until the counter passes 3
        assert_eq!(draws, 4 + 4);
    }

    #[test]
    fn test_reset_threshold_restarts_temperature() {
        let domain = Domain::interval(0.0, 1.0).unwrap();
        let mut params = AnnealingParams::new(Arc::new(|p: &Point| p.scalar().unwrap_or(0.0)));
        params.initial_temperature = 1.0;
        params.reset_temperature = 0.7;
        params.iterations = 100;
        params.num_epochs = 10;
        let mut s = AnnealingSampler::new(domain, params).unwrap();
        let mut rng = sampler_rng(42, 0);

        s.next_sample(DrawId(0), &mut rng).unwrap();
        assert!((s.temperature() - 0.8).abs() < 1e-12);
        s.next_sample(DrawId(1), &mut rng).unwrap();
        assert_eq!(s.temperature(), 1.0);
        assert_eq!(s.epochs_left(), 9);
    }

    #[test]
    fn test_proposal_stays_in_unit_cube() {
        let mut rng = sampler_rng(1, 0);
        for i in 0..50 {
            let v = shrinking_cube_proposal(&[0.0, 1.0, 0.5], i % 4, 0.9, &mut rng);
            assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
        }
    }

    #[test]
    fn test_rejects_discrete_domain() {
        let domain = Domain::discrete_range(0, 5).unwrap();
        let params = AnnealingParams::new(distance_to_corner());
        assert!(AnnealingSampler::new(domain, params).is_err());
    }
}
