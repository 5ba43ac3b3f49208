//! Bucketed coordinate samplers: cross-entropy, epsilon-greedy and UCB1.
//!
//! Each continuous coordinate is split into equal-width buckets over `[0,1]`
//! and each integer coordinate has one arm per value. A draw picks one
//! bucket per coordinate under the policy, then samples uniformly inside
//! continuous buckets. The chosen buckets are remembered per [`DrawId`]
//! until feedback arrives.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::sampler::{from_state, require, to_state, DomainSampler};
use crate::{DrawId, Feedback};

/// Largest integer interval a bucket sampler will model arm by arm.
pub const MAX_DISCRETE_ARMS: usize = 4096;

/// Number of buckets: one count for every continuous coordinate, or one per coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketCount {
    Uniform(usize),
    PerCoordinate(Vec<usize>),
}

impl Default for BucketCount {
    fn default() -> Self {
        BucketCount::Uniform(5)
    }
}

impl BucketCount {
    fn resolve(&self, dims: usize) -> Result<Vec<usize>, SamplingError> {
        let counts = match self {
            BucketCount::Uniform(n) => vec![*n; dims],
            BucketCount::PerCoordinate(v) if v.len() == dims => v.clone(),
            BucketCount::PerCoordinate(v) => {
                return Err(SamplingError::InvalidParams(format!(
                    "{} bucket counts given for {dims} continuous coordinates",
                    v.len()
                )))
            }
        };
        if counts.iter().any(|&n| n == 0) {
            return Err(SamplingError::InvalidParams(
                "bucket count must be positive".to_string(),
            ));
        }
        Ok(counts)
    }
}

/// How a coordinate chooses its bucket and learns from feedback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BucketPolicy {
    /// Sample from a categorical distribution; reinforce on counterexamples.
    CrossEntropy { alpha: f64 },
    /// Explore uniformly with probability `epsilon`, else exploit the best hit rate.
    EpsilonGreedy { epsilon: f64 },
    /// Upper confidence bound on the counterexample rate.
    Ucb { exploration: f64 },
}

impl BucketPolicy {
    fn name(&self) -> &'static str {
        match self {
            BucketPolicy::CrossEntropy { .. } => "ce",
            BucketPolicy::EpsilonGreedy { .. } => "eg",
            BucketPolicy::Ucb { .. } => "mab",
        }
    }

    fn validate(&self) -> Result<(), SamplingError> {
        let ok = match *self {
            BucketPolicy::CrossEntropy { alpha } => (0.0..1.0).contains(&alpha),
            BucketPolicy::EpsilonGreedy { epsilon } => (0.0..=1.0).contains(&epsilon),
            BucketPolicy::Ucb { exploration } => exploration >= 0.0 && exploration.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(SamplingError::InvalidParams(format!("invalid policy {self:?}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketParams {
    pub policy: BucketPolicy,
    /// Feedback at or below this counts as a counterexample.
    pub thres: f64,
    pub buckets: BucketCount,
    /// Initial distributions for continuous coordinates (cross-entropy only).
    pub cont_dist: Option<Vec<Vec<f64>>>,
    /// Initial distributions for integer coordinates (cross-entropy only).
    pub disc_dist: Option<Vec<Vec<f64>>>,
}

impl BucketParams {
    pub fn cross_entropy() -> Self {
        Self::with_policy(BucketPolicy::CrossEntropy { alpha: 0.9 })
    }

    pub fn epsilon_greedy() -> Self {
        Self::with_policy(BucketPolicy::EpsilonGreedy { epsilon: 0.1 })
    }

    pub fn ucb() -> Self {
        Self::with_policy(BucketPolicy::Ucb { exploration: 2.0 })
    }

    fn with_policy(policy: BucketPolicy) -> Self {
        Self {
            policy,
            thres: 0.0,
            buckets: BucketCount::default(),
            cont_dist: None,
            disc_dist: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Arms {
    dist: Vec<f64>,
    hits: Vec<f64>,
    visits: Vec<f64>,
}

impl Arms {
    fn new(dist: Vec<f64>) -> Self {
        let n = dist.len();
        Self {
            dist,
            hits: vec![0.0; n],
            visits: vec![0.0; n],
        }
    }

    fn uniform(n: usize) -> Self {
        Self::new(vec![1.0 / n as f64; n])
    }

    fn choose(&self, policy: BucketPolicy, rng: &mut SamplerRng) -> usize {
        let n = self.dist.len();
        match policy {
            BucketPolicy::CrossEntropy { .. } => {
                let total: f64 = self.dist.iter().sum();
                let mut r = rng.gen::<f64>() * total;
                for (i, &p) in self.dist.iter().enumerate() {
                    if r < p {
                        return i;
                    }
                    r -= p;
                }
                n - 1
            }
            BucketPolicy::EpsilonGreedy { epsilon } => {
                if rng.gen::<f64>() < epsilon {
                    return rng.gen_range(0..n);
                }
                let rates: Vec<f64> = (0..n)
                    .map(|i| {
                        if self.visits[i] > 0.0 {
                            self.hits[i] / self.visits[i]
                        } else {
                            0.0
                        }
                    })
                    .collect();
                let best = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let ties: Vec<usize> = (0..n).filter(|&i| rates[i] == best).collect();
                ties[rng.gen_range(0..ties.len())]
            }
            BucketPolicy::Ucb { exploration } => {
                if let Some(i) = self.visits.iter().position(|&v| v == 0.0) {
                    return i;
                }
                let t: f64 = self.visits.iter().sum();
                let score = |i: usize| {
                    self.hits[i] / self.visits[i]
                        + (exploration * t.ln() / self.visits[i]).sqrt()
                };
                (0..n)
                    .max_by(|&a, &b| score(a).total_cmp(&score(b)).then(b.cmp(&a)))
                    .unwrap_or(0)
            }
        }
    }

    fn learn(&mut self, policy: BucketPolicy, chosen: usize, hit: bool) {
        self.visits[chosen] += 1.0;
        if hit {
            self.hits[chosen] += 1.0;
        }
        if let BucketPolicy::CrossEntropy { alpha } = policy {
            if hit {
                for (i, p) in self.dist.iter_mut().enumerate() {
                    let indicator = if i == chosen { 1.0 } else { 0.0 };
                    *p = alpha * *p + (1.0 - alpha) * indicator;
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketState {
    continuous: Vec<Arms>,
    discrete: Vec<Arms>,
    pending: Vec<(DrawId, Vec<usize>)>,
}

pub struct BucketSampler {
    domain: Domain,
    policy: BucketPolicy,
    thres: f64,
    continuous: Vec<Arms>,
    discrete: Vec<Arms>,
    intervals: Vec<(i64, i64)>,
    pending: BTreeMap<DrawId, Vec<usize>>,
}

impl BucketSampler {
    pub fn new(domain: Domain, params: &BucketParams) -> Result<Self, SamplingError> {
        params.policy.validate()?;
        require(domain.is_standardizable(), params.policy.name(), &domain)?;
        let dims = domain.standardized_dimension().unwrap_or(0);
        let intervals = domain.standardized_intervals().unwrap_or_default();

        let counts = params.buckets.resolve(dims)?;
        let continuous = match &params.cont_dist {
            Some(dists) => initial_arms(dists, &counts, "continuous")?,
            None => counts.iter().map(|&n| Arms::uniform(n)).collect(),
        };

        let arm_counts = intervals
            .iter()
            .map(|&(lo, hi)| {
                let too_many = || {
                    SamplingError::InvalidParams(format!(
                        "integer interval [{lo}, {hi}] has more than {MAX_DISCRETE_ARMS} values"
                    ))
                };
                match hi.abs_diff(lo).checked_add(1) {
                    Some(n) if n <= MAX_DISCRETE_ARMS as u64 => Ok(n as usize),
                    _ => Err(too_many()),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let discrete = match &params.disc_dist {
            Some(dists) => initial_arms(dists, &arm_counts, "discrete")?,
            None => arm_counts.iter().map(|&n| Arms::uniform(n)).collect(),
        };

        Ok(Self {
            domain,
            policy: params.policy,
            thres: params.thres,
            continuous,
            discrete,
            intervals,
            pending: BTreeMap::new(),
        })
    }

    /// Current distribution of continuous coordinate `coord`.
    pub fn continuous_distribution(&self, coord: usize) -> Option<&[f64]> {
        self.continuous.get(coord).map(|a| a.dist.as_slice())
    }

    /// Current distribution of integer coordinate `coord`.
    pub fn discrete_distribution(&self, coord: usize) -> Option<&[f64]> {
        self.discrete.get(coord).map(|a| a.dist.as_slice())
    }

    pub fn pending_draws(&self) -> usize {
        self.pending.len()
    }
}

fn initial_arms(
    dists: &[Vec<f64>],
    counts: &[usize],
    kind: &str,
) -> Result<Vec<Arms>, SamplingError> {
    if dists.len() != counts.len() {
        return Err(SamplingError::InvalidParams(format!(
            "{} initial {kind} distributions for {} coordinates",
            dists.len(),
            counts.len()
        )));
    }
    dists
        .iter()
        .zip(counts)
        .map(|(d, &n)| {
            let total: f64 = d.iter().sum();
            if d.len() != n || d.iter().any(|p| *p < 0.0) || total <= 0.0 {
                return Err(SamplingError::InvalidParams(format!(
                    "initial {kind} distribution must have {n} non-negative weights"
                )));
            }
            Ok(Arms::new(d.iter().map(|p| p / total).collect()))
        })
        .collect()
}

impl DomainSampler for BucketSampler {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        let mut chosen = Vec::with_capacity(self.continuous.len() + self.discrete.len());
        let mut continuous = Vec::with_capacity(self.continuous.len());
        for arms in &self.continuous {
            let b = arms.choose(self.policy, rng);
            let n = arms.dist.len() as f64;
            continuous.push(((b as f64 + rng.gen::<f64>()) / n).min(1.0));
            chosen.push(b);
        }
        let mut discrete = Vec::with_capacity(self.discrete.len());
        for (arms, &(lo, _)) in self.discrete.iter().zip(&self.intervals) {
            let b = arms.choose(self.policy, rng);
            discrete.push(lo + b as i64);
            chosen.push(b);
        }
        self.pending.insert(draw, chosen);
        Ok(self.domain.unstandardize(&StandardVector::new(continuous, discrete))?)
    }

    fn update(&mut self, draw: DrawId, feedback: Feedback) {
        let Some(chosen) = self.pending.remove(&draw) else {
            return;
        };
        let Some(rho) = feedback.value() else {
            return;
        };
        let hit = rho <= self.thres;
        let arms = self.continuous.iter_mut().chain(self.discrete.iter_mut());
        for (arms, b) in arms.zip(chosen) {
            arms.learn(self.policy, b, hit);
        }
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&BucketState {
            continuous: self.continuous.clone(),
            discrete: self.discrete.clone(),
            pending: self.pending.iter().map(|(k, v)| (*k, v.clone())).collect(),
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        let state: BucketState = from_state(state)?;
        if state.continuous.len() != self.continuous.len() || state.discrete.len() != self.discrete.len() {
            return Err(SamplingError::Snapshot(format!(
                "{} state does not match its domain",
                self.name()
            )));
        }
        self.continuous = state.continuous;
        self.discrete = state.discrete;
        self.pending = state.pending.into_iter().collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::sampler_rng;

    #[test]
    fn test_ce_reinforces_only_counterexamples() {
        let domain = Domain::discrete_range(0, 3).unwrap();
        let mut s = BucketSampler::new(domain, &BucketParams::cross_entropy()).unwrap();
        let mut rng = sampler_rng(42, 0);

        s.next_sample(DrawId(0), &mut rng).unwrap();
        s.update(DrawId(0), Feedback::Value(1.0));
        assert_eq!(s.discrete_distribution(0).unwrap(), &[0.25; 4]);

        let p = s.next_sample(DrawId(1), &mut rng).unwrap();
        let v2 = p.scalar().unwrap() as usize;
        s.update(DrawId(1), Feedback::Value(0.0));
        let dist = s.discrete_distribution(0).unwrap();
        assert!((dist[v2] - (0.9 * 0.25 + 0.1)).abs() < 1e-12);
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_feedback_out_of_order() {
        let domain = Domain::discrete_range(0, 1).unwrap();
        let mut s = BucketSampler::new(domain, &BucketParams::cross_entropy()).unwrap();
        let mut rng = sampler_rng(1, 0);
        let a = s.next_sample(DrawId(10), &mut rng).unwrap().scalar().unwrap() as usize;
        let _ = s.next_sample(DrawId(11), &mut rng).unwrap();
        assert_eq!(s.pending_draws(), 2);

        s.update(DrawId(10), Feedback::Value(-1.0));
        assert!(s.discrete_distribution(0).unwrap()[a] > 0.5);
        s.update(DrawId(11), Feedback::Rejected);
        s.update(DrawId(11), Feedback::Value(-1.0));
        assert_eq!(s.pending_draws(), 0);
    }

    #[test]
    fn test_ucb_tries_unvisited_first() {
        let domain = Domain::discrete_range(5, 7).unwrap();
        let mut s = BucketSampler::new(domain, &BucketParams::ucb()).unwrap();
        let mut rng = sampler_rng(0, 0);
        let mut order = Vec::new();
        for i in 0..3 {
            order.push(s.next_sample(DrawId(i), &mut rng).unwrap().scalar().unwrap() as i64);
            s.update(DrawId(i), Feedback::Value(1.0));
        }
        assert_eq!(order, vec![5, 6, 7]);
    }

    #[test]
    fn test_epsilon_greedy_exploits_best_arm() {
        let domain = Domain::discrete_range(0, 4).unwrap();
        let params = BucketParams {
            policy: BucketPolicy::EpsilonGreedy { epsilon: 0.0 },
            ..BucketParams::epsilon_greedy()
        };
        let mut s = BucketSampler::new(domain, &params).unwrap();
        let mut rng = sampler_rng(9, 0);
        for i in 0..200 {
            let x = s.next_sample(DrawId(i), &mut rng).unwrap().scalar().unwrap() as i64;
            let rho = if x == 3 { -1.0 } else { 1.0 };
            s.update(DrawId(i), Feedback::Value(rho));
        }
        let last =
            s.next_sample(DrawId(999), &mut rng).unwrap().scalar().unwrap() as i64;
        assert_eq!(last, 3);
    }

    #[test]
    fn test_full_integer_range_is_rejected() {
        let domain = Domain::discrete_range(i64::MIN, i64::MAX).unwrap();
        assert!(matches!(
            BucketSampler::new(domain, &BucketParams::cross_entropy()),
            Err(SamplingError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_bucket_count_mismatch() {
        let domain = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let params = BucketParams {
            buckets: BucketCount::PerCoordinate(vec![3]),
            ..BucketParams::cross_entropy()
        };
        assert!(matches!(
            BucketSampler::new(domain, &params),
            Err(SamplingError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_continuous_bucket_bounds() {
        let domain = Domain::interval(0.0, 10.0).unwrap();
        let params = BucketParams {
            cont_dist: Some(vec![vec![0.0, 0.0, 0.0, 0.0, 1.0]]),
            ..BucketParams::cross_entropy()
        };
        let mut s = BucketSampler::new(domain, &params).unwrap();
        let mut rng = sampler_rng(5, 0);
        for i in 0..50 {
            let x = s.next_sample(DrawId(i), &mut rng).unwrap().scalar().unwrap();
            assert!((8.0..=10.0).contains(&x));
        }
    }
}
