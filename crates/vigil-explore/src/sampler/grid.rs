//! Exhaustive grid enumeration over standardizable domains.

use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use super::{from_state, require, to_state, DomainSampler};
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::DrawId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Grid values per continuous coordinate.
    pub points_per_dim: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self { points_per_dim: 5 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GridState {
    position: u64,
}

/// Produces every grid point exactly once, then signals exhaustion.
///
/// Continuous coordinates come first, then integer coordinates; the last
/// coordinate varies fastest.
pub struct GridSampler {
    domain: Domain,
    points_per_dim: usize,
    continuous_dims: usize,
    intervals: Vec<(i64, i64)>,
    sizes: Vec<u64>,
    total: u64,
    position: u64,
}

impl GridSampler {
    pub fn new(domain: Domain, params: &GridParams) -> Result<Self, SamplingError> {
        require(domain.is_standardizable(), "grid", &domain)?;
        if params.points_per_dim == 0 {
            return Err(SamplingError::InvalidParams(
                "grid needs at least one point per dimension".to_string(),
            ));
        }
        let continuous_dims = domain.standardized_dimension().unwrap_or(0);
        let intervals = domain.standardized_intervals().unwrap_or_default();

        let too_large = || SamplingError::InvalidParams("grid has more than 2^64 points".to_string());
        let mut total: u64 = 1;
        for _ in 0..continuous_dims {
            total = total
                .checked_mul(params.points_per_dim as u64)
                .ok_or_else(too_large)?;
        }
        let sizes = intervals
            .iter()
            .map(|&(lo, hi)| hi.abs_diff(lo).checked_add(1).ok_or_else(too_large))
            .collect::<Result<Vec<u64>, _>>()?;
        for &size in &sizes {
            total = total.checked_mul(size).ok_or_else(too_large)?;
        }

        Ok(Self {
            domain,
            points_per_dim: params.points_per_dim,
            continuous_dims,
            intervals,
            sizes,
            total,
            position: 0,
        })
    }

    /// Total number of grid points.
    pub fn total_points(&self) -> u64 {
        self.total
    }

    fn vector_at(&self, mut position: u64) -> StandardVector {
        let mut discrete = vec![0i64; self.intervals.len()];
        let ranges = self.intervals.iter().zip(&self.sizes);
        for (slot, (&(lo, _), &size)) in discrete.iter_mut().zip(ranges).rev() {
            *slot = lo.wrapping_add_unsigned(position % size);
            position /= size;
        }
        let n = self.points_per_dim as u64;
        let mut continuous = vec![0.0; self.continuous_dims];
        for slot in continuous.iter_mut().rev() {
            let k = position % n;
            position /= n;
            *slot = if n == 1 {
                0.5
            } else {
                k as f64 / (n - 1) as f64
            };
        }
        StandardVector::new(continuous, discrete)
    }
}

impl DomainSampler for GridSampler {
    fn name(&self) -> &str {
        "grid"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, _draw: DrawId, _rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        if self.position >= self.total {
            return Err(SamplingError::Exhausted);
        }
        let v = self.vector_at(self.position);
        self.position += 1;
        Ok(self.domain.unstandardize(&v)?)
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&GridState {
            position: self.position,
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        let state: GridState = from_state(state)?;
        self.position = state.position;
        Ok(())
    }
}
