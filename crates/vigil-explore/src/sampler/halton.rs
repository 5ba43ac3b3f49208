//! Halton low-discrepancy sequence over continuous standardizable domains.

use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point, StandardVector};

use super::{from_state, require, to_state, DomainSampler};
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::DrawId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HaltonParams {
    /// Index of the point before the first one produced.
    pub sample_index: u64,
    /// Number of leading primes to skip when choosing bases.
    pub bases_skipped: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct HaltonState {
    index: u64,
}

pub struct HaltonSampler {
    domain: Domain,
    bases: Vec<u64>,
    index: u64,
}

impl HaltonSampler {
    pub fn new(domain: Domain, params: &HaltonParams) -> Result<Self, SamplingError> {
        require(domain.is_continuous_standardizable(), "halton", &domain)?;
        let dim = domain.standardized_dimension().unwrap_or(0);
        let bases = primes(params.bases_skipped + dim)
            .into_iter()
            .skip(params.bases_skipped)
            .collect();
        Ok(Self {
            domain,
            bases,
            index: params.sample_index,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    fn next_vector(&mut self) -> Vec<f64> {
        self.index += 1;
        self.bases
            .iter()
            .map(|&b| radical_inverse(self.index, b))
            .collect()
    }
}

impl DomainSampler for HaltonSampler {
    fn name(&self) -> &str {
        "halton"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, _draw: DrawId, _rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        let v = self.next_vector();
        Ok(self.domain.unstandardize(&StandardVector::continuous(v))?)
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        to_state(&HaltonState { index: self.index })
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        let state: HaltonState = from_state(state)?;
        self.index = state.index;
        Ok(())
    }
}

/// Van der Corput radical inverse of `n` in base `base`.
pub fn radical_inverse(mut n: u64, base: u64) -> f64 {
    let inv = 1.0 / base as f64;
    let mut f = inv;
    let mut r = 0.0;
    while n > 0 {
        r += (n % base) as f64 * f;
        n /= base;
        f *= inv;
    }
    r
}

/// The first `count` primes.
pub(crate) fn primes(count: usize) -> Vec<u64> {
    let mut out: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while out.len() < count {
        if out.iter().take_while(|&&p| p * p <= candidate).all(|&p| candidate % p != 0) {
            out.push(candidate);
        }
        candidate += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::sampler_rng;

    #[test]
    fn test_primes() {
        assert_eq!(primes(6), vec![2, 3, 5, 7, 11, 13]);
    }

    #[test]
    fn test_radical_inverse_base_two() {
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert_eq!(radical_inverse(1, 3), 1.0 / 3.0);
    }

    #[test]
    fn test_first_point_uses_next_index() {
        let domain = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let mut s = HaltonSampler::new(domain, &HaltonParams::default()).unwrap();
        let mut rng = sampler_rng(0, 0);
        let p = s.next_sample(DrawId(0), &mut rng).unwrap();
        assert_eq!(p.get(0).unwrap().scalar(), Some(0.5));
        assert_eq!(p.get(1).unwrap().scalar(), Some(1.0 / 3.0));
        assert_eq!(s.index(), 1);
    }

    #[test]
    fn test_bases_skipped() {
        let domain = Domain::interval(0.0, 1.0).unwrap();
        let params = HaltonParams {
            sample_index: 0,
            bases_skipped: 2,
        };
        let mut s = HaltonSampler::new(domain, &params).unwrap();
        assert_eq!(s.next_vector(), vec![0.2]);
    }

    #[test]
    fn test_rejects_discrete_domain() {
        let domain = Domain::discrete_range(0, 3).unwrap();
        assert!(matches!(
            HaltonSampler::new(domain, &HaltonParams::default()),
            Err(SamplingError::Unsupported { .. })
        ));
    }
}
