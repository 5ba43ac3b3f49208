//! Top-level sampler over a full feature space, with late sampling of
//! variable-length lists and save/restore of the whole sampling state.
//!
//! Each draw first picks a length for every variable list, then samples the
//! rest from a fixed-dimension sampler built lazily for that length vector.
//! The sampler owns the run RNG, so a restored snapshot continues the exact
//! same sample sequence.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point};

use crate::config::{build_domain_sampler, SamplerSpec};
use crate::error::SamplingError;
use crate::rng::{sampler_rng, SamplerRng};
use crate::sampler::{DomainSampler, RandomSampler, RejectionFilter};
use crate::{DrawId, Feedback};

pub type DomainSamplerFactory =
    Arc<dyn Fn(Domain) -> Result<Box<dyn DomainSampler>, SamplingError> + Send + Sync>;

/// Serialized state of a [`FeatureSampler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerSnapshot {
    pub rng: SamplerRng,
    pub next_id: u64,
    pub length_sampler: Option<serde_json::Value>,
    pub samplers: Vec<(Vec<usize>, serde_json::Value)>,
    pub draws: Vec<(DrawId, Vec<usize>)>,
}

pub struct FeatureSampler {
    domain: Domain,
    rng: SamplerRng,
    next_id: u64,
    length_sampler: Option<Box<dyn DomainSampler>>,
    factory: DomainSamplerFactory,
    samplers: BTreeMap<Vec<usize>, Box<dyn DomainSampler>>,
    draws: BTreeMap<DrawId, Vec<usize>>,
    filter: Option<RejectionFilter>,
}

impl FeatureSampler {
    pub fn new(domain: Domain, factory: DomainSamplerFactory, seed: u64) -> Self {
        let length_sampler = domain
            .length_domain()
            .map(|d| Box::new(RandomSampler::new(d)) as Box<dyn DomainSampler>);
        Self {
            domain,
            rng: sampler_rng(seed, 0),
            next_id: 0,
            length_sampler,
            factory,
            samplers: BTreeMap::new(),
            draws: BTreeMap::new(),
            filter: None,
        }
    }

    /// Sample every fixed-length instance of `domain` with the sampler `spec` names.
    pub fn from_spec(domain: Domain, spec: SamplerSpec, seed: u64) -> Self {
        let factory: DomainSamplerFactory = Arc::new(move |d| build_domain_sampler(d, &spec));
        Self::new(domain, factory, seed)
    }

    /// Redraw points rejected by `filter` before returning them.
    pub fn with_filter(mut self, filter: RejectionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Number of fixed-length samplers built so far.
    pub fn cached_samplers(&self) -> usize {
        self.samplers.len()
    }

    /// Draws whose feedback has not arrived yet.
    pub fn outstanding(&self) -> usize {
        self.draws.len()
    }

    pub fn next_sample(&mut self) -> Result<(DrawId, Point), SamplingError> {
        let draw = DrawId(self.next_id);
        self.next_id += 1;

        let lengths = match self.length_sampler.as_mut() {
            Some(ls) => lengths_of(&ls.next_sample(draw, &mut self.rng)?)?,
            None => Vec::new(),
        };
        let sampler = cached_sampler(&mut self.samplers, &self.domain, &self.factory, &lengths)?;
        let point = match &self.filter {
            Some(filter) => filter.draw(sampler.as_mut(), draw, &mut self.rng)?,
            None => sampler.next_sample(draw, &mut self.rng)?,
        };
        self.draws.insert(draw, lengths);
        Ok((draw, point))
    }

    /// Route feedback for `draw` to the length sampler and the sampler that produced it.
    pub fn update(&mut self, draw: DrawId, feedback: Feedback) {
        let Some(lengths) = self.draws.remove(&draw) else {
            tracing::warn!(%draw, "feedback for unknown draw ignored");
            return;
        };
        if let Some(ls) = self.length_sampler.as_mut() {
            ls.update(draw, feedback);
        }
        if let Some(s) = self.samplers.get_mut(&lengths) {
            s.update(draw, feedback);
        }
    }

    pub fn save_state(&self) -> Result<SamplerSnapshot, SamplingError> {
        Ok(SamplerSnapshot {
            rng: self.rng.clone(),
            next_id: self.next_id,
            length_sampler: self
                .length_sampler
                .as_ref()
                .map(|ls| ls.save_state())
                .transpose()?,
            samplers: self
                .samplers
                .iter()
                .map(|(k, s)| Ok((k.clone(), s.save_state()?)))
                .collect::<Result<Vec<_>, SamplingError>>()?,
            draws: self.draws.iter().map(|(k, v)| (*k, v.clone())).collect(),
        })
    }

    /// Load a snapshot into a sampler built with the same domain and factory.
    pub fn restore_state(&mut self, snapshot: &SamplerSnapshot) -> Result<(), SamplingError> {
        match (self.length_sampler.as_mut(), &snapshot.length_sampler) {
            (Some(ls), Some(state)) => ls.restore_state(state)?,
            (None, None) => {}
            _ => {
                return Err(SamplingError::Snapshot(
                    "snapshot does not match the domain's variable lists".to_string(),
                ))
            }
        }
        self.samplers.clear();
        for (lengths, state) in &snapshot.samplers {
            cached_sampler(&mut self.samplers, &self.domain, &self.factory, lengths)?
                .restore_state(state)?;
        }
        self.rng = snapshot.rng.clone();
        self.next_id = snapshot.next_id;
        self.draws = snapshot.draws.iter().cloned().collect();
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SamplingError> {
        let json = serde_json::to_string_pretty(&self.save_state()?)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn restore_from_file(&mut self, path: &Path) -> Result<(), SamplingError> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: SamplerSnapshot = serde_json::from_str(&json)?;
        self.restore_state(&snapshot)
    }
}

fn cached_sampler<'a>(
    samplers: &'a mut BTreeMap<Vec<usize>, Box<dyn DomainSampler>>,
    domain: &Domain,
    factory: &DomainSamplerFactory,
    lengths: &[usize],
) -> Result<&'a mut Box<dyn DomainSampler>, SamplingError> {
    match samplers.entry(lengths.to_vec()) {
        Entry::Occupied(e) => Ok(e.into_mut()),
        Entry::Vacant(e) => {
            let fixed = if lengths.is_empty() {
                domain.clone()
            } else {
                domain.with_fixed_lengths(lengths)?
            };
            let sampler = factory(fixed)?;
            tracing::debug!(?lengths, sampler = sampler.name(), "built fixed-length sampler");
            Ok(e.insert(sampler))
        }
    }
}

fn lengths_of(point: &Point) -> Result<Vec<usize>, SamplingError> {
    match point {
        Point::Tuple(items) => items
            .iter()
            .map(|p| {
                p.scalar()
                    .filter(|x| *x >= 0.0)
                    .map(|x| x as usize)
                    .ok_or_else(|| SamplingError::InvalidParams(format!("bad list length {p}")))
            })
            .collect(),
        other => Err(SamplingError::InvalidParams(format!(
            "length sampler produced {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::HaltonSampler;

    fn random_factory() -> DomainSamplerFactory {
        Arc::new(|d| Ok(Box::new(RandomSampler::new(d)) as Box<dyn DomainSampler>))
    }

    #[test]
    fn test_caches_one_sampler_per_length() {
        let domain = Domain::structure([
            ("n", Domain::discrete_range(0, 12).unwrap()),
            (
                "agents",
                Domain::variable_list(Domain::interval(0.0, 1.0).unwrap(), 0, 2).unwrap(),
            ),
        ]);
        let mut s = FeatureSampler::new(domain.clone(), random_factory(), 42);
        for _ in 0..100 {
            let (id, p) = s.next_sample().unwrap();
            assert!(domain.contains(&p));
            s.update(id, Feedback::Value(1.0));
        }
        assert_eq!(s.cached_samplers(), 3);
        assert_eq!(s.outstanding(), 0);
    }

    #[test]
    fn test_no_lists_uses_single_sampler() {
        let domain = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let factory: DomainSamplerFactory = Arc::new(|d| {
            Ok(Box::new(HaltonSampler::new(d, &Default::default())?) as Box<dyn DomainSampler>)
        });
        let mut s = FeatureSampler::new(domain, factory, 0);
        let (_, p) = s.next_sample().unwrap();
        assert_eq!(p.get(0).unwrap().scalar(), Some(0.5));
        assert_eq!(s.cached_samplers(), 1);
    }
}
