//! Composite sampler that delegates disjoint sub-domains to component samplers.

use vigil_domain::{Domain, Point};

use super::DomainSampler;
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::{DrawId, Feedback};

pub type DomainPredicate = Box<dyn Fn(&Domain) -> bool>;
pub type SamplerFactory = Box<dyn Fn(Domain) -> Result<Box<dyn DomainSampler>, SamplingError>>;

pub struct SplitSampler {
    domain: Domain,
    components: Vec<Box<dyn DomainSampler>>,
}

impl SplitSampler {
    /// Claim the largest matching sub-domain for each predicate in order,
    /// then hand whatever is left to `default`.
    pub fn from_partition(
        domain: Domain,
        partition: Vec<(DomainPredicate, SamplerFactory)>,
        default: Option<SamplerFactory>,
    ) -> Result<Self, SamplingError> {
        let mut components = Vec::new();
        let mut remaining = Some(domain.clone());
        for (predicate, factory) in partition {
            let Some(rest) = remaining.take() else { break };
            let (matched, rest) = rest.partition(&*predicate);
            if let Some(matched) = matched {
                components.push(factory(matched)?);
            }
            remaining = rest;
        }
        if let Some(rest) = remaining {
            match default {
                Some(factory) => components.push(factory(rest)?),
                None => return Err(SamplingError::NonExhaustivePartition(rest.describe())),
            }
        }
        tracing::debug!(
            components = components.len(),
            names = ?components.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            "built split sampler"
        );
        Ok(Self { domain, components })
    }

    pub fn from_predicate(
        domain: Domain,
        predicate: DomainPredicate,
        factory: SamplerFactory,
        default: SamplerFactory,
    ) -> Result<Self, SamplingError> {
        Self::from_partition(domain, vec![(predicate, factory)], Some(default))
    }

    pub fn components(&self) -> &[Box<dyn DomainSampler>] {
        &self.components
    }
}

impl DomainSampler for SplitSampler {
    fn name(&self) -> &str {
        "split"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        let mut parts = Vec::with_capacity(self.components.len());
        for i in 0..self.components.len() {
            match self.components[i].next_sample(draw, rng) {
                Ok(part) => parts.push(part),
                Err(e) => {
                    // Release the draw in every component that already sampled it.
                    for earlier in &mut self.components[..i] {
                        earlier.update(draw, Feedback::Rejected);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Domain::rejoin(parts)?)
    }

    fn update(&mut self, draw: DrawId, feedback: Feedback) {
        for component in &mut self.components {
            component.update(draw, feedback);
        }
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        let states = self
            .components
            .iter()
            .map(|c| c.save_state())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::Value::Array(states))
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        let states = state
            .as_array()
            .filter(|s| s.len() == self.components.len())
            .ok_or_else(|| {
                SamplingError::Snapshot(format!(
                    "split sampler expects {} component states",
                    self.components.len()
                ))
            })?;
        for (component, s) in self.components.iter_mut().zip(states) {
            component.restore_state(s)?;
        }
        Ok(())
    }
}
