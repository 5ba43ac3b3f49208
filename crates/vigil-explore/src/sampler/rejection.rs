use std::sync::Arc;

use vigil_domain::{Domain, Point};

use super::DomainSampler;
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::{DrawId, Feedback};

pub type PointPredicate = Arc<dyn Fn(&Point) -> bool + Send + Sync>;

/// Bounded redraw policy applied to any sampler.
#[derive(Clone)]
pub struct RejectionFilter {
    predicate: Option<PointPredicate>,
    max_rejections: usize,
}

impl RejectionFilter {
    pub const DEFAULT_MAX_REJECTIONS: usize = 1000;

    pub fn new(predicate: Option<PointPredicate>, max_rejections: usize) -> Self {
        Self {
            predicate,
            max_rejections,
        }
    }

    pub fn max_rejections(&self) -> usize {
        self.max_rejections
    }

    pub fn accepts(&self, point: &Point) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(point))
    }

    /// Draw from `sampler` until a point passes, feeding each rejection back.
    pub fn draw(
        &self,
        sampler: &mut dyn DomainSampler,
        draw: DrawId,
        rng: &mut SamplerRng,
    ) -> Result<Point, SamplingError> {
        for _ in 0..=self.max_rejections {
            match sampler.next_sample(draw, rng) {
                Ok(point) if self.accepts(&point) => return Ok(point),
                Ok(_) | Err(SamplingError::Rejected) => {
                    sampler.update(draw, Feedback::Rejected);
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(
            sampler = sampler.name(),
            limit = self.max_rejections,
            "rejection limit reached"
        );
        Err(SamplingError::RejectionLimit {
            sampler: sampler.name().to_string(),
            limit: self.max_rejections,
        })
    }
}

impl Default for RejectionFilter {
    fn default() -> Self {
        Self::new(None, Self::DEFAULT_MAX_REJECTIONS)
    }
}

impl std::fmt::Debug for RejectionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectionFilter")
            .field("has_predicate", &self.predicate.is_some())
            .field("max_rejections", &self.max_rejections)
            .finish()
    }
}

/// Wraps a sampler and redraws points failing a structural precondition.
pub struct RejectionSampler {
    inner: Box<dyn DomainSampler>,
    filter: RejectionFilter,
}

impl RejectionSampler {
    pub fn new(inner: Box<dyn DomainSampler>, filter: RejectionFilter) -> Self {
        Self { inner, filter }
    }
}

impl DomainSampler for RejectionSampler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn domain(&self) -> &Domain {
        self.inner.domain()
    }

    fn next_sample(&mut self, draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        self.filter.draw(self.inner.as_mut(), draw, rng)
    }

    fn update(&mut self, draw: DrawId, feedback: Feedback) {
        self.inner.update(draw, feedback);
    }

    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        self.inner.save_state()
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<(), SamplingError> {
        self.inner.restore_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::sampler_rng;
    use crate::sampler::RandomSampler;

    #[test]
    fn test_redraws_until_predicate_holds() {
        let domain = Domain::interval(0.0, 10.0).unwrap();
        let filter = RejectionFilter::new(
            Some(Arc::new(|p: &Point| p.scalar().is_some_and(|x| x > 5.0))),
            1000,
        );
        let mut s = RejectionSampler::new(Box::new(RandomSampler::new(domain)), filter);
        let mut rng = sampler_rng(42, 0);
        for i in 0..100 {
            let x = s.next_sample(DrawId(i), &mut rng).unwrap().scalar().unwrap();
            assert!(x > 5.0);
        }
    }

    #[test]
    fn test_always_false_hits_limit() {
        let domain = Domain::interval(0.0, 1.0).unwrap();
        let filter = RejectionFilter::new(Some(Arc::new(|_: &Point| false)), 25);
        let mut s = RejectionSampler::new(Box::new(RandomSampler::new(domain)), filter);
        let mut rng = sampler_rng(42, 0);
        match s.next_sample(DrawId(0), &mut rng) {
            Err(SamplingError::RejectionLimit { sampler, limit }) => {
                assert_eq!(sampler, "random");
                assert_eq!(limit, 25);
            }
            other => panic!("expected rejection limit, got {other:?}"),
        }
    }
}
