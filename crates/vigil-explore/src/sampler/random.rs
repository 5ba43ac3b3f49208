use std::collections::BTreeMap;

use rand::Rng;
use vigil_domain::{Domain, DomainKind, Point, Value};

use super::DomainSampler;
use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::DrawId;

/// Independent uniform draws over any domain. Consumes no feedback.
pub struct RandomSampler {
    domain: Domain,
}

impl RandomSampler {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }
}

impl DomainSampler for RandomSampler {
    fn name(&self) -> &str {
        "random"
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn next_sample(&mut self, _draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError> {
        Ok(random_point(&self.domain, rng))
    }
}

/// Draw one point uniformly: each leaf independently, list lengths first.
pub fn random_point(domain: &Domain, rng: &mut SamplerRng) -> Point {
    match domain.kind() {
        DomainKind::Constant(v) => Point::Leaf(v.clone()),
        DomainKind::Categorical(values) => {
            Point::Leaf(values[rng.gen_range(0..values.len())].clone())
        }
        DomainKind::Box(iv) => Point::Tuple(
            iv.iter()
                .map(|&(lo, hi)| Point::Leaf(Value::Real(rng.gen_range(lo..=hi))))
                .collect(),
        ),
        DomainKind::DiscreteBox(iv) => Point::Tuple(
            iv.iter()
                .map(|&(lo, hi)| Point::Leaf(Value::Int(rng.gen_range(lo..=hi))))
                .collect(),
        ),
        DomainKind::Struct(fields) => Point::Record(
            fields
                .iter()
                .map(|(name, d)| (name.clone(), random_point(d, rng)))
                .collect::<BTreeMap<_, _>>(),
        ),
        DomainKind::Array { element, shape } => random_array(element, shape, rng),
        DomainKind::VariableList {
            element,
            min_len,
            max_len,
        } => {
            let len = rng.gen_range(*min_len..=*max_len);
            Point::Tuple((0..len).map(|_| random_point(element, rng)).collect())
        }
    }
}

fn random_array(element: &Domain, shape: &[usize], rng: &mut SamplerRng) -> Point {
    match shape.split_first() {
        None => random_point(element, rng),
        Some((&n, rest)) => Point::Tuple((0..n).map(|_| random_array(element, rest, rng)).collect()),
    }
}
