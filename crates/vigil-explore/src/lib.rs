//! Vigil Explore: samplers over structured domains.
//!
//! Stateless samplers (random, Halton, grid), adaptive samplers
//! (cross-entropy, bandits, simulated annealing, Bayesian optimization,
//! GLIS), split composition, rejection filtering and late sampling for
//! variable-length lists. Per-draw state is keyed by [`DrawId`] so feedback
//! may arrive in completion order.

pub mod adapt;
pub mod config;
pub mod error;
pub mod feature;
pub mod rng;
pub mod sampler;

use serde::{Deserialize, Serialize};

pub use config::{build_domain_sampler, SamplerSettings, SamplerSpec, SamplerType};
pub use error::SamplingError;
pub use feature::{FeatureSampler, SamplerSnapshot};
pub use rng::{sampler_rng, SamplerRng};
pub use sampler::DomainSampler;

/// Opaque token identifying one draw, used to route its feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrawId(pub u64);

impl std::fmt::Display for DrawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the sampler learns about one of its draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Feedback {
    /// Robustness value; non-positive means the specification was violated.
    Value(f64),
    /// The draw could not be evaluated.
    Rejected,
}

impl Feedback {
    pub fn value(self) -> Option<f64> {
        match self {
            Feedback::Value(rho) => Some(rho),
            Feedback::Rejected => None,
        }
    }
}
