//! The sampler trait and the memoryless samplers.

pub mod grid;
pub mod halton;
pub mod random;
pub mod rejection;
pub mod split;

use serde::de::DeserializeOwned;
use serde::Serialize;
use vigil_domain::{Domain, Point};

use crate::error::SamplingError;
use crate::rng::SamplerRng;
use crate::{DrawId, Feedback};

pub use grid::{GridParams, GridSampler};
pub use halton::{HaltonParams, HaltonSampler};
pub use random::RandomSampler;
pub use rejection::{RejectionFilter, RejectionSampler};
pub use split::SplitSampler;

/// A stateful sampler bound to one domain.
///
/// Implementations must tolerate feedback for any outstanding draw, in any
/// order, and at most once per draw.
pub trait DomainSampler: Send {
    /// Sampler name for diagnostics.
    fn name(&self) -> &str;

    fn domain(&self) -> &Domain;

    /// Draw the next point. `SamplingError::Exhausted` ends the run normally.
    fn next_sample(&mut self, draw: DrawId, rng: &mut SamplerRng) -> Result<Point, SamplingError>;

    /// Consume feedback for an earlier draw.
    fn update(&mut self, _draw: DrawId, _feedback: Feedback) {}

    /// Serializable belief state, including pending per-draw records.
    fn save_state(&self) -> Result<serde_json::Value, SamplingError> {
        Ok(serde_json::Value::Null)
    }

    /// Load state produced by [`save_state`](Self::save_state) on a sampler
    /// built with the same configuration.
    fn restore_state(&mut self, _state: &serde_json::Value) -> Result<(), SamplingError> {
        Ok(())
    }
}

pub(crate) fn to_state<T: Serialize>(state: &T) -> Result<serde_json::Value, SamplingError> {
    Ok(serde_json::to_value(state)?)
}

pub(crate) fn from_state<T: DeserializeOwned>(state: &serde_json::Value) -> Result<T, SamplingError> {
    Ok(serde_json::from_value(state.clone())?)
}

pub(crate) fn require(
    ok: bool,
    sampler: &str,
    domain: &Domain,
) -> Result<(), SamplingError> {
    if ok {
        Ok(())
    } else {
        Err(SamplingError::unsupported(sampler, domain))
    }
}
