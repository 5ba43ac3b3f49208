//! Sampler selection: the string-keyed sampler type, its serializable
//! settings, and routing of a domain to the sampler that can handle it.
//!
//! Samplers that only understand part of a domain are wrapped in a
//! [`SplitSampler`] that claims the part they support and hands the rest to
//! uniform random sampling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vigil_domain::Domain;

use crate::adapt::{
    AnnealingParams, AnnealingSampler, BayesOptParams, BayesOptSampler, BucketCount, BucketParams,
    BucketPolicy, BucketSampler, GlisParams, GlisSampler, LossFn,
};
use crate::error::SamplingError;
use crate::sampler::split::{DomainPredicate, SamplerFactory};
use crate::sampler::{
    DomainSampler, GridParams, GridSampler, HaltonParams, HaltonSampler, RandomSampler,
    SplitSampler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerType {
    #[default]
    Random,
    Halton,
    Ce,
    Bo,
    Grid,
    Sa,
    Mab,
    Eg,
    Glis,
}

impl SamplerType {
    pub const ALL: [SamplerType; 9] = [
        SamplerType::Random,
        SamplerType::Halton,
        SamplerType::Ce,
        SamplerType::Bo,
        SamplerType::Grid,
        SamplerType::Sa,
        SamplerType::Mab,
        SamplerType::Eg,
        SamplerType::Glis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerType::Random => "random",
            SamplerType::Halton => "halton",
            SamplerType::Ce => "ce",
            SamplerType::Bo => "bo",
            SamplerType::Grid => "grid",
            SamplerType::Sa => "sa",
            SamplerType::Mab => "mab",
            SamplerType::Eg => "eg",
            SamplerType::Glis => "glis",
        }
    }

    /// Whether this sampler needs a caller-supplied loss function.
    pub fn needs_loss(&self) -> bool {
        matches!(self, SamplerType::Bo | SamplerType::Sa)
    }
}

impl fmt::Display for SamplerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplerType {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SamplerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SamplingError::InvalidParams(format!("unknown sampler type `{s}`")))
    }
}

/// A fully specified sampler: its type plus the parameters and callables it needs.
#[derive(Debug, Clone)]
pub enum SamplerSpec {
    Random,
    Halton(HaltonParams),
    CrossEntropy(BucketParams),
    BayesOpt(BayesOptParams),
    Grid(GridParams),
    SimulatedAnnealing(AnnealingParams),
    MultiArmedBandit(BucketParams),
    EpsilonGreedy(BucketParams),
    Glis(GlisParams),
}

impl SamplerSpec {
    pub fn sampler_type(&self) -> SamplerType {
        match self {
            SamplerSpec::Random => SamplerType::Random,
            SamplerSpec::Halton(_) => SamplerType::Halton,
            SamplerSpec::CrossEntropy(_) => SamplerType::Ce,
            SamplerSpec::BayesOpt(_) => SamplerType::Bo,
            SamplerSpec::Grid(_) => SamplerType::Grid,
            SamplerSpec::SimulatedAnnealing(_) => SamplerType::Sa,
            SamplerSpec::MultiArmedBandit(_) => SamplerType::Mab,
            SamplerSpec::EpsilonGreedy(_) => SamplerType::Eg,
            SamplerSpec::Glis(_) => SamplerType::Glis,
        }
    }
}

/// Shared settings of the bucket samplers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketSettings {
    pub thres: f64,
    pub buckets: BucketCount,
    pub alpha: f64,
    pub epsilon: f64,
    pub exploration: f64,
    pub cont_dist: Option<Vec<Vec<f64>>>,
    pub disc_dist: Option<Vec<Vec<f64>>>,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            thres: 0.0,
            buckets: BucketCount::default(),
            alpha: 0.9,
            epsilon: 0.1,
            exploration: 2.0,
            cont_dist: None,
            disc_dist: None,
        }
    }
}

impl BucketSettings {
    fn params(&self, policy: BucketPolicy) -> BucketParams {
        BucketParams {
            policy,
            thres: self.thres,
            buckets: self.buckets.clone(),
            cont_dist: self.cont_dist.clone(),
            disc_dist: self.disc_dist.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingSettings {
    pub initial_temperature: f64,
    pub decay_rate: f64,
    pub iterations: usize,
    pub num_epochs: usize,
    pub reset_temperature: f64,
}

impl Default for AnnealingSettings {
    fn default() -> Self {
        Self {
            initial_temperature: 1.0,
            decay_rate: 0.9,
            iterations: 10,
            num_epochs: 5,
            reset_temperature: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesOptSettings {
    pub init_num: usize,
    pub candidates: usize,
    pub length_scale: f64,
    pub noise: f64,
    pub xi: f64,
}

impl Default for BayesOptSettings {
    fn default() -> Self {
        Self {
            init_num: 5,
            candidates: 512,
            length_scale: 0.25,
            noise: 1e-6,
            xi: 0.01,
        }
    }
}

/// Serializable sampler configuration. Loss callables for `bo` and `sa` are
/// attached by [`into_spec`](Self::into_spec).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    #[serde(rename = "type")]
    pub sampler_type: SamplerType,
    pub halton: HaltonParams,
    pub grid: GridParams,
    pub buckets: BucketSettings,
    pub annealing: AnnealingSettings,
    pub bayes_opt: BayesOptSettings,
    pub glis: GlisParams,
}

impl SamplerSettings {
    pub fn new(sampler_type: SamplerType) -> Self {
        Self {
            sampler_type,
            ..Self::default()
        }
    }

    pub fn into_spec(self, loss: Option<LossFn>) -> Result<SamplerSpec, SamplingError> {
        let need_loss = |loss: Option<LossFn>| {
            loss.ok_or_else(|| {
                SamplingError::InvalidParams(format!(
                    "sampler `{}` needs a loss function",
                    self.sampler_type
                ))
            })
        };
        Ok(match self.sampler_type {
            SamplerType::Random => SamplerSpec::Random,
            SamplerType::Halton => SamplerSpec::Halton(self.halton.clone()),
            SamplerType::Grid => SamplerSpec::Grid(self.grid.clone()),
            SamplerType::Ce => SamplerSpec::CrossEntropy(self.buckets.params(
                BucketPolicy::CrossEntropy {
                    alpha: self.buckets.alpha,
                },
            )),
            SamplerType::Eg => SamplerSpec::EpsilonGreedy(self.buckets.params(
                BucketPolicy::EpsilonGreedy {
                    epsilon: self.buckets.epsilon,
                },
            )),
            SamplerType::Mab => SamplerSpec::MultiArmedBandit(self.buckets.params(
                BucketPolicy::Ucb {
                    exploration: self.buckets.exploration,
                },
            )),
            SamplerType::Glis => SamplerSpec::Glis(self.glis.clone()),
            SamplerType::Sa => {
                let s = &self.annealing;
                let mut params = AnnealingParams::new(need_loss(loss)?);
                params.initial_temperature = s.initial_temperature;
                params.decay_rate = s.decay_rate;
                params.iterations = s.iterations;
                params.num_epochs = s.num_epochs;
                params.reset_temperature = s.reset_temperature;
                SamplerSpec::SimulatedAnnealing(params)
            }
            SamplerType::Bo => {
                let s = &self.bayes_opt;
                let mut params = BayesOptParams::new(need_loss(loss)?);
                params.init_num = s.init_num;
                params.candidates = s.candidates;
                params.length_scale = s.length_scale;
                params.noise = s.noise;
                params.xi = s.xi;
                SamplerSpec::BayesOpt(params)
            }
        })
    }
}

fn factory<F>(f: F) -> SamplerFactory
where
    F: Fn(Domain) -> Result<Box<dyn DomainSampler>, SamplingError> + 'static,
{
    Box::new(f)
}

fn random_factory() -> SamplerFactory {
    factory(|d| Ok(Box::new(RandomSampler::new(d))))
}

fn bucket_factory(params: &BucketParams) -> SamplerFactory {
    let params = params.clone();
    factory(move |d| Ok(Box::new(BucketSampler::new(d, &params)?)))
}

/// Build `factory` over the part of `domain` matching `predicate`, and a
/// random sampler over the rest.
fn claim_or_split(
    domain: Domain,
    predicate: DomainPredicate,
    factory: SamplerFactory,
) -> Result<Box<dyn DomainSampler>, SamplingError> {
    if predicate(&domain) {
        return factory(domain);
    }
    Ok(Box::new(SplitSampler::from_predicate(
        domain,
        predicate,
        factory,
        random_factory(),
    )?))
}

fn buckets_over(
    domain: Domain,
    params: &BucketParams,
) -> Result<Box<dyn DomainSampler>, SamplingError> {
    if domain.is_standardizable() {
        return Ok(Box::new(BucketSampler::new(domain, params)?));
    }
    let partition: Vec<(DomainPredicate, SamplerFactory)> = vec![
        (
            Box::new(Domain::is_continuous_standardizable) as DomainPredicate,
            bucket_factory(params),
        ),
        (
            Box::new(Domain::is_discrete_standardizable) as DomainPredicate,
            bucket_factory(params),
        ),
    ];
    Ok(Box::new(SplitSampler::from_partition(
        domain,
        partition,
        Some(random_factory()),
    )?))
}

/// Build the sampler `spec` names over a fixed-dimension `domain`.
pub fn build_domain_sampler(
    domain: Domain,
    spec: &SamplerSpec,
) -> Result<Box<dyn DomainSampler>, SamplingError> {
    let continuous: DomainPredicate = Box::new(Domain::is_continuous_standardizable);
    match spec {
        SamplerSpec::Random => Ok(Box::new(RandomSampler::new(domain))),
        SamplerSpec::Halton(params) => {
            let params = params.clone();
            claim_or_split(
                domain,
                continuous,
                factory(move |d| Ok(Box::new(HaltonSampler::new(d, &params)?))),
            )
        }
        SamplerSpec::Grid(params) => {
            let params = params.clone();
            claim_or_split(
                domain,
                Box::new(Domain::is_standardizable),
                factory(move |d| Ok(Box::new(GridSampler::new(d, &params)?))),
            )
        }
        SamplerSpec::SimulatedAnnealing(params) => {
            let params = params.clone();
            claim_or_split(
                domain,
                continuous,
                factory(move |d| Ok(Box::new(AnnealingSampler::new(d, params.clone())?))),
            )
        }
        SamplerSpec::BayesOpt(params) => {
            let params = params.clone();
            claim_or_split(
                domain,
                continuous,
                factory(move |d| Ok(Box::new(BayesOptSampler::new(d, params.clone())?))),
            )
        }
        SamplerSpec::Glis(params) => {
            let params = params.clone();
            claim_or_split(
                domain,
                continuous,
                factory(move |d| Ok(Box::new(GlisSampler::new(d, &params)?))),
            )
        }
        SamplerSpec::CrossEntropy(params)
        | SamplerSpec::MultiArmedBandit(params)
        | SamplerSpec::EpsilonGreedy(params) => buckets_over(domain, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_domain::Point;

    fn mixed() -> Domain {
        Domain::structure([
            ("speed", Domain::interval(0.0, 30.0).unwrap()),
            ("lane", Domain::discrete_range(0, 3).unwrap()),
            ("weather", Domain::categorical(["rain", "sun"]).unwrap()),
        ])
    }

    #[test]
    fn test_sampler_type_round_trips_through_strings() {
        for t in SamplerType::ALL {
            assert_eq!(t.to_string().parse::<SamplerType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{t}\""));
        }
        assert!("annealing".parse::<SamplerType>().is_err());
    }

    #[test]
    fn test_settings_need_loss_for_bo_and_sa() {
        for t in [SamplerType::Bo, SamplerType::Sa] {
            assert!(SamplerSettings::new(t).into_spec(None).is_err());
            let loss: LossFn = Arc::new(|_: &Point| 0.0);
            let spec = SamplerSettings::new(t).into_spec(Some(loss)).unwrap();
            assert_eq!(spec.sampler_type(), t);
        }
        let spec = SamplerSettings::new(SamplerType::Mab).into_spec(None).unwrap();
        match spec {
            SamplerSpec::MultiArmedBandit(p) => {
                assert_eq!(p.policy, BucketPolicy::Ucb { exploration: 2.0 })
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_settings_parse_with_defaults() {
        let settings: SamplerSettings =
            serde_json::from_str(r#"{"type": "ce", "buckets": {"alpha": 0.5, "buckets": 3}}"#)
                .unwrap();
        assert_eq!(settings.sampler_type, SamplerType::Ce);
        assert_eq!(settings.buckets.thres, 0.0);
        match settings.into_spec(None).unwrap() {
            SamplerSpec::CrossEntropy(p) => {
                assert_eq!(p.policy, BucketPolicy::CrossEntropy { alpha: 0.5 });
                assert_eq!(p.buckets, BucketCount::Uniform(3));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_continuous_sampler_claims_whole_box() {
        let domain = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let s = build_domain_sampler(domain, &SamplerSpec::Halton(HaltonParams::default())).unwrap();
        assert_eq!(s.name(), "halton");
    }

    #[test]
    fn test_mixed_domain_splits() {
        let mut rng = crate::rng::sampler_rng(3, 0);
        for spec in [
            SamplerSpec::Halton(HaltonParams::default()),
            SamplerSpec::Grid(GridParams::default()),
            SamplerSpec::CrossEntropy(BucketParams::cross_entropy()),
            SamplerSpec::EpsilonGreedy(BucketParams::epsilon_greedy()),
            SamplerSpec::Glis(GlisParams::default()),
        ] {
            let mut s = build_domain_sampler(mixed(), &spec).unwrap();
            assert_eq!(s.name(), "split");
            for i in 0..10 {
                let p = s.next_sample(crate::DrawId(i), &mut rng).unwrap();
                assert!(mixed().contains(&p), "{spec:?} produced {p}");
            }
        }
    }
}
