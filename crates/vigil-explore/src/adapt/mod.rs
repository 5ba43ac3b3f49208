//! Feedback-driven samplers.

pub mod annealing;
pub mod bayes_opt;
pub mod buckets;
pub mod glis;
pub mod gp;

pub use annealing::{AnnealingParams, AnnealingSampler, LossFn};
pub use bayes_opt::{BayesOptParams, BayesOptSampler};
pub use buckets::{BucketCount, BucketParams, BucketPolicy, BucketSampler};
pub use glis::{GlisParams, GlisSampler, RbfIdwOptimizer, SurrogateOptimizer};
