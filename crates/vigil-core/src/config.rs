//! Run configuration: loop budgets and table options, post-run analysis
//! parameters, and worker settings for the parallel loop.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FalsifyError;
use crate::limits::RunLimits;

/// Configuration of a falsification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FalsifierConfig {
    /// Number of evaluated samples to record. `None` runs until another budget
    /// or the sampler ends the loop.
    pub n_iters: Option<u64>,
    pub max_time: Option<Duration>,
    /// Samples with `rho <= fal_thres` are counterexamples.
    pub fal_thres: f64,
    pub max_counterexamples: Option<u64>,
    pub save_error_table: bool,
    pub save_safe_table: bool,
    /// CSV file the error table is written to as it grows.
    pub error_table_path: Option<PathBuf>,
    pub safe_table_path: Option<PathBuf>,
    /// Infeasible evaluations allowed in a row before the run fails.
    pub max_consecutive_rejections: usize,
    /// Seed of the run RNG.
    pub seed: u64,
}

impl Default for FalsifierConfig {
    fn default() -> Self {
        Self {
            n_iters: Some(1000),
            max_time: None,
            fal_thres: 0.0,
            max_counterexamples: None,
            save_error_table: true,
            save_safe_table: true,
            error_table_path: None,
            safe_table_path: None,
            max_consecutive_rejections: 1000,
            seed: 42,
        }
    }
}

impl FalsifierConfig {
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            n_iters: self.n_iters,
            max_time: self.max_time,
            max_counterexamples: self.max_counterexamples,
        }
    }

    /// Reject settings that make no sense before any sampling begins.
    pub fn validate(&self) -> Result<(), FalsifyError> {
        if !self.fal_thres.is_finite() {
            return Err(FalsifyError::Config(format!(
                "falsification threshold must be finite, got {}",
                self.fal_thres
            )));
        }
        if self.n_iters == Some(0) {
            return Err(FalsifyError::Config("n_iters must be positive".to_string()));
        }
        if self.error_table_path.is_some() && !self.save_error_table {
            return Err(FalsifyError::Config(
                "error_table_path is set but save_error_table is off".to_string(),
            ));
        }
        if self.safe_table_path.is_some() && !self.save_safe_table {
            return Err(FalsifyError::Config(
                "safe_table_path is set but save_safe_table is off".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KClosestParams {
    /// Columns to measure distance over; all columns when `None`.
    pub columns: Option<Vec<String>>,
    /// Size of the cluster; every row when `None`.
    pub k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomParams {
    pub count: usize,
}

impl Default for RandomParams {
    fn default() -> Self {
        Self { count: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaParams {
    pub columns: Option<Vec<String>>,
    pub n_components: usize,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            columns: None,
            n_components: 1,
        }
    }
}

/// Which analyses to run over a table. A `None` entry skips that analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub k_closest: Option<KClosestParams>,
    pub random: Option<RandomParams>,
    pub pca: Option<PcaParams>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            k_closest: Some(KClosestParams::default()),
            random: Some(RandomParams::default()),
            pca: Some(PcaParams::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub num_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { num_workers: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FalsifierConfig::default();
        assert_eq!(config.n_iters, Some(1000));
        assert_eq!(config.fal_thres, 0.0);
        assert!(config.save_error_table && config.save_safe_table);
        assert!(config.validate().is_ok());
        assert_eq!(ParallelConfig::default().num_workers, 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: FalsifierConfig =
            serde_json::from_str(r#"{"n_iters": null, "fal_thres": 0.5}"#).unwrap();
        assert_eq!(config.n_iters, None);
        assert_eq!(config.fal_thres, 0.5);
        assert_eq!(config.max_consecutive_rejections, 1000);

        let params: AnalysisParams = serde_json::from_str(r#"{"pca": null}"#).unwrap();
        assert!(params.pca.is_none());
        assert_eq!(params.random, Some(RandomParams { count: 5 }));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = FalsifierConfig {
            fal_thres: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FalsifierConfig {
            save_safe_table: false,
            safe_table_path: Some(PathBuf::from("safe.csv")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
