//! Vigil core: the falsification loop and everything around it.
//!
//! A [`Falsifier`] draws samples from a [`vigil_explore::FeatureSampler`],
//! runs them through an [`Evaluator`], scores the result with a [`Monitor`]
//! and sorts each sample into the error or safe [`ErrorTable`]. Adaptive
//! samplers receive the robustness value as feedback. After a run the tables
//! can be analyzed, and [`clopper_pearson`] bounds the counterexample rate.
//! [`ParallelFalsifier`] does the same on worker threads.

pub mod confidence;
pub mod config;
pub mod error;
pub mod error_table;
pub mod falsifier;
pub mod limits;
pub mod monitor;
pub mod parallel;
pub mod priority;

pub use confidence::{clopper_pearson, StatsError};
pub use config::{AnalysisParams, FalsifierConfig, KClosestParams, PcaParams, ParallelConfig, RandomParams};
pub use error::FalsifyError;
pub use error_table::{ErrorTable, PcaResult, TableAnalysis, TableError};
pub use falsifier::{
    FalsificationAnalysis, FalsificationReport, Falsifier, Phase, TableKind, TableReport,
};
pub use limits::{BudgetChecker, RunLimits, StopReason};
pub use monitor::{EvalOutcome, Evaluator, Monitor, Robustness};
pub use parallel::ParallelFalsifier;
pub use priority::{PriorityError, PriorityGraph, Verdict};
