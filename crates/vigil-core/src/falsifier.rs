//! The sequential falsification loop.
//!
//! Each iteration draws a sample, evaluates it, scores the trajectory,
//! feeds the verdict back to the sampler and files the sample in the error
//! or safe table. Infeasible evaluations are redrawn without a row. The loop
//! stops on its budgets or when the sampler is exhausted.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, Point};
use vigil_explore::{sampler_rng, DrawId, FeatureSampler, Feedback, SamplerSpec};

use crate::confidence::clopper_pearson;
use crate::config::{AnalysisParams, FalsifierConfig};
use crate::error::FalsifyError;
use crate::error_table::{ErrorTable, TableAnalysis};
use crate::limits::{BudgetChecker, StopReason};
use crate::monitor::{EvalOutcome, Evaluator, Monitor, Robustness};
use crate::priority::{PriorityGraph, Verdict};

/// RNG stream used for table analysis, separate from the sampling stream.
const ANALYSIS_STREAM: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    Running,
    TerminatedByBudget,
    TerminatedBySamplerExhaustion,
    Analyzing,
    Done,
}

/// Which table an analysis runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Error,
    Safe,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsificationReport {
    pub iterations: u64,
    pub counterexamples: u64,
    pub rejections: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

/// Analysis of one table with its row indices resolved to sample points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub analysis: TableAnalysis,
    pub k_closest_samples: Vec<Point>,
    pub random_samples: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FalsificationAnalysis {
    pub error: Option<TableReport>,
    pub safe: Option<TableReport>,
}

/// Classifies scored samples and keeps every recorded sample and table.
pub(crate) struct RunRecorder {
    fal_thres: f64,
    priority: Option<PriorityGraph>,
    samples: Vec<Point>,
    error_table: Option<ErrorTable>,
    safe_table: Option<ErrorTable>,
    error_path: Option<PathBuf>,
    safe_path: Option<PathBuf>,
    counterexamples: u64,
    rejections: u64,
    seed: u64,
}

impl RunRecorder {
    pub(crate) fn new(domain: &Domain, config: &FalsifierConfig) -> Self {
        Self {
            fal_thres: config.fal_thres,
            priority: None,
            samples: Vec::new(),
            error_table: config.save_error_table.then(|| ErrorTable::new(domain)),
            safe_table: config.save_safe_table.then(|| ErrorTable::new(domain)),
            error_path: config.error_table_path.clone(),
            safe_path: config.safe_table_path.clone(),
            counterexamples: 0,
            rejections: 0,
            seed: config.seed,
        }
    }

    pub(crate) fn set_priority(&mut self, graph: PriorityGraph) {
        self.priority = Some(graph);
    }

    fn classify(&mut self, rho: &Robustness) -> Result<Verdict, FalsifyError> {
        match (rho, &self.priority) {
            (Robustness::Scalar(r), None) => Ok(Verdict::scalar(*r, self.fal_thres)),
            (rho, Some(graph)) => Ok(graph.evaluate(rho.values(), self.fal_thres)?),
            (Robustness::Vector(v), None) => {
                let graph = PriorityGraph::independent(v.len());
                let verdict = graph.evaluate(v, self.fal_thres)?;
                self.priority = Some(graph);
                Ok(verdict)
            }
        }
    }

    /// Classify and file one evaluated sample; returns its verdict.
    pub(crate) fn record(&mut self, point: Point, rho: Robustness) -> Result<Verdict, FalsifyError> {
        let verdict = self.classify(&rho)?;
        let index = self.samples.len();
        let (table, path) = if verdict.falsified {
            self.counterexamples += 1;
            (self.error_table.as_mut(), self.error_path.as_deref())
        } else {
            (self.safe_table.as_mut(), self.safe_path.as_deref())
        };
        if let Some(table) = table {
            table.append(&point, rho, index)?;
            if let Some(path) = path {
                table.append_csv(path)?;
            }
        }
        self.samples.push(point);
        Ok(verdict)
    }

    pub(crate) fn reject(&mut self) {
        self.rejections += 1;
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.samples.len() as u64
    }

    pub(crate) fn counterexamples(&self) -> u64 {
        self.counterexamples
    }

    pub(crate) fn report(&self, stop_reason: StopReason, elapsed: Duration) -> FalsificationReport {
        FalsificationReport {
            iterations: self.iterations(),
            counterexamples: self.counterexamples,
            rejections: self.rejections,
            stop_reason,
            elapsed,
        }
    }

    pub(crate) fn samples(&self) -> &[Point] {
        &self.samples
    }

    pub(crate) fn error_table(&self) -> Option<&ErrorTable> {
        self.error_table.as_ref()
    }

    pub(crate) fn safe_table(&self) -> Option<&ErrorTable> {
        self.safe_table.as_ref()
    }

    pub(crate) fn analyze(
        &self,
        params: &AnalysisParams,
        which: Option<TableKind>,
    ) -> Result<FalsificationAnalysis, FalsifyError> {
        let mut rng = sampler_rng(self.seed, ANALYSIS_STREAM);
        let mut report = |table: Option<&ErrorTable>| -> Result<Option<TableReport>, FalsifyError> {
            let Some(table) = table else {
                return Ok(None);
            };
            let analysis = table.analyze(params, &mut rng)?;
            let resolve = |rows: &Option<Vec<usize>>| -> Vec<Point> {
                rows.iter()
                    .flatten()
                    .filter_map(|&r| table.rows().get(r))
                    .filter_map(|row| self.samples.get(row.sample_index).cloned())
                    .collect()
            };
            Ok(Some(TableReport {
                k_closest_samples: resolve(&analysis.k_closest),
                random_samples: resolve(&analysis.random),
                analysis,
            }))
        };
        let error = match which {
            None | Some(TableKind::Error) => report(self.error_table.as_ref())?,
            Some(TableKind::Safe) => None,
        };
        let safe = match which {
            None | Some(TableKind::Safe) => report(self.safe_table.as_ref())?,
            Some(TableKind::Error) => None,
        };
        Ok(FalsificationAnalysis { error, safe })
    }

    pub(crate) fn confidence_interval(&self, level: f64) -> Result<(f64, f64), FalsifyError> {
        Ok(clopper_pearson(self.counterexamples, self.iterations(), level)?)
    }
}

/// Sequential falsifier over evaluator `E` producing trajectories `T`.
pub struct Falsifier<T, E, M> {
    config: FalsifierConfig,
    sampler: FeatureSampler,
    evaluator: E,
    monitor: M,
    recorder: RunRecorder,
    phase: Phase,
    _trajectory: PhantomData<fn() -> T>,
}

impl<T, E, M> Falsifier<T, E, M>
where
    E: Evaluator<T>,
    M: Monitor<T>,
{
    /// Build a falsifier sampling `domain` with the sampler `spec` names.
    pub fn new(
        domain: Domain,
        spec: SamplerSpec,
        evaluator: E,
        monitor: M,
        config: FalsifierConfig,
    ) -> Result<Self, FalsifyError> {
        let sampler = FeatureSampler::from_spec(domain, spec, config.seed);
        Self::with_sampler(sampler, evaluator, monitor, config)
    }

    pub fn with_sampler(
        sampler: FeatureSampler,
        evaluator: E,
        monitor: M,
        config: FalsifierConfig,
    ) -> Result<Self, FalsifyError> {
        config.validate()?;
        let recorder = RunRecorder::new(sampler.domain(), &config);
        Ok(Self {
            config,
            sampler,
            evaluator,
            monitor,
            recorder,
            phase: Phase::Init,
            _trajectory: PhantomData,
        })
    }

    /// Judge vector robustness through `graph` instead of treating objectives as independent.
    pub fn with_priority_graph(mut self, graph: PriorityGraph) -> Self {
        self.recorder.set_priority(graph);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &FalsifierConfig {
        &self.config
    }

    pub fn sampler(&self) -> &FeatureSampler {
        &self.sampler
    }

    /// Every recorded sample, in evaluation order.
    pub fn samples(&self) -> &[Point] {
        self.recorder.samples()
    }

    pub fn error_table(&self) -> Option<&ErrorTable> {
        self.recorder.error_table()
    }

    pub fn safe_table(&self) -> Option<&ErrorTable> {
        self.recorder.safe_table()
    }

    /// Run the loop until a budget is reached or the sampler is exhausted.
    pub fn run(&mut self) -> Result<FalsificationReport, FalsifyError> {
        if self.phase != Phase::Init {
            return Err(FalsifyError::Config(
                "falsifier has already run".to_string(),
            ));
        }
        self.phase = Phase::Running;
        let result = self.run_loop();
        self.phase = match &result {
            Ok(report) if report.stop_reason.is_budget() => Phase::TerminatedByBudget,
            Ok(_) => Phase::TerminatedBySamplerExhaustion,
            Err(_) => Phase::Done,
        };
        result
    }

    fn run_loop(&mut self) -> Result<FalsificationReport, FalsifyError> {
        let checker = BudgetChecker::new(self.config.limits());
        tracing::info!(
            n_iters = ?self.config.n_iters,
            max_time = ?self.config.max_time,
            fal_thres = self.config.fal_thres,
            "falsification started"
        );
        let mut consecutive_rejections = 0usize;

        let stop_reason = loop {
            let (draw, point) = match self.sampler.next_sample() {
                Ok(drawn) => drawn,
                Err(e) if e.is_exhaustion() => {
                    tracing::info!("sampler exhausted, ending run");
                    break StopReason::SamplerExhausted;
                }
                Err(e) => return Err(e.into()),
            };

            match self.evaluator.evaluate(&point) {
                EvalOutcome::Infeasible => {
                    self.sampler.update(draw, Feedback::Rejected);
                    self.recorder.reject();
                    consecutive_rejections += 1;
                    tracing::warn!(%draw, consecutive = consecutive_rejections, "sample infeasible");
                    if consecutive_rejections > self.config.max_consecutive_rejections {
                        return Err(FalsifyError::RejectionLimit {
                            domain: self.sampler.domain().describe(),
                            limit: self.config.max_consecutive_rejections,
                        });
                    }
                }
                EvalOutcome::Completed(trajectory) => {
                    consecutive_rejections = 0;
                    let rho = self.monitor.robustness(&trajectory);
                    self.file(draw, point, rho)?;
                }
            }

            if let Some(reason) =
                checker.check(self.recorder.iterations(), self.recorder.counterexamples())
            {
                break reason;
            }
        };

        let report = self.recorder.report(stop_reason, checker.elapsed());
        tracing::info!(
            iterations = report.iterations,
            counterexamples = report.counterexamples,
            rejections = report.rejections,
            stop_reason = %report.stop_reason,
            "falsification finished"
        );
        Ok(report)
    }

    fn file(&mut self, draw: DrawId, point: Point, rho: Robustness) -> Result<(), FalsifyError> {
        let verdict = self.recorder.record(point, rho)?;
        self.sampler.update(draw, Feedback::Value(verdict.feedback));
        tracing::debug!(
            %draw,
            rho = verdict.feedback,
            falsified = verdict.falsified,
            "sample recorded"
        );
        Ok(())
    }

    /// Run k-closest, random and PCA analyses over one table, or both when `which` is `None`.
    pub fn analyze(
        &mut self,
        params: &AnalysisParams,
        which: Option<TableKind>,
    ) -> Result<FalsificationAnalysis, FalsifyError> {
        self.phase = Phase::Analyzing;
        let result = self.recorder.analyze(params, which);
        self.phase = Phase::Done;
        result
    }

    /// Clopper-Pearson interval of the counterexample rate at `level`.
    pub fn confidence_interval(&self, level: f64) -> Result<(f64, f64), FalsifyError> {
        self.recorder.confidence_interval(level)
    }
}
