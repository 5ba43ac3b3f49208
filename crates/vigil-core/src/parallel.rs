//! Thread-parallel falsification.
//!
//! Worker threads each own one evaluator and pull jobs from a shared
//! crossbeam channel. The coordinating thread keeps the sampler, the monitor
//! and the tables. It applies feedback in completion order and issues one new
//! draw for every finished job, so the sampler never sees more than
//! `num_workers` outstanding draws.

use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use vigil_domain::{Domain, Point};
use vigil_explore::{DrawId, FeatureSampler, Feedback, SamplerSpec};

use crate::config::{AnalysisParams, FalsifierConfig, ParallelConfig};
use crate::error::FalsifyError;
use crate::error_table::ErrorTable;
use crate::falsifier::{FalsificationAnalysis, FalsificationReport, Phase, RunRecorder, TableKind};
use crate::limits::{BudgetChecker, StopReason};
use crate::monitor::{EvalOutcome, Evaluator, Monitor};
use crate::priority::PriorityGraph;

type Job = (DrawId, Point);
type Completion<T> = (DrawId, Result<EvalOutcome<T>, String>);

/// Falsifier that evaluates samples on `num_workers` threads.
///
/// `factory` is called once per worker with the worker index.
pub struct ParallelFalsifier<T, E, M, F> {
    config: FalsifierConfig,
    parallel: ParallelConfig,
    sampler: FeatureSampler,
    factory: F,
    monitor: M,
    recorder: RunRecorder,
    phase: Phase,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E, M, F> ParallelFalsifier<T, E, M, F>
where
    T: Send + 'static,
    E: Evaluator<T> + Send + 'static,
    M: Monitor<T>,
    F: Fn(usize) -> E,
{
    pub fn new(
        domain: Domain,
        spec: SamplerSpec,
        factory: F,
        monitor: M,
        config: FalsifierConfig,
        parallel: ParallelConfig,
    ) -> Result<Self, FalsifyError> {
        let sampler = FeatureSampler::from_spec(domain, spec, config.seed);
        Self::with_sampler(sampler, factory, monitor, config, parallel)
    }

    pub fn with_sampler(
        sampler: FeatureSampler,
        factory: F,
        monitor: M,
        config: FalsifierConfig,
        parallel: ParallelConfig,
    ) -> Result<Self, FalsifyError> {
        config.validate()?;
        if parallel.num_workers == 0 {
            return Err(FalsifyError::Config(
                "num_workers must be positive".to_string(),
            ));
        }
        let recorder = RunRecorder::new(sampler.domain(), &config);
        Ok(Self {
            config,
            parallel,
            sampler,
            factory,
            monitor,
            recorder,
            phase: Phase::Init,
            _marker: PhantomData,
        })
    }

    pub fn with_priority_graph(mut self, graph: PriorityGraph) -> Self {
        self.recorder.set_priority(graph);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sampler(&self) -> &FeatureSampler {
        &self.sampler
    }

    pub fn samples(&self) -> &[Point] {
        self.recorder.samples()
    }

    pub fn error_table(&self) -> Option<&ErrorTable> {
        self.recorder.error_table()
    }

    pub fn safe_table(&self) -> Option<&ErrorTable> {
        self.recorder.safe_table()
    }

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

    fn spawn_workers(&self, jobs: &Receiver<Job>, done: &Sender<Completion<T>>) -> Result<(), FalsifyError> {
        for id in 0..self.parallel.num_workers {
            let mut evaluator = (self.factory)(id);
            let jobs = jobs.clone();
            let done = done.clone();
            thread::Builder::new()
                .name(format!("vigil-worker-{id}"))
                .spawn(move || {
                    for (draw, point) in jobs.iter() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            evaluator.evaluate(&point)
                        }))
                        .map_err(panic_message);
                        if done.send((draw, outcome)).is_err() {
                            break;
                        }
                    }
                })?;
        }
        Ok(())
    }

    fn run_loop(&mut self) -> Result<FalsificationReport, FalsifyError> {
        let checker = BudgetChecker::new(self.config.limits());
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (done_tx, done_rx) = channel::unbounded::<Completion<T>>();
        self.spawn_workers(&job_rx, &done_tx)?;
        drop(done_tx);
        tracing::info!(
            workers = self.parallel.num_workers,
            n_iters = ?self.config.n_iters,
            "parallel falsification started"
        );

        let mut in_flight: BTreeMap<DrawId, Point> = BTreeMap::new();
        let mut exhausted = false;
        let mut consecutive_rejections = 0usize;

        let stop_reason = loop {
            while !exhausted && in_flight.len() < self.parallel.num_workers {
                match self.sampler.next_sample() {
                    Ok((draw, point)) => {
                        job_tx
                            .send((draw, point.clone()))
                            .map_err(|_| FalsifyError::Worker("job queue closed".to_string()))?;
                        in_flight.insert(draw, point);
                    }
                    Err(e) if e.is_exhaustion() => {
                        tracing::info!("sampler exhausted, draining in-flight jobs");
                        exhausted = true;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if in_flight.is_empty() {
                break StopReason::SamplerExhausted;
            }

            let received = match checker.remaining_time() {
                Some(left) => match done_rx.recv_timeout(left) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => break StopReason::TimeLimit,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(FalsifyError::Worker("all workers exited".to_string()))
                    }
                },
                None => done_rx
                    .recv()
                    .map_err(|_| FalsifyError::Worker("all workers exited".to_string()))?,
            };

            let (draw, outcome) = received;
            let Some(point) = in_flight.remove(&draw) else {
                tracing::warn!(%draw, "completion for unknown draw ignored");
                continue;
            };
            match outcome.map_err(FalsifyError::Worker)? {
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
                    let verdict = self.recorder.record(point, rho)?;
                    self.sampler.update(draw, Feedback::Value(verdict.feedback));
                    tracing::debug!(%draw, rho = verdict.feedback, falsified = verdict.falsified, "sample recorded");
                }
            }

            if let Some(reason) =
                checker.check(self.recorder.iterations(), self.recorder.counterexamples())
            {
                break reason;
            }
        };

        // Workers finish their current job and exit once the queue closes.
        drop(job_tx);
        if !in_flight.is_empty() {
            tracing::debug!(discarded = in_flight.len(), "in-flight draws abandoned");
        }

        let report = self.recorder.report(stop_reason, checker.elapsed());
        tracing::info!(
            iterations = report.iterations,
            counterexamples = report.counterexamples,
            stop_reason = %report.stop_reason,
            "parallel falsification finished"
        );
        Ok(report)
    }

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

    pub fn confidence_interval(&self, level: f64) -> Result<(f64, f64), FalsifyError> {
        self.recorder.confidence_interval(level)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("evaluator panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("evaluator panicked: {s}")
    } else {
        "evaluator panicked".to_string()
    }
}
