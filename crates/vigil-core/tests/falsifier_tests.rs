use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use vigil_domain::{Domain, Point};
use vigil_explore::sampler::GridParams;
use vigil_explore::SamplerSpec;
use vigil_core::{
    AnalysisParams, EvalOutcome, FalsifierConfig, Falsifier, FalsifyError, KClosestParams,
    ParallelConfig, ParallelFalsifier, Phase, PriorityGraph, RandomParams, Robustness, StopReason,
    TableKind,
};

fn line() -> Domain {
    Domain::interval(0.0, 10.0).unwrap()
}

fn x_of(p: &Point) -> f64 {
    p.scalar().unwrap()
}

fn identity(p: &Point) -> EvalOutcome<f64> {
    EvalOutcome::Completed(x_of(p))
}

fn shifted(x: &f64) -> Robustness {
    Robustness::from(*x - 5.0)
}

fn config(n_iters: Option<u64>) -> FalsifierConfig {
    FalsifierConfig {
        n_iters,
        ..Default::default()
    }
}

#[test]
fn test_runs_exactly_n_iters() {
    let calls = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&calls);
    let evaluator = move |p: &Point| {
        counter.set(counter.get() + 1);
        identity(p)
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, evaluator, shifted, config(Some(50))).unwrap();
    assert_eq!(falsifier.phase(), Phase::Init);

    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 50);
    assert_eq!(report.stop_reason, StopReason::IterationLimit);
    assert_eq!(calls.get(), 50);
    assert_eq!(falsifier.samples().len(), 50);
    assert_eq!(falsifier.phase(), Phase::TerminatedByBudget);

    let errors = falsifier.error_table().unwrap().len();
    let safe = falsifier.safe_table().unwrap().len();
    assert_eq!(errors + safe, 50);
    assert_eq!(errors as u64, report.counterexamples);

    assert!(falsifier.run().is_err());
}

#[test]
fn test_grid_exhaustion_ends_run() {
    let spec = SamplerSpec::Grid(GridParams { points_per_dim: 7 });
    let mut falsifier = Falsifier::new(line(), spec, identity, shifted, config(None)).unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 7);
    assert_eq!(report.stop_reason, StopReason::SamplerExhausted);
    assert_eq!(falsifier.phase(), Phase::TerminatedBySamplerExhaustion);

    let xs: Vec<f64> = falsifier.samples().iter().map(x_of).collect();
    assert!((xs[0] - 0.0).abs() < 1e-12);
    assert!((xs[6] - 10.0).abs() < 1e-12);
}

#[test]
fn test_boundary_value_is_counterexample() {
    // grid over [0, 10] with 3 points hits x = 5 exactly
    let spec = SamplerSpec::Grid(GridParams { points_per_dim: 3 });
    let mut falsifier = Falsifier::new(line(), spec, identity, shifted, config(None)).unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 3);
    assert_eq!(report.counterexamples, 2);

    let table = falsifier.error_table().unwrap();
    let rhos: Vec<f64> = table.rows().iter().map(|r| r.rho.values()[0]).collect();
    assert_eq!(rhos, vec![-5.0, 0.0]);
}

#[test]
fn test_error_rate_tracks_violating_region() {
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config(Some(200))).unwrap();
    let report = falsifier.run().unwrap();
    let errors = falsifier.error_table().unwrap().len();
    assert!((70..=130).contains(&errors), "error rows: {errors}");
    assert_eq!(errors as u64, report.counterexamples);

    for row in falsifier.error_table().unwrap().rows() {
        assert!(row.rho.values()[0] <= 0.0);
        assert!(x_of(&falsifier.samples()[row.sample_index]) <= 5.0);
    }
    for row in falsifier.safe_table().unwrap().rows() {
        assert!(row.rho.values()[0] > 0.0);
    }

    let (lo, hi) = falsifier.confidence_interval(0.95).unwrap();
    let rate = errors as f64 / 200.0;
    assert!(lo < rate && rate < hi);
    assert!(lo > 0.2 && hi < 0.8);
}

#[test]
fn test_counterexample_limit_stops_early() {
    let config = FalsifierConfig {
        n_iters: Some(1000),
        max_counterexamples: Some(3),
        ..Default::default()
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config).unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.counterexamples, 3);
    assert_eq!(report.stop_reason, StopReason::CounterexampleLimit);
    assert!(report.iterations < 1000);
}

#[test]
fn test_infeasible_samples_are_not_recorded() {
    // every other evaluation is infeasible
    let flip = Rc::new(Cell::new(false));
    let state = Rc::clone(&flip);
    let evaluator = move |p: &Point| {
        state.set(!state.get());
        if state.get() {
            EvalOutcome::Infeasible
        } else {
            identity(p)
        }
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, evaluator, shifted, config(Some(20))).unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 20);
    assert_eq!(report.rejections, 20);
    let recorded = falsifier.error_table().unwrap().len() + falsifier.safe_table().unwrap().len();
    assert_eq!(recorded, 20);
}

#[test]
fn test_rejection_limit_is_fatal() {
    let config = FalsifierConfig {
        max_consecutive_rejections: 10,
        ..Default::default()
    };
    let never = |_: &Point| EvalOutcome::<f64>::Infeasible;
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, never, shifted, config).unwrap();
    match falsifier.run() {
        Err(FalsifyError::RejectionLimit { limit, .. }) => assert_eq!(limit, 10),
        other => panic!("expected rejection limit, got {other:?}"),
    }
    assert!(falsifier.samples().is_empty());
}

#[test]
fn test_time_budget_stops_unbounded_run() {
    let config = FalsifierConfig {
        n_iters: None,
        max_time: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config).unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.stop_reason, StopReason::TimeLimit);
    assert!(report.iterations > 0);
}

#[test]
fn test_tables_persist_incrementally() {
    let dir = tempfile::tempdir().unwrap();
    let error_path = dir.path().join("error.csv");
    let safe_path = dir.path().join("safe.csv");
    let config = FalsifierConfig {
        n_iters: Some(30),
        error_table_path: Some(error_path.clone()),
        safe_table_path: Some(safe_path.clone()),
        ..Default::default()
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config).unwrap();
    falsifier.run().unwrap();

    let errors = std::fs::read_to_string(&error_path).unwrap();
    let lines: Vec<&str> = errors.lines().collect();
    assert_eq!(lines[0], "index,[0],rho");
    assert_eq!(lines.len() - 1, falsifier.error_table().unwrap().len());

    let safe = std::fs::read_to_string(&safe_path).unwrap();
    assert_eq!(safe.lines().count() - 1, falsifier.safe_table().unwrap().len());
    assert_eq!(lines.len() - 1 + safe.lines().count() - 1, 30);
}

#[test]
fn test_disabled_safe_table() {
    let config = FalsifierConfig {
        n_iters: Some(10),
        save_safe_table: false,
        ..Default::default()
    };
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config).unwrap();
    falsifier.run().unwrap();
    assert!(falsifier.safe_table().is_none());
    assert!(falsifier.error_table().is_some());
}

#[test]
fn test_analysis_maps_rows_to_samples() {
    let mut falsifier =
        Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config(Some(60))).unwrap();
    falsifier.run().unwrap();

    let params = AnalysisParams {
        k_closest: Some(KClosestParams {
            columns: None,
            k: Some(4),
        }),
        random: Some(RandomParams { count: 3 }),
        pca: None,
    };
    let analysis = falsifier.analyze(&params, Some(TableKind::Error)).unwrap();
    assert_eq!(falsifier.phase(), Phase::Done);
    assert!(analysis.safe.is_none());

    let error = analysis.error.unwrap();
    assert_eq!(error.k_closest_samples.len(), 4);
    assert_eq!(error.random_samples.len(), 3);
    for p in error.k_closest_samples.iter().chain(&error.random_samples) {
        assert!(x_of(p) <= 5.0);
    }
}

#[test]
fn test_priority_graph_controls_verdict() {
    let square = Domain::boxed([(0.0, 1.0), (0.0, 1.0)]).unwrap();
    let eval = |p: &Point| {
        EvalOutcome::Completed((
            p.get(0).and_then(Point::scalar).unwrap(),
            p.get(1).and_then(Point::scalar).unwrap(),
        ))
    };
    // objective 0 fails for x < 0.5, objective 1 fails for y < 0.5
    let monitor = |t: &(f64, f64)| Robustness::from(vec![t.0 - 0.5, t.1 - 0.5]);
    let graph = PriorityGraph::new(2, [(0, 1)]).unwrap();
    let mut falsifier = Falsifier::new(square, SamplerSpec::Random, eval, monitor, config(Some(100)))
        .unwrap()
        .with_priority_graph(graph);
    falsifier.run().unwrap();

    let table = falsifier.error_table().unwrap();
    assert_eq!(table.rho_columns(), vec!["rho[0]", "rho[1]"]);
    for row in table.rows() {
        let r = row.rho.values();
        assert!(r[0] <= 0.0 || r[1] <= 0.0);
    }
    for row in falsifier.safe_table().unwrap().rows() {
        let r = row.rho.values();
        assert!(r[0] > 0.0 && r[1] > 0.0);
    }
}

#[test]
fn test_parallel_records_exactly_n_iters() {
    let mut falsifier = ParallelFalsifier::new(
        line(),
        SamplerSpec::Random,
        |_worker| identity,
        shifted,
        config(Some(40)),
        ParallelConfig { num_workers: 4 },
    )
    .unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 40);
    assert_eq!(falsifier.samples().len(), 40);
    let recorded = falsifier.error_table().unwrap().len() + falsifier.safe_table().unwrap().len();
    assert_eq!(recorded, 40);
    assert_eq!(falsifier.phase(), Phase::TerminatedByBudget);
}

#[test]
fn test_parallel_grid_drains_on_exhaustion() {
    let spec = SamplerSpec::Grid(GridParams { points_per_dim: 9 });
    let mut falsifier = ParallelFalsifier::new(
        line(),
        spec,
        |_worker| identity,
        shifted,
        config(None),
        ParallelConfig::default(),
    )
    .unwrap();
    let report = falsifier.run().unwrap();
    assert_eq!(report.iterations, 9);
    assert_eq!(report.stop_reason, StopReason::SamplerExhausted);
}

#[test]
fn test_parallel_worker_panic_is_reported() {
    let mut falsifier = ParallelFalsifier::new(
        line(),
        SamplerSpec::Random,
        |_worker| {
            |_: &Point| -> EvalOutcome<f64> { panic!("simulator crashed") }
        },
        shifted,
        config(Some(5)),
        ParallelConfig { num_workers: 2 },
    )
    .unwrap();
    match falsifier.run() {
        Err(FalsifyError::Worker(msg)) => assert!(msg.contains("simulator crashed")),
        other => panic!("expected worker failure, got {other:?}"),
    }
}

#[test]
fn test_invalid_config_rejected() {
    assert!(Falsifier::new(line(), SamplerSpec::Random, identity, shifted, config(Some(0))).is_err());
    assert!(ParallelFalsifier::new(
        line(),
        SamplerSpec::Random,
        |_worker| identity,
        shifted,
        config(Some(5)),
        ParallelConfig { num_workers: 0 },
    )
    .is_err());
}
