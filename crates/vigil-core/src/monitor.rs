//! Contracts for the external evaluator and the specification monitor.
//!
//! The evaluator turns a sample into an opaque trajectory (or reports it
//! infeasible); the monitor scores that trajectory with a robustness value
//! where non-positive means the specification was violated.

use serde::{Deserialize, Serialize};
use vigil_domain::Point;

/// Result of evaluating one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome<T> {
    Completed(T),
    /// The sample could not be simulated; it is redrawn, not recorded.
    Infeasible,
}

/// Runs a sample through the system under test.
pub trait Evaluator<T> {
    fn evaluate(&mut self, point: &Point) -> EvalOutcome<T>;
}

impl<T, F> Evaluator<T> for F
where
    F: FnMut(&Point) -> EvalOutcome<T>,
{
    fn evaluate(&mut self, point: &Point) -> EvalOutcome<T> {
        self(point)
    }
}

/// Robustness of one trajectory: one value, or one per objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Robustness {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Robustness {
    /// Number of objectives this value scores.
    pub fn width(&self) -> usize {
        match self {
            Robustness::Scalar(_) => 1,
            Robustness::Vector(v) => v.len(),
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Robustness::Scalar(r) => std::slice::from_ref(r),
            Robustness::Vector(v) => v,
        }
    }
}

impl From<f64> for Robustness {
    fn from(rho: f64) -> Self {
        Robustness::Scalar(rho)
    }
}

impl From<Vec<f64>> for Robustness {
    fn from(rhos: Vec<f64>) -> Self {
        Robustness::Vector(rhos)
    }
}

/// Scores a trajectory against the specification.
pub trait Monitor<T> {
    fn robustness(&self, trajectory: &T) -> Robustness;
}

impl<T, F> Monitor<T> for F
where
    F: Fn(&T) -> Robustness,
{
    fn robustness(&self, trajectory: &T) -> Robustness {
        self(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_implement_contracts() {
        let mut evaluator = |p: &Point| match p.scalar() {
            Some(x) if x >= 0.0 => EvalOutcome::Completed(x),
            _ => EvalOutcome::Infeasible,
        };
        let monitor = |x: &f64| Robustness::from(*x - 1.0);

        let out = Evaluator::evaluate(&mut evaluator, &Point::from(vigil_domain::Value::Real(3.0)));
        let EvalOutcome::Completed(traj) = out else {
            panic!("expected a trajectory");
        };
        assert_eq!(monitor.robustness(&traj), Robustness::Scalar(2.0));
        assert_eq!(
            Evaluator::evaluate(&mut evaluator, &Point::from(vigil_domain::Value::Real(-1.0))),
            EvalOutcome::Infeasible
        );
    }

    #[test]
    fn test_robustness_views() {
        let v = Robustness::from(vec![1.0, -2.0]);
        assert_eq!(v.width(), 2);
        assert_eq!(v.values(), &[1.0, -2.0]);
        assert_eq!(Robustness::Scalar(0.5).values(), &[0.5]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,-2.0]");
    }
}
