//! Run budgets and the reasons a falsification run stops.
//!
//! Budgets are checked once per recorded sample. Hitting any of them ends
//! the run normally; the tables collected so far stay usable.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Budgets for a single run. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum number of recorded (evaluated) samples.
    pub n_iters: Option<u64>,
    /// Maximum wall-clock time, measured from the start of the loop.
    pub max_time: Option<Duration>,
    /// Stop once this many counterexamples have been found.
    pub max_counterexamples: Option<u64>,
}

/// Reason a run was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The iteration budget was reached.
    IterationLimit,
    /// The wall-clock budget elapsed.
    TimeLimit,
    /// Enough counterexamples were found.
    CounterexampleLimit,
    /// The sampler produced every point it can produce.
    SamplerExhausted,
}

impl StopReason {
    /// Whether the run ended on one of its budgets rather than on the sampler.
    pub fn is_budget(&self) -> bool {
        !matches!(self, StopReason::SamplerExhausted)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::IterationLimit => "iteration limit reached",
            StopReason::TimeLimit => "time limit reached",
            StopReason::CounterexampleLimit => "counterexample limit reached",
            StopReason::SamplerExhausted => "sampler exhausted",
        };
        f.write_str(s)
    }
}

/// Checks usage against [`RunLimits`].
pub struct BudgetChecker {
    limits: RunLimits,
    start_time: Instant,
}

impl BudgetChecker {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
        }
    }

    /// Returns the reason for stopping, or `None` while every budget holds.
    pub fn check(&self, iterations: u64, counterexamples: u64) -> Option<StopReason> {
        if matches!(self.limits.n_iters, Some(n) if iterations >= n) {
            return Some(StopReason::IterationLimit);
        }
        if matches!(self.limits.max_counterexamples, Some(n) if counterexamples >= n) {
            return Some(StopReason::CounterexampleLimit);
        }
        if self.time_exceeded() {
            return Some(StopReason::TimeLimit);
        }
        None
    }

    pub fn time_exceeded(&self) -> bool {
        matches!(self.limits.max_time, Some(t) if self.start_time.elapsed() >= t)
    }

    /// Time left before the wall-clock budget runs out, if there is one.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.limits
            .max_time
            .map(|t| t.saturating_sub(self.start_time.elapsed()))
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_stops() {
        let checker = BudgetChecker::new(RunLimits::default());
        assert!(checker.check(1_000_000, 1_000_000).is_none());
        assert!(checker.remaining_time().is_none());
    }

    #[test]
    fn test_iteration_limit() {
        let checker = BudgetChecker::new(RunLimits {
            n_iters: Some(50),
            ..Default::default()
        });
        assert!(checker.check(49, 0).is_none());
        assert_eq!(checker.check(50, 0), Some(StopReason::IterationLimit));
    }

    #[test]
    fn test_counterexample_limit() {
        let checker = BudgetChecker::new(RunLimits {
            n_iters: Some(100),
            max_counterexamples: Some(3),
            ..Default::default()
        });
        assert_eq!(checker.check(10, 3), Some(StopReason::CounterexampleLimit));
    }

    #[test]
    fn test_zero_time_budget_is_exceeded() {
        let checker = BudgetChecker::new(RunLimits {
            max_time: Some(Duration::ZERO),
            ..Default::default()
        });
        assert!(checker.time_exceeded());
        assert_eq!(checker.check(0, 0), Some(StopReason::TimeLimit));
        assert_eq!(checker.remaining_time(), Some(Duration::ZERO));
    }

    #[test]
    fn test_stop_reason_display() {
        assert!(StopReason::SamplerExhausted.to_string().contains("exhausted"));
        assert!(!StopReason::SamplerExhausted.is_budget());
        assert!(StopReason::TimeLimit.is_budget());
    }
}
