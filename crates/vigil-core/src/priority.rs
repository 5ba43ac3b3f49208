//! Priority graphs over the objectives of a multi-objective specification.
//!
//! An edge `(a, b)` says objective `a` takes precedence over `b`: `b` only
//! controls the verdict once every ancestor of `b` is satisfied. Ancestor
//! sets and topological levels are computed once at construction.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriorityError {
    #[error("edge ({from}, {to}) names an objective outside 0..{len}")]
    NodeOutOfRange { from: usize, to: usize, len: usize },

    #[error("priority graph has a cycle through objective {0}")]
    Cycle(usize),

    #[error("expected {expected} robustness values, got {found}")]
    WidthMismatch { expected: usize, found: usize },
}

/// How one robustness vector is judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub falsified: bool,
    /// Value fed back to adaptive samplers.
    pub feedback: f64,
    /// Objective that decided the verdict, when one was falsified.
    pub controlling: Option<usize>,
}

impl Verdict {
    /// Verdict of a single-objective value.
    pub fn scalar(rho: f64, thres: f64) -> Self {
        let falsified = rho <= thres;
        Self {
            falsified,
            feedback: rho,
            controlling: falsified.then_some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityGraph {
    len: usize,
    ancestors: Vec<BTreeSet<usize>>,
    levels: Vec<usize>,
}

impl PriorityGraph {
    pub fn new(
        num_objectives: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, PriorityError> {
        let mut children = vec![Vec::new(); num_objectives];
        let mut parents = vec![Vec::new(); num_objectives];
        for (from, to) in edges {
            if from >= num_objectives || to >= num_objectives {
                return Err(PriorityError::NodeOutOfRange {
                    from,
                    to,
                    len: num_objectives,
                });
            }
            if from == to {
                return Err(PriorityError::Cycle(from));
            }
            children[from].push(to);
            parents[to].push(from);
        }

        // Kahn's algorithm; a node's level is one past its deepest parent.
        let mut indegree: Vec<usize> = parents.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..num_objectives).filter(|&n| indegree[n] == 0).collect();
        let mut order = Vec::with_capacity(num_objectives);
        let mut levels = vec![0usize; num_objectives];
        while let Some(n) = queue.pop_front() {
            order.push(n);
            for &c in &children[n] {
                levels[c] = levels[c].max(levels[n] + 1);
                indegree[c] -= 1;
                if indegree[c] == 0 {
                    queue.push_back(c);
                }
            }
        }
        if order.len() < num_objectives {
            let stuck = (0..num_objectives).find(|&n| indegree[n] > 0).unwrap_or(0);
            return Err(PriorityError::Cycle(stuck));
        }

        let mut ancestors = vec![BTreeSet::new(); num_objectives];
        for &n in &order {
            let mut set = BTreeSet::new();
            for &p in &parents[n] {
                set.insert(p);
                set.extend(ancestors[p].iter().copied());
            }
            ancestors[n] = set;
        }

        Ok(Self {
            len: num_objectives,
            ancestors,
            levels,
        })
    }

    /// Graph with no precedence: every objective is top-level.
    pub fn independent(num_objectives: usize) -> Self {
        Self {
            len: num_objectives,
            ancestors: vec![BTreeSet::new(); num_objectives],
            levels: vec![0; num_objectives],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn level(&self, objective: usize) -> Option<usize> {
        self.levels.get(objective).copied()
    }

    pub fn ancestors(&self, objective: usize) -> Option<&BTreeSet<usize>> {
        self.ancestors.get(objective)
    }

    /// Find the controlling objective of `rhos`.
    ///
    /// An objective is active when all of its ancestors are satisfied. The
    /// falsified active objective with the lowest level controls, ties going
    /// to the lowest index. With no controlling objective every objective is
    /// satisfied and the feedback is the smallest value.
    pub fn evaluate(&self, rhos: &[f64], thres: f64) -> Result<Verdict, PriorityError> {
        if rhos.len() != self.len {
            return Err(PriorityError::WidthMismatch {
                expected: self.len,
                found: rhos.len(),
            });
        }
        let satisfied = |i: usize| rhos[i] > thres;
        let controlling = (0..self.len)
            .filter(|&i| !satisfied(i) && self.ancestors[i].iter().all(|&a| satisfied(a)))
            .min_by_key(|&i| (self.levels[i], i));

        Ok(match controlling {
            Some(i) => Verdict {
                falsified: true,
                feedback: rhos[i],
                controlling: Some(i),
            },
            None => Verdict {
                falsified: false,
                feedback: rhos.iter().copied().fold(f64::INFINITY, f64::min),
                controlling: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_cycles_and_bad_nodes() {
        assert!(matches!(
            PriorityGraph::new(3, [(0, 1), (1, 2), (2, 0)]),
            Err(PriorityError::Cycle(_))
        ));
        assert!(matches!(
            PriorityGraph::new(2, [(1, 1)]),
            Err(PriorityError::Cycle(1))
        ));
        assert!(matches!(
            PriorityGraph::new(2, [(0, 5)]),
            Err(PriorityError::NodeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_levels_and_ancestors() {
        let g = PriorityGraph::new(4, [(0, 1), (1, 2), (0, 3)]).unwrap();
        assert_eq!(g.level(0), Some(0));
        assert_eq!(g.level(2), Some(2));
        assert_eq!(g.level(3), Some(1));
        assert_eq!(g.ancestors(2).unwrap().iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_inactive_objectives_do_not_control() {
        // 0 -> 1: objective 1 only counts once 0 is satisfied
        let g = PriorityGraph::new(2, [(0, 1)]).unwrap();
        let v = g.evaluate(&[-1.0, -5.0], 0.0).unwrap();
        assert_eq!(v.controlling, Some(0));
        assert_eq!(v.feedback, -1.0);

        let v = g.evaluate(&[2.0, -5.0], 0.0).unwrap();
        assert_eq!(v.controlling, Some(1));
        assert!(v.falsified);
    }

    #[test]
    fn test_tie_break_lowest_level_then_index() {
        let g = PriorityGraph::independent(3);
        let v = g.evaluate(&[1.0, -0.5, -3.0], 0.0).unwrap();
        assert_eq!(v.controlling, Some(1));
        assert_eq!(v.feedback, -0.5);
    }

    #[test]
    fn test_all_satisfied_feeds_back_minimum() {
        let g = PriorityGraph::new(3, [(0, 2)]).unwrap();
        let v = g.evaluate(&[3.0, 0.5, 1.0], 0.0).unwrap();
        assert!(!v.falsified);
        assert_eq!(v.feedback, 0.5);
        assert!(g.evaluate(&[1.0], 0.0).is_err());
    }

    #[test]
    fn test_boundary_is_falsifying() {
        assert!(Verdict::scalar(0.0, 0.0).falsified);
        assert!(!Verdict::scalar(1e-12, 0.0).falsified);
    }
}
