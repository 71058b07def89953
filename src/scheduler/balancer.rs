//! Least-loaded worker selection

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A worker and its current load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLoad {
    pub name: String,

    /// Topologies currently assigned
    pub weight: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalancerError {
    #[error("Load balancer needs at least one worker")]
    NoWorkers,

    #[error("Worker listed twice: {0}")]
    DuplicateWorker(String),
}

/// Online greedy least-loaded assignment
///
/// `next()` hands out the lightest worker (ties broken by name) and counts
/// the pick against it, so a run of calls over equal weights round-robins in
/// name order.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    workers: Vec<WorkerLoad>,
}

impl LoadBalancer {
    pub fn new<I, S>(workers: I) -> Result<Self, BalancerError>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let workers: Vec<WorkerLoad> = workers
            .into_iter()
            .map(|(name, weight)| WorkerLoad {
                name: name.into(),
                weight,
            })
            .collect();

        if workers.is_empty() {
            return Err(BalancerError::NoWorkers);
        }

        let mut seen = HashSet::new();
        for worker in &workers {
            if !seen.insert(worker.name.as_str()) {
                return Err(BalancerError::DuplicateWorker(worker.name.clone()));
            }
        }

        let mut balancer = Self { workers };
        balancer.sort();
        Ok(balancer)
    }

    fn sort(&mut self) {
        self.workers
            .sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.name.cmp(&b.name)));
    }

    /// Pick the least-loaded worker and add one to its weight
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> String {
        // Non-empty since construction
        let head = &mut self.workers[0];
        head.weight += 1;
        let name = head.name.clone();
        self.sort();
        name
    }

    /// Current loads, lightest first
    pub fn loads(&self) -> &[WorkerLoad] {
        &self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ties_break_by_name_then_weight() {
        let mut balancer = LoadBalancer::new([("a", 0), ("b", 0)]).unwrap();
        assert_eq!(balancer.next(), "a");
        assert_eq!(balancer.next(), "b");
        assert_eq!(balancer.next(), "a");
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut balancer = LoadBalancer::new([("b", 0), ("a", 0)]).unwrap();
        assert_eq!(balancer.next(), "a");
    }

    #[test]
    fn test_starts_with_lightest() {
        let mut balancer = LoadBalancer::new([("a", 3), ("b", 1), ("c", 1)]).unwrap();
        assert_eq!(balancer.next(), "b");
        assert_eq!(balancer.next(), "c");
        assert_eq!(balancer.next(), "b");
        assert_eq!(balancer.next(), "c");
        assert_eq!(balancer.next(), "a");
    }

    #[test]
    fn test_empty_list_rejected() {
        let result = LoadBalancer::new(Vec::<(String, usize)>::new());
        assert_eq!(result.unwrap_err(), BalancerError::NoWorkers);
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = LoadBalancer::new([("a", 0), ("a", 1)]);
        assert_eq!(
            result.unwrap_err(),
            BalancerError::DuplicateWorker("a".to_string())
        );
    }

    proptest! {
        #[test]
        fn prop_equal_start_stays_within_one(n_workers in 1usize..8, picks in 0usize..64) {
            let names: Vec<String> = (0..n_workers).map(|i| format!("w{i}")).collect();
            let mut balancer = LoadBalancer::new(names.iter().map(|n| (n.clone(), 0))).unwrap();
            for _ in 0..picks {
                balancer.next();
            }

            let weights: Vec<usize> = balancer.loads().iter().map(|w| w.weight).collect();
            let max = *weights.iter().max().unwrap();
            let min = *weights.iter().min().unwrap();
            prop_assert!(max - min <= 1);
            prop_assert_eq!(weights.iter().sum::<usize>(), picks);
        }

        #[test]
        fn prop_pick_is_always_a_minimum(weights in proptest::collection::vec(0usize..10, 1..8)) {
            let input: Vec<(String, usize)> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("w{i}"), *w))
                .collect();
            let min = *weights.iter().min().unwrap();

            let mut balancer = LoadBalancer::new(input.clone()).unwrap();
            let picked = balancer.next();
            let original = input.iter().find(|(n, _)| *n == picked).unwrap().1;
            prop_assert_eq!(original, min);
        }

        #[test]
        fn prop_deterministic(weights in proptest::collection::vec(0usize..5, 1..6), picks in 1usize..20) {
            let input: Vec<(String, usize)> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("w{i}"), *w))
                .collect();

            let mut a = LoadBalancer::new(input.clone()).unwrap();
            let mut b = LoadBalancer::new(input).unwrap();
            for _ in 0..picks {
                prop_assert_eq!(a.next(), b.next());
            }
        }
    }
}
