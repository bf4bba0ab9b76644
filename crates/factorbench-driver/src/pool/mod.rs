//! Worker pool: `T` workers, each with its own deterministic permutation of
//! the workload.
//!
//! Worker `t` is seeded with `S + t`, so its permutation depends only on the
//! base seed and its own index. Worker 0 shuffles identically whether the
//! run has one worker or a hundred. Each worker copies the shared workload
//! before shuffling; the [`WorkloadSet`] itself is never mutated.

mod factorizer;
mod worker;

pub use factorizer::{Factorizer, HttpFactorizer};
pub use worker::{FailureCounts, WorkerReport, WorkerStats, WorkerTask, iterations, permute};

use crate::workload::WorkloadSet;

/// The full set of workers for one run.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    tasks: Vec<WorkerTask>,
}

impl WorkerPool {
    /// Builds `workers` tasks over `workload`, seeded from `seed`, each
    /// issuing `max(requests, workload.len())` requests.
    pub fn new(workload: &WorkloadSet, workers: usize, seed: i64, requests: usize) -> Self {
        let tasks = (0..workers)
            .map(|index| WorkerTask::new(index, seed, workload, requests))
            .collect();
        Self { tasks }
    }

    /// Wraps hand-built tasks, e.g. workers over different workloads.
    pub fn from_tasks(tasks: Vec<WorkerTask>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[WorkerTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<WorkerTask> {
        self.tasks
    }
}
