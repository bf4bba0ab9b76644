use super::Factorizer;
use crate::{error::RequestError, resolver::EndpointReader};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Failed requests, by category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub unresolved: u64,
    pub transport: u64,
    pub body: u64,
    pub status: u64,
    pub decode: u64,
}

impl FailureCounts {
    pub fn record(&mut self, err: &RequestError) {
        let slot = match err {
            RequestError::Unresolved => &mut self.unresolved,
            RequestError::Transport(_) => &mut self.transport,
            RequestError::Body(_) => &mut self.body,
            RequestError::Status { .. } => &mut self.status,
            RequestError::Decode(_) => &mut self.decode,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.unresolved + self.transport + self.body + self.status + self.decode
    }
}

impl std::ops::AddAssign for FailureCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.unresolved += rhs.unresolved;
        self.transport += rhs.transport;
        self.body += rhs.body;
        self.status += rhs.status;
        self.decode += rhs.decode;
    }
}

/// Request counters owned by a single worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub issued: u64,
    pub succeeded: u64,
    pub failed: FailureCounts,
}

/// What a worker hands back once its loop ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub seed: i64,
    pub stats: WorkerStats,
    /// `true` if the loop stopped on cancellation before finishing.
    pub cancelled: bool,
}

/// Shuffles a private copy of `numbers`, driven only by `seed`.
pub fn permute(numbers: &[i64], seed: u64) -> Vec<i64> {
    let mut sequence = numbers.to_vec();
    sequence.shuffle(&mut StdRng::seed_from_u64(seed));
    sequence
}

/// Number of requests a worker issues for a target of `requests` over a
/// workload of `len` numbers. A target of 0 means one pass.
pub fn iterations(requests: usize, len: usize) -> usize {
    if len == 0 { 0 } else { requests.max(len) }
}

/// One worker: its index, derived seed and private permutation.
#[derive(Debug, Clone)]
pub struct WorkerTask {
    index: usize,
    seed: i64,
    sequence: Vec<i64>,
    iterations: usize,
}

impl WorkerTask {
    /// Builds worker `index`, seeded with `base_seed + index`. Negative
    /// seeds are valid and map onto the RNG seed bit for bit.
    pub fn new(index: usize, base_seed: i64, numbers: &[i64], requests: usize) -> Self {
        let seed = base_seed.wrapping_add(index as i64);
        Self {
            index,
            seed,
            sequence: permute(numbers, seed as u64),
            iterations: iterations(requests, numbers.len()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn sequence(&self) -> &[i64] {
        &self.sequence
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    // Only reached when `iterations > 0`, i.e. the sequence is non-empty.
    fn number_at(&self, i: usize) -> i64 {
        self.sequence[i % self.sequence.len()]
    }

    /// Issues this worker's requests one at a time, in permutation order.
    ///
    /// The token is checked before every iteration; a request already in
    /// flight is allowed to finish. Per-request failures are counted and never
    /// end the loop.
    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.index, seed = self.seed))]
    pub async fn run<F: Factorizer>(
        self,
        factorizer: Arc<F>,
        endpoint: EndpointReader,
        token: CancellationToken,
    ) -> WorkerReport {
        let mut stats = WorkerStats::default();
        let mut cancelled = false;

        for i in 0..self.iterations {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let number = self.number_at(i);
            stats.issued += 1;
            let outcome = match endpoint.current() {
                Some(address) => factorizer.factorize(&address, number).await,
                None => Err(RequestError::Unresolved),
            };

            match outcome {
                Ok(factors) => {
                    stats.succeeded += 1;
                    tracing::debug!("({i}) {number} -> {factors:?}");
                }
                Err(err) => {
                    stats.failed.record(&err);
                    tracing::warn!("({i}) {number} failed: {err}");
                }
            }
        }

        if cancelled {
            tracing::info!(issued = stats.issued, "Worker cancelled");
        } else {
            tracing::debug!(issued = stats.issued, "Worker finished");
        }

        WorkerReport {
            worker: self.index,
            seed: self.seed,
            stats,
            cancelled,
        }
    }
}
