//! Run coordinator: fans a [`WorkerPool`] out, supervises it and aggregates
//! the reports.
//!
//! Every run gets a child of the caller's [`CancellationToken`]. The endpoint
//! refresher and all workers observe that token. Whichever of these happens
//! first cancels the whole run:
//!
//! - the caller cancels its token,
//! - the optional deadline elapses,
//! - a worker task dies (panics) instead of returning a report.
//!
//! Every spawned task is awaited before [`run`] returns, refresher included.

use crate::{
    config::{DriverConfig, RunParams, Target},
    error::{CancelCause, RunError},
    pool::{FailureCounts, Factorizer, HttpFactorizer, WorkerPool, WorkerReport},
    resolver::{
        CatalogResolver, Discovery, EndpointHandle, EndpointReader, StaticResolver,
        TargetResolver, spawn_refresher,
    },
    workload,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    task::JoinSet,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

/// Timing knobs of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub refresh_interval: Duration,
    pub first_resolution_timeout: Duration,
    /// Bound on the whole run, measured from its start.
    pub deadline: Option<Duration>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled(CancelCause),
}

/// Aggregate of every worker report of one run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Reports of the workers that returned, ordered by index.
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
    pub outcome: RunOutcome,
}

impl RunResult {
    pub fn issued(&self) -> u64 {
        self.workers.iter().map(|w| w.stats.issued).sum()
    }

    pub fn succeeded(&self) -> u64 {
        self.workers.iter().map(|w| w.stats.succeeded).sum()
    }

    pub fn failed(&self) -> FailureCounts {
        let mut total = FailureCounts::default();
        for report in &self.workers {
            total += report.stats.failed;
        }
        total
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            workers: self.workers.len(),
            issued: self.issued(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            cancelled: match &self.outcome {
                RunOutcome::Completed => None,
                RunOutcome::Cancelled(cause) => Some(cause.clone()),
            },
            per_worker: self.workers.clone(),
        }
    }

    /// Turns a cancelled outcome into [`RunError::Cancelled`].
    pub fn into_result(self) -> Result<Self, RunError> {
        match self.outcome {
            RunOutcome::Completed => Ok(self),
            RunOutcome::Cancelled(cause) => Err(RunError::Cancelled(cause)),
        }
    }
}

/// Serializable projection of a [`RunResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub workers: usize,
    pub issued: u64,
    pub succeeded: u64,
    pub failed: FailureCounts,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<CancelCause>,
    pub per_worker: Vec<WorkerReport>,
}

/// Executes `pool` to completion or cancellation.
///
/// Waits up to `options.first_resolution_timeout` for the first endpoint
/// before any worker starts.
///
/// # Errors
///
/// Returns [`RunError::Unresolved`] if no endpoint was resolved in time and
/// [`RunError::Cancelled`] if `parent` was cancelled during that wait. A run
/// that started is always `Ok`, with its outcome in [`RunResult::outcome`].
pub async fn run<F, D>(
    pool: WorkerPool,
    factorizer: Arc<F>,
    discovery: Arc<D>,
    options: &RunOptions,
    parent: &CancellationToken,
) -> Result<RunResult, RunError>
where
    F: Factorizer,
    D: Discovery,
{
    let started = Instant::now();
    let deadline = options.deadline.map(|bound| started + bound);
    let token = parent.child_token();

    let handle = EndpointHandle::new();
    let mut reader = handle.reader();
    let refresher = spawn_refresher(discovery, handle, options.refresh_interval, token.clone());

    let ready = tokio::select! {
        _ = token.cancelled() => Err(RunError::Cancelled(CancelCause::Caller)),
        _ = sleep_until_some(deadline) => Err(RunError::Cancelled(CancelCause::Deadline)),
        ready = reader.wait_ready(options.first_resolution_timeout) => {
            ready.ok_or(RunError::Unresolved(options.first_resolution_timeout))
        }
    };

    let result = match ready {
        Ok(endpoint) => {
            tracing::info!(workers = pool.len(), "Starting workers against {endpoint}");
            let (workers, cause) = supervise(pool, factorizer, &reader, &token, deadline).await;
            Ok(aggregate(workers, cause, started.elapsed()))
        }
        Err(err) => Err(err),
    };

    token.cancel();
    if let Err(err) = refresher.await {
        tracing::error!("Endpoint refresher failed: {err}");
    }

    if let Ok(result) = &result {
        tracing::info!(
            issued = result.issued(),
            succeeded = result.succeeded(),
            failed = result.failed().total(),
            "Run finished in {:?}: {:?}",
            result.elapsed,
            result.outcome
        );
    }
    result
}

struct Supervised {
    expected: usize,
    reports: Vec<WorkerReport>,
}

async fn supervise<F: Factorizer>(
    pool: WorkerPool,
    factorizer: Arc<F>,
    reader: &EndpointReader,
    token: &CancellationToken,
    deadline: Option<Instant>,
) -> (Supervised, Option<CancelCause>) {
    let expected = pool.len();
    let mut tasks = JoinSet::new();
    let mut indexes = HashMap::with_capacity(expected);
    for task in pool.into_tasks() {
        let index = task.index();
        let abort = tasks.spawn(task.run(factorizer.clone(), reader.clone(), token.clone()));
        indexes.insert(abort.id(), index);
    }

    let mut reports = Vec::with_capacity(expected);
    let mut cause = None;
    loop {
        tokio::select! {
            joined = tasks.join_next_with_id() => match joined {
                None => break,
                Some(Ok((_, report))) => reports.push(report),
                Some(Err(err)) => {
                    let worker = indexes.get(&err.id()).copied().unwrap_or_default();
                    tracing::error!("Worker {worker} died, cancelling run: {err}");
                    cause.get_or_insert(CancelCause::WorkerFailed {
                        worker,
                        reason: err.to_string(),
                    });
                    token.cancel();
                }
            },
            _ = sleep_until_some(deadline), if !token.is_cancelled() => {
                tracing::info!("Run deadline reached, cancelling workers");
                cause.get_or_insert(CancelCause::Deadline);
                token.cancel();
            }
        }
    }

    reports.sort_by_key(|report| report.worker);
    (Supervised { expected, reports }, cause)
}

/// A run counts as cancelled only if some worker stopped early or never
/// reported. Without a recorded cause, the caller cancelled it.
fn aggregate(supervised: Supervised, cause: Option<CancelCause>, elapsed: Duration) -> RunResult {
    let Supervised { expected, reports } = supervised;
    let interrupted = reports.len() < expected || reports.iter().any(|r| r.cancelled);
    let outcome = if interrupted {
        RunOutcome::Cancelled(cause.unwrap_or(CancelCause::Caller))
    } else {
        RunOutcome::Completed
    };
    RunResult {
        workers: reports,
        elapsed,
        outcome,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Production wiring: the configured workload, an HTTP factorizer and the
/// configured endpoint source.
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: Arc<DriverConfig>,
    factorizer: Arc<HttpFactorizer>,
    discovery: Arc<TargetResolver>,
}

impl Coordinator {
    pub fn new(config: DriverConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let discovery = match &config.target {
            Target::Discovery {
                consul_addr,
                service,
            } => TargetResolver::Catalog(CatalogResolver::new(
                http.clone(),
                consul_addr.clone(),
                service.clone(),
            )),
            Target::Static(address) => TargetResolver::Static(StaticResolver::new(address.clone())),
        };

        Ok(Self {
            config: Arc::new(config),
            factorizer: Arc::new(HttpFactorizer::new(http)),
            discovery: Arc::new(discovery),
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Loads the workload and executes one run with `params`.
    ///
    /// # Errors
    ///
    /// Fails before spawning anything if the workload cannot be read or is
    /// empty, and otherwise as [`run`] does.
    pub async fn start(
        &self,
        params: &RunParams,
        token: &CancellationToken,
    ) -> Result<RunResult, RunError> {
        let workload = workload::load(&self.config.workload_path).await?;
        if workload.is_empty() {
            return Err(RunError::EmptyWorkload);
        }

        let seed = params.seed_or(&self.config);
        let workers = params.workers_or(&self.config);
        tracing::info!(
            seed,
            workers,
            requests = params.requests,
            "Starting run over {} numbers",
            workload.len()
        );

        let pool = WorkerPool::new(&workload, workers, seed, params.requests);
        let options = RunOptions {
            refresh_interval: self.config.refresh_interval,
            first_resolution_timeout: self.config.first_resolution_timeout,
            deadline: params.deadline,
        };
        run(
            pool,
            self.factorizer.clone(),
            self.discovery.clone(),
            &options,
            token,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{RequestError, ResolutionError},
        pool::{WorkerTask, permute},
        testing::{spawn_backend, spawn_catalog_for},
        workload::WorkloadSet,
    };
    use factorbench_core::{factor::prime_factors, types::FactorList};
    use std::{
        io::Write,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    const POISON: i64 = 13;

    /// Factorizes locally after a fixed delay; panics on [`POISON`].
    struct Slow {
        delay: Duration,
    }

    impl Factorizer for Slow {
        async fn factorize(&self, _endpoint: &str, number: i64) -> Result<FactorList, RequestError> {
            tokio::time::sleep(self.delay).await;
            assert_ne!(number, POISON, "poisoned input");
            Ok(prime_factors(number))
        }
    }

    /// Static endpoint that counts lookups.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Discovery for Counting {
        async fn resolve(&self) -> Result<String, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("backend:80".into())
        }
    }

    struct Missing;

    impl Discovery for Missing {
        async fn resolve(&self) -> Result<String, ResolutionError> {
            Err(ResolutionError::NotFound {
                service: "nginx".into(),
            })
        }
    }

    fn options(deadline: Option<Duration>) -> RunOptions {
        RunOptions {
            refresh_interval: Duration::from_millis(100),
            first_resolution_timeout: Duration::from_secs(1),
            deadline,
        }
    }

    fn slow(delay_ms: u64) -> Arc<Slow> {
        Arc::new(Slow {
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn pool(numbers: Vec<i64>, workers: usize, requests: usize) -> WorkerPool {
        WorkerPool::new(&WorkloadSet::from(numbers), workers, 42, requests)
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_aggregates_every_worker() {
        let result = run(
            pool(vec![6, 9, 10], 4, 5),
            slow(1),
            Arc::new(Counting::default()),
            &options(None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.workers.len(), 4);
        assert_eq!(result.issued(), 20);
        assert_eq!(result.succeeded(), 20);
        assert_eq!(result.failed().total(), 0);
        let indexes: Vec<usize> = result.workers.iter().map(|w| w.worker).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_the_run() {
        let result = run(
            pool(vec![6, 9, 10], 2, 1_000),
            slow(50),
            Arc::new(Counting::default()),
            &options(Some(Duration::from_millis(120))),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, RunOutcome::Cancelled(CancelCause::Deadline));
        assert!(result.workers.iter().all(|w| w.cancelled));
        assert!(result.issued() < 2_000);
        assert!(matches!(
            result.into_result(),
            Err(RunError::Cancelled(CancelCause::Deadline))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_stops_every_worker() {
        let parent = CancellationToken::new();
        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            canceller.cancel();
        });

        let result = run(
            pool(vec![6, 9, 10], 3, 1_000),
            slow(10),
            Arc::new(Counting::default()),
            &options(None),
            &parent,
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, RunOutcome::Cancelled(CancelCause::Caller));
        assert_eq!(result.workers.len(), 3);
        assert!(result.issued() < 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_worker_cancels_its_siblings() {
        // Worker 0 only has the poisoned number, the others never see it.
        let pool = WorkerPool::from_tasks(vec![
            WorkerTask::new(0, 42, &[POISON], 1),
            WorkerTask::new(1, 42, &[6, 9, 10], 1_000),
        ]);

        let result = run(
            pool,
            slow(10),
            Arc::new(Counting::default()),
            &options(None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        match &result.outcome {
            RunOutcome::Cancelled(CancelCause::WorkerFailed { worker, reason }) => {
                assert_eq!(*worker, 0);
                assert!(reason.contains("panicked"), "{reason}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(result.workers.len(), 1);
        assert!(result.workers[0].cancelled);
        assert!(result.issued() < 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_endpoint_fails_fast() {
        let err = run(
            pool(vec![6, 9, 10], 1, 0),
            slow(1),
            Arc::new(Missing),
            &options(None),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RunError::Unresolved(timeout) if timeout == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_is_stopped_when_run_returns() {
        let discovery = Arc::new(Counting::default());
        run(
            pool(vec![6, 9, 10], 1, 0),
            slow(1),
            discovery.clone(),
            &options(None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let after_run = discovery.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(discovery.calls.load(Ordering::SeqCst), after_run);
    }

    fn workload_file(numbers: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_numbers.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{numbers}").unwrap();
        (dir, path)
    }

    fn config(target: Target, workload_path: PathBuf) -> DriverConfig {
        DriverConfig {
            target,
            seed: 42,
            workers: 1,
            workload_path,
            refresh_interval: Duration::from_millis(200),
            first_resolution_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            listen_addr: "127.0.0.1:0".into(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn discovered_backend_factorizes_in_permutation_order() {
        let backend = spawn_backend().await;
        let directory = spawn_catalog_for(&backend.addr).await;
        let (_dir, path) = workload_file("6\n9\n10\n");
        let coordinator = Coordinator::new(config(
            Target::Discovery {
                consul_addr: directory,
                service: "nginx".into(),
            },
            path,
        ))
        .unwrap();

        let result = coordinator
            .start(&RunParams::default(), &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(result.issued(), 3);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(backend.seen(), permute(&[6, 9, 10], 42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_numbers_are_counted_not_fatal() {
        let backend = spawn_backend().await;
        let (_dir, path) = workload_file("1\n6\n0\n");
        let coordinator = Coordinator::new(config(Target::Static(backend.addr.clone()), path)).unwrap();

        let result = coordinator
            .start(&RunParams::from_raw(0, 0, 2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.issued(), 6);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed().status, 4);

        let summary = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(summary["issued"], 6);
        assert_eq!(summary["failed"]["status"], 4);
        assert!(summary.get("cancelled").is_none());
    }

    #[tokio::test]
    async fn empty_workload_aborts_before_spawning() {
        let (_dir, path) = workload_file("junk\n\n");
        let coordinator = Coordinator::new(config(Target::Static("127.0.0.1:1".into()), path)).unwrap();

        let err = coordinator
            .start(&RunParams::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::EmptyWorkload));
    }

    #[tokio::test]
    async fn missing_workload_is_a_workload_error() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(config(
            Target::Static("127.0.0.1:1".into()),
            dir.path().join("missing.txt"),
        ))
        .unwrap();

        let err = coordinator
            .start(&RunParams::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Workload(_)));
    }
}
