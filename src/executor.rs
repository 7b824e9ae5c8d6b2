pub mod sink;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    engine::{
        monitor::{DailyRecord, KpiVector},
        run_replica,
    },
    error::{ExecutorError, SimresError, SimresResult},
    executor::sink::{NullSink, ReplicaSink, lock_ignoring_poison},
    rng::derive_replica_seed,
    scenario::Scenario,
};

/// One persisted KPI row: the replica's KPI vector plus its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRow {
    pub scenario_id: String,
    pub replica_index: u64,
    #[serde(flatten)]
    pub kpis: KpiVector,
}

/// Full per-day series of one sampled replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledSeries {
    pub scenario_id: String,
    pub replica_index: u64,
    pub days: Vec<DailyRecord>,
}

/// A replica that aborted on a runtime invariant violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaFailure {
    pub replica_index: u64,
    pub message: String,
}

/// Terminal state of an experiment. A canceled or timed-out run is
/// `Partial` -- never an error -- with `n_completed` recording how far it
/// got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Partial,
}

/// Outcome of one Monte Carlo experiment over a single scenario.
///
/// `kpis` is sorted by replica index regardless of completion order, so
/// downstream statistics are deterministic for a fixed
/// `(scenario, base_seed, num_replicas)`.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub status: RunStatus,
    pub n_requested: usize,
    pub n_completed: usize,
    pub n_failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kpis: Vec<KpiRow>,
    pub sampled_timeseries: Vec<SampledSeries>,
    pub failures: Vec<ReplicaFailure>,
}

/// Executor knobs that are not part of the scenario itself.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Identifier stamped on every persisted row and mixed into replica
    /// seeds.
    pub scenario_id: String,

    pub num_replicas: usize,

    /// Worker threads claiming replica indices. Defaults to the number of
    /// available CPU cores.
    pub max_workers: usize,

    /// How many replicas (the first K indices) persist their full per-day
    /// series in addition to the KPI row.
    pub timeseries_sample: usize,

    /// Render a progress bar while running.
    pub progress: bool,
}

impl ExecutorConfig {
    pub fn new(scenario_id: impl Into<String>, num_replicas: usize) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            num_replicas,
            max_workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            timeseries_sample: 50,
            progress: false,
        }
    }

    pub fn with_max_workers(self, max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            ..self
        }
    }

    pub fn with_timeseries_sample(self, timeseries_sample: usize) -> Self {
        Self {
            timeseries_sample,
            ..self
        }
    }

    pub fn with_progress(self, progress: bool) -> Self {
        Self { progress, ..self }
    }
}

/// Parallel Monte Carlo driver for one scenario.
///
/// Workers claim replica indices from a shared atomic counter; each replica
/// runs share-nothing on its own derived seed and streams its KPI row to the
/// sink as it completes. Cancellation is cooperative and checked between
/// replicas only -- a replica in flight always finishes, and rows already
/// streamed stay valid.
pub struct MonteCarloExecutor {
    scenario: Scenario,
    config: ExecutorConfig,
    sink: Arc<dyn ReplicaSink>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl MonteCarloExecutor {
    pub fn new(scenario: Scenario, config: ExecutorConfig) -> Self {
        Self {
            scenario,
            config,
            sink: Arc::new(NullSink),
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn with_sink(self, sink: Arc<dyn ReplicaSink>) -> Self {
        Self { sink, ..self }
    }

    pub fn with_cancel_token(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }

    /// Wall-clock budget behaving exactly like a cancellation at expiry.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Runs the experiment on the async runtime, offloading the worker pool.
    pub async fn run(self) -> SimresResult<ScenarioResult> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        rayon::spawn(move || {
            let _ = tx.send(self.run_blocking());
        });
        rx.await
            .map_err(|e| ExecutorError::Channel(e.to_string()))?
    }

    /// Runs the experiment on the calling thread.
    #[tracing::instrument(skip(self), fields(scenario_id = %self.config.scenario_id))]
    pub fn run_blocking(&self) -> SimresResult<ScenarioResult> {
        self.scenario.validate()?;

        let n = self.config.num_replicas;
        let base_seed = self.scenario.base_seed();
        let started_at = Utc::now();
        let deadline = self.timeout.map(|t| Instant::now() + t);

        info!(
            replicas = n,
            workers = self.config.max_workers,
            "Monte Carlo experiment starting"
        );

        let bar = if self.config.progress {
            progress_bar(n as u64)?
        } else {
            ProgressBar::hidden()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .build()
            .map_err(|e| ExecutorError::PoolBuild(e.to_string()))?;

        let next_index = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let results: Mutex<Vec<KpiRow>> = Mutex::new(Vec::with_capacity(n));
        let sampled: Mutex<Vec<SampledSeries>> = Mutex::new(Vec::new());
        let failures: Mutex<Vec<ReplicaFailure>> = Mutex::new(Vec::new());
        let persistence_failure: Mutex<Option<ExecutorError>> = Mutex::new(None);

        // Child token: an internal abort (sink escalation) must not cancel
        // the caller's token.
        let cancel = self.cancel.child_token();

        pool.scope(|scope| {
            for _ in 0..self.config.max_workers {
                scope.spawn(|_| {
                    self.worker_loop(
                        &next_index,
                        &completed,
                        &results,
                        &sampled,
                        &failures,
                        &persistence_failure,
                        &cancel,
                        deadline,
                        base_seed,
                        &bar,
                    );
                });
            }
        });

        bar.finish_and_clear();

        if let Some(e) = lock_ignoring_poison(&persistence_failure).take() {
            return Err(e.into());
        }

        let mut kpis = lock_ignoring_poison(&results).drain(..).collect::<Vec<_>>();
        kpis.sort_by_key(|row| row.replica_index);
        let mut sampled_timeseries = lock_ignoring_poison(&sampled).drain(..).collect::<Vec<_>>();
        sampled_timeseries.sort_by_key(|s| s.replica_index);
        let mut failures = lock_ignoring_poison(&failures).drain(..).collect::<Vec<_>>();
        failures.sort_by_key(|f| f.replica_index);

        let n_completed = completed.load(Ordering::SeqCst);
        let n_failed = failures.len();
        let status = if n_completed + n_failed == n {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };

        info!(n_completed, n_failed, ?status, "Monte Carlo experiment finished");

        Ok(ScenarioResult {
            scenario_id: self.config.scenario_id.clone(),
            status,
            n_requested: n,
            n_completed,
            n_failed,
            started_at,
            finished_at: Utc::now(),
            kpis,
            sampled_timeseries,
            failures,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn worker_loop(
        &self,
        next_index: &AtomicUsize,
        completed: &AtomicUsize,
        results: &Mutex<Vec<KpiRow>>,
        sampled: &Mutex<Vec<SampledSeries>>,
        failures: &Mutex<Vec<ReplicaFailure>>,
        persistence_failure: &Mutex<Option<ExecutorError>>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        base_seed: u64,
        bar: &ProgressBar,
    ) {
        loop {
            if cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let index = next_index.fetch_add(1, Ordering::SeqCst);
            if index >= self.config.num_replicas {
                break;
            }

            let replica_index = index as u64;
            let seed = derive_replica_seed(base_seed, &self.config.scenario_id, replica_index);

            let output = match run_replica(&self.scenario, seed) {
                Ok(output) => output,
                Err(e) => {
                    warn!(replica_index, error = %e, "Replica failed; continuing");
                    lock_ignoring_poison(failures).push(ReplicaFailure {
                        replica_index,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let row = KpiRow {
                scenario_id: self.config.scenario_id.clone(),
                replica_index,
                kpis: output.kpis,
            };

            if let Err(e) = append_with_retry(&*self.sink, &row) {
                escalate_persistence(persistence_failure, cancel, replica_index, e);
                break;
            }

            // The first K indices also persist their full series.
            if index < self.config.timeseries_sample {
                let series = SampledSeries {
                    scenario_id: self.config.scenario_id.clone(),
                    replica_index,
                    days: output.days,
                };
                if let Err(e) = timeseries_with_retry(&*self.sink, &series) {
                    escalate_persistence(persistence_failure, cancel, replica_index, e);
                    break;
                }
                lock_ignoring_poison(sampled).push(series);
            }
            // Unsampled series drop here; only KPI rows stay live.

            lock_ignoring_poison(results).push(row);
            completed.fetch_add(1, Ordering::SeqCst);
            bar.inc(1);
        }
    }
}

/// One-call convenience wrapper matching the abstract API surface.
pub fn run_scenario(
    scenario: Scenario,
    num_replicas: usize,
    max_workers: usize,
    sink: Arc<dyn ReplicaSink>,
    cancel: CancellationToken,
) -> SimresResult<ScenarioResult> {
    MonteCarloExecutor::new(
        scenario,
        ExecutorConfig::new("scenario", num_replicas).with_max_workers(max_workers),
    )
    .with_sink(sink)
    .with_cancel_token(cancel)
    .run_blocking()
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn append_with_retry(sink: &dyn ReplicaSink, row: &KpiRow) -> SimresResult<()> {
    if let Err(first) = sink.append_kpis(row) {
        warn!(replica_index = row.replica_index, error = %first, "Sink append failed; retrying once");
        return sink.append_kpis(row);
    }
    Ok(())
}

fn timeseries_with_retry(sink: &dyn ReplicaSink, series: &SampledSeries) -> SimresResult<()> {
    if let Err(first) = sink.append_timeseries(series) {
        warn!(replica_index = series.replica_index, error = %first, "Sink append failed; retrying once");
        return sink.append_timeseries(series);
    }
    Ok(())
}

fn escalate_persistence(
    slot: &Mutex<Option<ExecutorError>>,
    cancel: &CancellationToken,
    replica_index: u64,
    error: SimresError,
) {
    let mut guard = lock_ignoring_poison(slot);
    if guard.is_none() {
        *guard = Some(ExecutorError::Persistence {
            replica_index,
            msg: error.to_string(),
        });
    }
    cancel.cancel();
}

fn progress_bar(capacity: u64) -> SimresResult<ProgressBar> {
    let bar = ProgressBar::new(capacity);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise}) {msg}")
            .map_err(ExecutorError::ProgressBar)?
            .progress_chars("#>-"));
    Ok(bar)
}
