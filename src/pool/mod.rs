//! Fixed-size worker pool with idle/wait instrumentation and halt injection.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐    ┌─────────┐    ┌─────────┐                 │
//! │  │ Worker0 │    │ Worker1 │    │ Worker2 │  ...            │
//! │  └────┬────┘    └────┬────┘    └────┬────┘                 │
//! │       │  recv        │              │      ▲ watch         │
//! │       └──────────────┴──────────────┘      │ PoolState     │
//! │                      │              ┌──────┴───────┐       │
//! │              ┌───────▼───────┐      │ HaltSchedule │       │
//! │              │    intake     │      └──────────────┘       │
//! │              └───────▲───────┘                             │
//! └──────────────────────┼─────────────────────────────────────┘
//!                        │ send / send_timeout
//!                 producers (waiting room)
//! ```
//!
//! Each worker loops: wait on the intake (idle), hold the request while the
//! pool is halted, stamp the wait duration, process, record. Aggregates are
//! final only once [`WorkerPool::stop`] has returned.

mod error;
pub mod halt;
mod processor;
mod worker;

pub use error::{PoolError, PoolResult};
pub use halt::{HaltConfig, HaltSchedule, PoolState};
pub use processor::{FixedDelay, Processor};

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::intake::IntakeReceiver;
use crate::observability::Metrics;
use crate::request::PoolRequest;
use worker::Worker;

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers (never zero).
    pool_size: NonZeroUsize,
    /// Simulated processing time per request.
    pub processing_time: Duration,
    /// Fault injection schedule.
    pub halt: HaltConfig,
}

impl PoolConfig {
    /// Create a configuration, rejecting a pool without workers.
    pub fn new(pool_size: usize, processing_time: Duration) -> PoolResult<Self> {
        let pool_size = NonZeroUsize::new(pool_size).ok_or(PoolError::InvalidPoolSize(pool_size))?;
        Ok(Self {
            pool_size,
            processing_time,
            halt: HaltConfig::never(),
        })
    }

    /// Set the halt schedule.
    pub fn with_halt(mut self, halt: HaltConfig) -> Self {
        self.halt = halt;
        self
    }

    /// Get worker count.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size.get()
    }
}

/// Snapshot of the pool aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests executed.
    pub processed: usize,
    /// Idle time summed over all workers.
    pub total_idle_time: Duration,
    /// Wait time summed over all processed requests.
    pub cumulative_wait_time: Duration,
    /// Longest wait of any processed request.
    pub max_wait_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Processed log and the wait accumulator share one lock.
struct ProcessedLog<R> {
    requests: Vec<R>,
    cumulative_wait: Duration,
    max_wait: Duration,
}

/// State shared between the pool handle and its workers.
pub(crate) struct PoolShared<R, P> {
    pub(crate) intake: IntakeReceiver<R>,
    pub(crate) processor: P,
    pub(crate) halt: HaltSchedule,
    pub(crate) metrics: Option<Arc<Metrics>>,
    idle: Mutex<Duration>,
    processed: Mutex<ProcessedLog<R>>,
}

impl<R: PoolRequest, P> PoolShared<R, P> {
    pub(crate) fn add_idle_time(&self, idle: Duration) {
        *lock(&self.idle) += idle;
        if let Some(metrics) = &self.metrics {
            metrics.record_idle(idle);
        }
    }

    pub(crate) fn record_processed(&self, request: R, wait: Duration) {
        {
            let mut log = lock(&self.processed);
            log.requests.push(request);
            log.cumulative_wait += wait;
            log.max_wait = log.max_wait.max(wait);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_processed(wait);
        }
    }
}

/// A fixed number of workers draining a shared intake.
pub struct WorkerPool<R, P = FixedDelay>
where
    R: PoolRequest,
    P: Processor<R>,
{
    config: PoolConfig,
    shared: Arc<PoolShared<R, P>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl<R: PoolRequest> WorkerPool<R, FixedDelay> {
    /// Create a pool whose workers sleep `processing_time` per request.
    pub fn new(config: PoolConfig, intake: IntakeReceiver<R>) -> Self {
        Self::with_processor(config, intake, FixedDelay::new(config.processing_time))
    }
}

impl<R, P> WorkerPool<R, P>
where
    R: PoolRequest,
    P: Processor<R>,
{
    /// Create a pool with a custom processor.
    pub fn with_processor(config: PoolConfig, intake: IntakeReceiver<R>, processor: P) -> Self {
        let shared = Arc::new(PoolShared {
            intake,
            processor,
            halt: HaltSchedule::new(config.halt),
            metrics: None,
            idle: Mutex::new(Duration::ZERO),
            processed: Mutex::new(ProcessedLog {
                requests: Vec::new(),
                cumulative_wait: Duration::ZERO,
                max_wait: Duration::ZERO,
            }),
        });

        Self {
            config,
            shared,
            workers: Mutex::new(Vec::with_capacity(config.pool_size())),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    /// Attach a metrics registry. Has no effect once the pool has started.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.metrics = Some(metrics),
            None => warn!("metrics attached after pool start, ignoring"),
        }
        self
    }

    /// Spawn the workers and arm the halt schedule. Must run inside a Tokio runtime.
    pub fn start(&self) -> PoolResult<()> {
        let mut lifecycle = lock(&self.lifecycle);
        if *lifecycle != Lifecycle::Created {
            return Err(PoolError::AlreadyStarted);
        }

        let started_at = Instant::now();
        self.shared.halt.arm(started_at, self.shared.metrics.clone());

        let mut workers = lock(&self.workers);
        for id in 0..self.config.pool_size() {
            let worker = Worker::new(id, Arc::clone(&self.shared));
            workers.push(tokio::spawn(worker.run()));
        }

        if let Some(metrics) = &self.shared.metrics {
            metrics.workers_total.set(self.config.pool_size() as i64);
        }

        info!(
            workers = self.config.pool_size(),
            processor = self.shared.processor.name(),
            processing_ms = self.config.processing_time.as_millis() as u64,
            halt_after_ms = self.config.halt.after.as_millis() as u64,
            halt_duration_ms = self.config.halt.duration.as_millis() as u64,
            "worker pool started"
        );

        *lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Close the intake and wait until every worker has drained it and exited.
    ///
    /// After this returns all aggregates are final.
    pub async fn stop(&self) {
        self.shared.intake.close();

        let workers = std::mem::take(&mut *lock(&self.workers));
        for (id, result) in join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(worker = id, error = %e, "worker terminated abnormally");
            }
        }

        self.shared.halt.disarm();

        let was_running = {
            let mut lifecycle = lock(&self.lifecycle);
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) == Lifecycle::Running
        };
        if was_running {
            info!(processed = self.processed_count(), "worker pool stopped");
        }
    }

    /// Mean idle time per worker.
    ///
    /// Read after [`stop`](Self::stop) for a final value.
    pub fn average_idle_time(&self) -> Duration {
        // pool_size is non-zero by construction
        mean(*lock(&self.shared.idle), self.config.pool_size()).unwrap_or_default()
    }

    /// Mean wait time over `num_admitted` requests.
    ///
    /// The caller supplies the count because the pool does not know how many
    /// requests were turned away upstream. `None` when `num_admitted` is zero.
    pub fn average_wait_time(&self, num_admitted: usize) -> Option<Duration> {
        mean(lock(&self.shared.processed).cumulative_wait, num_admitted)
    }

    /// Requests executed so far, in completion order, each with its wait duration.
    pub fn processed_requests(&self) -> Vec<R>
    where
        R: Clone,
    {
        lock(&self.shared.processed).requests.clone()
    }

    /// Number of requests executed so far.
    pub fn processed_count(&self) -> usize {
        lock(&self.shared.processed).requests.len()
    }

    /// Aggregate snapshot.
    pub fn stats(&self) -> PoolStats {
        let total_idle_time = *lock(&self.shared.idle);
        let log = lock(&self.shared.processed);
        PoolStats {
            processed: log.requests.len(),
            total_idle_time,
            cumulative_wait_time: log.cumulative_wait,
            max_wait_time: log.max_wait,
        }
    }

    /// Current halt state.
    pub fn state(&self) -> PoolState {
        self.shared.halt.current()
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        *lock(&self.lifecycle) == Lifecycle::Running
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.config.pool_size()
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<R, P> Drop for WorkerPool<R, P>
where
    R: PoolRequest,
    P: Processor<R>,
{
    /// Workers of a pool dropped without [`stop`](WorkerPool::stop) see the
    /// intake close and exit on their own.
    fn drop(&mut self) {
        self.shared.intake.close();
        self.shared.halt.disarm();
    }
}

/// `total / n`, undefined for `n == 0`.
pub(crate) fn mean(total: Duration, n: usize) -> Option<Duration> {
    if n == 0 {
        return None;
    }
    let nanos = total.as_nanos() / n as u128;
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
