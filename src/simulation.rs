//! End-to-end simulation: generator, optional waiting room, worker pool.
//!
//! In [`Mode::DropPattern`] requests pass through a [`WaitingRoom`] into a
//! zero-buffer pool intake and may be dropped. In [`Mode::NoDrop`] they go
//! straight into an intake buffered for every request and are all executed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tracing::info;

use crate::config::{Mode, SimulationConfig};
use crate::intake::{self, HandoffError, IntakeSender};
use crate::observability::Metrics;
use crate::pool::{PoolError, WorkerPool};
use crate::request::Request;
use crate::waiting_room::{DroppedRequest, GateError, WaitingRoom};

/// Errors that abort a simulation run.
#[derive(Debug)]
pub enum SimulationError {
    /// The pool could not be configured or started.
    Pool(PoolError),
    /// The waiting room refused a request.
    Gate(GateError<Request>),
    /// The pool intake refused a request.
    Handoff(HandoffError<Request>),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Pool(e) => write!(f, "worker pool error: {}", e),
            SimulationError::Gate(e) => write!(f, "waiting room error: {}", e),
            SimulationError::Handoff(e) => write!(f, "pool intake error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Pool(e) => Some(e),
            SimulationError::Gate(e) => Some(e),
            SimulationError::Handoff(e) => Some(e),
        }
    }
}

impl From<PoolError> for SimulationError {
    fn from(e: PoolError) -> Self {
        SimulationError::Pool(e)
    }
}

impl From<GateError<Request>> for SimulationError {
    fn from(e: GateError<Request>) -> Self {
        SimulationError::Gate(e)
    }
}

impl From<HandoffError<Request>> for SimulationError {
    fn from(e: HandoffError<Request>) -> Self {
        SimulationError::Handoff(e)
    }
}

/// Where the generator delivers requests.
#[async_trait]
pub trait RequestSink: Send + Sync {
    async fn submit(&self, request: Request) -> Result<(), SimulationError>;
}

#[async_trait]
impl RequestSink for WaitingRoom<Request> {
    async fn submit(&self, request: Request) -> Result<(), SimulationError> {
        Ok(self.admit(request).await?)
    }
}

#[async_trait]
impl RequestSink for IntakeSender<Request> {
    async fn submit(&self, request: Request) -> Result<(), SimulationError> {
        Ok(self.send(request).await?)
    }
}

/// Emit `count` requests, one every `interval`, numbered from zero.
///
/// Each request is stamped when it is created, after the interval has
/// elapsed, so waiting on a busy sink does not count as request wait.
pub async fn generate<S>(sink: &S, count: usize, interval: Duration) -> Result<(), SimulationError>
where
    S: RequestSink + ?Sized,
{
    for param in 0..count as u64 {
        tokio::time::sleep(interval).await;
        sink.submit(Request::new(param)).await?;
    }
    Ok(())
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: Mode,
    pub pool_size: usize,
    /// Requests generated.
    pub requests: usize,
    /// Requests executed by the pool.
    pub processed: usize,
    /// Requests dropped by the waiting room.
    pub dropped: usize,
    #[serde(rename = "avg_idle_time_ms", serialize_with = "as_millis")]
    pub average_idle_time: Duration,
    /// `None` when no request was admitted.
    #[serde(rename = "avg_wait_time_ms", serialize_with = "as_millis_opt")]
    pub average_wait_time: Option<Duration>,
    #[serde(rename = "max_wait_time_ms", serialize_with = "as_millis")]
    pub max_wait_time: Duration,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    #[serde(skip)]
    pub processed_requests: Vec<Request>,
    #[serde(skip)]
    pub dropped_requests: Vec<DroppedRequest<Request>>,
}

impl Report {
    /// Log the summary lines.
    pub fn log(&self) {
        info!(
            mode = %self.mode,
            requests = self.requests,
            processed = self.processed,
            dropped = self.dropped,
            "simulation finished"
        );
        info!("  Average idle time: {:?}", self.average_idle_time);
        match self.average_wait_time {
            Some(wait) => info!("  Average wait time: {:?}", wait),
            None => info!("  Average wait time: n/a (nothing admitted)"),
        }
        info!("  Max wait time: {:?}", self.max_wait_time);
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

fn as_millis_opt<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => as_millis(d, serializer),
        None => serializer.serialize_none(),
    }
}

/// One configured run of the system.
pub struct Simulation {
    config: SimulationConfig,
    metrics: Option<Arc<Metrics>>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[inline]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the simulation to completion.
    ///
    /// Fails before anything is spawned if the pool size is zero.
    pub async fn run(&self) -> Result<Report, SimulationError> {
        let pool_config = self.config.pool_config()?;
        let started = Instant::now();
        info!(mode = %self.config.mode, "simulation starting");

        match self.config.mode {
            Mode::DropPattern => {
                let (tx, rx) = intake::rendezvous();
                let mut pool = WorkerPool::new(pool_config, rx);
                let mut room = WaitingRoom::new(self.config.admission_timeout, tx);
                if let Some(metrics) = &self.metrics {
                    pool = pool.with_metrics(Arc::clone(metrics));
                    room = room.with_metrics(Arc::clone(metrics));
                }

                pool.start()?;
                room.open()?;
                let generated = self.feed(&room).await;
                room.close().await;
                pool.stop().await;
                generated?;

                Ok(self.report(&pool, room.admitted_count(), room.dropped(), started))
            }
            Mode::NoDrop => {
                let (tx, rx) = intake::buffered(self.config.num_requests.max(1));
                let mut pool = WorkerPool::new(pool_config, rx);
                if let Some(metrics) = &self.metrics {
                    pool = pool.with_metrics(Arc::clone(metrics));
                }

                pool.start()?;
                let generated = self.feed(&tx).await;
                pool.stop().await;
                generated?;

                Ok(self.report(&pool, self.config.num_requests, Vec::new(), started))
            }
        }
    }

    async fn feed<S: RequestSink>(&self, sink: &S) -> Result<(), SimulationError> {
        generate(sink, self.config.num_requests, self.config.request_interval).await
    }

    fn report(
        &self,
        pool: &WorkerPool<Request>,
        admitted: usize,
        dropped_requests: Vec<DroppedRequest<Request>>,
        started: Instant,
    ) -> Report {
        let stats = pool.stats();
        Report {
            mode: self.config.mode,
            pool_size: pool.worker_count(),
            requests: self.config.num_requests,
            processed: stats.processed,
            dropped: dropped_requests.len(),
            average_idle_time: pool.average_idle_time(),
            average_wait_time: pool.average_wait_time(admitted),
            max_wait_time: stats.max_wait_time,
            elapsed: started.elapsed(),
            processed_requests: pool.processed_requests(),
            dropped_requests,
        }
    }
}
