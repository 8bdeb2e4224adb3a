//! Waiting room in front of the worker pool: drop with timeout.
//!
//! Every request that enters gets its own admission attempt. The attempt
//! races a hand-off into the pool's zero-buffer intake against a timer; the
//! request is admitted if a worker takes it first and dropped otherwise.
//!
//! ```text
//!              admit()                      ┌── attempt ──┐  send_timeout
//! producer ──────────▶ accept loop ──spawn──┼── attempt ──┼──────────────▶ pool intake
//!           rendezvous                      └── attempt ──┘        │
//!                                                 │ timeout        │ taken
//!                                                 ▼                ▼
//!                                              dropped          admitted
//! ```
//!
//! The pool intake must be a rendezvous: a buffered intake would accept
//! requests no worker is ready for and the timeout would never fire.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::intake::{self, HandoffError, IntakeReceiver, IntakeSender};
use crate::observability::Metrics;
use crate::request::PoolRequest;

/// Errors returned by the waiting room. Rejected requests are handed back.
pub enum GateError<R> {
    /// `open()` was called more than once.
    AlreadyOpen,
    /// The waiting room has not been opened yet.
    NotOpen(R),
    /// The waiting room has been closed.
    Closed(R),
}

impl<R> GateError<R> {
    /// Take back the rejected request, if any.
    pub fn into_request(self) -> Option<R> {
        match self {
            GateError::AlreadyOpen => None,
            GateError::NotOpen(request) | GateError::Closed(request) => Some(request),
        }
    }
}

impl<R> fmt::Debug for GateError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::AlreadyOpen => f.write_str("AlreadyOpen"),
            GateError::NotOpen(_) => f.write_str("NotOpen(..)"),
            GateError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<R> fmt::Display for GateError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::AlreadyOpen => write!(f, "waiting room is already open"),
            GateError::NotOpen(_) => write!(f, "waiting room has not been opened"),
            GateError::Closed(_) => write!(f, "waiting room has been closed"),
        }
    }
}

impl<R> std::error::Error for GateError<R> {}

/// Result type alias for waiting room operations.
pub type GateResult<T, R> = Result<T, GateError<R>>;

/// A request that timed out in the waiting room.
#[derive(Debug, Clone)]
pub struct DroppedRequest<R> {
    pub request: R,
    /// Time from request creation until the drop was decided.
    pub dropped_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomState {
    Created,
    Open,
    Closed,
}

/// Outcome logs and the live queue length.
struct Outcomes<R> {
    admitted: Mutex<Vec<R>>,
    dropped: Mutex<Vec<DroppedRequest<R>>>,
    queue_length: AtomicUsize,
    metrics: Option<Arc<Metrics>>,
}

impl<R: PoolRequest> Outcomes<R> {
    fn admit(&self, request: R) {
        debug!(request = request.id(), "request sent to pool");
        lock(&self.admitted).push(request);
        if let Some(metrics) = &self.metrics {
            metrics.record_admission(true);
        }
    }

    fn drop_request(&self, request: R) {
        let dropped_after = request.created_at().elapsed();
        info!(
            request = request.id(),
            after_ms = dropped_after.as_millis() as u64,
            "request dropped"
        );
        lock(&self.dropped).push(DroppedRequest {
            request,
            dropped_after,
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_admission(false);
        }
    }
}

/// Counts one in-flight attempt for as long as it lives.
struct Queued<'a, R> {
    outcomes: &'a Outcomes<R>,
}

impl<'a, R> Queued<'a, R> {
    fn enter(outcomes: &'a Outcomes<R>) -> Self {
        outcomes.queue_length.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &outcomes.metrics {
            metrics.queue_length.inc();
        }
        Self { outcomes }
    }
}

impl<R> Drop for Queued<'_, R> {
    fn drop(&mut self) {
        self.outcomes.queue_length.fetch_sub(1, Ordering::SeqCst);
        if let Some(metrics) = &self.outcomes.metrics {
            metrics.queue_length.dec();
        }
    }
}

/// Everything one admission attempt needs.
struct Admission<R> {
    outtake: IntakeSender<R>,
    timeout: Duration,
    outcomes: Arc<Outcomes<R>>,
}

impl<R> Clone for Admission<R> {
    fn clone(&self) -> Self {
        Self {
            outtake: self.outtake.clone(),
            timeout: self.timeout,
            outcomes: Arc::clone(&self.outcomes),
        }
    }
}

impl<R: PoolRequest + Clone> Admission<R> {
    /// Hand the request to the pool or drop it once the timeout elapses.
    async fn send_or_drop(self, request: R) {
        let _queued = Queued::enter(&self.outcomes);
        let admitted = request.clone();

        match self.outtake.send_timeout(request, self.timeout).await {
            Ok(()) => self.outcomes.admit(admitted),
            Err(HandoffError::Timeout(request)) => self.outcomes.drop_request(request),
            Err(HandoffError::Closed(request)) => {
                warn!(request = request.id(), "pool intake closed while waiting");
                self.outcomes.drop_request(request);
            }
        }
    }
}

/// Admission gate applying a per-request timeout in front of a pool intake.
pub struct WaitingRoom<R> {
    timeout: Duration,
    outtake: IntakeSender<R>,
    intake_tx: IntakeSender<R>,
    intake_rx: IntakeReceiver<R>,
    outcomes: Arc<Outcomes<R>>,
    attempts: TaskTracker,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<RoomState>,
}

impl<R> WaitingRoom<R>
where
    R: PoolRequest + Clone,
{
    /// Create a waiting room feeding `outtake` (the pool's intake).
    pub fn new(timeout: Duration, outtake: IntakeSender<R>) -> Self {
        if outtake.capacity() > 0 {
            warn!(
                capacity = outtake.capacity(),
                "waiting room feeds a buffered intake, timeouts only apply once it is full"
            );
        }

        let (intake_tx, intake_rx) = intake::rendezvous();
        Self {
            timeout,
            outtake,
            intake_tx,
            intake_rx,
            outcomes: Arc::new(Outcomes {
                admitted: Mutex::new(Vec::new()),
                dropped: Mutex::new(Vec::new()),
                queue_length: AtomicUsize::new(0),
                metrics: None,
            }),
            attempts: TaskTracker::new(),
            accept_loop: Mutex::new(None),
            state: Mutex::new(RoomState::Created),
        }
    }

    /// Attach a metrics registry. Has no effect once the room is open.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        match Arc::get_mut(&mut self.outcomes) {
            Some(outcomes) => outcomes.metrics = Some(metrics),
            None => warn!("metrics attached after waiting room opened, ignoring"),
        }
        self
    }

    /// Start the accept loop. Must run inside a Tokio runtime.
    pub fn open(&self) -> GateResult<(), R> {
        let mut state = lock(&self.state);
        if *state != RoomState::Created {
            return Err(GateError::AlreadyOpen);
        }

        let intake = self.intake_rx.clone();
        let admission = Admission {
            outtake: self.outtake.clone(),
            timeout: self.timeout,
            outcomes: Arc::clone(&self.outcomes),
        };
        let attempts = self.attempts.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = intake.recv().await {
                debug!(request = request.id(), "request in the waiting room");
                attempts.spawn(admission.clone().send_or_drop(request));
            }
        });
        *lock(&self.accept_loop) = Some(handle);
        *state = RoomState::Open;

        info!(
            timeout_ms = self.timeout.as_millis() as u64,
            "waiting room open"
        );
        Ok(())
    }

    /// Let a request in.
    ///
    /// Returns once the accept loop has taken the request, not once it is
    /// admitted or dropped.
    pub async fn admit(&self, request: R) -> GateResult<(), R> {
        let state = *lock(&self.state);
        match state {
            RoomState::Created => Err(GateError::NotOpen(request)),
            RoomState::Closed => Err(GateError::Closed(request)),
            RoomState::Open => self
                .intake_tx
                .send(request)
                .await
                .map_err(|e| GateError::Closed(e.into_inner())),
        }
    }

    /// Stop letting requests in and wait until every attempt has resolved.
    ///
    /// After this returns the admitted and dropped logs are final.
    pub async fn close(&self) {
        let was_open = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut *state, RoomState::Closed) == RoomState::Open
        };
        self.intake_tx.close();

        let accept_loop = lock(&self.accept_loop).take();
        if let Some(handle) = accept_loop {
            if let Err(e) = handle.await {
                error!(error = %e, "accept loop terminated abnormally");
            }
        }

        self.attempts.close();
        self.attempts.wait().await;

        if was_open {
            info!(
                admitted = self.admitted_count(),
                dropped = self.dropped_count(),
                "waiting room closed"
            );
        }
    }

    /// Requests handed to the pool, in admission order.
    pub fn admitted(&self) -> Vec<R> {
        lock(&self.outcomes.admitted).clone()
    }

    /// Requests dropped on timeout, in drop order.
    pub fn dropped(&self) -> Vec<DroppedRequest<R>> {
        lock(&self.outcomes.dropped).clone()
    }

    pub fn admitted_count(&self) -> usize {
        lock(&self.outcomes.admitted).len()
    }

    pub fn dropped_count(&self) -> usize {
        lock(&self.outcomes.dropped).len()
    }

    /// Attempts currently waiting for a worker.
    pub fn queue_length(&self) -> usize {
        self.outcomes.queue_length.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<R> Drop for WaitingRoom<R> {
    /// Ends the accept loop of a room dropped without [`close`](WaitingRoom::close).
    /// Attempts already spawned still resolve on their own timers.
    fn drop(&mut self) {
        self.intake_tx.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolConfig, WorkerPool};
    use crate::request::Request;
    use tokio::time::Instant;

    fn ids(requests: &[Request]) -> Vec<u64> {
        requests.iter().map(|r| r.param).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_before_open_is_rejected() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room = WaitingRoom::new(Duration::from_millis(500), tx);

        let err = room.admit(Request::new(1)).await.unwrap_err();
        assert!(matches!(err, GateError::NotOpen(_)));
        assert_eq!(err.into_request().map(|r| r.param), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_twice_is_rejected() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room = WaitingRoom::new(Duration::from_millis(500), tx);

        room.open().unwrap();
        assert!(matches!(room.open(), Err(GateError::AlreadyOpen)));
        room.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_after_timeout_without_workers() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let timeout = Duration::from_millis(500);
        let room = WaitingRoom::new(timeout, tx);
        room.open().unwrap();

        for i in 0..3 {
            room.admit(Request::new(i)).await.unwrap();
        }
        room.close().await;

        assert_eq!(room.admitted_count(), 0);
        let dropped = room.dropped();
        assert_eq!(dropped.len(), 3);
        for entry in dropped {
            assert!(entry.dropped_after >= timeout);
            assert!(entry.dropped_after < timeout + Duration::from_millis(1));
        }
        assert_eq!(room.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_while_worker_is_free() {
        let (tx, rx) = intake::rendezvous::<Request>();
        let pool = WorkerPool::new(
            PoolConfig::new(1, Duration::from_millis(1000)).unwrap(),
            rx,
        );
        pool.start().unwrap();

        let room = WaitingRoom::new(Duration::from_millis(500), tx);
        room.open().unwrap();

        room.admit(Request::new(0)).await.unwrap();
        room.admit(Request::new(1)).await.unwrap();
        room.close().await;
        pool.stop().await;

        assert_eq!(ids(&room.admitted()), vec![0]);
        assert_eq!(room.dropped()[0].request.param, 1);
        assert_eq!(ids(&pool.processed_requests()), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_length_counts_in_flight_attempts() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room = WaitingRoom::new(Duration::from_millis(500), tx);
        room.open().unwrap();

        room.admit(Request::new(0)).await.unwrap();
        room.admit(Request::new(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(room.queue_length(), 2);

        room.close().await;
        assert_eq!(room.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_drops_immediately() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room = WaitingRoom::new(Duration::ZERO, tx);
        room.open().unwrap();

        let started = Instant::now();
        room.admit(Request::new(0)).await.unwrap();
        room.close().await;

        assert_eq!(room.dropped_count(), 1);
        assert_eq!(room.dropped()[0].dropped_after, Duration::ZERO);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_after_close_is_rejected() {
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room = WaitingRoom::new(Duration::from_millis(500), tx);
        room.open().unwrap();
        room.close().await;

        let err = room.admit(Request::new(9)).await.unwrap_err();
        assert!(matches!(err, GateError::Closed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_record_outcomes() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room =
            WaitingRoom::new(Duration::from_millis(10), tx).with_metrics(Arc::clone(&metrics));
        room.open().unwrap();

        room.admit(Request::new(0)).await.unwrap();
        room.close().await;

        assert_eq!(metrics.requests_dropped_total.get(), 1);
        assert_eq!(metrics.requests_admitted_total.get(), 0);
        assert_eq!(metrics.queue_length.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_without_close_ends_accept_loop() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, _rx) = intake::rendezvous::<Request>();
        let room =
            WaitingRoom::new(Duration::from_millis(500), tx).with_metrics(Arc::clone(&metrics));
        room.open().unwrap();
        room.admit(Request::new(0)).await.unwrap();

        drop(room);
        tokio::time::sleep(Duration::from_secs(60)).await;

        // The pending attempt timed out and nothing else holds the room's state.
        assert_eq!(metrics.requests_dropped_total.get(), 1);
        assert_eq!(metrics.queue_length.get(), 0);
        assert_eq!(Arc::strong_count(&metrics), 1);
    }
}
