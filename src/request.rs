//! Request types flowing through the waiting room and the worker pool.
//!
//! The pool only needs a handful of capabilities from a request: who it is,
//! when it was created, and a slot to record how long it waited. Those are
//! captured by [`PoolRequest`], so richer payloads can go through the same
//! pool without it knowing about them.

use std::time::Duration;

use tokio::time::Instant;

/// Minimal data contract between a request and the worker pool.
pub trait PoolRequest: Send + Sync + 'static {
    /// Identifier used in logs and reports.
    fn id(&self) -> u64;

    /// When the request entered the system.
    fn created_at(&self) -> Instant;

    /// How long the request waited before a worker started executing it.
    ///
    /// `None` until a worker has dequeued the request.
    fn wait_duration(&self) -> Option<Duration>;

    /// Record the wait duration. Called once, by the worker that dequeued it.
    fn set_wait_duration(&mut self, wait: Duration);
}

/// A synthetic request carrying a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Opaque payload, the sequence number assigned by the generator.
    pub param: u64,
    created_at: Instant,
    wait_duration: Option<Duration>,
}

impl Request {
    /// Create a request stamped with the current time.
    pub fn new(param: u64) -> Self {
        Self::created(param, Instant::now())
    }

    /// Create a request with an explicit creation time.
    pub fn created(param: u64, created_at: Instant) -> Self {
        Self {
            param,
            created_at,
            wait_duration: None,
        }
    }
}

impl PoolRequest for Request {
    #[inline]
    fn id(&self) -> u64 {
        self.param
    }

    #[inline]
    fn created_at(&self) -> Instant {
        self.created_at
    }

    #[inline]
    fn wait_duration(&self) -> Option<Duration> {
        self.wait_duration
    }

    fn set_wait_duration(&mut self, wait: Duration) {
        debug_assert!(
            self.wait_duration.is_none(),
            "wait duration of request {} set twice",
            self.param
        );
        self.wait_duration = Some(wait);
    }
}
