//! Request processing backends for the worker pool.

use std::time::Duration;

use async_trait::async_trait;

use crate::request::PoolRequest;

/// Work executed by a worker once it has started a request.
///
/// Processing cannot fail; a processor only decides how long a request
/// keeps its worker busy.
#[async_trait]
pub trait Processor<R: PoolRequest>: Send + Sync + 'static {
    /// Executes one request.
    async fn process(&self, request: &R);

    /// Returns the name of this processor for logging purposes.
    fn name(&self) -> &'static str;
}

/// Simulated processing: every request takes the same fixed time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    duration: Duration,
}

impl FixedDelay {
    #[inline]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl<R: PoolRequest> Processor<R> for FixedDelay {
    async fn process(&self, _request: &R) {
        tokio::time::sleep(self.duration).await;
    }

    #[inline]
    fn name(&self) -> &'static str {
        "fixed-delay"
    }
}
