//! A single worker's execution loop.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::halt::{wait_until_operational, PoolState};
use super::processor::Processor;
use super::PoolShared;
use crate::request::PoolRequest;

/// One execution unit of the pool.
pub(crate) struct Worker<R, P> {
    id: usize,
    pool: Arc<PoolShared<R, P>>,
}

impl<R, P> Worker<R, P>
where
    R: PoolRequest,
    P: Processor<R>,
{
    pub(crate) fn new(id: usize, pool: Arc<PoolShared<R, P>>) -> Self {
        Self { id, pool }
    }

    /// Take requests from the intake until it is closed.
    pub(crate) async fn run(self) {
        let mut halt_state = self.pool.halt.subscribe();
        debug!(worker = self.id, "worker started");

        let mut idle_since = Instant::now();

        loop {
            let next = self.pool.intake.recv().await;
            // Idle time up to the closing of the intake counts too.
            self.pool.add_idle_time(idle_since.elapsed());

            let Some(mut request) = next else {
                break;
            };

            let halted = *halt_state.borrow_and_update() == PoolState::Halted;
            if halted {
                debug!(
                    worker = self.id,
                    request = request.id(),
                    "pool halted, holding request"
                );
                wait_until_operational(&mut halt_state).await;
            }

            let wait = request.created_at().elapsed();
            request.set_wait_duration(wait);

            if let Some(metrics) = &self.pool.metrics {
                metrics.workers_busy.inc();
            }
            self.pool.processor.process(&request).await;
            if let Some(metrics) = &self.pool.metrics {
                metrics.workers_busy.dec();
            }

            trace!(
                worker = self.id,
                request = request.id(),
                wait_us = wait.as_micros() as u64,
                "request executed"
            );

            self.pool.record_processed(request, wait);
            idle_since = Instant::now();
        }

        debug!(worker = self.id, "worker stopped");
    }
}
