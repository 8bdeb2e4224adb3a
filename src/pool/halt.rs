//! Scheduled pool halt used for fault injection.
//!
//! The pool is `Operational` until `after` has elapsed since start, then
//! `Halted` for `duration`, then `Operational` again for the rest of the run.
//! Both transitions fire once, from a timer task. Workers observe the state
//! through a `watch` channel and park on it instead of polling.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::observability::Metrics;

/// Pool-wide processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolState {
    /// Workers start requests as soon as they dequeue them.
    #[default]
    Operational,
    /// Dequeued requests wait for the pool to become operational again.
    Halted,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operational => write!(f, "operational"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// When and for how long the pool halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HaltConfig {
    /// Time after pool start at which the halt begins.
    pub after: Duration,
    /// How long the halt lasts. Zero disables the halt.
    pub duration: Duration,
}

impl HaltConfig {
    pub fn new(after: Duration, duration: Duration) -> Self {
        Self { after, duration }
    }

    /// A schedule that never halts.
    pub fn never() -> Self {
        Self::default()
    }

    /// Returns true if this schedule halts the pool at all.
    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// Two-state machine driven by one-shot timers.
pub struct HaltSchedule {
    config: HaltConfig,
    state_tx: watch::Sender<PoolState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HaltSchedule {
    pub fn new(config: HaltConfig) -> Self {
        let (state_tx, _) = watch::channel(PoolState::Operational);
        Self {
            config,
            state_tx,
            timer: Mutex::new(None),
        }
    }

    /// Get a receiver for state updates.
    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.state_tx.subscribe()
    }

    /// Get the current state.
    pub fn current(&self) -> PoolState {
        *self.state_tx.borrow()
    }

    pub fn config(&self) -> HaltConfig {
        self.config
    }

    /// Arm the timers relative to `started_at`. Must run inside a Tokio runtime.
    pub fn arm(&self, started_at: Instant, metrics: Option<Arc<Metrics>>) {
        if !self.config.is_enabled() {
            return;
        }

        let halt_at = started_at + self.config.after;
        let resume_at = halt_at + self.config.duration;
        let state_tx = self.state_tx.clone();

        let handle = tokio::spawn(async move {
            sleep_until(halt_at).await;
            state_tx.send_replace(PoolState::Halted);
            if let Some(metrics) = &metrics {
                metrics.set_halted(true);
            }
            warn!(
                after_ms = (halt_at - started_at).as_millis() as u64,
                "pool halted"
            );

            sleep_until(resume_at).await;
            state_tx.send_replace(PoolState::Operational);
            if let Some(metrics) = &metrics {
                metrics.set_halted(false);
            }
            info!(
                halted_ms = (resume_at - halt_at).as_millis() as u64,
                "pool operational again"
            );
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancel pending transitions and leave the pool operational.
    pub fn disarm(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.state_tx.send_if_modified(|state| {
            let changed = *state != PoolState::Operational;
            *state = PoolState::Operational;
            changed
        });
    }
}

impl Drop for HaltSchedule {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Park until the pool is operational. Returns immediately if it already is.
pub async fn wait_until_operational(state: &mut watch::Receiver<PoolState>) {
    // The schedule being dropped means nothing can halt the pool any more.
    let _ = state.wait_for(|s| *s == PoolState::Operational).await;
}
