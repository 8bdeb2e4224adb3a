//! Hand-off channels between producers and a pool of consumers.
//!
//! Two flavours share one API:
//!
//! - [`rendezvous`]: zero-buffer. A send completes only at the instant a
//!   receiver is parked and takes the item. This is what turns a send
//!   timeout into real back-pressure.
//! - [`buffered`]: a bounded queue. Sends complete as soon as there is room.
//!
//! ```text
//!  rendezvous                              buffered
//!
//!  receiver ──slot──▶ ┌────────────┐       sender ──item──▶ ┌─────────┐
//!  receiver ──slot──▶ │ ready FIFO │       sender ──item──▶ │  queue  │──▶ receivers
//!                     └─────┬──────┘                        └─────────┘
//!  sender ◀──takes slot─────┘
//!  sender ──item──▶ slot owner
//! ```
//!
//! Items are never lost. A send either delivers the item or hands it back
//! inside [`HandoffError`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// A parked receiver waiting for exactly one item.
type Slot<T> = oneshot::Sender<T>;

/// Errors returned by sends. The undelivered item is always handed back.
pub enum HandoffError<T> {
    /// No receiver took the item before the deadline.
    Timeout(T),
    /// The intake was closed.
    Closed(T),
}

impl<T> HandoffError<T> {
    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandoffError::Timeout(_))
    }

    /// Check if this is a closed error.
    pub fn is_closed(&self) -> bool {
        matches!(self, HandoffError::Closed(_))
    }

    /// Take back the undelivered item.
    pub fn into_inner(self) -> T {
        match self {
            HandoffError::Timeout(item) | HandoffError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for HandoffError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::Timeout(_) => f.write_str("Timeout(..)"),
            HandoffError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for HandoffError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::Timeout(_) => write!(f, "no receiver took the item before the deadline"),
            HandoffError::Closed(_) => write!(f, "intake has been closed"),
        }
    }
}

impl<T> std::error::Error for HandoffError<T> {}

/// Result type alias for sends.
pub type HandoffResult<T> = Result<(), HandoffError<T>>;

enum Chan<T> {
    Rendezvous {
        ready_tx: mpsc::UnboundedSender<Slot<T>>,
        ready_rx: Mutex<mpsc::UnboundedReceiver<Slot<T>>>,
    },
    Buffered {
        capacity: usize,
        tx: mpsc::Sender<T>,
        rx: Mutex<mpsc::Receiver<T>>,
    },
}

struct Shared<T> {
    chan: Chan<T>,
    closed: CancellationToken,
}

/// What a sender holds once it may deliver.
enum Ticket<'a, T> {
    Slot(Slot<T>),
    Permit(mpsc::Permit<'a, T>),
    Closed,
}

/// Create a zero-buffer hand-off.
///
/// Receivers are served in the order they parked, so the receiver that has
/// been waiting longest takes the next item.
pub fn rendezvous<T: Send>() -> (IntakeSender<T>, IntakeReceiver<T>) {
    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    pair(Chan::Rendezvous {
        ready_tx,
        ready_rx: Mutex::new(ready_rx),
    })
}

/// Create a hand-off backed by a queue of `capacity` items.
///
/// A zero capacity falls back to [`rendezvous`].
pub fn buffered<T: Send>(capacity: usize) -> (IntakeSender<T>, IntakeReceiver<T>) {
    if capacity == 0 {
        return rendezvous();
    }
    let (tx, rx) = mpsc::channel(capacity);
    pair(Chan::Buffered {
        capacity,
        tx,
        rx: Mutex::new(rx),
    })
}

fn pair<T>(chan: Chan<T>) -> (IntakeSender<T>, IntakeReceiver<T>) {
    let shared = Arc::new(Shared {
        chan,
        closed: CancellationToken::new(),
    });
    (
        IntakeSender {
            shared: Arc::clone(&shared),
        },
        IntakeReceiver { shared },
    )
}

impl<T> Shared<T> {
    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Producer end of an intake.
pub struct IntakeSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for IntakeSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> IntakeSender<T> {
    /// Close the intake. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns true once the intake has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Queue capacity (`0` for a rendezvous).
    pub fn capacity(&self) -> usize {
        match &self.shared.chan {
            Chan::Rendezvous { .. } => 0,
            Chan::Buffered { capacity, .. } => *capacity,
        }
    }
}

impl<T: Send> IntakeSender<T> {
    /// Send an item, waiting as long as it takes for it to be accepted.
    pub async fn send(&self, item: T) -> HandoffResult<T> {
        self.deliver(item, None).await
    }

    /// Send an item, giving up once `timeout` has elapsed.
    ///
    /// A zero timeout only succeeds if a receiver can take the item immediately.
    pub async fn send_timeout(&self, item: T, timeout: Duration) -> HandoffResult<T> {
        self.deliver(item, Some(Instant::now() + timeout)).await
    }

    async fn deliver(&self, mut item: T, deadline: Option<Instant>) -> HandoffResult<T> {
        loop {
            if self.shared.is_closed() {
                return Err(HandoffError::Closed(item));
            }

            let ticket = match deadline {
                // A ready receiver wins over an expired deadline.
                Some(at) => tokio::select! {
                    biased;
                    ticket = self.acquire() => ticket,
                    _ = sleep_until(at) => return Err(HandoffError::Timeout(item)),
                },
                None => self.acquire().await,
            };

            match ticket {
                Ticket::Permit(permit) => {
                    permit.send(item);
                    return Ok(());
                }
                // The receiver behind this slot went away; try the next one.
                Ticket::Slot(slot) => match slot.send(item) {
                    Ok(()) => return Ok(()),
                    Err(back) => item = back,
                },
                Ticket::Closed => return Err(HandoffError::Closed(item)),
            }
        }
    }

    async fn acquire(&self) -> Ticket<'_, T> {
        let closed = &self.shared.closed;
        match &self.shared.chan {
            Chan::Rendezvous { ready_rx, .. } => tokio::select! {
                biased;
                _ = closed.cancelled() => Ticket::Closed,
                slot = async { ready_rx.lock().await.recv().await } => match slot {
                    Some(slot) => Ticket::Slot(slot),
                    None => Ticket::Closed,
                },
            },
            Chan::Buffered { tx, .. } => tokio::select! {
                biased;
                _ = closed.cancelled() => Ticket::Closed,
                permit = tx.reserve() => match permit {
                    Ok(permit) => Ticket::Permit(permit),
                    Err(_) => Ticket::Closed,
                },
            },
        }
    }
}

/// Consumer end of an intake.
pub struct IntakeReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for IntakeReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> IntakeReceiver<T> {
    /// Close the intake. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns true once the intake has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<T: Send> IntakeReceiver<T> {
    /// Wait for the next item.
    ///
    /// Returns `None` once the intake is closed. A buffered intake first
    /// drains whatever is still queued.
    pub async fn recv(&self) -> Option<T> {
        let closed = &self.shared.closed;
        match &self.shared.chan {
            Chan::Rendezvous { ready_tx, .. } => {
                if closed.is_cancelled() {
                    return None;
                }
                let (slot, mut taken) = oneshot::channel();
                ready_tx.send(slot).ok()?;
                tokio::select! {
                    biased;
                    item = &mut taken => item.ok(),
                    // A sender may have filled the slot just before the close.
                    _ = closed.cancelled() => taken.try_recv().ok(),
                }
            }
            Chan::Buffered { rx, .. } => {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    item = rx.recv() => item,
                    _ = closed.cancelled() => {
                        // Outstanding permits still land before recv yields None.
                        rx.close();
                        rx.recv().await
                    }
                }
            }
        }
    }
}
