//! drop_gate - a bounded worker pool behind an admission gate that drops late requests.
//!
//! A producer emits requests at a fixed interval. In drop mode each request
//! enters a waiting room, which tries to hand it to an idle worker through a
//! zero-buffer intake and drops it if no worker takes it within the timeout.
//! The pool can be halted for a while to inject a fault. After the run the
//! pool reports average idle time per worker and average wait per request.
//!
//! # Architecture
//!
//! - [`intake`] - rendezvous and buffered hand-off between producers and workers
//! - [`waiting_room`] - per-request admission with timeout
//! - [`pool`] - fixed worker pool, halt schedule, processors
//! - [`simulation`] - generator and end-to-end run producing a [`Report`]
//!
//! # Example
//!
//! ```rust,ignore
//! use drop_gate::config::SimulationConfig;
//! use drop_gate::Simulation;
//!
//! let report = Simulation::new(SimulationConfig::default()).run().await?;
//! println!("dropped {} of {}", report.dropped, report.requests);
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars), empty when built outside a checkout
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod intake;
pub mod logging;
pub mod observability;
pub mod pool;
pub mod request;
pub mod simulation;
pub mod waiting_room;

// Re-exports for convenience
pub use config::Config;
pub use pool::{PoolConfig, PoolError, WorkerPool};
pub use request::{PoolRequest, Request};
pub use simulation::{Report, Simulation, SimulationError};
pub use waiting_room::{GateError, WaitingRoom};
