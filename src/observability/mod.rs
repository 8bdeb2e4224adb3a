//! Observability for the waiting room and the worker pool.
//!
//! Every run gets its own Prometheus [`Metrics`] registry. Pool and waiting
//! room record into it when one is attached; the driver prints the text
//! exposition once both have stopped.
//!
//! ```rust,ignore
//! use drop_gate::observability::Metrics;
//!
//! let metrics = std::sync::Arc::new(Metrics::new()?);
//! let pool = WorkerPool::new(config, intake).with_metrics(metrics.clone());
//! // ... run ...
//! println!("{}", metrics.export());
//! ```

pub mod metrics;

pub use metrics::Metrics;
