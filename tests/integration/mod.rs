//! Integration tests for drop_gate
//!
//! Every scenario runs the full simulation on Tokio's paused clock, so a
//! hundred-request run with second-long processing finishes instantly and
//! timings are exact.
//!
//! Run with: cargo test --test integration

mod helpers;

mod drop_pattern;
mod no_drop_pattern;
mod pool_api;
