//! Test helpers and utilities

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use drop_gate::config::{Mode, SimulationConfig};
use drop_gate::{PoolRequest, Report, Simulation};

pub const INTERVAL: Duration = Duration::from_millis(100);
pub const PROCESSING: Duration = Duration::from_millis(1000);
pub const TIMEOUT: Duration = Duration::from_millis(500);

/// Balanced-load parameters without a halt.
pub fn scenario(pool_size: usize, num_requests: usize) -> SimulationConfig {
    SimulationConfig {
        pool_size,
        request_interval: INTERVAL,
        processing_time: PROCESSING,
        num_requests,
        admission_timeout: TIMEOUT,
        mode: Mode::DropPattern,
        ..SimulationConfig::default()
    }
    .without_halt()
}

/// Run a simulation to completion.
pub async fn run(config: SimulationConfig) -> Report {
    Simulation::new(config)
        .run()
        .await
        .expect("simulation should complete")
}

pub fn processed_ids(report: &Report) -> BTreeSet<u64> {
    report.processed_requests.iter().map(|r| r.id()).collect()
}

pub fn dropped_ids(report: &Report) -> BTreeSet<u64> {
    report
        .dropped_requests
        .iter()
        .map(|d| d.request.id())
        .collect()
}

/// Every generated request ends up exactly once in exactly one of the logs.
pub fn assert_accounted(report: &Report) {
    let processed = processed_ids(report);
    let dropped = dropped_ids(report);

    assert_eq!(processed.len(), report.processed_requests.len(), "processed twice");
    assert_eq!(dropped.len(), report.dropped_requests.len(), "dropped twice");
    assert!(processed.is_disjoint(&dropped), "processed and dropped overlap");

    let all: BTreeSet<u64> = processed.union(&dropped).copied().collect();
    let expected: BTreeSet<u64> = (0..report.requests as u64).collect();
    assert_eq!(all, expected);
    assert_eq!(report.processed + report.dropped, report.requests);
}

/// Wait recorded by the worker for every processed request.
pub fn waits(report: &Report) -> Vec<Duration> {
    report
        .processed_requests
        .iter()
        .map(|r| r.wait_duration().expect("processed request has a wait"))
        .collect()
}
