//! Waiting room in front of a zero-buffer pool intake.

use std::time::Duration;

use drop_gate::config::SimulationConfig;
use drop_gate::PoolRequest;

use crate::helpers::{assert_accounted, run, scenario, waits, INTERVAL, TIMEOUT};

/// Halt at 1s for 2s with ten workers.
fn fault_scenario() -> SimulationConfig {
    scenario(10, 100).with_halt(Duration::from_millis(1000), Duration::from_millis(2000))
}

#[tokio::test(start_paused = true)]
async fn test_balanced_system() {
    let report = run(scenario(10, 100)).await;

    assert_accounted(&report);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.processed, 100);

    assert!(
        report.average_idle_time < Duration::from_secs(1),
        "idle time too high: {:?}",
        report.average_idle_time
    );
    let wait = report.average_wait_time.expect("requests were admitted");
    assert!(wait < Duration::from_millis(1), "wait time too high: {:?}", wait);
}

#[tokio::test(start_paused = true)]
async fn test_many_workers_stay_idle() {
    let report = run(scenario(100, 100)).await;

    assert_accounted(&report);
    assert_eq!(report.dropped, 0);
    assert!(
        report.average_idle_time > Duration::from_secs(5),
        "idle time too low: {:?}",
        report.average_idle_time
    );
    let wait = report.average_wait_time.expect("requests were admitted");
    assert!(wait < Duration::from_millis(1), "wait time too high: {:?}", wait);
}

#[tokio::test(start_paused = true)]
async fn test_temporary_block_drops_requests() {
    let report = run(fault_scenario()).await;

    assert_accounted(&report);
    assert!(report.dropped > 0, "a two second halt should cause drops");
    assert!(
        report.average_idle_time < Duration::from_secs(1),
        "idle time too high: {:?}",
        report.average_idle_time
    );

    let wait = report.average_wait_time.expect("requests were admitted");
    assert!(wait <= TIMEOUT * 3, "wait time too high: {:?}", wait);
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_halt_wait_less_than_timeout() {
    let config = fault_scenario();
    let halt_ends = config.halt_after + config.halt_duration;
    let report = run(config).await;

    // Request n is created (n + 1) intervals after the pool starts.
    let after_halt = report
        .processed_requests
        .iter()
        .filter(|r| INTERVAL * (r.id() as u32 + 1) > halt_ends);

    let mut seen = 0;
    for request in after_halt {
        let wait = request.wait_duration().expect("processed request has a wait");
        assert!(wait <= TIMEOUT, "request {} waited {:?}", request.id(), wait);
        seen += 1;
    }
    assert!(seen > 0);
}

#[tokio::test(start_paused = true)]
async fn test_halt_bounds_wait_of_held_requests() {
    let config = fault_scenario();
    let bound = config.admission_timeout + config.halt_duration;
    let report = run(config).await;

    assert!(report.max_wait_time > TIMEOUT, "held requests wait out the halt");
    assert!(report.max_wait_time <= bound);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_requests_respect_timeout() {
    // One slow worker: most requests cannot be taken in time.
    let report = run(scenario(1, 20)).await;

    assert_accounted(&report);
    assert!(report.dropped > 10);
    for dropped in &report.dropped_requests {
        assert!(dropped.dropped_after >= TIMEOUT);
        assert!(dropped.dropped_after < TIMEOUT + Duration::from_millis(1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_admitted_requests_never_wait_past_timeout() {
    let report = run(scenario(3, 50)).await;

    assert_accounted(&report);
    assert!(report.dropped > 0);
    for wait in waits(&report) {
        assert!(wait <= TIMEOUT, "admitted request waited {:?}", wait);
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_admits_only_ready_workers() {
    let config = SimulationConfig {
        admission_timeout: Duration::ZERO,
        processing_time: Duration::from_secs(60),
        ..scenario(1, 5)
    };
    let report = run(config).await;

    // The single worker takes the first request and stays busy.
    assert_accounted(&report);
    assert_eq!(report.processed, 1);
    assert_eq!(report.dropped, 4);
    assert_eq!(report.average_wait_time, Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn test_no_requests_leaves_wait_undefined() {
    let report = run(scenario(1, 0)).await;

    assert_eq!(report.processed, 0);
    assert_eq!(report.average_wait_time, None);
}
