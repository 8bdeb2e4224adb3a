//! Pool fed directly through an intake buffered for every request.

use std::time::Duration;

use drop_gate::config::{Mode, SimulationConfig};

use crate::helpers::{assert_accounted, run, scenario};

fn no_drop(pool_size: usize) -> SimulationConfig {
    scenario(pool_size, 100).with_mode(Mode::NoDrop)
}

#[tokio::test(start_paused = true)]
async fn test_balanced_system() {
    let report = run(no_drop(10)).await;

    assert_accounted(&report);
    assert_eq!(report.processed, 100);
    assert!(report.average_idle_time < Duration::from_secs(1));

    let wait = report.average_wait_time.expect("requests were processed");
    assert!(wait < Duration::from_millis(1), "wait time too high: {:?}", wait);
}

#[tokio::test(start_paused = true)]
async fn test_many_workers_stay_idle() {
    let report = run(no_drop(100)).await;

    assert_accounted(&report);
    assert!(
        report.average_idle_time > Duration::from_secs(5),
        "idle time too low: {:?}",
        report.average_idle_time
    );
}

#[tokio::test(start_paused = true)]
async fn test_temporary_block_delays_every_later_request() {
    // A single worker makes the halt show up in every request queued behind it.
    let config = SimulationConfig {
        processing_time: Duration::from_millis(100),
        ..no_drop(1)
    }
    .with_halt(Duration::from_millis(1000), Duration::from_millis(2000));
    let report = run(config).await;

    assert_accounted(&report);
    assert_eq!(report.dropped, 0);
    assert!(
        report.average_idle_time < Duration::from_secs(1),
        "idle time too high: {:?}",
        report.average_idle_time
    );

    let wait = report.average_wait_time.expect("requests were processed");
    assert!(wait >= Duration::from_millis(1500), "wait time too low: {:?}", wait);
}

#[tokio::test(start_paused = true)]
async fn test_underprovisioned_pool_still_processes_everything() {
    let report = run(no_drop(2)).await;

    assert_accounted(&report);
    assert_eq!(report.processed, 100);
    // Two workers need fifty seconds for the whole backlog.
    assert!(report.elapsed >= Duration::from_secs(50));
    assert!(report.max_wait_time > Duration::from_secs(30));
}
