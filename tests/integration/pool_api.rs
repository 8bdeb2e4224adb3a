//! Pool and waiting room driven directly, without the simulation driver.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use drop_gate::intake;
use drop_gate::pool::{HaltConfig, PoolState, Processor};
use drop_gate::{PoolConfig, PoolRequest, Request, WaitingRoom, WorkerPool};

/// A request with a payload the pool knows nothing about.
#[derive(Debug, Clone)]
struct Job {
    id: u64,
    payload: String,
    created_at: Instant,
    wait: Option<Duration>,
}

impl Job {
    fn new(id: u64, payload: &str) -> Self {
        Self {
            id,
            payload: payload.to_string(),
            created_at: Instant::now(),
            wait: None,
        }
    }
}

impl PoolRequest for Job {
    fn id(&self) -> u64 {
        self.id
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }

    fn wait_duration(&self) -> Option<Duration> {
        self.wait
    }

    fn set_wait_duration(&mut self, wait: Duration) {
        self.wait = Some(wait);
    }
}

/// Takes as long as the payload is long, in milliseconds, and remembers what it saw.
#[derive(Default)]
struct PayloadLength {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Processor<Job> for Arc<PayloadLength> {
    async fn process(&self, job: &Job) {
        sleep(Duration::from_millis(job.payload.len() as u64)).await;
        self.seen.lock().unwrap().push(job.payload.clone());
    }

    fn name(&self) -> &'static str {
        "payload-length"
    }
}

#[tokio::test(start_paused = true)]
async fn test_metric_reads_are_idempotent_after_stop() {
    let (tx, rx) = intake::rendezvous::<Request>();
    let pool = WorkerPool::new(PoolConfig::new(2, Duration::from_millis(300)).unwrap(), rx);
    pool.start().unwrap();

    let room = WaitingRoom::new(Duration::from_millis(500), tx);
    room.open().unwrap();
    for i in 0..6 {
        sleep(Duration::from_millis(100)).await;
        room.admit(Request::new(i)).await.unwrap();
    }
    room.close().await;
    pool.stop().await;

    let admitted = room.admitted_count();
    let idle = pool.average_idle_time();
    let wait = pool.average_wait_time(admitted);

    sleep(Duration::from_secs(10)).await;

    assert_eq!(pool.average_idle_time(), idle);
    assert_eq!(pool.average_wait_time(admitted), wait);
    assert_eq!(pool.processed_count(), admitted);
    assert!(!pool.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_custom_request_and_processor() {
    let processor = Arc::new(PayloadLength::default());
    let (tx, rx) = intake::rendezvous::<Job>();
    let pool = WorkerPool::with_processor(
        PoolConfig::new(1, Duration::ZERO).unwrap(),
        rx,
        Arc::clone(&processor),
    );
    pool.start().unwrap();

    tx.send(Job::new(1, "first")).await.unwrap();
    tx.send(Job::new(2, "second")).await.unwrap();
    pool.stop().await;

    let processed = pool.processed_requests();
    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].wait, Some(Duration::ZERO));
    // The second job waited for the first one to finish.
    assert_eq!(processed[1].wait, Some(Duration::from_millis(5)));
    assert_eq!(*processor.seen.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_pool_state_follows_halt_schedule() {
    let (_tx, rx) = intake::rendezvous::<Request>();
    let config = PoolConfig::new(1, Duration::from_millis(100))
        .unwrap()
        .with_halt(HaltConfig::new(
            Duration::from_millis(1000),
            Duration::from_millis(2000),
        ));
    let pool = WorkerPool::new(config, rx);
    pool.start().unwrap();

    assert_eq!(pool.state(), PoolState::Operational);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(pool.state(), PoolState::Halted);
    sleep(Duration::from_millis(2000)).await;
    assert_eq!(pool.state(), PoolState::Operational);

    pool.stop().await;
    assert_eq!(pool.stats().processed, 0);
}
