//! Tests for the Worker module

use super::{RequestRateLimiter, WorkerBuilder};
use crate::metrics::Record;
use crate::response::{ErrorKind, HttpReply};
use crate::testing::{FixedSampler, MockTarget};
use crate::traits::{StopCondition, TransportError};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const BASE: &str = "http://127.0.0.1:18080";

// ============================================================================
// Stop conditions
// ============================================================================

#[tokio::test]
async fn test_worker_request_count_without_counter() {
    let target = Arc::new(MockTarget::ok());
    let worker = WorkerBuilder::new(0)
        .target(target.clone())
        .sampler(Arc::new(FixedSampler::new("/")))
        .base_url(BASE)
        .stop_condition(StopCondition::RequestCount(7))
        .build()
        .unwrap();

    let stats = worker.run(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.completed, 7);
    assert_eq!(target.calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_workers_share_counter_exactly() {
    let target = Arc::new(MockTarget::ok());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for id in 0..3 {
        let worker = WorkerBuilder::new(id)
            .target(target.clone())
            .sampler(Arc::new(FixedSampler::new("/")))
            .base_url(BASE)
            .stop_condition(StopCondition::RequestCount(10))
            .request_counter(counter.clone())
            .build()
            .unwrap();
        handles.push(tokio::spawn(worker.run(CancellationToken::new())));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().unwrap().total_requests();
    }
    assert_eq!(total, 10);
    assert_eq!(target.calls.load(Ordering::SeqCst), 10);
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_worker_duration_stop() {
    let target = Arc::new(MockTarget::ok().with_delay(Duration::from_millis(5)));
    let worker = WorkerBuilder::new(0)
        .target(target)
        .sampler(Arc::new(FixedSampler::new("/")))
        .base_url(BASE)
        .stop_condition(StopCondition::Duration(Duration::from_millis(60)))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let stats = worker.run(CancellationToken::new()).await.unwrap();
    assert!(stats.completed > 0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn test_worker_emits_classified_records() {
    let n = Arc::new(AtomicUsize::new(0));
    let seen = n.clone();
    let target = Arc::new(MockTarget::with_handler(move |_| {
        match seen.fetch_add(1, Ordering::SeqCst) % 4 {
            0 => Ok(HttpReply::new(200, "ok")),
            1 => Ok(HttpReply::new(404, "missing")),
            2 => Err(TransportError::Connect("refused".into())),
            _ => Err(TransportError::Timeout(Duration::from_secs(5))),
        }
    }));
    let (tx, mut rx) = mpsc::channel::<Record>(16);

    let worker = WorkerBuilder::new(0)
        .target(target)
        .sampler(Arc::new(FixedSampler::new("/params/search?q=x&limit=1")))
        .base_url(BASE)
        .record_tx(tx)
        .stop_condition(StopCondition::RequestCount(4))
        .build()
        .unwrap();

    let stats = worker.run(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.errors, 3);

    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    let kinds: Vec<ErrorKind> = records.iter().map(|r| r.error_kind).collect();
    assert_eq!(
        kinds,
        vec![
            ErrorKind::None,
            ErrorKind::Status,
            ErrorKind::Connect,
            ErrorKind::Timeout
        ]
    );
    assert_eq!(records[1].status, 404);
    assert_eq!(records[2].status, 0);
    assert_eq!(records[0].path, "/params/search?q=x&limit=1");
}

#[tokio::test]
async fn test_worker_binds_base_url() {
    let target = Arc::new(MockTarget::ok());
    let worker = WorkerBuilder::new(0)
        .target(target.clone())
        .sampler(Arc::new(FixedSampler::new("/db/redis/users/3")))
        .base_url(BASE)
        .stop_condition(StopCondition::RequestCount(1))
        .build()
        .unwrap();
    worker.run(CancellationToken::new()).await.unwrap();

    let urls = target.urls.lock().unwrap().clone();
    assert_eq!(urls, vec![format!("{}/db/redis/users/3", BASE)]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_worker_stops_on_cancel() {
    let target = Arc::new(MockTarget::ok().with_delay(Duration::from_millis(20)));
    let cancel = CancellationToken::new();
    let worker = WorkerBuilder::new(0)
        .target(target)
        .sampler(Arc::new(FixedSampler::new("/")))
        .base_url(BASE)
        .stop_condition(StopCondition::Duration(Duration::from_secs(60)))
        .build()
        .unwrap();

    let handle = tokio::spawn(worker.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(70)).await;
    cancel.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
    assert!(stats.completed >= 1);
}

#[tokio::test]
async fn test_worker_cancelled_before_start_sends_nothing() {
    let target = Arc::new(MockTarget::ok());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let worker = WorkerBuilder::new(0)
        .target(target.clone())
        .sampler(Arc::new(FixedSampler::new("/")))
        .base_url(BASE)
        .stop_condition(StopCondition::RequestCount(100))
        .build()
        .unwrap();

    let stats = worker.run(cancel).await.unwrap();
    assert_eq!(stats.total_requests(), 0);
    assert_eq!(target.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_worker_shared_rate_limiter() {
    let target = Arc::new(MockTarget::ok());
    let worker = WorkerBuilder::new(0)
        .target(target)
        .sampler(Arc::new(FixedSampler::new("/")))
        .base_url(BASE)
        .rate_limiter(Arc::new(RequestRateLimiter::new(Some(1000.0))))
        .stop_condition(StopCondition::RequestCount(3))
        .build()
        .unwrap();

    let stats = worker.run(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.completed, 3);
}
