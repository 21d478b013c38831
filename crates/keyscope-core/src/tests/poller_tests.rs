//! Tests for the key-count poller

use std::sync::Arc;
use std::time::Duration;

use super::fixtures::MockBackend;
use crate::poller::{CountPoller, CountReading, DEFAULT_REFRESH_INTERVAL};

const INTERVAL: Duration = Duration::from_secs(30);

/// Let spawned tasks run without moving the paused clock far
async fn yield_to_tasks() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_first_reading_is_immediate() {
    let backend = MockBackend::new();
    backend.count(42);
    let mut poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);

    assert_eq!(poller.changed().await, Some(CountReading::Count(42)));
    assert_eq!(poller.latest(), CountReading::Count(42));
    assert_eq!(backend.count_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polls_every_interval() {
    let backend = MockBackend::new();
    backend.count(1);
    backend.count(2);
    backend.count(3);
    let mut poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);

    assert_eq!(poller.changed().await, Some(CountReading::Count(1)));

    tokio::time::sleep(INTERVAL / 2).await;
    assert_eq!(backend.count_calls(), 1);

    assert_eq!(poller.changed().await, Some(CountReading::Count(2)));
    assert_eq!(poller.changed().await, Some(CountReading::Count(3)));
    assert_eq!(backend.count_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_is_reported() {
    let backend = MockBackend::new();
    backend.count_error(503, "unavailable");
    backend.count(7);
    let mut poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);

    assert!(matches!(
        poller.changed().await,
        Some(CountReading::Failed(message)) if message.contains("unavailable")
    ));
    assert_eq!(poller.changed().await, Some(CountReading::Count(7)));
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_requests_and_resume_polls_immediately() {
    let backend = MockBackend::new();
    let mut poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);
    poller.changed().await;
    assert_eq!(backend.count_calls(), 1);

    poller.pause();
    assert!(poller.is_paused());
    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(backend.count_calls(), 1);

    assert!(!poller.toggle_pause());
    yield_to_tasks().await;
    assert_eq!(backend.count_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_task() {
    let backend = MockBackend::new();
    let mut poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);
    poller.changed().await;

    poller.stop();
    yield_to_tasks().await;
    assert!(poller.is_stopped());

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(backend.count_calls(), 1);
    assert_eq!(poller.changed().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_polling() {
    let backend = MockBackend::new();
    let poller = CountPoller::spawn(Arc::clone(&backend), "dev", INTERVAL);
    let mut readings = poller.subscribe();
    readings.changed().await.unwrap();
    drop(poller);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(backend.count_calls(), 1);
}

#[test]
fn test_default_interval_is_thirty_seconds() {
    assert_eq!(DEFAULT_REFRESH_INTERVAL, Duration::from_secs(30));
}
