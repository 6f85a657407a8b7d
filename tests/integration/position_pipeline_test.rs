// End-to-end pipeline scenarios against a scriptable upstream source:
// healthy flow, high-risk drops, breaker-open degradation, and idempotent
// lifecycle transitions.

#[path = "../common/mod.rs"]
#[allow(dead_code)]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{position, MockPositionSource};
use railwatch::{
    CircuitBreakerConfig, CircuitState, ConnectionStatus, PositionPipelineConfig, RailwatchConfig,
    ServiceContainer, TrainPosition,
};

const SECTION: &str = "SEC-001";

fn fast_config() -> RailwatchConfig {
    RailwatchConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_secs: 60,
            request_timeout_ms: 500,
        },
        pipeline: PositionPipelineConfig {
            poll_interval_ms: 20,
            failure_backoff_ms: 40,
            initial_retry_delay_ms: 10,
            max_retry_delay_ms: 100,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn container(source: Arc<MockPositionSource>) -> ServiceContainer {
    ServiceContainer::new(fast_config(), source).unwrap()
}

/// Wait for a condition with a deadline, polling between checks.
async fn wait_for(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_valid_position_flows_through_pipeline() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 60.0,
    )]));
    let container = container(source);
    let pipeline = container.pipeline();

    let mut rx = pipeline.subscribe_to_section_updates(SECTION);

    // The first non-empty batch carries the seeded position.
    let batch = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let batch: Vec<TrainPosition> = rx.recv().await.unwrap();
            if !batch.is_empty() {
                return batch;
            }
        }
    })
    .await
    .expect("pipeline emitted nothing within the deadline");

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].train_id, "12951");
    assert_eq!(batch[0].speed_kmh, 60.0);

    assert_eq!(pipeline.connection_status(), ConnectionStatus::Connected);
    // All upstream calls succeeded, so reliability sits at the breaker
    // baseline.
    assert_eq!(pipeline.data_quality().reliability, 1.0);
    assert_eq!(container.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(pipeline.metrics().validation_failures, 0);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_high_risk_position_is_dropped_and_counted() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 300.0,
    )]));
    let container = container(source);
    let pipeline = container.pipeline();

    let mut rx = pipeline.subscribe_to_section_updates(SECTION);

    // Emissions happen, but the high-risk record never survives filtering.
    let batch: Vec<TrainPosition> =
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no emission within the deadline")
            .unwrap();
    assert!(batch.is_empty());

    assert!(
        wait_for(
            || pipeline.metrics().validation_failures >= 1,
            Duration::from_secs(5)
        )
        .await,
        "validation failure was never recorded"
    );
    assert_eq!(pipeline.metrics().records_emitted, 0);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_upstream_failures_open_the_breaker() {
    let source = Arc::new(MockPositionSource::new());
    source.fail_forever();
    let container = container(source.clone());
    let pipeline = container.pipeline();
    let breaker = container.circuit_breaker();

    let mut rx = pipeline.subscribe_to_section_updates(SECTION);

    assert!(
        wait_for(|| breaker.state() == CircuitState::Open, Duration::from_secs(10)).await,
        "breaker never opened"
    );
    assert!(!breaker.can_execute());

    // The subscription keeps emitting empty batches instead of dying.
    let batch: Vec<TrainPosition> =
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stream went silent after breaker opened")
            .unwrap();
    assert!(batch.is_empty());

    assert!(pipeline.metrics().failed_fetches >= 5);

    // Once open, subsequent iterations are rejected without reaching the
    // upstream and the connection degrades instead of disconnecting.
    assert!(
        wait_for(
            || pipeline.metrics().circuit_rejections > 0,
            Duration::from_secs(5)
        )
        .await,
        "breaker rejections were never recorded"
    );
    assert_eq!(pipeline.connection_status(), ConnectionStatus::Degraded);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_arrivals_are_dropped() {
    // The mock returns the same record on every poll; only the first
    // emission carries it.
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 60.0,
    )]));
    let container = container(source);
    let pipeline = container.pipeline();

    let _rx = pipeline.subscribe_to_section_updates(SECTION);

    assert!(
        wait_for(
            || pipeline.metrics().duplicates_dropped >= 2,
            Duration::from_secs(5)
        )
        .await,
        "duplicates were not detected"
    );
    assert_eq!(pipeline.metrics().records_emitted, 1);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_and_stop_are_idempotent() {
    let source = Arc::new(MockPositionSource::new());
    let container = container(source);
    let pipeline = container.pipeline();

    assert!(!pipeline.is_running());
    pipeline.start();
    assert!(pipeline.is_running());
    let status_after_start = pipeline.connection_status();

    // Second start is a no-op.
    pipeline.start();
    assert!(pipeline.is_running());
    assert_eq!(pipeline.connection_status(), status_after_start);

    pipeline.stop();
    assert!(!pipeline.is_running());
    assert_eq!(pipeline.connection_status(), ConnectionStatus::Disconnected);

    // Second stop is a no-op.
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert_eq!(pipeline.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_implicitly_starts_the_pipeline() {
    let source = Arc::new(MockPositionSource::new());
    let container = container(source);
    let pipeline = container.pipeline();

    assert!(!pipeline.is_running());
    let _rx = pipeline.subscribe_to_train_updates("12951");
    assert!(pipeline.is_running());

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_train_subscription_emits_single_positions() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 72.0,
    )]));
    let container = container(source);
    let pipeline = container.pipeline();

    let mut rx = pipeline.subscribe_to_train_updates("12951");
    let received: TrainPosition = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no train update within the deadline")
        .unwrap();

    assert_eq!(received.train_id, "12951");
    assert_eq!(received.speed_kmh, 72.0);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_position_validates_before_insert() {
    let source = Arc::new(MockPositionSource::new());
    let container = container(source.clone());
    let pipeline = container.pipeline();
    pipeline.start();

    // A valid update reaches the upstream store.
    pipeline
        .update_position(position("12951", SECTION, 60.0))
        .await
        .unwrap();
    assert_eq!(source.insert_count(), 1);

    // An invalid update is rejected before any upstream call.
    let mut bad = position("12951", SECTION, 60.0);
    bad.latitude = 120.0;
    let err = pipeline.update_position(bad).await.unwrap_err();
    assert_eq!(err.kind, railwatch::ErrorKind::ValidationError);
    assert_eq!(source.insert_count(), 1);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recovery_after_transient_failures() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 60.0,
    )]));
    // Fewer failures than the breaker threshold, then recovery.
    source.fail_next(3);
    let container = container(source);
    let pipeline = container.pipeline();
    let breaker = container.circuit_breaker();

    let mut rx = pipeline.subscribe_to_section_updates(SECTION);

    let batch = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let batch: Vec<TrainPosition> = rx.recv().await.unwrap();
            if !batch.is_empty() {
                return batch;
            }
        }
    })
    .await
    .expect("pipeline never recovered");

    assert_eq!(batch[0].train_id, "12951");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(pipeline.connection_status(), ConnectionStatus::Connected);

    container.shutdown();
}
