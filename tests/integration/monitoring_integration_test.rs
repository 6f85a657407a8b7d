// Monitoring service integration: health aggregation, safety checks on
// recorded positions, and the correlation/anomaly/insight alert wiring.

#[path = "../common/mod.rs"]
#[allow(dead_code)]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{position, position_with_timestamp, MockPositionSource};
use railwatch::utils::now_ms;
use railwatch::{
    AlertSeverity, AlertType, CircuitBreakerConfig, MonitoringServiceConfig,
    PositionPipelineConfig, RailwatchConfig, ServiceContainer, SystemHealthStatus,
};

const SECTION: &str = "SEC-001";

fn fast_config() -> RailwatchConfig {
    RailwatchConfig {
        circuit_breaker: CircuitBreakerConfig {
            request_timeout_ms: 500,
            ..Default::default()
        },
        pipeline: PositionPipelineConfig {
            poll_interval_ms: 20,
            failure_backoff_ms: 40,
            initial_retry_delay_ms: 10,
            max_retry_delay_ms: 100,
            ..Default::default()
        },
        monitoring: MonitoringServiceConfig {
            health_check_interval_secs: 1,
            metrics_sync_interval_secs: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

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
async fn test_record_position_feeds_metric_series() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();

    monitoring.record_position(&position("12951", SECTION, 60.0));

    assert_eq!(monitoring.statistics().positions_recorded, 1);
    assert_eq!(monitoring.statistics().safety_violations, 0);
    let names = container.correlation_engine().metric_names();
    assert!(names.contains(&"train.speed_kmh".to_string()));
    assert!(names.contains(&"ingestion.position_age_ms".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_impossible_speed_triggers_safety_alert() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();
    let alerting = container.alerting();

    monitoring.record_position(&position("12951", SECTION, 280.0));

    assert_eq!(monitoring.statistics().safety_violations, 1);
    let active = alerting.active_alerts();
    assert!(active
        .iter()
        .any(|a| a.alert_type == AlertType::Security && a.severity == AlertSeverity::High));
    assert!(container
        .correlation_engine()
        .metric_names()
        .contains(&"security.speed_violations".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_position_counts_as_safety_violation() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();

    let stale = position_with_timestamp("12951", SECTION, 60.0, now_ms() - 6 * 60 * 1_000);
    monitoring.record_position(&stale);

    assert_eq!(monitoring.statistics().safety_violations, 1);
    assert!(container
        .correlation_engine()
        .metric_names()
        .contains(&"security.stale_positions".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_degrades_without_ingestion() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();

    // No subscription has ever connected, so ingestion health fails.
    let health = monitoring.run_health_check_now();
    assert!(!health.ingestion_healthy);
    assert_eq!(health.status, SystemHealthStatus::Degraded);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_critical_alert_escalates_health_to_critical() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();
    let alerting = container.alerting();

    alerting.raise_alert(
        "test",
        AlertType::System,
        AlertSeverity::Critical,
        "Upstream store unreachable",
        "all replicas down",
        Default::default(),
    );

    let health = monitoring.run_health_check_now();
    assert_eq!(health.status, SystemHealthStatus::Critical);
    assert_eq!(health.critical_alerts, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_warning_on_many_high_alerts() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 60.0,
    )]));
    let container = ServiceContainer::new(fast_config(), source).unwrap();
    let monitoring = container.monitoring();
    let pipeline = container.pipeline();
    let alerting = container.alerting();

    // Bring ingestion to a connected state first.
    let _rx = pipeline.subscribe_to_section_updates(SECTION);
    assert!(
        wait_for(
            || pipeline.connection_status().is_connected(),
            Duration::from_secs(5)
        )
        .await,
        "pipeline never connected"
    );

    for i in 0..6 {
        alerting.raise_alert(
            "test",
            AlertType::NetworkLatency,
            AlertSeverity::High,
            &format!("slow link {}", i),
            "latency above threshold",
            Default::default(),
        );
    }

    let health = monitoring.run_health_check_now();
    assert!(health.ingestion_healthy);
    assert_eq!(health.status, SystemHealthStatus::Warning);
    assert_eq!(health.high_alerts, 6);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_anomaly_stream_raises_classified_alert() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();
    let engine = container.correlation_engine();
    let alerting = container.alerting();

    monitoring.start();

    // Stable latency baseline, then a spike well past the threshold.
    let base = now_ms();
    for i in 0..20u64 {
        let noise = if i % 2 == 0 { 1.0 } else { -1.0 };
        engine.record_metric("upstream.latency_ms", 100.0 + noise, base + i * 1_000, None);
    }
    engine.record_metric("upstream.latency_ms", 400.0, base + 20_000, None);

    assert!(
        wait_for(
            || alerting
                .active_alerts()
                .iter()
                .any(|a| a.alert_type == AlertType::NetworkLatency
                    && a.severity == AlertSeverity::Critical),
            Duration::from_secs(5)
        )
        .await,
        "anomaly alert was never raised"
    );
    assert!(monitoring.statistics().anomaly_alerts >= 1);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_very_strong_correlation_raises_alert_once() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();
    let engine = container.correlation_engine();
    let alerting = container.alerting();

    monitoring.start();

    let base = now_ms();
    for i in 1..=15u64 {
        let timestamp = base + i * 1_000;
        engine.record_metric("ingestion.error_rate", i as f64 * 0.01, timestamp, None);
        engine.record_metric("system.memory_used_mb", i as f64 * 12.0, timestamp, None);
    }

    assert!(
        wait_for(
            || alerting
                .active_alerts()
                .iter()
                .any(|a| a.alert_type == AlertType::Correlation
                    && a.severity == AlertSeverity::High),
            Duration::from_secs(5)
        )
        .await,
        "correlation alert was never raised"
    );

    // The pair stays above the threshold; the subscriber must not re-alert
    // for every subsequent pass.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let correlation_alerts = alerting
        .active_alerts()
        .iter()
        .filter(|a| a.alert_type == AlertType::Correlation && a.severity == AlertSeverity::High)
        .count();
    assert_eq!(correlation_alerts, 1);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_sync_populates_engine_series() {
    let source = Arc::new(MockPositionSource::with_positions(vec![position(
        "12951", SECTION, 60.0,
    )]));
    let container = ServiceContainer::new(fast_config(), source).unwrap();
    let monitoring = container.monitoring();
    let engine = container.correlation_engine();

    container.start();
    let _rx = container.pipeline().subscribe_to_section_updates(SECTION);

    assert!(
        wait_for(
            || {
                let names = engine.metric_names();
                names.contains(&"ingestion.latency_ms".to_string())
                    && names.contains(&"connection.reliability".to_string())
                    && names.contains(&"system.memory_used_mb".to_string())
            },
            Duration::from_secs(5)
        )
        .await,
        "metrics sync never populated the engine"
    );
    assert!(monitoring.statistics().metrics_sync_runs >= 1);

    container.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dashboard_document_structure() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();

    monitoring.record_position(&position("12951", SECTION, 60.0));
    let dashboard = monitoring.get_monitoring_dashboard();

    assert!(dashboard.get("system_health").is_some());
    assert!(dashboard.get("statistics").is_some());
    assert!(dashboard["ingestion"].get("connection_status").is_some());
    assert!(dashboard.get("circuit_breaker").is_some());
    assert!(dashboard["alerts"].get("statistics").is_some());
    assert!(dashboard["analysis"].get("correlations").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cleanup_clears_engine_and_alerts() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();
    let alerting = container.alerting();

    monitoring.record_position(&position("12951", SECTION, 280.0));
    assert!(!alerting.active_alerts().is_empty());

    monitoring.cleanup_old_data(now_ms() + 60_000);

    assert!(alerting.active_alerts().is_empty());
    assert!(container.correlation_engine().metric_names().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitoring_start_stop_idempotence() {
    let container = ServiceContainer::new(fast_config(), Arc::new(MockPositionSource::new())).unwrap();
    let monitoring = container.monitoring();

    monitoring.start();
    assert!(monitoring.is_running());
    monitoring.start();
    assert!(monitoring.is_running());

    monitoring.stop();
    assert!(!monitoring.is_running());
    monitoring.stop();
    assert!(!monitoring.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_container_lifecycle() {
    let source = Arc::new(MockPositionSource::new());
    let container = ServiceContainer::new(fast_config(), source).unwrap();

    container.start();
    assert!(container.pipeline().is_running());
    assert!(container.monitoring().is_running());

    container.shutdown();
    assert!(!container.pipeline().is_running());
    assert!(!container.monitoring().is_running());

    // Shutdown is idempotent.
    container.shutdown();
}
