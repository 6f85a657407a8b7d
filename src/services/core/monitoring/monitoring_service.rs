// Monitoring Service - Orchestrates the health-check and metrics-sync loops,
// listens to the correlation engine's derived streams, and aggregates a
// unified system-health snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::services::core::analysis::correlation_engine::{
    AnomalySeverity, CorrelationEngine, CorrelationStrength, InsightSeverity, InsightType,
    MetricAnomaly, MetricCorrelation, SystemInsight,
};
use crate::services::core::infrastructure::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::services::core::ingestion::position_pipeline::PositionPipeline;
use crate::services::core::monitoring::alerting_system::{
    AlertSeverity, AlertType, AlertingSystem,
};
use crate::types::TrainPosition;
use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Monitoring service configuration, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringServiceConfig {
    pub health_check_interval_secs: u64,
    pub metrics_sync_interval_secs: u64,
    /// Absolute coefficient a very strong correlation must cross before it
    /// raises an alert.
    pub correlation_alert_threshold: f64,
    /// Active high-severity alerts beyond this count degrade health to
    /// warning.
    pub high_alert_warning_count: usize,
    /// Speed treated as operationally impossible for rail (km/h).
    pub impossible_speed_kmh: f64,
    /// Positions older than this trip the staleness safety check (seconds).
    pub max_position_age_secs: u64,
    /// Process memory above this fails the memory health check (MiB).
    pub memory_critical_mb: u64,
}

impl Default for MonitoringServiceConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 60,
            metrics_sync_interval_secs: 30,
            correlation_alert_threshold: 0.8,
            high_alert_warning_count: 5,
            impossible_speed_kmh: 200.0,
            max_position_age_secs: 300,
            memory_critical_mb: 1_024,
        }
    }
}

impl MonitoringServiceConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.health_check_interval_secs == 0 {
            return Err(TelemetryError::configuration_error(
                "Health check interval must be greater than 0",
            ));
        }

        if self.metrics_sync_interval_secs == 0 {
            return Err(TelemetryError::configuration_error(
                "Metrics sync interval must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.correlation_alert_threshold) {
            return Err(TelemetryError::configuration_error(
                "Correlation alert threshold must be within [0, 1]",
            ));
        }

        if self.memory_critical_mb == 0 {
            return Err(TelemetryError::configuration_error(
                "Memory ceiling must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Overall system status, most severe first in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl SystemHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemHealthStatus::Healthy => "healthy",
            SystemHealthStatus::Warning => "warning",
            SystemHealthStatus::Degraded => "degraded",
            SystemHealthStatus::Critical => "critical",
        }
    }
}

/// Unified health snapshot, fully recomputed on each health-check cycle from
/// the latest component snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: SystemHealthStatus,
    pub ingestion_healthy: bool,
    pub correlation_healthy: bool,
    pub alerting_healthy: bool,
    pub memory_healthy: bool,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub high_alerts: usize,
    pub breaker_state: CircuitState,
    pub data_quality_score: f64,
    pub memory_used_mb: f64,
    pub last_updated: u64,
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self {
            status: SystemHealthStatus::Healthy,
            ingestion_healthy: false,
            correlation_healthy: true,
            alerting_healthy: true,
            memory_healthy: true,
            active_alerts: 0,
            critical_alerts: 0,
            high_alerts: 0,
            breaker_state: CircuitState::Closed,
            data_quality_score: 1.0,
            memory_used_mb: 0.0,
            last_updated: now_ms(),
        }
    }
}

/// Rolling counters over monitoring activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatistics {
    pub positions_recorded: u64,
    pub safety_violations: u64,
    pub health_checks_run: u64,
    pub metrics_sync_runs: u64,
    pub correlation_alerts: u64,
    pub anomaly_alerts: u64,
    pub insight_alerts: u64,
    pub started_at: u64,
    pub last_updated: u64,
}

impl Default for MonitoringStatistics {
    fn default() -> Self {
        let now = now_ms();
        Self {
            positions_recorded: 0,
            safety_violations: 0,
            health_checks_run: 0,
            metrics_sync_runs: 0,
            correlation_alerts: 0,
            anomaly_alerts: 0,
            insight_alerts: 0,
            started_at: now,
            last_updated: now,
        }
    }
}

/// State shared between the service handle and its spawned loops.
struct MonitoringShared {
    config: MonitoringServiceConfig,
    pipeline: Arc<PositionPipeline>,
    engine: Arc<CorrelationEngine>,
    alerting: Arc<AlertingSystem>,
    breaker: Arc<CircuitBreaker>,
    health_tx: watch::Sender<SystemHealth>,
    stats: RwLock<MonitoringStatistics>,
    running: AtomicBool,
    logger: Logger,
}

/// Top-level monitoring orchestrator. Owns the periodic loops and the
/// correlation/anomaly/insight subscribers once started.
pub struct MonitoringService {
    shared: Arc<MonitoringShared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitoringService {
    pub fn new(
        config: MonitoringServiceConfig,
        pipeline: Arc<PositionPipeline>,
        engine: Arc<CorrelationEngine>,
        alerting: Arc<AlertingSystem>,
        breaker: Arc<CircuitBreaker>,
    ) -> TelemetryResult<Self> {
        config.validate()?;

        let (health_tx, _) = watch::channel(SystemHealth::default());
        Ok(Self {
            shared: Arc::new(MonitoringShared {
                config,
                pipeline,
                engine,
                alerting,
                breaker,
                health_tx,
                stats: RwLock::new(MonitoringStatistics::default()),
                running: AtomicBool::new(false),
                logger: Logger::new("monitoring_service"),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start all monitoring loops. No-op when already running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        tasks.push(tokio::spawn(run_health_check_loop(self.shared.clone())));
        tasks.push(tokio::spawn(run_metrics_sync_loop(self.shared.clone())));
        tasks.push(tokio::spawn(run_correlation_subscriber(
            self.shared.clone(),
            self.shared.engine.subscribe_correlations(),
        )));
        tasks.push(tokio::spawn(run_anomaly_subscriber(
            self.shared.clone(),
            self.shared.engine.subscribe_anomalies(),
        )));
        tasks.push(tokio::spawn(run_insight_subscriber(
            self.shared.clone(),
            self.shared.engine.subscribe_insights(),
        )));

        self.shared.logger.info("monitoring service started");
    }

    /// Stop all owned loops promptly. No-op when already stopped.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.tasks.lock().expect("task list lock poisoned").drain(..) {
            handle.abort();
        }
        self.shared.logger.info("monitoring service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Record one position into the monitoring stream. Performs the dedicated
    /// safety check independently of the ingestion validator.
    pub fn record_position(&self, position: &TrainPosition) {
        let now = now_ms();
        {
            let mut stats = self.shared.stats.write().expect("stats lock poisoned");
            stats.positions_recorded += 1;
            stats.last_updated = now;
        }

        self.shared
            .engine
            .record_metric("train.speed_kmh", position.speed_kmh, now, None);
        self.shared.engine.record_metric(
            "ingestion.position_age_ms",
            position.age_ms() as f64,
            now,
            None,
        );

        if position.speed_kmh > self.shared.config.impossible_speed_kmh {
            self.record_safety_violation(position, now);
            self.shared.engine.record_metric(
                "security.speed_violations",
                position.speed_kmh,
                now,
                None,
            );
            let mut metadata = HashMap::new();
            metadata.insert(
                "speed_kmh".to_string(),
                serde_json::json!(position.speed_kmh),
            );
            metadata.insert("train_id".to_string(), serde_json::json!(position.train_id));
            self.shared.alerting.raise_alert(
                "monitoring_service",
                AlertType::Security,
                AlertSeverity::High,
                "Impossible speed reported",
                &format!(
                    "Train {} reported {} km/h",
                    position.train_id, position.speed_kmh
                ),
                metadata,
            );
        }

        let age_ms = position.age_ms();
        if age_ms > self.shared.config.max_position_age_secs * 1_000 {
            self.record_safety_violation(position, now);
            self.shared.engine.record_metric(
                "security.stale_positions",
                age_ms as f64,
                now,
                None,
            );
        }
    }

    fn record_safety_violation(&self, position: &TrainPosition, now: u64) {
        {
            let mut stats = self.shared.stats.write().expect("stats lock poisoned");
            stats.safety_violations += 1;
        }
        self.shared.engine.record_metric(
            "security.validation_failures",
            1.0,
            now,
            Some(HashMap::from([(
                "train_id".to_string(),
                position.train_id.clone(),
            )])),
        );
    }

    pub fn system_health(&self) -> SystemHealth {
        self.shared.health_tx.borrow().clone()
    }

    pub fn subscribe_system_health(&self) -> watch::Receiver<SystemHealth> {
        self.shared.health_tx.subscribe()
    }

    pub fn statistics(&self) -> MonitoringStatistics {
        self.shared
            .stats
            .read()
            .expect("stats lock poisoned")
            .clone()
    }

    /// Force one health-check cycle outside the periodic loop.
    pub fn run_health_check_now(&self) -> SystemHealth {
        self.shared.health_check_once()
    }

    /// Unified dashboard document over all component snapshots.
    pub fn get_monitoring_dashboard(&self) -> serde_json::Value {
        let health = self.system_health();
        let stats = self.statistics();
        let ingestion = self.shared.pipeline.metrics();
        let breaker = self.shared.breaker.metrics();
        let alert_stats = self.shared.alerting.statistics();

        serde_json::json!({
            "system_health": health,
            "statistics": stats,
            "ingestion": {
                "connection_status": self.shared.pipeline.connection_status().as_str(),
                "data_quality": self.shared.pipeline.data_quality(),
                "metrics": ingestion,
            },
            "circuit_breaker": breaker,
            "alerts": {
                "statistics": alert_stats,
                "active": self.shared.alerting.active_alerts(),
            },
            "analysis": {
                "correlations": self.shared.engine.correlations(),
                "insights": self.shared.engine.insights(),
            },
            "generated_at": now_ms(),
        })
    }

    /// Drop metric windows, derived artifacts, and alerts older than the
    /// cutoff.
    pub fn cleanup_old_data(&self, cutoff_ms: u64) {
        self.shared.engine.clear_old_data(cutoff_ms);
        let removed = self.shared.alerting.cleanup_old_data(cutoff_ms);
        self.shared
            .logger
            .info(&format!("cleanup removed {} aged alerts", removed));
    }
}

impl MonitoringShared {
    /// Recompute the unified health snapshot from the latest component
    /// snapshots and publish it.
    fn health_check_once(&self) -> SystemHealth {
        let connection = self.pipeline.connection_status();
        let breaker_metrics = self.breaker.metrics();
        let alert_stats = self.alerting.statistics();
        let memory_used_mb = sample_process_memory_mb();

        let ingestion_healthy =
            connection.is_connected() && breaker_metrics.state != CircuitState::Open;
        let correlation_healthy = self.engine.health_check();
        let alerting_healthy = self.alerting.health_check();
        let memory_healthy = memory_used_mb < self.config.memory_critical_mb as f64;

        let status = if alert_stats.critical_active > 0 {
            SystemHealthStatus::Critical
        } else if !ingestion_healthy || !memory_healthy {
            SystemHealthStatus::Degraded
        } else if alert_stats.high_active > self.config.high_alert_warning_count {
            SystemHealthStatus::Warning
        } else {
            SystemHealthStatus::Healthy
        };

        let health = SystemHealth {
            status,
            ingestion_healthy,
            correlation_healthy,
            alerting_healthy,
            memory_healthy,
            active_alerts: alert_stats.active_alerts,
            critical_alerts: alert_stats.critical_active,
            high_alerts: alert_stats.high_active,
            breaker_state: breaker_metrics.state,
            data_quality_score: self.pipeline.data_quality().overall_score,
            memory_used_mb,
            last_updated: now_ms(),
        };

        self.health_tx.send_replace(health.clone());
        {
            let mut stats = self.stats.write().expect("stats lock poisoned");
            stats.health_checks_run += 1;
            stats.last_updated = now_ms();
        }

        if status != SystemHealthStatus::Healthy {
            self.logger
                .warn(&format!("system health is {}", status.as_str()));
        }

        health
    }

    /// Push the latest ingestion, reliability, and memory readings into the
    /// correlation engine as named series.
    fn metrics_sync_once(&self) {
        let ingestion = self.pipeline.metrics();
        let breaker_metrics = self.breaker.metrics();
        let memory_used_mb = sample_process_memory_mb();
        let now = now_ms();

        self.engine
            .record_metric("ingestion.latency_ms", ingestion.avg_latency_ms, now, None);
        self.engine
            .record_metric("ingestion.error_rate", ingestion.error_rate(), now, None);
        self.engine.record_metric(
            "ingestion.records_processed",
            ingestion.records_emitted as f64,
            now,
            None,
        );
        self.engine.record_metric(
            "ingestion.validation_failures",
            ingestion.validation_failures as f64,
            now,
            None,
        );
        self.engine.record_metric(
            "connection.reliability",
            breaker_metrics.success_rate,
            now,
            None,
        );
        self.engine
            .record_metric("system.memory_used_mb", memory_used_mb, now, None);

        let mut stats = self.stats.write().expect("stats lock poisoned");
        stats.metrics_sync_runs += 1;
        stats.last_updated = now;
    }

    fn handle_correlation_batch(
        &self,
        batch: &[MetricCorrelation],
        alerted: &mut HashSet<(String, String)>,
    ) {
        for correlation in batch {
            let pair = (correlation.metric1.clone(), correlation.metric2.clone());
            let crosses = correlation.strength == CorrelationStrength::VeryStrong
                && correlation.coefficient.abs() >= self.config.correlation_alert_threshold;

            if !crosses {
                alerted.remove(&pair);
                continue;
            }
            if !alerted.insert(pair) {
                continue; // already alerted while above the threshold
            }

            let severity = correlation_alert_severity(correlation);
            let mut metadata = HashMap::new();
            metadata.insert(
                "coefficient".to_string(),
                serde_json::json!(correlation.coefficient),
            );
            metadata.insert(
                "sample_size".to_string(),
                serde_json::json!(correlation.sample_size),
            );

            self.alerting.raise_alert(
                "correlation_engine",
                AlertType::Correlation,
                severity,
                &format!(
                    "Very strong correlation: {} / {}",
                    correlation.metric1, correlation.metric2
                ),
                &format!(
                    "Coefficient {:.2} over {} samples",
                    correlation.coefficient, correlation.sample_size
                ),
                metadata,
            );
            let mut stats = self.stats.write().expect("stats lock poisoned");
            stats.correlation_alerts += 1;
        }
    }

    fn handle_anomaly(&self, anomaly: &MetricAnomaly) {
        let severity = match anomaly.severity {
            AnomalySeverity::Critical => AlertSeverity::Critical,
            AnomalySeverity::High => AlertSeverity::High,
            AnomalySeverity::Medium => AlertSeverity::Medium,
            AnomalySeverity::Low => AlertSeverity::Low,
        };

        let mut metadata = HashMap::new();
        metadata.insert("value".to_string(), serde_json::json!(anomaly.value));
        metadata.insert(
            "expected_value".to_string(),
            serde_json::json!(anomaly.expected_value),
        );
        metadata.insert(
            "deviation".to_string(),
            serde_json::json!(anomaly.deviation),
        );

        self.alerting.raise_alert(
            "correlation_engine",
            alert_type_for_metric(&anomaly.metric_name),
            severity,
            &format!(
                "{} detected on {}",
                anomaly.anomaly_type.as_str(),
                anomaly.metric_name
            ),
            &format!(
                "Value {:.2}, expected {:.2} ({:.1} std devs)",
                anomaly.value, anomaly.expected_value, anomaly.deviation
            ),
            metadata,
        );
        let mut stats = self.stats.write().expect("stats lock poisoned");
        stats.anomaly_alerts += 1;
    }

    fn handle_insight(&self, insight: &SystemInsight) {
        if !insight.actionable || insight.severity == InsightSeverity::Info {
            return;
        }

        let severity = match insight.severity {
            InsightSeverity::Critical => AlertSeverity::High,
            _ => AlertSeverity::Medium,
        };
        let alert_type = match insight.insight_type {
            InsightType::Correlation => AlertType::Correlation,
            InsightType::Anomaly => AlertType::Anomaly,
            InsightType::Trend => AlertType::System,
        };

        let mut metadata = insight.metadata.clone();
        metadata.insert(
            "recommendations".to_string(),
            serde_json::json!(insight.recommendations),
        );

        self.alerting.raise_alert(
            "correlation_engine",
            alert_type,
            severity,
            &insight.title,
            &insight.description,
            metadata,
        );
        let mut stats = self.stats.write().expect("stats lock poisoned");
        stats.insight_alerts += 1;
    }
}

async fn run_health_check_loop(shared: Arc<MonitoringShared>) {
    while shared.running.load(Ordering::SeqCst) {
        shared.health_check_once();
        tokio::time::sleep(Duration::from_secs(shared.config.health_check_interval_secs)).await;
    }
}

async fn run_metrics_sync_loop(shared: Arc<MonitoringShared>) {
    while shared.running.load(Ordering::SeqCst) {
        shared.metrics_sync_once();
        tokio::time::sleep(Duration::from_secs(shared.config.metrics_sync_interval_secs)).await;
    }
}

async fn run_correlation_subscriber(
    shared: Arc<MonitoringShared>,
    mut rx: broadcast::Receiver<Vec<MetricCorrelation>>,
) {
    let mut alerted = HashSet::new();
    while shared.running.load(Ordering::SeqCst) {
        match rx.recv().await {
            Ok(batch) => shared.handle_correlation_batch(&batch, &mut alerted),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                shared
                    .logger
                    .debug(&format!("correlation stream lagged by {}", skipped));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_anomaly_subscriber(
    shared: Arc<MonitoringShared>,
    mut rx: broadcast::Receiver<MetricAnomaly>,
) {
    while shared.running.load(Ordering::SeqCst) {
        match rx.recv().await {
            Ok(anomaly) => shared.handle_anomaly(&anomaly),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                shared
                    .logger
                    .debug(&format!("anomaly stream lagged by {}", skipped));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_insight_subscriber(
    shared: Arc<MonitoringShared>,
    mut rx: broadcast::Receiver<SystemInsight>,
) {
    while shared.running.load(Ordering::SeqCst) {
        match rx.recv().await {
            Ok(insight) => shared.handle_insight(&insight),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                shared
                    .logger
                    .debug(&format!("insight stream lagged by {}", skipped));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resident memory of the current process in MiB, zero when the process
/// cannot be inspected.
fn sample_process_memory_mb() -> f64 {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(_) => return 0.0,
    };
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Alert severity for a very strong correlation, driven by what the metric
/// names reference.
fn correlation_alert_severity(correlation: &MetricCorrelation) -> AlertSeverity {
    let names = format!("{} {}", correlation.metric1, correlation.metric2).to_lowercase();
    if names.contains("error") || names.contains("failure") {
        AlertSeverity::High
    } else if names.contains("latency") {
        AlertSeverity::Medium
    } else {
        AlertSeverity::Low
    }
}

/// Classify an alert by metric-name keywords.
fn alert_type_for_metric(metric_name: &str) -> AlertType {
    let name = metric_name.to_lowercase();
    if name.contains("security") {
        AlertType::Security
    } else if name.contains("memory") {
        AlertType::Memory
    } else if name.contains("latency") {
        AlertType::NetworkLatency
    } else if name.contains("train") {
        AlertType::Train
    } else {
        AlertType::System
    }
}
