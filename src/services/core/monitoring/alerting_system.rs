// Alerting System - Active/resolved alert state with severity statistics.
// Raised alerts are appended as-is; deduplication and rate limiting are the
// caller's responsibility.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Alert severity levels following industry standards (P1-P5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical = 1, // P1 - Immediate action required
    High = 2,     // P2 - High priority
    Medium = 3,   // P3 - Medium priority
    Low = 4,      // P4 - Low priority
    Info = 5,     // P5 - Informational
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Info => "info",
        }
    }
}

/// Alert categories derived from the triggering subsystem or metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Security,
    Memory,
    NetworkLatency,
    Train,
    Correlation,
    Anomaly,
    System,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Security => "security",
            AlertType::Memory => "memory",
            AlertType::NetworkLatency => "network_latency",
            AlertType::Train => "train",
            AlertType::Correlation => "correlation",
            AlertType::Anomaly => "anomaly",
            AlertType::System => "system",
        }
    }
}

/// A raised alert. Mutated only to transition to resolved; retained until
/// explicit cleanup by age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub source: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub raised_at: u64,
    pub resolved_at: Option<u64>,
    pub resolved: bool,
}

/// Counts over the current alert set, recomputed from scratch on each query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub resolved_alerts: usize,
    pub critical_active: usize,
    pub high_active: usize,
    pub medium_active: usize,
    pub low_active: usize,
    pub info_active: usize,
    pub last_updated: u64,
}

/// Alerting system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingSystemConfig {
    /// Hard cap on retained alerts; the oldest are evicted beyond it.
    pub max_alerts_in_memory: usize,
    /// Capacity of the raised-alert broadcast channel.
    pub channel_capacity: usize,
}

impl Default for AlertingSystemConfig {
    fn default() -> Self {
        Self {
            max_alerts_in_memory: 10_000,
            channel_capacity: 128,
        }
    }
}

impl AlertingSystemConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.max_alerts_in_memory == 0 {
            return Err(TelemetryError::configuration_error(
                "Max alerts in memory must be greater than 0",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(TelemetryError::configuration_error(
                "Channel capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// In-memory alert store with a broadcast stream of newly raised alerts.
pub struct AlertingSystem {
    config: AlertingSystemConfig,
    alerts: RwLock<Vec<Alert>>,
    alerts_tx: broadcast::Sender<Alert>,
    logger: Logger,
}

impl AlertingSystem {
    pub fn new(config: AlertingSystemConfig) -> TelemetryResult<Self> {
        config.validate()?;

        let (alerts_tx, _) = broadcast::channel(config.channel_capacity);
        Ok(Self {
            config,
            alerts: RwLock::new(Vec::new()),
            alerts_tx,
            logger: Logger::new("alerting_system"),
        })
    }

    /// Raise a new alert. Duplicates from repeated triggers are allowed.
    pub fn raise_alert(
        &self,
        source: &str,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: &str,
        description: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            alert_type,
            severity,
            title: title.to_string(),
            description: description.to_string(),
            metadata,
            raised_at: now_ms(),
            resolved_at: None,
            resolved: false,
        };

        {
            let mut alerts = self.alerts.write().expect("alerts lock poisoned");
            alerts.push(alert.clone());
            let excess = alerts.len().saturating_sub(self.config.max_alerts_in_memory);
            if excess > 0 {
                alerts.drain(..excess);
            }
        }

        match severity {
            AlertSeverity::Critical => self
                .logger
                .error(&format!("[{}] {}: {}", alert_type.as_str(), title, description)),
            AlertSeverity::High => self
                .logger
                .warn(&format!("[{}] {}: {}", alert_type.as_str(), title, description)),
            _ => self
                .logger
                .info(&format!("[{}] {}: {}", alert_type.as_str(), title, description)),
        }

        let _ = self.alerts_tx.send(alert.clone());
        alert
    }

    /// Mark an alert resolved. Returns false for unknown or already resolved
    /// ids.
    pub fn resolve_alert(&self, alert_id: &str) -> bool {
        let mut alerts = self.alerts.write().expect("alerts lock poisoned");
        match alerts
            .iter_mut()
            .find(|alert| alert.id == alert_id && !alert.resolved)
        {
            Some(alert) => {
                alert.resolved = true;
                alert.resolved_at = Some(now_ms());
                true
            }
            None => false,
        }
    }

    /// All currently unresolved alerts.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .expect("alerts lock poisoned")
            .iter()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts_tx.subscribe()
    }

    /// Statistics over the current alert set.
    pub fn statistics(&self) -> AlertStatistics {
        let alerts = self.alerts.read().expect("alerts lock poisoned");
        let mut stats = AlertStatistics {
            total_alerts: alerts.len(),
            active_alerts: 0,
            resolved_alerts: 0,
            critical_active: 0,
            high_active: 0,
            medium_active: 0,
            low_active: 0,
            info_active: 0,
            last_updated: now_ms(),
        };

        for alert in alerts.iter() {
            if alert.resolved {
                stats.resolved_alerts += 1;
                continue;
            }
            stats.active_alerts += 1;
            match alert.severity {
                AlertSeverity::Critical => stats.critical_active += 1,
                AlertSeverity::High => stats.high_active += 1,
                AlertSeverity::Medium => stats.medium_active += 1,
                AlertSeverity::Low => stats.low_active += 1,
                AlertSeverity::Info => stats.info_active += 1,
            }
        }

        stats
    }

    /// Cheap liveness probe for health aggregation.
    pub fn health_check(&self) -> bool {
        self.alerts.read().is_ok()
    }

    /// Remove alerts raised before the cutoff, regardless of resolution
    /// state. Returns the number removed.
    pub fn cleanup_old_data(&self, cutoff_ms: u64) -> usize {
        let mut alerts = self.alerts.write().expect("alerts lock poisoned");
        let before = alerts.len();
        alerts.retain(|alert| alert.raised_at >= cutoff_ms);
        before - alerts.len()
    }
}
