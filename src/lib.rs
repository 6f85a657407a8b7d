//! Real-time train position telemetry: resilient ingestion over an
//! unreliable network, sliding-window metric analysis, and system-health
//! monitoring with alerting.
//!
//! The [`ServiceContainer`] is the composition root: it constructs the
//! circuit breaker, security validator, ingestion pipeline, correlation
//! engine, alerting system, and monitoring service against an injected
//! [`PositionSource`], and owns them for the process lifetime.

// Module declarations
pub mod services;
pub mod types;
pub mod utils;

// Re-export the primary surface for consumers.
pub use services::core::analysis::correlation_engine::{
    AnomalySeverity, AnomalyType, CorrelationDirection, CorrelationEngine,
    CorrelationEngineConfig, CorrelationStrength, InsightSeverity, InsightType, MetricAnomaly,
    MetricCorrelation, MetricTrend, SystemInsight, TrendDirection,
};
pub use services::core::infrastructure::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
pub use services::core::infrastructure::service_container::{RailwatchConfig, ServiceContainer};
pub use services::core::ingestion::position_pipeline::{
    IngestionMetrics, PositionPipeline, PositionPipelineConfig,
};
pub use services::core::ingestion::security_validator::{
    IssueSeverity, SecurityAnomaly, SecurityAnomalyType, SecurityValidator,
    SecurityValidatorConfig, ValidationIssue, ValidationResult,
};
pub use services::core::ingestion::upstream::PositionSource;
pub use services::core::ingestion::IngestionError;
pub use services::core::monitoring::alerting_system::{
    Alert, AlertSeverity, AlertStatistics, AlertType, AlertingSystem, AlertingSystemConfig,
};
pub use services::core::monitoring::monitoring_service::{
    MonitoringService, MonitoringServiceConfig, MonitoringStatistics, SystemHealth,
    SystemHealthStatus,
};
pub use types::{ConnectionStatus, DataQuality, DataSource, TrainPosition, ValidationStatus};
pub use utils::{ErrorKind, TelemetryError, TelemetryResult};
