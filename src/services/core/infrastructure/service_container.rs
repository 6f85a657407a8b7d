// Service container for the telemetry platform.
// Centralized dependency injection and lifecycle management: every component
// is constructed exactly once here, owned for the process lifetime, and
// shared by reference. No ambient global state.

use std::sync::Arc;

use crate::services::core::analysis::correlation_engine::{
    CorrelationEngine, CorrelationEngineConfig,
};
use crate::services::core::infrastructure::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig,
};
use crate::services::core::ingestion::position_pipeline::{
    PositionPipeline, PositionPipelineConfig,
};
use crate::services::core::ingestion::security_validator::{
    SecurityValidator, SecurityValidatorConfig,
};
use crate::services::core::ingestion::upstream::PositionSource;
use crate::services::core::monitoring::alerting_system::{AlertingSystem, AlertingSystemConfig};
use crate::services::core::monitoring::monitoring_service::{
    MonitoringService, MonitoringServiceConfig,
};
use crate::utils::TelemetryResult;

/// Top-level configuration bundle, one section per component. Read once at
/// construction; there is no dynamic reload.
#[derive(Debug, Clone, Default)]
pub struct RailwatchConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub validator: SecurityValidatorConfig,
    pub pipeline: PositionPipelineConfig,
    pub correlation: CorrelationEngineConfig,
    pub alerting: AlertingSystemConfig,
    pub monitoring: MonitoringServiceConfig,
}

impl RailwatchConfig {
    /// Validate every component section.
    pub fn validate(&self) -> TelemetryResult<()> {
        self.circuit_breaker.validate()?;
        self.validator.validate()?;
        self.pipeline.validate()?;
        self.correlation.validate()?;
        self.alerting.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}

/// Composition root owning all platform services.
pub struct ServiceContainer {
    breaker: Arc<CircuitBreaker>,
    validator: Arc<SecurityValidator>,
    pipeline: Arc<PositionPipeline>,
    engine: Arc<CorrelationEngine>,
    alerting: Arc<AlertingSystem>,
    monitoring: Arc<MonitoringService>,
}

impl ServiceContainer {
    /// Construct the full component graph against an injected upstream
    /// source. Fails fast on any malformed configuration.
    pub fn new(
        config: RailwatchConfig,
        source: Arc<dyn PositionSource>,
    ) -> TelemetryResult<Self> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker)?);
        let validator = Arc::new(SecurityValidator::new(config.validator)?);
        let pipeline = Arc::new(PositionPipeline::new(
            config.pipeline,
            source,
            breaker.clone(),
            validator.clone(),
        )?);
        let engine = Arc::new(CorrelationEngine::new(config.correlation)?);
        let alerting = Arc::new(AlertingSystem::new(config.alerting)?);
        let monitoring = Arc::new(MonitoringService::new(
            config.monitoring,
            pipeline.clone(),
            engine.clone(),
            alerting.clone(),
            breaker.clone(),
        )?);

        Ok(Self {
            breaker,
            validator,
            pipeline,
            engine,
            alerting,
            monitoring,
        })
    }

    /// Start the ingestion pipeline and the monitoring loops.
    pub fn start(&self) {
        self.pipeline.start();
        self.monitoring.start();
    }

    /// Stop everything owned by the container. Idempotent.
    pub fn shutdown(&self) {
        self.monitoring.stop();
        self.pipeline.stop();
    }

    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    pub fn validator(&self) -> Arc<SecurityValidator> {
        self.validator.clone()
    }

    pub fn pipeline(&self) -> Arc<PositionPipeline> {
        self.pipeline.clone()
    }

    pub fn correlation_engine(&self) -> Arc<CorrelationEngine> {
        self.engine.clone()
    }

    pub fn alerting(&self) -> Arc<AlertingSystem> {
        self.alerting.clone()
    }

    pub fn monitoring(&self) -> Arc<MonitoringService> {
        self.monitoring.clone()
    }
}
