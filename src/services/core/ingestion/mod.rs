// src/services/core/ingestion/mod.rs
// Resilient real-time position ingestion: upstream contract, security
// validation, and the polling pipeline.

pub mod position_pipeline;
pub mod security_validator;
pub mod upstream;

pub use position_pipeline::{
    IngestionMetrics, PositionPipeline, PositionPipelineConfig,
};
pub use security_validator::{
    IssueSeverity, SecurityAnomaly, SecurityAnomalyType, SecurityValidator,
    SecurityValidatorConfig, ValidationIssue, ValidationResult,
};
pub use upstream::PositionSource;

use thiserror::Error;

use crate::utils::{ErrorKind, TelemetryError};

/// Ingestion failure taxonomy. Every handling site matches exhaustively; the
/// priority and recovery policy for each variant lives here and nowhere else.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("upstream request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("record failed validation: {reason}")]
    Validation { reason: String },

    #[error("upstream fetch failed: {0}")]
    Upstream(TelemetryError),
}

impl IngestionError {
    /// Classify a raw error from the breaker/source layer into the ingestion
    /// taxonomy.
    pub fn classify(err: TelemetryError) -> Self {
        match err.kind {
            ErrorKind::CircuitOpen => IngestionError::CircuitOpen,
            ErrorKind::TimeoutError => IngestionError::Timeout { elapsed_ms: 0 },
            ErrorKind::ValidationError => IngestionError::Validation {
                reason: err.message,
            },
            _ => IngestionError::Upstream(err),
        }
    }

    /// Whether this failure should be surfaced at warning level or above.
    pub fn is_high_priority(&self) -> bool {
        match self {
            IngestionError::Timeout { .. } => true,
            IngestionError::CircuitOpen => false,
            IngestionError::Validation { .. } => false,
            IngestionError::Upstream(_) => true,
        }
    }

    /// Operator-facing recovery guidance per failure kind.
    pub fn recovery_action(&self) -> &'static str {
        match self {
            IngestionError::Timeout { .. } => "retry with backoff; check upstream latency",
            IngestionError::CircuitOpen => "wait for recovery timeout; serve cached positions",
            IngestionError::Validation { .. } => "drop the record and continue the stream",
            IngestionError::Upstream(_) => "retry with backoff; check upstream availability",
        }
    }
}

impl From<IngestionError> for TelemetryError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Timeout { elapsed_ms } => TelemetryError::timeout_error(format!(
                "upstream request timed out after {}ms",
                elapsed_ms
            )),
            IngestionError::CircuitOpen => {
                TelemetryError::circuit_open("circuit breaker is open")
            }
            IngestionError::Validation { reason } => TelemetryError::validation_error(reason),
            IngestionError::Upstream(inner) => inner,
        }
    }
}
