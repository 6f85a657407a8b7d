// src/services/core/analysis/mod.rs

pub mod correlation_engine;

pub use correlation_engine::{
    AnomalySeverity, AnomalyType, CorrelationDirection, CorrelationEngine,
    CorrelationEngineConfig, CorrelationStrength, InsightSeverity, InsightType, MetricAnomaly,
    MetricCorrelation, MetricPoint, MetricTrend, SystemInsight, TrendDirection,
};
