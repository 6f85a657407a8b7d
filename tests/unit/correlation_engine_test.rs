use std::collections::HashMap;

use railwatch::utils::now_ms;
use railwatch::{
    AnomalySeverity, AnomalyType, CorrelationDirection, CorrelationEngine,
    CorrelationEngineConfig, CorrelationStrength, InsightType, TrendDirection,
};

// Helper functions for testing

fn engine() -> CorrelationEngine {
    CorrelationEngine::new(CorrelationEngineConfig::default()).unwrap()
}

/// Record two series sharing the same timestamps, with the second derived
/// from the first through `f`.
fn record_paired_series(
    engine: &CorrelationEngine,
    name1: &str,
    name2: &str,
    values: &[f64],
    f: impl Fn(f64) -> f64,
) {
    let base = now_ms();
    for (i, value) in values.iter().enumerate() {
        let timestamp = base + i as u64 * 1_000;
        engine.record_metric(name1, *value, timestamp, None);
        engine.record_metric(name2, f(*value), timestamp, None);
    }
}

mod correlation_tests {
    use super::*;

    #[test]
    fn test_perfect_linear_relation_yields_coefficient_near_one() {
        let engine = engine();
        let values: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        record_paired_series(&engine, "ingestion.latency_ms", "system.memory_used_mb", &values, |x| {
            3.0 * x
        });

        let correlations = engine.correlations();
        assert_eq!(correlations.len(), 1);

        let correlation = &correlations[0];
        assert!((correlation.coefficient - 1.0).abs() < 0.1);
        assert_eq!(correlation.direction, CorrelationDirection::Positive);
        assert_eq!(correlation.strength, CorrelationStrength::VeryStrong);
        assert!(correlation.sample_size >= 10);
    }

    #[test]
    fn test_inverse_relation_is_negative() {
        let engine = engine();
        let values: Vec<f64> = (1..=15).map(|i| i as f64).collect();
        record_paired_series(&engine, "a.series", "b.series", &values, |x| 100.0 - 2.0 * x);

        let correlation = &engine.correlations()[0];
        assert!(correlation.coefficient < -0.9);
        assert_eq!(correlation.direction, CorrelationDirection::Negative);
    }

    #[test]
    fn test_insufficient_overlap_produces_no_correlation() {
        let engine = engine();
        let values: Vec<f64> = (1..=5).map(|i| i as f64).collect();
        record_paired_series(&engine, "short.one", "short.two", &values, |x| x * 2.0);

        assert!(engine.correlations().is_empty());
    }

    #[test]
    fn test_correlations_for_filters_by_name() {
        let engine = engine();
        let values: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        record_paired_series(&engine, "one", "two", &values, |x| x + 1.0);

        assert_eq!(engine.correlations_for("one").len(), 1);
        assert_eq!(engine.correlations_for("two").len(), 1);
        assert!(engine.correlations_for("absent").is_empty());
    }

    #[test]
    fn test_strong_correlation_produces_actionable_insight() {
        let engine = engine();
        let values: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        record_paired_series(&engine, "ingestion.error_rate", "system.memory_used_mb", &values, |x| {
            3.0 * x
        });

        let insights = engine.insights();
        assert!(insights
            .iter()
            .any(|i| i.insight_type == InsightType::Correlation && i.actionable));
    }
}

mod trend_tests {
    use super::*;

    #[test]
    fn test_monotonic_increase_yields_increasing_trend() {
        let engine = engine();
        let base = now_ms();
        for i in 0..15u64 {
            engine.record_metric("ingestion.latency_ms", 100.0 + i as f64 * 10.0, base + i * 1_000, None);
        }

        let trend = engine.trend_for("ingestion.latency_ms").unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.slope > 0.0);
        assert!(trend.change_percent > 0.0);
        assert_eq!(trend.sample_size, 15);
    }

    #[test]
    fn test_monotonic_decrease_yields_decreasing_trend() {
        let engine = engine();
        let base = now_ms();
        for i in 0..15u64 {
            engine.record_metric("queue.depth", 500.0 - i as f64 * 20.0, base + i * 1_000, None);
        }

        let trend = engine.trend_for("queue.depth").unwrap();
        assert_eq!(trend.direction, TrendDirection::Decreasing);
        assert!(trend.slope < 0.0);
        assert!(trend.change_percent < 0.0);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let engine = engine();
        let base = now_ms();
        for i in 0..15u64 {
            engine.record_metric("connection.reliability", 1.0, base + i * 1_000, None);
        }

        let trend = engine.trend_for("connection.reliability").unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_no_trend_below_minimum_window() {
        let engine = engine();
        let base = now_ms();
        for i in 0..5u64 {
            engine.record_metric("sparse.series", i as f64, base + i * 1_000, None);
        }
        assert!(engine.trend_for("sparse.series").is_none());
    }
}

mod anomaly_tests {
    use super::*;

    #[test]
    fn test_spike_after_stable_baseline() {
        let engine = engine();
        let mut rx = engine.subscribe_anomalies();
        let base = now_ms();

        // 20 baseline points around 50 with small alternating noise.
        for i in 0..20u64 {
            let noise = if i % 2 == 0 { 0.2 } else { -0.2 };
            engine.record_metric("train.speed_kmh", 50.0 + noise, base + i * 1_000, None);
        }
        assert!(engine.anomalies_for("train.speed_kmh").is_empty());

        engine.record_metric("train.speed_kmh", 100.0, base + 20_000, None);

        let anomalies = engine.anomalies_for("train.speed_kmh");
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.anomaly_type, AnomalyType::Spike);
        assert!(anomaly.deviation > 2.0);
        assert!((anomaly.expected_value - 50.0).abs() < 1.0);
        assert_eq!(anomaly.severity, AnomalySeverity::Critical);

        // The anomaly was also broadcast to subscribers.
        let received = rx.try_recv().unwrap();
        assert_eq!(received.metric_name, "train.speed_kmh");
    }

    #[test]
    fn test_drop_below_baseline() {
        let engine = engine();
        let base = now_ms();
        for i in 0..20u64 {
            let noise = if i % 2 == 0 { 0.5 } else { -0.5 };
            engine.record_metric("system.memory_used_mb", 200.0 + noise, base + i * 1_000, None);
        }
        engine.record_metric("system.memory_used_mb", 50.0, base + 20_000, None);

        let anomalies = engine.anomalies_for("system.memory_used_mb");
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::Drop);
    }

    #[test]
    fn test_high_severity_anomaly_produces_insight() {
        let engine = engine();
        let base = now_ms();
        for i in 0..20u64 {
            let noise = if i % 2 == 0 { 0.2 } else { -0.2 };
            engine.record_metric("ingestion.error_rate", 0.05 + noise * 0.01, base + i * 1_000, None);
        }
        engine.record_metric("ingestion.error_rate", 0.9, base + 20_000, None);

        assert!(engine
            .insights()
            .iter()
            .any(|i| i.insight_type == InsightType::Anomaly));
    }

    #[test]
    fn test_no_anomaly_within_normal_variation() {
        let engine = engine();
        let base = now_ms();
        for i in 0..20u64 {
            let noise = if i % 2 == 0 { 1.0 } else { -1.0 };
            engine.record_metric("steady.series", 50.0 + noise, base + i * 1_000, None);
        }
        engine.record_metric("steady.series", 51.0, base + 20_000, None);

        assert!(engine.anomalies_for("steady.series").is_empty());
    }
}

mod retention_tests {
    use super::*;

    #[test]
    fn test_clear_old_data_drops_points_and_artifacts() {
        let engine = engine();
        let values: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        record_paired_series(&engine, "a.one", "a.two", &values, |x| 3.0 * x);
        assert!(!engine.correlations().is_empty());

        engine.clear_old_data(now_ms() + 60_000);

        assert!(engine.metric_names().is_empty());
        assert!(engine.correlations().is_empty());
        assert!(engine.trend_for("a.one").is_none());
        assert!(engine.insights().is_empty());
    }

    #[test]
    fn test_tags_are_retained_on_points() {
        let engine = engine();
        let mut tags = HashMap::new();
        tags.insert("section_id".to_string(), "SEC-001".to_string());
        engine.record_metric("tagged.series", 1.0, now_ms(), Some(tags));
        assert_eq!(engine.metric_names(), vec!["tagged.series".to_string()]);
    }
}
