// Metrics Correlation Engine - Sliding-window statistics over named metric
// series: pairwise Pearson correlation, least-squares trends, z-score
// anomalies, and synthesized system insights.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Analysis thresholds and window bounds, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEngineConfig {
    /// Minimum overlapping samples before a pair is correlated, and minimum
    /// window size for trend and anomaly analysis.
    pub min_sample_size: usize,
    /// Coefficient magnitude bands for correlation strength.
    pub very_strong_threshold: f64,
    pub strong_threshold: f64,
    pub moderate_threshold: f64,
    /// Standard deviations from the window mean before the newest point
    /// counts as an anomaly.
    pub anomaly_std_dev_threshold: f64,
    /// Absolute percent change over the window before a trend is significant.
    pub significant_trend_percent: f64,
    /// Slope magnitude below which a trend counts as stable.
    pub stable_slope_epsilon: f64,
    /// Hard cap on retained points per metric.
    pub max_points_per_metric: usize,
    /// Points older than this are pruned on every record (milliseconds).
    pub retention_ms: u64,
    /// Capacity of the derived-artifact broadcast channels.
    pub channel_capacity: usize,
    /// Retained derived artifacts (anomalies, insights).
    pub max_retained_artifacts: usize,
}

impl Default for CorrelationEngineConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 10,
            very_strong_threshold: 0.8,
            strong_threshold: 0.6,
            moderate_threshold: 0.4,
            anomaly_std_dev_threshold: 2.0,
            significant_trend_percent: 10.0,
            stable_slope_epsilon: 0.01,
            max_points_per_metric: 500,
            retention_ms: 3_600_000, // 1 hour
            channel_capacity: 256,
            max_retained_artifacts: 100,
        }
    }
}

impl CorrelationEngineConfig {
    /// Trip earlier on anomalies and trends; suited to safety-adjacent
    /// series where late detection costs more than noise.
    pub fn high_sensitivity() -> Self {
        Self {
            anomaly_std_dev_threshold: 1.5,
            significant_trend_percent: 5.0,
            ..Default::default()
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.min_sample_size < 2 {
            return Err(TelemetryError::configuration_error(
                "Minimum sample size must be at least 2",
            ));
        }

        let bands_ordered = self.moderate_threshold < self.strong_threshold
            && self.strong_threshold < self.very_strong_threshold
            && self.very_strong_threshold <= 1.0
            && self.moderate_threshold > 0.0;
        if !bands_ordered {
            return Err(TelemetryError::configuration_error(
                "Correlation strength bands must be ordered within (0, 1]",
            ));
        }

        if self.anomaly_std_dev_threshold <= 0.0 {
            return Err(TelemetryError::configuration_error(
                "Anomaly threshold must be greater than 0",
            ));
        }

        if self.max_points_per_metric < self.min_sample_size {
            return Err(TelemetryError::configuration_error(
                "Window cap must be at least the minimum sample size",
            ));
        }

        if self.retention_ms == 0 || self.channel_capacity == 0 {
            return Err(TelemetryError::configuration_error(
                "Retention and channel capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// One recorded observation of a named metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: u64,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

impl CorrelationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationDirection::Positive => "positive",
            CorrelationDirection::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
}

impl CorrelationStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationStrength::VeryStrong => "very_strong",
            CorrelationStrength::Strong => "strong",
            CorrelationStrength::Moderate => "moderate",
            CorrelationStrength::Weak => "weak",
        }
    }
}

/// Pairwise Pearson correlation between two metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCorrelation {
    pub metric1: String,
    pub metric2: String,
    pub coefficient: f64,
    pub direction: CorrelationDirection,
    pub strength: CorrelationStrength,
    pub sample_size: usize,
    pub computed_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

/// Least-squares linear trend over one metric's window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric_name: String,
    pub slope: f64,
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub sample_size: usize,
    pub computed_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
            AnomalySeverity::Critical => "critical",
        }
    }
}

/// A point deviating from its window's recent mean by more than the
/// configured number of standard deviations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAnomaly {
    pub id: String,
    pub metric_name: String,
    pub anomaly_type: AnomalyType,
    pub value: f64,
    pub expected_value: f64,
    /// Deviation from the window mean, in standard-deviation units.
    pub deviation: f64,
    pub severity: AnomalySeverity,
    pub detected_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Correlation,
    Trend,
    Anomaly,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Correlation => "correlation",
            InsightType::Trend => "trend",
            InsightType::Anomaly => "anomaly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Info,
    Warning,
    Critical,
}

impl InsightSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightSeverity::Info => "info",
            InsightSeverity::Warning => "warning",
            InsightSeverity::Critical => "critical",
        }
    }
}

/// Human-readable conclusion synthesized from the derived collections when a
/// rule threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInsight {
    pub id: String,
    pub insight_type: InsightType,
    pub severity: InsightSeverity,
    pub title: String,
    pub description: String,
    pub recommendations: Vec<String>,
    pub actionable: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    pub generated_at: u64,
}

/// Correlation engine over bounded in-memory metric windows. Single writer
/// per component; derived views are republished over broadcast channels so
/// readers never block the writer.
pub struct CorrelationEngine {
    config: CorrelationEngineConfig,
    series: RwLock<HashMap<String, VecDeque<MetricPoint>>>,
    correlations: RwLock<Vec<MetricCorrelation>>,
    trends: RwLock<HashMap<String, MetricTrend>>,
    anomalies: RwLock<Vec<MetricAnomaly>>,
    insights: RwLock<Vec<SystemInsight>>,
    correlations_tx: broadcast::Sender<Vec<MetricCorrelation>>,
    trends_tx: broadcast::Sender<Vec<MetricTrend>>,
    anomalies_tx: broadcast::Sender<MetricAnomaly>,
    insights_tx: broadcast::Sender<SystemInsight>,
    logger: Logger,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationEngineConfig) -> TelemetryResult<Self> {
        config.validate()?;

        let (correlations_tx, _) = broadcast::channel(config.channel_capacity);
        let (trends_tx, _) = broadcast::channel(config.channel_capacity);
        let (anomalies_tx, _) = broadcast::channel(config.channel_capacity);
        let (insights_tx, _) = broadcast::channel(config.channel_capacity);

        Ok(Self {
            config,
            series: RwLock::new(HashMap::new()),
            correlations: RwLock::new(Vec::new()),
            trends: RwLock::new(HashMap::new()),
            anomalies: RwLock::new(Vec::new()),
            insights: RwLock::new(Vec::new()),
            correlations_tx,
            trends_tx,
            anomalies_tx,
            insights_tx,
            logger: Logger::new("correlation_engine"),
        })
    }

    /// Record one observation and run a full analysis pass.
    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        timestamp: u64,
        tags: Option<HashMap<String, String>>,
    ) {
        if !value.is_finite() {
            self.logger
                .warn(&format!("ignoring non-finite sample for metric {}", name));
            return;
        }

        {
            let mut series = self.series.write().expect("series lock poisoned");
            let window = series.entry(name.to_string()).or_default();
            window.push_back(MetricPoint {
                value,
                timestamp,
                tags: tags.unwrap_or_default(),
            });

            let horizon = now_ms().saturating_sub(self.config.retention_ms);
            while window
                .front()
                .map_or(false, |point| point.timestamp < horizon)
            {
                window.pop_front();
            }
            while window.len() > self.config.max_points_per_metric {
                window.pop_front();
            }
        }

        self.detect_anomaly(name);
        self.recompute_trends();
        self.recompute_correlations();
    }

    pub fn subscribe_correlations(&self) -> broadcast::Receiver<Vec<MetricCorrelation>> {
        self.correlations_tx.subscribe()
    }

    pub fn subscribe_trends(&self) -> broadcast::Receiver<Vec<MetricTrend>> {
        self.trends_tx.subscribe()
    }

    pub fn subscribe_anomalies(&self) -> broadcast::Receiver<MetricAnomaly> {
        self.anomalies_tx.subscribe()
    }

    pub fn subscribe_insights(&self) -> broadcast::Receiver<SystemInsight> {
        self.insights_tx.subscribe()
    }

    pub fn correlations(&self) -> Vec<MetricCorrelation> {
        self.correlations
            .read()
            .expect("correlations lock poisoned")
            .clone()
    }

    pub fn correlations_for(&self, name: &str) -> Vec<MetricCorrelation> {
        self.correlations
            .read()
            .expect("correlations lock poisoned")
            .iter()
            .filter(|c| c.metric1 == name || c.metric2 == name)
            .cloned()
            .collect()
    }

    pub fn trend_for(&self, name: &str) -> Option<MetricTrend> {
        self.trends
            .read()
            .expect("trends lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn anomalies_for(&self, name: &str) -> Vec<MetricAnomaly> {
        self.anomalies
            .read()
            .expect("anomalies lock poisoned")
            .iter()
            .filter(|a| a.metric_name == name)
            .cloned()
            .collect()
    }

    pub fn insights(&self) -> Vec<SystemInsight> {
        self.insights.read().expect("insights lock poisoned").clone()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.series
            .read()
            .expect("series lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Cheap liveness probe for health aggregation.
    pub fn health_check(&self) -> bool {
        self.series.read().is_ok() && self.correlations.read().is_ok()
    }

    /// Drop all data points and derived artifacts older than the cutoff.
    pub fn clear_old_data(&self, cutoff_ms: u64) {
        {
            let mut series = self.series.write().expect("series lock poisoned");
            for window in series.values_mut() {
                while window
                    .front()
                    .map_or(false, |point| point.timestamp < cutoff_ms)
                {
                    window.pop_front();
                }
            }
            series.retain(|_, window| !window.is_empty());
        }

        self.correlations
            .write()
            .expect("correlations lock poisoned")
            .retain(|c| c.computed_at >= cutoff_ms);
        self.trends
            .write()
            .expect("trends lock poisoned")
            .retain(|_, t| t.computed_at >= cutoff_ms);
        self.anomalies
            .write()
            .expect("anomalies lock poisoned")
            .retain(|a| a.detected_at >= cutoff_ms);
        self.insights
            .write()
            .expect("insights lock poisoned")
            .retain(|i| i.generated_at >= cutoff_ms);
    }

    // ----- analysis passes -----

    /// Compare the newest point of `name` against the rest of its window.
    fn detect_anomaly(&self, name: &str) {
        let (newest, prior): (MetricPoint, Vec<f64>) = {
            let series = self.series.read().expect("series lock poisoned");
            let window = match series.get(name) {
                Some(window) if window.len() > self.config.min_sample_size => window,
                _ => return,
            };
            let newest = window.back().cloned().expect("non-empty window");
            let prior = window
                .iter()
                .take(window.len() - 1)
                .map(|p| p.value)
                .collect();
            (newest, prior)
        };

        let mean = mean(&prior);
        let std_dev = std_deviation(&prior, mean);
        if std_dev <= f64::EPSILON {
            return;
        }

        let deviation = (newest.value - mean) / std_dev;
        if deviation.abs() < self.config.anomaly_std_dev_threshold {
            return;
        }

        let anomaly = MetricAnomaly {
            id: Uuid::new_v4().to_string(),
            metric_name: name.to_string(),
            anomaly_type: if deviation > 0.0 {
                AnomalyType::Spike
            } else {
                AnomalyType::Drop
            },
            value: newest.value,
            expected_value: mean,
            deviation: deviation.abs(),
            severity: severity_for_deviation(deviation.abs()),
            detected_at: now_ms(),
        };

        self.logger.warn(&format!(
            "{} anomaly on {}: value {:.2}, expected {:.2} ({:.1} std devs)",
            anomaly.anomaly_type.as_str(),
            name,
            anomaly.value,
            anomaly.expected_value,
            anomaly.deviation
        ));

        {
            let mut anomalies = self.anomalies.write().expect("anomalies lock poisoned");
            anomalies.push(anomaly.clone());
            let excess = anomalies.len().saturating_sub(self.config.max_retained_artifacts);
            if excess > 0 {
                anomalies.drain(..excess);
            }
        }
        let _ = self.anomalies_tx.send(anomaly.clone());

        if anomaly.severity >= AnomalySeverity::High {
            self.publish_insight(insight_for_anomaly(&anomaly));
        }
    }

    /// Refit every metric's trend; republish the full set.
    fn recompute_trends(&self) {
        let fitted: Vec<MetricTrend> = {
            let series = self.series.read().expect("series lock poisoned");
            series
                .iter()
                .filter(|(_, window)| window.len() >= self.config.min_sample_size)
                .filter_map(|(name, window)| self.fit_trend(name, window))
                .collect()
        };

        if fitted.is_empty() {
            return;
        }

        let previous: HashMap<String, MetricTrend> = {
            let mut trends = self.trends.write().expect("trends lock poisoned");
            let previous = trends.clone();
            *trends = fitted
                .iter()
                .map(|t| (t.metric_name.clone(), t.clone()))
                .collect();
            previous
        };
        let _ = self.trends_tx.send(fitted.clone());

        // Insights only for trends that newly became significant, so the
        // stream is edges rather than a repeat of current state.
        for trend in &fitted {
            if trend.direction == TrendDirection::Stable
                || trend.change_percent.abs() < self.config.significant_trend_percent
            {
                continue;
            }
            let was_significant = previous.get(&trend.metric_name).map_or(false, |p| {
                p.direction == trend.direction
                    && p.change_percent.abs() >= self.config.significant_trend_percent
            });
            if !was_significant {
                self.publish_insight(insight_for_trend(trend));
            }
        }
    }

    fn fit_trend(&self, name: &str, window: &VecDeque<MetricPoint>) -> Option<MetricTrend> {
        let values: Vec<f64> = window.iter().map(|p| p.value).collect();
        let slope = least_squares_slope(&values)?;

        let first = *values.first()?;
        let last = *values.last()?;
        let change_percent = if first.abs() > f64::EPSILON {
            (last - first) / first.abs() * 100.0
        } else {
            0.0
        };

        let direction = if slope.abs() < self.config.stable_slope_epsilon {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        Some(MetricTrend {
            metric_name: name.to_string(),
            slope,
            direction,
            change_percent,
            sample_size: values.len(),
            computed_at: now_ms(),
        })
    }

    /// Recompute every pairwise correlation, fully replacing the prior list
    /// so no stale entries survive.
    fn recompute_correlations(&self) {
        let computed: Vec<MetricCorrelation> = {
            let series = self.series.read().expect("series lock poisoned");
            // Sorted so a pair always carries the same (metric1, metric2)
            // orientation across passes.
            let mut names: Vec<&String> = series.keys().collect();
            names.sort();
            let mut computed = Vec::new();

            for i in 0..names.len() {
                for j in (i + 1)..names.len() {
                    if let Some(correlation) =
                        self.correlate_pair(names[i], &series[names[i]], names[j], &series[names[j]])
                    {
                        computed.push(correlation);
                    }
                }
            }
            computed
        };

        let previous = {
            let mut correlations = self.correlations.write().expect("correlations lock poisoned");
            std::mem::replace(&mut *correlations, computed.clone())
        };

        if computed.is_empty() {
            return;
        }
        let _ = self.correlations_tx.send(computed.clone());

        for correlation in &computed {
            if correlation.coefficient.abs() < self.config.strong_threshold {
                continue;
            }
            let was_strong = previous.iter().any(|p| {
                p.metric1 == correlation.metric1
                    && p.metric2 == correlation.metric2
                    && p.coefficient.abs() >= self.config.strong_threshold
            });
            if !was_strong {
                self.publish_insight(insight_for_correlation(
                    correlation,
                    self.config.very_strong_threshold,
                ));
            }
        }
    }

    fn correlate_pair(
        &self,
        name1: &str,
        window1: &VecDeque<MetricPoint>,
        name2: &str,
        window2: &VecDeque<MetricPoint>,
    ) -> Option<MetricCorrelation> {
        // Align on matching timestamps; only overlapping samples correlate.
        let by_time: BTreeMap<u64, f64> = window1.iter().map(|p| (p.timestamp, p.value)).collect();
        let mut paired1 = Vec::new();
        let mut paired2 = Vec::new();
        for point in window2 {
            if let Some(&value) = by_time.get(&point.timestamp) {
                paired1.push(value);
                paired2.push(point.value);
            }
        }

        if paired1.len() < self.config.min_sample_size {
            return None;
        }

        let coefficient = pearson(&paired1, &paired2)?;
        let direction = if coefficient > 0.0 {
            CorrelationDirection::Positive
        } else {
            CorrelationDirection::Negative
        };
        let strength = self.strength_for(coefficient.abs());

        Some(MetricCorrelation {
            metric1: name1.to_string(),
            metric2: name2.to_string(),
            coefficient,
            direction,
            strength,
            sample_size: paired1.len(),
            computed_at: now_ms(),
        })
    }

    fn strength_for(&self, magnitude: f64) -> CorrelationStrength {
        if magnitude >= self.config.very_strong_threshold {
            CorrelationStrength::VeryStrong
        } else if magnitude >= self.config.strong_threshold {
            CorrelationStrength::Strong
        } else if magnitude >= self.config.moderate_threshold {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }

    fn publish_insight(&self, insight: SystemInsight) {
        {
            let mut insights = self.insights.write().expect("insights lock poisoned");
            insights.push(insight.clone());
            let excess = insights.len().saturating_sub(self.config.max_retained_artifacts);
            if excess > 0 {
                insights.drain(..excess);
            }
        }
        let _ = self.insights_tx.send(insight);
    }
}

// ----- statistics helpers -----

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Pearson correlation coefficient over two equal-length series. Returns
/// `None` for empty or mismatched input, 0.0 for zero-variance series.
fn pearson(series1: &[f64], series2: &[f64]) -> Option<f64> {
    if series1.len() != series2.len() || series1.is_empty() {
        return None;
    }

    let n = series1.len() as f64;
    let mean1 = series1.iter().sum::<f64>() / n;
    let mean2 = series2.iter().sum::<f64>() / n;

    let numerator: f64 = series1
        .iter()
        .zip(series2.iter())
        .map(|(x, y)| (x - mean1) * (y - mean2))
        .sum();

    let sum_sq1: f64 = series1.iter().map(|x| (x - mean1).powi(2)).sum();
    let sum_sq2: f64 = series2.iter().map(|y| (y - mean2).powi(2)).sum();

    let denominator = (sum_sq1 * sum_sq2).sqrt();
    if denominator == 0.0 {
        Some(0.0)
    } else {
        Some(numerator / denominator)
    }
}

/// Least-squares slope over values with their sample index as x.
fn least_squares_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, value) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (value - mean_y);
        denominator += dx * dx;
    }

    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

fn severity_for_deviation(deviation: f64) -> AnomalySeverity {
    if deviation >= 4.0 {
        AnomalySeverity::Critical
    } else if deviation >= 3.0 {
        AnomalySeverity::High
    } else if deviation >= 2.5 {
        AnomalySeverity::Medium
    } else {
        AnomalySeverity::Low
    }
}

// ----- insight synthesis -----

fn insight_for_correlation(
    correlation: &MetricCorrelation,
    very_strong_threshold: f64,
) -> SystemInsight {
    let severity = if correlation.coefficient.abs() >= very_strong_threshold {
        InsightSeverity::Warning
    } else {
        InsightSeverity::Info
    };

    let mut metadata = HashMap::new();
    metadata.insert(
        "coefficient".to_string(),
        serde_json::json!(correlation.coefficient),
    );
    metadata.insert(
        "sample_size".to_string(),
        serde_json::json!(correlation.sample_size),
    );

    SystemInsight {
        id: Uuid::new_v4().to_string(),
        insight_type: InsightType::Correlation,
        severity,
        title: format!(
            "{} correlation between {} and {}",
            correlation.strength.as_str(),
            correlation.metric1,
            correlation.metric2
        ),
        description: format!(
            "Metrics {} and {} move together with coefficient {:.2} over {} samples.",
            correlation.metric1,
            correlation.metric2,
            correlation.coefficient,
            correlation.sample_size
        ),
        recommendations: vec![
            format!(
                "Investigate whether {} drives {} or both share a cause",
                correlation.metric1, correlation.metric2
            ),
            "Review recent configuration or load changes affecting both series".to_string(),
        ],
        actionable: severity > InsightSeverity::Info,
        metadata,
        generated_at: now_ms(),
    }
}

fn insight_for_trend(trend: &MetricTrend) -> SystemInsight {
    let mut metadata = HashMap::new();
    metadata.insert("slope".to_string(), serde_json::json!(trend.slope));
    metadata.insert(
        "change_percent".to_string(),
        serde_json::json!(trend.change_percent),
    );

    SystemInsight {
        id: Uuid::new_v4().to_string(),
        insight_type: InsightType::Trend,
        severity: InsightSeverity::Warning,
        title: format!("{} is {}", trend.metric_name, trend.direction.as_str()),
        description: format!(
            "{} changed {:.1}% across its window (slope {:.4}).",
            trend.metric_name, trend.change_percent, trend.slope
        ),
        recommendations: vec![
            format!("Check capacity headroom for {}", trend.metric_name),
            "Compare against deployment and traffic timelines".to_string(),
        ],
        actionable: true,
        metadata,
        generated_at: now_ms(),
    }
}

fn insight_for_anomaly(anomaly: &MetricAnomaly) -> SystemInsight {
    let severity = match anomaly.severity {
        AnomalySeverity::Critical => InsightSeverity::Critical,
        _ => InsightSeverity::Warning,
    };

    let mut metadata = HashMap::new();
    metadata.insert("value".to_string(), serde_json::json!(anomaly.value));
    metadata.insert(
        "expected_value".to_string(),
        serde_json::json!(anomaly.expected_value),
    );
    metadata.insert("deviation".to_string(), serde_json::json!(anomaly.deviation));

    SystemInsight {
        id: Uuid::new_v4().to_string(),
        insight_type: InsightType::Anomaly,
        severity,
        title: format!(
            "{} {} on {}",
            anomaly.severity.as_str(),
            anomaly.anomaly_type.as_str(),
            anomaly.metric_name
        ),
        description: format!(
            "{} reported {:.2} against an expected {:.2} ({:.1} std devs).",
            anomaly.metric_name, anomaly.value, anomaly.expected_value, anomaly.deviation
        ),
        recommendations: vec![
            format!("Inspect the source feeding {}", anomaly.metric_name),
            "Correlate with alerts raised in the same window".to_string(),
        ],
        actionable: true,
        metadata,
        generated_at: now_ms(),
    }
}
