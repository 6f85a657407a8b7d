// Security/Validation Filter - Per-record plausibility checks
// Every check is independent and additive: a record collects all of its
// issues and anomalies in one pass, nothing short-circuits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DataSource, TrainPosition, ValidationStatus};
use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Validation thresholds, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityValidatorConfig {
    /// Physical speed ceiling for any record (km/h). Above this the record is
    /// malformed and rejected outright.
    pub max_speed_kmh: f64,
    /// Operationally impossible speed for rail (km/h). Above this the record
    /// is well-formed but treated as a safety anomaly.
    pub impossible_speed_kmh: f64,
    /// Accuracy radius ceiling in meters.
    pub max_accuracy_m: f64,
    /// Accuracy radius below which a reading combined with a weak signal is
    /// implausibly tight.
    pub suspicious_accuracy_m: f64,
    /// Accuracy radius above which a reading counts as poor.
    pub poor_accuracy_m: f64,
    /// Speed above which poor accuracy becomes a plausibility concern (km/h).
    pub high_speed_kmh: f64,
    /// Valid receiver signal strength range (dBm).
    pub min_signal_dbm: f64,
    pub max_signal_dbm: f64,
    /// Signal strength below which a reading counts as weak (dBm).
    pub low_signal_dbm: f64,
    /// Records older than this are stale (seconds).
    pub max_position_age_secs: u64,
    /// Tolerated future clock skew for reporter timestamps (seconds).
    pub max_clock_skew_secs: u64,
    /// Train identifier length bounds.
    pub min_train_id_len: usize,
    pub max_train_id_len: usize,
}

impl Default for SecurityValidatorConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 350.0,
            impossible_speed_kmh: 200.0,
            max_accuracy_m: 10_000.0,
            suspicious_accuracy_m: 5.0,
            poor_accuracy_m: 100.0,
            high_speed_kmh: 120.0,
            min_signal_dbm: -120.0,
            max_signal_dbm: -20.0,
            low_signal_dbm: -100.0,
            max_position_age_secs: 300, // 5 minutes
            max_clock_skew_secs: 30,
            min_train_id_len: 3,
            max_train_id_len: 32,
        }
    }
}

impl SecurityValidatorConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.max_speed_kmh <= 0.0 {
            return Err(TelemetryError::configuration_error(
                "Max speed must be greater than 0",
            ));
        }

        if self.impossible_speed_kmh >= self.max_speed_kmh {
            return Err(TelemetryError::configuration_error(
                "Impossible speed threshold must be below the max speed bound",
            ));
        }

        if self.max_position_age_secs == 0 {
            return Err(TelemetryError::configuration_error(
                "Max position age must be greater than 0",
            ));
        }

        if self.min_train_id_len == 0 || self.min_train_id_len > self.max_train_id_len {
            return Err(TelemetryError::configuration_error(
                "Train id length bounds are inconsistent",
            ));
        }

        if self.min_signal_dbm >= self.max_signal_dbm {
            return Err(TelemetryError::configuration_error(
                "Signal strength bounds are inconsistent",
            ));
        }

        Ok(())
    }
}

/// How severe a validation issue is for the forwarding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Logged and recorded as a metric; the record is still forwarded.
    Warning,
    /// The record is well-formed but must not be forwarded.
    HighRisk,
    /// Hard field-level failure; the record is invalid.
    Reject,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Warning => "warning",
            IssueSeverity::HighRisk => "high_risk",
            IssueSeverity::Reject => "reject",
        }
    }
}

/// One finding against a specific field or field combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>, severity: IssueSeverity) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity,
        }
    }
}

/// Categories of security anomalies raised alongside validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAnomalyType {
    ImpossibleSpeed,
    StalePosition,
    SuspiciousAccuracy,
    IncompleteMetadata,
}

impl SecurityAnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityAnomalyType::ImpossibleSpeed => "impossible_speed",
            SecurityAnomalyType::StalePosition => "stale_position",
            SecurityAnomalyType::SuspiciousAccuracy => "suspicious_accuracy",
            SecurityAnomalyType::IncompleteMetadata => "incomplete_metadata",
        }
    }
}

/// A security-relevant observation about a record. Anomalies never block the
/// stream by themselves; they feed the security metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnomaly {
    pub id: String,
    pub anomaly_type: SecurityAnomalyType,
    pub train_id: String,
    pub detail: String,
    pub observed_value: f64,
    pub detected_at: u64,
}

impl SecurityAnomaly {
    fn new(
        anomaly_type: SecurityAnomalyType,
        train_id: &str,
        detail: impl Into<String>,
        observed_value: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            anomaly_type,
            train_id: train_id.to_string(),
            detail: detail.into(),
            observed_value,
            detected_at: now_ms(),
        }
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub anomalies: Vec<SecurityAnomaly>,
}

impl ValidationResult {
    pub fn has_high_risk(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::HighRisk)
    }

    /// Whether the caller must drop this record: either invalid outright or
    /// flagged high-risk despite being well-formed.
    pub fn should_drop(&self) -> bool {
        !self.is_valid || self.has_high_risk()
    }

    /// Short reason string for metrics and logs, taken from the most severe
    /// issue present.
    pub fn drop_reason(&self) -> Option<String> {
        self.issues
            .iter()
            .max_by_key(|issue| issue.severity)
            .map(|issue| format!("{}: {}", issue.field, issue.message))
    }
}

/// Plausibility filter for incoming position records. Flags anomalies without
/// blocking forward progress; only hard failures and high-risk findings stop
/// a record.
pub struct SecurityValidator {
    config: SecurityValidatorConfig,
    train_id_pattern: Regex,
    logger: Logger,
}

impl SecurityValidator {
    pub fn new(config: SecurityValidatorConfig) -> TelemetryResult<Self> {
        config.validate()?;

        let train_id_pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").map_err(|e| {
            TelemetryError::configuration_error(format!("invalid train id pattern: {}", e))
        })?;

        Ok(Self {
            config,
            train_id_pattern,
            logger: Logger::new("security_validator"),
        })
    }

    pub fn validate(&self, position: &TrainPosition) -> ValidationResult {
        let mut issues = Vec::new();
        let mut anomalies = Vec::new();

        self.check_identity(position, &mut issues);
        self.check_coordinates(position, &mut issues);
        self.check_kinematics(position, &mut issues);
        self.check_metadata(position, &mut issues);
        self.check_timestamp(position, &mut issues);
        self.check_plausibility(position, &mut issues, &mut anomalies);
        self.check_safety(position, &mut issues, &mut anomalies);

        let is_valid = !issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Reject);

        let result = ValidationResult {
            is_valid,
            issues,
            anomalies,
        };

        if result.should_drop() {
            self.logger.warn(&format!(
                "dropping record from train {}: {}",
                position.train_id,
                result.drop_reason().unwrap_or_default()
            ));
        }

        result
    }

    fn check_identity(&self, position: &TrainPosition, issues: &mut Vec<ValidationIssue>) {
        let id_len = position.train_id.len();
        if id_len < self.config.min_train_id_len || id_len > self.config.max_train_id_len {
            issues.push(ValidationIssue::new(
                "train_id",
                format!(
                    "length {} outside [{}, {}]",
                    id_len, self.config.min_train_id_len, self.config.max_train_id_len
                ),
                IssueSeverity::Reject,
            ));
        } else if !self.train_id_pattern.is_match(&position.train_id) {
            issues.push(ValidationIssue::new(
                "train_id",
                "contains characters outside the allowed identifier set",
                IssueSeverity::Reject,
            ));
        }

        if position.section_id.is_empty() {
            issues.push(ValidationIssue::new(
                "section_id",
                "must not be empty",
                IssueSeverity::Reject,
            ));
        }
    }

    fn check_coordinates(&self, position: &TrainPosition, issues: &mut Vec<ValidationIssue>) {
        if !position.latitude.is_finite() || !(-90.0..=90.0).contains(&position.latitude) {
            issues.push(ValidationIssue::new(
                "latitude",
                format!("{} outside [-90, 90]", position.latitude),
                IssueSeverity::Reject,
            ));
        }

        if !position.longitude.is_finite() || !(-180.0..=180.0).contains(&position.longitude) {
            issues.push(ValidationIssue::new(
                "longitude",
                format!("{} outside [-180, 180]", position.longitude),
                IssueSeverity::Reject,
            ));
        }
    }

    fn check_kinematics(&self, position: &TrainPosition, issues: &mut Vec<ValidationIssue>) {
        if !position.speed_kmh.is_finite()
            || position.speed_kmh < 0.0
            || position.speed_kmh > self.config.max_speed_kmh
        {
            issues.push(ValidationIssue::new(
                "speed_kmh",
                format!(
                    "{} outside [0, {}]",
                    position.speed_kmh, self.config.max_speed_kmh
                ),
                IssueSeverity::Reject,
            ));
        }

        if !position.heading_deg.is_finite() || !(0.0..=360.0).contains(&position.heading_deg) {
            issues.push(ValidationIssue::new(
                "heading_deg",
                format!("{} outside [0, 360]", position.heading_deg),
                IssueSeverity::Reject,
            ));
        }
    }

    fn check_metadata(&self, position: &TrainPosition, issues: &mut Vec<ValidationIssue>) {
        if let Some(accuracy) = position.accuracy_m {
            if !accuracy.is_finite() || accuracy <= 0.0 {
                issues.push(ValidationIssue::new(
                    "accuracy_m",
                    "must be a positive radius",
                    IssueSeverity::Reject,
                ));
            } else if accuracy > self.config.max_accuracy_m {
                issues.push(ValidationIssue::new(
                    "accuracy_m",
                    format!("{} above plausibility ceiling", accuracy),
                    IssueSeverity::Reject,
                ));
            }
        }

        if let Some(signal) = position.signal_strength_dbm {
            if !signal.is_finite()
                || signal < self.config.min_signal_dbm
                || signal > self.config.max_signal_dbm
            {
                issues.push(ValidationIssue::new(
                    "signal_strength_dbm",
                    format!(
                        "{} outside [{}, {}]",
                        signal, self.config.min_signal_dbm, self.config.max_signal_dbm
                    ),
                    IssueSeverity::Reject,
                ));
            }
        }

        if position.status == ValidationStatus::Suspect {
            issues.push(ValidationIssue::new(
                "status",
                "record arrived pre-flagged as suspect",
                IssueSeverity::Warning,
            ));
        }
    }

    fn check_timestamp(&self, position: &TrainPosition, issues: &mut Vec<ValidationIssue>) {
        if position.recorded_at == 0 {
            issues.push(ValidationIssue::new(
                "recorded_at",
                "missing timestamp",
                IssueSeverity::Reject,
            ));
            return;
        }

        let skew_limit = now_ms() + self.config.max_clock_skew_secs * 1_000;
        if position.recorded_at > skew_limit {
            issues.push(ValidationIssue::new(
                "recorded_at",
                "timestamp is in the future beyond tolerated clock skew",
                IssueSeverity::Reject,
            ));
        }
    }

    /// Cross-field plausibility: combinations that are individually legal but
    /// jointly unlikely for a real receiver on a moving train.
    fn check_plausibility(
        &self,
        position: &TrainPosition,
        issues: &mut Vec<ValidationIssue>,
        anomalies: &mut Vec<SecurityAnomaly>,
    ) {
        if position.speed_kmh > self.config.high_speed_kmh {
            if let Some(accuracy) = position.accuracy_m {
                if accuracy > self.config.poor_accuracy_m {
                    issues.push(ValidationIssue::new(
                        "speed_kmh/accuracy_m",
                        format!(
                            "{} km/h reported with {}m accuracy",
                            position.speed_kmh, accuracy
                        ),
                        IssueSeverity::Warning,
                    ));
                }
            }
        }

        if let (Some(signal), Some(accuracy)) =
            (position.signal_strength_dbm, position.accuracy_m)
        {
            if signal < self.config.low_signal_dbm
                && accuracy < self.config.suspicious_accuracy_m
            {
                issues.push(ValidationIssue::new(
                    "signal_strength_dbm/accuracy_m",
                    "weak signal paired with implausibly tight accuracy",
                    IssueSeverity::Warning,
                ));
                anomalies.push(SecurityAnomaly::new(
                    SecurityAnomalyType::SuspiciousAccuracy,
                    &position.train_id,
                    format!("{}m accuracy at {}dBm", accuracy, signal),
                    accuracy,
                ));
            }
        }

        if position.source == DataSource::Gps && position.signal_strength_dbm.is_none() {
            issues.push(ValidationIssue::new(
                "signal_strength_dbm",
                "GPS record without signal strength metadata",
                IssueSeverity::Warning,
            ));
            anomalies.push(SecurityAnomaly::new(
                SecurityAnomalyType::IncompleteMetadata,
                &position.train_id,
                "gps source missing signal strength",
                0.0,
            ));
        }
    }

    /// Safety thresholds that escalate to dedicated anomaly reports.
    fn check_safety(
        &self,
        position: &TrainPosition,
        issues: &mut Vec<ValidationIssue>,
        anomalies: &mut Vec<SecurityAnomaly>,
    ) {
        if position.speed_kmh > self.config.impossible_speed_kmh
            && position.speed_kmh <= self.config.max_speed_kmh
        {
            issues.push(ValidationIssue::new(
                "speed_kmh",
                format!(
                    "{} km/h exceeds the operational ceiling for rail",
                    position.speed_kmh
                ),
                IssueSeverity::HighRisk,
            ));
            anomalies.push(SecurityAnomaly::new(
                SecurityAnomalyType::ImpossibleSpeed,
                &position.train_id,
                format!("reported {} km/h", position.speed_kmh),
                position.speed_kmh,
            ));
        }

        let age_ms = position.age_ms();
        if age_ms > self.config.max_position_age_secs * 1_000 {
            issues.push(ValidationIssue::new(
                "recorded_at",
                format!("record is {}s old", age_ms / 1_000),
                IssueSeverity::Warning,
            ));
            anomalies.push(SecurityAnomaly::new(
                SecurityAnomalyType::StalePosition,
                &position.train_id,
                format!("position aged {}ms", age_ms),
                age_ms as f64,
            ));
        }
    }
}
