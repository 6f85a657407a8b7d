// src/types.rs
// Shared domain types used across ingestion, analysis, and monitoring.

use serde::{Deserialize, Serialize};

use crate::utils::time;

/// Origin of a position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Gps,
    Balise,
    Manual,
    Estimated,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Gps => "gps",
            DataSource::Balise => "balise",
            DataSource::Manual => "manual",
            DataSource::Estimated => "estimated",
        }
    }
}

/// Validation state a record carries on the wire. Upstream reporters may
/// pre-flag records they already consider suspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Unvalidated,
    Validated,
    Suspect,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Unvalidated => "unvalidated",
            ValidationStatus::Validated => "validated",
            ValidationStatus::Suspect => "suspect",
        }
    }
}

/// A single position report from a train. Created by the upstream source and
/// never mutated on its way through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainPosition {
    pub train_id: String,
    pub section_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Reported speed in km/h.
    pub speed_kmh: f64,
    /// Compass heading in degrees, 0-360.
    pub heading_deg: f64,
    /// Reported GPS accuracy radius in meters, when available.
    pub accuracy_m: Option<f64>,
    /// Receiver signal strength in dBm, when available.
    pub signal_strength_dbm: Option<f64>,
    pub source: DataSource,
    pub status: ValidationStatus,
    /// Epoch milliseconds at which the position was recorded upstream.
    pub recorded_at: u64,
}

impl TrainPosition {
    /// End-to-end age of this record in milliseconds, zero for future-dated
    /// records.
    pub fn age_ms(&self) -> u64 {
        time::age_ms(self.recorded_at)
    }
}

/// Connection state of the ingestion pipeline towards its upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Degraded => "degraded",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Degraded)
    }
}

/// Composite quality score for the position stream, recomputed per processed
/// record from end-to-end latency, reported accuracy, and the circuit
/// breaker's rolling success ratio. All component scores are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub latency_ms: f64,
    pub latency_score: f64,
    pub accuracy_score: f64,
    pub reliability: f64,
    pub overall_score: f64,
    pub last_updated: u64,
}

impl Default for DataQuality {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            latency_score: 1.0,
            accuracy_score: 1.0,
            reliability: 1.0,
            overall_score: 1.0,
            last_updated: time::now_ms(),
        }
    }
}
