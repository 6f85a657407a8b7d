// src/utils/time.rs

use chrono::{DateTime, TimeZone, Utc};

/// Current timestamp in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Current timestamp in seconds since Unix epoch.
pub fn now_secs() -> u64 {
    Utc::now().timestamp() as u64
}

/// Age in milliseconds of an epoch-millis timestamp, saturating at zero for
/// timestamps that sit in the future (clock skew between reporters).
pub fn age_ms(timestamp_ms: u64) -> u64 {
    now_ms().saturating_sub(timestamp_ms)
}

/// Convert an epoch-millis timestamp into a chrono DateTime, falling back to
/// the epoch for out-of-range values.
pub fn ms_to_datetime(timestamp_ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp_ms as i64)
        .single()
        .unwrap_or_default()
}
