use railwatch::utils::now_ms;
use railwatch::{
    DataSource, IssueSeverity, SecurityAnomalyType, SecurityValidator, SecurityValidatorConfig,
    TrainPosition, ValidationStatus,
};

// Helper functions for testing

fn validator() -> SecurityValidator {
    SecurityValidator::new(SecurityValidatorConfig::default()).unwrap()
}

fn base_position() -> TrainPosition {
    TrainPosition {
        train_id: "12951".to_string(),
        section_id: "SEC-001".to_string(),
        latitude: 28.6,
        longitude: 77.2,
        speed_kmh: 60.0,
        heading_deg: 180.0,
        accuracy_m: Some(15.0),
        signal_strength_dbm: Some(-65.0),
        source: DataSource::Gps,
        status: ValidationStatus::Unvalidated,
        recorded_at: now_ms(),
    }
}

mod field_bounds_tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds_are_hard_failures() {
        for (lat, lon) in [(-95.0, 77.2), (95.0, 77.2), (28.6, -190.0), (28.6, 190.0)] {
            let mut position = base_position();
            position.latitude = lat;
            position.longitude = lon;
            let result = validator().validate(&position);
            assert!(!result.is_valid, "({}, {}) should be rejected", lat, lon);
        }
    }

    #[test]
    fn test_speed_bounds() {
        let mut position = base_position();
        position.speed_kmh = -1.0;
        assert!(!validator().validate(&position).is_valid);

        position.speed_kmh = 351.0;
        assert!(!validator().validate(&position).is_valid);

        position.speed_kmh = 349.0;
        // Well-formed, but high-risk per the safety check.
        let result = validator().validate(&position);
        assert!(result.is_valid);
        assert!(result.should_drop());
    }

    #[test]
    fn test_heading_bounds() {
        let mut position = base_position();
        position.heading_deg = 361.0;
        assert!(!validator().validate(&position).is_valid);

        position.heading_deg = -1.0;
        assert!(!validator().validate(&position).is_valid);

        position.heading_deg = 360.0;
        assert!(validator().validate(&position).is_valid);
    }

    #[test]
    fn test_train_id_format() {
        let mut position = base_position();
        position.train_id = "a".to_string(); // too short
        assert!(!validator().validate(&position).is_valid);

        position.train_id = "TRAIN 001".to_string(); // embedded space
        assert!(!validator().validate(&position).is_valid);

        position.train_id = "TRAIN_001".to_string();
        assert!(validator().validate(&position).is_valid);
    }

    #[test]
    fn test_accuracy_must_be_positive_and_plausible() {
        let mut position = base_position();
        position.accuracy_m = Some(0.0);
        assert!(!validator().validate(&position).is_valid);

        position.accuracy_m = Some(50_000.0);
        assert!(!validator().validate(&position).is_valid);

        position.accuracy_m = None;
        // Missing accuracy is allowed.
        assert!(validator().validate(&position).is_valid);
    }

    #[test]
    fn test_signal_strength_range() {
        let mut position = base_position();
        position.signal_strength_dbm = Some(-150.0);
        assert!(!validator().validate(&position).is_valid);

        position.signal_strength_dbm = Some(0.0);
        assert!(!validator().validate(&position).is_valid);
    }

    #[test]
    fn test_nan_fields_are_rejected() {
        let mut position = base_position();
        position.latitude = f64::NAN;
        assert!(!validator().validate(&position).is_valid);

        let mut position = base_position();
        position.speed_kmh = f64::INFINITY;
        assert!(!validator().validate(&position).is_valid);
    }
}

mod cross_field_tests {
    use super::*;

    #[test]
    fn test_high_speed_with_poor_accuracy_is_a_warning() {
        let mut position = base_position();
        position.speed_kmh = 150.0;
        position.accuracy_m = Some(250.0);
        let result = validator().validate(&position);
        assert!(result.is_valid);
        assert!(!result.should_drop());
        assert!(result
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Warning));
    }

    #[test]
    fn test_weak_signal_with_tight_accuracy_is_suspicious() {
        let mut position = base_position();
        position.signal_strength_dbm = Some(-110.0);
        position.accuracy_m = Some(2.0);
        let result = validator().validate(&position);
        assert!(result.is_valid);
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.anomaly_type == SecurityAnomalyType::SuspiciousAccuracy));
    }

    #[test]
    fn test_suspect_status_is_flagged_without_blocking() {
        let mut position = base_position();
        position.status = ValidationStatus::Suspect;
        let result = validator().validate(&position);
        assert!(result.is_valid);
        assert!(!result.should_drop());
    }
}

mod severity_policy_tests {
    use super::*;

    #[test]
    fn test_drop_reason_picks_most_severe_issue() {
        let mut position = base_position();
        position.speed_kmh = 300.0; // high risk
        position.status = ValidationStatus::Suspect; // warning
        let result = validator().validate(&position);
        let reason = result.drop_reason().unwrap();
        assert!(reason.contains("speed_kmh"));
    }

    #[test]
    fn test_anomalies_do_not_imply_drop() {
        let mut position = base_position();
        position.recorded_at = now_ms() - 10 * 60 * 1_000; // stale
        let result = validator().validate(&position);
        assert!(!result.anomalies.is_empty());
        assert!(!result.should_drop());
    }
}
