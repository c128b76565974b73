//! Tests for error types

use trueno_ab::experiment::ExperimentStatus;
use trueno_ab::Error;

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("allocation must sum to 1.0, got 0.9".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid experiment configuration"));
    assert!(error_str.contains("got 0.9"));
    assert!(error_str.contains("Fix the definition"));
}

#[test]
fn test_duplicate_experiment_error() {
    let error = Error::DuplicateExperiment {
        experiment_id: "exp-1".to_string(),
    };
    assert_eq!(format!("{error}"), "Experiment already exists: exp-1");
}

#[test]
fn test_not_running_error() {
    let error = Error::ExperimentNotRunning {
        experiment_id: "exp-1".to_string(),
        status: ExperimentStatus::Stopped,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("exp-1"));
    assert!(error_str.contains("status: stopped"));
}

#[test]
fn test_invalid_transition_error() {
    let error = Error::InvalidTransition {
        experiment_id: "exp-1".to_string(),
        from: ExperimentStatus::Completed,
        to: ExperimentStatus::Running,
    };
    assert!(format!("{error}").contains("completed -> running"));
}

#[test]
fn test_segment_excluded_error() {
    let error = Error::SegmentExcluded {
        experiment_id: "exp-1".to_string(),
        segment: "trial".to_string(),
    };
    assert!(format!("{error}").contains("'trial'"));
}

#[test]
fn test_unknown_assignment_error() {
    let error = Error::UnknownAssignment {
        user_id: "user-9".to_string(),
        experiment_id: "exp-1".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("user-9"));
    assert!(error_str.contains("Assign the user before recording events"));
}

#[test]
fn test_insufficient_data_error() {
    let error = Error::InsufficientData {
        experiment_id: "exp-1".to_string(),
        variants_with_data: 1,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("1 variant(s)"));
    assert!(error_str.contains("need at least 2"));
}

#[test]
fn test_control_without_data_error() {
    let error = Error::ControlWithoutData {
        experiment_id: "exp-1".to_string(),
        control_variant: "control".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("'control'"));
    assert!(error_str.contains("no participants"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot missing");
    let error: Error = io_error.into();
    assert!(matches!(error, Error::Io(_)));
    assert!(format!("{error}").contains("snapshot missing"));
}

#[test]
fn test_serialization_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").starts_with("Serialization error"));
}

#[test]
fn test_error_debug() {
    let error = Error::Computation("non-finite expected lift".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Computation"));
}
