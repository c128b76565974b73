//! Experiment Schema Tests
//!
//! Definition validation, lifecycle rules and JSON round trips of the
//! persisted records.

use serde_json::json;
use trueno_ab::experiment::{
    validate_allocation, Assignment, EventInput, EventType, Experiment, ExperimentStatus, Variant,
};
use trueno_ab::Error;

fn two_arm(id: &str) -> Experiment {
    Experiment::builder(id, "Checkout copy")
        .description("Copy test on the checkout button")
        .hypothesis("Friendlier copy converts better")
        .variant("control", json!({"copy": "Buy now"}))
        .variant("variant_1", json!({"copy": "Get yours"}))
        .traffic_allocation(vec![0.5, 0.5])
        .created_by("growth-team")
        .build()
        .unwrap()
}

// =============================================================================
// Experiment Tests
// =============================================================================

#[test]
fn test_experiment_defaults() {
    let exp = two_arm("exp-001");

    assert_eq!(exp.experiment_id(), "exp-001");
    assert_eq!(exp.status(), ExperimentStatus::Draft);
    assert_eq!(exp.success_metric(), "conversion_rate");
    assert_eq!(exp.target_sample_size(), 1000);
    assert_eq!(exp.max_duration_days(), 30);
    assert_eq!(exp.config_version(), 1);
    assert!(exp.started_at().is_none());
    assert!(exp.ended_at().is_none());
    assert!(exp.created_at().timestamp() > 0);
    assert_eq!(exp.created_by(), "growth-team");
}

#[test]
fn test_equal_split_when_allocation_omitted() {
    let exp = Experiment::builder("exp-002", "Three arms")
        .variant("control", json!({}))
        .variant("variant_1", json!({}))
        .variant("variant_2", json!({}))
        .build()
        .unwrap();

    let total: f64 = exp.traffic_allocation().iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(exp.traffic_allocation().len(), 3);
}

#[test]
fn test_control_falls_back_to_first_variant() {
    let exp = Experiment::builder("exp-003", "No control")
        .variant("blue", json!({}))
        .variant("green", json!({}))
        .build()
        .unwrap();
    assert_eq!(exp.control_variant().name(), "blue");

    assert_eq!(two_arm("exp-004").control_variant().name(), "control");
}

#[test]
fn test_variant_lookup() {
    let exp = two_arm("exp-005");
    assert!(exp.has_variant("variant_1"));
    assert!(!exp.has_variant("variant_9"));
    assert_eq!(exp.variant("control").unwrap().config()["copy"], "Buy now");
    assert_eq!(exp.allocation_for("variant_1"), Some(0.5));
}

#[test]
fn test_invalid_definitions_rejected() {
    let cases = vec![
        Experiment::builder("", "no id").variant("control", json!({})).build(),
        Experiment::builder("e", "no variants").build(),
        Experiment::builder("e", "dup")
            .variant("control", json!({}))
            .variant("control", json!({}))
            .build(),
        Experiment::builder("e", "short allocation")
            .variant("control", json!({}))
            .variant("variant_1", json!({}))
            .traffic_allocation(vec![1.0])
            .build(),
        Experiment::builder("e", "bad alpha")
            .variant("control", json!({}))
            .significance_level(1.5)
            .build(),
        Experiment::builder("e", "bad holdout")
            .variant("control", json!({}))
            .holdout_fraction(1.0)
            .build(),
    ];

    for case in cases {
        assert!(matches!(case, Err(Error::Configuration(_))));
    }
}

#[test]
fn test_allocation_validation() {
    assert!(validate_allocation(&[0.5, 0.3, 0.2], 3).is_ok());
    assert!(validate_allocation(&[0.5, 0.5 + 1e-7], 2).is_ok());
    assert!(validate_allocation(&[0.5, 0.4], 2).is_err());
    assert!(validate_allocation(&[1.2, -0.2], 2).is_err());
    assert!(validate_allocation(&[f64::NAN, 1.0], 2).is_err());
    assert!(validate_allocation(&[1.0], 2).is_err());
}

#[test]
fn test_segment_filter() {
    let exp = Experiment::builder("exp-006", "Premium only")
        .variant("control", json!({}))
        .segment_filter(vec!["premium".to_string(), "vip".to_string()])
        .build()
        .unwrap();

    assert!(exp.accepts_segment("vip"));
    assert!(!exp.accepts_segment("default"));
    assert!(two_arm("exp-007").accepts_segment("anything"));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_status_transitions() {
    use ExperimentStatus::{Completed, Draft, Running, Stopped};

    assert!(Draft.can_transition_to(Running));
    assert!(Running.can_transition_to(Stopped));
    assert!(Running.can_transition_to(Completed));
    assert!(Stopped.can_transition_to(Running));
    assert!(Stopped.can_transition_to(Completed));

    assert!(!Draft.can_transition_to(Completed));
    assert!(!Draft.can_transition_to(Stopped));
    assert!(!Completed.can_transition_to(Running));
    assert!(!Running.can_transition_to(Draft));
}

#[test]
fn test_status_display_and_serde() {
    assert_eq!(ExperimentStatus::Running.to_string(), "running");
    assert_eq!(
        serde_json::to_value(ExperimentStatus::Completed).unwrap(),
        json!("completed")
    );
}

// =============================================================================
// Assignment / Event Tests
// =============================================================================

#[test]
fn test_assignment_defaults() {
    let assignment = Assignment::new("user-1", "exp-001", "variant_1");

    assert_eq!(assignment.user_id(), "user-1");
    assert_eq!(assignment.experiment_id(), "exp-001");
    assert_eq!(assignment.variant_name(), "variant_1");
    assert_eq!(assignment.segment(), "default");
    assert!(!assignment.is_holdout());
    assert_eq!(assignment.config_version(), 1);
}

#[test]
fn test_assignment_builder() {
    let assignment = Assignment::builder("user-2", "exp-001", "control")
        .segment("premium")
        .holdout(true)
        .config_version(3)
        .build();

    assert_eq!(assignment.segment(), "premium");
    assert!(assignment.is_holdout());
    assert_eq!(assignment.config_version(), 3);
}

#[test]
fn test_event_carries_assigned_variant() {
    let event = EventInput::new("user-1", "exp-001", EventType::Custom("add_to_cart".into()), 0.0)
        .metadata(json!({"sku": "A-17"}))
        .into_event("variant_1");

    assert_eq!(event.variant_name(), "variant_1");
    assert!(!event.event_type().is_conversion());
    assert_eq!(event.metadata()["sku"], "A-17");

    let conversion = EventInput::conversion("user-1", "exp-001", 42.0).into_event("control");
    assert!(conversion.event_type().is_conversion());
    assert!((conversion.value() - 42.0).abs() < f64::EPSILON);
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_experiment_json_round_trip() {
    let exp = two_arm("exp-008");
    let json = serde_json::to_string(&exp).unwrap();
    let back: Experiment = serde_json::from_str(&json).unwrap();
    assert_eq!(back, exp);
}

#[test]
fn test_variant_payload_is_opaque() {
    let variant = Variant::new("variant_1", json!({"price": 44.99, "badge": null}));
    let value = serde_json::to_value(&variant).unwrap();
    assert_eq!(value["name"], "variant_1");
    assert_eq!(value["config"]["price"], 44.99);
}
