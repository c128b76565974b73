//! Statistical Engine Tests
//!
//! Frequentist and Bayesian verdicts through the public facade.

use trueno_ab::config::{EngineConfig, SignificanceMethod};
use trueno_ab::stats::{
    lift_percentage, ArmCounts, BayesianAnalyzer, SampleSizePlanner, StatisticalEngine,
};

const ALPHA: f64 = 0.05;

fn engine() -> StatisticalEngine {
    StatisticalEngine::new(&EngineConfig::builder().bayes_seed(2024).build())
}

// =============================================================================
// Frequentist
// =============================================================================

#[test]
fn test_identical_arms_not_significant() {
    let result = engine()
        .significance(ArmCounts::new(1000, 50), ArmCounts::new(1000, 50), ALPHA)
        .into_value();
    assert!(result.p_value > 0.99);
    assert!(!result.is_significant);
    assert!(result.sample_size_adequate);
}

#[test]
fn test_fifty_percent_lift_is_significant() {
    let estimate =
        engine().significance(ArmCounts::new(1000, 50), ArmCounts::new(1000, 75), ALPHA);
    assert!(!estimate.is_degraded());

    let result = estimate.into_value();
    assert!((result.lift_percentage - 50.0).abs() < 1e-9);
    assert!(result.p_value < ALPHA);
    assert!(result.is_significant);
    assert!(result.confidence_interval.0 >= 0.0);
    assert!(result.confidence_interval.1 <= 1.0);
}

#[test]
fn test_below_minimum_sample_never_significant() {
    let config = EngineConfig::builder().min_sample_size(5_000).build();
    let result = StatisticalEngine::new(&config)
        .significance(ArmCounts::new(1000, 50), ArmCounts::new(1000, 150), ALPHA)
        .into_value();
    assert!(result.p_value < 1e-6);
    assert!(!result.is_significant);
}

#[test]
fn test_pooled_approximation_selected_by_config() {
    let config = EngineConfig::builder()
        .significance_method(SignificanceMethod::PooledApproximation)
        .build();
    let engine = StatisticalEngine::new(&config);
    assert_eq!(engine.test_name(), "pooled_approximation");

    let result = engine
        .significance(ArmCounts::new(1000, 50), ArmCounts::new(1000, 75), ALPHA)
        .into_value();
    assert!(result.is_significant);
    // fixed ±0.05 interval around the variant rate
    assert!((result.confidence_interval.0 - 0.025).abs() < 1e-12);
    assert!((result.confidence_interval.1 - 0.125).abs() < 1e-12);
}

#[test]
fn test_lift_guard() {
    assert!(lift_percentage(0.0, 0.5).abs() < f64::EPSILON);
    let result = engine()
        .significance(ArmCounts::new(500, 0), ArmCounts::new(500, 10), ALPHA)
        .into_value();
    assert!(result.lift_percentage.abs() < f64::EPSILON);
    assert!(result.p_value.is_finite());
}

// =============================================================================
// Bayesian
// =============================================================================

#[test]
fn test_bayesian_symmetric_case() {
    for seed in [1, 2, 3] {
        let summary = BayesianAnalyzer::new(10_000, Some(seed))
            .analyze(ArmCounts::new(100, 10), ArmCounts::new(100, 10))
            .into_value();
        assert!((summary.probability_variant_better - 0.5).abs() < 0.05);
        assert!(!summary.should_stop_early);
    }
}

#[test]
fn test_bayesian_decisive_case() {
    let summary = engine()
        .bayesian(ArmCounts::new(1000, 20), ArmCounts::new(1000, 80))
        .into_value();
    assert!(summary.probability_variant_better > 0.99);
    assert!(summary.should_stop_early);
    assert!(summary.lift_credible_interval.0 > 0.0);
}

#[test]
fn test_bayesian_worse_variant_also_stops() {
    let summary = engine()
        .bayesian(ArmCounts::new(1000, 80), ArmCounts::new(1000, 20))
        .into_value();
    assert!(summary.probability_variant_better < 0.01);
    assert!(summary.should_stop_early);
    assert!(summary.confidence_level > 0.99);
}

#[test]
fn test_compare_returns_both_verdicts() {
    let comparison = engine().compare(ArmCounts::new(0, 0), ArmCounts::new(100, 10), ALPHA);
    assert!(comparison.significance.is_degraded());
    assert!(!comparison.bayesian.is_degraded());
}

// =============================================================================
// Sample size
// =============================================================================

#[test]
fn test_sample_size_reference() {
    let n = engine().plan_sample_size(0.05, 0.2, 0.8, 0.05).into_value();
    assert!((8_000..8_300).contains(&n));
}

#[test]
fn test_sample_size_fallback_is_tagged() {
    let estimate = SampleSizePlanner::new(100).plan(0.05, 0.0, 0.8, 0.05);
    assert!(estimate.is_degraded());
    assert!(estimate.reason().unwrap().contains("minimum effect"));
    assert_eq!(estimate.into_value(), 1000);
}
