//! Property-based tests for trueno-ab
//!
//! - Assignment is a pure function of (user, experiment, config)
//! - Every allocation maps every bucket to a variant with a positive share
//! - Statistical outputs stay in range for any counts
//! - Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;
use serde_json::json;
use trueno_ab::assignment::{bucket, select_variant};
use trueno_ab::experiment::Experiment;
use trueno_ab::stats::{
    ArmCounts, BayesianAnalyzer, SampleSizePlanner, SignificanceTest, TwoProportionZTest,
};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Allocation vector of 2..=5 shares normalized to sum to 1
fn arb_allocation() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.0f64..10.0, 2..=5).prop_filter_map("all zero", |raw| {
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let mut shares: Vec<f64> = raw.iter().map(|x| x / total).collect();
        // absorb rounding in the last share
        let head: f64 = shares[..shares.len() - 1].iter().sum();
        let last = shares.len() - 1;
        shares[last] = (1.0 - head).max(0.0);
        Some(shares)
    })
}

fn experiment_with(allocation: Vec<f64>) -> Experiment {
    let mut builder = Experiment::builder("exp-prop", "Property");
    for i in 0..allocation.len() {
        builder = builder.variant(format!("arm_{i}"), json!({}));
    }
    builder.traffic_allocation(allocation).build().unwrap()
}

/// (participants, conversions ≤ participants)
fn arb_arm() -> impl Strategy<Value = ArmCounts> {
    (0u64..5_000).prop_flat_map(|n| (Just(n), 0..=n).prop_map(|(n, c)| ArmCounts::new(n, c)))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: buckets are in [0, 1) and reproducible
    #[test]
    fn prop_bucket_in_unit_interval(user in "[a-z0-9_-]{1,24}", exp in "[a-z0-9-]{1,12}") {
        let b = bucket(&user, &exp);
        prop_assert!((0.0..1.0).contains(&b));
        prop_assert_eq!(b.to_bits(), bucket(&user, &exp).to_bits());
    }

    /// Property: a zero share is never selected
    #[test]
    fn prop_zero_share_never_selected(allocation in arb_allocation(), user in "[a-z0-9]{1,16}") {
        let exp = experiment_with(allocation.clone());
        let chosen = select_variant(&exp, bucket(&user, "exp-prop"));
        let index = exp.variants().iter().position(|v| v == chosen).unwrap();
        prop_assert!(allocation[index] > 0.0);
    }

    /// Property: selection is monotone in the bucket
    #[test]
    fn prop_selection_monotone(allocation in arb_allocation(), a in 0.0f64..1.0, b in 0.0f64..1.0) {
        let exp = experiment_with(allocation);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let index = |x: f64| {
            let chosen = select_variant(&exp, x);
            exp.variants().iter().position(|v| v == chosen).unwrap()
        };
        prop_assert!(index(lo) <= index(hi));
    }

    /// Property: p-values and intervals stay in range
    #[test]
    fn prop_significance_in_range(control in arb_arm(), variant in arb_arm()) {
        let result = TwoProportionZTest::new(100).evaluate(control, variant, 0.05).into_value();
        prop_assert!((0.0..=1.0 + 1e-12).contains(&result.p_value));
        prop_assert!(result.confidence_interval.0 >= 0.0);
        prop_assert!(result.confidence_interval.1 <= 1.0);
        prop_assert!(result.lift_percentage.is_finite());
        if result.is_significant {
            prop_assert!(result.sample_size_adequate);
        }
    }

    /// Property: posterior probability is a probability and confidence is its max side
    #[test]
    fn prop_bayesian_in_range(control in arb_arm(), variant in arb_arm(), seed in any::<u64>()) {
        let summary = BayesianAnalyzer::new(500, Some(seed)).analyze(control, variant).into_value();
        prop_assert!((0.0..=1.0).contains(&summary.probability_variant_better));
        prop_assert!(summary.confidence_level >= 0.5);
        prop_assert!(
            (summary.confidence_level
                - summary.probability_variant_better.max(1.0 - summary.probability_variant_better))
            .abs()
                < 1e-12
        );
    }

    /// Property: planned sample size never drops below the floor
    #[test]
    fn prop_sample_size_floor(baseline in 0.001f64..0.5, effect in 0.01f64..1.0, floor in 1u64..10_000) {
        let n = SampleSizePlanner::new(floor).plan(baseline, effect, 0.8, 0.05).into_value();
        prop_assert!(n >= floor.min(1000));
    }
}
