//! Two-proportion significance tests.

use std::f64::consts::SQRT_2;
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;
use tracing::debug;

use super::{lift_percentage, ArmCounts, Estimate};
use crate::config::SignificanceMethod;

/// |z| threshold of the pooled approximation (two-sided 5%).
const POOLED_Z_THRESHOLD: f64 = 1.96;

/// Half-width of the fixed interval reported by the pooled approximation.
const POOLED_CI_MARGIN: f64 = 0.05;

/// Frequentist verdict for one variant against control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    /// Control conversion rate.
    pub control_rate: f64,
    /// Variant conversion rate.
    pub variant_rate: f64,
    /// Relative change in percent (0 when control rate is 0).
    pub lift_percentage: f64,
    /// Two-sided p-value (a normal-tail proxy under the pooled approximation).
    pub p_value: f64,
    /// z statistic.
    pub z_statistic: f64,
    /// Interval for the variant rate, clipped to [0, 1].
    pub confidence_interval: (f64, f64),
    /// Significant and both arms large enough.
    pub is_significant: bool,
    /// Both arms have at least the configured minimum participants.
    pub sample_size_adequate: bool,
}

/// A two-proportion significance test.
///
/// Implementations must return the same result shape so callers never
/// branch on which one ran.
pub trait SignificanceTest: Send + Sync + fmt::Debug {
    /// Stable identifier.
    fn name(&self) -> &'static str;

    /// Compare `variant` against `control` at level `alpha`.
    fn evaluate(
        &self,
        control: ArmCounts,
        variant: ArmCounts,
        alpha: f64,
    ) -> Estimate<SignificanceResult>;
}

/// Build the configured test.
#[must_use]
pub fn significance_test(
    method: SignificanceMethod,
    min_sample_size: u64,
) -> Box<dyn SignificanceTest> {
    match method {
        SignificanceMethod::TwoProportionZ => Box::new(TwoProportionZTest::new(min_sample_size)),
        SignificanceMethod::PooledApproximation => {
            Box::new(PooledApproximation::new(min_sample_size))
        }
    }
}

/// Pooled conversion rate of both arms (0 without participants).
#[allow(clippy::cast_precision_loss)]
fn pooled_rate(control: ArmCounts, variant: ArmCounts) -> f64 {
    let total = control.participants + variant.participants;
    if total == 0 {
        0.0
    } else {
        ((control.conversions + variant.conversions) as f64 / total as f64).min(1.0)
    }
}

/// z statistic with a pooled standard error; 0 when undefined.
#[allow(clippy::cast_precision_loss)]
fn pooled_z(control: ArmCounts, variant: ArmCounts) -> f64 {
    if control.participants == 0 || variant.participants == 0 {
        return 0.0;
    }
    let pooled = pooled_rate(control, variant);
    let se = (pooled
        * (1.0 - pooled)
        * (1.0 / control.participants as f64 + 1.0 / variant.participants as f64))
        .sqrt();
    if se > 0.0 {
        (variant.rate() - control.rate()) / se
    } else {
        0.0
    }
}

fn clip_interval(low: f64, high: f64) -> (f64, f64) {
    (low.max(0.0), high.min(1.0))
}

/// Pooled-proportion approximation.
///
/// Significance is the fixed rule |z| > 1.96; the p-value is the
/// normal tail of |z| and the interval is the variant rate ± 0.05.
#[derive(Debug, Clone, Copy)]
pub struct PooledApproximation {
    min_sample_size: u64,
}

impl PooledApproximation {
    /// Create the test with the per-arm minimum sample size.
    #[must_use]
    pub const fn new(min_sample_size: u64) -> Self {
        Self { min_sample_size }
    }

    fn compute(&self, control: ArmCounts, variant: ArmCounts) -> SignificanceResult {
        let control_rate = control.rate();
        let variant_rate = variant.rate();
        let z = pooled_z(control, variant);
        let sample_size_adequate =
            control.participants.min(variant.participants) >= self.min_sample_size;

        SignificanceResult {
            control_rate,
            variant_rate,
            lift_percentage: lift_percentage(control_rate, variant_rate),
            p_value: erfc(z.abs() / SQRT_2),
            z_statistic: z,
            confidence_interval: clip_interval(
                variant_rate - POOLED_CI_MARGIN,
                variant_rate + POOLED_CI_MARGIN,
            ),
            is_significant: sample_size_adequate && z.abs() > POOLED_Z_THRESHOLD,
            sample_size_adequate,
        }
    }
}

impl SignificanceTest for PooledApproximation {
    fn name(&self) -> &'static str {
        "pooled_approximation"
    }

    fn evaluate(
        &self,
        control: ArmCounts,
        variant: ArmCounts,
        _alpha: f64,
    ) -> Estimate<SignificanceResult> {
        Estimate::Exact(self.compute(control, variant))
    }
}

/// Two-proportion z-test (normal approximation to the binomial difference).
///
/// Falls back to [`PooledApproximation`] when an arm is empty or the normal
/// distribution cannot be evaluated.
#[derive(Debug, Clone, Copy)]
pub struct TwoProportionZTest {
    min_sample_size: u64,
    fallback: PooledApproximation,
}

impl TwoProportionZTest {
    /// Create the test with the per-arm minimum sample size.
    #[must_use]
    pub const fn new(min_sample_size: u64) -> Self {
        Self {
            min_sample_size,
            fallback: PooledApproximation::new(min_sample_size),
        }
    }

    fn degrade(
        &self,
        control: ArmCounts,
        variant: ArmCounts,
        reason: String,
    ) -> Estimate<SignificanceResult> {
        debug!(%reason, "Significance test degraded to pooled approximation");
        Estimate::degraded(self.fallback.compute(control, variant), reason)
    }
}

impl SignificanceTest for TwoProportionZTest {
    fn name(&self) -> &'static str {
        "two_proportion_z"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(
        &self,
        control: ArmCounts,
        variant: ArmCounts,
        alpha: f64,
    ) -> Estimate<SignificanceResult> {
        if control.participants == 0 || variant.participants == 0 {
            return self.degrade(control, variant, "an arm has no participants".to_string());
        }
        let normal = match Normal::new(0.0, 1.0) {
            Ok(normal) => normal,
            Err(e) => return self.degrade(control, variant, format!("normal distribution: {e}")),
        };

        let control_rate = control.rate();
        let variant_rate = variant.rate();
        let z = pooled_z(control, variant);
        let p_value = 2.0 * normal.sf(z.abs());

        let z_critical = normal.inverse_cdf(0.975);
        let margin =
            z_critical * (variant_rate * (1.0 - variant_rate) / variant.participants as f64).sqrt();

        if !(p_value.is_finite() && margin.is_finite()) {
            return self.degrade(control, variant, "non-finite test statistic".to_string());
        }

        let sample_size_adequate =
            control.participants.min(variant.participants) >= self.min_sample_size;

        Estimate::Exact(SignificanceResult {
            control_rate,
            variant_rate,
            lift_percentage: lift_percentage(control_rate, variant_rate),
            p_value,
            z_statistic: z,
            confidence_interval: clip_interval(variant_rate - margin, variant_rate + margin),
            is_significant: sample_size_adequate && p_value < alpha,
            sample_size_adequate,
        })
    }
}
