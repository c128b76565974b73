//! Sample-size planning for conversion-rate experiments.

use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use super::Estimate;
use crate::{Error, Result};

/// Floor of the closed-form heuristic.
const HEURISTIC_FLOOR: u64 = 1000;

/// Per-arm sample size planner.
///
/// Uses the normal-approximation power formula for two proportions:
///
/// ```text
/// p2 = p1 (1 + mde)
/// n  = (z_{1-α/2} √(2 p̄ (1 - p̄)) + z_{power} √(p1 (1 - p1) + p2 (1 - p2)))² / (p2 - p1)²
/// ```
///
/// When the inputs are out of domain the coarse heuristic
/// `max(1000, 16 / mde²)` is returned instead, tagged as degraded.
#[derive(Debug, Clone, Copy)]
pub struct SampleSizePlanner {
    min_sample_size: u64,
}

impl SampleSizePlanner {
    /// Create a planner that never returns less than `min_sample_size`.
    #[must_use]
    pub const fn new(min_sample_size: u64) -> Self {
        Self { min_sample_size }
    }

    /// Required participants per arm to detect a relative change of
    /// `minimum_effect` over `baseline_rate`.
    #[must_use]
    pub fn plan(
        &self,
        baseline_rate: f64,
        minimum_effect: f64,
        power: f64,
        alpha: f64,
    ) -> Estimate<u64> {
        match Self::power_formula(baseline_rate, minimum_effect, power, alpha) {
            Ok(n) => Estimate::Exact(n.max(self.min_sample_size)),
            Err(e) => {
                debug!(error = %e, "Sample size planner fell back to heuristic");
                Estimate::degraded(Self::heuristic(minimum_effect), e.to_string())
            }
        }
    }

    /// `max(1000, 16 / effect²)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn heuristic(minimum_effect: f64) -> u64 {
        if !(minimum_effect.is_finite() && minimum_effect > 0.0) {
            return HEURISTIC_FLOOR;
        }
        let raw = 16.0 / (minimum_effect * minimum_effect);
        if raw.is_finite() {
            HEURISTIC_FLOOR.max(raw as u64)
        } else {
            HEURISTIC_FLOOR
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn power_formula(baseline: f64, effect: f64, power: f64, alpha: f64) -> Result<u64> {
        let in_unit = |x: f64| x > 0.0 && x < 1.0;
        if !in_unit(baseline) {
            return Err(Error::Computation(format!(
                "baseline rate must be in (0, 1), got {baseline}"
            )));
        }
        if !(effect.is_finite() && effect > 0.0) {
            return Err(Error::Computation(format!(
                "minimum effect must be positive, got {effect}"
            )));
        }
        if !in_unit(power) || !in_unit(alpha) {
            return Err(Error::Computation(format!(
                "power and alpha must be in (0, 1), got {power} and {alpha}"
            )));
        }

        let p1 = baseline;
        let p2 = baseline * (1.0 + effect);
        if p2 >= 1.0 {
            return Err(Error::Computation(format!(
                "target rate {p2} is not a probability"
            )));
        }

        let normal =
            Normal::new(0.0, 1.0).map_err(|e| Error::Computation(format!("normal: {e}")))?;
        let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);
        let z_power = normal.inverse_cdf(power);

        let p_bar = (p1 + p2) / 2.0;
        let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
            + z_power * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
        let n = (numerator * numerator) / ((p2 - p1) * (p2 - p1));

        if !n.is_finite() || n <= 0.0 {
            return Err(Error::Computation(format!("invalid sample size {n}")));
        }
        Ok(n.ceil() as u64)
    }
}
