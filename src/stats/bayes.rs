//! Bayesian early-stopping signal.
//!
//! Each arm's conversion rate gets a Beta(conversions + 1, failures + 1)
//! posterior. Paired Monte Carlo draws give:
//!
//! - P(variant > control)
//! - expected relative lift and its 95% credible interval
//! - a 95% credible interval for the variant rate
//!
//! The signal is advisory. Any failure yields a neutral, degraded summary
//! (probability 0.5, no early stop).

use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ArmCounts, Estimate};
use crate::config::EngineConfig;
use crate::{Error, Result};

/// Control draws below this are excluded from lift statistics.
const MIN_CONTROL_DRAW: f64 = 1e-12;

/// Posterior summary for one variant against control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BayesianSummary {
    /// Fraction of paired draws where the variant beats control.
    pub probability_variant_better: f64,
    /// Mean relative lift over draws, in percent.
    pub expected_lift: f64,
    /// 2.5/97.5 percentiles of the variant rate draws.
    pub variant_credible_interval: (f64, f64),
    /// 2.5/97.5 percentiles of the lift draws, in percent.
    pub lift_credible_interval: (f64, f64),
    /// Evidence is conclusive in either direction.
    pub should_stop_early: bool,
    /// max(p, 1 - p).
    pub confidence_level: f64,
}

impl BayesianSummary {
    /// The "no information" summary.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            probability_variant_better: 0.5,
            expected_lift: 0.0,
            variant_credible_interval: (0.0, 1.0),
            lift_credible_interval: (0.0, 0.0),
            should_stop_early: false,
            confidence_level: 0.5,
        }
    }
}

/// Monte Carlo posterior comparison.
#[derive(Debug, Clone, Copy)]
pub struct BayesianAnalyzer {
    samples: usize,
    seed: Option<u64>,
    stop_upper: f64,
    stop_lower: f64,
}

impl BayesianAnalyzer {
    /// Create an analyzer drawing `samples` per posterior.
    #[must_use]
    pub const fn new(samples: usize, seed: Option<u64>) -> Self {
        Self {
            samples,
            seed,
            stop_upper: 0.95,
            stop_lower: 0.05,
        }
    }

    /// Build from engine configuration.
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            samples: config.monte_carlo_samples,
            seed: config.bayes_seed,
            stop_upper: config.early_stop_upper,
            stop_lower: config.early_stop_lower,
        }
    }

    /// Compare the posteriors of `variant` and `control`.
    #[must_use]
    pub fn analyze(&self, control: ArmCounts, variant: ArmCounts) -> Estimate<BayesianSummary> {
        match self.try_analyze(control, variant) {
            Ok(summary) => Estimate::Exact(summary),
            Err(e) => {
                warn!(error = %e, "Bayesian analysis failed; returning neutral result");
                Estimate::degraded(BayesianSummary::neutral(), e.to_string())
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn try_analyze(&self, control: ArmCounts, variant: ArmCounts) -> Result<BayesianSummary> {
        if self.samples == 0 {
            return Err(Error::Computation("monte carlo sample count is zero".to_string()));
        }
        let control_posterior = posterior(control)?;
        let variant_posterior = posterior(variant)?;

        let mut rng = match self.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::seed_from_u64(rand::rng().random()),
        };

        let mut variant_draws = Vec::with_capacity(self.samples);
        let mut lift_draws = Vec::with_capacity(self.samples);
        let mut wins = 0usize;

        for _ in 0..self.samples {
            let c = control_posterior.sample(&mut rng);
            let v = variant_posterior.sample(&mut rng);
            if v > c {
                wins += 1;
            }
            variant_draws.push(v);
            if c > MIN_CONTROL_DRAW {
                lift_draws.push((v - c) / c * 100.0);
            }
        }

        if lift_draws.is_empty() {
            return Err(Error::Computation(
                "every control draw was zero; lift undefined".to_string(),
            ));
        }

        let probability = wins as f64 / self.samples as f64;
        let expected_lift = lift_draws.iter().sum::<f64>() / lift_draws.len() as f64;
        if !expected_lift.is_finite() {
            return Err(Error::Computation("non-finite expected lift".to_string()));
        }

        Ok(BayesianSummary {
            probability_variant_better: probability,
            expected_lift,
            variant_credible_interval: credible_interval(&mut variant_draws),
            lift_credible_interval: credible_interval(&mut lift_draws),
            should_stop_early: probability > self.stop_upper || probability < self.stop_lower,
            confidence_level: probability.max(1.0 - probability),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn posterior(arm: ArmCounts) -> Result<Beta<f64>> {
    if arm.conversions > arm.participants {
        return Err(Error::Computation(format!(
            "{} conversions exceed {} participants",
            arm.conversions, arm.participants
        )));
    }
    let alpha = arm.conversions as f64 + 1.0;
    let beta = (arm.participants - arm.conversions) as f64 + 1.0;
    Beta::new(alpha, beta).map_err(|e| Error::Computation(format!("beta posterior: {e}")))
}

/// 2.5th and 97.5th percentiles (sorts `draws`).
fn credible_interval(draws: &mut [f64]) -> (f64, f64) {
    draws.sort_unstable_by(f64::total_cmp);
    (percentile(draws, 2.5), percentile(draws, 97.5))
}

/// Percentile of sorted data with linear interpolation between ranks.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = pct / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}
