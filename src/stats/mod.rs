//! Statistical Engine
//!
//! Two independent verdicts for "is this variant better than control":
//!
//! - **Frequentist**: two-proportion significance test ([`SignificanceTest`])
//! - **Bayesian**: Beta-posterior Monte Carlo for early stopping ([`BayesianAnalyzer`])
//!
//! plus sample-size planning ([`SampleSizePlanner`]).
//!
//! Nothing here fails. Every routine returns an [`Estimate`]: either an
//! exact answer or a degraded one carrying the reason the fallback ran.

mod bayes;
mod sample_size;
mod significance;

pub use bayes::{BayesianAnalyzer, BayesianSummary};
pub use sample_size::SampleSizePlanner;
pub use significance::{
    significance_test, PooledApproximation, SignificanceResult, SignificanceTest,
    TwoProportionZTest,
};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::registry::VariantAggregate;

/// Tagged statistical result.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate<T> {
    /// Computed by the primary method.
    Exact(T),
    /// Produced by a fallback; `reason` says why.
    Degraded {
        /// Fallback value, same shape as an exact one.
        value: T,
        /// Why the primary method did not run.
        reason: String,
    },
}

impl<T> Estimate<T> {
    /// Wrap a fallback value.
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Borrow the value regardless of provenance.
    pub const fn value(&self) -> &T {
        match self {
            Self::Exact(value) | Self::Degraded { value, .. } => value,
        }
    }

    /// Take the value regardless of provenance.
    pub fn into_value(self) -> T {
        match self {
            Self::Exact(value) | Self::Degraded { value, .. } => value,
        }
    }

    /// Whether a fallback produced this value.
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// The degradation reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Exact(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Transform the value, keeping the tag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Estimate<U> {
        match self {
            Self::Exact(value) => Estimate::Exact(f(value)),
            Self::Degraded { value, reason } => Estimate::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}

/// Participants and conversions of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCounts {
    /// Exposed users.
    pub participants: u64,
    /// Conversion events.
    pub conversions: u64,
}

impl ArmCounts {
    /// Build counts.
    #[must_use]
    pub const fn new(participants: u64, conversions: u64) -> Self {
        Self {
            participants,
            conversions,
        }
    }

    /// Conversion rate in [0, 1]; 0 without participants.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(self) -> f64 {
        if self.participants == 0 {
            0.0
        } else {
            (self.conversions as f64 / self.participants as f64).min(1.0)
        }
    }
}

/// Repeat conversions are capped at one per participant.
impl From<&VariantAggregate> for ArmCounts {
    fn from(aggregate: &VariantAggregate) -> Self {
        Self::new(
            aggregate.participants,
            aggregate.conversions.min(aggregate.participants),
        )
    }
}

/// Relative change of `variant_rate` over `control_rate`, in percent.
///
/// Zero when the control rate is zero.
#[must_use]
pub fn lift_percentage(control_rate: f64, variant_rate: f64) -> f64 {
    if control_rate > 0.0 {
        (variant_rate - control_rate) / control_rate * 100.0
    } else {
        0.0
    }
}

/// Both verdicts for one variant against control.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmComparison {
    /// Frequentist verdict.
    pub significance: Estimate<SignificanceResult>,
    /// Bayesian verdict.
    pub bayesian: Estimate<BayesianSummary>,
}

/// Facade over the significance test, Bayesian analyzer and planner.
///
/// The significance strategy is chosen once, at construction.
#[derive(Debug)]
pub struct StatisticalEngine {
    test: Box<dyn SignificanceTest>,
    bayes: BayesianAnalyzer,
    planner: SampleSizePlanner,
}

impl StatisticalEngine {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            test: significance_test(config.significance_method, config.min_sample_size),
            bayes: BayesianAnalyzer::from_config(config),
            planner: SampleSizePlanner::new(config.min_sample_size),
        }
    }

    /// Name of the active significance test.
    #[must_use]
    pub fn test_name(&self) -> &'static str {
        self.test.name()
    }

    /// Frequentist verdict.
    #[must_use]
    pub fn significance(
        &self,
        control: ArmCounts,
        variant: ArmCounts,
        alpha: f64,
    ) -> Estimate<SignificanceResult> {
        self.test.evaluate(control, variant, alpha)
    }

    /// Bayesian verdict.
    #[must_use]
    pub fn bayesian(&self, control: ArmCounts, variant: ArmCounts) -> Estimate<BayesianSummary> {
        self.bayes.analyze(control, variant)
    }

    /// Both verdicts.
    #[must_use]
    pub fn compare(&self, control: ArmCounts, variant: ArmCounts, alpha: f64) -> ArmComparison {
        ArmComparison {
            significance: self.significance(control, variant, alpha),
            bayesian: self.bayesian(control, variant),
        }
    }

    /// Required participants per arm.
    #[must_use]
    pub fn plan_sample_size(
        &self,
        baseline_rate: f64,
        minimum_effect: f64,
        power: f64,
        alpha: f64,
    ) -> Estimate<u64> {
        self.planner.plan(baseline_rate, minimum_effect, power, alpha)
    }
}
