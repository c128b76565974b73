//! Engine configuration
//!
//! All knobs have defaults matching the usual two-arm pricing test. A config
//! can be built in code or loaded from JSON:
//!
//! ```rust
//! use trueno_ab::config::{EngineConfig, UnknownAssignmentPolicy};
//!
//! let config = EngineConfig::from_json_str(r#"{"min_sample_size": 250, "bayes_seed": 7}"#)?;
//! assert_eq!(config.min_sample_size, 250);
//! assert_eq!(config.unknown_assignment, UnknownAssignmentPolicy::Reject);
//! # Ok::<(), trueno_ab::Error>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// What to do with an event whose user was never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAssignmentPolicy {
    /// Fail with [`crate::Error::UnknownAssignment`].
    Reject,
    /// Drop the event and log a warning.
    Ignore,
}

/// Frequentist significance test used by the statistical engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMethod {
    /// Two-proportion z-test with a normal-CDF p-value.
    TwoProportionZ,
    /// Pooled-proportion approximation with a fixed |z| > 1.96 rule.
    PooledApproximation,
}

/// Configuration of the experimentation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum participants per arm before significance may be declared.
    pub min_sample_size: u64,
    /// Significance test strategy.
    pub significance_method: SignificanceMethod,
    /// Monte Carlo draws per posterior.
    pub monte_carlo_samples: usize,
    /// Fixed RNG seed for reproducible Bayesian analysis.
    pub bayes_seed: Option<u64>,
    /// Stop early when P(variant better) exceeds this.
    pub early_stop_upper: f64,
    /// Stop early when P(variant better) falls below this.
    pub early_stop_lower: f64,
    /// Minimum confidence level for a `stop_experiment` action.
    pub stop_confidence: f64,
    /// Policy for events without an assignment.
    pub unknown_assignment: UnknownAssignmentPolicy,
    /// Fraction of the control share moved to a winning variant.
    pub reallocation_fraction: f64,
    /// Extension proposed when the enrolment rate is unknown.
    pub default_extension_days: u32,
    /// Smallest arm size below which analysis recommends a larger sample.
    pub recommendation_sample_floor: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 100,
            significance_method: SignificanceMethod::TwoProportionZ,
            monte_carlo_samples: 10_000,
            bayes_seed: None,
            early_stop_upper: 0.95,
            early_stop_lower: 0.05,
            stop_confidence: 0.95,
            unknown_assignment: UnknownAssignmentPolicy::Reject,
            reallocation_fraction: 0.5,
            default_extension_days: 14,
            recommendation_sample_floor: 1000,
        }
    }
}

impl EngineConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] on malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Builder for `EngineConfig`.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the minimum per-arm sample size.
    #[must_use]
    pub const fn min_sample_size(mut self, size: u64) -> Self {
        self.config.min_sample_size = size;
        self
    }

    /// Select the significance test.
    #[must_use]
    pub const fn significance_method(mut self, method: SignificanceMethod) -> Self {
        self.config.significance_method = method;
        self
    }

    /// Set the number of Monte Carlo draws.
    #[must_use]
    pub const fn monte_carlo_samples(mut self, samples: usize) -> Self {
        self.config.monte_carlo_samples = samples;
        self
    }

    /// Seed the Bayesian sampler.
    #[must_use]
    pub const fn bayes_seed(mut self, seed: u64) -> Self {
        self.config.bayes_seed = Some(seed);
        self
    }

    /// Set the early-stopping probability bounds.
    #[must_use]
    pub const fn early_stop_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.config.early_stop_lower = lower;
        self.config.early_stop_upper = upper;
        self
    }

    /// Set the confidence required for a stop action.
    #[must_use]
    pub const fn stop_confidence(mut self, confidence: f64) -> Self {
        self.config.stop_confidence = confidence;
        self
    }

    /// Set the unknown-assignment policy.
    #[must_use]
    pub const fn unknown_assignment(mut self, policy: UnknownAssignmentPolicy) -> Self {
        self.config.unknown_assignment = policy;
        self
    }

    /// Set the share of control traffic moved to a winner.
    #[must_use]
    pub const fn reallocation_fraction(mut self, fraction: f64) -> Self {
        self.config.reallocation_fraction = fraction;
        self
    }

    /// Set the fallback extension length.
    #[must_use]
    pub const fn default_extension_days(mut self, days: u32) -> Self {
        self.config.default_extension_days = days;
        self
    }

    /// Set the arm size below which a larger sample is recommended.
    #[must_use]
    pub const fn recommendation_sample_floor(mut self, floor: u64) -> Self {
        self.config.recommendation_sample_floor = floor;
        self
    }

    /// Build the `EngineConfig`.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
