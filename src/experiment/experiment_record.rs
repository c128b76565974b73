//! Experiment Record - root entity of an A/B test

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Allowed deviation of the allocation vector sum from 1.0.
pub const ALLOCATION_TOLERANCE: f64 = 1e-6;

/// Name that marks the baseline arm.
pub const CONTROL_VARIANT_NAME: &str = "control";

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    /// Defined but not yet serving traffic.
    Draft,
    /// Serving traffic; assignments allowed.
    Running,
    /// Paused or stopped early; may be resumed or completed.
    Stopped,
    /// Terminal.
    Completed,
}

impl ExperimentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Stopped | Self::Completed)
                | (Self::Stopped, Self::Running | Self::Completed)
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// One treatment option of an experiment.
///
/// The configuration payload is opaque to the engine (a price, a copy
/// variant, a layout id, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    name: String,
    config: serde_json::Value,
}

impl Variant {
    /// Create a variant with a configuration payload.
    #[must_use]
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Get the variant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration payload.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }
}

/// Experiment Record represents one A/B (or multivariate) test.
///
/// Variants and the traffic allocation vector are parallel: the i-th share
/// belongs to the i-th variant. Every allocation change bumps
/// `config_version` so assignments can be traced to the config they were
/// computed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    experiment_id: String,
    name: String,
    description: String,
    hypothesis: String,
    success_metric: String,
    variants: Vec<Variant>,
    traffic_allocation: Vec<f64>,
    target_sample_size: u64,
    minimum_detectable_effect: f64,
    statistical_power: f64,
    significance_level: f64,
    max_duration_days: u32,
    segment_filter: Vec<String>,
    holdout_fraction: f64,
    status: ExperimentStatus,
    created_by: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    config_version: u32,
}

impl Experiment {
    /// Create a builder with the required identity fields.
    #[must_use]
    pub fn builder(experiment_id: impl Into<String>, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(experiment_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the hypothesis under test.
    #[must_use]
    pub fn hypothesis(&self) -> &str {
        &self.hypothesis
    }

    /// Get the success metric name.
    #[must_use]
    pub fn success_metric(&self) -> &str {
        &self.success_metric
    }

    /// Get the variants in configuration order.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Get the traffic allocation vector (parallel to `variants`).
    #[must_use]
    pub fn traffic_allocation(&self) -> &[f64] {
        &self.traffic_allocation
    }

    /// Get the planned total sample size.
    #[must_use]
    pub const fn target_sample_size(&self) -> u64 {
        self.target_sample_size
    }

    /// Get the minimum detectable (relative) effect.
    #[must_use]
    pub const fn minimum_detectable_effect(&self) -> f64 {
        self.minimum_detectable_effect
    }

    /// Get the desired statistical power.
    #[must_use]
    pub const fn statistical_power(&self) -> f64 {
        self.statistical_power
    }

    /// Get the significance level (alpha).
    #[must_use]
    pub const fn significance_level(&self) -> f64 {
        self.significance_level
    }

    /// Get the maximum duration in days.
    #[must_use]
    pub const fn max_duration_days(&self) -> u32 {
        self.max_duration_days
    }

    /// Get the targeted segments. Empty means every segment is eligible.
    #[must_use]
    pub fn segment_filter(&self) -> &[String] {
        &self.segment_filter
    }

    /// Get the fraction of users held out of the test.
    #[must_use]
    pub const fn holdout_fraction(&self) -> f64 {
        self.holdout_fraction
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the creator.
    #[must_use]
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the start timestamp, if the experiment has run.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the experiment has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Get the configuration version (bumped on allocation changes).
    #[must_use]
    pub const fn config_version(&self) -> u32 {
        self.config_version
    }

    /// The baseline arm: the variant named "control", else the first one.
    ///
    /// # Panics
    ///
    /// Never for a validated experiment (variants are non-empty).
    #[must_use]
    pub fn control_variant(&self) -> &Variant {
        self.variants
            .iter()
            .find(|v| v.name == CONTROL_VARIANT_NAME)
            .unwrap_or(&self.variants[0])
    }

    /// Look up a variant by name.
    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Check whether a variant with this name exists.
    #[must_use]
    pub fn has_variant(&self, name: &str) -> bool {
        self.variant(name).is_some()
    }

    /// Traffic share of a variant.
    #[must_use]
    pub fn allocation_for(&self, name: &str) -> Option<f64> {
        self.variants
            .iter()
            .position(|v| v.name == name)
            .map(|i| self.traffic_allocation[i])
    }

    /// Whether a caller in `segment` may be enrolled.
    #[must_use]
    pub fn accepts_segment(&self, segment: &str) -> bool {
        self.segment_filter.is_empty() || self.segment_filter.iter().any(|s| s == segment)
    }

    /// Check every structural invariant of the definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.experiment_id.is_empty() {
            return Err(Error::Configuration("experiment_id must not be empty".to_string()));
        }
        if self.variants.is_empty() {
            return Err(Error::Configuration("at least one variant is required".to_string()));
        }

        let mut seen = HashSet::with_capacity(self.variants.len());
        for variant in &self.variants {
            if variant.name.is_empty() {
                return Err(Error::Configuration("variant name must not be empty".to_string()));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
        }

        validate_allocation(&self.traffic_allocation, self.variants.len())?;

        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(Error::Configuration(format!(
                "significance level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        if !(self.statistical_power > 0.0 && self.statistical_power < 1.0) {
            return Err(Error::Configuration(format!(
                "statistical power must be in (0, 1), got {}",
                self.statistical_power
            )));
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(Error::Configuration(format!(
                "holdout fraction must be in [0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if !(self.minimum_detectable_effect.is_finite() && self.minimum_detectable_effect > 0.0) {
            return Err(Error::Configuration(format!(
                "minimum detectable effect must be positive, got {}",
                self.minimum_detectable_effect
            )));
        }
        Ok(())
    }

    /// Move to `to`, stamping start/end times.
    pub(crate) fn transition(&mut self, to: ExperimentStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                experiment_id: self.experiment_id.clone(),
                from: self.status,
                to,
            });
        }
        let now = Utc::now();
        match to {
            ExperimentStatus::Running if self.started_at.is_none() => self.started_at = Some(now),
            ExperimentStatus::Completed => self.ended_at = Some(now),
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    /// Replace the allocation vector and bump the config version.
    pub(crate) fn reallocate(&mut self, allocation: Vec<f64>) -> Result<()> {
        validate_allocation(&allocation, self.variants.len())?;
        self.traffic_allocation = allocation;
        self.config_version += 1;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_started_at(&mut self, started_at: DateTime<Utc>) {
        self.started_at = Some(started_at);
    }
}

/// Validate an allocation vector against the number of variants.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the length differs, a share is
/// negative or non-finite, or the shares do not sum to 1.
pub fn validate_allocation(allocation: &[f64], variant_count: usize) -> Result<()> {
    if allocation.len() != variant_count {
        return Err(Error::Configuration(format!(
            "allocation has {} entries for {} variants",
            allocation.len(),
            variant_count
        )));
    }
    if let Some(bad) = allocation.iter().find(|a| !a.is_finite() || **a < 0.0) {
        return Err(Error::Configuration(format!(
            "allocation shares must be non-negative and finite, got {bad}"
        )));
    }
    let total: f64 = allocation.iter().sum();
    if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
        return Err(Error::Configuration(format!(
            "allocation must sum to 1.0, got {total}"
        )));
    }
    Ok(())
}

/// Builder for `Experiment`.
///
/// Defaults follow the usual pricing-test setup: power 0.8, alpha 0.05,
/// 30 days, 20% minimum detectable effect, an equal split when no
/// allocation is given.
#[derive(Debug)]
pub struct ExperimentBuilder {
    experiment_id: String,
    name: String,
    description: String,
    hypothesis: String,
    success_metric: String,
    variants: Vec<Variant>,
    traffic_allocation: Option<Vec<f64>>,
    target_sample_size: u64,
    minimum_detectable_effect: f64,
    statistical_power: f64,
    significance_level: f64,
    max_duration_days: u32,
    segment_filter: Vec<String>,
    holdout_fraction: f64,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            description: String::new(),
            hypothesis: String::new(),
            success_metric: "conversion_rate".to_string(),
            variants: Vec::new(),
            traffic_allocation: None,
            target_sample_size: 1000,
            minimum_detectable_effect: 0.2,
            statistical_power: 0.8,
            significance_level: 0.05,
            max_duration_days: 30,
            segment_filter: Vec::new(),
            holdout_fraction: 0.0,
            created_by: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the hypothesis.
    #[must_use]
    pub fn hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = hypothesis.into();
        self
    }

    /// Set the success metric name.
    #[must_use]
    pub fn success_metric(mut self, metric: impl Into<String>) -> Self {
        self.success_metric = metric.into();
        self
    }

    /// Append a variant.
    #[must_use]
    pub fn variant(mut self, name: impl Into<String>, config: serde_json::Value) -> Self {
        self.variants.push(Variant::new(name, config));
        self
    }

    /// Replace all variants.
    #[must_use]
    pub fn variants(mut self, variants: Vec<Variant>) -> Self {
        self.variants = variants;
        self
    }

    /// Set the traffic allocation vector.
    #[must_use]
    pub fn traffic_allocation(mut self, allocation: Vec<f64>) -> Self {
        self.traffic_allocation = Some(allocation);
        self
    }

    /// Set the planned total sample size.
    #[must_use]
    pub const fn target_sample_size(mut self, size: u64) -> Self {
        self.target_sample_size = size;
        self
    }

    /// Set the minimum detectable (relative) effect.
    #[must_use]
    pub const fn minimum_detectable_effect(mut self, effect: f64) -> Self {
        self.minimum_detectable_effect = effect;
        self
    }

    /// Set the desired statistical power.
    #[must_use]
    pub const fn statistical_power(mut self, power: f64) -> Self {
        self.statistical_power = power;
        self
    }

    /// Set the significance level.
    #[must_use]
    pub const fn significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    /// Set the maximum duration in days.
    #[must_use]
    pub const fn max_duration_days(mut self, days: u32) -> Self {
        self.max_duration_days = days;
        self
    }

    /// Restrict enrolment to these segments.
    #[must_use]
    pub fn segment_filter(mut self, segments: Vec<String>) -> Self {
        self.segment_filter = segments;
        self
    }

    /// Hold a fraction of users out of the test.
    #[must_use]
    pub const fn holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    /// Set the creator.
    #[must_use]
    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build and validate the `Experiment` in draft status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the definition is malformed.
    pub fn build(self) -> Result<Experiment> {
        let traffic_allocation = self.traffic_allocation.unwrap_or_else(|| {
            let n = self.variants.len().max(1);
            #[allow(clippy::cast_precision_loss)]
            let share = 1.0 / n as f64;
            vec![share; self.variants.len()]
        });

        let experiment = Experiment {
            experiment_id: self.experiment_id,
            name: self.name,
            description: self.description,
            hypothesis: self.hypothesis,
            success_metric: self.success_metric,
            variants: self.variants,
            traffic_allocation,
            target_sample_size: self.target_sample_size,
            minimum_detectable_effect: self.minimum_detectable_effect,
            statistical_power: self.statistical_power,
            significance_level: self.significance_level,
            max_duration_days: self.max_duration_days,
            segment_filter: self.segment_filter,
            holdout_fraction: self.holdout_fraction,
            status: ExperimentStatus::Draft,
            created_by: self.created_by,
            created_at: self.created_at,
            started_at: None,
            ended_at: None,
            config_version: 1,
        };
        experiment.validate()?;
        Ok(experiment)
    }
}
