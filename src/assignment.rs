//! Assignment Engine
//!
//! Maps (`user_id`, `experiment_id`) to exactly one variant without
//! coordination between callers:
//!
//! 1. SHA-256 of `"{user_id}_{experiment_id}"`
//! 2. First 8 bytes (big-endian) mod 10,000, scaled to a bucket in [0, 1)
//! 3. Walk the variants accumulating the allocation vector; the first
//!    variant with a positive share whose cumulative share is ≥ the bucket
//!    wins (last positive-share variant as fallback)
//!
//! The choice is a pure function of the inputs and the current config.
//! Users that already hold an assignment keep it, so allocation changes
//! only affect new users.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::experiment::{Assignment, Experiment, ExperimentStatus, Variant};
use crate::registry::ExperimentRegistry;
use crate::{Error, Result};

/// Number of hash buckets.
pub const BUCKET_COUNT: u64 = 10_000;

/// Segment used when the caller supplies none.
pub const DEFAULT_SEGMENT: &str = "default";

#[allow(clippy::cast_precision_loss)]
fn unit_hash(key: &str) -> f64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % BUCKET_COUNT) as f64 / BUCKET_COUNT as f64
}

/// Stable bucket in [0, 1) for a user in an experiment.
#[must_use]
pub fn bucket(user_id: &str, experiment_id: &str) -> f64 {
    unit_hash(&format!("{user_id}_{experiment_id}"))
}

/// Independent bucket used for the holdout draw.
#[must_use]
pub fn holdout_bucket(user_id: &str, experiment_id: &str) -> f64 {
    unit_hash(&format!("{user_id}_{experiment_id}_holdout"))
}

/// Variant owning `bucket` under the experiment's allocation.
///
/// Zero-share variants are never returned.
///
/// # Panics
///
/// Never for a validated experiment (variants are non-empty).
#[must_use]
pub fn select_variant(experiment: &Experiment, bucket: f64) -> &Variant {
    let arms = || {
        experiment
            .variants()
            .iter()
            .zip(experiment.traffic_allocation())
    };

    let mut cumulative = 0.0;
    for (variant, &share) in arms() {
        cumulative += share;
        if share > 0.0 && bucket <= cumulative {
            return variant;
        }
    }
    arms()
        .rev()
        .find(|(_, share)| **share > 0.0)
        .map_or(&experiment.variants()[experiment.variants().len() - 1], |(v, _)| v)
}

/// Deterministic, registry-backed assignment.
#[derive(Debug)]
pub struct AssignmentEngine<R: ExperimentRegistry> {
    registry: Arc<R>,
}

impl<R: ExperimentRegistry> Clone for AssignmentEngine<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: ExperimentRegistry> AssignmentEngine<R> {
    /// Create an engine over a shared registry.
    #[must_use]
    pub const fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Assign a user and return the variant they are exposed to.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `ExperimentNotRunning`, or `SegmentExcluded`.
    pub fn assign(
        &self,
        user_id: &str,
        experiment_id: &str,
        segment: Option<&str>,
    ) -> Result<Variant> {
        self.assign_with_record(user_id, experiment_id, segment)
            .map(|(_, variant)| variant)
    }

    /// Assign a user and return the authoritative assignment with its variant.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `ExperimentNotRunning`, or `SegmentExcluded`.
    pub fn assign_with_record(
        &self,
        user_id: &str,
        experiment_id: &str,
        segment: Option<&str>,
    ) -> Result<(Assignment, Variant)> {
        let experiment = self.registry.get(experiment_id)?;
        if experiment.status() != ExperimentStatus::Running {
            return Err(Error::ExperimentNotRunning {
                experiment_id: experiment_id.to_string(),
                status: experiment.status(),
            });
        }

        if let Some(existing) = self.registry.find_assignment(user_id, experiment_id) {
            let variant = Self::resolve(&experiment, &existing)?;
            return Ok((existing, variant));
        }

        let segment = segment.unwrap_or(DEFAULT_SEGMENT);
        if !experiment.accepts_segment(segment) {
            return Err(Error::SegmentExcluded {
                experiment_id: experiment_id.to_string(),
                segment: segment.to_string(),
            });
        }

        let is_holdout = experiment.holdout_fraction() > 0.0
            && holdout_bucket(user_id, experiment_id) < experiment.holdout_fraction();
        let variant = if is_holdout {
            experiment.control_variant()
        } else {
            select_variant(&experiment, bucket(user_id, experiment_id))
        };

        let candidate = Assignment::builder(user_id, experiment_id, variant.name())
            .segment(segment)
            .holdout(is_holdout)
            .config_version(experiment.config_version())
            .build();
        let stored = self.registry.record_assignment(candidate)?;
        let variant = Self::resolve(&experiment, &stored)?;

        debug!(
            user_id,
            experiment_id,
            variant = variant.name(),
            is_holdout,
            "User assigned"
        );
        Ok((stored, variant))
    }

    fn resolve(experiment: &Experiment, assignment: &Assignment) -> Result<Variant> {
        experiment
            .variant(assignment.variant_name())
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "stored variant '{}' missing from experiment {}",
                    assignment.variant_name(),
                    experiment.experiment_id()
                ))
            })
    }
}
