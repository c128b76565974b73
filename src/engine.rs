//! Experimentation engine facade.
//!
//! One entry point wiring the registry, assignment, statistics and decision
//! components together. Every call reads through the registry; there is no
//! separate in-process copy of experiment state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::analysis::{AnalysisOutcome, Analyzer, ExperimentAnalysis};
use crate::assignment::AssignmentEngine;
use crate::config::EngineConfig;
use crate::decision::{Action, DecisionReport};
use crate::experiment::{
    Assignment, Event, EventInput, Experiment, ExperimentStatus, Variant, CONTROL_VARIANT_NAME,
};
use crate::registry::{ExperimentRegistry, MemoryRegistry};
use crate::stats::Estimate;
use crate::{Error, Result};

/// Baseline conversion rate assumed when sizing pricing experiments.
const PRICING_BASELINE_RATE: f64 = 0.05;

/// Relative effect pricing experiments are sized to detect.
const PRICING_MIN_EFFECT: f64 = 0.2;

const SYSTEM_AUTHOR: &str = "trueno-ab";

/// A/B experimentation engine.
#[derive(Debug)]
pub struct ExperimentEngine<R: ExperimentRegistry = MemoryRegistry> {
    registry: Arc<R>,
    config: EngineConfig,
    assigner: AssignmentEngine<R>,
    analyzer: Analyzer<R>,
}

impl ExperimentEngine<MemoryRegistry> {
    /// Engine over a fresh in-memory registry.
    #[must_use]
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryRegistry::new()), config)
    }
}

impl<R: ExperimentRegistry> ExperimentEngine<R> {
    /// Engine over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<R>, config: EngineConfig) -> Self {
        Self {
            assigner: AssignmentEngine::new(Arc::clone(&registry)),
            analyzer: Analyzer::new(Arc::clone(&registry), &config),
            registry,
            config,
        }
    }

    /// Underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register a new experiment in draft state.
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid definition, `DuplicateExperiment` if
    /// the id is taken.
    pub fn create_experiment(&self, experiment: Experiment) -> Result<()> {
        self.registry.create(experiment)
    }

    /// Look up an experiment.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`.
    pub fn experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.registry.get(experiment_id)
    }

    /// Draft or stopped → running.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` or `InvalidTransition`.
    pub fn start(&self, experiment_id: &str) -> Result<Experiment> {
        self.registry
            .update_status(experiment_id, ExperimentStatus::Running)
    }

    /// Running → stopped.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` or `InvalidTransition`.
    pub fn stop(&self, experiment_id: &str) -> Result<Experiment> {
        self.registry
            .update_status(experiment_id, ExperimentStatus::Stopped)
    }

    /// Running or stopped → completed.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` or `InvalidTransition`.
    pub fn complete(&self, experiment_id: &str) -> Result<Experiment> {
        self.registry
            .update_status(experiment_id, ExperimentStatus::Completed)
    }

    // ------------------------------------------------------------------
    // Assignment and tracking
    // ------------------------------------------------------------------

    /// Variant served to `user_id`.
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
        self.assigner.assign(user_id, experiment_id, segment)
    }

    /// Variant served to `user_id`, with the stored assignment.
    ///
    /// # Errors
    ///
    /// Same as [`ExperimentEngine::assign`].
    pub fn assign_with_record(
        &self,
        user_id: &str,
        experiment_id: &str,
        segment: Option<&str>,
    ) -> Result<(Assignment, Variant)> {
        self.assigner
            .assign_with_record(user_id, experiment_id, segment)
    }

    /// Record an event under the configured unknown-assignment policy.
    ///
    /// Returns `None` when the event was dropped by the `ignore` policy.
    ///
    /// # Errors
    ///
    /// `UnknownAssignment` under the `reject` policy.
    pub fn track_event(&self, event: EventInput) -> Result<Option<Event>> {
        self.registry
            .record_event(event, self.config.unknown_assignment)
    }

    /// Record a conversion worth `value`.
    ///
    /// # Errors
    ///
    /// Same as [`ExperimentEngine::track_event`].
    pub fn track_conversion(
        &self,
        user_id: &str,
        experiment_id: &str,
        value: f64,
    ) -> Result<Option<Event>> {
        self.track_event(EventInput::conversion(user_id, experiment_id, value))
    }

    // ------------------------------------------------------------------
    // Analysis and decisions
    // ------------------------------------------------------------------

    /// Analysis object, or `{"error": ...}` when none can be produced.
    #[must_use]
    pub fn analyze(&self, experiment_id: &str) -> AnalysisOutcome {
        self.analyzer.analyze(experiment_id)
    }

    /// Analysis, surfacing the failure as an error.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `InsufficientData` or `ControlWithoutData`.
    pub fn try_analyze(&self, experiment_id: &str) -> Result<ExperimentAnalysis> {
        self.analyzer.try_analyze(experiment_id)
    }

    /// Analyze several experiments.
    #[must_use]
    pub fn analyze_many(&self, experiment_ids: &[&str]) -> Vec<AnalysisOutcome> {
        self.analyzer.analyze_many(experiment_ids)
    }

    /// Decision report for one experiment.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `InsufficientData` or `ControlWithoutData`.
    pub fn optimize(&self, experiment_id: &str) -> Result<DecisionReport> {
        self.analyzer
            .evaluate(experiment_id)
            .map(|(_, report)| report)
    }

    /// Apply decision actions to the registry.
    ///
    /// `stop_experiment` stops a running experiment, `reallocate_traffic`
    /// installs the proposed allocation, `extend_duration` is advisory.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `InvalidTransition`, or `Configuration` when a
    /// proposed allocation does not match the experiment's variants.
    pub fn apply_actions(&self, experiment_id: &str, actions: &[Action]) -> Result<Experiment> {
        for action in actions {
            match action {
                Action::StopExperiment { variant, .. } => {
                    if self.registry.get(experiment_id)?.status() == ExperimentStatus::Running {
                        self.stop(experiment_id)?;
                        info!(experiment_id, variant, "Experiment stopped by decision");
                    }
                }
                Action::ReallocateTraffic { new_allocation, .. } => {
                    let experiment = self.registry.get(experiment_id)?;
                    let vector = experiment
                        .variants()
                        .iter()
                        .map(|v| {
                            new_allocation.get(v.name()).copied().ok_or_else(|| {
                                Error::Configuration(format!(
                                    "proposed allocation has no share for variant '{}'",
                                    v.name()
                                ))
                            })
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    self.registry.update_allocation(experiment_id, vector)?;
                }
                Action::ExtendDuration {
                    recommended_extension_days,
                    ..
                } => {
                    info!(
                        experiment_id,
                        days = recommended_extension_days,
                        "Extension recommended; no registry change"
                    );
                }
            }
        }
        self.registry.get(experiment_id)
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
        self.analyzer
            .stats()
            .plan_sample_size(baseline_rate, minimum_effect, power, alpha)
    }

    // ------------------------------------------------------------------
    // Creation helpers
    // ------------------------------------------------------------------

    /// Create a price test: `control` at `baseline_price` plus one
    /// `variant_N` per test price, split equally.
    ///
    /// The target size is the larger of `target_users` and the planned
    /// per-arm size times the number of arms. Returns the new experiment id.
    ///
    /// # Errors
    ///
    /// `Configuration` for a non-positive baseline price or no test prices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn create_pricing_experiment(
        &self,
        name: &str,
        baseline_price: f64,
        test_prices: &[f64],
        target_users: u64,
    ) -> Result<String> {
        if !(baseline_price.is_finite() && baseline_price > 0.0) {
            return Err(Error::Configuration(format!(
                "baseline price must be positive, got {baseline_price}"
            )));
        }
        if test_prices.is_empty() {
            return Err(Error::Configuration(
                "pricing experiment needs at least one test price".to_string(),
            ));
        }

        let mut variants = vec![Variant::new(
            CONTROL_VARIANT_NAME,
            json!({ "price": baseline_price, "price_modifier": 1.0 }),
        )];
        for (i, price) in test_prices.iter().enumerate() {
            variants.push(Variant::new(
                format!("variant_{}", i + 1),
                json!({ "price": price, "price_modifier": price / baseline_price }),
            ));
        }

        let per_arm = self
            .plan_sample_size(PRICING_BASELINE_RATE, PRICING_MIN_EFFECT, 0.8, 0.05)
            .into_value();
        let target = target_users.max(per_arm.saturating_mul(variants.len() as u64));

        let experiment_id = Uuid::new_v4().to_string();
        let experiment = Experiment::builder(experiment_id.as_str(), name)
            .description(format!("Pricing test: {baseline_price} vs {test_prices:?}"))
            .hypothesis("Pricing changes will improve revenue per user")
            .success_metric("revenue_per_user")
            .variants(variants)
            .target_sample_size(target)
            .minimum_detectable_effect(PRICING_MIN_EFFECT)
            .created_by(SYSTEM_AUTHOR)
            .build()?;
        self.registry.create(experiment)?;

        info!(experiment_id = %experiment_id, name, target, "Pricing experiment created");
        Ok(experiment_id)
    }

    /// Create one experiment per segment, each restricted to that segment.
    ///
    /// Ids are `{base}_{segment}`; segments without variants are skipped.
    /// Returns the created ids.
    ///
    /// # Errors
    ///
    /// `Configuration` if no segment has variants or a definition is invalid.
    pub fn create_segmented_experiment(
        &self,
        name: &str,
        variants_per_segment: &BTreeMap<String, Vec<Variant>>,
    ) -> Result<Vec<String>> {
        let base = Uuid::new_v4();
        let mut created = Vec::new();

        for (segment, variants) in variants_per_segment {
            if variants.is_empty() {
                continue;
            }
            let experiment =
                Experiment::builder(format!("{base}_{segment}"), format!("{name} - {segment}"))
                    .description(format!("Segmented experiment for {segment} users"))
                    .hypothesis(format!(
                        "Different variants will perform better for the {segment} segment"
                    ))
                    .variants(variants.clone())
                    .segment_filter(vec![segment.clone()])
                    .created_by(SYSTEM_AUTHOR)
                    .build()?;
            created.push(experiment.experiment_id().to_string());
            self.registry.create(experiment)?;
        }

        if created.is_empty() {
            return Err(Error::Configuration(
                "segmented experiment needs variants for at least one segment".to_string(),
            ));
        }
        info!(name, segments = created.len(), "Segmented experiment created");
        Ok(created)
    }
}
