//! Experiment Registry
//!
//! Durable, queryable storage for experiment definitions, per-user
//! assignments and raw events, plus per-variant aggregation.
//!
//! - Assignments are upserted atomically per (`user_id`, `experiment_id`)
//! - Events are append-only and require a prior assignment
//! - Aggregates are always recomputed from raw rows
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trueno_ab::config::UnknownAssignmentPolicy;
//! use trueno_ab::experiment::{Assignment, EventInput, Experiment};
//! use trueno_ab::registry::{ExperimentRegistry, MemoryRegistry};
//!
//! let registry = MemoryRegistry::new();
//! registry.create(
//!     Experiment::builder("exp-1", "Banner")
//!         .variant("control", json!({}))
//!         .variant("variant_1", json!({}))
//!         .build()?,
//! )?;
//!
//! registry.record_assignment(Assignment::new("u1", "exp-1", "variant_1"))?;
//! registry.record_event(EventInput::conversion("u1", "exp-1", 10.0), UnknownAssignmentPolicy::Reject)?;
//!
//! let aggregates = registry.aggregate("exp-1")?;
//! assert_eq!(aggregates[1].participants, 1);
//! assert_eq!(aggregates[1].conversions, 1);
//! # Ok::<(), trueno_ab::Error>(())
//! ```

mod cache;
mod memory;

pub use cache::{CachedResult, ResultKey, ResultsCache};
pub use memory::{MemoryRegistry, RegistrySnapshot};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UnknownAssignmentPolicy;
use crate::experiment::{Assignment, Event, EventInput, Experiment, ExperimentStatus};
use crate::stats::ArmCounts;
use crate::Result;

/// Raw per-variant counts for one experiment.
///
/// `conversions` counts conversion events, so a user who converts twice
/// counts twice and `conversions` may exceed `participants`. Revenue keeps
/// every event; [`VariantAggregate::conversion_rate`] is capped at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAggregate {
    /// Variant name.
    pub variant_name: String,
    /// Distinct assigned users, holdout excluded.
    pub participants: u64,
    /// Number of conversion events.
    pub conversions: u64,
    /// Summed value of conversion events.
    pub revenue: f64,
}

impl VariantAggregate {
    /// Empty tally for a variant.
    #[must_use]
    pub fn empty(variant_name: impl Into<String>) -> Self {
        Self {
            variant_name: variant_name.into(),
            participants: 0,
            conversions: 0,
            revenue: 0.0,
        }
    }

    /// Conversions per participant in [0, 1] (0 without participants).
    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        ArmCounts::from(self).rate()
    }

    /// Revenue per participant (0 without participants).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn revenue_per_user(&self) -> f64 {
        if self.participants == 0 {
            0.0
        } else {
            self.revenue / self.participants as f64
        }
    }

    /// Revenue per conversion (0 without conversions).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_order_value(&self) -> f64 {
        if self.conversions == 0 {
            0.0
        } else {
            self.revenue / self.conversions as f64
        }
    }
}

/// Storage contract for the experimentation engine.
///
/// Implementations must be safe to share between concurrent callers.
pub trait ExperimentRegistry: Send + Sync {
    /// Register a new experiment in draft status.
    ///
    /// # Errors
    ///
    /// `DuplicateExperiment` if the id exists, `Configuration` if invalid.
    fn create(&self, experiment: Experiment) -> Result<()>;

    /// Fetch an experiment by id.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` if absent.
    fn get(&self, experiment_id: &str) -> Result<Experiment>;

    /// All experiments, ordered by id.
    fn list(&self) -> Vec<Experiment>;

    /// Apply a lifecycle transition.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` or `InvalidTransition`.
    fn update_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<Experiment>;

    /// Replace the allocation vector, bumping the config version.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` or `Configuration`.
    fn update_allocation(&self, experiment_id: &str, allocation: Vec<f64>) -> Result<Experiment>;

    /// Upsert an assignment and return the authoritative row.
    ///
    /// A different variant for an existing pair is logged and discarded.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, or `Configuration` for an unknown variant.
    fn record_assignment(&self, assignment: Assignment) -> Result<Assignment>;

    /// Look up a user's assignment.
    fn find_assignment(&self, user_id: &str, experiment_id: &str) -> Option<Assignment>;

    /// All assignments of an experiment.
    fn assignments(&self, experiment_id: &str) -> Vec<Assignment>;

    /// Append an event for an assigned user.
    ///
    /// Returns `None` when the event was ignored under
    /// [`UnknownAssignmentPolicy::Ignore`].
    ///
    /// # Errors
    ///
    /// `UnknownAssignment` under [`UnknownAssignmentPolicy::Reject`].
    fn record_event(
        &self,
        event: EventInput,
        policy: UnknownAssignmentPolicy,
    ) -> Result<Option<Event>>;

    /// All events of an experiment, in append order.
    fn events(&self, experiment_id: &str) -> Vec<Event>;

    /// Cache a derived metric for an experiment variant.
    fn store_result(&self, key: ResultKey, value: f64, config_version: u32);

    /// Read a cached metric.
    fn cached_result(&self, key: &ResultKey) -> Option<CachedResult>;

    /// Per-variant counts in configuration order, computed from raw rows.
    ///
    /// Holdout users count neither as participants nor as converters.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound` if absent.
    fn aggregate(&self, experiment_id: &str) -> Result<Vec<VariantAggregate>> {
        let experiment = self.get(experiment_id)?;
        let assignments = self.assignments(experiment_id);
        let events = self.events(experiment_id);

        let mut tallies: Vec<VariantAggregate> = experiment
            .variants()
            .iter()
            .map(|v| VariantAggregate::empty(v.name()))
            .collect();
        let index: FxHashMap<&str, usize> = experiment
            .variants()
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name(), i))
            .collect();

        let mut holdout: FxHashSet<&str> = FxHashSet::default();
        for assignment in &assignments {
            if assignment.is_holdout() {
                holdout.insert(assignment.user_id());
                continue;
            }
            if let Some(&i) = index.get(assignment.variant_name()) {
                tallies[i].participants += 1;
            }
        }

        for event in events.iter().filter(|e| e.event_type().is_conversion()) {
            if holdout.contains(event.user_id()) {
                continue;
            }
            match index.get(event.variant_name()) {
                Some(&i) => {
                    tallies[i].conversions += 1;
                    tallies[i].revenue += event.value();
                }
                None => debug!(
                    experiment_id,
                    variant = event.variant_name(),
                    "Skipping event for unknown variant"
                ),
            }
        }

        Ok(tallies)
    }
}
