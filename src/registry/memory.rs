//! In-memory registry using `DashMap`, with JSON snapshots for durability.

use std::fs;
use std::path::Path;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CachedResult, ExperimentRegistry, ResultKey, ResultsCache};
use crate::config::UnknownAssignmentPolicy;
use crate::experiment::{Assignment, Event, EventInput, Experiment, ExperimentStatus};
use crate::{Error, Result};

/// (`experiment_id`, `user_id`)
type AssignmentKey = (String, String);

/// Serializable image of a registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Experiment definitions, ordered by id.
    pub experiments: Vec<Experiment>,
    /// Assignments, ordered by (experiment, user).
    pub assignments: Vec<Assignment>,
    /// Events, grouped by experiment in append order.
    pub events: Vec<Event>,
}

/// In-memory experiment registry.
///
/// Thread-safe; assignment upserts go through a `DashMap` entry so two
/// concurrent callers for the same user never produce two rows.
///
/// # Example
///
/// ```rust
/// use trueno_ab::registry::{ExperimentRegistry, MemoryRegistry};
///
/// let registry = MemoryRegistry::new();
/// assert!(registry.is_empty());
/// assert!(registry.get("missing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    experiments: DashMap<String, Experiment>,
    assignments: DashMap<AssignmentKey, Assignment>,
    events: DashMap<String, Vec<Event>>,
    cache: ResultsCache,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the registry holds no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Number of stored assignments across all experiments.
    #[must_use]
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Number of stored events across all experiments.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.iter().map(|entry| entry.value().len()).sum()
    }

    /// Access the results cache.
    #[must_use]
    pub const fn results_cache(&self) -> &ResultsCache {
        &self.cache
    }

    /// Copy the current state into a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut experiments: Vec<Experiment> =
            self.experiments.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by(|a, b| a.experiment_id().cmp(b.experiment_id()));

        let mut assignments: Vec<Assignment> =
            self.assignments.iter().map(|a| a.value().clone()).collect();
        assignments.sort_by(|a, b| {
            (a.experiment_id(), a.user_id()).cmp(&(b.experiment_id(), b.user_id()))
        });

        let mut experiment_ids: Vec<String> = self.events.iter().map(|e| e.key().clone()).collect();
        experiment_ids.sort();
        let events = experiment_ids
            .iter()
            .flat_map(|id| self.events(id))
            .collect();

        RegistrySnapshot {
            experiments,
            assignments,
            events,
        }
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a stored experiment no longer validates.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self> {
        let registry = Self::new();
        for experiment in snapshot.experiments {
            experiment.validate()?;
            registry
                .experiments
                .insert(experiment.experiment_id().to_string(), experiment);
        }
        for assignment in snapshot.assignments {
            let key = (
                assignment.experiment_id().to_string(),
                assignment.user_id().to_string(),
            );
            registry.assignments.insert(key, assignment);
        }
        for event in snapshot.events {
            registry
                .events
                .entry(event.experiment_id().to_string())
                .or_default()
                .push(event);
        }
        Ok(registry)
    }

    /// Write a JSON snapshot to `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path.as_ref(), json)?;
        info!(
            path = %path.as_ref().display(),
            experiments = snapshot.experiments.len(),
            assignments = snapshot.assignments.len(),
            events = snapshot.events.len(),
            "Registry snapshot saved"
        );
        Ok(())
    }

    /// Load a registry from a JSON snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO, serialization or configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&raw)?;
        Self::from_snapshot(snapshot)
    }

    fn not_found(experiment_id: &str) -> Error {
        Error::ExperimentNotFound {
            experiment_id: experiment_id.to_string(),
        }
    }
}

impl ExperimentRegistry for MemoryRegistry {
    fn create(&self, experiment: Experiment) -> Result<()> {
        experiment.validate()?;
        match self.experiments.entry(experiment.experiment_id().to_string()) {
            Entry::Occupied(existing) => Err(Error::DuplicateExperiment {
                experiment_id: existing.key().clone(),
            }),
            Entry::Vacant(slot) => {
                info!(
                    experiment_id = experiment.experiment_id(),
                    name = experiment.name(),
                    variants = experiment.variants().len(),
                    "Experiment created"
                );
                slot.insert(experiment);
                Ok(())
            }
        }
    }

    fn get(&self, experiment_id: &str) -> Result<Experiment> {
        self.experiments
            .get(experiment_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Self::not_found(experiment_id))
    }

    fn list(&self) -> Vec<Experiment> {
        let mut experiments: Vec<Experiment> =
            self.experiments.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by(|a, b| a.experiment_id().cmp(b.experiment_id()));
        experiments
    }

    fn update_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<Experiment> {
        let updated = {
            let mut experiment = self
                .experiments
                .get_mut(experiment_id)
                .ok_or_else(|| Self::not_found(experiment_id))?;
            let from = experiment.status();
            experiment.transition(status)?;
            info!(experiment_id, %from, to = %status, "Experiment status changed");
            experiment.clone()
        };
        self.cache.invalidate(experiment_id);
        Ok(updated)
    }

    fn update_allocation(&self, experiment_id: &str, allocation: Vec<f64>) -> Result<Experiment> {
        let updated = {
            let mut experiment = self
                .experiments
                .get_mut(experiment_id)
                .ok_or_else(|| Self::not_found(experiment_id))?;
            experiment.reallocate(allocation)?;
            info!(
                experiment_id,
                config_version = experiment.config_version(),
                allocation = ?experiment.traffic_allocation(),
                "Traffic allocation updated; existing assignments keep their variant"
            );
            experiment.clone()
        };
        self.cache.invalidate(experiment_id);
        Ok(updated)
    }

    fn record_assignment(&self, assignment: Assignment) -> Result<Assignment> {
        {
            let experiment = self
                .experiments
                .get(assignment.experiment_id())
                .ok_or_else(|| Self::not_found(assignment.experiment_id()))?;
            if !experiment.has_variant(assignment.variant_name()) {
                return Err(Error::Configuration(format!(
                    "unknown variant '{}' for experiment {}",
                    assignment.variant_name(),
                    assignment.experiment_id()
                )));
            }
        }

        let key = (
            assignment.experiment_id().to_string(),
            assignment.user_id().to_string(),
        );
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => {
                let current = existing.get();
                if current.variant_name() != assignment.variant_name() {
                    warn!(
                        user_id = assignment.user_id(),
                        experiment_id = assignment.experiment_id(),
                        stored = current.variant_name(),
                        stored_version = current.config_version(),
                        rejected = assignment.variant_name(),
                        rejected_version = assignment.config_version(),
                        "Conflicting assignment ignored; stored variant stays authoritative"
                    );
                }
                Ok(current.clone())
            }
            Entry::Vacant(slot) => {
                debug!(
                    user_id = assignment.user_id(),
                    experiment_id = assignment.experiment_id(),
                    variant = assignment.variant_name(),
                    holdout = assignment.is_holdout(),
                    "Assignment recorded"
                );
                slot.insert(assignment.clone());
                Ok(assignment)
            }
        }
    }

    fn find_assignment(&self, user_id: &str, experiment_id: &str) -> Option<Assignment> {
        self.assignments
            .get(&(experiment_id.to_string(), user_id.to_string()))
            .map(|a| a.value().clone())
    }

    fn assignments(&self, experiment_id: &str) -> Vec<Assignment> {
        self.assignments
            .iter()
            .filter(|entry| entry.key().0 == experiment_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn record_event(
        &self,
        event: EventInput,
        policy: UnknownAssignmentPolicy,
    ) -> Result<Option<Event>> {
        let Some(assignment) = self.find_assignment(event.user_id(), event.experiment_id()) else {
            return match policy {
                UnknownAssignmentPolicy::Reject => Err(Error::UnknownAssignment {
                    user_id: event.user_id().to_string(),
                    experiment_id: event.experiment_id().to_string(),
                }),
                UnknownAssignmentPolicy::Ignore => {
                    warn!(
                        user_id = event.user_id(),
                        experiment_id = event.experiment_id(),
                        "Event without assignment ignored"
                    );
                    Ok(None)
                }
            };
        };

        let event = event.into_event(assignment.variant_name());
        self.events
            .entry(event.experiment_id().to_string())
            .or_default()
            .push(event.clone());
        Ok(Some(event))
    }

    fn events(&self, experiment_id: &str) -> Vec<Event> {
        self.events
            .get(experiment_id)
            .map(|events| events.value().clone())
            .unwrap_or_default()
    }

    fn store_result(&self, key: ResultKey, value: f64, config_version: u32) {
        self.cache.put(key, value, config_version);
    }

    fn cached_result(&self, key: &ResultKey) -> Option<CachedResult> {
        self.cache.get(key)
    }
}
