//! Assignment Record - a user's exposure to one variant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assignment Record binds a user to a variant of an experiment.
///
/// Unique per (`user_id`, `experiment_id`). Once persisted it is the
/// authoritative record of what the user was exposed to, even if the
/// experiment's allocation later changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    user_id: String,
    experiment_id: String,
    variant_name: String,
    segment: String,
    is_holdout: bool,
    assigned_at: DateTime<Utc>,
    config_version: u32,
}

impl Assignment {
    /// Create a new assignment in the default segment, stamped now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        experiment_id: impl Into<String>,
        variant_name: impl Into<String>,
    ) -> Self {
        Self::builder(user_id, experiment_id, variant_name).build()
    }

    /// Create a builder for constructing an assignment with optional fields.
    #[must_use]
    pub fn builder(
        user_id: impl Into<String>,
        experiment_id: impl Into<String>,
        variant_name: impl Into<String>,
    ) -> AssignmentBuilder {
        AssignmentBuilder::new(user_id, experiment_id, variant_name)
    }

    /// Get the user ID.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the assigned variant name.
    #[must_use]
    pub fn variant_name(&self) -> &str {
        &self.variant_name
    }

    /// Get the segment label.
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Whether the user is in the holdout group.
    #[must_use]
    pub const fn is_holdout(&self) -> bool {
        self.is_holdout
    }

    /// Get the assignment timestamp.
    #[must_use]
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    /// Get the experiment config version this assignment was computed under.
    #[must_use]
    pub const fn config_version(&self) -> u32 {
        self.config_version
    }
}

/// Builder for `Assignment`.
#[derive(Debug)]
pub struct AssignmentBuilder {
    user_id: String,
    experiment_id: String,
    variant_name: String,
    segment: String,
    is_holdout: bool,
    assigned_at: DateTime<Utc>,
    config_version: u32,
}

impl AssignmentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        experiment_id: impl Into<String>,
        variant_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            experiment_id: experiment_id.into(),
            variant_name: variant_name.into(),
            segment: "default".to_string(),
            is_holdout: false,
            assigned_at: Utc::now(),
            config_version: 1,
        }
    }

    /// Set the segment label.
    #[must_use]
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = segment.into();
        self
    }

    /// Mark the user as held out.
    #[must_use]
    pub const fn holdout(mut self, is_holdout: bool) -> Self {
        self.is_holdout = is_holdout;
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn assigned_at(mut self, assigned_at: DateTime<Utc>) -> Self {
        self.assigned_at = assigned_at;
        self
    }

    /// Record the config version used for the computation.
    #[must_use]
    pub const fn config_version(mut self, version: u32) -> Self {
        self.config_version = version;
        self
    }

    /// Build the `Assignment`.
    #[must_use]
    pub fn build(self) -> Assignment {
        Assignment {
            user_id: self.user_id,
            experiment_id: self.experiment_id,
            variant_name: self.variant_name,
            segment: self.segment,
            is_holdout: self.is_holdout,
            assigned_at: self.assigned_at,
            config_version: self.config_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_defaults() {
        let a = Assignment::new("user-1", "exp-1", "control");
        assert_eq!(a.segment(), "default");
        assert!(!a.is_holdout());
        assert_eq!(a.config_version(), 1);
    }

    #[test]
    fn test_assignment_builder() {
        let a = Assignment::builder("user-1", "exp-1", "variant_1")
            .segment("premium")
            .holdout(true)
            .config_version(3)
            .build();
        assert_eq!(a.segment(), "premium");
        assert!(a.is_holdout());
        assert_eq!(a.config_version(), 3);
    }
}
