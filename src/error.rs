//! Error types for Trueno-AB
//!
//! Data-integrity problems surface here. Numerical degradation does not:
//! it is absorbed into [`crate::stats::Estimate::Degraded`].

use thiserror::Error;

use crate::experiment::ExperimentStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-AB error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed experiment definition (allocation vector, variants, levels)
    #[error("Invalid experiment configuration: {0}\nFix the definition before creating the experiment.")]
    Configuration(String),

    /// An experiment with this id is already registered
    #[error("Experiment already exists: {experiment_id}")]
    DuplicateExperiment {
        /// Conflicting experiment id
        experiment_id: String,
    },

    /// No experiment with this id
    #[error("Experiment not found: {experiment_id}")]
    ExperimentNotFound {
        /// Requested experiment id
        experiment_id: String,
    },

    /// Assignment attempted while the experiment is not running
    #[error("Experiment {experiment_id} is not running (status: {status})")]
    ExperimentNotRunning {
        /// Experiment id
        experiment_id: String,
        /// Current lifecycle status
        status: ExperimentStatus,
    },

    /// The caller's segment is not targeted by the experiment
    #[error("Segment '{segment}' is excluded from experiment {experiment_id}")]
    SegmentExcluded {
        /// Experiment id
        experiment_id: String,
        /// Segment supplied by the caller
        segment: String,
    },

    /// Lifecycle transition not allowed
    #[error("Invalid status transition for {experiment_id}: {from} -> {to}")]
    InvalidTransition {
        /// Experiment id
        experiment_id: String,
        /// Current status
        from: ExperimentStatus,
        /// Requested status
        to: ExperimentStatus,
    },

    /// Event recorded for a user that was never assigned
    #[error("No assignment for user {user_id} in experiment {experiment_id}\nAssign the user before recording events.")]
    UnknownAssignment {
        /// User id
        user_id: String,
        /// Experiment id
        experiment_id: String,
    },

    /// Not enough arms with participants to compare
    #[error("Insufficient data for experiment {experiment_id}: {variants_with_data} variant(s) with participants, need at least 2")]
    InsufficientData {
        /// Experiment id
        experiment_id: String,
        /// Number of arms that have participants
        variants_with_data: usize,
    },

    /// Control arm has no participants, so there is no baseline
    #[error("Control variant '{control_variant}' of experiment {experiment_id} has no participants\nGive the control arm a positive traffic share before analyzing.")]
    ControlWithoutData {
        /// Experiment id
        experiment_id: String,
        /// Name of the control variant
        control_variant: String,
    },

    /// Numerical failure inside a statistical routine
    #[error("Computation error: {0}")]
    Computation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
