//! Experiment Schema
//!
//! Records persisted by the [`crate::registry`].
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variant (N, ordered, parallel to allocation vector)
//!      │
//!      └──< Assignment (N) [unique per user_id + experiment_id]
//!                │
//!                └──< Event (N) [append-only]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use trueno_ab::experiment::{Assignment, EventInput, Experiment};
//!
//! let experiment = Experiment::builder("exp-001", "Checkout copy")
//!     .variant("control", json!({"copy": "Buy now"}))
//!     .variant("variant_1", json!({"copy": "Get yours"}))
//!     .traffic_allocation(vec![0.5, 0.5])
//!     .build()?;
//!
//! let assignment = Assignment::new("user-42", experiment.experiment_id(), "control");
//! let event = EventInput::conversion("user-42", "exp-001", 19.99)
//!     .into_event(assignment.variant_name());
//! assert_eq!(event.variant_name(), "control");
//! # Ok::<(), trueno_ab::Error>(())
//! ```

mod assignment_record;
mod event_record;
mod experiment_record;

pub use assignment_record::{Assignment, AssignmentBuilder};
pub use event_record::{Event, EventInput, EventType};
pub use experiment_record::{
    validate_allocation, Experiment, ExperimentBuilder, ExperimentStatus, Variant,
    ALLOCATION_TOLERANCE, CONTROL_VARIANT_NAME,
};
