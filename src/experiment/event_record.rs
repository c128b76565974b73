//! Event Record - append-only outcome events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of outcome event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// The success event being measured (e.g. a purchase).
    Conversion,
    /// Any other tracked interaction, by name.
    Custom(String),
}

impl EventType {
    /// Whether this event counts towards conversions.
    #[must_use]
    pub const fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion)
    }
}

/// Event Record represents one outcome observed for an assigned user.
///
/// Events are never updated or deleted. The variant is copied from the
/// user's assignment at record time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    user_id: String,
    experiment_id: String,
    variant_name: String,
    event_type: EventType,
    value: f64,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl Event {
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

    /// Get the variant the user was assigned to.
    #[must_use]
    pub fn variant_name(&self) -> &str {
        &self.variant_name
    }

    /// Get the event type.
    #[must_use]
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Get the numeric value (revenue for conversions).
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the metadata payload.
    #[must_use]
    pub const fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Get the event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event as submitted by callers, before the variant is resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventInput {
    user_id: String,
    experiment_id: String,
    event_type: EventType,
    value: f64,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl EventInput {
    /// Create an event of the given type with no metadata, stamped now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        experiment_id: impl Into<String>,
        event_type: EventType,
        value: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            experiment_id: experiment_id.into(),
            event_type,
            value,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a conversion worth `value`.
    #[must_use]
    pub fn conversion(
        user_id: impl Into<String>,
        experiment_id: impl Into<String>,
        value: f64,
    ) -> Self {
        Self::new(user_id, experiment_id, EventType::Conversion, value)
    }

    /// Attach metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
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

    /// Resolve into a stored event for the given variant.
    #[must_use]
    pub fn into_event(self, variant_name: impl Into<String>) -> Event {
        Event {
            user_id: self.user_id,
            experiment_id: self.experiment_id,
            variant_name: variant_name.into(),
            event_type: self.event_type,
            value: self.value,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
    }
}
