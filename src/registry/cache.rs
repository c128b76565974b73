//! Results cache keyed by (experiment, variant, metric).
//!
//! Holds the last computed value of expensive derived metrics for display.
//! It is never read by aggregation and is dropped for an experiment on any
//! configuration change.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    /// Experiment id.
    pub experiment_id: String,
    /// Variant name.
    pub variant_name: String,
    /// Metric name (e.g. `conversion_rate`, `p_value`).
    pub metric_name: String,
}

impl ResultKey {
    /// Build a key.
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        variant_name: impl Into<String>,
        metric_name: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant_name: variant_name.into(),
            metric_name: metric_name.into(),
        }
    }
}

/// A cached metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    /// Metric value.
    pub value: f64,
    /// When it was computed.
    pub calculated_at: DateTime<Utc>,
    /// Experiment config version it was computed under.
    pub config_version: u32,
}

/// Concurrent results cache.
#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: DashMap<ResultKey, CachedResult>,
}

impl ResultsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value.
    pub fn put(&self, key: ResultKey, value: f64, config_version: u32) {
        self.entries.insert(
            key,
            CachedResult {
                value,
                calculated_at: Utc::now(),
                config_version,
            },
        );
    }

    /// Read a value.
    #[must_use]
    pub fn get(&self, key: &ResultKey) -> Option<CachedResult> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Drop every entry of an experiment.
    pub fn invalidate(&self, experiment_id: &str) {
        self.entries.retain(|key, _| key.experiment_id != experiment_id);
    }

    /// Number of cached values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
