//! Experiment analysis.
//!
//! Reads per-variant aggregates, compares every non-control variant with
//! control using both statistical verdicts, picks an overall winner and
//! attaches recommendations and decision actions. The result serializes to
//! the JSON shape consumed by dashboards.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::decision::{Action, DecisionEngine, DecisionReport};
use crate::experiment::Experiment;
use crate::registry::{ExperimentRegistry, ResultKey, VariantAggregate};
use crate::stats::{
    lift_percentage, ArmCounts, BayesianSummary, SignificanceResult, StatisticalEngine,
};
use crate::{Error, Result};

/// Observed totals of one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSummary {
    /// Variant name.
    pub name: String,
    /// Non-holdout participants.
    pub participants: u64,
    /// Conversion events.
    pub conversions: u64,
    /// Conversions per participant.
    pub conversion_rate: f64,
    /// Summed conversion value.
    pub revenue: f64,
    /// Revenue per participant.
    pub revenue_per_user: f64,
    /// Revenue per conversion.
    pub average_order_value: f64,
}

impl From<&VariantAggregate> for ArmSummary {
    fn from(aggregate: &VariantAggregate) -> Self {
        Self {
            name: aggregate.variant_name.clone(),
            participants: aggregate.participants,
            conversions: aggregate.conversions,
            conversion_rate: aggregate.conversion_rate(),
            revenue: aggregate.revenue,
            revenue_per_user: aggregate.revenue_per_user(),
            average_order_value: aggregate.average_order_value(),
        }
    }
}

/// One variant compared with control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAnalysis {
    /// Observed totals.
    #[serde(flatten)]
    pub arm: ArmSummary,
    /// Frequentist verdict.
    #[serde(flatten)]
    pub significance: SignificanceResult,
    /// Revenue-per-participant change over control, in percent.
    pub revenue_lift_percentage: f64,
    /// Bayesian verdict.
    pub bayesian: BayesianSummary,
    /// Whether this variant is the overall winner.
    pub is_winner: bool,
    /// Reasons any fallback ran while computing this entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// Full analysis of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    /// Experiment id.
    pub experiment_id: String,
    /// When the analysis ran.
    pub analysis_timestamp: DateTime<Utc>,
    /// Significance test that produced the p-values.
    pub significance_test: String,
    /// Name of the control variant.
    pub control_variant: String,
    /// Control totals.
    pub control: ArmSummary,
    /// Non-control variants in configuration order.
    pub variants: Vec<VariantAnalysis>,
    /// Significant, positive-lift variant with the largest revenue lift.
    pub overall_winner: Option<String>,
    /// Human-readable advice.
    pub recommendations: Vec<String>,
    /// Operator actions.
    pub actions: Vec<Action>,
}

impl ExperimentAnalysis {
    /// Variant entry by name.
    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&VariantAnalysis> {
        self.variants.iter().find(|v| v.arm.name == name)
    }
}

/// Analysis result or the reason none could be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    /// A complete analysis.
    Complete(Box<ExperimentAnalysis>),
    /// `{"error": "..."}`.
    Failed {
        /// Failure description.
        error: String,
    },
}

impl AnalysisOutcome {
    /// The analysis, if complete.
    #[must_use]
    pub fn analysis(&self) -> Option<&ExperimentAnalysis> {
        match self {
            Self::Complete(analysis) => Some(analysis),
            Self::Failed { .. } => None,
        }
    }

    /// The error message, if failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Complete(_) => None,
            Self::Failed { error } => Some(error),
        }
    }
}

impl From<Result<ExperimentAnalysis>> for AnalysisOutcome {
    fn from(result: Result<ExperimentAnalysis>) -> Self {
        match result {
            Ok(analysis) => Self::Complete(Box::new(analysis)),
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Runs analyses against a registry.
#[derive(Debug)]
pub struct Analyzer<R: ExperimentRegistry> {
    registry: Arc<R>,
    stats: StatisticalEngine,
    decision: DecisionEngine,
    recommendation_floor: u64,
}

impl<R: ExperimentRegistry> Analyzer<R> {
    /// Create an analyzer over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<R>, config: &EngineConfig) -> Self {
        Self {
            registry,
            stats: StatisticalEngine::new(config),
            decision: DecisionEngine::new(config),
            recommendation_floor: config.recommendation_sample_floor,
        }
    }

    /// Statistical engine in use.
    #[must_use]
    pub const fn stats(&self) -> &StatisticalEngine {
        &self.stats
    }

    /// Analyze one experiment, reporting failure as `{"error": ...}`.
    #[must_use]
    pub fn analyze(&self, experiment_id: &str) -> AnalysisOutcome {
        let result = self.try_analyze(experiment_id);
        if let Err(e) = &result {
            warn!(experiment_id, error = %e, "Analysis unavailable");
        }
        result.into()
    }

    /// Analyze several experiments, in parallel when the `rayon` feature is on.
    #[must_use]
    pub fn analyze_many(&self, experiment_ids: &[&str]) -> Vec<AnalysisOutcome> {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            experiment_ids.par_iter().map(|id| self.analyze(id)).collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            experiment_ids.iter().map(|id| self.analyze(id)).collect()
        }
    }

    /// Analyze one experiment.
    ///
    /// # Errors
    ///
    /// `ExperimentNotFound`, `InsufficientData` when fewer than two
    /// variants have participants, or `ControlWithoutData` when the control
    /// arm has none.
    pub fn try_analyze(&self, experiment_id: &str) -> Result<ExperimentAnalysis> {
        self.evaluate(experiment_id).map(|(analysis, _)| analysis)
    }

    /// Analyze one experiment and return the decision report alongside.
    ///
    /// # Errors
    ///
    /// Same as [`Analyzer::try_analyze`].
    pub fn evaluate(&self, experiment_id: &str) -> Result<(ExperimentAnalysis, DecisionReport)> {
        let experiment = self.registry.get(experiment_id)?;
        let aggregates = self.registry.aggregate(experiment_id)?;

        let with_data = aggregates.iter().filter(|a| a.participants > 0).count();
        if with_data < 2 {
            return Err(Error::InsufficientData {
                experiment_id: experiment_id.to_string(),
                variants_with_data: with_data,
            });
        }

        let control_name = experiment.control_variant().name().to_string();
        let Some(control_aggregate) = aggregates
            .iter()
            .find(|a| a.variant_name == control_name && a.participants > 0)
        else {
            return Err(Error::ControlWithoutData {
                experiment_id: experiment_id.to_string(),
                control_variant: control_name,
            });
        };
        let control = ArmSummary::from(control_aggregate);
        let control_counts = ArmCounts::from(control_aggregate);

        let mut variants: Vec<VariantAnalysis> = aggregates
            .iter()
            .filter(|a| a.variant_name != control_name)
            .map(|aggregate| self.compare(&experiment, &control, control_counts, aggregate))
            .collect();

        let overall_winner = pick_winner(&variants);
        if let Some(winner) = &overall_winner {
            for variant in &mut variants {
                variant.is_winner = &variant.arm.name == winner;
            }
        }

        let recommendations = self.recommendations(&variants, overall_winner.as_deref());
        let mut analysis = ExperimentAnalysis {
            experiment_id: experiment_id.to_string(),
            analysis_timestamp: Utc::now(),
            significance_test: self.stats.test_name().to_string(),
            control_variant: control_name,
            control,
            variants,
            overall_winner,
            recommendations,
            actions: Vec::new(),
        };

        let report = self
            .decision
            .decide(&experiment, &analysis, analysis.analysis_timestamp);
        analysis.actions.clone_from(&report.actions);

        self.cache_results(&experiment, &analysis);

        info!(
            experiment_id,
            variants = analysis.variants.len(),
            winner = analysis.overall_winner.as_deref().unwrap_or("none"),
            actions = analysis.actions.len(),
            "Experiment analyzed"
        );
        Ok((analysis, report))
    }

    fn compare(
        &self,
        experiment: &Experiment,
        control: &ArmSummary,
        control_counts: ArmCounts,
        aggregate: &VariantAggregate,
    ) -> VariantAnalysis {
        let comparison = self.stats.compare(
            control_counts,
            ArmCounts::from(aggregate),
            experiment.significance_level(),
        );

        let degraded = [
            comparison.significance.reason().map(|r| format!("significance: {r}")),
            comparison.bayesian.reason().map(|r| format!("bayesian: {r}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        let arm = ArmSummary::from(aggregate);
        VariantAnalysis {
            revenue_lift_percentage: lift_percentage(
                control.revenue_per_user,
                arm.revenue_per_user,
            ),
            arm,
            significance: comparison.significance.into_value(),
            bayesian: comparison.bayesian.into_value(),
            is_winner: false,
            degraded,
        }
    }

    fn recommendations(&self, variants: &[VariantAnalysis], winner: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();

        match winner.and_then(|w| variants.iter().find(|v| v.arm.name == w)) {
            Some(v) => out.push(format!(
                "Implement {}: expected revenue lift of {:.1}%",
                v.arm.name, v.revenue_lift_percentage
            )),
            None => {
                out.push("No statistically significant winner found".to_string());
                let smallest = variants.iter().map(|v| v.arm.participants).min().unwrap_or(0);
                if smallest < self.recommendation_floor {
                    out.push("Increase sample size for more reliable results".to_string());
                }
            }
        }

        for v in variants.iter().filter(|v| v.bayesian.should_stop_early) {
            out.push(format!(
                "Consider stopping early for {} (confidence: {:.1}%)",
                v.arm.name,
                v.bayesian.confidence_level * 100.0
            ));
        }
        out
    }

    fn cache_results(&self, experiment: &Experiment, analysis: &ExperimentAnalysis) {
        let id = experiment.experiment_id();
        let version = experiment.config_version();
        let put = |variant: &str, metric: &str, value: f64| {
            self.registry
                .store_result(ResultKey::new(id, variant, metric), value, version);
        };

        put(&analysis.control.name, "conversion_rate", analysis.control.conversion_rate);
        put(&analysis.control.name, "revenue_per_user", analysis.control.revenue_per_user);
        for v in &analysis.variants {
            put(&v.arm.name, "conversion_rate", v.arm.conversion_rate);
            put(&v.arm.name, "revenue_per_user", v.arm.revenue_per_user);
            put(&v.arm.name, "p_value", v.significance.p_value);
            put(
                &v.arm.name,
                "probability_variant_better",
                v.bayesian.probability_variant_better,
            );
        }
    }
}

/// Significant variant with positive lift and the largest revenue lift.
fn pick_winner(variants: &[VariantAnalysis]) -> Option<String> {
    variants
        .iter()
        .filter(|v| v.significance.is_significant && v.significance.lift_percentage > 0.0)
        .fold(None, |best: Option<&VariantAnalysis>, v| match best {
            Some(b) if b.revenue_lift_percentage >= v.revenue_lift_percentage => Some(b),
            _ => Some(v),
        })
        .map(|v| v.arm.name.clone())
}
