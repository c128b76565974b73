//! Decision Engine
//!
//! Turns one experiment's analysis into operator actions, evaluated in a
//! fixed order with independent appends:
//!
//! 1. **Early stop**: first variant whose Bayesian signal is conclusive
//!    with confidence above the threshold (first found wins)
//! 2. **Traffic reallocation**: only without a stop; if the variant with
//!    the best revenue per participant is significant, move part of the
//!    control share to it
//! 3. **Insufficient sample**: always checked; proposes extra days when the
//!    smallest arm is below the per-arm target

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::{ExperimentAnalysis, VariantAnalysis};
use crate::config::EngineConfig;
use crate::experiment::Experiment;

/// An operator-facing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Evidence is conclusive; end the experiment.
    StopExperiment {
        /// Human-readable explanation.
        reason: String,
        /// Variant that triggered the stop.
        variant: String,
        /// Posterior confidence level.
        confidence: f64,
    },
    /// Shift traffic towards a significant winner.
    ReallocateTraffic {
        /// Human-readable explanation.
        reason: String,
        /// Winning variant.
        variant: String,
        /// Proposed share per variant (sums to 1).
        new_allocation: BTreeMap<String, f64>,
    },
    /// Keep the experiment running longer.
    ExtendDuration {
        /// Human-readable explanation.
        reason: String,
        /// Suggested extra days.
        recommended_extension_days: u32,
        /// Participants in the smallest arm.
        min_participants: u64,
        /// Required participants per arm.
        required_per_arm: u64,
    },
}

impl Action {
    /// Stable action name (`stop_experiment`, ...).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StopExperiment { .. } => "stop_experiment",
            Self::ReallocateTraffic { .. } => "reallocate_traffic",
            Self::ExtendDuration { .. } => "extend_duration",
        }
    }
}

/// Summary of where the experiment stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPerformance {
    /// Overall winner, if any.
    pub best_variant: Option<String>,
    /// Largest revenue lift over control, in percent (0 without variants).
    pub max_lift: f64,
}

/// Output handed to dashboards and notifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    /// Experiment id.
    pub experiment_id: String,
    /// When the decision was made.
    pub evaluated_at: DateTime<Utc>,
    /// Ordered actions.
    pub actions: Vec<Action>,
    /// Current best variant and lift.
    pub current_performance: CurrentPerformance,
}

/// Derives actions from analysis results.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    stop_confidence: f64,
    reallocation_fraction: f64,
    default_extension_days: u32,
}

impl DecisionEngine {
    /// Build from engine configuration.
    #[must_use]
    pub const fn new(config: &EngineConfig) -> Self {
        Self {
            stop_confidence: config.stop_confidence,
            reallocation_fraction: config.reallocation_fraction,
            default_extension_days: config.default_extension_days,
        }
    }

    /// Evaluate the action policy at time `now`.
    #[must_use]
    pub fn decide(
        &self,
        experiment: &Experiment,
        analysis: &ExperimentAnalysis,
        now: DateTime<Utc>,
    ) -> DecisionReport {
        let mut actions = Vec::new();

        if let Some(stop) = self.early_stop(analysis) {
            actions.push(stop);
        } else if let Some(reallocate) = self.reallocation(experiment, analysis) {
            actions.push(reallocate);
        }

        if let Some(extend) = self.extension(experiment, analysis, now) {
            actions.push(extend);
        }

        if !actions.is_empty() {
            let names: Vec<&str> = actions.iter().map(Action::name).collect();
            info!(
                experiment_id = %analysis.experiment_id,
                actions = ?names,
                "Decision actions derived"
            );
        }

        DecisionReport {
            experiment_id: analysis.experiment_id.clone(),
            evaluated_at: now,
            actions,
            current_performance: current_performance(analysis),
        }
    }

    fn early_stop(&self, analysis: &ExperimentAnalysis) -> Option<Action> {
        let variant = analysis.variants.iter().find(|v| {
            v.bayesian.should_stop_early && v.bayesian.confidence_level > self.stop_confidence
        })?;
        let name = &variant.arm.name;

        let reason = if variant.bayesian.probability_variant_better >= 0.5 {
            format!("High confidence winner detected: {name}")
        } else {
            format!(
                "High confidence that {name} underperforms {}",
                analysis.control_variant
            )
        };
        Some(Action::StopExperiment {
            reason,
            variant: name.clone(),
            confidence: variant.bayesian.confidence_level,
        })
    }

    fn reallocation(
        &self,
        experiment: &Experiment,
        analysis: &ExperimentAnalysis,
    ) -> Option<Action> {
        let top = analysis
            .variants
            .iter()
            // first in configuration order on ties
            .min_by(|a, b| b.arm.revenue_per_user.total_cmp(&a.arm.revenue_per_user))?;
        if !top.significance.is_significant {
            return None;
        }

        let control_share = experiment.allocation_for(&analysis.control_variant)?;
        let moved = control_share * self.reallocation_fraction.clamp(0.0, 1.0);
        if moved <= 0.0 {
            return None;
        }

        let new_allocation: BTreeMap<String, f64> = experiment
            .variants()
            .iter()
            .zip(experiment.traffic_allocation())
            .map(|(variant, &share)| {
                let share = if variant.name() == analysis.control_variant {
                    share - moved
                } else if variant.name() == top.arm.name {
                    share + moved
                } else {
                    share
                };
                (variant.name().to_string(), share)
            })
            .collect();

        Some(Action::ReallocateTraffic {
            reason: format!("Increase traffic to winning variant: {}", top.arm.name),
            variant: top.arm.name.clone(),
            new_allocation,
        })
    }

    fn extension(
        &self,
        experiment: &Experiment,
        analysis: &ExperimentAnalysis,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        let arms = experiment.variants().len().max(1) as u64;
        let required_per_arm = experiment.target_sample_size().div_ceil(arms);
        let min_participants = analysis
            .variants
            .iter()
            .map(|v| v.arm.participants)
            .chain(std::iter::once(analysis.control.participants))
            .min()?;

        if min_participants >= required_per_arm {
            return None;
        }

        let days = self.extension_days(experiment, min_participants, required_per_arm, now);
        Some(Action::ExtendDuration {
            reason: format!("Insufficient sample size: {min_participants}/{required_per_arm}"),
            recommended_extension_days: days,
            min_participants,
            required_per_arm,
        })
    }

    /// Days needed at the observed enrolment rate, capped by the remaining
    /// duration; the configured default when no rate is observable.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn extension_days(
        &self,
        experiment: &Experiment,
        min_participants: u64,
        required_per_arm: u64,
        now: DateTime<Utc>,
    ) -> u32 {
        let Some(started_at) = experiment.started_at() else {
            return self.default_extension_days.max(1);
        };
        let elapsed_days = (now - started_at).num_seconds() as f64 / 86_400.0;
        if elapsed_days <= 0.0 || min_participants == 0 {
            return self.default_extension_days.max(1);
        }

        let per_day = min_participants as f64 / elapsed_days;
        let deficit = (required_per_arm - min_participants) as f64;
        let needed = (deficit / per_day).ceil();

        // past the maximum duration only the one-day floor remains
        let remaining = (f64::from(experiment.max_duration_days()) - elapsed_days).floor();
        needed.min(remaining).clamp(1.0, f64::from(u32::MAX)) as u32
    }
}

fn current_performance(analysis: &ExperimentAnalysis) -> CurrentPerformance {
    CurrentPerformance {
        best_variant: analysis.overall_winner.clone(),
        max_lift: analysis
            .variants
            .iter()
            .map(|v: &VariantAnalysis| v.revenue_lift_percentage)
            .reduce(f64::max)
            .unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ArmSummary;
    use crate::stats::{BayesianSummary, SignificanceResult};
    use chrono::Duration;
    use serde_json::json;

    fn experiment(target: u64) -> Experiment {
        Experiment::builder("exp-1", "Decisions")
            .variant("control", json!({}))
            .variant("variant_1", json!({}))
            .variant("variant_2", json!({}))
            .traffic_allocation(vec![0.4, 0.3, 0.3])
            .target_sample_size(target)
            .build()
            .unwrap()
    }

    fn arm(name: &str, participants: u64, revenue_per_user: f64) -> ArmSummary {
        ArmSummary {
            name: name.to_string(),
            participants,
            conversions: 0,
            conversion_rate: 0.0,
            revenue: 0.0,
            revenue_per_user,
            average_order_value: 0.0,
        }
    }

    fn variant(
        name: &str,
        participants: u64,
        revenue_per_user: f64,
        significant: bool,
        p_better: f64,
    ) -> VariantAnalysis {
        VariantAnalysis {
            arm: arm(name, participants, revenue_per_user),
            significance: SignificanceResult {
                control_rate: 0.05,
                variant_rate: 0.06,
                lift_percentage: 20.0,
                p_value: if significant { 0.01 } else { 0.5 },
                z_statistic: 0.0,
                confidence_interval: (0.0, 1.0),
                is_significant: significant,
                sample_size_adequate: true,
            },
            revenue_lift_percentage: revenue_per_user * 10.0,
            bayesian: BayesianSummary {
                probability_variant_better: p_better,
                confidence_level: p_better.max(1.0 - p_better),
                should_stop_early: !(0.05..=0.95).contains(&p_better),
                ..BayesianSummary::neutral()
            },
            is_winner: false,
            degraded: Vec::new(),
        }
    }

    fn analysis(variants: Vec<VariantAnalysis>) -> ExperimentAnalysis {
        ExperimentAnalysis {
            experiment_id: "exp-1".to_string(),
            analysis_timestamp: Utc::now(),
            significance_test: "two_proportion_z".to_string(),
            control_variant: "control".to_string(),
            control: arm("control", 5000, 0.0),
            variants,
            overall_winner: None,
            recommendations: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn test_first_conclusive_variant_wins() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![
            variant("variant_1", 5000, 1.0, true, 0.97),
            variant("variant_2", 5000, 2.0, true, 0.999),
        ]);

        let report = engine.decide(&experiment(1000), &a, Utc::now());
        assert_eq!(report.actions.len(), 1);
        match &report.actions[0] {
            Action::StopExperiment { variant, .. } => assert_eq!(variant, "variant_1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_losing_variant_also_stops() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![variant("variant_1", 5000, 0.1, false, 0.01)]);

        let report = engine.decide(&experiment(1000), &a, Utc::now());
        let Action::StopExperiment { reason, confidence, .. } = &report.actions[0] else {
            panic!("expected stop");
        };
        assert!(reason.contains("underperforms"));
        assert!((confidence - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_reallocation_moves_control_share() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![
            variant("variant_1", 5000, 1.0, false, 0.6),
            variant("variant_2", 5000, 3.0, true, 0.9),
        ]);

        let report = engine.decide(&experiment(1000), &a, Utc::now());
        assert_eq!(report.actions.len(), 1);
        let Action::ReallocateTraffic {
            variant,
            new_allocation,
            ..
        } = &report.actions[0]
        else {
            panic!("expected reallocation");
        };
        assert_eq!(variant, "variant_2");
        assert!((new_allocation["control"] - 0.2).abs() < 1e-12);
        assert!((new_allocation["variant_1"] - 0.3).abs() < 1e-12);
        assert!((new_allocation["variant_2"] - 0.5).abs() < 1e-12);
        assert!((new_allocation.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_reallocation_when_top_not_significant() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![
            variant("variant_1", 5000, 1.0, true, 0.6),
            variant("variant_2", 5000, 3.0, false, 0.9),
        ]);
        assert!(engine.decide(&experiment(1000), &a, Utc::now()).actions.is_empty());
    }

    #[test]
    fn test_stop_suppresses_reallocation_but_not_extension() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![
            variant("variant_1", 200, 3.0, true, 0.99),
            variant("variant_2", 5000, 1.0, false, 0.5),
        ]);

        let report = engine.decide(&experiment(3000), &a, Utc::now());
        let names: Vec<&str> = report.actions.iter().map(Action::name).collect();
        assert_eq!(names, ["stop_experiment", "extend_duration"]);
    }

    #[test]
    fn test_extension_uses_enrolment_rate() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let mut exp = experiment(3000);
        let now = Utc::now();
        exp.set_started_at(now - Duration::days(5));

        // 500 in 5 days is 100/day against 1000 required per arm
        let a = analysis(vec![
            variant("variant_1", 500, 1.0, false, 0.5),
            variant("variant_2", 800, 1.0, false, 0.5),
        ]);
        let report = engine.decide(&exp, &a, now);
        let Action::ExtendDuration {
            recommended_extension_days,
            min_participants,
            required_per_arm,
            ..
        } = &report.actions[0]
        else {
            panic!("expected extension");
        };
        assert_eq!(*min_participants, 500);
        assert_eq!(*required_per_arm, 1000);
        assert_eq!(*recommended_extension_days, 5);
    }

    #[test]
    fn test_extension_capped_by_remaining_duration() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let mut exp = experiment(30_000);
        let now = Utc::now();
        exp.set_started_at(now - Duration::days(20));

        // 10/day would need ~999 days; only 10 of 30 remain
        let a = analysis(vec![
            variant("variant_1", 200, 1.0, false, 0.5),
            variant("variant_2", 200, 1.0, false, 0.5),
        ]);
        let report = engine.decide(&exp, &a, now);
        let Action::ExtendDuration {
            recommended_extension_days,
            ..
        } = &report.actions[0]
        else {
            panic!("expected extension");
        };
        assert_eq!(*recommended_extension_days, 10);
    }

    #[test]
    fn test_extension_after_max_duration_is_one_day() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let mut exp = experiment(3000);
        let now = Utc::now();
        // max duration is 30 days; 40 have passed
        exp.set_started_at(now - Duration::days(40));

        // 5/day would need 160 more days
        let a = analysis(vec![
            variant("variant_1", 200, 1.0, false, 0.5),
            variant("variant_2", 200, 1.0, false, 0.5),
        ]);
        let report = engine.decide(&exp, &a, now);
        let Action::ExtendDuration {
            recommended_extension_days,
            required_per_arm,
            ..
        } = &report.actions[0]
        else {
            panic!("expected extension");
        };
        assert_eq!(*required_per_arm, 1000);
        assert_eq!(*recommended_extension_days, 1);
    }

    #[test]
    fn test_extension_defaults_without_start() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![variant("variant_1", 10, 1.0, false, 0.5)]);
        let report = engine.decide(&experiment(3000), &a, Utc::now());
        assert_eq!(
            report.actions[0],
            Action::ExtendDuration {
                reason: "Insufficient sample size: 10/1000".to_string(),
                recommended_extension_days: 14,
                min_participants: 10,
                required_per_arm: 1000,
            }
        );
    }

    #[test]
    fn test_current_performance_max_lift() {
        let engine = DecisionEngine::new(&EngineConfig::default());
        let a = analysis(vec![
            variant("variant_1", 5000, -1.0, false, 0.5),
            variant("variant_2", 5000, -0.5, false, 0.5),
        ]);
        let report = engine.decide(&experiment(1000), &a, Utc::now());
        assert!((report.current_performance.max_lift - -5.0).abs() < 1e-12);
        assert!(report.current_performance.best_variant.is_none());
    }

    #[test]
    fn test_action_serializes_with_tag() {
        let action = Action::StopExperiment {
            reason: "r".to_string(),
            variant: "variant_1".to_string(),
            confidence: 0.99,
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "stop_experiment");
        assert_eq!(value["variant"], "variant_1");
        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }
}
