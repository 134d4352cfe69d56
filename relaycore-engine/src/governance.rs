// relaycore-engine/src/governance.rs
// ============================================================================
// Module: Governance Engine
// Description: Checkpoint aggregation, conflict detection, and the
// first-match-wins decision rule table governing a run's execution mode.
// Purpose: Implement the checkpoint contract as a static, finite
// rule table — never a learned model.
// Dependencies: relaycore_core::{StepReport, GovernanceDecision,
// AggregatedMetrics, ConflictRecord, ConflictKind, OutcomeDecision}
// ============================================================================

//! ## Overview
//! The conflict matrix is built once, from a declarative table, into a
//! `HashMap<(OutcomeDecision, OutcomeDecision), ConflictKind>` keyed
//! symmetrically — this mirrors how the reference workspace's comparator
//! module evaluates a fixed, enumerated operator set rather than open-ended
//! predicate logic. Every decision emitted carries every metric consulted,
//! so an auditor never needs access to the run's internal state to re-derive
//! it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use relaycore_core::AggregatedMetrics;
use relaycore_core::BudgetStatus;
use relaycore_core::CheckpointId;
use relaycore_core::ConflictKind;
use relaycore_core::ConflictRecord;
use relaycore_core::ExecutionMode;
use relaycore_core::GovernanceDecision;
use relaycore_core::NodeId;
use relaycore_core::OutcomeDecision;
use relaycore_core::StepReport;
use relaycore_core::StepStatus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum count of high-or-critical-risk reports that, combined with low
/// average confidence, triggers rule 3 (pause).
pub const HIGH_RISK_PAUSE_THRESHOLD: u32 = 2;
/// Average-confidence ceiling for rule 3.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Minimum count of LLM-layer fallbacks that triggers rule 4 (degrade).
pub const LLM_FALLBACK_DEGRADE_THRESHOLD: u32 = 2;

// ============================================================================
// SECTION: Conflict Matrix
// ============================================================================

/// Builds the static outcome-pair conflict matrix, symmetric in both key
/// orders.
///
/// `(Abort, Proceed)` and `(Abort, ContinueDegraded)` are direct decision
/// contradictions (hard); `(Proceed, ContinueDegraded)` and any pairing with
/// `Flag` are inconsistent-but-not-contradictory secondary signals (soft).
/// Identical outcomes never conflict.
#[must_use]
pub fn build_conflict_matrix() -> HashMap<(OutcomeDecision, OutcomeDecision), ConflictKind> {
    use OutcomeDecision::{Abort, ContinueDegraded, Flag, Proceed};

    let rules: &[(OutcomeDecision, OutcomeDecision, ConflictKind)] = &[
        (Abort, Proceed, ConflictKind::Hard),
        (Abort, ContinueDegraded, ConflictKind::Hard),
        (Proceed, ContinueDegraded, ConflictKind::Soft),
        (Flag, Proceed, ConflictKind::Soft),
        (Flag, Abort, ConflictKind::Soft),
        (Flag, ContinueDegraded, ConflictKind::Soft),
    ];

    let mut matrix = HashMap::with_capacity(rules.len() * 2);
    for &(left, right, kind) in rules {
        matrix.insert((left, right), kind);
        matrix.insert((right, left), kind);
    }
    matrix
}

fn ordered_pair(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a.as_str() <= b.as_str() { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) }
}

/// Detects conflicts among one stage's reports: explicit adapter-declared
/// conflicts (always `Hard`) plus conflicts derived from the outcome-pair
/// matrix, deduplicated by unordered node-id pair.
#[must_use]
pub fn detect_conflicts(
    reports: &[StepReport],
    matrix: &HashMap<(OutcomeDecision, OutcomeDecision), ConflictKind>,
) -> Vec<ConflictRecord> {
    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();

    for report in reports {
        for other_node in &report.declared_conflicts {
            let pair = ordered_pair(&report.node_id, other_node);
            if seen.insert(pair.clone()) {
                conflicts.push(ConflictRecord { left: pair.0, right: pair.1, kind: ConflictKind::Hard });
            }
        }
    }

    for (index, left) in reports.iter().enumerate() {
        if left.status == StepStatus::Skipped {
            continue;
        }
        for right in &reports[index + 1..] {
            if right.status == StepStatus::Skipped {
                continue;
            }
            let Some(&kind) = matrix.get(&(left.outcome, right.outcome)) else {
                continue;
            };
            let pair = ordered_pair(&left.node_id, &right.node_id);
            if seen.insert(pair.clone()) {
                conflicts.push(ConflictRecord { left: pair.0, right: pair.1, kind });
            }
        }
    }

    conflicts
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Inputs the Governance Engine has no control over but must consult:
/// budget state as of the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetInputs {
    /// Current derived budget tier.
    pub tier: BudgetStatus,
    /// Whether a forward projection alone would exceed the daily limit.
    pub projected_would_exceed: bool,
}

/// Aggregates one stage's reports into the metrics the rule table consults.
#[must_use]
pub fn aggregate_metrics(
    reports: &[StepReport],
    conflicts: &[ConflictRecord],
    budget: BudgetInputs,
) -> AggregatedMetrics {
    let considered: Vec<&StepReport> = reports.iter().filter(|report| report.status != StepStatus::Skipped).collect();
    let average_confidence = if considered.is_empty() {
        1.0
    } else {
        considered.iter().map(|report| report.confidence).sum::<f64>() / considered.len() as f64
    };
    let high_or_critical_risk_count = u32::try_from(
        considered
            .iter()
            .filter(|report| matches!(report.risk_level, relaycore_core::RiskLevel::High | relaycore_core::RiskLevel::Critical))
            .count(),
    )
    .unwrap_or(u32::MAX);
    let llm_fallback_count = u32::try_from(
        considered.iter().filter(|report| report.signals.get("llm_fallback").is_some_and(serde_json::Value::is_boolean)).count(),
    )
    .unwrap_or(u32::MAX);

    AggregatedMetrics {
        average_confidence,
        high_or_critical_risk_count,
        conflict_count: u32::try_from(conflicts.len()).unwrap_or(u32::MAX),
        llm_fallback_count,
        budget_exceeded: budget.tier == BudgetStatus::Exceeded,
        budget_projected_exceed: budget.projected_would_exceed,
    }
}

// ============================================================================
// SECTION: Governance Engine
// ============================================================================

/// Evaluates the checkpoint decision rule table against aggregated stage
/// inputs.
pub trait GovernanceEngine: Send + Sync {
    /// Produces a decision for one checkpoint, given the aggregated metrics
    /// and detected conflicts for the stage just completed.
    fn checkpoint(
        &self,
        checkpoint_id: CheckpointId,
        metrics: AggregatedMetrics,
        conflicts: Vec<ConflictRecord>,
    ) -> GovernanceDecision;
}

/// Data-driven, rule-table implementation of [`GovernanceEngine`].
#[derive(Debug, Default)]
pub struct RuleBasedGovernanceEngine;

impl GovernanceEngine for RuleBasedGovernanceEngine {
    fn checkpoint(
        &self,
        checkpoint_id: CheckpointId,
        metrics: AggregatedMetrics,
        conflicts: Vec<ConflictRecord>,
    ) -> GovernanceDecision {
        let hard_conflicts: Vec<ConflictRecord> =
            conflicts.iter().filter(|conflict| conflict.kind == ConflictKind::Hard).cloned().collect();
        if !hard_conflicts.is_empty() {
            let ids: Vec<String> =
                hard_conflicts.iter().map(|conflict| format!("{}~{}", conflict.left, conflict.right)).collect();
            return GovernanceDecision {
                checkpoint_id,
                mode: ExecutionMode::Paused,
                applied_restrictions: Vec::new(),
                rule_id: 1,
                rationale: format!("hard conflict: {}", ids.join(", ")),
                conflicts,
                inputs_consulted: metrics,
            };
        }

        if metrics.budget_exceeded || metrics.budget_projected_exceed {
            let mode = if metrics.budget_exceeded { ExecutionMode::Paused } else { ExecutionMode::Degraded };
            return GovernanceDecision {
                checkpoint_id,
                mode,
                applied_restrictions: Vec::new(),
                rule_id: 2,
                rationale: "budget breach".to_string(),
                conflicts,
                inputs_consulted: metrics,
            };
        }

        if metrics.high_or_critical_risk_count >= HIGH_RISK_PAUSE_THRESHOLD
            && metrics.average_confidence < LOW_CONFIDENCE_THRESHOLD
        {
            return GovernanceDecision {
                checkpoint_id,
                mode: ExecutionMode::Paused,
                applied_restrictions: Vec::new(),
                rule_id: 3,
                rationale: "high risk + low confidence".to_string(),
                conflicts,
                inputs_consulted: metrics,
            };
        }

        if metrics.llm_fallback_count >= LLM_FALLBACK_DEGRADE_THRESHOLD {
            return GovernanceDecision {
                checkpoint_id,
                mode: ExecutionMode::Degraded,
                applied_restrictions: Vec::new(),
                rule_id: 4,
                rationale: "model-layer fallback".to_string(),
                conflicts,
                inputs_consulted: metrics,
            };
        }

        if conflicts.iter().any(|conflict| conflict.kind == ConflictKind::Soft) {
            return GovernanceDecision {
                checkpoint_id,
                mode: ExecutionMode::Minimal,
                applied_restrictions: Vec::new(),
                rule_id: 5,
                rationale: "soft conflict".to_string(),
                conflicts,
                inputs_consulted: metrics,
            };
        }

        GovernanceDecision {
            checkpoint_id,
            mode: ExecutionMode::Normal,
            applied_restrictions: Vec::new(),
            rule_id: 6,
            rationale: "routine".to_string(),
            conflicts,
            inputs_consulted: metrics,
        }
    }
}
