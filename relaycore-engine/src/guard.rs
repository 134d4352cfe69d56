// relaycore-engine/src/guard.rs
// ============================================================================
// Module: Guard Predicate Evaluation
// Description: Deterministic, side-effect-free evaluation of a plan-node's
// guard predicate against a run context snapshot.
// Purpose: Gate stage eligibility before a node is dispatched.
// Dependencies: relaycore_core::{GuardPredicate, RunContext, RiskLevel}
// ============================================================================

//! ## Overview
//! Guard evaluation is pure: the same `(predicate, context)` pair always
//! yields the same boolean, with no I/O and no mutation. The "current risk
//! level" a [`relaycore_core::plan::GuardPredicate::RiskLevelNotIn`] guard
//! tests is the highest risk level observed across the run so far — the
//! worst signal any role has reported, not any single node's estimate —
//! since a guard is asking "is it currently too risky to run this node,"
//! which is a run-wide question.

// ============================================================================
// SECTION: Imports
// ============================================================================

use relaycore_core::GuardPredicate;
use relaycore_core::RiskLevel;
use relaycore_core::RunContext;
use relaycore_core::StepStatus;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates `guard` against `context`, returning whether the gated node is
/// eligible to run.
#[must_use]
pub fn evaluate_guard(guard: &GuardPredicate, context: &RunContext) -> bool {
    match guard {
        GuardPredicate::Always => true,
        GuardPredicate::BudgetRemainingAbove { threshold } => context.budget_remaining() > *threshold,
        GuardPredicate::RiskLevelNotIn { excluded } => {
            let current = current_risk_level(context);
            current.is_none_or(|risk| !excluded.contains(&risk))
        }
        GuardPredicate::LastEvaluationFailureNotIn { excluded } => context
            .last_evaluation_failure
            .as_deref()
            .is_none_or(|failure| !excluded.iter().any(|kind| kind == failure)),
    }
}

/// Returns the highest risk level among all non-skipped reports appended so
/// far, or `None` if no reports have been recorded yet (vacuously safe).
fn current_risk_level(context: &RunContext) -> Option<RiskLevel> {
    context
        .reports
        .iter()
        .filter(|report| report.status != StepStatus::Skipped)
        .map(|report| report.risk_level)
        .max()
}
