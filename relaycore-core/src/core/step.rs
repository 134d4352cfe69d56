// relaycore-core/src/core/step.rs
// ============================================================================
// Module: RelayCore Step Report
// Description: Role-step executor output and the run context executors read.
// Purpose: Define the uniform contract every role adapter returns through.
// Dependencies: crate::core::{identifiers, money, plan, tenant}, serde
// ============================================================================

//! ## Overview
//! Adapters are black boxes to the engine: it only relies on the
//! [`StepReport`] shape. Adapters must not transition run state or write
//! artifacts directly; they return a report and the engine records it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::budget::BudgetSnapshot;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::RunId;
use crate::core::money::Money;
use crate::core::plan::RiskLevel;
use crate::core::plan::RoleTag;
use crate::core::tenant::Tenant;

// ============================================================================
// SECTION: Step Status
// ============================================================================

/// Terminal status of one node's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step completed as expected.
    Success,
    /// The step completed with a non-fatal concern.
    Warning,
    /// The step failed.
    Error,
    /// The step's guard predicate was not satisfied; it did not run.
    Skipped,
}

// ============================================================================
// SECTION: Outcome Decision
// ============================================================================

/// A role's decision outcome. Each role draws from a small closed set;
/// this type is shared across roles and the conflict matrix is keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeDecision {
    /// Proceed to the next stage as planned.
    Proceed,
    /// Abort the run.
    Abort,
    /// Continue with a reduced plan.
    ContinueDegraded,
    /// Flag for operator review without blocking.
    Flag,
}

// ============================================================================
// SECTION: Step Report
// ============================================================================

/// Structured output of one role-step executor for one plan-node.
///
/// # Invariants
/// - `confidence` is in `[0, 1]`.
/// - `observed_cost` is only meaningful when `status != Skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Node this report corresponds to.
    pub node_id: NodeId,
    /// Role that produced the report.
    pub role: RoleTag,
    /// Decision outcome.
    pub outcome: OutcomeDecision,
    /// Terminal status.
    pub status: StepStatus,
    /// Confidence in the outcome, in `[0, 1]`.
    pub confidence: f64,
    /// Risk level observed during execution.
    pub risk_level: RiskLevel,
    /// Actual cost observed.
    pub observed_cost: Money,
    /// Opaque structured signals produced by the adapter.
    pub signals: BTreeMap<String, Value>,
    /// Node ids this report declares a conflict with, if any.
    pub declared_conflicts: Vec<NodeId>,
    /// Attempt count this report corresponds to (1 for first attempt).
    pub attempt: u32,
    /// Optional idempotency tag supplied by the adapter; absent means the
    /// engine must treat `attempt > 1` as unknown-duplicated.
    pub idempotency_tag: Option<String>,
}

impl StepReport {
    /// Returns whether this report represents a non-idempotent re-execution
    /// with no adapter-declared idempotency guarantee.
    #[must_use]
    pub fn is_unknown_duplicate_risk(&self) -> bool {
        self.attempt > 1 && self.idempotency_tag.is_none()
    }
}

// ============================================================================
// SECTION: Run Context
// ============================================================================

/// Execution context built by the DAG Engine and passed to role-step
/// executors and guard-predicate evaluation.
///
/// # Invariants
/// - Built once per run, updated only by appending reports; never mutated
///   retroactively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Run identifier.
    pub run_id: RunId,
    /// Submission spec, opaque to the core.
    pub spec: Value,
    /// Owning tenant snapshot.
    pub tenant: Tenant,
    /// Budget snapshot as of context construction.
    pub budget_snapshot: BudgetSnapshot,
    /// Plan currently being walked.
    pub current_plan_id: PlanId,
    /// All step reports appended so far, in completion order.
    pub reports: Vec<StepReport>,
    /// Last evaluation failure kind observed, if any (feeds guard predicates
    /// and the Plan Selector's rule table).
    pub last_evaluation_failure: Option<String>,
}

impl RunContext {
    /// Returns the remaining budget for the owning tenant at this point in
    /// the run (daily limit minus daily spend).
    #[must_use]
    pub fn budget_remaining(&self) -> Money {
        self.tenant.budget_profile.max_daily_spend - self.budget_snapshot.daily_spend
    }

    /// Returns reports for a given node id, most recent attempt last.
    #[must_use]
    pub fn reports_for_node(&self, node_id: &NodeId) -> Vec<&StepReport> {
        self.reports
            .iter()
            .filter(|report| &report.node_id == node_id)
            .collect()
    }
}
