// relaycore-core/src/core/plan.rs
// ============================================================================
// Module: RelayCore Plan
// Description: Immutable DAG-shape types walked by the DAG Engine.
// Purpose: Provide the plan/plan-node/guard-predicate shapes shared by the
// Plan Selector, DAG Engine, and Governance Engine.
// Dependencies: crate::core::{identifiers, money}, serde
// ============================================================================

//! ## Overview
//! A `Plan` is immutable once constructed; the engine may switch among plans
//! at a checkpoint but never mutates one in place. Guard predicates are
//! evaluated by `relay-logic` against a [`crate::core::step::RunContext`]
//! snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::NodeId;
use crate::core::identifiers::PlanId;
use crate::core::money::Money;

// ============================================================================
// SECTION: Path Class
// ============================================================================

/// The shape class a plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPathClass {
    /// Full, unrestricted plan.
    Normal,
    /// Reduced plan for budget or risk degradation.
    Degraded,
    /// Minimal plan, essential nodes only.
    Minimal,
}

// ============================================================================
// SECTION: Role Tag
// ============================================================================

/// Role-step executor kind a plan-node is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTag {
    /// Product-shaping step.
    Product,
    /// Data-gathering step.
    Data,
    /// Execution step.
    Execution,
    /// Evaluation step.
    Evaluation,
    /// Cost-accounting step.
    Cost,
}

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// A coarse risk classification shared by plan-nodes and step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

// ============================================================================
// SECTION: Guard Predicate
// ============================================================================

/// Guard predicate gating a plan-node's eligibility.
///
/// # Invariants
/// - Evaluation against a run context is deterministic and side-effect-free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardPredicate {
    /// Always eligible.
    Always,
    /// Eligible when remaining budget exceeds the given threshold.
    BudgetRemainingAbove {
        /// Threshold, in the tenant's budget currency.
        threshold: Money,
    },
    /// Eligible when the current risk level is not in the given set.
    RiskLevelNotIn {
        /// Excluded risk levels.
        excluded: Vec<RiskLevel>,
    },
    /// Eligible when the last evaluation failure kind is not in the given set.
    LastEvaluationFailureNotIn {
        /// Excluded failure kinds.
        excluded: Vec<String>,
    },
}

// ============================================================================
// SECTION: Plan Node
// ============================================================================

/// One node in a plan.
///
/// # Invariants
/// - A node executes at most once per run per plan version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node identifier, unique within the plan.
    pub node_id: NodeId,
    /// Topological stage the node belongs to.
    pub stage_index: u32,
    /// Role tag dispatched to a role-step executor.
    pub role: RoleTag,
    /// Guard predicate gating eligibility.
    pub guard: GuardPredicate,
    /// Whether this node's failure fails the run (absent degradation path).
    pub required: bool,
    /// Estimated cost, used for admission and projection.
    pub estimated_cost: Money,
    /// Estimated risk level.
    pub estimated_risk: RiskLevel,
    /// Hard dependency node ids: failure of any fails this node.
    pub hard_dependencies: Vec<NodeId>,
    /// Soft dependency node ids: failure produces a warning signal only.
    pub soft_dependencies: Vec<NodeId>,
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// An immutable plan: identity, version, path class, ordered plan-nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Plan version.
    pub version: u32,
    /// Path class.
    pub path_class: PlanPathClass,
    /// Ordered plan-nodes (order defines stage grouping, not execution order
    /// within a stage).
    pub nodes: Vec<PlanNode>,
}

impl Plan {
    /// Returns the nodes belonging to a given stage index, in declaration
    /// order.
    #[must_use]
    pub fn nodes_in_stage(&self, stage_index: u32) -> Vec<&PlanNode> {
        self.nodes
            .iter()
            .filter(|node| node.stage_index == stage_index)
            .collect()
    }

    /// Returns the highest stage index present in this plan, if any.
    #[must_use]
    pub fn max_stage_index(&self) -> Option<u32> {
        self.nodes.iter().map(|node| node.stage_index).max()
    }
}

// ============================================================================
// SECTION: Plan Selection
// ============================================================================

/// Audit record emitted by the Plan Selector for every `select` call.
///
/// # Invariants
/// - Required evidence: every selection, including ones that re-select the
///   same plan, is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSelection {
    /// Plan chosen.
    pub plan_id: Option<PlanId>,
    /// Rule number that fired (1-indexed, per the rule table).
    pub rule_id: u32,
    /// Human-readable rule description, for audit trails.
    pub rule_description: String,
    /// Input signals consulted by the rule that fired.
    pub consulted_signals: Vec<String>,
}
