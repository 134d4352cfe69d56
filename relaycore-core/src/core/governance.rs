// relaycore-core/src/core/governance.rs
// ============================================================================
// Module: RelayCore Governance Decision
// Description: Checkpoint aggregation inputs and the governance decision
// shape emitted at each checkpoint.
// Purpose: Provide the audit-sufficient record of a mode-selection decision.
// Dependencies: crate::core::{identifiers, run, step}, serde
// ============================================================================

//! ## Overview
//! The Governance Engine never runs a learned model: its input set and
//! output set are finite and its logic is a static rule table. This module
//! defines the inputs that table consults and the decision it emits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CheckpointId;
use crate::core::identifiers::NodeId;
use crate::core::run::ExecutionMode;

// ============================================================================
// SECTION: Conflict Kinds
// ============================================================================

/// Severity of a detected conflict between two step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Directly contradictory decisions (e.g. abort vs. proceed).
    Hard,
    /// Inconsistent secondary signals without a direct decision conflict.
    Soft,
}

/// A detected conflict between two reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// First node's id.
    pub left: NodeId,
    /// Second node's id.
    pub right: NodeId,
    /// Conflict severity.
    pub kind: ConflictKind,
}

// ============================================================================
// SECTION: Aggregated Metrics
// ============================================================================

/// Metrics aggregated across one stage's reports, consulted by the
/// governance rule table.
///
/// # Invariants
/// - `average_confidence` is the mean over all reports with `status !=
///   Skipped`; an empty set yields `1.0` (vacuously confident).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    /// Mean confidence across non-skipped reports.
    pub average_confidence: f64,
    /// Count of reports with risk level high or critical.
    pub high_or_critical_risk_count: u32,
    /// Count of conflicts detected (hard and soft combined).
    pub conflict_count: u32,
    /// Count of reports signaling an LLM-layer fallback occurred.
    pub llm_fallback_count: u32,
    /// Whether the tenant's budget status is exceeded.
    pub budget_exceeded: bool,
    /// Whether a forward projection alone would exceed budget.
    pub budget_projected_exceed: bool,
}

// ============================================================================
// SECTION: Governance Decision
// ============================================================================

/// The rule-derived decision emitted at one checkpoint.
///
/// # Invariants
/// - Includes every input metric consulted, so an auditor can re-derive it
///   without access to the run's internal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    /// Checkpoint identifier.
    pub checkpoint_id: CheckpointId,
    /// Chosen execution mode.
    pub mode: ExecutionMode,
    /// Restrictions applied as a result of this decision (role tags or node
    /// ids excluded from the next plan, etc.), free-form for audit.
    pub applied_restrictions: Vec<String>,
    /// Rule number that fired (1-indexed, per the rule table).
    pub rule_id: u32,
    /// Human-readable rationale, matching the rule table's recorded text.
    pub rationale: String,
    /// Conflicts that contributed to this decision, if any.
    pub conflicts: Vec<ConflictRecord>,
    /// Aggregated metrics consulted to reach this decision.
    pub inputs_consulted: AggregatedMetrics,
}
