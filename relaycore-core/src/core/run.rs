// relaycore-core/src/core/run.rs
// ============================================================================
// Module: RelayCore Run State
// Description: Run identity, lifecycle status, and the allowed-transition
// graph enforced by the State Manager.
// Purpose: Provide the sole canonical shape of a run's durable state.
// Dependencies: crate::core::{identifiers, money, time}, serde
// ============================================================================

//! ## Overview
//! The State Manager is the sole writer of `Run`; every other component reads
//! it. A `Run` is append-only in spirit — transitions are recorded, never
//! rewritten — and only the transitions enumerated in
//! [`RunStatus::is_allowed_transition`] may occur.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::PlanId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::TenantId;
use crate::core::money::Money;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - Transitions are validated against [`RunStatus::is_allowed_transition`];
///   any other pair is rejected with `TransitionIllegal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, not yet admitted.
    Idle,
    /// Run admitted by the Budget Controller, not yet dispatched.
    SpecReady,
    /// Run is actively being executed by the DAG Engine.
    Running,
    /// Run is paused awaiting operator input.
    Paused,
    /// Run completed successfully.
    Completed,
    /// Run failed.
    Failed,
}

impl RunStatus {
    /// Returns whether `from -> to` is an allowed transition.
    ///
    /// `RUNNING -> RUNNING` is allowed: it represents an execution-mode
    /// change within the run rather than a lifecycle change.
    #[must_use]
    pub const fn is_allowed_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Idle, Self::SpecReady)
                | (Self::SpecReady, Self::Running)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Paused, Self::Failed)
        )
    }

    /// Returns whether this status is terminal (no further transitions).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// SECTION: Execution Mode
// ============================================================================

/// Currently-active run posture, chosen by the Governance Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Full plan, no restrictions.
    Normal,
    /// Reduced plan with some nodes skipped or restricted.
    Degraded,
    /// Minimal plan, only essential nodes run.
    Minimal,
    /// Execution halted, awaiting operator input.
    Paused,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// A single run: identity, ownership, lifecycle, and execution summary.
///
/// # Invariants
/// - `run_id` is globally unique and monotonic-sortable.
/// - `cumulative_cost` only ever increases within a run (cost is never
///   refunded after being recorded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Submission spec, opaque to the core.
    pub spec: Value,
    /// Timestamp the run was created.
    pub created_at: Timestamp,
    /// Timestamp of the run's most recent transition.
    pub last_transitioned_at: Timestamp,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Current plan, if one has been selected.
    pub current_plan_id: Option<PlanId>,
    /// Cumulative actual cost recorded against this run.
    pub cumulative_cost: Money,
    /// Most recently applied execution mode.
    pub latest_mode: ExecutionMode,
}

impl Run {
    /// Creates a new run in `Idle` status.
    #[must_use]
    pub fn new(run_id: RunId, tenant_id: TenantId, spec: Value, created_at: Timestamp) -> Self {
        Self {
            run_id,
            tenant_id,
            spec,
            created_at,
            last_transitioned_at: created_at,
            status: RunStatus::Idle,
            current_plan_id: None,
            cumulative_cost: Money::ZERO,
            latest_mode: ExecutionMode::Normal,
        }
    }
}

// ============================================================================
// SECTION: Transition Record
// ============================================================================

/// A durably recorded state transition, written by the State Manager before
/// `transition` returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Run the transition applies to.
    pub run_id: RunId,
    /// Status transitioned from.
    pub from: RunStatus,
    /// Status transitioned to.
    pub to: RunStatus,
    /// Reason the transition occurred.
    pub reason: String,
    /// Timestamp the transition was recorded.
    pub at: Timestamp,
    /// Actor responsible for the transition (component name or operator id).
    pub actor: String,
}
