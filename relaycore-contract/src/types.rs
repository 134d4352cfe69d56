// relaycore-contract/src/types.rs
// ============================================================================
// Module: Wire Contract Types
// Description: Shared request/response DTOs for the RelayCore Submission API.
// Purpose: Give relaycore-server and relaycore-cli one schema to serialize
// and deserialize against, instead of duplicating wire shapes.
// Dependencies: relaycore-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every shape here mirrors spec.md §6's Submission API wire surface
//! exactly: submit run, fetch run state, fetch artifact, submit operator
//! input, submit manual decision. Identifiers and domain enums are reused
//! directly from [`relaycore_core`] rather than re-declared, so the wire
//! contract can never drift from the run lifecycle it describes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use relaycore_core::ExecutionMode;
use relaycore_core::Money;
use relaycore_core::PlanId;
use relaycore_core::RunId;
use relaycore_core::RunStatus;
use relaycore_core::TaskPriority;
use relaycore_core::TenantId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Submit Run
// ============================================================================

/// Request body for submitting a new run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunRequest {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Submission spec, opaque to the Submission API itself.
    pub spec: Value,
    /// Optional execution priority; defaults to the queue's normal tier.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

/// Response body for a successful run submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunResponse {
    /// Identifier assigned to the new run.
    pub run_id: RunId,
    /// Lifecycle state immediately after submission (`Idle` or
    /// `SpecReady`, depending on whether admission ran synchronously).
    pub state: RunStatus,
    /// Token the Budget Controller issued on admission, when admission
    /// ran synchronously as part of submission.
    pub admission_token: Option<String>,
}

// ============================================================================
// SECTION: Fetch Run State
// ============================================================================

/// Response body describing a run's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStateResponse {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Current lifecycle status.
    pub state: RunStatus,
    /// Currently selected plan, if one has been chosen.
    pub current_plan_id: Option<PlanId>,
    /// Most recently applied execution mode.
    pub latest_mode: ExecutionMode,
    /// Cumulative actual cost recorded against this run.
    pub cumulative_cost: Money,
    /// Brief human-readable progress marker (e.g. `"stage 3 of 5"`).
    pub progress: String,
}

// ============================================================================
// SECTION: Operator Input / Manual Decision
// ============================================================================

/// Request body for resuming a paused run with operator-supplied input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorInputRequest {
    /// Run to resume.
    pub run_id: RunId,
    /// Patch merged into the run's spec before resumption.
    pub patch: Value,
}

/// Posture an operator may select when resolving a paused run without
/// supplying a spec patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualDecision {
    /// Resume with the minimal plan.
    ContinueMinimal,
    /// Resume with the degraded plan.
    ContinueDegraded,
    /// Abandon the run.
    Stop,
}

/// Request body for submitting a manual governance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDecisionRequest {
    /// Run the decision applies to.
    pub run_id: RunId,
    /// Operator-selected posture.
    pub decision: ManualDecision,
}

/// Response body shared by operator-input and manual-decision submission:
/// both resolve a `Paused` run back into a new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResponse {
    /// Run that was resumed.
    pub run_id: RunId,
    /// Lifecycle state after resumption.
    pub state: RunStatus,
}

// ============================================================================
// SECTION: Failure Taxonomy
// ============================================================================

/// Wire-level failure codes, one per spec.md §6's failure taxonomy.
///
/// # Invariants
/// - Every Submission API error response carries exactly one of these
///   codes; the set is closed (no freeform error strings on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The tenant named in a request does not exist.
    TenantUnknown,
    /// The tenant exists but is suspended.
    TenantSuspended,
    /// Admission would exceed the tenant's budget.
    BudgetExceeded,
    /// Admission would exceed the tenant's concurrency cap.
    ConcurrencyExceeded,
    /// The submitted spec failed validation.
    SpecInvalid,
    /// Operator input or a manual decision was submitted for a run that
    /// is not currently `Paused`.
    NotPaused,
    /// An operator-supplied patch failed validation.
    PatchInvalid,
    /// The named run does not exist.
    RunNotFound,
    /// The requested lifecycle transition is not reachable from the
    /// run's current state.
    TransitionIllegal,
    /// An operation exceeded its declared timeout.
    Timeout,
    /// A task's lease expired before it was acknowledged.
    LeaseExpired,
    /// A task exhausted its retry budget and was dead-lettered.
    TaskDead,
    /// No registered executor can service the requested role.
    CapabilityUnavailable,
    /// The run-state or cost ledger could not be reached.
    LedgerUnavailable,
    /// The run is paused by governance and cannot proceed without
    /// operator input.
    GovernancePaused,
}

/// Error body returned for any failed Submission API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Closed-set failure code.
    pub code: FailureCode,
    /// Human-readable detail for logs and operator tooling.
    pub message: String,
}

impl ApiErrorBody {
    /// Builds an error body from a code and a detail message.
    #[must_use]
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}
