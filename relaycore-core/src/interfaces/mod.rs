// relaycore-core/src/interfaces/mod.rs
// ============================================================================
// Module: RelayCore Interfaces
// Description: Backend-agnostic trait seams for state persistence, artifact
// storage, role-step execution, and cost/signal provision.
// Purpose: Define the contract surfaces every other crate in the workspace
// implements against, so the engine never depends on a concrete backend.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! These traits are the seams the engine composes against: the State Manager is the
//! sole writer of [`crate::core::Run`] through [`RunStateStore`]; artifacts
//! flow through [`ArtifactSink`]/[`ArtifactReader`]; role adapters implement
//! [`RoleStepExecutor`] as black boxes the DAG Engine only knows through the
//! [`crate::core::StepReport`] contract. Implementations must fail closed:
//! an error here should never be interpreted as "proceed".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::Run;
use crate::core::RunId;
use crate::core::RunStatus;
use crate::core::StepReport;
use crate::core::TenantId;
use crate::core::TransitionRecord;
use crate::core::run::ExecutionMode;

// ============================================================================
// SECTION: Run State Store
// ============================================================================

/// Run state store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O (disk, network, database) failure.
    #[error("run state store io error: {0}")]
    Io(String),
    /// A transition was requested that `RunStatus::is_allowed_transition`
    /// rejects.
    #[error("illegal transition from {from:?} to {to:?} for run {run_id}")]
    TransitionIllegal {
        /// Run the transition was attempted against.
        run_id: RunId,
        /// Status transitioned from.
        from: RunStatus,
        /// Status transitioned to.
        to: RunStatus,
    },
    /// The requested run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(RunId),
}

/// Sole-writer store for run lifecycle state.
///
/// # Invariants
/// - `transition` linearizes concurrent calls for the same `run_id`: two
///   simultaneous transitions on one run never interleave.
/// - Every successful `transition` durably records a [`TransitionRecord`]
///   before returning.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// Creates a new run in `Idle` status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the write fails.
    async fn create(&self, run: Run) -> Result<(), StoreError>;

    /// Attempts the given state transition, recording a [`TransitionRecord`]
    /// on success.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransitionIllegal`] when `to` is not reachable
    /// from the run's current status, [`StoreError::RunNotFound`] when the
    /// run does not exist, or [`StoreError::Io`] on a durability failure.
    async fn transition(
        &self,
        run_id: &RunId,
        to: RunStatus,
        reason: &str,
        actor: &str,
    ) -> Result<TransitionRecord, StoreError>;

    /// Reads the current state of a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RunNotFound`] when the run does not exist.
    async fn read(&self, run_id: &RunId) -> Result<Run, StoreError>;

    /// Lists runs owned by a tenant, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a read failure.
    async fn list_by_tenant(
        &self,
        tenant_id: &TenantId,
        status_filter: Option<RunStatus>,
    ) -> Result<Vec<Run>, StoreError>;

    /// Records a new cumulative cost and execution mode against a run
    /// without a lifecycle transition (used after a governance checkpoint
    /// that keeps the run `Running`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RunNotFound`] when the run does not exist, or
    /// [`StoreError::Io`] on a durability failure.
    async fn record_mode(
        &self,
        run_id: &RunId,
        mode: ExecutionMode,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Artifact Sink / Reader
// ============================================================================

/// Artifact store errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Underlying I/O failure.
    #[error("artifact store io error: {0}")]
    Io(String),
    /// The named artifact does not exist in the run's bundle.
    #[error("artifact not found: {0}")]
    NotFound(String),
    /// A write was attempted against a sealed bundle.
    #[error("bundle already sealed: {0}")]
    Sealed(RunId),
}

/// Append-only artifact sink for one run's bundle.
///
/// # Invariants
/// - Writes after `seal` fail with [`ArtifactError::Sealed`].
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Writes `bytes` at `path`, relative to the run's bundle root.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Sealed`] if the bundle is sealed, or
    /// [`ArtifactError::Io`] on a write failure.
    async fn write(&self, run_id: &RunId, path: &str, bytes: &[u8]) -> Result<(), ArtifactError>;

    /// Seals the bundle: computes and appends the manifest bundle hash, and
    /// rejects further writes.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] on a write failure.
    async fn seal(&self, run_id: &RunId) -> Result<(), ArtifactError>;
}

/// Read access to a run's artifact bundle.
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    /// Reads the bytes stored at `path` within a run's bundle.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::NotFound`] when `path` has no entry, or
    /// [`ArtifactError::Io`] on a read failure.
    async fn read(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>, ArtifactError>;

    /// Lists the bundle-relative paths currently recorded for a run.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] on a read failure.
    async fn list(&self, run_id: &RunId) -> Result<Vec<String>, ArtifactError>;
}

// ============================================================================
// SECTION: Role-Step Executor
// ============================================================================

/// Role-step executor errors.
#[derive(Debug, Error)]
pub enum RoleStepError {
    /// The adapter did not complete within its declared timeout.
    #[error("role step timed out after {0:?}")]
    Timeout(Duration),
    /// A transient failure; the caller should retry.
    #[error("transient role step failure: {0}")]
    Transient(String),
    /// A permanent failure; retrying will not help.
    #[error("permanent role step failure: {0}")]
    Permanent(String),
    /// A failure that cannot confidently be classified as transient or
    /// permanent.
    #[error("unknown role step failure: {0}")]
    Unknown(String),
}

impl RoleStepError {
    /// Returns whether the Task Queue should retry a task that failed with
    /// this error, using the transient/permanent/unknown
    /// categorization.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unknown(_) | Self::Timeout(_))
    }
}

/// Uniform adapter shape invoked by the DAG Engine for one role.
///
/// # Invariants
/// - Adapters must not transition run state or write to the artifact bundle
///   directly; they return a [`StepReport`] and the engine records it.
/// - Adapters must honor the `timeout` passed to `execute`.
#[async_trait]
pub trait RoleStepExecutor: Send + Sync {
    /// Executes this role's step for the given node, producing a report.
    ///
    /// # Errors
    ///
    /// Returns [`RoleStepError`] when the adapter cannot produce a report;
    /// the caller (the Worker) categorizes the error for queue retry policy.
    async fn execute(
        &self,
        context: &crate::core::RunContext,
        node: &crate::core::PlanNode,
        timeout: Duration,
    ) -> Result<StepReport, RoleStepError>;
}

// ============================================================================
// SECTION: Cost Signal Provider
// ============================================================================

/// Cost signal provider errors.
#[derive(Debug, Error)]
pub enum CostSignalError {
    /// The provider could not be reached or returned malformed data.
    #[error("cost signal provider error: {0}")]
    Provider(String),
}

/// Backend-agnostic source of real-time cost/usage signals, consulted by the
/// `cost` role adapter and by the Budget Controller's forecast path.
#[async_trait]
pub trait CostSignalProvider: Send + Sync {
    /// Returns the current observed cost for a run, in the tenant's
    /// currency minor units, as of this call.
    ///
    /// # Errors
    ///
    /// Returns [`CostSignalError`] when the signal cannot be read.
    async fn observed_cost(&self, run_id: &RunId) -> Result<crate::core::Money, CostSignalError>;
}
