// relaycore-engine/src/error.rs
// ============================================================================
// Module: Engine Error
// Description: Error enum for the Execution Pool, Plan Selector, Governance
// Engine, DAG Engine, Artifact Store, and State Manager.
// Purpose: Give callers distinct failure codes for the engine's public
// operations, wrapping the trait-seam errors it composes over.
// Dependencies: relaycore_core::{StoreError, ArtifactError},
// relaycore_budget::BudgetError
// ============================================================================

use relaycore_core::ArtifactError;
use relaycore_core::RunId;
use relaycore_core::StoreError;
use relaycore_budget::BudgetError;
use thiserror::Error;

/// Errors produced by the engine crate's components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The run state store rejected an operation.
    #[error("run state error: {0}")]
    Store(#[from] StoreError),

    /// The artifact store rejected an operation.
    #[error("artifact store error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The budget controller rejected an operation.
    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    /// A required plan-node failed and no degradation path was admitted.
    #[error("run {0} failed: required node did not complete")]
    RequiredNodeFailed(RunId),

    /// The Execution Pool was cancelled before any stage reached a terminal
    /// state.
    #[error("execution cancelled for run {0}")]
    PoolCancelled(RunId),

    /// A plan referenced by id could not be found in the repository the DAG
    /// Engine consults.
    #[error("plan not found: {0}")]
    PlanNotFound(String),
}
