// relaycore-budget/src/error.rs
// ============================================================================
// Module: Budget Error
// Description: Error enum for the Tenant Registry and Budget Controller.
// Purpose: Give callers distinct failure codes on
// the admission boundary.
// Dependencies: relaycore_core::{TenantId, RunId}
// ============================================================================

use relaycore_core::RunId;
use relaycore_core::TenantId;
use thiserror::Error;

/// Errors produced by the Tenant Registry and Budget Controller.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// No tenant with this id is registered.
    #[error("tenant unknown: {0}")]
    TenantUnknown(TenantId),
    /// The tenant exists but is suspended.
    #[error("tenant suspended: {0}")]
    TenantSuspended(TenantId),
    /// Admission would exceed the daily or monthly spend limit.
    #[error("budget exceeded for tenant {0}")]
    BudgetExceeded(TenantId),
    /// Admission would exceed `max_concurrent_runs`.
    #[error("concurrency exceeded for tenant {0}")]
    ConcurrencyExceeded(TenantId),
    /// The admission token does not correspond to an outstanding admission.
    #[error("admission token not found: {0}")]
    TokenNotFound(String),
    /// A run id was referenced that has no open admission.
    #[error("no open admission for run: {0}")]
    RunNotAdmitted(RunId),
    /// The ledger could not be durably written after retry with backoff.
    #[error("ledger unavailable for tenant {0}; tenant paused")]
    LedgerUnavailable(TenantId),
}
