// relaycore-core/src/core/budget.rs
// ============================================================================
// Module: RelayCore Budget Ledger
// Description: Per-tenant append-only spend record and derived status.
// Purpose: Provide the shapes the Budget Controller reads and writes.
// Dependencies: crate::core::{identifiers, money, time}, serde
// ============================================================================

//! ## Overview
//! The budget ledger is the only globally-shared mutable resource per tenant.
//! All writes go through the Budget Controller, which serializes per-tenant;
//! these types describe what gets written and what gets derived from it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RunId;
use crate::core::identifiers::TenantId;
use crate::core::money::Money;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Spend Category
// ============================================================================

/// Category tag for a spend increment, used to route budget breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendCategory {
    /// Large-language-model inference cost.
    Llm,
    /// Retrieval or search cost.
    Retrieval,
    /// Durable storage cost.
    Storage,
    /// External tool invocation cost.
    Tool,
    /// Any other cost category.
    Other,
}

// ============================================================================
// SECTION: Ledger Entry
// ============================================================================

/// One append-only ledger entry recording a committed spend increment.
///
/// # Invariants
/// - A ledger entry is only ever appended after its corresponding admission
///   check has already succeeded; see `BudgetController::record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Tenant the spend is attributed to.
    pub tenant_id: TenantId,
    /// Run that incurred the spend.
    pub run_id: RunId,
    /// Spend category.
    pub category: SpendCategory,
    /// Amount spent.
    pub amount: Money,
    /// Timestamp of the increment.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Budget Status
// ============================================================================

/// Derived budget health tier for a tenant.
///
/// # Invariants
/// - Boundaries are inclusive on the lower bound of each tier:
///   `healthy` is `<80%`, `warning` is `[80, 90)%`, `critical` is `[90, 100]%`,
///   `exceeded` is `>100%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    /// Spend is below 80% of the relevant limit.
    Healthy,
    /// Spend is between 80% and 90% of the relevant limit.
    Warning,
    /// Spend is between 90% and 100% of the relevant limit.
    Critical,
    /// Spend has exceeded the relevant limit.
    Exceeded,
}

impl BudgetStatus {
    /// Derives a status from a spend ratio (`spend / limit`).
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.0 {
            Self::Exceeded
        } else if ratio >= 0.9 {
            Self::Critical
        } else if ratio >= 0.8 {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Snapshot of a tenant's derived budget state, returned by
/// `BudgetController::status`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Current daily spend.
    pub daily_spend: Money,
    /// Current monthly spend.
    pub monthly_spend: Money,
    /// Current number of active (admitted, not yet released) runs.
    pub concurrent_runs: u32,
    /// Derived budget tier, computed from the tighter of daily/monthly ratios.
    pub tier: BudgetStatus,
}

/// A forward-looking cost projection for a tenant with multiple active runs.
///
/// # Invariants
/// - `confidence` is clamped to `[0.4, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetProjection {
    /// Projected total spend if all active runs complete at their current
    /// trajectory.
    pub projected_total: Money,
    /// Confidence in the projection, in `[0.4, 1.0]`.
    pub confidence: f64,
    /// Whether the projection alone would exceed the tenant's daily limit.
    pub would_exceed: bool,
}

/// Computes the concurrency-aware projection described in the Budget
/// Controller's algorithm: `currentRunCost + 2 * sum(otherActiveCosts)`,
/// with confidence shrinking as the active-run count grows.
#[must_use]
pub fn project_concurrent_spend(
    current_run_cost: Money,
    other_active_costs: &[Money],
    daily_limit: Money,
) -> BudgetProjection {
    let other_total: Money = other_active_costs.iter().copied().sum();
    let projected_total = current_run_cost + other_total.saturating_mul(2);
    let active_count = other_active_costs.len() as f64 + 1.0;
    let confidence = (1.0 / (1.0 + 0.15 * (active_count - 1.0))).max(0.4);
    let would_exceed = projected_total > daily_limit;
    BudgetProjection {
        projected_total,
        confidence,
        would_exceed,
    }
}
