// relaycore-core/src/core/tenant.rs
// ============================================================================
// Module: RelayCore Tenant
// Description: Tenant identity, budget profile, and learning profile.
// Purpose: Provide the authoritative tenant shape referenced by admission,
// concurrency, and policy decisions.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! The Tenant Registry is authoritative for identity and profile data; the
//! Budget Controller is authoritative for spend and concurrency. This module
//! defines the profile shapes both consult, but neither replicates the
//! other's authoritative state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::core::money::Money;

// ============================================================================
// SECTION: Tenant Status
// ============================================================================

/// Tenant lifecycle status.
///
/// # Invariants
/// - A tenant is never hard-deleted; `Suspended` is reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Tenant may submit runs.
    Active,
    /// Tenant may not submit runs until reactivated.
    Suspended,
}

// ============================================================================
// SECTION: Learning Profile
// ============================================================================

/// Exploration intensity for a tenant's learning profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningIntensity {
    /// Minimal exploration budget.
    Conservative,
    /// Moderate exploration budget.
    Balanced,
    /// Maximal exploration budget.
    Aggressive,
}

/// Tenant learning/exploration profile.
///
/// # Invariants
/// - `exploration_share` is a fraction of the tenant's budget, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningProfile {
    /// Exploration intensity level.
    pub intensity: LearningIntensity,
    /// Share of budget allocated to exploration, in `[0, 1]`.
    pub exploration_share: f64,
    /// Whether this tenant opts into cross-tenant pattern contribution.
    pub cross_tenant_opt_in: bool,
}

// ============================================================================
// SECTION: Budget Profile
// ============================================================================

/// Tenant budget and quota profile.
///
/// # Invariants
/// - `max_concurrent_runs` bounds the count enforced by the Budget Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetProfile {
    /// Maximum spend allowed per day.
    pub max_daily_spend: Money,
    /// Maximum spend allowed per month.
    pub max_monthly_spend: Money,
    /// Maximum number of concurrently running runs.
    pub max_concurrent_runs: u32,
    /// Maximum number of agents usable by one run.
    pub max_agents: u32,
}

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// A tenant entity: identity, status, budget profile, learning profile.
///
/// # Invariants
/// - `priority_level` is in `[1, 10]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Human-readable tenant name.
    pub display_name: String,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Budget profile.
    pub budget_profile: BudgetProfile,
    /// Learning profile.
    pub learning_profile: LearningProfile,
    /// Scheduling priority, in `[1, 10]`.
    pub priority_level: u8,
}

impl Tenant {
    /// Returns whether the tenant may currently submit runs.
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }
}
