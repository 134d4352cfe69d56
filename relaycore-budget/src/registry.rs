// relaycore-budget/src/registry.rs
// ============================================================================
// Module: Tenant Registry
// Description: Authoritative store of tenant identity and profile.
// Purpose: Own tenant creation, lookup, and reversible suspend/reactivate,
// per the Open Question resolution designating the registry (not the
// Budget Controller) authoritative for identity/profile.
// Dependencies: relaycore_core::{Tenant, TenantId, TenantStatus}
// ============================================================================

//! ## Overview
//! The registry never replicates spend or concurrency state — that stays in
//! [`crate::controller::BudgetController`]. It only ever *references*
//! tenants by id for admission decisions.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use relaycore_core::Tenant;
use relaycore_core::TenantId;
use relaycore_core::TenantStatus;

use crate::error::BudgetError;

/// Authoritative store of tenant identity and profile data.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Registers a new tenant. Registering an id that already exists
    /// overwrites the stored profile (used by config-driven bootstrap).
    async fn register(&self, tenant: Tenant);

    /// Looks up a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] when no such tenant exists.
    async fn get(&self, tenant_id: &TenantId) -> Result<Tenant, BudgetError>;

    /// Suspends a tenant: reversible, blocks new admissions.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] when no such tenant exists.
    async fn suspend(&self, tenant_id: &TenantId) -> Result<(), BudgetError>;

    /// Reactivates a suspended tenant.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] when no such tenant exists.
    async fn reactivate(&self, tenant_id: &TenantId) -> Result<(), BudgetError>;
}

/// In-memory tenant registry backed by a single mutex-guarded map.
///
/// A plain `Mutex<BTreeMap<_>>` is deliberate here, matching the rest of the
/// workspace's shared in-memory stores — the per-object concurrent-map
/// pattern is reserved for the State Manager's per-run transition lock,
/// where lock contention is keyed by a high-cardinality, independently
/// churning id. Tenant registration and suspend/reactivate are low-frequency
/// administrative operations, so a single mutex is the simpler and correct
/// choice here.
#[derive(Debug, Default)]
pub struct InMemoryTenantRegistry {
    tenants: Mutex<BTreeMap<TenantId, Tenant>>,
}

impl InMemoryTenantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRegistry for InMemoryTenantRegistry {
    async fn register(&self, tenant: Tenant) {
        let mut tenants = self.tenants.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tenants.insert(tenant.tenant_id.clone(), tenant);
    }

    async fn get(&self, tenant_id: &TenantId) -> Result<Tenant, BudgetError> {
        let tenants = self.tenants.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| BudgetError::TenantUnknown(tenant_id.clone()))
    }

    async fn suspend(&self, tenant_id: &TenantId) -> Result<(), BudgetError> {
        let mut tenants = self.tenants.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| BudgetError::TenantUnknown(tenant_id.clone()))?;
        tenant.status = TenantStatus::Suspended;
        Ok(())
    }

    async fn reactivate(&self, tenant_id: &TenantId) -> Result<(), BudgetError> {
        let mut tenants = self.tenants.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| BudgetError::TenantUnknown(tenant_id.clone()))?;
        tenant.status = TenantStatus::Active;
        Ok(())
    }
}
