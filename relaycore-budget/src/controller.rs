// relaycore-budget/src/controller.rs
// ============================================================================
// Module: Budget Controller
// Description: Per-tenant accounting of spend and concurrent-run count; the
// sole admission gate for new runs.
// Purpose: Implement the admit/record/release/status/forecast
// contract and concurrency-aware projection algorithm.
// Dependencies: relaycore_core::{Money, Tenant, budget::*}, crate::registry
// ============================================================================

//! ## Overview
//! `BudgetController` owns the per-tenant ledger and concurrency counter. It
//! is authoritative for spend/concurrency per the Open Question resolution
//! the [`crate::registry::TenantRegistry`] is consulted only
//! for identity/profile, never re-derived here. Admission is a narrow,
//! short-held critical section — the mutex guard never spans an `.await`
//! for downstream I/O, never held across an await point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use relaycore_core::AdmissionToken;
use relaycore_core::BudgetSnapshot;
use relaycore_core::BudgetStatus;
use relaycore_core::LedgerEntry;
use relaycore_core::Money;
use relaycore_core::RunId;
use relaycore_core::SpendCategory;
use relaycore_core::Tenant;
use relaycore_core::TenantId;
use relaycore_core::Timestamp;
use relaycore_core::project_concurrent_spend;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::error::BudgetError;
use crate::registry::TenantRegistry;

/// Projected spend for a tenant, returned by `BudgetController::forecast`.
pub type BudgetProjection = relaycore_core::BudgetProjection;

/// Authoritative admission gate for tenant spend and concurrency.
///
/// # Invariants
/// - No cost increment is committed via [`BudgetController::record`] unless
///   an [`AdmissionToken`] for that run was previously issued by
///   [`BudgetController::admit`] and has not yet been released.
/// - [`BudgetController::release`] is idempotent on the token.
#[async_trait]
pub trait BudgetController: Send + Sync {
    /// Attempts to admit a new run for `tenant_id` with the given estimated
    /// cost, returning a one-time [`AdmissionToken`] on success.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] or [`BudgetError::TenantSuspended`]
    /// when the tenant cannot submit, [`BudgetError::BudgetExceeded`] when the
    /// estimate would exceed the daily or monthly limit, or
    /// [`BudgetError::ConcurrencyExceeded`] when `max_concurrent_runs` would
    /// be exceeded.
    async fn admit(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        estimated_cost: Money,
    ) -> Result<AdmissionToken, BudgetError>;

    /// Appends an actual spend increment against an open admission.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TokenNotFound`] when the token is not open.
    async fn record(
        &self,
        token: &AdmissionToken,
        actual_cost: Money,
        category: SpendCategory,
    ) -> Result<(), BudgetError>;

    /// Releases an admission, decrementing the tenant's concurrent-run
    /// count. A no-op on a token already released.
    async fn release(&self, token: &AdmissionToken);

    /// Returns the tenant's current derived budget snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] when no such tenant exists.
    async fn status(&self, tenant_id: &TenantId) -> Result<BudgetSnapshot, BudgetError>;

    /// Projects total spend across a tenant's active runs using the
    /// concurrency-aware forecasting formula.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::TenantUnknown`] when no such tenant exists.
    async fn forecast(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        projected_cost: Money,
    ) -> Result<BudgetProjection, BudgetError>;
}

struct OpenAdmission {
    tenant_id: TenantId,
    run_id: RunId,
    estimated_cost: Money,
    spent: Money,
}

#[derive(Default)]
struct TenantAccount {
    daily_spend: Money,
    monthly_spend: Money,
    concurrent_runs: u32,
    ledger_unavailable: bool,
}

struct Inner {
    accounts: BTreeMap<TenantId, TenantAccount>,
    open: BTreeMap<AdmissionToken, OpenAdmission>,
    by_run: BTreeMap<RunId, AdmissionToken>,
    ledger: Vec<LedgerEntry>,
}

/// In-memory reference implementation of [`BudgetController`].
///
/// Backed by `Arc<Mutex<BTreeMap<TenantId, TenantAccount>>>`-shaped state
/// (held together with the open-admission and ledger tables in one
/// [`Inner`] so admit/record/release stay atomic with respect to each
/// other). A SQLite-backed ledger writer layers durability on top without
/// changing this type's admission logic; see `relaycore-store-sqlite`.
pub struct InMemoryBudgetController<R> {
    registry: Arc<R>,
    inner: Mutex<Inner>,
}

impl<R: TenantRegistry> InMemoryBudgetController<R> {
    /// Constructs a controller consulting `registry` for tenant identity.
    #[must_use]
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            inner: Mutex::new(Inner {
                accounts: BTreeMap::new(),
                open: BTreeMap::new(),
                by_run: BTreeMap::new(),
                ledger: Vec::new(),
            }),
        }
    }

    fn now() -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Timestamp::UnixMillis(millis)
    }
}

#[async_trait]
impl<R: TenantRegistry> BudgetController for InMemoryBudgetController<R> {
    async fn admit(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        estimated_cost: Money,
    ) -> Result<AdmissionToken, BudgetError> {
        let tenant = self.registry.get(tenant_id).await?;
        if !tenant.can_submit() {
            return Err(BudgetError::TenantSuspended(tenant_id.clone()));
        }

        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner
            .accounts
            .get(tenant_id)
            .is_some_and(|account| account.ledger_unavailable)
        {
            return Err(BudgetError::LedgerUnavailable(tenant_id.clone()));
        }
        let account = inner.accounts.entry(tenant_id.clone()).or_default();

        if account.daily_spend + estimated_cost > tenant.budget_profile.max_daily_spend
            || account.monthly_spend + estimated_cost > tenant.budget_profile.max_monthly_spend
        {
            return Err(BudgetError::BudgetExceeded(tenant_id.clone()));
        }
        if account.concurrent_runs >= tenant.budget_profile.max_concurrent_runs {
            return Err(BudgetError::ConcurrencyExceeded(tenant_id.clone()));
        }

        account.concurrent_runs += 1;
        let token = AdmissionToken::new(Uuid::new_v4().to_string());
        inner.open.insert(
            token.clone(),
            OpenAdmission {
                tenant_id: tenant_id.clone(),
                run_id: run_id.clone(),
                estimated_cost,
                spent: Money::ZERO,
            },
        );
        inner.by_run.insert(run_id.clone(), token.clone());
        info!(tenant_id = %tenant_id, run_id = %run_id, %estimated_cost, "run admitted");
        Ok(token)
    }

    async fn record(
        &self,
        token: &AdmissionToken,
        actual_cost: Money,
        category: SpendCategory,
    ) -> Result<(), BudgetError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let admission = inner
            .open
            .get_mut(token)
            .ok_or_else(|| BudgetError::TokenNotFound(token.as_str().to_string()))?;
        admission.spent = admission.spent + actual_cost;
        let tenant_id = admission.tenant_id.clone();
        let run_id = admission.run_id.clone();

        if let Some(account) = inner.accounts.get_mut(&tenant_id) {
            account.daily_spend = account.daily_spend + actual_cost;
            account.monthly_spend = account.monthly_spend + actual_cost;
        }
        inner.ledger.push(LedgerEntry {
            tenant_id,
            run_id,
            category,
            amount: actual_cost,
            recorded_at: Self::now(),
        });
        Ok(())
    }

    async fn release(&self, token: &AdmissionToken) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(admission) = inner.open.remove(token) else {
            return;
        };
        inner.by_run.remove(&admission.run_id);
        if let Some(account) = inner.accounts.get_mut(&admission.tenant_id) {
            account.concurrent_runs = account.concurrent_runs.saturating_sub(1);
        }
    }

    async fn status(&self, tenant_id: &TenantId) -> Result<BudgetSnapshot, BudgetError> {
        let tenant = self.registry.get(tenant_id).await?;
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let account = inner.accounts.get(tenant_id);
        let daily_spend = account.map_or(Money::ZERO, |a| a.daily_spend);
        let monthly_spend = account.map_or(Money::ZERO, |a| a.monthly_spend);
        let concurrent_runs = account.map_or(0, |a| a.concurrent_runs);

        let daily_ratio = ratio(daily_spend, tenant.budget_profile.max_daily_spend);
        let monthly_ratio = ratio(monthly_spend, tenant.budget_profile.max_monthly_spend);
        let tier = BudgetStatus::from_ratio(daily_ratio.max(monthly_ratio));

        Ok(BudgetSnapshot { daily_spend, monthly_spend, concurrent_runs, tier })
    }

    async fn forecast(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        projected_cost: Money,
    ) -> Result<BudgetProjection, BudgetError> {
        let tenant = self.registry.get(tenant_id).await?;
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let other_active_costs: Vec<Money> = inner
            .open
            .values()
            .filter(|admission| admission.tenant_id == *tenant_id && admission.run_id != *run_id)
            .map(|admission| admission.spent)
            .collect();
        let projection = project_concurrent_spend(
            projected_cost,
            &other_active_costs,
            tenant.budget_profile.max_daily_spend,
        );
        if projection.would_exceed {
            warn!(tenant_id = %tenant_id, run_id = %run_id, "forecast projects budget breach");
        }
        Ok(projection)
    }
}

fn ratio(spend: Money, limit: Money) -> f64 {
    if limit.minor_units() == 0 {
        return if spend.is_zero() { 0.0 } else { f64::INFINITY };
    }
    spend.minor_units() as f64 / limit.minor_units() as f64
}
