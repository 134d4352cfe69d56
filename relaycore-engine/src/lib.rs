// relaycore-engine/src/lib.rs
// ============================================================================
// Module: RelayCore Engine Library
// Description: Public API surface for the RelayCore engine crate.
// Purpose: Expose the DAG Engine and the components it composes: the
// Execution Pool, Plan Selector, Governance Engine, Run State Manager, and
// in-process Artifact Store.
// Dependencies: relaycore_core, relaycore_budget, relaycore_queue
// ============================================================================

//! ## Overview
//! `relaycore-engine` owns the DAG Engine — the orchestration loop that
//! walks one run's plan stage by stage, dispatching eligible nodes through
//! the [`execution_pool::ExecutionPool`], aggregating their reports, and
//! consulting the [`governance::GovernanceEngine`] and
//! [`plan_selector::PlanSelector`] at each stage boundary. Every other module
//! in this crate is a component [`dag_engine::DagEngine`] composes; none of
//! them is useful standalone outside a test harness.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifact_store;
pub mod config;
pub mod dag_engine;
pub mod error;
pub mod execution_pool;
pub mod governance;
pub mod guard;
pub mod plan_selector;
pub mod predicate;
pub mod registry;
pub mod state_manager;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact_store::InMemoryArtifactStore;
pub use config::EngineConfig;
pub use config::EngineConfigError;
pub use config::RawEngineConfig;
pub use dag_engine::DagEngine;
pub use dag_engine::ExecutionOutcome;
pub use dag_engine::PlanRepository;
pub use dag_engine::StaticPlanRepository;
pub use error::EngineError;
pub use execution_pool::ExecutionPool;
pub use governance::BudgetInputs;
pub use governance::GovernanceEngine;
pub use governance::RuleBasedGovernanceEngine;
pub use governance::aggregate_metrics;
pub use governance::build_conflict_matrix;
pub use governance::detect_conflicts;
pub use guard::evaluate_guard;
pub use plan_selector::PlanCatalog;
pub use plan_selector::PlanSelector;
pub use plan_selector::RuleBasedPlanSelector;
pub use plan_selector::StaticPlanCatalog;
pub use registry::RoleExecutorRegistry;
pub use state_manager::InMemoryStateManager;
