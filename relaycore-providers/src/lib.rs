// relaycore-providers/src/lib.rs
// ============================================================================
// Module: RelayCore Providers
// Description: Built-in role-step executor adapters for RelayCore.
// Purpose: Give the DAG Engine zero-config adapters for the product/data/
// execution/evaluation/cost roles, behind the shared RoleStepExecutor seam.
// Dependencies: relaycore-core, reqwest, serde_json, tokio
// ============================================================================

//! ## Overview
//! This crate ships built-in [`relaycore_core::RoleStepExecutor`] adapters:
//! an HTTP-backed executor for webhook-style role steps, a JSON/local-rule
//! executor useful for deterministic `cost`/`evaluation` roles in tests, and
//! a time/tick-driven executor. Adapters are black boxes to the engine: they
//! never transition run state or write artifacts directly, they only return
//! a [`relaycore_core::StepReport`] and honor their declared timeout.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod json;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpRoleExecutor;
pub use http::HttpRoleExecutorConfig;
pub use json::JsonRoleExecutor;
pub use json::JsonRoleExecutorConfig;
pub use time::TimeRoleExecutor;
pub use time::TimeRoleExecutorConfig;
