// relaycore-server/src/lib.rs
// ============================================================================
// Module: RelayCore Submission API
// Description: HTTP server exposing the run Submission API over the run
//   state store, budget controller, and artifact store.
// Purpose: Provide the tenant-facing surface for submitting runs, polling
//   their state, fetching artifacts, and resolving paused runs.
// Dependencies: relaycore-core, relaycore-budget, relaycore-contract,
//   relaycore-engine, relaycore-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! The Submission API is a thin HTTP boundary over three collaborators: a
//! [`relaycore_core::RunStateStore`] for run lifecycle, a
//! [`relaycore_budget::BudgetController`] for tenant admission, and an
//! artifact store for reading back run output. Authorization, rate limiting,
//! and audit logging all happen at this boundary; none of it leaks into the
//! run state machine itself.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifact_store;
pub mod audit;
pub mod auth;
pub mod config;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact_store::FileArtifactStore;
pub use audit::FileRequestAuditSink;
pub use audit::NoopRequestAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::RequestAuditSink;
pub use audit::StderrRequestAuditSink;
pub use auth::ApiAction;
pub use auth::AuthAuditEvent;
pub use auth::AuthAuditSink;
pub use auth::AuthContext;
pub use auth::AuthError;
pub use auth::AuthMethod;
pub use auth::DefaultRequestAuthorizer;
pub use auth::NoopAuditSink;
pub use auth::RequestAuthorizer;
pub use auth::RequestContext;
pub use auth::StderrAuditSink;
pub use config::ConfigError;
pub use config::RateLimitConfig;
pub use config::RelayCoreServerConfig;
pub use config::RunStateStoreConfig;
pub use config::RunStateStoreType;
pub use config::ServerAuditConfig;
pub use config::ServerAuthConfig;
pub use config::ServerAuthMode;
pub use config::ServerConfig;
pub use config::ServerLimitsConfig;
pub use config::ServerTlsConfig;
pub use server::AppState;
pub use server::ArtifactStoreHandle;
pub use server::build_router;
pub use server::serve;
