// relaycore-core/src/lib.rs
// ============================================================================
// Module: RelayCore Core Library
// Description: Public API surface for the RelayCore core crate.
// Purpose: Expose the canonical data model and the trait seams every other
// crate in the workspace implements against.
// Dependencies: crate::{core, interfaces, tooling}
// ============================================================================

//! ## Overview
//! `relaycore-core` is the shared vocabulary of the workspace: tenants,
//! runs, plans, step reports, governance decisions, tasks, and artifact
//! bundle types, plus the trait seams (`RunStateStore`, `ArtifactSink`/
//! `ArtifactReader`, `RoleStepExecutor`, `CostSignalProvider`) that
//! `relaycore-engine`, `relaycore-budget`, `relaycore-queue`,
//! `relaycore-worker`, and `relaycore-store-sqlite` implement against. This
//! crate owns no runtime behavior of its own beyond small, pure helpers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod tooling;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ArtifactError;
pub use interfaces::ArtifactReader;
pub use interfaces::ArtifactSink;
pub use interfaces::CostSignalError;
pub use interfaces::CostSignalProvider;
pub use interfaces::RoleStepError;
pub use interfaces::RoleStepExecutor;
pub use interfaces::RunStateStore;
pub use interfaces::StoreError;
pub use tooling::EndpointName;
