// relaycore-engine/src/registry.rs
// ============================================================================
// Module: Role Executor Registry
// Description: Maps a plan-node's role tag to the registered role-step
// executor.
// Purpose: Let the DAG Engine dispatch a node without knowing which crate
// or backend implements its role.
// Dependencies: relaycore_core::{RoleTag, RoleStepExecutor}
// ============================================================================

//! ## Overview
//! Exactly one executor is registered per [`RoleTag`]; a later registration
//! for the same tag replaces the earlier one. Looking up an unregistered
//! role is a caller error surfaced as `None`, which the DAG Engine maps to
//! [`crate::error::EngineError::RoleNotRegistered`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use relaycore_core::RoleStepExecutor;
use relaycore_core::RoleTag;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Role tag to executor lookup table, built once at startup.
#[derive(Default, Clone)]
pub struct RoleExecutorRegistry {
    executors: HashMap<RoleTag, Arc<dyn RoleStepExecutor>>,
}

impl RoleExecutorRegistry {
    /// Constructs an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { executors: HashMap::new() }
    }

    /// Registers `executor` for `role`, replacing any prior registration.
    pub fn register(&mut self, role: RoleTag, executor: Arc<dyn RoleStepExecutor>) {
        self.executors.insert(role, executor);
    }

    /// Looks up the executor registered for `role`.
    #[must_use]
    pub fn get(&self, role: RoleTag) -> Option<Arc<dyn RoleStepExecutor>> {
        self.executors.get(&role).cloned()
    }
}
