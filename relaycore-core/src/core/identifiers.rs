// relaycore-core/src/core/identifiers.rs
// ============================================================================
// Module: RelayCore Identifiers
// Description: Canonical opaque identifiers for tenants, runs, plans, and tasks.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! RelayCore. Identifiers are opaque and serialize as strings. Validation is
//! handled at submission or runtime boundaries rather than within these simple
//! wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

id_type!(TenantId, "Tenant identifier, globally unique.");
id_type!(RunId, "Run identifier, globally unique and monotonic-sortable.");
id_type!(PlanId, "Plan identifier (one per plan version within a run).");
id_type!(NodeId, "Plan-node identifier, unique within a plan.");
id_type!(StageId, "Stage identifier, the topological rank a node belongs to.");
id_type!(TaskId, "Task queue unit identifier.");
id_type!(LeaseId, "Lease identifier issued to a worker for a dequeued task.");
id_type!(CheckpointId, "Governance checkpoint identifier, one per stage boundary.");
id_type!(DecisionId, "Governance decision identifier.");
id_type!(WorkerId, "Worker identifier, stable across the worker's process lifetime.");
id_type!(CorrelationId, "Correlation identifier threaded through logs for one submission.");
id_type!(AdmissionToken, "Opaque, one-time admission token issued by the Budget Controller.");
