// relaycore-core/src/core/artifact.rs
// ============================================================================
// Module: RelayCore Artifact Bundle
// Description: Artifact bundle manifest schema and integrity metadata.
// Purpose: Provide the canonical, content-hashed index of everything a run
// produces.
// Dependencies: crate::core::{hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The artifact bundle is append-only during a run and sealed (content hash
//! computed, manifest closed) at terminal state. The manifest hash covers
//! every referenced artifact and nothing else.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::RunId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Artifact Kind
// ============================================================================

/// Kinds of artifacts indexed by a bundle manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Submission spec snapshot.
    Spec,
    /// Chosen plan snapshot.
    Plan,
    /// Plan-switch history log.
    PlanHistory,
    /// Per-stage, per-node step report.
    StepReport,
    /// Per-checkpoint governance decision.
    GovernanceDecision,
    /// Cumulative cost ledger.
    CostLedger,
    /// Chronological event log.
    EventLog,
    /// The manifest itself.
    Manifest,
    /// Custom/implementer-defined artifact.
    Custom,
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// One artifact entry indexed by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Bundle-relative path.
    pub path: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Content type, when applicable.
    pub content_type: Option<String>,
    /// Content hash.
    pub hash: HashDigest,
    /// Byte length of the artifact content.
    pub size_bytes: u64,
}

/// Bundle integrity metadata computed at sealing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleIntegrity {
    /// Hash algorithm used across the bundle.
    pub hash_algorithm: HashAlgorithm,
    /// Hash covering the concatenation of every entry's hash, in manifest
    /// order — the invariant `manifest.hash = hash(concat(files))`.
    pub bundle_hash: HashDigest,
}

/// Manifest enumerating every artifact in a run's bundle.
///
/// # Invariants
/// - Covers every referenced artifact and nothing else.
/// - `integrity` is only present once the bundle is sealed at terminal run
///   state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Tenant owning the run.
    pub tenant_id: TenantId,
    /// Run identifier.
    pub run_id: RunId,
    /// Timestamp the manifest was last written.
    pub generated_at: Timestamp,
    /// Whether the bundle has been sealed (append-only window closed).
    pub sealed: bool,
    /// Indexed artifact entries.
    pub entries: Vec<ArtifactEntry>,
    /// Integrity metadata, present only once sealed.
    pub integrity: Option<BundleIntegrity>,
}

impl BundleManifest {
    /// Creates a new, unsealed manifest with no entries.
    #[must_use]
    pub fn new(tenant_id: TenantId, run_id: RunId, generated_at: Timestamp) -> Self {
        Self {
            tenant_id,
            run_id,
            generated_at,
            sealed: false,
            entries: Vec::new(),
            integrity: None,
        }
    }

    /// Appends an artifact entry. No-op once sealed; callers must check
    /// `sealed` before attempting to append.
    pub fn append(&mut self, entry: ArtifactEntry) {
        if !self.sealed {
            self.entries.push(entry);
        }
    }

    /// Seals the manifest, computing the bundle hash over the concatenation
    /// of every entry's content hash value, in manifest order.
    pub fn seal(&mut self, hash_algorithm: HashAlgorithm) {
        if self.sealed {
            return;
        }
        let mut concatenated = String::new();
        for entry in &self.entries {
            concatenated.push_str(&entry.hash.value);
        }
        let bundle_hash = crate::core::hashing::hash_bytes(hash_algorithm, concatenated.as_bytes());
        self.integrity = Some(BundleIntegrity {
            hash_algorithm,
            bundle_hash,
        });
        self.sealed = true;
    }
}
