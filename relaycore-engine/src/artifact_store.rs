// relaycore-engine/src/artifact_store.rs
// ============================================================================
// Module: In-Process Artifact Store
// Description: Reference implementation of `ArtifactSink`/`ArtifactReader`
// backed by one `BundleManifest` and an in-memory content map per run.
// Purpose: Give the DAG Engine and system tests a working artifact bundle
// without a durable backend.
// Dependencies: relaycore_core::{ArtifactSink, ArtifactReader, ArtifactError,
// BundleManifest, ArtifactEntry, ArtifactKind, hashing}, dashmap
// ============================================================================

//! ## Overview
//! Artifact content type is inferred from the path extension; anything this
//! store cannot classify is recorded as [`ArtifactKind::Custom`]. `write`
//! after `seal` fails with [`ArtifactError::Sealed`] per the sink's
//! invariant; `seal` is otherwise idempotent through
//! [`relaycore_core::BundleManifest::seal`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use dashmap::DashMap;
use relaycore_core::ArtifactEntry;
use relaycore_core::ArtifactError;
use relaycore_core::ArtifactKind;
use relaycore_core::ArtifactReader;
use relaycore_core::ArtifactSink;
use relaycore_core::BundleManifest;
use relaycore_core::RunId;
use relaycore_core::TenantId;
use relaycore_core::Timestamp;
use relaycore_core::hashing::DEFAULT_HASH_ALGORITHM;
use relaycore_core::hashing::hash_bytes;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Per-run bundle state: manifest plus raw content keyed by path.
struct BundleState {
    manifest: BundleManifest,
    content: BTreeMap<String, Vec<u8>>,
}

/// In-process artifact store, one bundle per run.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    bundles: DashMap<RunId, Mutex<BundleState>>,
}

impl InMemoryArtifactStore {
    /// Constructs an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { bundles: DashMap::new() }
    }

    /// Registers an empty bundle for `run_id`, ready to accept writes.
    pub fn open_bundle(&self, tenant_id: TenantId, run_id: RunId) {
        let manifest = BundleManifest::new(tenant_id, run_id.clone(), Self::now());
        self.bundles.insert(run_id, Mutex::new(BundleState { manifest, content: BTreeMap::new() }));
    }

    fn now() -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Timestamp::UnixMillis(millis)
    }

    fn infer_kind(path: &str) -> ArtifactKind {
        if path.starts_with("spec/") {
            ArtifactKind::Spec
        } else if path.starts_with("plan/") {
            ArtifactKind::Plan
        } else if path.starts_with("plan_history/") {
            ArtifactKind::PlanHistory
        } else if path.starts_with("reports/") {
            ArtifactKind::StepReport
        } else if path.starts_with("governance/") {
            ArtifactKind::GovernanceDecision
        } else if path.starts_with("cost_ledger") {
            ArtifactKind::CostLedger
        } else if path.starts_with("events") {
            ArtifactKind::EventLog
        } else if path == "manifest.json" {
            ArtifactKind::Manifest
        } else {
            ArtifactKind::Custom
        }
    }
}

#[async_trait]
impl ArtifactSink for InMemoryArtifactStore {
    async fn write(&self, run_id: &RunId, path: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let bundle = self.bundles.get(run_id).ok_or_else(|| ArtifactError::Io(format!("no open bundle for run {run_id}")))?;
        let mut state = bundle.lock().await;
        if state.manifest.sealed {
            return Err(ArtifactError::Sealed(run_id.clone()));
        }
        let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, bytes);
        let entry = ArtifactEntry {
            path: path.to_string(),
            kind: Self::infer_kind(path),
            content_type: None,
            hash,
            size_bytes: bytes.len() as u64,
        };
        state.content.insert(path.to_string(), bytes.to_vec());
        state.manifest.append(entry);
        Ok(())
    }

    async fn seal(&self, run_id: &RunId) -> Result<(), ArtifactError> {
        let bundle = self.bundles.get(run_id).ok_or_else(|| ArtifactError::Io(format!("no open bundle for run {run_id}")))?;
        let mut state = bundle.lock().await;
        state.manifest.seal(DEFAULT_HASH_ALGORITHM);
        Ok(())
    }
}

#[async_trait]
impl ArtifactReader for InMemoryArtifactStore {
    async fn read(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>, ArtifactError> {
        let bundle = self.bundles.get(run_id).ok_or_else(|| ArtifactError::NotFound(path.to_string()))?;
        let state = bundle.lock().await;
        state.content.get(path).cloned().ok_or_else(|| ArtifactError::NotFound(path.to_string()))
    }

    async fn list(&self, run_id: &RunId) -> Result<Vec<String>, ArtifactError> {
        let bundle = self.bundles.get(run_id).ok_or_else(|| ArtifactError::Io(format!("no open bundle for run {run_id}")))?;
        let state = bundle.lock().await;
        Ok(state.manifest.entries.iter().map(|entry| entry.path.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new("r1");
        store.open_bundle(TenantId::new("t1"), run_id.clone());
        store.write(&run_id, "reports/0/n1.json", b"{}").await.expect("write");
        let bytes = store.read(&run_id, "reports/0/n1.json").await.expect("read");
        assert_eq!(bytes, b"{}".to_vec());
    }

    #[tokio::test]
    async fn write_after_seal_is_rejected() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new("r1");
        store.open_bundle(TenantId::new("t1"), run_id.clone());
        store.seal(&run_id).await.expect("seal");
        let err = store.write(&run_id, "reports/0/n1.json", b"{}").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Sealed(_)));
    }

    #[tokio::test]
    async fn list_reflects_every_written_path() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new("r1");
        store.open_bundle(TenantId::new("t1"), run_id.clone());
        store.write(&run_id, "spec/submission.json", b"{}").await.expect("write");
        store.write(&run_id, "reports/0/n1.json", b"{}").await.expect("write");
        let mut paths = store.list(&run_id).await.expect("list");
        paths.sort();
        assert_eq!(paths, vec!["reports/0/n1.json".to_string(), "spec/submission.json".to_string()]);
    }

    #[tokio::test]
    async fn read_missing_path_fails_not_found() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new("r1");
        store.open_bundle(TenantId::new("t1"), run_id.clone());
        let err = store.read(&run_id, "missing.json").await.unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }
}
