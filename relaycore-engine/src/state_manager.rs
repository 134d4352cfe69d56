// relaycore-engine/src/state_manager.rs
// ============================================================================
// Module: Run State Manager
// Description: In-process reference implementation of `RunStateStore`.
// Purpose: Provide the sole writer of run lifecycle state, linearizing
// concurrent transitions per run behind a per-run lock.
// Dependencies: relaycore_core::{RunStateStore, Run, RunStatus,
// TransitionRecord, StoreError}, dashmap, tokio::sync::Mutex
// ============================================================================

//! ## Overview
//! `InMemoryStateManager` keeps one [`tokio::sync::Mutex`] per run inside a
//! [`DashMap`], so transitions against different runs never contend and
//! transitions against the same run always linearize — the invariant
//! [`RunStateStore::transition`] documents. A run's committed state and its
//! transition history are held in separate maps guarded by the same lock
//! ordering (history after state) so a reader never observes a transition
//! recorded without its corresponding state update.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use dashmap::DashMap;
use relaycore_core::Run;
use relaycore_core::RunId;
use relaycore_core::RunStateStore;
use relaycore_core::RunStatus;
use relaycore_core::StoreError;
use relaycore_core::TenantId;
use relaycore_core::Timestamp;
use relaycore_core::TransitionRecord;
use relaycore_core::run::ExecutionMode;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: State Manager
// ============================================================================

/// Per-run record: current state plus append-only transition history.
struct RunRecord {
    /// Lock serializing transitions against this run.
    lock: Mutex<()>,
    /// Current committed state, behind its own lock for cheap reads.
    state: std::sync::RwLock<Run>,
    /// Append-only transition history, behind the same read lock.
    history: std::sync::RwLock<Vec<TransitionRecord>>,
}

/// In-process, sole-writer implementation of [`RunStateStore`].
#[derive(Default)]
pub struct InMemoryStateManager {
    runs: DashMap<RunId, RunRecord>,
}

impl InMemoryStateManager {
    /// Constructs an empty state manager.
    #[must_use]
    pub fn new() -> Self {
        Self { runs: DashMap::new() }
    }

    fn now() -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Timestamp::UnixMillis(millis)
    }
}

#[async_trait]
impl RunStateStore for InMemoryStateManager {
    async fn create(&self, run: Run) -> Result<(), StoreError> {
        let run_id = run.run_id.clone();
        self.runs.insert(
            run_id,
            RunRecord { lock: Mutex::new(()), state: std::sync::RwLock::new(run), history: std::sync::RwLock::new(Vec::new()) },
        );
        Ok(())
    }

    async fn transition(&self, run_id: &RunId, to: RunStatus, reason: &str, actor: &str) -> Result<TransitionRecord, StoreError> {
        let record = self.runs.get(run_id).ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        let _guard = record.lock.lock().await;

        let from = {
            let state = record.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.status
        };
        if !RunStatus::is_allowed_transition(from, to) {
            return Err(StoreError::TransitionIllegal { run_id: run_id.clone(), from, to });
        }

        let at = Self::now();
        let transition = TransitionRecord { run_id: run_id.clone(), from, to, reason: reason.to_string(), at, actor: actor.to_string() };

        {
            let mut state = record.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.status = to;
            state.last_transitioned_at = at;
        }
        record.history.write().unwrap_or_else(std::sync::PoisonError::into_inner).push(transition.clone());

        Ok(transition)
    }

    async fn read(&self, run_id: &RunId) -> Result<Run, StoreError> {
        let record = self.runs.get(run_id).ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        let state = record.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.clone())
    }

    async fn list_by_tenant(&self, tenant_id: &TenantId, status_filter: Option<RunStatus>) -> Result<Vec<Run>, StoreError> {
        let mut matches = BTreeMap::new();
        for entry in &self.runs {
            let state = entry.value().state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            if &state.tenant_id != tenant_id {
                continue;
            }
            if let Some(filter) = status_filter {
                if state.status != filter {
                    continue;
                }
            }
            matches.insert(state.run_id.clone(), state.clone());
        }
        Ok(matches.into_values().collect())
    }

    async fn record_mode(&self, run_id: &RunId, mode: ExecutionMode) -> Result<(), StoreError> {
        let record = self.runs.get(run_id).ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        let _guard = record.lock.lock().await;
        let mut state = record.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.latest_mode = mode;
        Ok(())
    }
}
