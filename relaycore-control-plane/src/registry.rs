// relaycore-control-plane/src/registry.rs
// ============================================================================
// Module: Worker Registry and Dead-Worker Recovery
// Description: Tracks registered workers, their capabilities/capacity, last
// heartbeat, and active leases; sweeps dead workers and re-leases their
// in-flight tasks.
// Purpose: Implement spec.md §4.9's registration/heartbeat/dead-worker
// recovery contract at the layer above the Task Queue, since
// `TaskQueue::dequeue` does not itself record a calling worker's identity.
// Dependencies: relaycore_core::WorkerId, relaycore_queue::TaskQueue, tokio
// ============================================================================

//! ## Overview
//! The Task Queue's `dequeue` contract (spec.md §4.3, matched verbatim by
//! [`relaycore_queue::TaskQueue`]) takes no worker-id parameter, so it cannot
//! itself record which worker holds a lease. [`ControlPlane`] closes that
//! gap one layer up: a worker calls [`ControlPlane::record_lease`] right
//! after a successful dequeue and [`ControlPlane::release_lease`] after
//! ack/nack, giving the sweeper enough bookkeeping to re-lease a dead
//! worker's in-flight tasks via `nack(..., retry = true)` without any change
//! to the Task Queue trait itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use relaycore_core::LeaseId;
use relaycore_core::TaskId;
use relaycore_core::WorkerId;
use relaycore_queue::TaskQueue;
use tracing::info;
use tracing::warn;

use crate::config::ControlPlaneConfig;
use crate::error::ControlPlaneError;

// ============================================================================
// SECTION: Worker Record
// ============================================================================

/// Registered worker state tracked by the Control Plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    /// Capability tags this worker declared at registration.
    pub capabilities: Vec<String>,
    /// Maximum concurrent task count this worker declared.
    pub max_concurrent_tasks: u32,
    /// Last heartbeat receipt time, in Unix milliseconds.
    pub last_heartbeat_millis: i64,
    /// Leases currently held by this worker, tracked so they can be
    /// released back to the queue if the worker is declared dead.
    pub active_leases: BTreeSet<LeaseId>,
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Worker registry, heartbeat tracker, and dead-worker recovery sweeper.
pub struct ControlPlane {
    config: ControlPlaneConfig,
    workers: Mutex<BTreeMap<WorkerId, WorkerRecord>>,
    queue: Arc<dyn TaskQueue>,
}

impl ControlPlane {
    /// Constructs a Control Plane over `queue`.
    #[must_use]
    pub fn new(config: ControlPlaneConfig, queue: Arc<dyn TaskQueue>) -> Self {
        Self { config, workers: Mutex::new(BTreeMap::new()), queue }
    }

    fn now_millis() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    /// Registers `worker_id` with the given capabilities and capacity.
    /// Idempotent: re-registering an already-known worker updates its
    /// capabilities/capacity in place rather than erroring, and refreshes
    /// its heartbeat.
    pub fn register(&self, worker_id: WorkerId, capabilities: Vec<String>, max_concurrent_tasks: u32) {
        let mut workers = self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Self::now_millis();
        workers
            .entry(worker_id.clone())
            .and_modify(|record| {
                record.capabilities.clone_from(&capabilities);
                record.max_concurrent_tasks = max_concurrent_tasks;
                record.last_heartbeat_millis = now;
            })
            .or_insert_with(|| WorkerRecord {
                capabilities,
                max_concurrent_tasks,
                last_heartbeat_millis: now,
                active_leases: BTreeSet::new(),
            });
        info!(%worker_id, "worker registered");
    }

    /// Records a heartbeat from `worker_id`. Heartbeat processing is a
    /// single timestamp update and never blocks on other workers' state.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::WorkerNotRegistered`] if the worker was
    /// never registered (or was already swept as dead).
    pub fn heartbeat(&self, worker_id: &WorkerId) -> Result<(), ControlPlaneError> {
        let mut workers = self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = workers.get_mut(worker_id).ok_or_else(|| ControlPlaneError::WorkerNotRegistered(worker_id.clone()))?;
        record.last_heartbeat_millis = Self::now_millis();
        Ok(())
    }

    /// Records that `worker_id` now holds `lease_id`, so it can be released
    /// back to the queue on dead-worker recovery.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::WorkerNotRegistered`] if the worker was
    /// never registered.
    pub fn record_lease(&self, worker_id: &WorkerId, lease_id: LeaseId) -> Result<(), ControlPlaneError> {
        let mut workers = self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = workers.get_mut(worker_id).ok_or_else(|| ControlPlaneError::WorkerNotRegistered(worker_id.clone()))?;
        record.active_leases.insert(lease_id);
        Ok(())
    }

    /// Records that `worker_id` has resolved `lease_id` (via ack or nack),
    /// so it is no longer tracked for dead-worker recovery.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::WorkerNotRegistered`] if the worker was
    /// never registered.
    pub fn release_lease(&self, worker_id: &WorkerId, lease_id: &LeaseId) -> Result<(), ControlPlaneError> {
        let mut workers = self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = workers.get_mut(worker_id).ok_or_else(|| ControlPlaneError::WorkerNotRegistered(worker_id.clone()))?;
        record.active_leases.remove(lease_id);
        Ok(())
    }

    /// Returns the worker ids currently considered registered.
    #[must_use]
    pub fn registered_workers(&self) -> Vec<WorkerId> {
        self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).keys().cloned().collect()
    }

    /// Scans for workers whose last heartbeat is older than the configured
    /// timeout, removes them from the registry, and re-leases each of their
    /// tracked active leases back to the queue with `retry = true`. Returns
    /// the ids of workers declared dead this sweep.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Queue`] if a re-lease `nack` call fails;
    /// the worker is still removed from the registry in that case.
    pub async fn sweep_dead_workers(&self) -> Result<Vec<WorkerId>, ControlPlaneError> {
        let now = Self::now_millis();
        let timeout = i64::try_from(self.config.heartbeat_timeout_millis).unwrap_or(i64::MAX);

        let dead: Vec<(WorkerId, WorkerRecord)> = {
            let mut workers = self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let dead_ids: Vec<WorkerId> = workers
                .iter()
                .filter(|(_, record)| now - record.last_heartbeat_millis >= timeout)
                .map(|(id, _)| id.clone())
                .collect();
            dead_ids.into_iter().filter_map(|id| workers.remove(&id).map(|record| (id, record))).collect()
        };

        let mut dead_ids = Vec::with_capacity(dead.len());
        for (worker_id, record) in dead {
            warn!(%worker_id, leases = record.active_leases.len(), "worker declared dead, re-leasing its tasks");
            for lease_id in &record.active_leases {
                self.queue.nack(lease_id, "worker dead", true).await?;
            }
            dead_ids.push(worker_id);
        }
        Ok(dead_ids)
    }

    /// Returns the task ids a dead worker's active leases correspond to, for
    /// observability. Present as a pure read so tests and callers can assert
    /// on sweep behavior without re-deriving it from the queue snapshot.
    #[must_use]
    pub fn active_lease_ids(&self, worker_id: &WorkerId) -> BTreeSet<LeaseId> {
        self.workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(worker_id)
            .map(|record| record.active_leases.clone())
            .unwrap_or_default()
    }

    /// Runs [`ControlPlane::sweep_dead_workers`] on an interval until
    /// cancelled. Intended to be spawned as its own `tokio` task.
    pub async fn run_sweeper(&self) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.sweep_interval_millis));
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep_dead_workers().await {
                warn!(error = %err, "dead-worker sweep encountered a queue error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]
    use std::time::Duration as StdDuration;

    use relaycore_core::NodeId;
    use relaycore_core::RunId;
    use relaycore_core::Task;
    use relaycore_core::TaskPriority;
    use relaycore_core::TaskState;
    use relaycore_core::TenantId;
    use relaycore_core::Timestamp;
    use relaycore_queue::InMemoryTaskQueue;

    use super::*;

    fn test_config() -> ControlPlaneConfig {
        ControlPlaneConfig { heartbeat_interval_millis: 10, heartbeat_timeout_millis: 20, sweep_interval_millis: 10 }
    }

    fn sample_task() -> Task {
        Task {
            task_id: TaskId::new("task-1"),
            tenant_id: TenantId::new("t1"),
            run_id: RunId::new("r1"),
            node_id: NodeId::new("n1"),
            payload: serde_json::Value::Null,
            required_capabilities: vec!["data".to_string()],
            priority: TaskPriority::Normal,
            attempt: 0,
            max_attempts: 3,
            lease_holder: None,
            lease_id: None,
            lease_expires_at: None,
            state: TaskState::Pending,
            enqueued_at: Timestamp::UnixMillis(0),
        }
    }

    #[test]
    fn registration_is_idempotent_and_updates_in_place() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let plane = ControlPlane::new(test_config(), queue);
        let worker_id = WorkerId::new("w1");
        plane.register(worker_id.clone(), vec!["data".to_string()], 2);
        plane.register(worker_id.clone(), vec!["data".to_string(), "cost".to_string()], 4);
        assert_eq!(plane.registered_workers(), vec![worker_id]);
    }

    #[tokio::test]
    async fn dead_worker_releases_its_active_leases_back_to_the_queue() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        queue.enqueue(sample_task()).await;
        let leased = queue.dequeue(&["data".to_string()], StdDuration::from_secs(60)).await.unwrap().unwrap();

        let plane = ControlPlane::new(test_config(), queue.clone());
        let worker_id = WorkerId::new("w1");
        plane.register(worker_id.clone(), vec!["data".to_string()], 1);
        plane.record_lease(&worker_id, leased.lease_id.clone()).unwrap();

        tokio::time::sleep(StdDuration::from_millis(25)).await;
        let dead = plane.sweep_dead_workers().await.unwrap();
        assert_eq!(dead, vec![worker_id]);

        let snapshot = queue.snapshot().await;
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(snapshot.pending[0].attempt, 2);
    }

    #[tokio::test]
    async fn heartbeat_keeps_a_worker_alive() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let plane = ControlPlane::new(test_config(), queue);
        let worker_id = WorkerId::new("w1");
        plane.register(worker_id.clone(), vec!["data".to_string()], 1);
        plane.heartbeat(&worker_id).unwrap();
        let dead = plane.sweep_dead_workers().await.unwrap();
        assert!(dead.is_empty());
    }

    #[test]
    fn heartbeat_on_unregistered_worker_errors() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let plane = ControlPlane::new(test_config(), queue);
        let err = plane.heartbeat(&WorkerId::new("ghost")).unwrap_err();
        assert!(matches!(err, ControlPlaneError::WorkerNotRegistered(_)));
    }
}
