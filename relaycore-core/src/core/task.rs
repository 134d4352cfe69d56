// relaycore-core/src/core/task.rs
// ============================================================================
// Module: RelayCore Task
// Description: Task queue unit shape shared by the queue, workers, and the
// control plane.
// Purpose: Define the wire/persistence shape of one dispatchable work unit.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A `Task` is the unit the Task Queue schedules, a Worker executes, and the
//! Control Plane re-leases on worker death. State is monotonic except for the
//! `Leased -> Pending` transition on lease expiry or negative ack.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::LeaseId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::WorkerId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Priority
// ============================================================================

/// Scheduling priority class. Ordered so that `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Highest priority.
    Critical,
    /// High priority.
    High,
    /// Normal priority.
    Normal,
    /// Low priority.
    Low,
    /// Batch priority, most susceptible to aging-bonus promotion.
    Batch,
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Task lifecycle state.
///
/// # Invariants
/// - Monotonic except `Leased -> Pending` on lease expiry or negative ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Awaiting dequeue.
    Pending,
    /// Currently leased to a worker.
    Leased,
    /// Completed successfully.
    Succeeded,
    /// Completed with a terminal failure.
    Failed,
    /// Exhausted retry attempts; moved to the dead-letter list.
    Dead,
}

// ============================================================================
// SECTION: Task
// ============================================================================

/// A dispatchable unit of work: one plan-node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub task_id: TaskId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Run this task belongs to.
    pub run_id: RunId,
    /// Plan-node this task executes.
    pub node_id: NodeId,
    /// Opaque input payload for the role-step executor.
    pub payload: Value,
    /// Capability tags a worker must have to dequeue this task.
    pub required_capabilities: Vec<String>,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Current attempt count, starting at 0 before first lease.
    pub attempt: u32,
    /// Maximum attempts before moving to `Dead`.
    pub max_attempts: u32,
    /// Current lease holder, if leased.
    pub lease_holder: Option<WorkerId>,
    /// Current lease id, if leased.
    pub lease_id: Option<LeaseId>,
    /// Lease expiry timestamp, if leased.
    pub lease_expires_at: Option<Timestamp>,
    /// Current state.
    pub state: TaskState,
    /// Timestamp the task was enqueued.
    pub enqueued_at: Timestamp,
}

impl Task {
    /// Returns whether this task's required capabilities are a subset of the
    /// given worker capability set.
    #[must_use]
    pub fn dispatchable_to(&self, worker_capabilities: &[String]) -> bool {
        self.required_capabilities
            .iter()
            .all(|required| worker_capabilities.iter().any(|have| have == required))
    }

    /// Returns whether this task has exhausted its retry budget.
    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
