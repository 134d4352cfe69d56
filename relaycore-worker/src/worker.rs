// relaycore-worker/src/worker.rs
// ============================================================================
// Module: Worker Loop
// Description: Dequeue, execute, and acknowledge role-step tasks against a
// Task Queue, dispatching by role tag through a shared executor registry.
// Purpose: The distributed-deployment execution unit: a worker is one
// process polling one queue for work it declares capability for.
// Dependencies: relaycore_queue::TaskQueue, relaycore_engine::RoleExecutorRegistry,
// relaycore_core::{RoleStepExecutor, RoleStepError}, tokio::time
// ============================================================================

//! ## Overview
//! [`Worker::run_once`] implements one iteration of spec.md §4.4's loop:
//! `dequeue` (bounded-wait), `execute_with_timeout`, `ack`/`nack`, trace.
//! [`Worker::run`] loops this until cancelled via the supplied
//! [`tokio_util`]-free cancellation token (a plain `tokio::sync::Notify`,
//! matching the rest of the workspace's preference for primitive
//! synchronization over an extra dependency). A dispatched [`Task`]'s
//! `payload` carries a serialized [`WorkerDispatch`] — the [`RunContext`]
//! and [`PlanNode`] the role-step executor needs — because a worker may run
//! in a separate process from the DAG Engine and cannot share in-process
//! state with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use relaycore_core::PlanNode;
use relaycore_core::RoleStepError;
use relaycore_core::RunContext;
use relaycore_core::WorkerId;
use relaycore_engine::RoleExecutorRegistry;
use relaycore_queue::AckResult;
use relaycore_queue::TaskQueue;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::trace::TraceRecord;
use crate::trace::WorkerTrace;

// ============================================================================
// SECTION: Dispatch Payload
// ============================================================================

/// Self-contained payload a [`relaycore_queue::Task`] carries so a worker in
/// a separate process can execute it without shared in-process run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDispatch {
    /// Run context the role-step executor evaluates against.
    pub context: RunContext,
    /// Plan node being executed.
    pub node: PlanNode,
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// One polling worker process.
pub struct Worker {
    /// Stable identity for this worker, used for trace file naming and
    /// (by the Control Plane, one layer up) heartbeat/lease bookkeeping.
    worker_id: WorkerId,
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    registry: Arc<RoleExecutorRegistry>,
    trace: WorkerTrace,
    shutdown: Notify,
}

impl Worker {
    /// Constructs a worker polling `queue`, dispatching via `registry`,
    /// writing its trace under `trace_directory`.
    #[must_use]
    pub fn new(
        worker_id: WorkerId,
        config: WorkerConfig,
        queue: Arc<dyn TaskQueue>,
        registry: Arc<RoleExecutorRegistry>,
        trace_directory: &std::path::Path,
    ) -> Self {
        let trace = WorkerTrace::new(trace_directory, worker_id.as_str());
        Self { worker_id, config, queue, registry, trace, shutdown: Notify::new() }
    }

    /// This worker's stable identity.
    #[must_use]
    pub const fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Signals [`Worker::run`] to stop after its current iteration.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Runs the dequeue/execute/ack loop until [`Worker::request_shutdown`]
    /// is called, sleeping briefly between empty dequeues to avoid a busy
    /// spin.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the Task Queue itself fails (not when an
    /// individual task's execution fails — that is handled via nack).
    pub async fn run(&self) -> Result<(), WorkerError> {
        loop {
            tokio::select! {
                () = self.shutdown.notified() => return Ok(()),
                ran = self.run_once() => {
                    if !ran? {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        }
    }

    /// Executes one dequeue-and-resolve cycle. Returns `true` if a task was
    /// dequeued (regardless of its execution outcome), `false` if the queue
    /// was empty.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Queue`] on a Task Queue durability failure.
    pub async fn run_once(&self) -> Result<bool, WorkerError> {
        let lease_duration = Duration::from_millis(self.config.heartbeat_interval_millis * 4);
        let Some(leased) = self.queue.dequeue(&self.config.capabilities, lease_duration).await? else {
            return Ok(false);
        };

        let task = leased.task;
        let lease_id = leased.lease_id;
        let started = Instant::now();

        let dispatch: Result<WorkerDispatch, WorkerError> = serde_json::from_value(task.payload.clone())
            .map_err(|err| WorkerError::Trace(format!("malformed dispatch payload: {err}")));

        let outcome = match dispatch {
            Ok(dispatch) => self.execute_dispatch(&dispatch).await,
            Err(err) => Err(RoleStepError::Permanent(err.to_string())),
        };

        let duration_millis = started.elapsed().as_millis();

        match outcome {
            Ok(()) => {
                self.queue.ack(&lease_id, AckResult::Succeeded).await?;
                self.trace
                    .record(&TraceRecord {
                        task_id: &task.task_id,
                        lease_id: &lease_id,
                        node_id: &task.node_id,
                        attempt: task.attempt,
                        outcome: "succeeded",
                        duration_millis,
                        detail: None,
                    })
                    .await?;
                info!(task_id = %task.task_id, "task succeeded");
            }
            Err(role_error) => {
                let retry = role_error.is_retryable() && !task.attempts_exhausted();
                let reason = role_error.to_string();
                self.queue.nack(&lease_id, &reason, retry).await?;
                self.trace
                    .record(&TraceRecord {
                        task_id: &task.task_id,
                        lease_id: &lease_id,
                        node_id: &task.node_id,
                        attempt: task.attempt,
                        outcome: if retry { "nacked" } else { "failed" },
                        duration_millis,
                        detail: Some(&reason),
                    })
                    .await?;
                if retry {
                    warn!(task_id = %task.task_id, reason = %reason, "task nacked, will retry");
                } else {
                    error!(task_id = %task.task_id, reason = %reason, "task failed permanently");
                }
            }
        }

        Ok(true)
    }

    /// Looks up the registered executor for the dispatched node's role and
    /// runs it under a bounded timeout.
    async fn execute_dispatch(&self, dispatch: &WorkerDispatch) -> Result<(), RoleStepError> {
        let executor = self.registry.get(dispatch.node.role).ok_or_else(|| {
            RoleStepError::Permanent(format!("no executor registered for role {:?}", dispatch.node.role))
        })?;

        let timeout = Duration::from_millis(self.config.default_task_timeout_millis);
        match tokio::time::timeout(timeout, executor.execute(&dispatch.context, &dispatch.node, timeout)).await {
            Ok(Ok(_report)) => Ok(()),
            Ok(Err(role_error)) => Err(role_error),
            Err(_elapsed) => Err(RoleStepError::Timeout(timeout)),
        }
    }
}
