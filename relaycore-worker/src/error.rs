// relaycore-worker/src/error.rs
// ============================================================================
// Module: Worker Errors
// Description: Error type for the Worker task loop.
// Purpose: Surface queue and trace-writer failures distinctly from role-step
// execution outcomes, which the loop handles inline via nack/ack.
// Dependencies: relaycore_queue::TaskQueueError
// ============================================================================

use relaycore_queue::TaskQueueError;
use thiserror::Error;

/// Errors raised by the Worker loop outside of role-step execution itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The Task Queue rejected an enqueue/dequeue/ack/nack call.
    #[error("task queue error: {0}")]
    Queue(#[from] TaskQueueError),
    /// The append-only trace writer could not be written to.
    #[error("worker trace io error: {0}")]
    Trace(String),
    /// No executor is registered for a dispatched task's role.
    #[error("no executor registered for role: {0}")]
    RoleNotRegistered(String),
}
