// relaycore-control-plane/src/error.rs
// ============================================================================
// Module: Control Plane Errors
// Description: Error type for worker registration, heartbeat, and lease
// bookkeeping operations.
// Dependencies: relaycore_queue::TaskQueueError
// ============================================================================

use relaycore_core::WorkerId;
use relaycore_queue::TaskQueueError;
use thiserror::Error;

/// Errors raised by the Control Plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// A heartbeat or lease operation named a worker that was never
    /// registered.
    #[error("worker not registered: {0}")]
    WorkerNotRegistered(WorkerId),
    /// Re-leasing a dead worker's tasks failed against the Task Queue.
    #[error("task queue error during dead-worker recovery: {0}")]
    Queue(#[from] TaskQueueError),
}
