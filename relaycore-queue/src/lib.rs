// relaycore-queue/src/lib.rs
// ============================================================================
// Module: RelayCore Task Queue
// Description: Priority-ordered, lease-based queue of pending DAG-node work
// units, for both single-node and distributed deployment.
// Purpose: Public surface for the `TaskQueue` contract and its in-memory
// and Redis-backed implementations.
// Dependencies: relaycore-core, redis, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! RelayCore Task Queue implements spec.md §4.3's `enqueue`/`dequeue`/
//! `ack`/`nack`/`snapshot` contract: [`InMemoryTaskQueue`] for single-node
//! deployment, [`RedisTaskQueue`] for the horizontally-scaled path. Both
//! honor strict priority with a bounded aging bonus, lease invisibility,
//! and dead-letter overflow once a task's retry budget is exhausted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod distributed;
pub mod task_queue;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use distributed::RedisTaskQueue;
pub use task_queue::AckResult;
pub use task_queue::InMemoryTaskQueue;
pub use task_queue::LeasedTask;
pub use task_queue::QueueSnapshot;
pub use task_queue::TaskQueue;
pub use task_queue::TaskQueueError;
