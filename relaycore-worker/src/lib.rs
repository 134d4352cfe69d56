// relaycore-worker/src/lib.rs
// ============================================================================
// Module: RelayCore Worker
// Description: The distributed-deployment execution unit that dequeues,
// executes, and resolves role-step tasks against a Task Queue.
// Purpose: Public surface for the Worker loop, its configuration, errors,
// and execution trace writer.
// Dependencies: relaycore-core, relaycore-engine, relaycore-queue, tokio
// ============================================================================

//! ## Overview
//! RelayCore Worker is the process that polls a [`relaycore_queue::TaskQueue`]
//! for dispatchable work, runs the registered [`relaycore_core::RoleStepExecutor`]
//! for each task's role, and acknowledges the outcome back to the queue. It
//! mirrors a single node's execution capability: the Control Plane layer
//! tracks which worker holds which lease so a dead worker's in-flight tasks
//! can be re-leased, since the Task Queue's `dequeue` contract does not
//! itself record a calling worker's identity.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod trace;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::RawWorkerConfig;
pub use config::WorkerConfig;
pub use config::WorkerConfigError;
pub use error::WorkerError;
pub use trace::TraceRecord;
pub use trace::WorkerTrace;
pub use worker::Worker;
pub use worker::WorkerDispatch;
