// relaycore-worker/src/trace.rs
// ============================================================================
// Module: Worker Trace Writer
// Description: Append-only JSONL trace of task executions for one worker.
// Purpose: Emit one line per task execution (start, outcome, duration) to
// worker_<id>.jsonl, reusing the workspace's JSON-everywhere logging
// convention rather than a bespoke binary format.
// Dependencies: serde_json, tokio::fs
// ============================================================================

//! ## Overview
//! `WorkerTrace` hand-rolls an append-only file writer rather than layering
//! `tracing-appender`'s rolling file appender onto a JSON formatter: the
//! workspace does not carry `tracing-appender` as a dependency, and a single
//! worker process writes exactly one trace file for its own lifetime, so
//! rotation is unneeded. The write path follows the same direct-file-append
//! style `relaycore-engine::artifact_store` uses for bundle writes. Each
//! line is still a self-contained JSON object, preserving the "JSON
//! everywhere" convention the rest of the workspace uses for structured
//! records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use relaycore_core::LeaseId;
use relaycore_core::NodeId;
use relaycore_core::TaskId;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::WorkerError;

// ============================================================================
// SECTION: Record Shape
// ============================================================================

/// One line of a worker's execution trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord<'a> {
    /// Task being executed.
    pub task_id: &'a TaskId,
    /// Lease under which the task is being executed.
    pub lease_id: &'a LeaseId,
    /// Plan node the task executes.
    pub node_id: &'a NodeId,
    /// Attempt number for this task.
    pub attempt: u32,
    /// Outcome label: `"succeeded"`, `"failed"`, `"nacked"`.
    pub outcome: &'a str,
    /// Wall-clock duration of the execution attempt, in milliseconds.
    pub duration_millis: u128,
    /// Human-readable detail, present on failure.
    pub detail: Option<&'a str>,
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Append-only JSONL trace writer for a single worker process.
pub struct WorkerTrace {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl WorkerTrace {
    /// Creates a trace writer at `directory/worker_<id>.jsonl`. The file is
    /// opened lazily on the first write.
    #[must_use]
    pub fn new(directory: &Path, worker_id: &str) -> Self {
        Self { path: directory.join(format!("worker_{worker_id}.jsonl")), file: Mutex::new(None) }
    }

    /// Appends one JSON line for `record`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Trace`] when the file cannot be opened or
    /// written to.
    pub async fn record(&self, record: &TraceRecord<'_>) -> Result<(), WorkerError> {
        let mut line = serde_json::to_vec(record).map_err(|err| WorkerError::Trace(err.to_string()))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|err| WorkerError::Trace(err.to_string()))?;
            *guard = Some(file);
        }
        let file = guard.as_mut().expect("file opened above");
        file.write_all(&line).await.map_err(|err| WorkerError::Trace(err.to_string()))?;
        file.flush().await.map_err(|err| WorkerError::Trace(err.to_string()))
    }
}
