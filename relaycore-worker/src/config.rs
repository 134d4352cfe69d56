// relaycore-worker/src/config.rs
// ============================================================================
// Module: Worker Configuration
// Description: Typed, fail-closed configuration for the Worker loop.
// Purpose: Provide validated worker tunables: capability set, max concurrent
// task count, per-task default timeout, heartbeat interval.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `WorkerConfig` is constructed via [`WorkerConfig::validate`] rather than
//! used directly from raw deserialization, matching the fail-closed
//! configuration posture used by `relaycore-engine::config`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum allowed concurrent task count for one worker.
pub const MIN_MAX_CONCURRENT_TASKS: u32 = 1;
/// Maximum allowed concurrent task count for one worker.
pub const MAX_MAX_CONCURRENT_TASKS: u32 = 1024;
/// Default maximum concurrent task count.
pub const DEFAULT_MAX_CONCURRENT_TASKS: u32 = 4;

/// Default per-task deadline, in milliseconds, when a task does not declare
/// its own timeout.
pub const DEFAULT_TASK_TIMEOUT_MILLIS: u64 = 300_000;

/// Default heartbeat interval, in milliseconds (spec.md §4.4: 15s).
pub const DEFAULT_HEARTBEAT_INTERVAL_MILLIS: u64 = 15_000;

/// Maximum retry attempts for an `Unknown`-categorized error before it is
/// treated as permanent (spec.md §4.4 "unknown: nack with retry up to a low
/// bound").
pub const DEFAULT_UNKNOWN_ERROR_RETRY_BOUND: u32 = 2;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised validating a [`WorkerConfig`].
#[derive(Debug, Error)]
pub enum WorkerConfigError {
    /// `max_concurrent_tasks` fell outside the allowed range.
    #[error("max_concurrent_tasks {0} out of range [{MIN_MAX_CONCURRENT_TASKS}, {MAX_MAX_CONCURRENT_TASKS}]")]
    MaxConcurrentTasksOutOfRange(u32),
    /// `capabilities` was empty; a worker with no capabilities can never be
    /// dispatched any task.
    #[error("worker must declare at least one capability")]
    NoCapabilities,
    /// `default_task_timeout_millis` was zero.
    #[error("default_task_timeout_millis must be greater than zero")]
    ZeroTaskTimeout,
    /// `heartbeat_interval_millis` was zero.
    #[error("heartbeat_interval_millis must be greater than zero")]
    ZeroHeartbeatInterval,
}

// ============================================================================
// SECTION: Raw Config
// ============================================================================

/// Raw, unvalidated configuration as deserialized from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWorkerConfig {
    /// Capability tags this worker can execute.
    pub capabilities: Vec<String>,
    /// Maximum number of tasks this worker executes concurrently.
    pub max_concurrent_tasks: u32,
    /// Default per-task timeout, used when a task's own timeout is absent.
    pub default_task_timeout_millis: u64,
    /// Heartbeat send interval.
    pub heartbeat_interval_millis: u64,
    /// Retry bound for `Unknown`-categorized errors.
    pub unknown_error_retry_bound: u32,
}

impl Default for RawWorkerConfig {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            default_task_timeout_millis: DEFAULT_TASK_TIMEOUT_MILLIS,
            heartbeat_interval_millis: DEFAULT_HEARTBEAT_INTERVAL_MILLIS,
            unknown_error_retry_bound: DEFAULT_UNKNOWN_ERROR_RETRY_BOUND,
        }
    }
}

// ============================================================================
// SECTION: Validated Config
// ============================================================================

/// Validated worker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Capability tags this worker can execute.
    pub capabilities: Vec<String>,
    /// Maximum number of tasks this worker executes concurrently.
    pub max_concurrent_tasks: u32,
    /// Default per-task timeout, used when a task's own timeout is absent.
    pub default_task_timeout_millis: u64,
    /// Heartbeat send interval.
    pub heartbeat_interval_millis: u64,
    /// Retry bound for `Unknown`-categorized errors.
    pub unknown_error_retry_bound: u32,
}

impl WorkerConfig {
    /// Validates `raw`, returning a usable configuration or the first
    /// validation failure encountered.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerConfigError`] when any field is out of range.
    pub fn validate(raw: RawWorkerConfig) -> Result<Self, WorkerConfigError> {
        if raw.capabilities.is_empty() {
            return Err(WorkerConfigError::NoCapabilities);
        }
        if !(MIN_MAX_CONCURRENT_TASKS..=MAX_MAX_CONCURRENT_TASKS).contains(&raw.max_concurrent_tasks) {
            return Err(WorkerConfigError::MaxConcurrentTasksOutOfRange(raw.max_concurrent_tasks));
        }
        if raw.default_task_timeout_millis == 0 {
            return Err(WorkerConfigError::ZeroTaskTimeout);
        }
        if raw.heartbeat_interval_millis == 0 {
            return Err(WorkerConfigError::ZeroHeartbeatInterval);
        }
        Ok(Self {
            capabilities: raw.capabilities,
            max_concurrent_tasks: raw.max_concurrent_tasks,
            default_task_timeout_millis: raw.default_task_timeout_millis,
            heartbeat_interval_millis: raw.heartbeat_interval_millis,
            unknown_error_retry_bound: raw.unknown_error_retry_bound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_capabilities() {
        let raw = RawWorkerConfig { capabilities: Vec::new(), ..RawWorkerConfig::default() };
        assert!(matches!(WorkerConfig::validate(raw), Err(WorkerConfigError::NoCapabilities)));
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let raw = RawWorkerConfig {
            capabilities: vec!["data".to_string()],
            max_concurrent_tasks: 0,
            ..RawWorkerConfig::default()
        };
        assert!(matches!(
            WorkerConfig::validate(raw),
            Err(WorkerConfigError::MaxConcurrentTasksOutOfRange(0))
        ));
    }

    #[test]
    fn accepts_valid_config() {
        let raw = RawWorkerConfig { capabilities: vec!["data".to_string()], ..RawWorkerConfig::default() };
        assert!(WorkerConfig::validate(raw).is_ok());
    }
}
