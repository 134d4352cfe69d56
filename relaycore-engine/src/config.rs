// relaycore-engine/src/config.rs
// ============================================================================
// Module: Engine Configuration
// Description: Typed, fail-closed configuration for the Execution Pool and
// DAG Engine.
// Purpose: Provide the engine's validated, bounded configuration tunables
// that are local to this crate (pool concurrency, backpressure threshold,
// per-node execution timeout, retry bound).
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `EngineConfig` is constructed via [`EngineConfig::validate`] rather than
//! used directly from a raw TOML deserialization: a config with any value
//! out of range fails to load rather than silently clamping, matching the
//! fail-closed posture the rest of the workspace's configuration loading
//! follows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum allowed Execution Pool concurrency bound.
pub const MIN_POOL_CONCURRENCY: u32 = 1;
/// Maximum allowed Execution Pool concurrency bound.
pub const MAX_POOL_CONCURRENCY: u32 = 4096;
/// Default Execution Pool concurrency bound.
pub const DEFAULT_POOL_CONCURRENCY: u32 = 10;

/// Minimum allowed backpressure threshold.
pub const MIN_BACKPRESSURE_THRESHOLD: f64 = f64::MIN_POSITIVE;
/// Maximum allowed backpressure threshold (ratio is never >1).
pub const MAX_BACKPRESSURE_THRESHOLD: f64 = 1.0;
/// Default backpressure threshold.
pub const DEFAULT_BACKPRESSURE_THRESHOLD: f64 = 0.8;

/// Minimum allowed per-node execution timeout, in milliseconds.
pub const MIN_NODE_TIMEOUT_MILLIS: u64 = 100;
/// Maximum allowed per-node execution timeout, in milliseconds.
pub const MAX_NODE_TIMEOUT_MILLIS: u64 = 3_600_000;
/// Default per-node execution timeout, in milliseconds (5 minutes).
pub const DEFAULT_NODE_TIMEOUT_MILLIS: u64 = 300_000;

/// Minimum allowed cancellation grace period, in milliseconds.
pub const MIN_CANCEL_GRACE_MILLIS: u64 = 0;
/// Maximum allowed cancellation grace period, in milliseconds.
pub const MAX_CANCEL_GRACE_MILLIS: u64 = 60_000;
/// Default cancellation grace period, in milliseconds.
pub const DEFAULT_CANCEL_GRACE_MILLIS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum EngineConfigError {
    /// `pool_concurrency` fell outside `[MIN_POOL_CONCURRENCY,
    /// MAX_POOL_CONCURRENCY]`.
    #[error("pool_concurrency {0} out of range [{MIN_POOL_CONCURRENCY}, {MAX_POOL_CONCURRENCY}]")]
    PoolConcurrencyOutOfRange(u32),
    /// `backpressure_threshold` fell outside `(0, 1]`.
    #[error("backpressure_threshold {0} out of range (0, 1]")]
    BackpressureThresholdOutOfRange(f64),
    /// `node_timeout_millis` fell outside the allowed range.
    #[error("node_timeout_millis {0} out of range [{MIN_NODE_TIMEOUT_MILLIS}, {MAX_NODE_TIMEOUT_MILLIS}]")]
    NodeTimeoutOutOfRange(u64),
    /// `cancel_grace_millis` fell outside the allowed range.
    #[error("cancel_grace_millis {0} out of range [{MIN_CANCEL_GRACE_MILLIS}, {MAX_CANCEL_GRACE_MILLIS}]")]
    CancelGraceOutOfRange(u64),
}

// ============================================================================
// SECTION: Engine Config
// ============================================================================

/// Raw, unvalidated configuration as deserialized from TOML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEngineConfig {
    /// Execution Pool concurrency bound `C`.
    pub pool_concurrency: u32,
    /// Backpressure threshold `θ`.
    pub backpressure_threshold: f64,
    /// Per-node execution timeout, in milliseconds.
    pub node_timeout_millis: u64,
    /// Grace period granted to an in-flight node after cancellation, in
    /// milliseconds.
    pub cancel_grace_millis: u64,
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        Self {
            pool_concurrency: DEFAULT_POOL_CONCURRENCY,
            backpressure_threshold: DEFAULT_BACKPRESSURE_THRESHOLD,
            node_timeout_millis: DEFAULT_NODE_TIMEOUT_MILLIS,
            cancel_grace_millis: DEFAULT_CANCEL_GRACE_MILLIS,
        }
    }
}

/// Validated Execution Pool / DAG Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Execution Pool concurrency bound `C`.
    pub pool_concurrency: u32,
    /// Backpressure threshold `θ`.
    pub backpressure_threshold: f64,
    /// Per-node execution timeout.
    pub node_timeout: std::time::Duration,
    /// Grace period granted to an in-flight node after cancellation.
    pub cancel_grace: std::time::Duration,
}

impl EngineConfig {
    /// Validates `raw`, failing closed on any out-of-range value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineConfigError`] when any field is out of its allowed
    /// range.
    pub fn validate(raw: RawEngineConfig) -> Result<Self, EngineConfigError> {
        if !(MIN_POOL_CONCURRENCY..=MAX_POOL_CONCURRENCY).contains(&raw.pool_concurrency) {
            return Err(EngineConfigError::PoolConcurrencyOutOfRange(raw.pool_concurrency));
        }
        if !(raw.backpressure_threshold > 0.0 && raw.backpressure_threshold <= MAX_BACKPRESSURE_THRESHOLD) {
            return Err(EngineConfigError::BackpressureThresholdOutOfRange(raw.backpressure_threshold));
        }
        if !(MIN_NODE_TIMEOUT_MILLIS..=MAX_NODE_TIMEOUT_MILLIS).contains(&raw.node_timeout_millis) {
            return Err(EngineConfigError::NodeTimeoutOutOfRange(raw.node_timeout_millis));
        }
        if !(MIN_CANCEL_GRACE_MILLIS..=MAX_CANCEL_GRACE_MILLIS).contains(&raw.cancel_grace_millis) {
            return Err(EngineConfigError::CancelGraceOutOfRange(raw.cancel_grace_millis));
        }
        Ok(Self {
            pool_concurrency: raw.pool_concurrency,
            backpressure_threshold: raw.backpressure_threshold,
            node_timeout: std::time::Duration::from_millis(raw.node_timeout_millis),
            cancel_grace: std::time::Duration::from_millis(raw.cancel_grace_millis),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_concurrency: DEFAULT_POOL_CONCURRENCY,
            backpressure_threshold: DEFAULT_BACKPRESSURE_THRESHOLD,
            node_timeout: std::time::Duration::from_millis(DEFAULT_NODE_TIMEOUT_MILLIS),
            cancel_grace: std::time::Duration::from_millis(DEFAULT_CANCEL_GRACE_MILLIS),
        }
    }
}
