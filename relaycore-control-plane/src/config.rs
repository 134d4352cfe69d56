// relaycore-control-plane/src/config.rs
// ============================================================================
// Module: Control Plane Configuration
// Description: Typed, fail-closed configuration for worker registration and
// dead-worker detection.
// Purpose: Validate heartbeat interval/timeout and sweep cadence before the
// Control Plane starts.
// Dependencies: serde
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default heartbeat interval workers are expected to send at (spec.md §4.4).
pub const DEFAULT_HEARTBEAT_INTERVAL_MILLIS: u64 = 15_000;
/// Default silence duration after which a worker is declared dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MILLIS: u64 = 60_000;
/// Default interval the dead-worker sweeper runs at.
pub const DEFAULT_SWEEP_INTERVAL_MILLIS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised validating a [`ControlPlaneConfig`].
#[derive(Debug, Error)]
pub enum ControlPlaneConfigError {
    /// `heartbeat_timeout_millis` was not strictly greater than
    /// `heartbeat_interval_millis`; a worker sending heartbeats exactly at
    /// the interval would be spuriously declared dead.
    #[error("heartbeat_timeout_millis ({timeout}) must exceed heartbeat_interval_millis ({interval})")]
    TimeoutNotGreaterThanInterval {
        /// Configured heartbeat interval.
        interval: u64,
        /// Configured heartbeat timeout.
        timeout: u64,
    },
    /// `sweep_interval_millis` was zero.
    #[error("sweep_interval_millis must be greater than zero")]
    ZeroSweepInterval,
}

// ============================================================================
// SECTION: Raw Config
// ============================================================================

/// Raw, unvalidated configuration as deserialized from TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawControlPlaneConfig {
    /// Heartbeat interval workers are expected to honor.
    pub heartbeat_interval_millis: u64,
    /// Silence duration after which a worker is declared dead.
    pub heartbeat_timeout_millis: u64,
    /// Interval the dead-worker sweeper runs at.
    pub sweep_interval_millis: u64,
}

impl Default for RawControlPlaneConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_millis: DEFAULT_HEARTBEAT_INTERVAL_MILLIS,
            heartbeat_timeout_millis: DEFAULT_HEARTBEAT_TIMEOUT_MILLIS,
            sweep_interval_millis: DEFAULT_SWEEP_INTERVAL_MILLIS,
        }
    }
}

// ============================================================================
// SECTION: Validated Config
// ============================================================================

/// Validated Control Plane configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    /// Heartbeat interval workers are expected to honor.
    pub heartbeat_interval_millis: u64,
    /// Silence duration after which a worker is declared dead.
    pub heartbeat_timeout_millis: u64,
    /// Interval the dead-worker sweeper runs at.
    pub sweep_interval_millis: u64,
}

impl ControlPlaneConfig {
    /// Validates `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneConfigError`] when the timeout does not exceed
    /// the interval, or the sweep interval is zero.
    pub fn validate(raw: RawControlPlaneConfig) -> Result<Self, ControlPlaneConfigError> {
        if raw.heartbeat_timeout_millis <= raw.heartbeat_interval_millis {
            return Err(ControlPlaneConfigError::TimeoutNotGreaterThanInterval {
                interval: raw.heartbeat_interval_millis,
                timeout: raw.heartbeat_timeout_millis,
            });
        }
        if raw.sweep_interval_millis == 0 {
            return Err(ControlPlaneConfigError::ZeroSweepInterval);
        }
        Ok(Self {
            heartbeat_interval_millis: raw.heartbeat_interval_millis,
            heartbeat_timeout_millis: raw.heartbeat_timeout_millis,
            sweep_interval_millis: raw.sweep_interval_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_timeout_not_exceeding_interval() {
        let raw = RawControlPlaneConfig { heartbeat_interval_millis: 1000, heartbeat_timeout_millis: 1000, ..RawControlPlaneConfig::default() };
        assert!(matches!(ControlPlaneConfig::validate(raw), Err(ControlPlaneConfigError::TimeoutNotGreaterThanInterval { .. })));
    }

    #[test]
    fn accepts_default_config() {
        assert!(ControlPlaneConfig::validate(RawControlPlaneConfig::default()).is_ok());
    }
}
