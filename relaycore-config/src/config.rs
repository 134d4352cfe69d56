// relaycore-config/src/config.rs
// ============================================================================
// Module: RelayCore Top-Level Configuration
// Description: Aggregates per-subsystem tunables into one validated document.
// Purpose: Load and validate `relaycore.toml`, the single operator-facing
//          configuration surface for a RelayCore control-plane deployment.
// Dependencies: relaycore-engine, relaycore-control-plane, serde, toml, thiserror.
// ============================================================================

//! ## Overview
//! [`RelayCoreConfig`] is the operator-facing configuration document for a
//! RelayCore deployment: execution-pool sizing, control-plane heartbeat
//! cadence, admission-budget slack, the global submission rate limit, and
//! the default retry bound. Subsystems that already validate their own
//! tunables ([`relaycore_engine::EngineConfig`],
//! [`relaycore_control_plane::ControlPlaneConfig`]) are embedded as
//! sub-sections rather than re-implemented here.
//!
//! ## Invariants
//! - [`RelayCoreConfig::load`] and [`RelayCoreConfig::validate`] never
//!   produce a config with an out-of-range tunable; callers cannot observe
//!   a partially-validated document.
//! - Every bound matches the `MIN_`/`MAX_`/`DEFAULT_` constants enumerated
//!   alongside it; there is no tunable without an explicit range.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::path::PathBuf;

use relaycore_control_plane::ControlPlaneConfig;
use relaycore_control_plane::ControlPlaneConfigError;
use relaycore_control_plane::RawControlPlaneConfig;
use relaycore_engine::EngineConfig;
use relaycore_engine::EngineConfigError;
use relaycore_engine::RawEngineConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name resolved relative to the current directory.
pub const DEFAULT_CONFIG_NAME: &str = "relaycore.toml";

/// Environment variable overriding the config file path.
pub const CONFIG_ENV_VAR: &str = "RELAYCORE_CONFIG";

/// Maximum config file size accepted by [`RelayCoreConfig::load`].
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Minimum admission-budget slack fraction.
pub const MIN_ADMISSION_BUDGET_SLACK: f64 = 0.0;
/// Maximum admission-budget slack fraction.
pub const MAX_ADMISSION_BUDGET_SLACK: f64 = 0.5;
/// Default admission-budget slack fraction.
pub const DEFAULT_ADMISSION_BUDGET_SLACK: f64 = 0.05;

/// Minimum queue lease duration, in milliseconds.
pub const MIN_LEASE_DURATION_MILLIS: u64 = 1_000;
/// Maximum queue lease duration, in milliseconds.
pub const MAX_LEASE_DURATION_MILLIS: u64 = 3_600_000;
/// Default queue lease duration, in milliseconds.
pub const DEFAULT_LEASE_DURATION_MILLIS: u64 = 300_000;

/// Minimum global submission rate limit, in requests per second.
pub const MIN_GLOBAL_RATE_LIMIT: u32 = 1;
/// Maximum global submission rate limit, in requests per second.
pub const MAX_GLOBAL_RATE_LIMIT: u32 = 1_000_000;
/// Default global submission rate limit, in requests per second.
pub const DEFAULT_GLOBAL_RATE_LIMIT: u32 = 100;

/// Minimum retry attempt bound.
pub const MIN_RETRY_MAX_ATTEMPTS: u32 = 1;
/// Maximum retry attempt bound.
pub const MAX_RETRY_MAX_ATTEMPTS: u32 = 32;
/// Default retry attempt bound.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Maximum length, in bytes, of a resolved config path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Scalar defaults
// ============================================================================

/// Supplies the default value for a [`RawOrDefault`]-wrapped scalar.
trait ScalarDefault<T> {
    /// Returns the default value for the wrapped scalar.
    fn default_value() -> T;
}

/// Transparent wrapper giving a leaf scalar its own serde default without a
/// free-standing `fn default_x() -> T` for every tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawOrDefault<T, D>(T, PhantomData<D>);

impl<T: Copy, D: ScalarDefault<T>> Default for RawOrDefault<T, D> {
    fn default() -> Self {
        Self(D::default_value(), PhantomData)
    }
}

impl<T, D> From<RawOrDefault<T, D>> for RawOrDefaultValue<T> {
    fn from(wrapped: RawOrDefault<T, D>) -> Self {
        RawOrDefaultValue(wrapped.0)
    }
}

/// Unwraps to the inner scalar; exists only to name the conversion above.
struct RawOrDefaultValue<T>(T);

impl<'de, T, D> Deserialize<'de> for RawOrDefault<T, D>
where
    T: Deserialize<'de>,
{
    fn deserialize<De>(deserializer: De) -> Result<Self, De::Error>
    where
        De: serde::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(|value| Self(value, PhantomData))
    }
}

impl<T: Serialize, D> Serialize for RawOrDefault<T, D> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

macro_rules! scalar_default {
    ($name:ident, $ty:ty, $value:expr) => {
        #[derive(Debug, Clone, Copy)]
        struct $name;

        impl ScalarDefault<$ty> for $name {
            fn default_value() -> $ty {
                $value
            }
        }
    };
}

scalar_default!(AdmissionBudgetSlackDefault, f64, DEFAULT_ADMISSION_BUDGET_SLACK);
scalar_default!(LeaseDurationDefault, u64, DEFAULT_LEASE_DURATION_MILLIS);
scalar_default!(GlobalRateLimitDefault, u32, DEFAULT_GLOBAL_RATE_LIMIT);
scalar_default!(RetryMaxAttemptsDefault, u32, DEFAULT_RETRY_MAX_ATTEMPTS);

// ============================================================================
// SECTION: Raw configuration
// ============================================================================

/// Deserialized, not-yet-validated form of [`RelayCoreConfig`].
///
/// Every field accepts a partial TOML document; missing fields fall back
/// to the documented default and are validated on [`RelayCoreConfig::validate`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRelayCoreConfig {
    /// Execution-pool tunables (concurrency, backpressure, timeouts).
    #[serde(default)]
    pub pool: RawEngineConfig,
    /// Control-plane tunables (heartbeat interval/timeout, sweep interval).
    #[serde(default)]
    pub control_plane: RawControlPlaneConfig,
    /// Admission-budget slack, as a fraction of total budget.
    #[serde(default)]
    admission_budget_slack: RawOrDefault<f64, AdmissionBudgetSlackDefault>,
    /// Queue lease duration, in milliseconds.
    #[serde(default)]
    lease_duration_millis: RawOrDefault<u64, LeaseDurationDefault>,
    /// Global submission rate limit, in requests per second.
    #[serde(default)]
    global_rate_limit: RawOrDefault<u32, GlobalRateLimitDefault>,
    /// Default retry attempt bound for task execution.
    #[serde(default)]
    retry_max_attempts: RawOrDefault<u32, RetryMaxAttemptsDefault>,
}

// ============================================================================
// SECTION: Validated configuration
// ============================================================================

/// Validated RelayCore configuration document.
///
/// Constructed exclusively through [`RelayCoreConfig::validate`] or
/// [`RelayCoreConfig::load`]; every field is guaranteed in-range.
#[derive(Debug, Clone)]
pub struct RelayCoreConfig {
    /// Validated execution-pool tunables.
    pub pool: EngineConfig,
    /// Validated control-plane tunables.
    pub control_plane: ControlPlaneConfig,
    /// Admission-budget slack, as a fraction of total budget.
    pub admission_budget_slack: f64,
    /// Queue lease duration, in milliseconds.
    pub lease_duration_millis: u64,
    /// Global submission rate limit, in requests per second.
    pub global_rate_limit: u32,
    /// Default retry attempt bound for task execution.
    pub retry_max_attempts: u32,
}

impl Default for RelayCoreConfig {
    fn default() -> Self {
        #[allow(
            clippy::expect_used,
            reason = "RawRelayCoreConfig::default() is always in range by construction."
        )]
        Self::validate(RawRelayCoreConfig::default())
            .expect("default RawRelayCoreConfig must validate")
    }
}

impl RelayCoreConfig {
    /// Validates a [`RawRelayCoreConfig`], returning the fully-checked document.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any tunable is out of its documented range.
    pub fn validate(raw: RawRelayCoreConfig) -> Result<Self, ConfigError> {
        let pool = EngineConfig::validate(raw.pool)?;
        let control_plane = ControlPlaneConfig::validate(raw.control_plane)?;

        let admission_budget_slack = RawOrDefaultValue::from(raw.admission_budget_slack).0;
        if !(MIN_ADMISSION_BUDGET_SLACK..=MAX_ADMISSION_BUDGET_SLACK)
            .contains(&admission_budget_slack)
        {
            return Err(ConfigError::Invalid(format!(
                "admission_budget_slack must be between {MIN_ADMISSION_BUDGET_SLACK} and \
                 {MAX_ADMISSION_BUDGET_SLACK}, got {admission_budget_slack}"
            )));
        }

        let lease_duration_millis = RawOrDefaultValue::from(raw.lease_duration_millis).0;
        if !(MIN_LEASE_DURATION_MILLIS..=MAX_LEASE_DURATION_MILLIS)
            .contains(&lease_duration_millis)
        {
            return Err(ConfigError::Invalid(format!(
                "lease_duration_millis must be between {MIN_LEASE_DURATION_MILLIS} and \
                 {MAX_LEASE_DURATION_MILLIS}, got {lease_duration_millis}"
            )));
        }

        let global_rate_limit = RawOrDefaultValue::from(raw.global_rate_limit).0;
        if !(MIN_GLOBAL_RATE_LIMIT..=MAX_GLOBAL_RATE_LIMIT).contains(&global_rate_limit) {
            return Err(ConfigError::Invalid(format!(
                "global_rate_limit must be between {MIN_GLOBAL_RATE_LIMIT} and \
                 {MAX_GLOBAL_RATE_LIMIT}, got {global_rate_limit}"
            )));
        }

        let retry_max_attempts = RawOrDefaultValue::from(raw.retry_max_attempts).0;
        if !(MIN_RETRY_MAX_ATTEMPTS..=MAX_RETRY_MAX_ATTEMPTS).contains(&retry_max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "retry_max_attempts must be between {MIN_RETRY_MAX_ATTEMPTS} and \
                 {MAX_RETRY_MAX_ATTEMPTS}, got {retry_max_attempts}"
            )));
        }

        Ok(Self {
            pool,
            control_plane,
            admission_budget_slack,
            lease_duration_millis,
            global_rate_limit,
            retry_max_attempts,
        })
    }

    /// Loads and validates `relaycore.toml`.
    ///
    /// Resolution order: `path`, then the [`CONFIG_ENV_VAR`] environment
    /// variable, then [`DEFAULT_CONFIG_NAME`] in the current directory.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on I/O failure, malformed TOML, a config file
    /// larger than [`MAX_CONFIG_FILE_SIZE`], or an out-of-range tunable.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;

        let metadata = fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "config file {} exceeds max size of {MAX_CONFIG_FILE_SIZE} bytes",
                resolved.display()
            )));
        }

        let text = fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let raw: RawRelayCoreConfig =
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::validate(raw)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Execution-pool sub-section failed validation.
    #[error("pool config error: {0}")]
    Pool(#[from] EngineConfigError),
    /// Control-plane sub-section failed validation.
    #[error("control plane config error: {0}")]
    ControlPlane(#[from] ControlPlaneConfigError),
}

impl fmt::Debug for RawOrDefaultValue<f64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit path, the environment, or the default name.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
