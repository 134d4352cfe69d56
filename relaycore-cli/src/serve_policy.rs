// relaycore-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the CLI server launcher.
// Purpose: Enforce safe-by-default bind behavior with explicit opt-in.
// Dependencies: relaycore-server, std
// ============================================================================

//! ## Overview
//! [`RelayCoreServerConfig::validate`](relaycore_server::RelayCoreServerConfig::validate)
//! already refuses a non-loopback bind without an auth policy. This module
//! adds a second, CLI-level gate on top: non-loopback exposure additionally
//! requires an explicit opt-in (flag or environment variable) and TLS, since
//! the config file alone may be deployed unreviewed.
//!
//! Security posture: fail closed on unsafe bind configuration; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::net::SocketAddr;

use relaycore_server::RelayCoreServerConfig;
use relaycore_server::ServerAuthMode;
use relaycore_server::ServerTlsConfig;

use crate::t;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "RELAYCORE_ALLOW_NON_LOOPBACK";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Bind outcome metadata for startup warnings.
///
/// # Invariants
/// - `network_exposed` is `true` only when a non-loopback bind is selected.
#[derive(Debug, Clone)]
pub struct BindOutcome {
    /// Resolved socket address.
    pub bind_addr: SocketAddr,
    /// True when the server is bound to a non-loopback address.
    pub network_exposed: bool,
    /// Effective auth mode.
    pub auth_mode: ServerAuthMode,
    /// TLS configuration when present.
    pub tls: Option<ServerTlsConfig>,
    /// Whether audit logging is enabled.
    pub audit_enabled: bool,
    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Serve policy failures for bind safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServePolicyError {
    /// Environment variable was set to an invalid value.
    InvalidEnv {
        /// Raw environment value.
        value: String,
    },
    /// Bind string failed to parse.
    InvalidBind {
        /// Raw bind value.
        bind: String,
        /// Parse error message.
        error: String,
    },
    /// Non-loopback binding requires explicit opt-in.
    NonLoopbackOptInRequired {
        /// Bind address.
        bind: String,
    },
    /// Non-loopback binding requires TLS.
    NonLoopbackTlsRequired {
        /// Bind address.
        bind: String,
    },
}

impl std::fmt::Display for ServePolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::InvalidEnv { value } => {
                t!("serve.bind.allow_env_invalid", env = ALLOW_NON_LOOPBACK_ENV, value = value)
            }
            Self::InvalidBind { bind, error } => {
                t!("serve.bind.parse_failed", bind = bind, error = error)
            }
            Self::NonLoopbackOptInRequired { bind } => {
                t!("serve.bind.non_loopback_opt_in", bind = bind, env = ALLOW_NON_LOOPBACK_ENV)
            }
            Self::NonLoopbackTlsRequired { bind } => {
                t!("serve.bind.non_loopback_tls_required", bind = bind)
            }
        };
        write!(f, "{message}")
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Resolves the non-loopback opt-in flag from CLI and environment.
///
/// # Errors
/// Returns [`ServePolicyError::InvalidEnv`] when the environment value is invalid.
pub fn resolve_allow_non_loopback(flag: bool) -> Result<bool, ServePolicyError> {
    if flag {
        return Ok(true);
    }
    let Some(value) = env::var_os(ALLOW_NON_LOOPBACK_ENV) else {
        return Ok(false);
    };
    let value = value.to_string_lossy().to_string();
    parse_allow_non_loopback_value(&value)
}

/// Enforces non-loopback bind safety for the Submission API server, on top
/// of the config's own `validate()` pass.
///
/// # Errors
/// Returns [`ServePolicyError`] when configuration violates security requirements.
pub fn enforce_local_only(
    config: &RelayCoreServerConfig,
    allow_non_loopback: bool,
) -> Result<BindOutcome, ServePolicyError> {
    let auth_mode = config.server.auth.as_ref().map_or(ServerAuthMode::LocalOnly, |auth| auth.mode);
    let audit_enabled = config.server.audit.enabled;
    let rate_limit_enabled = config.server.limits.rate_limit.is_some();
    let bind = config.server.bind.as_deref().unwrap_or_default();
    let addr: SocketAddr = bind.parse().map_err(|err: std::net::AddrParseError| {
        ServePolicyError::InvalidBind { bind: bind.to_string(), error: err.to_string() }
    })?;

    if addr.ip().is_loopback() {
        return Ok(BindOutcome {
            bind_addr: addr,
            network_exposed: false,
            auth_mode,
            tls: config.server.tls.clone(),
            audit_enabled,
            rate_limit_enabled,
        });
    }

    if !allow_non_loopback {
        return Err(ServePolicyError::NonLoopbackOptInRequired { bind: bind.to_string() });
    }
    if config.server.tls.is_none() {
        return Err(ServePolicyError::NonLoopbackTlsRequired { bind: bind.to_string() });
    }

    Ok(BindOutcome {
        bind_addr: addr,
        network_exposed: true,
        auth_mode,
        tls: config.server.tls.clone(),
        audit_enabled,
        rate_limit_enabled,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a bool-ish string (true/false/1/0/yes/no/on/off).
fn parse_boolish(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an env value for allow-non-loopback.
pub(crate) fn parse_allow_non_loopback_value(value: &str) -> Result<bool, ServePolicyError> {
    parse_boolish(value)
        .map_or_else(|| Err(ServePolicyError::InvalidEnv { value: value.to_string() }), Ok)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
