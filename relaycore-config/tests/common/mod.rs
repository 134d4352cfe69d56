// relaycore-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for relaycore-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use relaycore_config::RelayCoreConfig;
use relaycore_config::RateLimitConfig;
use relaycore_config::ServerAuthConfig;
use relaycore_config::ServerTransport;

/// Parses a TOML string into a `RelayCoreConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<RelayCoreConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<RelayCoreConfig, toml::de::Error> {
    config_from_toml("")
}

/// Returns a minimal config with HTTP transport and the provided auth config.
pub fn config_with_auth(auth: ServerAuthConfig) -> Result<RelayCoreConfig, toml::de::Error> {
    let mut config = minimal_config()?;
    config.server.transport = ServerTransport::Http;
    config.server.bind = Some("127.0.0.1:8080".to_string());
    config.server.auth = Some(auth);
    Ok(config)
}

/// Returns a minimal config with an HTTP transport and the provided rate limit.
pub fn config_with_rate_limit(
    rate_limit: RateLimitConfig,
) -> Result<RelayCoreConfig, toml::de::Error> {
    let mut config = minimal_config()?;
    config.server.transport = ServerTransport::Http;
    config.server.bind = Some("127.0.0.1:8080".to_string());
    config.server.limits.rate_limit = Some(rate_limit);
    Ok(config)
}
