// relaycore-core/src/tooling.rs
// ============================================================================
// Module: Submission API Endpoint Identifiers
// Description: Canonical endpoint identifiers for the RelayCore submission API.
// Purpose: Shared endpoint naming across the contract, server, and CLI crates.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Canonical endpoint identifiers for the RelayCore submission API. These
//! names are part of the external contract surface (§6 of the operating
//! specification this workspace implements).

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical endpoint names for the RelayCore submission API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointName {
    /// Submit a new run.
    RunSubmit,
    /// Fetch current run state.
    RunState,
    /// Fetch a named artifact, or stream the full bundle.
    ArtifactFetch,
    /// Submit operator input to resume a paused run.
    OperatorInput,
    /// Submit a manual governance decision for a paused run.
    ManualDecision,
}

impl EndpointName {
    /// Returns the canonical string name for the endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunSubmit => "run_submit",
            Self::RunState => "run_state",
            Self::ArtifactFetch => "artifact_fetch",
            Self::OperatorInput => "operator_input",
            Self::ManualDecision => "manual_decision",
        }
    }

    /// Returns all endpoint names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::RunSubmit,
            Self::RunState,
            Self::ArtifactFetch,
            Self::OperatorInput,
            Self::ManualDecision,
        ]
    }

    /// Parses an endpoint name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "run_submit" => Some(Self::RunSubmit),
            "run_state" => Some(Self::RunState),
            "artifact_fetch" => Some(Self::ArtifactFetch),
            "operator_input" => Some(Self::OperatorInput),
            "manual_decision" => Some(Self::ManualDecision),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_name() {
        for endpoint in EndpointName::all() {
            assert_eq!(EndpointName::parse(endpoint.as_str()), Some(*endpoint));
        }
    }
}
