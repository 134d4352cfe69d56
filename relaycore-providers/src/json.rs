// relaycore-providers/src/json.rs
// ============================================================================
// Module: JSON Role-Step Executor
// Description: Deterministic, locally-evaluated role-step executor adapter.
// Purpose: Satisfy a plan-node's role step from a declarative JSON rule
// embedded in the run's opaque spec, with no network or filesystem access.
// Dependencies: relaycore-core, serde_json
// ============================================================================

//! ## Overview
//! `JsonRoleExecutor` reads a declarative rule from
//! `RunContext.spec.node_config.<node_id>.rule` and turns it directly into a
//! [`StepReport`] — no evaluation beyond type coercion and default-filling.
//! This makes it the natural choice for the `cost` and `evaluation` roles in
//! tests and for scenarios where the orchestrated behavior should be fully
//! reproducible from the submitted spec rather than an external call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use relaycore_core::Money;
use relaycore_core::OutcomeDecision;
use relaycore_core::PlanNode;
use relaycore_core::RiskLevel;
use relaycore_core::RoleStepError;
use relaycore_core::RoleStepExecutor;
use relaycore_core::RunContext;
use relaycore_core::StepReport;
use relaycore_core::StepStatus;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`JsonRoleExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JsonRoleExecutorConfig {
    /// Default outcome used when a node has no rule configured.
    pub default_missing_rule_is_error: bool,
}

impl Default for JsonRoleExecutorConfig {
    fn default() -> Self {
        Self { default_missing_rule_is_error: true }
    }
}

// ============================================================================
// SECTION: Rule Shape
// ============================================================================

/// Declarative rule an adapter turns directly into a [`StepReport`].
#[derive(Debug, Clone, Deserialize)]
struct Rule {
    /// Decision outcome to report.
    #[serde(default = "Rule::default_outcome")]
    outcome: OutcomeDecision,
    /// Terminal status to report.
    #[serde(default = "Rule::default_status")]
    status: StepStatus,
    /// Confidence to report, clamped to `[0, 1]`.
    #[serde(default = "Rule::default_confidence")]
    confidence: f64,
    /// Risk level to report.
    #[serde(default = "Rule::default_risk")]
    risk_level: RiskLevel,
    /// Observed cost, in major currency units.
    #[serde(default)]
    observed_cost_major_units: f64,
    /// Opaque structured signals to report verbatim.
    #[serde(default)]
    signals: BTreeMap<String, Value>,
}

impl Rule {
    const fn default_outcome() -> OutcomeDecision {
        OutcomeDecision::Proceed
    }
    const fn default_status() -> StepStatus {
        StepStatus::Success
    }
    const fn default_confidence() -> f64 {
        1.0
    }
    const fn default_risk() -> RiskLevel {
        RiskLevel::Low
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Local-rule-evaluated role-step executor.
pub struct JsonRoleExecutor {
    config: JsonRoleExecutorConfig,
}

impl JsonRoleExecutor {
    /// Creates a new JSON role executor with the given configuration.
    #[must_use]
    pub const fn new(config: JsonRoleExecutorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RoleStepExecutor for JsonRoleExecutor {
    async fn execute(
        &self,
        context: &RunContext,
        node: &PlanNode,
        _timeout: Duration,
    ) -> Result<StepReport, RoleStepError> {
        let raw_rule = context
            .spec
            .get("node_config")
            .and_then(|cfg| cfg.get(node.node_id.as_str()))
            .and_then(|cfg| cfg.get("rule"));

        let rule = match raw_rule {
            Some(value) => serde_json::from_value::<Rule>(value.clone())
                .map_err(|err| RoleStepError::Permanent(format!("invalid json rule: {err}")))?,
            None if self.config.default_missing_rule_is_error => {
                return Err(RoleStepError::Permanent(format!("no rule configured for node {}", node.node_id)));
            }
            None => Rule {
                outcome: Rule::default_outcome(),
                status: Rule::default_status(),
                confidence: Rule::default_confidence(),
                risk_level: Rule::default_risk(),
                observed_cost_major_units: 0.0,
                signals: BTreeMap::new(),
            },
        };

        Ok(StepReport {
            node_id: node.node_id.clone(),
            role: node.role,
            outcome: rule.outcome,
            status: rule.status,
            confidence: rule.confidence.clamp(0.0, 1.0),
            risk_level: rule.risk_level,
            observed_cost: if rule.observed_cost_major_units > 0.0 {
                Money::from_major_units(rule.observed_cost_major_units)
            } else {
                Money::ZERO
            },
            signals: rule.signals,
            declared_conflicts: Vec::new(),
            attempt: 1,
            idempotency_tag: None,
        })
    }
}
