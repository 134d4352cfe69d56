// relaycore-providers/src/http.rs
// ============================================================================
// Module: HTTP Role-Step Executor
// Description: Role-step executor adapter backed by an outbound HTTP call.
// Purpose: Let a plan-node's role step be satisfied by a webhook-style
// endpoint, returning status/body-derived signals as a StepReport.
// Dependencies: relaycore-core, reqwest, serde_json, tokio
// ============================================================================

//! ## Overview
//! `HttpRoleExecutor` issues a bounded, non-blocking GET against the URL
//! named in the node's opaque configuration (read from
//! `RunContext.spec.node_config.<node_id>.url`). It enforces scheme
//! restrictions, an optional host allowlist, and a response-size limit, and
//! honors the timeout passed by the caller rather than its own configured
//! default — the adapter contract requires obeying the caller's deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
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
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`HttpRoleExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpRoleExecutorConfig {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Optional host allowlist.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpRoleExecutorConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            max_response_bytes: 1024 * 1024,
            allowed_hosts: None,
            user_agent: "relaycore-providers/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Webhook-style role-step executor.
pub struct HttpRoleExecutor {
    config: HttpRoleExecutorConfig,
    client: Client,
}

impl HttpRoleExecutor {
    /// Creates a new HTTP role executor with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RoleStepError::Permanent`] when the HTTP client cannot be
    /// built.
    pub fn new(config: HttpRoleExecutorConfig) -> Result<Self, RoleStepError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| RoleStepError::Permanent(format!("http client build failed: {err}")))?;
        Ok(Self { config, client })
    }

    fn node_url(context: &RunContext, node: &PlanNode) -> Result<reqwest::Url, RoleStepError> {
        let raw = context
            .spec
            .get("node_config")
            .and_then(|cfg| cfg.get(node.node_id.as_str()))
            .and_then(|cfg| cfg.get("url"))
            .and_then(Value::as_str)
            .ok_or_else(|| RoleStepError::Permanent(format!("no url configured for node {}", node.node_id)))?;
        reqwest::Url::parse(raw).map_err(|err| RoleStepError::Permanent(format!("invalid url: {err}")))
    }

    fn validate_url(&self, url: &reqwest::Url) -> Result<(), RoleStepError> {
        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_http => {}
            other => return Err(RoleStepError::Permanent(format!("unsupported url scheme: {other}"))),
        }
        if let Some(allowlist) = &self.config.allowed_hosts {
            let host = url
                .host_str()
                .ok_or_else(|| RoleStepError::Permanent("url host required".to_string()))?;
            if !allowlist.contains(host) {
                return Err(RoleStepError::Permanent(format!("url host not allowed: {host}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStepExecutor for HttpRoleExecutor {
    async fn execute(
        &self,
        context: &RunContext,
        node: &PlanNode,
        timeout: Duration,
    ) -> Result<StepReport, RoleStepError> {
        let url = Self::node_url(context, node)?;
        self.validate_url(&url)?;

        let call = self.client.get(url.clone()).send();
        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(RoleStepError::Transient(format!("http request failed: {err}"))),
            Err(_) => return Err(RoleStepError::Timeout(timeout)),
        };

        let status = response.status();
        let body = match tokio::time::timeout(timeout, response.bytes()).await {
            Ok(Ok(bytes)) if bytes.len() <= self.config.max_response_bytes => bytes,
            Ok(Ok(_)) => return Err(RoleStepError::Permanent("http response exceeds size limit".to_string())),
            Ok(Err(err)) => return Err(RoleStepError::Transient(format!("http body read failed: {err}"))),
            Err(_) => return Err(RoleStepError::Timeout(timeout)),
        };

        let mut signals = BTreeMap::new();
        signals.insert("http_status".to_string(), Value::from(status.as_u16()));
        signals.insert("http_body_bytes".to_string(), Value::from(body.len()));

        let (outcome, step_status, risk) = if status.is_success() {
            (OutcomeDecision::Proceed, StepStatus::Success, RiskLevel::Low)
        } else if status.is_server_error() {
            (OutcomeDecision::Flag, StepStatus::Warning, RiskLevel::Medium)
        } else {
            (OutcomeDecision::Abort, StepStatus::Error, RiskLevel::High)
        };

        Ok(StepReport {
            node_id: node.node_id.clone(),
            role: node.role,
            outcome,
            status: step_status,
            confidence: if status.is_success() { 0.95 } else { 0.4 },
            risk_level: risk,
            observed_cost: Money::ZERO,
            signals,
            declared_conflicts: Vec::new(),
            attempt: 1,
            idempotency_tag: None,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]
    use super::*;
    use relaycore_core::BudgetProfile;
    use relaycore_core::BudgetSnapshot;
    use relaycore_core::BudgetStatus;
    use relaycore_core::GuardPredicate;
    use relaycore_core::LearningIntensity;
    use relaycore_core::LearningProfile;
    use relaycore_core::NodeId;
    use relaycore_core::PlanId;
    use relaycore_core::RoleTag;
    use relaycore_core::RunId;
    use relaycore_core::Tenant;
    use relaycore_core::TenantId;
    use relaycore_core::TenantStatus;

    fn sample_node(id: &str) -> PlanNode {
        PlanNode {
            node_id: NodeId::new(id),
            stage_index: 0,
            role: RoleTag::Data,
            guard: GuardPredicate::Always,
            required: true,
            estimated_cost: Money::ZERO,
            estimated_risk: RiskLevel::Low,
            hard_dependencies: Vec::new(),
            soft_dependencies: Vec::new(),
        }
    }

    fn sample_tenant() -> Tenant {
        Tenant {
            tenant_id: TenantId::new("t1"),
            display_name: "Tenant One".to_string(),
            status: TenantStatus::Active,
            budget_profile: BudgetProfile {
                max_daily_spend: Money::from_major_units(10.0),
                max_monthly_spend: Money::from_major_units(200.0),
                max_concurrent_runs: 5,
                max_agents: 10,
            },
            learning_profile: LearningProfile {
                intensity: LearningIntensity::Balanced,
                exploration_share: 0.1,
                cross_tenant_opt_in: false,
            },
            priority_level: 5,
        }
    }

    fn sample_context(spec: Value) -> RunContext {
        RunContext {
            run_id: RunId::new("r1"),
            spec,
            tenant: sample_tenant(),
            budget_snapshot: BudgetSnapshot {
                daily_spend: Money::ZERO,
                monthly_spend: Money::ZERO,
                concurrent_runs: 0,
                tier: BudgetStatus::Healthy,
            },
            current_plan_id: PlanId::new("p1"),
            reports: Vec::new(),
            last_evaluation_failure: None,
        }
    }

    #[test]
    fn missing_node_config_is_a_permanent_error() {
        let node = sample_node("n1");
        let context = sample_context(serde_json::json!({}));
        let err = HttpRoleExecutor::node_url(&context, &node).unwrap_err();
        assert!(matches!(err, RoleStepError::Permanent(_)));
    }

    #[test]
    fn http_scheme_rejected_without_allow_http() {
        let executor = HttpRoleExecutor::new(HttpRoleExecutorConfig::default()).unwrap();
        let url = reqwest::Url::parse("http://example.test/check").unwrap();
        let err = executor.validate_url(&url).unwrap_err();
        assert!(matches!(err, RoleStepError::Permanent(_)));
    }

    #[test]
    fn host_allowlist_rejects_unlisted_host() {
        let mut config = HttpRoleExecutorConfig::default();
        config.allow_http = false;
        let mut allowed = BTreeSet::new();
        allowed.insert("allowed.test".to_string());
        config.allowed_hosts = Some(allowed);
        let executor = HttpRoleExecutor::new(config).unwrap();
        let url = reqwest::Url::parse("https://other.test/check").unwrap();
        assert!(executor.validate_url(&url).is_err());
    }
}
