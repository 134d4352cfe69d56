// relaycore-providers/src/time.rs
// ============================================================================
// Module: Time Role-Step Executor
// Description: Clock/tick-driven role-step executor adapter.
// Purpose: Satisfy a plan-node's role step by comparing an injected clock
// reading against a deadline named in the run's opaque spec.
// Dependencies: relaycore-core
// ============================================================================

//! ## Overview
//! `TimeRoleExecutor` never reads wall-clock time directly — it is
//! constructed with an injected clock closure, matching the core model's
//! rule that "the core never reads wall-clock time directly; hosts must
//! supply timestamps via triggers or runtime helpers." This keeps a run
//! deterministically replayable: supply [`TimeRoleExecutor::with_clock`] a
//! fixed closure in tests, [`TimeRoleExecutor::system_clock`] in production.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

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
use serde_json::Value;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`TimeRoleExecutor`].
#[derive(Clone)]
pub struct TimeRoleExecutorConfig {
    /// Clock read at each `execute` call; never `SystemTime::now` directly
    /// inside adapter logic so callers can inject deterministic replay clocks.
    pub clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl TimeRoleExecutorConfig {
    /// Returns a configuration backed by the real system clock.
    #[must_use]
    pub fn system_clock() -> Self {
        Self {
            clock: Arc::new(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            }),
        }
    }

    /// Returns a configuration backed by a fixed, deterministic clock.
    #[must_use]
    pub fn fixed_clock(now_unix_millis: i64) -> Self {
        Self { clock: Arc::new(move || now_unix_millis) }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Clock-driven role-step executor.
pub struct TimeRoleExecutor {
    config: TimeRoleExecutorConfig,
}

impl TimeRoleExecutor {
    /// Creates a new time role executor using the system clock.
    #[must_use]
    pub fn system_clock() -> Self {
        Self { config: TimeRoleExecutorConfig::system_clock() }
    }

    /// Creates a new time role executor using an injected clock, for
    /// deterministic tests and replay.
    #[must_use]
    pub const fn with_clock(config: TimeRoleExecutorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RoleStepExecutor for TimeRoleExecutor {
    async fn execute(
        &self,
        context: &RunContext,
        node: &PlanNode,
        _timeout: Duration,
    ) -> Result<StepReport, RoleStepError> {
        let deadline = context
            .spec
            .get("node_config")
            .and_then(|cfg| cfg.get(node.node_id.as_str()))
            .and_then(|cfg| cfg.get("deadline_unix_millis"))
            .and_then(Value::as_i64)
            .ok_or_else(|| RoleStepError::Permanent(format!("no deadline configured for node {}", node.node_id)))?;

        let now = (self.config.clock)();
        let mut signals = BTreeMap::new();
        signals.insert("now_unix_millis".to_string(), Value::from(now));
        signals.insert("deadline_unix_millis".to_string(), Value::from(deadline));

        let (outcome, status, risk, confidence) = if now <= deadline {
            (OutcomeDecision::Proceed, StepStatus::Success, RiskLevel::Low, 1.0)
        } else {
            (OutcomeDecision::Flag, StepStatus::Warning, RiskLevel::Medium, 0.6)
        };

        Ok(StepReport {
            node_id: node.node_id.clone(),
            role: node.role,
            outcome,
            status,
            confidence,
            risk_level: risk,
            observed_cost: Money::ZERO,
            signals,
            declared_conflicts: Vec::new(),
            attempt: 1,
            idempotency_tag: None,
        })
    }
}
