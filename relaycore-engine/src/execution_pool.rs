// relaycore-engine/src/execution_pool.rs
// ============================================================================
// Module: Execution Pool
// Description: Intra-run concurrency-bounded launcher for one stage's
// eligible plan-nodes.
// Purpose: Implement semaphore-gated scheduling, backpressure
// signal, dependency semantics, and bounded cancellation grace period.
// Dependencies: relaycore_core::{PlanNode, RunContext, StepReport},
// crate::registry::RoleExecutorRegistry, tokio::sync::{Semaphore, watch}
// ============================================================================

//! ## Overview
//! `ExecutionPool` owns one [`tokio::sync::Semaphore`] of capacity `C` and an
//! atomic `running` counter it maintains alongside the semaphore so the
//! backpressure ratio `running / C` can be checked without acquiring a
//! permit first. A node whose hard dependency failed never reaches the
//! registry at all — it is synthesized as a failed report directly, mirroring
//! the MCP reference server's inflight-request semaphore pattern generalized
//! from "one HTTP request" to "one plan-node" as the unit of concurrency.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use relaycore_core::Money;
use relaycore_core::NodeId;
use relaycore_core::OutcomeDecision;
use relaycore_core::PlanNode;
use relaycore_core::RiskLevel;
use relaycore_core::RunContext;
use relaycore_core::StepReport;
use relaycore_core::StepStatus;
use tokio::sync::Semaphore;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::registry::RoleExecutorRegistry;

// ============================================================================
// SECTION: Execution Pool
// ============================================================================

/// Bounded, backpressure-aware launcher for one stage's eligible nodes.
pub struct ExecutionPool {
    registry: Arc<RoleExecutorRegistry>,
    semaphore: Arc<Semaphore>,
    capacity: u32,
    backpressure_threshold: f64,
    node_timeout: Duration,
    cancel_grace: Duration,
    running: Arc<AtomicU64>,
    backpressure_events: Arc<AtomicU64>,
}

impl ExecutionPool {
    /// Constructs a pool sized by `config`, dispatching through `registry`.
    #[must_use]
    pub fn new(config: EngineConfig, registry: Arc<RoleExecutorRegistry>) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(config.pool_concurrency as usize)),
            capacity: config.pool_concurrency,
            backpressure_threshold: config.backpressure_threshold,
            node_timeout: config.node_timeout,
            cancel_grace: config.cancel_grace,
            running: Arc::new(AtomicU64::new(0)),
            backpressure_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count of times a scheduling tick observed `running/C >= θ` and
    /// deferred a launch.
    #[must_use]
    pub fn backpressure_events(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }

    fn is_backpressured(&self) -> bool {
        let running = self.running.load(Ordering::Relaxed) as f64;
        let capacity = f64::from(self.capacity);
        running / capacity >= self.backpressure_threshold
    }

    /// Runs every node in `nodes` to terminal state, honoring hard/soft
    /// dependency semantics, the concurrency bound, and `cancel`.
    ///
    /// Returns one [`StepReport`] per input node, in input order.
    pub async fn run_stage(&self, nodes: &[PlanNode], context: Arc<RunContext>, cancel: watch::Receiver<bool>) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(nodes.len());
        let mut launched: Vec<(NodeId, tokio::task::JoinHandle<StepReport>)> = Vec::with_capacity(nodes.len());

        for node in nodes {
            if *cancel.borrow() {
                reports.push(not_started_report(node));
                continue;
            }

            if let Some(failed) = hard_dependency_failure_report(node, &context) {
                reports.push(failed);
                continue;
            }

            let dependency_warning = soft_dependency_warning(node, &context);

            while self.is_backpressured() && !*cancel.borrow() {
                self.backpressure_events.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }

            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                reports.push(not_started_report(node));
                continue;
            };

            let registry = Arc::clone(&self.registry);
            let node_context = Arc::clone(&context);
            let owned_node = node.clone();
            let running = Arc::clone(&self.running);
            let node_timeout = self.node_timeout;

            running.fetch_add(1, Ordering::Relaxed);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let report = execute_node(&registry, &node_context, &owned_node, node_timeout, dependency_warning).await;
                running.fetch_sub(1, Ordering::Relaxed);
                report
            });
            launched.push((node.node_id.clone(), handle));
        }

        for (node_id, handle) in launched {
            let cancelled = *cancel.borrow();
            let report = if cancelled {
                match tokio::time::timeout(self.cancel_grace, handle).await {
                    Ok(Ok(report)) => report,
                    Ok(Err(_join_error)) => panicked_report(&node_id),
                    Err(_elapsed) => abandoned_report(&node_id),
                }
            } else {
                match handle.await {
                    Ok(report) => report,
                    Err(_join_error) => panicked_report(&node_id),
                }
            };
            reports.push(report);
        }

        reports
    }
}

// ============================================================================
// SECTION: Node Execution
// ============================================================================

async fn execute_node(
    registry: &RoleExecutorRegistry,
    context: &RunContext,
    node: &PlanNode,
    node_timeout: Duration,
    dependency_warning: Option<String>,
) -> StepReport {
    let Some(executor) = registry.get(node.role) else {
        return role_not_registered_report(node);
    };

    match tokio::time::timeout(node_timeout, executor.execute(context, node, node_timeout)).await {
        Ok(Ok(mut report)) => {
            if let Some(warning) = dependency_warning {
                report.signals.insert("dependency_warning".to_string(), serde_json::Value::String(warning));
            }
            report
        }
        Ok(Err(role_error)) => role_step_failure_report(node, &role_error),
        Err(_elapsed) => timeout_report(node, node_timeout),
    }
}

// ============================================================================
// SECTION: Dependency Semantics
// ============================================================================

fn latest_status(context: &RunContext, dependency: &NodeId) -> Option<StepStatus> {
    context.reports_for_node(dependency).last().map(|report| report.status)
}

fn hard_dependency_failure_report(node: &PlanNode, context: &RunContext) -> Option<StepReport> {
    let failed_dependency = node.hard_dependencies.iter().find(|dep| latest_status(context, dep) == Some(StepStatus::Error))?;
    Some(synthetic_report(
        node,
        StepStatus::Error,
        OutcomeDecision::Abort,
        format!("hard dependency {failed_dependency} failed"),
    ))
}

fn soft_dependency_warning(node: &PlanNode, context: &RunContext) -> Option<String> {
    let failed: Vec<String> =
        node.soft_dependencies.iter().filter(|dep| latest_status(context, dep) == Some(StepStatus::Error)).map(ToString::to_string).collect();
    if failed.is_empty() { None } else { Some(format!("soft dependencies failed: {}", failed.join(", "))) }
}

// ============================================================================
// SECTION: Synthetic Reports
// ============================================================================

fn synthetic_report(node: &PlanNode, status: StepStatus, outcome: OutcomeDecision, reason: String) -> StepReport {
    let mut signals = std::collections::BTreeMap::new();
    signals.insert("reason".to_string(), serde_json::Value::String(reason));
    StepReport {
        node_id: node.node_id.clone(),
        role: node.role,
        outcome,
        status,
        confidence: 0.0,
        risk_level: node.estimated_risk,
        observed_cost: Money::ZERO,
        signals,
        declared_conflicts: Vec::new(),
        attempt: 1,
        idempotency_tag: None,
    }
}

fn not_started_report(node: &PlanNode) -> StepReport {
    synthetic_report(node, StepStatus::Skipped, OutcomeDecision::Flag, "execution pool cancelled before launch".to_string())
}

fn abandoned_report(node_id: &NodeId) -> StepReport {
    synthetic_report_by_id(node_id, StepStatus::Error, OutcomeDecision::Abort, "abandoned after cancellation grace period".to_string())
}

fn panicked_report(node_id: &NodeId) -> StepReport {
    synthetic_report_by_id(node_id, StepStatus::Error, OutcomeDecision::Abort, "execution task panicked".to_string())
}

fn role_not_registered_report(node: &PlanNode) -> StepReport {
    synthetic_report(node, StepStatus::Error, OutcomeDecision::Abort, format!("no executor registered for role {:?}", node.role))
}

fn timeout_report(node: &PlanNode, node_timeout: Duration) -> StepReport {
    synthetic_report(node, StepStatus::Error, OutcomeDecision::Abort, format!("timed out after {node_timeout:?}"))
}

fn role_step_failure_report(node: &PlanNode, error: &relaycore_core::RoleStepError) -> StepReport {
    synthetic_report(node, StepStatus::Error, OutcomeDecision::Abort, error.to_string())
}

fn synthetic_report_by_id(node_id: &NodeId, status: StepStatus, outcome: OutcomeDecision, reason: String) -> StepReport {
    let mut signals = std::collections::BTreeMap::new();
    signals.insert("reason".to_string(), serde_json::Value::String(reason));
    StepReport {
        node_id: node_id.clone(),
        role: relaycore_core::RoleTag::Execution,
        outcome,
        status,
        confidence: 0.0,
        risk_level: RiskLevel::Low,
        observed_cost: Money::ZERO,
        signals,
        declared_conflicts: Vec::new(),
        attempt: 1,
        idempotency_tag: None,
    }
}
