// relaycore-engine/src/dag_engine.rs
// ============================================================================
// Module: DAG Engine
// Description: Stage-by-stage orchestration loop walking a run's plan.
// Purpose: Implement the execute contract: select a plan, dispatch
// each stage through the Execution Pool, checkpoint through the Governance
// Engine, switch plans only at checkpoint boundaries, and drive the run to a
// terminal state.
// Dependencies: relaycore_core::{RunStateStore, ArtifactSink, RunContext,
// Plan, PlanNode}, relaycore_budget::{BudgetController, TenantRegistry},
// crate::{execution_pool, governance, guard, plan_selector, registry, config,
// error}
// ============================================================================

//! ## Overview
//! `DagEngine::execute` owns exactly one run from `SPEC_READY` to a terminal
//! status. It never retries a node itself — that is the Worker's and Task
//! Queue's job; a node's terminal report is whatever the Execution Pool
//! returns. A plan switch only ever happens immediately after a checkpoint,
//! against the stage index the run has already reached — the engine never
//! rewinds a completed stage, matching the Open Question resolution that
//! ruled out mid-stage switches.
//!
//! The [`relaycore_core::ArtifactSink`] contract this crate ships
//! ([`crate::artifact_store::InMemoryArtifactStore`]) has no append
//! primitive: a `write` at a given path replaces that path's content. So
//! instead of one growing `plan_history.jsonl`/`cost_ledger.jsonl`/
//! `events.jsonl`, this engine writes one small file per event under
//! `plan_history/`, `cost_ledger/`, and `events/` — each sequence-numbered,
//! each immutable once written. A durable backend that does support true
//! appends is free to collapse these into one file per run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use relaycore_budget::BudgetController;
use relaycore_budget::TenantRegistry;
use relaycore_core::ArtifactSink;
use relaycore_core::CheckpointId;
use relaycore_core::ExecutionMode;
use relaycore_core::GovernanceDecision;
use relaycore_core::Money;
use relaycore_core::Plan;
use relaycore_core::PlanId;
use relaycore_core::PlanNode;
use relaycore_core::PlanSelection;
use relaycore_core::RoleTag;
use relaycore_core::RunContext;
use relaycore_core::RunId;
use relaycore_core::RunStateStore;
use relaycore_core::RunStatus;
use relaycore_core::StepReport;
use relaycore_core::StepStatus;
use relaycore_core::Timestamp;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::execution_pool::ExecutionPool;
use crate::governance::BudgetInputs;
use crate::governance::GovernanceEngine;
use crate::governance::aggregate_metrics;
use crate::governance::build_conflict_matrix;
use crate::governance::detect_conflicts;
use crate::guard::evaluate_guard;
use crate::plan_selector::PlanSelector;
use crate::registry::RoleExecutorRegistry;

// ============================================================================
// SECTION: Plan Repository
// ============================================================================

/// Read-only lookup from plan id to the plan the DAG Engine should walk.
///
/// Plans are authored and versioned outside the engine (by whatever process
/// produces plan variants for a tenant's plan family); the engine only ever
/// reads them by id.
pub trait PlanRepository: Send + Sync {
    /// Returns the plan registered under `plan_id`, if any.
    fn get(&self, plan_id: &PlanId) -> Option<Plan>;
}

/// Fixed, in-memory [`PlanRepository`] built once at startup.
#[derive(Debug, Default)]
pub struct StaticPlanRepository {
    /// Plans indexed by id.
    plans: HashMap<PlanId, Plan>,
}

impl StaticPlanRepository {
    /// Builds a repository from a fixed set of plans.
    #[must_use]
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        Self { plans: plans.into_iter().map(|plan| (plan.plan_id.clone(), plan)).collect() }
    }
}

impl PlanRepository for StaticPlanRepository {
    fn get(&self, plan_id: &PlanId) -> Option<Plan> {
        self.plans.get(plan_id).cloned()
    }
}

// ============================================================================
// SECTION: Execution Outcome
// ============================================================================

/// Summary of one `execute` call, returned once the run reaches a terminal
/// or paused status.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Run this outcome describes.
    pub run_id: RunId,
    /// Status the run ended this call in.
    pub final_status: RunStatus,
    /// Execution mode in effect when the run ended this call.
    pub final_mode: ExecutionMode,
    /// Every plan id walked, in selection order (one entry per switch, plus
    /// the initial selection).
    pub plan_history: Vec<PlanId>,
    /// Every governance decision made, in checkpoint order.
    pub checkpoints: Vec<GovernanceDecision>,
}

// ============================================================================
// SECTION: Artifact Payloads
// ============================================================================

/// One line of the cost ledger artifact stream: the stage's observed spend
/// alongside the budget snapshot consulted at that checkpoint.
#[derive(Debug, Clone, Serialize)]
struct CostLedgerRecord {
    stage_index: u32,
    stage_observed_cost: Money,
    daily_spend: Money,
    monthly_spend: Money,
}

/// One line of the chronological event log.
#[derive(Debug, Clone, Serialize)]
struct EventRecord {
    at: Timestamp,
    stage_index: Option<u32>,
    kind: String,
    message: String,
}

// ============================================================================
// SECTION: DAG Engine
// ============================================================================

/// Orchestrates one run's plan from `SPEC_READY` to a terminal status.
pub struct DagEngine {
    state: Arc<dyn RunStateStore>,
    budget: Arc<dyn BudgetController>,
    tenants: Arc<dyn TenantRegistry>,
    artifacts: Arc<dyn ArtifactSink>,
    plan_selector: Arc<dyn PlanSelector>,
    governance: Arc<dyn GovernanceEngine>,
    plans: Arc<dyn PlanRepository>,
    pool: ExecutionPool,
}

impl DagEngine {
    /// Constructs an engine composing the given components.
    #[must_use]
    pub fn new(
        state: Arc<dyn RunStateStore>,
        budget: Arc<dyn BudgetController>,
        tenants: Arc<dyn TenantRegistry>,
        artifacts: Arc<dyn ArtifactSink>,
        plan_selector: Arc<dyn PlanSelector>,
        governance: Arc<dyn GovernanceEngine>,
        plans: Arc<dyn PlanRepository>,
        pool_config: EngineConfig,
        registry: Arc<RoleExecutorRegistry>,
    ) -> Self {
        Self {
            state,
            budget,
            tenants,
            artifacts,
            plan_selector,
            governance,
            plans,
            pool: ExecutionPool::new(pool_config, registry),
        }
    }

    /// Walks `run_id`'s plan from its current `SPEC_READY` status to a
    /// terminal or paused status.
    ///
    /// `cancel` is honored the same way the Execution Pool honors it: nodes
    /// already launched are given their cancellation grace period, nodes not
    /// yet launched are reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the run does not exist, a selected plan id
    /// has no corresponding entry in the plan repository, or any composed
    /// component rejects an operation.
    pub async fn execute(&self, run_id: &RunId, cancel: watch::Receiver<bool>) -> Result<ExecutionOutcome, EngineError> {
        let run = self.state.read(run_id).await?;
        let tenant = self.tenants.get(&run.tenant_id).await?;
        let budget_snapshot = self.budget.status(&run.tenant_id).await?;
        let matrix = build_conflict_matrix();

        let mut context = RunContext {
            run_id: run_id.clone(),
            spec: run.spec.clone(),
            tenant,
            budget_snapshot,
            current_plan_id: PlanId::new("__unselected__"),
            reports: Vec::new(),
            last_evaluation_failure: None,
        };

        self.write_json(run_id, "spec/submission.json", &run.spec).await?;

        let mut mode = run.latest_mode;
        let mut plan_history = Vec::new();
        let mut checkpoints = Vec::new();
        let mut plan_history_seq: u32 = 0;
        let mut cost_ledger_seq: u32 = 0;
        let mut event_seq: u32 = 0;

        let initial_selection = self.plan_selector.select(&context, mode);
        self.write_plan_selection(run_id, &mut plan_history_seq, &initial_selection).await?;

        let Some(initial_plan_id) = initial_selection.plan_id.clone() else {
            return self.pause_before_dispatch(run_id, mode, plan_history, checkpoints).await;
        };
        let mut plan = self.load_plan(&initial_plan_id)?;
        context.current_plan_id = initial_plan_id.clone();
        plan_history.push(initial_plan_id);
        self.write_plan(run_id, &plan).await?;

        self.state.transition(run_id, RunStatus::Running, "dispatch begins", "dag-engine").await?;
        self.write_event(run_id, &mut event_seq, None, "dispatch_started", "run entered Running").await?;

        let mut required_failure = false;
        let mut stage_index: u32 = 0;

        loop {
            let Some(max_stage) = plan.max_stage_index() else {
                break;
            };
            if stage_index > max_stage {
                break;
            }

            let stage_nodes = plan.nodes_in_stage(stage_index);
            let mut eligible = Vec::with_capacity(stage_nodes.len());
            let mut stage_reports = Vec::with_capacity(stage_nodes.len());

            for node in &stage_nodes {
                if evaluate_guard(&node.guard, &context) {
                    eligible.push((*node).clone());
                } else {
                    let skipped = skipped_report(node);
                    self.write_report(run_id, stage_index, &skipped).await?;
                    stage_reports.push(skipped);
                }
            }

            let pool_reports = self.pool.run_stage(&eligible, Arc::new(context.clone()), cancel.clone()).await;
            for report in &pool_reports {
                self.write_report(run_id, stage_index, report).await?;
            }
            stage_reports.extend(pool_reports);

            let mut stage_observed_cost = Money::ZERO;
            for report in &stage_reports {
                stage_observed_cost = stage_observed_cost + report.observed_cost;
                if report.status == StepStatus::Error {
                    if let Some(node) = stage_nodes.iter().find(|node| node.node_id == report.node_id) {
                        if node.required {
                            required_failure = true;
                            context.last_evaluation_failure = failure_kind(node.role);
                        }
                    }
                }
                context.reports.push(report.clone());
            }

            let conflicts = detect_conflicts(&stage_reports, &matrix);
            let budget_snapshot = self.budget.status(&run.tenant_id).await?;
            let remaining_estimate: Money =
                plan.nodes.iter().filter(|node| node.stage_index > stage_index).map(|node| node.estimated_cost).sum();
            let projection = self.budget.forecast(&run.tenant_id, run_id, remaining_estimate).await?;
            let metrics = aggregate_metrics(
                &stage_reports,
                &conflicts,
                BudgetInputs { tier: budget_snapshot.tier, projected_would_exceed: projection.would_exceed },
            );
            context.budget_snapshot = budget_snapshot;
            self.write_cost_ledger(run_id, &mut cost_ledger_seq, stage_index, stage_observed_cost, budget_snapshot).await?;

            let checkpoint_id = CheckpointId::new(format!("{run_id}-stage-{stage_index}"));
            let decision = self.governance.checkpoint(checkpoint_id, metrics, conflicts);
            self.write_governance(run_id, &decision).await?;
            self.write_event(
                run_id,
                &mut event_seq,
                Some(stage_index),
                "checkpoint",
                &format!("rule {} selected mode {:?}", decision.rule_id, decision.mode),
            )
            .await?;

            if decision.mode != mode {
                self.state.record_mode(run_id, decision.mode).await?;
                mode = decision.mode;
            }
            checkpoints.push(decision);

            if mode == ExecutionMode::Paused {
                self.state.transition(run_id, RunStatus::Paused, "governance checkpoint paused the run", "governance-engine").await?;
                self.artifacts.seal(run_id).await?;
                return Ok(ExecutionOutcome { run_id: run_id.clone(), final_status: RunStatus::Paused, final_mode: mode, plan_history, checkpoints });
            }

            let reselection = self.plan_selector.select(&context, mode);
            if let Some(new_plan_id) = reselection.plan_id.clone() {
                if new_plan_id != plan.plan_id {
                    plan = self.load_plan(&new_plan_id)?;
                    context.current_plan_id = new_plan_id.clone();
                    self.write_plan(run_id, &plan).await?;
                    self.write_plan_selection(run_id, &mut plan_history_seq, &reselection).await?;
                    plan_history.push(new_plan_id);
                }
            }

            stage_index += 1;
        }

        let (final_status, reason) =
            if required_failure { (RunStatus::Failed, "required node did not complete") } else { (RunStatus::Completed, "plan exhausted") };
        self.state.transition(run_id, final_status, reason, "dag-engine").await?;
        self.write_event(run_id, &mut event_seq, None, "run_finished", reason).await?;
        self.artifacts.seal(run_id).await?;

        if required_failure {
            return Err(EngineError::RequiredNodeFailed(run_id.clone()));
        }

        Ok(ExecutionOutcome { run_id: run_id.clone(), final_status, final_mode: mode, plan_history, checkpoints })
    }

    async fn pause_before_dispatch(
        &self,
        run_id: &RunId,
        mode: ExecutionMode,
        plan_history: Vec<PlanId>,
        checkpoints: Vec<GovernanceDecision>,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.state.transition(run_id, RunStatus::Running, "dispatch begins", "dag-engine").await?;
        self.state.transition(run_id, RunStatus::Paused, "plan selector has no plan for the current mode", "dag-engine").await?;
        self.artifacts.seal(run_id).await?;
        Ok(ExecutionOutcome { run_id: run_id.clone(), final_status: RunStatus::Paused, final_mode: mode, plan_history, checkpoints })
    }

    fn load_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        self.plans.get(plan_id).ok_or_else(|| EngineError::PlanNotFound(plan_id.as_str().to_string()))
    }

    async fn write_json<T: Serialize>(&self, run_id: &RunId, path: &str, value: &T) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(value).map_err(|err| relaycore_core::ArtifactError::Io(err.to_string()))?;
        self.artifacts.write(run_id, path, &bytes).await?;
        Ok(())
    }

    async fn write_report(&self, run_id: &RunId, stage_index: u32, report: &StepReport) -> Result<(), EngineError> {
        let path = format!("reports/{stage_index}/{}.json", report.node_id);
        self.write_json(run_id, &path, report).await
    }

    async fn write_plan(&self, run_id: &RunId, plan: &Plan) -> Result<(), EngineError> {
        let path = format!("plan/{}.json", plan.plan_id);
        self.write_json(run_id, &path, plan).await
    }

    async fn write_plan_selection(&self, run_id: &RunId, seq: &mut u32, selection: &PlanSelection) -> Result<(), EngineError> {
        let path = format!("plan_history/{seq:06}.json");
        *seq += 1;
        self.write_json(run_id, &path, selection).await
    }

    async fn write_governance(&self, run_id: &RunId, decision: &GovernanceDecision) -> Result<(), EngineError> {
        let path = format!("governance/{}.json", decision.checkpoint_id);
        self.write_json(run_id, &path, decision).await
    }

    async fn write_cost_ledger(
        &self,
        run_id: &RunId,
        seq: &mut u32,
        stage_index: u32,
        stage_observed_cost: Money,
        budget_snapshot: relaycore_core::BudgetSnapshot,
    ) -> Result<(), EngineError> {
        let path = format!("cost_ledger/{seq:06}.json");
        *seq += 1;
        let record = CostLedgerRecord {
            stage_index,
            stage_observed_cost,
            daily_spend: budget_snapshot.daily_spend,
            monthly_spend: budget_snapshot.monthly_spend,
        };
        self.write_json(run_id, &path, &record).await
    }

    async fn write_event(
        &self,
        run_id: &RunId,
        seq: &mut u32,
        stage_index: Option<u32>,
        kind: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let path = format!("events/{seq:06}.json");
        *seq += 1;
        let record = EventRecord { at: now(), stage_index, kind: kind.to_string(), message: message.to_string() };
        self.write_json(run_id, &path, &record).await
    }
}

fn now() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
    Timestamp::UnixMillis(millis)
}

/// Maps a failing required node's role to the last-evaluation-failure kind
/// the Plan Selector's rule table and guard predicates key on.
fn failure_kind(role: RoleTag) -> Option<String> {
    match role {
        RoleTag::Data => Some("data_issue".to_string()),
        RoleTag::Execution => Some("execution_issue".to_string()),
        RoleTag::Product | RoleTag::Evaluation | RoleTag::Cost => None,
    }
}

fn skipped_report(node: &PlanNode) -> StepReport {
    let mut signals = std::collections::BTreeMap::new();
    signals.insert("reason".to_string(), serde_json::Value::String("guard predicate not satisfied".to_string()));
    StepReport {
        node_id: node.node_id.clone(),
        role: node.role,
        outcome: relaycore_core::OutcomeDecision::Flag,
        status: StepStatus::Skipped,
        confidence: 0.0,
        risk_level: node.estimated_risk,
        observed_cost: Money::ZERO,
        signals,
        declared_conflicts: Vec::new(),
        attempt: 1,
        idempotency_tag: None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
