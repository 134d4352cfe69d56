// relaycore-engine/src/plan_selector.rs
// ============================================================================
// Module: Plan Selector
// Description: Deterministic, stateless selection of the plan the DAG
// Engine should walk next.
// Purpose: Implement the first-match-wins rule table gating plan choice on
// execution mode, budget remaining, and the last evaluation failure kind.
// Dependencies: relaycore_core::{RunContext, ExecutionMode, PlanId,
// PlanPathClass, PlanSelection}, crate::predicate
// ============================================================================

//! ## Overview
//! The selector never holds state across calls: every input it consults —
//! current mode, budget remaining, last evaluation failure — is read fresh
//! from the [`RunContext`] and `current_mode` argument, and every call emits
//! a [`PlanSelection`] audit record naming the rule that fired. Rules 5 and 6
//! are expressed through [`crate::predicate`]'s `GuardPredicate` algebra
//! since `LastEvaluationFailureNotIn` maps onto them exactly; rule 4 is a
//! direct `Money` comparison rather than a negated `BudgetRemainingAbove`
//! guard, since the guard's `>` and the rule's `<` disagree at the boundary
//! and forcing the reuse would introduce an off-by-one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use relaycore_core::ExecutionMode;
use relaycore_core::GuardPredicate;
use relaycore_core::Money;
use relaycore_core::PlanId;
use relaycore_core::PlanPathClass;
use relaycore_core::PlanSelection;
use relaycore_core::RunContext;

use crate::predicate::evaluate_condition;
use crate::predicate::single;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default budget-remaining threshold below which rule 4 fires, in the
/// tenant's currency's major units.
pub const DEFAULT_BUDGET_REMAINING_THRESHOLD_MAJOR_UNITS: f64 = 100.0;

// ============================================================================
// SECTION: Plan Catalog
// ============================================================================

/// Maps a plan path class to the concrete plan id currently active for a
/// run's plan family.
///
/// A catalog is scoped to one run: the same path class resolves to the same
/// plan id for the lifetime of a run, since the Plan Selector switches among
/// pre-built plan variants rather than synthesizing new ones.
pub trait PlanCatalog: Send + Sync {
    /// Returns the plan id for `path_class`, if this catalog has one.
    fn plan_for_class(&self, path_class: PlanPathClass) -> Option<PlanId>;
}

/// A fixed, run-scoped catalog of normal/degraded/minimal plan ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPlanCatalog {
    /// Plan id for the normal path class.
    pub normal: PlanId,
    /// Plan id for the degraded path class.
    pub degraded: PlanId,
    /// Plan id for the minimal path class.
    pub minimal: PlanId,
}

impl PlanCatalog for StaticPlanCatalog {
    fn plan_for_class(&self, path_class: PlanPathClass) -> Option<PlanId> {
        Some(match path_class {
            PlanPathClass::Normal => self.normal.clone(),
            PlanPathClass::Degraded => self.degraded.clone(),
            PlanPathClass::Minimal => self.minimal.clone(),
        })
    }
}

// ============================================================================
// SECTION: Plan Selector
// ============================================================================

/// Selects the plan the DAG Engine should walk next.
pub trait PlanSelector: Send + Sync {
    /// Evaluates the rule table against `context` and `current_mode`,
    /// returning the selection and its audit record.
    fn select(&self, context: &RunContext, current_mode: ExecutionMode) -> PlanSelection;
}

/// Rule-table implementation of [`PlanSelector`], built on a fixed
/// [`PlanCatalog`].
pub struct RuleBasedPlanSelector<C> {
    catalog: C,
    budget_remaining_threshold: Money,
}

impl<C: PlanCatalog> RuleBasedPlanSelector<C> {
    /// Constructs a selector over `catalog` using the default budget
    /// threshold.
    #[must_use]
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            budget_remaining_threshold: Money::from_major_units(DEFAULT_BUDGET_REMAINING_THRESHOLD_MAJOR_UNITS),
        }
    }

    /// Constructs a selector over `catalog` using an explicit budget
    /// threshold, for tenants with a non-default degradation point.
    #[must_use]
    pub const fn with_threshold(catalog: C, budget_remaining_threshold: Money) -> Self {
        Self { catalog, budget_remaining_threshold }
    }
}

impl<C: PlanCatalog> PlanSelector for RuleBasedPlanSelector<C> {
    fn select(&self, context: &RunContext, current_mode: ExecutionMode) -> PlanSelection {
        if current_mode == ExecutionMode::Paused {
            return PlanSelection {
                plan_id: None,
                rule_id: 1,
                rule_description: "currentMode = PAUSED".to_string(),
                consulted_signals: vec!["current_mode".to_string()],
            };
        }

        if current_mode == ExecutionMode::Minimal {
            return self.selection(2, "currentMode = MINIMAL", PlanPathClass::Minimal, vec!["current_mode".to_string()]);
        }

        if current_mode == ExecutionMode::Degraded {
            return self.selection(
                3,
                "currentMode = DEGRADED",
                PlanPathClass::Degraded,
                vec!["current_mode".to_string()],
            );
        }

        if context.budget_remaining() < self.budget_remaining_threshold {
            return self.selection(
                4,
                "budget-remaining < threshold",
                PlanPathClass::Degraded,
                vec!["budget_remaining".to_string()],
            );
        }

        let data_issue = single(GuardPredicate::LastEvaluationFailureNotIn { excluded: vec!["data_issue".to_string()] });
        if !evaluate_condition(&data_issue, context) {
            return self.selection(
                5,
                "last-evaluation-failure = data_issue",
                PlanPathClass::Degraded,
                vec!["last_evaluation_failure".to_string()],
            );
        }

        let execution_issue =
            single(GuardPredicate::LastEvaluationFailureNotIn { excluded: vec!["execution_issue".to_string()] });
        if !evaluate_condition(&execution_issue, context) {
            return self.selection(
                6,
                "last-evaluation-failure = execution_issue",
                PlanPathClass::Minimal,
                vec!["last_evaluation_failure".to_string()],
            );
        }

        self.selection(7, "otherwise", PlanPathClass::Normal, Vec::new())
    }
}

impl<C: PlanCatalog> RuleBasedPlanSelector<C> {
    fn selection(
        &self,
        rule_id: u32,
        rule_description: &str,
        path_class: PlanPathClass,
        consulted_signals: Vec<String>,
    ) -> PlanSelection {
        PlanSelection {
            plan_id: self.catalog.plan_for_class(path_class),
            rule_id,
            rule_description: rule_description.to_string(),
            consulted_signals,
        }
    }
}
