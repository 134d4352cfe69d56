// relaycore-engine/src/predicate.rs
// ============================================================================
// Module: Guard Predicate Requirement Leaf
// Description: Adapts `GuardPredicate` into `relay_logic`'s generic
// `Requirement<P>` algebra so compound rule-table conditions reuse one
// deterministic evaluation core instead of duplicating condition logic.
// Purpose: Let the Plan Selector and Governance Engine express a rule
// condition as `Requirement<GuardLeaf>` — usually a single `Predicate`
// leaf, occasionally an `And`/`Or` combination — and evaluate it through
// `relay_logic::Requirement::eval`.
// Dependencies: relay_logic::{traits::PredicateEval, Requirement}, crate::guard
// ============================================================================

//! ## Overview
//! `relay_logic::traits::PredicateEval` and `relaycore_core::GuardPredicate`
//! are both foreign to this crate, so Rust's orphan rule forbids implementing
//! one for the other directly. [`GuardLeaf`] is the local newtype that makes
//! the impl legal; its [`PredicateEval::eval_row`] is a thin call into
//! [`crate::guard::evaluate_guard`], so there remains exactly one place the
//! four guard-predicate kinds are actually evaluated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use relay_logic::PredicateEval;
use relay_logic::Requirement;
use relay_logic::Row;
use relaycore_core::GuardPredicate;
use relaycore_core::RunContext;

use crate::guard::evaluate_guard;

// ============================================================================
// SECTION: Guard Leaf
// ============================================================================

/// A `GuardPredicate` wrapped so it can serve as the leaf type of a
/// [`Requirement`] tree.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardLeaf(pub GuardPredicate);

impl PredicateEval for GuardLeaf {
    type Reader<'a> = RunContext;

    fn eval_row(&self, reader: &RunContext, _row: Row) -> bool {
        evaluate_guard(&self.0, reader)
    }
}

/// Evaluates a compound rule condition against `context`.
///
/// Row `0` is the only row ever used: a [`RunContext`] is a single snapshot,
/// not a chunked reader, so the row-based seam degenerates to one evaluation.
#[must_use]
pub fn evaluate_condition(condition: &Requirement<GuardLeaf>, context: &RunContext) -> bool {
    condition.eval(context, 0)
}

/// Convenience constructor for a single-predicate condition, the common case
/// for both rule tables' conditions.
#[must_use]
pub fn single(predicate: GuardPredicate) -> Requirement<GuardLeaf> {
    Requirement::Predicate(GuardLeaf(predicate))
}
