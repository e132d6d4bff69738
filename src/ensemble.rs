//! Parallel ensemble evaluation and deterministic selection.
//!
//! The same shape recurs throughout the pipeline: evaluate every candidate
//! concurrently with one structured call each, then apply an eligibility
//! filter and a scalar scoring rule to pick exactly one winner.

use std::future::Future;

use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;

/// One scored rubric dimension from an evaluation call.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationCriterion {
    pub name: String,
    pub score: u8,
    pub reasoning: String,
}

impl EvaluationCriterion {
    pub fn new(name: impl Into<String>, score: u8, reasoning: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score,
            reasoning: reasoning.into(),
        }
    }
}

/// A candidate with its evaluation attached.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedCandidate<T> {
    pub item: T,
    /// Position in the original candidate list.
    pub index: usize,
    pub criteria: Vec<EvaluationCriterion>,
    /// Scalar selection score (mean or weighted, per the caller's rule).
    pub aggregate_score: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Every candidate was removed by the eligibility filter.
    #[error("no eligible candidate after filtering")]
    NoEligibleCandidate,
}

/// Evaluate all candidates concurrently, preserving input order.
///
/// The join is fail-fast: the first error aborts the group and the remaining
/// in-flight futures are dropped.
pub async fn evaluate_all<T, A, E, F, Fut>(items: Vec<T>, evaluate: F) -> Result<Vec<A>, E>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<A, E>>,
{
    try_join_all(
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| evaluate(index, item)),
    )
    .await
}

/// Pick the winner: apply the eligibility filter, then take the candidate
/// with the strictly highest aggregate score. Ties resolve to the earliest
/// input index.
pub fn select_best<T>(
    candidates: Vec<EvaluatedCandidate<T>>,
    eligible: impl Fn(&EvaluatedCandidate<T>) -> bool,
) -> Result<EvaluatedCandidate<T>, SelectionError> {
    let mut best: Option<EvaluatedCandidate<T>> = None;

    for candidate in candidates {
        if !eligible(&candidate) {
            continue;
        }
        match &best {
            Some(current) if candidate.aggregate_score <= current.aggregate_score => {}
            _ => best = Some(candidate),
        }
    }

    best.ok_or(SelectionError::NoEligibleCandidate)
}
