// src/matching/aggregator.rs - Derived views over match candidates
use std::cmp::Ordering;

use crate::models::matching::{ConfidenceTier, MatchCandidate};

/// Rollup over a candidate set, surfaced in the run summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub avg_combined_score: f64,
}

pub fn summarize(candidates: &[MatchCandidate]) -> AggregateSummary {
    let total = candidates.len();
    let high = candidates
        .iter()
        .filter(|c| ConfidenceTier::High.includes(c.combined_score))
        .count();
    let medium = candidates
        .iter()
        .filter(|c| ConfidenceTier::Medium.includes(c.combined_score))
        .count();
    let avg_combined_score = if total > 0 {
        candidates.iter().map(|c| c.combined_score).sum::<f64>() / total as f64
    } else {
        0.0
    };
    AggregateSummary {
        total,
        high,
        medium,
        avg_combined_score,
    }
}

/// Candidates at or above the tier's cutoff, in input order. A view, not a
/// copy of the candidate data.
pub fn tier_view<'a>(
    candidates: &'a [MatchCandidate],
    tier: ConfidenceTier,
) -> Vec<&'a MatchCandidate> {
    candidates
        .iter()
        .filter(|c| tier.includes(c.combined_score))
        .collect()
}

/// Top K candidates by combined score, descending. The sort is stable, so
/// equal scores keep their input order.
pub fn top_k<'a>(candidates: &'a [MatchCandidate], k: usize) -> Vec<&'a MatchCandidate> {
    let mut ranked: Vec<&MatchCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(k);
    ranked
}
