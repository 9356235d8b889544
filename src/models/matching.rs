// src/models/matching.rs - Match candidates, thresholds, and run outcome types
use anyhow::{bail, Result};
use serde::Serialize;

use crate::models::core::{RawRecord, ReferenceRecord};
use crate::models::stats_models::MatchRunStats;

/// Caller-supplied minimum similarities, both in [0,1]. The engine validates
/// the range up front; calibration itself is a caller concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub min_name_similarity: f64,
    pub min_address_similarity: f64,
}

impl MatchThresholds {
    pub fn new(min_name_similarity: f64, min_address_similarity: f64) -> Self {
        Self {
            min_name_similarity,
            min_address_similarity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("min_name_similarity", self.min_name_similarity),
            ("min_address_similarity", self.min_address_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                bail!("{} must be in [0, 1], got {}", label, value);
            }
        }
        Ok(())
    }
}

/// A scored pairing of one uploaded record with one reference record.
/// Created only when both similarities meet their thresholds; immutable.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub uploaded: RawRecord,
    pub reference: ReferenceRecord,
    pub name_similarity: f64,
    pub address_similarity: f64,
    pub combined_score: f64,
}

impl MatchCandidate {
    pub fn new(
        uploaded: RawRecord,
        reference: ReferenceRecord,
        name_similarity: f64,
        address_similarity: f64,
    ) -> Self {
        let combined_score = (name_similarity + address_similarity) / 2.0;
        Self {
            uploaded,
            reference,
            name_similarity,
            address_similarity,
            combined_score,
        }
    }
}

/// A reference-source failure for one partition. The run continues; the
/// failure is surfaced here for the caller to render.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionFailure {
    pub partition_key: String,
    pub error: String,
}

/// The result of a matching run: all qualifying candidates, any per-partition
/// fetch failures, run counters, and whether the run was cancelled early.
/// A cancelled run is a valid partial result, not an error.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub candidates: Vec<MatchCandidate>,
    pub partition_failures: Vec<PartitionFailure>,
    pub stats: MatchRunStats,
    pub cancelled: bool,
}

/// Confidence tiers over combined scores. Tiers are views (filters) applied
/// downstream, not separate storage; cutoffs are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    All,
}

impl ConfidenceTier {
    pub fn cutoff(&self) -> Option<f64> {
        match self {
            ConfidenceTier::High => Some(0.9),
            ConfidenceTier::Medium => Some(0.8),
            ConfidenceTier::All => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::All => "all",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "high" => Some(ConfidenceTier::High),
            "medium" => Some(ConfidenceTier::Medium),
            "all" => Some(ConfidenceTier::All),
            _ => None,
        }
    }

    pub fn includes(&self, combined_score: f64) -> bool {
        match self.cutoff() {
            Some(cutoff) => combined_score >= cutoff,
            None => true,
        }
    }
}
