// src/models/stats_models.rs - Run-level counters for the matching pipeline
use serde::Serialize;

/// Counters accumulated over a matching run, carried on the outcome and
/// surfaced in the end-of-run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchRunStats {
    pub uploaded_total: usize,
    pub partitions_total: usize,
    pub partitions_processed: usize,
    pub partitions_failed: usize,
    pub reference_records_scanned: usize,
    pub pairs_compared: usize,
    pub candidates_found: usize,
}

impl MatchRunStats {
    /// Fold one partition's counters into the run totals.
    pub fn absorb_partition(&mut self, reference_count: usize, pairs: usize, candidates: usize) {
        self.partitions_processed += 1;
        self.reference_records_scanned += reference_count;
        self.pairs_compared += pairs;
        self.candidates_found += candidates;
    }
}
