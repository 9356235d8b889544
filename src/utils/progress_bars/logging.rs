// src/utils/progress_bars/logging.rs - Lifecycle logging for matching runs
use log::{info, warn};
use std::time::{Duration, Instant};

use crate::models::matching::PartitionFailure;
use crate::models::stats_models::MatchRunStats;

/// Per-partition lifecycle logger. One instance per partition scan.
#[derive(Clone)]
pub struct PartitionLogger {
    partition_key: String,
    start_time: Instant,
}

impl PartitionLogger {
    pub fn new(partition_key: &str) -> Self {
        Self {
            partition_key: partition_key.to_string(),
            start_time: Instant::now(),
        }
    }

    fn key_display(&self) -> &str {
        if self.partition_key.is_empty() {
            "<blank>"
        } else {
            &self.partition_key
        }
    }

    pub fn log_start(&self, uploaded_count: usize) {
        info!(
            "[{}] 📍 Scanning partition ({} uploaded records)",
            self.key_display(),
            uploaded_count
        );
    }

    pub fn log_fetch_complete(&self, reference_count: usize) {
        info!(
            "[{}] 📊 Fetched {} reference records [+{:.1}s]",
            self.key_display(),
            reference_count,
            self.start_time.elapsed().as_secs_f32()
        );
    }

    pub fn log_scan_complete(&self, pairs_compared: usize, candidates_found: usize) {
        info!(
            "[{}] ✅ Scan complete: {} pairs compared, {} candidates [+{:.1}s]",
            self.key_display(),
            pairs_compared,
            candidates_found,
            self.start_time.elapsed().as_secs_f32()
        );
    }

    pub fn log_failed(&self, error: &anyhow::Error) {
        warn!(
            "[{}] ❌ Reference fetch failed, partition contributes zero candidates: {:#}",
            self.key_display(),
            error
        );
    }

    pub fn log_cancelled(&self) {
        info!(
            "[{}] 🛑 Cancelled mid-scan, keeping candidates accumulated so far",
            self.key_display()
        );
    }
}

pub fn log_run_start(run_id: &str, uploaded_total: usize, max_concurrent: usize) {
    info!(
        "🚀 Starting matching run {} ({} uploaded records, up to {} concurrent partitions)",
        run_id, uploaded_total, max_concurrent
    );
}

pub fn log_run_completion(
    run_id: &str,
    duration: Duration,
    stats: &MatchRunStats,
    failures: &[PartitionFailure],
    cancelled: bool,
) {
    info!("=== Matching Run Summary ===");
    info!("Run ID: {}", run_id);
    info!(
        "Partitions: {} total, {} processed, {} failed",
        stats.partitions_total, stats.partitions_processed, stats.partitions_failed
    );
    info!(
        "Compared {} pairs across {} reference records",
        stats.pairs_compared, stats.reference_records_scanned
    );
    info!("Candidates found: {}", stats.candidates_found);
    if cancelled {
        warn!("Run was cancelled: results are a valid partial set");
    }
    for failure in failures {
        warn!(
            "Partition {} failed: {}",
            if failure.partition_key.is_empty() {
                "<blank>"
            } else {
                &failure.partition_key
            },
            failure.error
        );
    }
    info!("Total matching time: {:.2?}", duration);
}
