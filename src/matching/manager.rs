// src/matching/manager.rs - Concurrent partition driver for matching runs
use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::matching::engine::{match_partition, partition_by_state, PartitionScan};
use crate::matching::source::ReferenceSource;
use crate::models::core::{NormalizedRecord, NormalizedReference, RawRecord};
use crate::models::matching::{MatchOutcome, MatchThresholds, PartitionFailure};
use crate::utils::cancellation::CancellationToken;
use crate::utils::progress_bars::logging::PartitionLogger;
use crate::utils::progress_bars::progress_callback::{
    PartitionTaskStatus, StatusTracker, TaskStatus,
};

/// Partitions touch disjoint reference subsets, so they parallelize freely;
/// the bound keeps reference-store load reasonable.
pub const MAX_CONCURRENT_PARTITION_TASKS: usize = 4;

enum PartitionTaskOutcome {
    Completed {
        reference_count: usize,
        scan: PartitionScan,
    },
    Failed {
        error: anyhow::Error,
    },
    /// Cancelled before the partition started; contributes nothing.
    Skipped,
}

/// Concurrent matching run: one task per state partition, bounded by a
/// semaphore, merged post-hoc in partition-key order. Semantics per
/// partition are identical to the sequential engine driver.
pub async fn run_matching_pipeline(
    uploaded: &[RawRecord],
    source: Arc<dyn ReferenceSource>,
    thresholds: MatchThresholds,
    cancellation: CancellationToken,
    multi_progress: Option<MultiProgress>,
) -> Result<MatchOutcome> {
    thresholds
        .validate()
        .context("Match thresholds out of range")?;
    let start_time = Instant::now();

    let partitions = partition_by_state(uploaded);
    let partition_keys: Vec<String> = partitions.keys().cloned().collect();

    let mut outcome = MatchOutcome::default();
    outcome.stats.uploaded_total = uploaded.len();
    outcome.stats.partitions_total = partitions.len();

    let status_tracker: StatusTracker = Arc::new(Mutex::new(HashMap::new()));
    {
        let mut tracker = status_tracker.lock().await;
        for (key, batch) in &partitions {
            tracker.insert(key.clone(), PartitionTaskStatus::queued(key, batch.len()));
        }
    }

    let partitions_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(partitions.len() as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "  {spinner:.blue} [{elapsed_precise}] {bar:30.green/blue} {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Scanning partitions...");
        pb
    });

    info!(
        "📋 {} partitions queued ({} max concurrent)",
        partitions.len(),
        MAX_CONCURRENT_PARTITION_TASKS
    );

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PARTITION_TASKS));
    let mut tasks: Vec<(String, JoinHandle<PartitionTaskOutcome>)> = Vec::new();

    for (partition_key, batch) in partitions {
        let task = spawn_partition_task(
            partition_key.clone(),
            batch,
            Arc::clone(&source),
            thresholds,
            cancellation.clone(),
            Arc::clone(&semaphore),
            Arc::clone(&status_tracker),
            partitions_pb.clone(),
        );
        tasks.push((partition_key, task));
    }

    let (keys, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let join_results = join_all(handles).await;

    // Merge per-partition results in key order; the BTreeMap iteration above
    // already queued them sorted, and join_all preserves input order.
    for (key, join_result) in keys.into_iter().zip(join_results) {
        match join_result {
            Ok(PartitionTaskOutcome::Completed {
                reference_count,
                scan,
            }) => {
                outcome.stats.absorb_partition(
                    reference_count,
                    scan.pairs_compared,
                    scan.candidates.len(),
                );
                outcome.candidates.extend(scan.candidates);
                if scan.cancelled {
                    outcome.cancelled = true;
                }
            }
            Ok(PartitionTaskOutcome::Failed { error }) => {
                outcome.stats.partitions_failed += 1;
                outcome.partition_failures.push(PartitionFailure {
                    partition_key: key,
                    error: format!("{:#}", error),
                });
            }
            Ok(PartitionTaskOutcome::Skipped) => {
                outcome.cancelled = true;
            }
            Err(e) => {
                error!("💥 Partition task {} panicked or failed to join: {:?}", key, e);
                outcome.stats.partitions_failed += 1;
                outcome.partition_failures.push(PartitionFailure {
                    partition_key: key,
                    error: format!("task join failure: {}", e),
                });
            }
        }
    }
    if cancellation.is_cancelled() {
        outcome.cancelled = true;
    }

    if let Some(pb) = &partitions_pb {
        pb.finish_with_message(format!("{} candidates found", outcome.candidates.len()));
    }

    log_partition_summary(&status_tracker, &partition_keys).await;

    if outcome.cancelled {
        warn!(
            "Matching run cancelled: {} candidates from completed partitions",
            outcome.candidates.len()
        );
    }
    info!(
        "🏁 Matching complete: {} candidates from {} partitions in {:.2?}",
        outcome.candidates.len(),
        outcome.stats.partitions_total,
        start_time.elapsed()
    );

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn spawn_partition_task(
    partition_key: String,
    batch: Vec<NormalizedRecord>,
    source: Arc<dyn ReferenceSource>,
    thresholds: MatchThresholds,
    cancellation: CancellationToken,
    semaphore: Arc<Semaphore>,
    status_tracker: StatusTracker,
    progress_bar: Option<ProgressBar>,
) -> JoinHandle<PartitionTaskOutcome> {
    tokio::spawn(async move {
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return PartitionTaskOutcome::Skipped,
        };

        if cancellation.is_cancelled() {
            set_status(&status_tracker, &partition_key, |s| {
                s.status = TaskStatus::Cancelled;
                s.end_time = Some(Instant::now());
            })
            .await;
            return PartitionTaskOutcome::Skipped;
        }

        let logger = PartitionLogger::new(&partition_key);
        logger.log_start(batch.len());
        set_status(&status_tracker, &partition_key, |s| {
            s.status = TaskStatus::Running;
            s.start_time = Instant::now();
        })
        .await;

        let references = match source.fetch(&partition_key).await {
            Ok(references) => references,
            Err(e) => {
                logger.log_failed(&e);
                set_status(&status_tracker, &partition_key, |s| {
                    s.status = TaskStatus::Failed;
                    s.error = Some(format!("{:#}", e));
                    s.end_time = Some(Instant::now());
                })
                .await;
                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
                return PartitionTaskOutcome::Failed { error: e };
            }
        };

        let reference_count = references.len();
        if reference_count > 0 {
            logger.log_fetch_complete(reference_count);
        }

        let normalized_references: Vec<NormalizedReference> = references
            .into_iter()
            .map(NormalizedReference::from_reference)
            .collect();
        let scan = match_partition(&batch, &normalized_references, &thresholds, &cancellation);
        logger.log_scan_complete(scan.pairs_compared, scan.candidates.len());
        if scan.cancelled {
            logger.log_cancelled();
        }

        set_status(&status_tracker, &partition_key, |s| {
            s.status = if scan.cancelled {
                TaskStatus::Cancelled
            } else {
                TaskStatus::Complete
            };
            s.reference_count = reference_count;
            s.pairs_compared = scan.pairs_compared;
            s.candidates_found = scan.candidates.len();
            s.end_time = Some(Instant::now());
        })
        .await;
        if let Some(pb) = &progress_bar {
            pb.inc(1);
        }

        PartitionTaskOutcome::Completed {
            reference_count,
            scan,
        }
    })
}

async fn set_status<F>(tracker: &StatusTracker, partition_key: &str, update: F)
where
    F: FnOnce(&mut PartitionTaskStatus),
{
    let mut map = tracker.lock().await;
    if let Some(status) = map.get_mut(partition_key) {
        update(status);
    }
}

async fn log_partition_summary(tracker: &StatusTracker, partition_keys: &[String]) {
    let map = tracker.lock().await;
    info!("📋 ===== PARTITION SUMMARY =====");
    for key in partition_keys {
        if let Some(status) = map.get(key) {
            let key_display = if key.is_empty() { "<blank>" } else { key };
            match status.status {
                TaskStatus::Complete => info!(
                    "  {} {}: {} uploaded x {} reference, {} pairs, {} candidates, {:.2}s",
                    status.status.emoji(),
                    key_display,
                    status.uploaded_count,
                    status.reference_count,
                    status.pairs_compared,
                    status.candidates_found,
                    status.elapsed_secs()
                ),
                TaskStatus::Failed => info!(
                    "  {} {}: {} ({:.2}s)",
                    status.status.emoji(),
                    key_display,
                    status.error.as_deref().unwrap_or("unknown error"),
                    status.elapsed_secs()
                ),
                _ => info!(
                    "  {} {}: {}",
                    status.status.emoji(),
                    key_display,
                    status.status.description()
                ),
            }
        }
    }
    info!("================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::engine::find_matches;
    use crate::matching::source::InMemorySource;
    use crate::models::core::ReferenceRecord;
    use std::collections::HashMap as StdHashMap;

    fn upload(name: &str, address: &str, state: &str) -> RawRecord {
        RawRecord {
            company_name: name.to_string(),
            company_address: address.to_string(),
            company_address2: None,
            company_city: "Anytown".to_string(),
            company_state: state.to_string(),
            company_zip_code: "90001".to_string(),
        }
    }

    fn reference(name: &str, address: &str, state: &str) -> ReferenceRecord {
        ReferenceRecord {
            record: upload(name, address, state),
            attributes: StdHashMap::new(),
        }
    }

    fn test_source() -> InMemorySource {
        InMemorySource::new()
            .with_partition("AZ", vec![reference("CACTUS CAFE", "9 DESERT RD", "AZ")])
            .with_partition(
                "CA",
                vec![
                    reference("JOES PIZZA", "123 MAIN ST", "CA"),
                    reference("ACME WIDGETS", "1 FIRST AVE", "CA"),
                ],
            )
            .with_partition("TX", vec![reference("LONE STAR", "5 RANCH RD", "TX")])
    }

    fn test_uploads() -> Vec<RawRecord> {
        vec![
            upload("Cactus Cafe", "9 Desert Road", "Arizona"),
            upload("Joes Pizza", "123 Main Street", "California"),
            upload("Acme Widgets", "1 First Avenue", "CA"),
            upload("Lone Star", "5 Ranch Rd", "Texas"),
        ]
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let thresholds = MatchThresholds::new(0.8, 0.8);

        let sequential = find_matches(
            &test_uploads(),
            &test_source(),
            &thresholds,
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        let concurrent = run_matching_pipeline(
            &test_uploads(),
            Arc::new(test_source()),
            thresholds,
            CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(sequential.candidates.len(), concurrent.candidates.len());
        let key = |c: &crate::models::matching::MatchCandidate| {
            (
                c.uploaded.company_name.clone(),
                c.reference.record.company_name.clone(),
            )
        };
        let mut sequential_keys: Vec<_> = sequential.candidates.iter().map(key).collect();
        let mut concurrent_keys: Vec<_> = concurrent.candidates.iter().map(key).collect();
        sequential_keys.sort();
        concurrent_keys.sort();
        assert_eq!(sequential_keys, concurrent_keys);
    }

    #[tokio::test]
    async fn test_merge_is_in_partition_key_order() {
        let outcome = run_matching_pipeline(
            &test_uploads(),
            Arc::new(test_source()),
            MatchThresholds::new(0.8, 0.8),
            CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        let states: Vec<String> = outcome
            .candidates
            .iter()
            .map(|c| c.reference.record.company_state.clone())
            .collect();
        let mut sorted = states.clone();
        sorted.sort();
        assert_eq!(states, sorted);
        assert_eq!(outcome.stats.partitions_total, 3);
        assert_eq!(outcome.stats.candidates_found, 4);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_yields_no_candidates() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome = run_matching_pipeline(
            &test_uploads(),
            Arc::new(test_source()),
            MatchThresholds::new(0.8, 0.8),
            token,
            None,
        )
        .await
        .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.candidates.is_empty());
    }
}
