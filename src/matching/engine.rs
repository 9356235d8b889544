// src/matching/engine.rs - Partitioned pairwise matching of uploads against the reference store
use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;

use crate::matching::similarity::similarity;
use crate::matching::source::ReferenceSource;
use crate::models::core::{NormalizedRecord, NormalizedReference, RawRecord};
use crate::models::matching::{MatchCandidate, MatchOutcome, MatchThresholds, PartitionFailure};
use crate::update_progress;
use crate::utils::cancellation::CancellationToken;
use crate::utils::progress_bars::logging::PartitionLogger;
use crate::utils::progress_bars::progress_callback::ProgressCallback;

/// How many uploaded-record scans to run between cancellation checks inside
/// a partition. Checked at scan start as well, so a token cancelled during a
/// fetch stops the partition before any pair is compared.
pub const CANCELLATION_CHECK_INTERVAL: usize = 25;

/// One partition's scan result, merged into the run outcome by the driver.
#[derive(Debug, Default)]
pub struct PartitionScan {
    pub candidates: Vec<MatchCandidate>,
    pub pairs_compared: usize,
    pub cancelled: bool,
}

/// Group uploaded records by canonical state code, normalizing each record
/// exactly once. Unmapped or empty codes form their own partition under the
/// literal canonicalized value. Sorted keys give a deterministic partition
/// order for the sequential driver.
pub fn partition_by_state(uploaded: &[RawRecord]) -> BTreeMap<String, Vec<NormalizedRecord>> {
    let mut partitions: BTreeMap<String, Vec<NormalizedRecord>> = BTreeMap::new();
    for record in uploaded {
        let normalized = NormalizedRecord::from_raw(record.clone());
        partitions
            .entry(normalized.state_code.clone())
            .or_default()
            .push(normalized);
    }
    partitions
}

/// Scan every (uploaded, reference) pair in one partition, emitting a
/// candidate iff both similarities meet their thresholds (inclusive).
/// Purely synchronous; all records are already normalized.
pub fn match_partition(
    uploaded: &[NormalizedRecord],
    references: &[NormalizedReference],
    thresholds: &MatchThresholds,
    cancellation: &CancellationToken,
) -> PartitionScan {
    let mut scan = PartitionScan::default();
    for (i, upload) in uploaded.iter().enumerate() {
        if i % CANCELLATION_CHECK_INTERVAL == 0 && cancellation.is_cancelled() {
            scan.cancelled = true;
            return scan;
        }
        for reference in references {
            let name_sim = similarity(&upload.normalized_name, &reference.normalized_name);
            let addr_sim = similarity(&upload.normalized_address, &reference.normalized_address);
            scan.pairs_compared += 1;
            if name_sim >= thresholds.min_name_similarity
                && addr_sim >= thresholds.min_address_similarity
            {
                scan.candidates.push(MatchCandidate::new(
                    upload.record.clone(),
                    reference.reference.clone(),
                    name_sim,
                    addr_sim,
                ));
            }
        }
    }
    scan
}

/// Sequential matching run over the whole uploaded set.
///
/// Partitions uploads by canonical state, fetches each partition's reference
/// records, and scans pairwise. A reference-source failure is isolated to
/// its partition; cancellation yields the candidates accumulated so far as a
/// valid partial result.
pub async fn find_matches(
    uploaded: &[RawRecord],
    source: &dyn ReferenceSource,
    thresholds: &MatchThresholds,
    cancellation: &CancellationToken,
    progress_callback: Option<ProgressCallback>,
) -> Result<MatchOutcome> {
    thresholds
        .validate()
        .context("Match thresholds out of range")?;

    let mut outcome = MatchOutcome::default();
    outcome.stats.uploaded_total = uploaded.len();

    update_progress!(
        progress_callback,
        "Partitioning",
        format!("{} uploaded records", uploaded.len())
    );
    let partitions = partition_by_state(uploaded);
    outcome.stats.partitions_total = partitions.len();
    debug!(
        "Partitioned {} uploaded records into {} state partitions",
        uploaded.len(),
        partitions.len()
    );

    for (partition_key, batch) in &partitions {
        if cancellation.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let logger = PartitionLogger::new(partition_key);
        logger.log_start(batch.len());
        update_progress!(
            progress_callback,
            "Matching",
            format!("partition {} ({} records)", partition_key, batch.len())
        );

        let references = match source.fetch(partition_key).await {
            Ok(references) => references,
            Err(e) => {
                logger.log_failed(&e);
                outcome.stats.partitions_failed += 1;
                outcome.partition_failures.push(PartitionFailure {
                    partition_key: partition_key.clone(),
                    error: format!("{:#}", e),
                });
                continue;
            }
        };
        if references.is_empty() {
            debug!(
                "[{}] no reference records for partition, skipping",
                partition_key
            );
            outcome.stats.absorb_partition(0, 0, 0);
            continue;
        }
        logger.log_fetch_complete(references.len());

        // Normalize once per fetch, not per comparison.
        let normalized_references: Vec<NormalizedReference> = references
            .into_iter()
            .map(NormalizedReference::from_reference)
            .collect();

        let scan = match_partition(batch, &normalized_references, thresholds, cancellation);
        logger.log_scan_complete(scan.pairs_compared, scan.candidates.len());
        outcome.stats.absorb_partition(
            normalized_references.len(),
            scan.pairs_compared,
            scan.candidates.len(),
        );
        outcome.candidates.extend(scan.candidates);

        if scan.cancelled {
            logger.log_cancelled();
            outcome.cancelled = true;
            break;
        }
    }

    if outcome.cancelled {
        warn!(
            "Matching run cancelled: returning {} candidates accumulated so far",
            outcome.candidates.len()
        );
    }
    update_progress!(
        progress_callback,
        "Completed",
        format!("{} candidates", outcome.candidates.len())
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::source::InMemorySource;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    use crate::models::core::ReferenceRecord;

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

    fn reference(name: &str, address: &str, state: &str, partition_tag: &str) -> ReferenceRecord {
        let mut attributes = HashMap::new();
        attributes.insert("systemId".to_string(), json!(format!("CRM-{}", name)));
        attributes.insert("partitionTag".to_string(), json!(partition_tag));
        ReferenceRecord {
            record: upload(name, address, state),
            attributes,
        }
    }

    fn thresholds(name: f64, address: f64) -> MatchThresholds {
        MatchThresholds::new(name, address)
    }

    #[tokio::test]
    async fn test_end_to_end_single_candidate() {
        let source = InMemorySource::new().with_partition(
            "CA",
            vec![reference("JOES PIZZA", "123 MAIN ST", "CA", "CA")],
        );
        let uploaded = vec![upload("Joe's Pizza", "123 Main Street", "California")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        let candidate = &outcome.candidates[0];
        assert!(candidate.name_similarity > 0.99);
        assert!(candidate.address_similarity > 0.99);
        assert!(candidate.combined_score > 0.99);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.stats.partitions_total, 1);
        assert_eq!(outcome.stats.candidates_found, 1);
    }

    #[tokio::test]
    async fn test_passthrough_attributes_preserved() {
        let source = InMemorySource::new().with_partition(
            "CA",
            vec![reference("JOES PIZZA", "123 MAIN ST", "CA", "CA")],
        );
        let uploaded = vec![upload("Joes Pizza", "123 Main St", "CA")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        let attributes = &outcome.candidates[0].reference.attributes;
        assert_eq!(attributes["systemId"], json!("CRM-JOES PIZZA"));
    }

    #[tokio::test]
    async fn test_partition_isolation() {
        // The same company exists in both partitions; the CA upload must only
        // ever be compared against the CA fetch.
        let source = InMemorySource::new()
            .with_partition(
                "CA",
                vec![reference("ACME", "1 FIRST AVE", "CA", "from-ca")],
            )
            .with_partition(
                "TX",
                vec![reference("ACME", "1 FIRST AVE", "TX", "from-tx")],
            );
        let uploaded = vec![upload("Acme", "1 First Avenue", "California")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(
            outcome.candidates[0].reference.attributes["partitionTag"],
            json!("from-ca")
        );
    }

    #[tokio::test]
    async fn test_unmapped_state_forms_own_partition() {
        let source = InMemorySource::new().with_partition(
            "NEVERLAND",
            vec![reference("LOST BOYS CO", "2 SECOND ST", "NEVERLAND", "nl")],
        );
        let uploaded = vec![upload("Lost Boys Co", "2 Second Street", "Neverland")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        // similarity("ABCD", "ABD") is exactly 6/7.
        let boundary = 6.0 / 7.0;
        let source = InMemorySource::new()
            .with_partition("CA", vec![reference("ABD", "1 FIRST AVE", "CA", "ca")]);
        let uploaded = vec![upload("ABCD", "1 First Avenue", "CA")];

        let at_boundary = find_matches(
            &uploaded,
            &source,
            &thresholds(boundary, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(at_boundary.candidates.len(), 1);

        let above_boundary = find_matches(
            &uploaded,
            &source,
            &thresholds(boundary + 1e-9, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
        assert!(above_boundary.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_many_to_many_candidates_kept() {
        let source = InMemorySource::new().with_partition(
            "CA",
            vec![
                reference("JOES PIZZA", "123 MAIN ST", "CA", "a"),
                reference("JOES PIZZA CO", "123 MAIN ST", "CA", "b"),
            ],
        );
        let uploaded = vec![upload("Joes Pizza", "123 Main Street", "CA")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.7, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.candidates.len(), 2);
    }

    struct PartiallyFailingSource {
        inner: InMemorySource,
    }

    #[async_trait]
    impl ReferenceSource for PartiallyFailingSource {
        async fn fetch(&self, partition_key: &str) -> Result<Vec<ReferenceRecord>> {
            if partition_key == "TX" {
                bail!("reference store unavailable for TX");
            }
            self.inner.fetch(partition_key).await
        }
    }

    #[tokio::test]
    async fn test_partition_failure_is_isolated() {
        let source = PartiallyFailingSource {
            inner: InMemorySource::new().with_partition(
                "CA",
                vec![reference("JOES PIZZA", "123 MAIN ST", "CA", "ca")],
            ),
        };
        let uploaded = vec![
            upload("Joes Pizza", "123 Main St", "CA"),
            upload("Lone Star BBQ", "5 Ranch Road", "TX"),
        ];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].uploaded.company_state, "CA");
        assert_eq!(outcome.partition_failures.len(), 1);
        assert_eq!(outcome.partition_failures[0].partition_key, "TX");
        assert_eq!(outcome.stats.partitions_failed, 1);
        assert!(!outcome.cancelled);
    }

    struct CancellingSource {
        inner: InMemorySource,
        token: CancellationToken,
        cancel_on_fetch: usize,
        fetches: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ReferenceSource for CancellingSource {
        async fn fetch(&self, partition_key: &str) -> Result<Vec<ReferenceRecord>> {
            let n = self
                .fetches
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            if n == self.cancel_on_fetch {
                self.token.cancel();
            }
            self.inner.fetch(partition_key).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_result() {
        // Partitions iterate in sorted order: AZ, CA, TX. Cancelling on the
        // second fetch means partition AZ completes and nothing after it does.
        let token = CancellationToken::new();
        let inner = InMemorySource::new()
            .with_partition("AZ", vec![reference("CACTUS CAFE", "9 DESERT RD", "AZ", "az")])
            .with_partition("CA", vec![reference("JOES PIZZA", "123 MAIN ST", "CA", "ca")])
            .with_partition("TX", vec![reference("LONE STAR", "5 RANCH RD", "TX", "tx")]);
        let source = CancellingSource {
            inner,
            token: token.clone(),
            cancel_on_fetch: 2,
            fetches: std::sync::atomic::AtomicUsize::new(0),
        };
        let uploaded = vec![
            upload("Cactus Cafe", "9 Desert Road", "AZ"),
            upload("Joes Pizza", "123 Main St", "CA"),
            upload("Lone Star", "5 Ranch Rd", "TX"),
        ];
        let outcome = find_matches(&uploaded, &source, &thresholds(0.8, 0.8), &token, None)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].uploaded.company_state, "AZ");
    }

    #[tokio::test]
    async fn test_empty_partition_fetch_is_not_an_error() {
        let source = InMemorySource::new();
        let uploaded = vec![upload("Joes Pizza", "123 Main St", "CA")];
        let outcome = find_matches(
            &uploaded,
            &source,
            &thresholds(0.8, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
        assert!(outcome.candidates.is_empty());
        assert!(outcome.partition_failures.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_thresholds_are_fatal() {
        let source = InMemorySource::new();
        let uploaded = vec![upload("Joes Pizza", "123 Main St", "CA")];
        let result = find_matches(
            &uploaded,
            &source,
            &thresholds(1.5, 0.8),
            &CancellationToken::new(),
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
