use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use matcher_lib::ingest::load_uploaded_records;
use matcher_lib::matching::aggregator::{summarize, tier_view, top_k};
use matcher_lib::matching::db::PostgresReferenceSource;
use matcher_lib::matching::manager::{run_matching_pipeline, MAX_CONCURRENT_PARTITION_TASKS};
use matcher_lib::models::matching::{ConfidenceTier, MatchThresholds};
use matcher_lib::utils::cancellation::CancellationToken;
use matcher_lib::utils::db_connect::{connect, get_pool_status};
use matcher_lib::utils::env::load_env;
use matcher_lib::utils::get_memory_usage;
use matcher_lib::utils::progress_bars::logging::{log_run_completion, log_run_start};
use matcher_lib::utils::progress_bars::progress_config::ProgressConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Match an uploaded customer list against the CRM reference store.
#[derive(Parser, Debug)]
#[command(name = "crm_match", version, about)]
struct Args {
    /// Path to the uploaded customer list (CSV)
    #[arg(long)]
    input: PathBuf,

    /// Minimum company-name similarity in [0,1]
    #[arg(long, default_value_t = 0.8)]
    min_name_similarity: f64,

    /// Minimum address similarity in [0,1]
    #[arg(long, default_value_t = 0.8)]
    min_address_similarity: f64,

    /// Confidence tier to report: high, medium, or all
    #[arg(long, default_value = "all")]
    tier: String,

    /// How many top candidates to list in the summary
    #[arg(long, default_value_t = 10)]
    top: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = Args::parse();

    let thresholds = MatchThresholds::new(args.min_name_similarity, args.min_address_similarity);
    thresholds.validate().context("Invalid threshold flags")?;
    let tier = match ConfidenceTier::parse(&args.tier) {
        Some(tier) => tier,
        None => bail!("Unknown tier '{}': expected high, medium, or all", args.tier),
    };

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(3));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Initializing...");
        pb
    });

    let run_id = Uuid::new_v4().to_string();
    let run_timestamp = Utc::now();
    info!("Run {} started at {}", run_id, run_timestamp.to_rfc3339());

    let pool = connect().await.context("Failed to connect to database")?;

    // Phase 1: load the uploaded list.
    if let Some(pb) = &main_pb {
        pb.set_message("Phase 1: Loading upload");
    }
    let phase1_start = Instant::now();
    let uploaded =
        load_uploaded_records(&args.input).context("Failed to load uploaded records")?;
    if uploaded.is_empty() {
        warn!("Upload file contains no records, nothing to match");
        return Ok(());
    }
    let ingest_duration = phase1_start.elapsed();
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message(format!("Phase 2: Matching {} records", uploaded.len()));
    }

    // Ctrl-C cancels cooperatively: the run returns a valid partial result.
    let cancellation = CancellationToken::new();
    {
        let token = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current partitions and stopping");
                token.cancel();
            }
        });
    }

    // Phase 2: match against the reference store, partition by partition.
    log_run_start(&run_id, uploaded.len(), MAX_CONCURRENT_PARTITION_TASKS);
    let phase2_start = Instant::now();
    let source = Arc::new(PostgresReferenceSource::new(pool.clone()));
    let outcome = run_matching_pipeline(
        &uploaded,
        source,
        thresholds,
        cancellation,
        multi_progress.clone(),
    )
    .await?;
    let matching_duration = phase2_start.elapsed();
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 3: Aggregating");
    }

    // Phase 3: aggregate and report.
    let summary = summarize(&outcome.candidates);
    let tiered = tier_view(&outcome.candidates, tier);
    log_run_completion(
        &run_id,
        matching_duration,
        &outcome.stats,
        &outcome.partition_failures,
        outcome.cancelled,
    );
    info!(
        "Confidence tiers: {} high (>= 0.9), {} medium (>= 0.8), {} total",
        summary.high, summary.medium, summary.total
    );
    info!(
        "Reporting tier '{}': {} candidates (avg combined score {:.3})",
        tier.label(),
        tiered.len(),
        summary.avg_combined_score
    );

    let ranked = top_k(&outcome.candidates, args.top);
    if !ranked.is_empty() {
        info!("Top {} candidates by combined score:", ranked.len());
        for (i, candidate) in ranked.iter().enumerate() {
            info!(
                "  {:>2}. {:.3}  {} ({}, {}) -> {}",
                i + 1,
                candidate.combined_score,
                candidate.uploaded.company_name,
                candidate.uploaded.company_city,
                candidate.uploaded.company_state,
                candidate.reference.record.company_name
            );
        }
    }

    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message(format!("Done: {} candidates", summary.total));
    }

    info!("=== Timing Breakdown ===");
    info!("Phase 1 (Ingestion): {:.2?}", ingest_duration);
    info!("Phase 2 (Matching): {:.2?}", matching_duration);
    if progress_config.should_show_memory() {
        let final_memory_mb = get_memory_usage().await;
        info!("Final memory usage: {} MB", final_memory_mb);
    }
    if progress_config.should_show_db_connection_stats() {
        let (pool_size, available_connections, in_use_connections) = get_pool_status(&pool);
        info!(
            "Final DB Connection Pool Status: Total: {}, Available: {}, In Use: {}",
            pool_size, available_connections, in_use_connections
        );
    }

    if outcome.cancelled {
        info!("Run {} finished early (cancelled) with partial results", run_id);
    } else {
        info!("Run {} completed successfully", run_id);
    }
    Ok(())
}
