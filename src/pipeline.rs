//! Pipeline orchestration.
//!
//! Runs the five stages in strict sequence — fetch → download → extract →
//! enrich → persist — with a hard barrier between stages: each stage fully
//! materializes its output before the next begins. Resumability comes from
//! the stages' own idempotency (files on disk, upsert-by-key), not from a
//! checkpoint log, so an interrupted run can simply be re-executed.

use std::time::{Duration, Instant};

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::download::download_attachments;
use crate::enrich::{enrich_documents, RetryPolicy};
use crate::extract::extract_documents;
use crate::fetch::fetch_pdf_attachments;
use crate::metadata::MetadataInference;
use crate::models::EnrichedDocument;
use crate::persist::persist_documents;
use crate::progress::{PipelineEvent, PipelineProgressReporter};
use crate::source::{AttachmentTransport, SourceApi};

/// Counters for one pipeline run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attachments: usize,
    pub downloaded: usize,
    pub extracted: usize,
    pub chars_extracted: usize,
    pub titles: usize,
    pub dates: usize,
    pub persisted: u64,
}

/// Execute one full run against the configured channel.
///
/// Finding nothing to do is success: an empty fetch or download result
/// exits early with zeroed counters. Per-item failures inside the stages
/// never surface here; only stage-fatal errors (source API transport,
/// store loss) abort the run.
pub async fn run_pipeline(
    config: &Config,
    source: &dyn SourceApi,
    transport: &dyn AttachmentTransport,
    inference: &dyn MetadataInference,
    pool: &SqlitePool,
    reporter: &dyn PipelineProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mut summary = RunSummary::default();

    // Stage 1: fetch. All-or-nothing; errors propagate.
    reporter.report(PipelineEvent::StageStarted { stage: "fetch" });
    let attachments =
        fetch_pdf_attachments(source, &config.source.channel, config.source.page_size).await?;
    summary.attachments = attachments.len();
    reporter.report(PipelineEvent::StageCompleted {
        stage: "fetch",
        items: attachments.len() as u64,
    });

    if attachments.is_empty() {
        println!("run {}", config.source.channel);
        println!("  no PDF attachments found");
        println!("ok");
        return Ok(summary);
    }

    // Stage 2: download. Failed items are dropped, the rest continue.
    reporter.report(PipelineEvent::StageStarted { stage: "download" });
    let downloaded = download_attachments(transport, attachments, &config.storage.root).await?;
    summary.downloaded = downloaded.len();
    reporter.report(PipelineEvent::StageCompleted {
        stage: "download",
        items: downloaded.len() as u64,
    });

    if downloaded.is_empty() {
        println!("run {}", config.source.channel);
        println!("  attachments found: {}", summary.attachments);
        println!("  downloaded: 0, nothing to process");
        println!("ok");
        return Ok(summary);
    }

    // Stage 3: extract in parallel, order-preserving.
    reporter.report(PipelineEvent::StageStarted { stage: "extract" });
    let extracted = extract_documents(downloaded, config.extract.max_workers).await?;
    summary.extracted = extracted.len();
    summary.chars_extracted = extracted.iter().map(|d| d.text_length).sum();
    reporter.report(PipelineEvent::StageCompleted {
        stage: "extract",
        items: extracted.len() as u64,
    });

    // Stage 4: enrich sequentially under the retry policy.
    reporter.report(PipelineEvent::StageStarted { stage: "enrich" });
    let policy = RetryPolicy::from_config(&config.enrich);
    let enriched = enrich_documents(
        inference,
        extracted,
        &policy,
        config.enrich.text_prefix_chars,
        Duration::from_millis(config.enrich.inter_call_delay_ms),
    )
    .await;
    summary.titles = enriched.iter().filter(|d| d.title.is_some()).count();
    summary.dates = enriched
        .iter()
        .filter(|d| d.publication_date.is_some())
        .count();
    reporter.report(PipelineEvent::StageCompleted {
        stage: "enrich",
        items: enriched.len() as u64,
    });

    // Stage 5: persist.
    reporter.report(PipelineEvent::StageStarted { stage: "persist" });
    summary.persisted = persist_documents(pool, &enriched).await;
    reporter.report(PipelineEvent::StageCompleted {
        stage: "persist",
        items: summary.persisted,
    });

    print_summary(&config.source.channel, &summary, &enriched, started.elapsed());
    Ok(summary)
}

fn print_summary(
    channel: &str,
    summary: &RunSummary,
    enriched: &[EnrichedDocument],
    elapsed: Duration,
) {
    println!("run {}", channel);
    println!("  attachments found: {}", summary.attachments);
    println!("  downloaded: {}", summary.downloaded);
    println!(
        "  extracted: {} ({} chars)",
        summary.extracted, summary.chars_extracted
    );
    println!(
        "  enriched: {} ({} titles, {} dates)",
        enriched.len(),
        summary.titles,
        summary.dates
    );
    println!("  persisted: {}", summary.persisted);
    println!("  elapsed: {:.2}s", elapsed.as_secs_f64());
    println!("ok");
}
