//! Incremental index synchronization.
//!
//! Takes a batch of normalized documents and reconciles each one against the
//! index: existing entries for the same record identity are deleted before
//! the refreshed version is inserted, so the index never holds two versions
//! of one record. The delete-and-reinsert happens even when content is
//! unchanged. Each document commits independently; per-document failures are
//! recorded as skips and never abort the batch.
//!
//! [`run_update`] drives the full incremental flow: checkpoint window →
//! fetch → normalize → sync → checkpoint advance.

use anyhow::Result;

use crate::app::AppContext;
use crate::checkpoint::{now_timestamp, Checkpoint};
use crate::embedding;
use crate::feed::FeedClient;
use crate::index;
use crate::models::{CveRecord, Document};
use crate::normalize;

/// Why a record or document was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The raw record carried no identifier.
    MissingId,
    /// The index rejected the write.
    IndexWrite(String),
}

/// One skipped item, with the identity when one was available.
#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub cve_id: Option<String>,
    pub reason: SkipReason,
}

/// Aggregated outcome of a sync batch.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub added: u64,
    pub updated: u64,
    pub skipped: Vec<SkippedItem>,
    pub embedded: u64,
    pub embedding_pending: u64,
}

impl SyncReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Normalize a batch of raw records, collecting per-record skips.
pub fn normalize_batch(records: &[CveRecord]) -> (Vec<Document>, Vec<SkippedItem>) {
    let mut documents = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for record in records {
        match normalize::normalize(record) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                eprintln!(
                    "Warning: skipping record {}: {}",
                    record.id.as_deref().unwrap_or("(no id)"),
                    e
                );
                skipped.push(SkippedItem {
                    cve_id: record.id.clone(),
                    reason: SkipReason::MissingId,
                });
            }
        }
    }

    (documents, skipped)
}

/// Reconcile documents against the index one at a time.
///
/// Embedding is inline and non-fatal: a document whose embedding call fails
/// is still written, without a vector, and counted as pending.
pub async fn sync_documents(ctx: &AppContext, documents: &[Document]) -> SyncReport {
    let mut report = SyncReport::default();
    let model_name = ctx.embedder.model_name().to_string();
    let dims = ctx.embedder.dims();

    for (i, doc) in documents.iter().enumerate() {
        let existing = match index::ids_for_cve(&ctx.pool, &doc.cve_id).await {
            Ok(ids) => ids,
            Err(e) => {
                eprintln!("Warning: failed to look up {}: {}", doc.cve_id, e);
                report.skipped.push(SkippedItem {
                    cve_id: Some(doc.cve_id.clone()),
                    reason: SkipReason::IndexWrite(e.to_string()),
                });
                continue;
            }
        };

        let is_update = !existing.is_empty();
        if is_update {
            if let Err(e) = index::delete_by_ids(&ctx.pool, &existing).await {
                eprintln!("Warning: failed to delete old versions of {}: {}", doc.cve_id, e);
                report.skipped.push(SkippedItem {
                    cve_id: Some(doc.cve_id.clone()),
                    reason: SkipReason::IndexWrite(e.to_string()),
                });
                continue;
            }
        }

        let vector = if ctx.config.embedding.is_enabled() {
            match embedding::embed_query(ctx.embedder.as_ref(), &ctx.config.embedding, &doc.body)
                .await
            {
                Ok(v) => Some(v),
                Err(e) => {
                    eprintln!("Warning: embedding failed for {}: {}", doc.cve_id, e);
                    None
                }
            }
        } else {
            None
        };

        let vector_ref = vector.as_deref().map(|v| (model_name.as_str(), dims, v));
        if let Err(e) = index::insert_document(&ctx.pool, doc, vector_ref).await {
            eprintln!("Warning: failed to insert {}: {}", doc.cve_id, e);
            report.skipped.push(SkippedItem {
                cve_id: Some(doc.cve_id.clone()),
                reason: SkipReason::IndexWrite(e.to_string()),
            });
            continue;
        }

        if vector.is_some() {
            report.embedded += 1;
        } else {
            report.embedding_pending += 1;
        }

        if is_update {
            report.updated += 1;
        } else {
            report.added += 1;
        }

        if (i + 1) % 100 == 0 {
            println!("  processed {}/{} records...", i + 1, documents.len());
        }
    }

    report
}

/// Run one incremental sync: the window from the last checkpoint to now.
///
/// The checkpoint advances whenever the attempt completes — including the
/// empty-window no-op — and stays put if the run dies before that, so the
/// next run re-covers the same window.
pub async fn run_update(ctx: &AppContext) -> Result<SyncReport> {
    let checkpoint = Checkpoint::new(&ctx.config.checkpoint.path);
    let window_start = checkpoint.load()?;
    let window_end = now_timestamp();

    println!("sync");
    println!("  window: {} .. {}", window_start, window_end);

    let feed = FeedClient::from_env(&ctx.config.feed)?;
    let records = feed.fetch_window(&window_start, &window_end).await;

    if records.is_empty() {
        println!("  no new or modified records; index is up to date");
        checkpoint.save(&window_end)?;
        println!("ok");
        return Ok(SyncReport::default());
    }

    let (documents, normalize_skips) = normalize_batch(&records);
    let mut report = sync_documents(ctx, &documents).await;

    let mut skipped = normalize_skips;
    skipped.extend(report.skipped.drain(..));
    report.skipped = skipped;

    checkpoint.save(&window_end)?;

    println!("  fetched: {} records", records.len());
    println!("  added: {}", report.added);
    println!("  updated: {}", report.updated);
    println!("  skipped: {}", report.skipped_count());
    if ctx.config.embedding.is_enabled() {
        println!("  embedded: {}", report.embedded);
        println!("  embedding pending: {}", report.embedding_pending);
    }
    println!("  checkpoint: {}", window_end);
    println!("ok");

    Ok(report)
}
