//! Full index rebuild from the entire feed.
//!
//! Walks the whole feed without a date filter, then writes the normalized
//! documents in fixed-size batches: the first batch starts the index from
//! empty, every later batch appends. Used for first-time seeding; day-to-day
//! refresh goes through [`crate::sync`] instead.

use anyhow::Result;

use crate::app::AppContext;
use crate::embedding;
use crate::feed::FeedClient;
use crate::index;
use crate::sync::normalize_batch;

/// Documents written per bulk call.
pub const DEFAULT_SEED_BATCH: usize = 100;

pub async fn run_seed(ctx: &AppContext, batch_size_override: Option<usize>) -> Result<()> {
    let batch_size = batch_size_override.unwrap_or(DEFAULT_SEED_BATCH).max(1);

    println!("seed");
    println!("  fetching entire feed (this can take hours without a credential)");

    let feed = FeedClient::from_env(&ctx.config.feed)?;
    let records = feed.fetch_all().await;

    if records.is_empty() {
        println!("  no records fetched; nothing to seed");
        return Ok(());
    }

    let (documents, skipped) = normalize_batch(&records);
    println!("  fetched: {} records", records.len());
    println!("  converted: {} documents ({} skipped)", documents.len(), skipped.len());

    let model_name = ctx.embedder.model_name().to_string();
    let dims = ctx.embedder.dims();
    let total_batches = documents.len().div_ceil(batch_size);

    let mut written = 0u64;
    let mut failed_batches = 0u64;

    for (batch_num, batch) in documents.chunks(batch_size).enumerate() {
        // First batch starts the index from scratch; the rest append.
        if batch_num == 0 {
            index::clear(&ctx.pool).await?;
        }

        let vectors: Vec<Option<Vec<f32>>> = if ctx.config.embedding.is_enabled() {
            let texts: Vec<String> = batch.iter().map(|d| d.body.clone()).collect();
            match embedding::embed_texts(ctx.embedder.as_ref(), &ctx.config.embedding, &texts)
                .await
            {
                Ok(vecs) => vecs.into_iter().map(Some).collect(),
                Err(e) => {
                    eprintln!(
                        "Warning: embedding batch {}/{} failed: {}",
                        batch_num + 1,
                        total_batches,
                        e
                    );
                    vec![None; batch.len()]
                }
            }
        } else {
            vec![None; batch.len()]
        };

        let rows: Vec<_> = batch
            .iter()
            .cloned()
            .zip(vectors.into_iter())
            .collect();

        match index::bulk_insert(&ctx.pool, &rows, &model_name, dims).await {
            Ok(n) => {
                written += n;
                println!(
                    "  [batch {}/{}] wrote {} documents",
                    batch_num + 1,
                    total_batches,
                    n
                );
            }
            Err(e) => {
                eprintln!(
                    "Warning: batch {}/{} failed: {}",
                    batch_num + 1,
                    total_batches,
                    e
                );
                failed_batches += 1;
            }
        }
    }

    println!("  documents written: {}", written);
    if failed_batches > 0 {
        println!("  failed batches: {}", failed_batches);
    }
    println!("ok");

    Ok(())
}
