//! Index statistics overview.
//!
//! A quick summary of what's indexed: record count, embedding coverage, and
//! the last sync watermark. Used by `cverag stats` to give confidence that
//! syncs are working as expected.

use anyhow::Result;

use crate::app::AppContext;
use crate::checkpoint::Checkpoint;
use crate::index;

pub async fn run_stats(ctx: &AppContext) -> Result<()> {
    let total = index::count(&ctx.pool).await?;

    let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM record_vectors")
        .fetch_one(&ctx.pool)
        .await?;

    let db_size = std::fs::metadata(&ctx.config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let checkpoint = Checkpoint::new(&ctx.config.checkpoint.path);
    let last_update = if checkpoint.path().exists() {
        checkpoint.load()?
    } else {
        "(never)".to_string()
    };

    println!("cverag — Index Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", ctx.config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Records:     {}", total);
    println!(
        "  Embedded:    {} / {} ({}%)",
        embedded,
        total,
        if total > 0 { (embedded * 100) / total } else { 0 }
    );
    println!("  Last sync:   {}", last_update);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
