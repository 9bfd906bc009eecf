use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Canonical documents, one row per indexed record version
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            cve_id TEXT NOT NULL,
            published TEXT NOT NULL DEFAULT '',
            last_modified TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Unknown',
            score TEXT NOT NULL DEFAULT 'N/A',
            severity TEXT NOT NULL DEFAULT 'N/A',
            source TEXT NOT NULL DEFAULT 'NVD',
            year TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors, at most one per record row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_vectors (
            record_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (record_id) REFERENCES records(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_cve_id ON records(cve_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_last_modified ON records(last_modified DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
