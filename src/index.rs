//! Persistent index access.
//!
//! All reads and writes against the SQLite-backed document index live here:
//! exact lookup and deletion by record identity, single and bulk inserts,
//! and cosine-similarity retrieval over the stored embedding vectors.
//! Vectors are fetched and scored in Rust; ranking ties break on `cve_id`
//! so results are deterministic.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding;
use crate::models::{Document, ScoredDocument, StoredDocument};

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        cve_id: row.get("cve_id"),
        body: row.get("body"),
        published: row.get("published"),
        last_modified: row.get("last_modified"),
        status: row.get("status"),
        score: row.get("score"),
        severity: row.get("severity"),
        source: row.get("source"),
        year: row.get("year"),
    }
}

/// Row ids of every index entry for a record identity.
///
/// More than one row can only exist transiently; the synchronizer deletes
/// them all before inserting a refreshed version.
pub async fn ids_for_cve(pool: &SqlitePool, cve_id: &str) -> Result<Vec<String>> {
    let rows = sqlx::query_scalar("SELECT id FROM records WHERE cve_id = ?")
        .bind(cve_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Delete index entries (and their vectors) by row id.
pub async fn delete_by_ids(pool: &SqlitePool, ids: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for id in ids {
        sqlx::query("DELETE FROM record_vectors WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Insert one document, optionally with its embedding vector.
///
/// Returns the generated row id.
pub async fn insert_document(
    pool: &SqlitePool,
    doc: &Document,
    vector: Option<(&str, usize, &[f32])>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO records (id, cve_id, published, last_modified, status, score, severity, source, year, body, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&doc.cve_id)
    .bind(&doc.published)
    .bind(&doc.last_modified)
    .bind(&doc.status)
    .bind(&doc.score)
    .bind(&doc.severity)
    .bind(&doc.source)
    .bind(&doc.year)
    .bind(&doc.body)
    .bind(now)
    .execute(pool)
    .await?;

    if let Some((model, dims, vec)) = vector {
        let blob = embedding::vec_to_blob(vec);
        sqlx::query(
            "INSERT INTO record_vectors (record_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(model)
        .bind(dims as i64)
        .bind(blob)
        .execute(pool)
        .await?;
    }

    Ok(id)
}

/// Append a batch of documents (with optional vectors) in one transaction.
///
/// Used by the full seed rebuild; the incremental path inserts one document
/// at a time so each upsert commits independently.
pub async fn bulk_insert(
    pool: &SqlitePool,
    batch: &[(Document, Option<Vec<f32>>)],
    model: &str,
    dims: usize,
) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    let mut written = 0u64;

    for (doc, vector) in batch {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO records (id, cve_id, published, last_modified, status, score, severity, source, year, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&doc.cve_id)
        .bind(&doc.published)
        .bind(&doc.last_modified)
        .bind(&doc.status)
        .bind(&doc.score)
        .bind(&doc.severity)
        .bind(&doc.source)
        .bind(&doc.year)
        .bind(&doc.body)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(vec) = vector {
            let blob = embedding::vec_to_blob(vec);
            sqlx::query(
                "INSERT INTO record_vectors (record_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(model)
            .bind(dims as i64)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }

        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

/// Remove every record and vector. Used when seeding from scratch.
pub async fn clear(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM record_vectors").execute(pool).await?;
    sqlx::query("DELETE FROM records").execute(pool).await?;
    Ok(())
}

/// Total number of indexed records.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let n = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Exact lookup by record identity. Returns the first match, if any.
pub async fn get_by_cve_id(pool: &SqlitePool, cve_id: &str) -> Result<Option<StoredDocument>> {
    let row = sqlx::query(
        "SELECT id, cve_id, published, last_modified, status, score, severity, source, year, body FROM records WHERE cve_id = ? LIMIT 1",
    )
    .bind(cve_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| StoredDocument {
        id: r.get("id"),
        doc: row_to_document(&r),
    }))
}

/// Top-k documents by cosine similarity against a query vector.
///
/// Fetches all stored vectors and scores them in Rust, then sorts by
/// similarity descending (ties broken by `cve_id` ascending) and truncates.
pub async fn similarity_query(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<ScoredDocument>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.cve_id, r.published, r.last_modified, r.status, r.score, r.severity,
               r.source, r.year, r.body, v.embedding
        FROM record_vectors v
        JOIN records r ON r.id = v.record_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<ScoredDocument> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(query_vec, &vec) as f64;
            ScoredDocument {
                doc: row_to_document(row),
                similarity,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc.cve_id.cmp(&b.doc.cve_id))
    });
    scored.truncate(k);

    Ok(scored)
}
