//! HTTP API server.
//!
//! Exposes the query-facing surface consumed by a web front end:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Health check (returns version) |
//! | `POST` | `/api/query` | Retrieval-augmented answer with conversation history |
//! | `POST` | `/api/search` | Semantic search over indexed records |
//! | `GET`  | `/api/cve/{id}` | Record detail by exact identifier |
//! | `POST` | `/api/news` | Live feed fetch for a date-filter window |
//! | `GET`  | `/api/stats` | Index statistics |
//!
//! # Error Contract
//!
//! Request-level errors follow the schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Answer-pipeline failures instead return `{"success": false, "stage": ...}`
//! so the caller can tell a retrieval failure from a generation failure.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! front ends.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer;
use crate::app::AppContext;
use crate::checkpoint::Checkpoint;
use crate::feed::{filter_window, FeedClient};
use crate::index;
use crate::models::ConversationTurn;
use crate::normalize;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
}

/// Start the API server. Runs until the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let state = AppState { ctx: Arc::new(ctx) };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/query", post(handle_query))
        .route("/api/search", post(handle_search))
        .route("/api/cve/{id}", get(handle_cve))
        .route("/api/news", post(handle_news))
        .route("/api/stats", get(handle_stats))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, AppError> {
    let question = req.query.trim();
    if question.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let k = state.ctx.config.retrieval.top_k;
    match answer::answer(&state.ctx, question, &req.history, k).await {
        Ok(result) => {
            let source_count = result.sources.len();
            Ok(Json(serde_json::json!({
                "success": true,
                "query": question,
                "answer": result.answer,
                "sources": result.sources,
                "source_count": source_count,
            }))
            .into_response())
        }
        Err(e) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "stage": e.stage(),
            })),
        )
            .into_response()),
    }
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    search: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = req.search.trim();
    if query.is_empty() {
        return Err(bad_request("search must not be empty"));
    }

    let results = answer::retrieve(&state.ctx, query, req.limit)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let items: Vec<serde_json::Value> = results
        .iter()
        .map(|s| {
            serde_json::json!({
                "cve_id": s.doc.cve_id,
                "severity": s.doc.severity,
                "score": s.doc.score,
                "status": s.doc.status,
                "published": answer::date_portion(&s.doc.published),
                "description": s.doc.body,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "query": query,
        "results": items,
        "count": items.len(),
    })))
}

// ============ GET /api/cve/{id} ============

async fn handle_cve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cve_id = id.to_uppercase();

    let stored = index::get_by_cve_id(&state.ctx.pool, &cve_id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("record not found: {}", cve_id)))?;

    let doc = stored.doc;
    Ok(Json(serde_json::json!({
        "success": true,
        "cve_id": doc.cve_id,
        "severity": doc.severity,
        "score": doc.score,
        "status": doc.status,
        "published": answer::date_portion(&doc.published),
        "lastModified": answer::date_portion(&doc.last_modified),
        "year": doc.year,
        "description": doc.body,
    })))
}

// ============ POST /api/news ============

#[derive(Deserialize)]
struct NewsRequest {
    #[serde(default = "default_news_filter")]
    filter: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default = "default_news_limit")]
    limit: usize,
    #[serde(rename = "startDate", default)]
    start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    end_date: Option<String>,
}

fn default_news_filter() -> String {
    "today".to_string()
}

fn default_news_limit() -> usize {
    20
}

async fn handle_news(
    State(state): State<AppState>,
    Json(req): Json<NewsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (start, end) = filter_window(
        &req.filter,
        req.start_date.as_deref(),
        req.end_date.as_deref(),
        Utc::now(),
    )
    .map_err(|e| bad_request(e.to_string()))?;

    let feed = FeedClient::from_env(&state.ctx.config.feed).map_err(|e| internal(e.to_string()))?;
    let records = feed
        .fetch_page(&start, &end, req.limit as u64)
        .await
        .map_err(|e| internal(format!("feed error: {}", e)))?;

    let mut items: Vec<serde_json::Value> = Vec::new();
    for record in &records {
        let cvss = normalize::resolve_cvss(&record.metrics);

        if let Some(ref wanted) = req.severity {
            if &cvss.severity != wanted {
                continue;
            }
        }

        let published = record.published.clone().unwrap_or_default();
        let last_modified = record.last_modified.clone().unwrap_or_default();

        items.push(serde_json::json!({
            "cve_id": record.id.clone().unwrap_or_default(),
            "severity": cvss.severity,
            "score": cvss.score,
            "status": record.vuln_status.clone().unwrap_or_else(|| "Unknown".to_string()),
            "published": answer::date_portion(&published),
            "lastModified": answer::date_portion(&last_modified),
            "description": normalize::english_description(record),
            "year": published.chars().take(4).collect::<String>(),
        }));
    }

    // Newest modification first
    items.sort_by(|a, b| {
        let a_ts = a.get("lastModified").and_then(|v| v.as_str()).unwrap_or("");
        let b_ts = b.get("lastModified").and_then(|v| v.as_str()).unwrap_or("");
        b_ts.cmp(a_ts)
    });
    let total = items.len();
    items.truncate(req.limit);

    Ok(Json(serde_json::json!({
        "success": true,
        "records": items,
        "total": total,
        "filter": req.filter,
        "date_range": {"start": start, "end": end},
    })))
}

// ============ GET /api/stats ============

async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let total = index::count(&state.ctx.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let checkpoint = Checkpoint::new(&state.ctx.config.checkpoint.path);
    let last_update = if checkpoint.path().exists() {
        checkpoint.load().unwrap_or_else(|_| "Unknown".to_string())
    } else {
        "Unknown".to_string()
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "total_records": total,
        "database": state.ctx.config.db.path.display().to_string(),
        "embedding_model": state.ctx.embedder.model_name(),
        "last_update": last_update,
    })))
}
