//! HTTP API for the retrieval service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload` | Store a multipart `file` and rebuild the index |
//! | `POST` | `/api/reload` | Rebuild the index from the data directory |
//! | `GET`  | `/api/query?query_text=...` | Answer a query with ranked contexts |
//! | `GET`  | `/api/documents` | List files in the data directory |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure, including a malformed request, is reported as HTTP 500:
//!
//! ```json
//! { "detail": "Index not initialized" }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartRejection, rejection::QueryRejection, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::RagError;
use crate::ingest;
use crate::models::{DocumentInfo, QueryResponse};
use crate::query::QueryEngine;
use crate::store::IndexStore;

/// Uploads larger than this are rejected.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<IndexStore>,
    pub engine: Arc<QueryEngine>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> crate::error::Result<Self> {
        let engine = QueryEngine::new(config.clone())?;
        Ok(Self {
            config,
            store: Arc::new(IndexStore::new()),
            engine: Arc::new(engine),
        })
    }
}

/// Build the initial index, then serve on `[server].bind` until Ctrl-C.
///
/// A failed initial build aborts startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());
    let state = AppState::new(config.clone())?;

    state
        .store
        .rebuild(config)
        .await
        .context("initial index build failed")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("listening on http://{}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/upload", post(handle_upload))
        .route("/api/reload", post(handle_reload))
        .route("/api/query", get(handle_query))
        .route("/api/documents", get(handle_documents))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError(String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(detail = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { detail: self.0 }),
        )
            .into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        AppError(err.to_string())
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

// ============ GET /health ============

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

// ============ POST /api/upload ============

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| AppError(e.body_text()))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| AppError("No file provided".to_string()))?;

    let path = ingest::ingest(&state.config.storage.data_dir, &filename, &bytes).await?;
    let stored = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or(filename);

    state.store.rebuild(state.config.clone()).await?;

    Ok(Json(MessageResponse {
        message: format!("Successfully uploaded {} and updated index", stored),
    }))
}

// ============ POST /api/reload ============

async fn handle_reload(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.store.rebuild(state.config.clone()).await?;
    Ok(Json(MessageResponse {
        message: "Index reloaded successfully".to_string(),
    }))
}

// ============ GET /api/query ============

#[derive(Deserialize)]
struct QueryParams {
    query_text: String,
}

async fn handle_query(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError(e.body_text()))?;
    let answer = state.engine.answer(&state.store, &params.query_text).await?;
    Ok(Json(answer))
}

// ============ GET /api/documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentInfo>,
}

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = ingest::list_documents(&state.config.storage.data_dir)?;
    Ok(Json(DocumentsResponse { documents }))
}
