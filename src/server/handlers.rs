//! Request handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::cache::{CacheEntry, CacheSummary, Namespace};
use crate::models::{AnalysisEntry, AnalysisMode, RequestMode, TranscriptStats};
use crate::pipeline::PipelineError;

/// Error body shaped as `{"detail": "..."}`.
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", detail);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub video_url: String,
    /// Display name or model id; the configured default when absent.
    #[serde(default)]
    pub model_name: Option<String>,
    /// `transcript`, `comments` or `both` (default).
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub video_id: String,
    pub video_title: String,
    pub model_id: String,
    pub transcript: Option<String>,
    pub transcript_stats: Option<TranscriptStats>,
    pub comments: Vec<String>,
    pub comments_truncated: bool,
    /// All analyses combined into one text.
    pub analysis: String,
    pub analyses: BTreeMap<AnalysisMode, AnalysisEntry>,
}

#[derive(Debug, Serialize)]
pub struct CacheListing {
    pub summary: CacheSummary,
    pub transcripts: Vec<CacheEntry>,
    pub comments: Vec<CacheEntry>,
    pub analyses: Vec<CacheEntry>,
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mode = match request.mode.as_deref().map(str::trim) {
        None | Some("") => RequestMode::Both,
        Some(raw) => raw.parse::<RequestMode>().map_err(ApiError::bad_request)?,
    };
    let model_id = state
        .llm
        .resolve_model(request.model_name.as_deref())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let report = state
        .pipeline
        .run(&request.video_url, mode, &model_id)
        .await
        .map_err(|e| match e {
            PipelineError::InvalidInput(_) => ApiError::bad_request(e.to_string()),
        })?;

    Ok(Json(AnalyzeResponse {
        video_id: report.video_id.to_string(),
        analysis: report.combined_analysis(),
        transcript_stats: report.transcript_stats(),
        video_title: report.title,
        model_id: report.model_id,
        transcript: report.transcript,
        comments: report.comments,
        comments_truncated: report.comments_truncated,
        analyses: report.analyses,
    }))
}

/// GET /api/models
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .llm
            .models
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}

/// GET /api/cache
pub async fn list_cache(State(state): State<AppState>) -> Result<Json<CacheListing>, ApiError> {
    let cache = state.pipeline.cache();
    let listing = CacheListing {
        summary: cache.summary().map_err(ApiError::internal)?,
        transcripts: cache.list(Namespace::Transcripts).map_err(ApiError::internal)?,
        comments: cache.list(Namespace::Comments).map_err(ApiError::internal)?,
        analyses: cache.list(Namespace::Analyses).map_err(ApiError::internal)?,
    };
    Ok(Json(listing))
}

/// DELETE /api/cache
pub async fn reset_cache(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.pipeline.cache().reset().map_err(ApiError::internal)?;
    tracing::info!("Cache reset, {} entries removed", removed);
    Ok(Json(json!({ "removed": removed })))
}
