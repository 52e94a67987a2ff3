//! HTTP handlers next to the WebSocket route.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use ragchat_core::retrieval::ContextType;

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}

/// Body of `POST /search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub context_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchAnswer {
    pub prompt: String,
    pub llm_response: String,
}

/// Any failure of the stateless endpoint: HTTP 500 with `{detail}`.
#[derive(Debug)]
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        connections: state.registry.count(),
    })
}

/// One-shot question answering without a session.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchAnswer>, ApiError> {
    let context_type = match request.context_type.as_deref() {
        Some(raw) => raw.parse::<ContextType>().map_err(ApiError)?,
        None => state.pipeline.corpus.context_type,
    };
    info!(context_type = ?context_type, query_len = request.query.len(), "search request");

    let (prompt, llm_response) = state
        .pipeline
        .answer_once(&request.query, context_type)
        .await
        .map_err(|e| {
            error!(kind = e.error_kind(), error = %e, "search request failed");
            ApiError(e.to_string())
        })?;

    Ok(Json(SearchAnswer { prompt, llm_response }))
}
