pub mod sentences;
pub mod server;
pub mod sources;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use noiiolelo_search::SearchError;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: StatusCode, message: &str) -> Self {
        Self {
            code: i32::from(code.as_u16()),
            message: message.to_string(),
            data: None,
        }
    }
}

/// Search error rendered as an HTTP response / 以 HTTP 响应返回的错误
#[derive(Debug)]
pub struct ApiError(pub SearchError);

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SearchError::NoContent(_) => StatusCode::NOT_FOUND,
            SearchError::BackendUnavailable(_) | SearchError::ProviderDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::error(status, &self.0.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// All routes / 全部路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(server::health_check))
        .route("/api/providers", get(server::list_providers))
        .route("/ops/sentences", get(sentences::get_sentences))
        .route("/ops/resultcount", get(sentences::result_count))
        .route("/ops/modes", get(sentences::get_modes))
        .route("/ops/normalize", get(sentences::normalize_text))
        .route("/ops/recordsearch", post(sentences::record_search))
        .route("/ops/sources", get(sources::list_sources))
        .route("/ops/source/:id", get(sources::get_source))
        .route("/ops/source/:id/sentences", get(sources::get_source_sentences))
        .route("/ops/source/:id/html", get(sources::get_source_html))
        .route("/ops/source/:id/plain", get(sources::get_source_plain))
        .route("/ops/sentence/:id", get(sources::get_sentence))
        .route("/ops/stats", get(sources::corpus_stats))
        .route("/ops/groupcounts", get(sources::group_counts))
        .route("/ops/latestdates", get(sources::latest_dates))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
