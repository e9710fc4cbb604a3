use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::state::AppState;
use noiiolelo_search::providers::manager::ProviderStatus;

/// GET /api/health - 健康检查
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": env!("BUILD_TIME"),
    }))
}

/// GET /api/providers - 提供者状态
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<ProviderStatus>>> {
    Json(ApiResponse::success(state.providers.list().await))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health() {
        let (status, body) = test_support::get("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_providers_listing() {
        let (status, body) = test_support::get("/api/providers").await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0]["name"], "MySQL");
        assert_eq!(data[0]["enabled"], true);
        assert_eq!(data[0]["default"], true);
        assert_eq!(data[1]["enabled"], false);
    }
}
