//! Sentence search handlers / 句子检索接口

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{ApiResponse, ApiResult};
use crate::state::AppState;
use noiiolelo_search::search::{Page, ProviderCapabilities, SearchRequest, SearchStat, SentenceResult, SortKey};

/// Provider selector shared by every route / 提供者选择参数
#[derive(Debug, Default, Deserialize)]
pub struct ProviderParam {
    pub provider: Option<String>,
}

/// Query parameters for sentence search / 检索参数
///
/// Numeric fields arrive as strings because forms send them blank.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub provider: Option<String>,
    #[serde(default)]
    pub search: String,
    pub searchpattern: Option<String>,
    pub order: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub nodiacriticals: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub group: Option<String>,
}

fn parse_opt<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

fn is_truthy(value: &Option<String>) -> bool {
    matches!(
        value.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "on" | "yes")
    )
}

impl SearchParams {
    pub fn to_request(&self) -> SearchRequest {
        let mode = self
            .searchpattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("any");

        let sort = match self.order.as_deref() {
            Some(order) => order.parse().unwrap_or_else(|_| {
                tracing::debug!("Ignoring unknown order {:?}", order);
                SortKey::default()
            }),
            None => SortKey::default(),
        };

        let mut req = SearchRequest::new(self.search.clone(), mode)
            .with_page(parse_opt::<i64>(&self.page).map(Page::from_index).unwrap_or_default())
            .with_sort(sort)
            .with_dates(parse_opt(&self.from), parse_opt(&self.to))
            .diacritic_insensitive(is_truthy(&self.nodiacriticals));
        if let Some(limit) = parse_opt::<u32>(&self.limit).filter(|l| *l > 0) {
            req = req.with_page_size(limit);
        }
        if let Some(group) = self.group.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            req = req.with_group(group);
        }
        req
    }
}

/// GET /ops/sentences
pub async fn get_sentences(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<SentenceResult>> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    let sentences = provider.get_sentences(&params.to_request()).await?;
    Ok(Json(sentences))
}

/// GET /ops/resultcount - uncountable modes report -1
pub async fn result_count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Value> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    let count = provider.get_matching_sentence_count(&params.to_request()).await?;
    let count = count.map(|c| i64::try_from(c).unwrap_or(i64::MAX)).unwrap_or(-1);
    Ok(Json(json!({ "count": count })))
}

#[derive(Debug, Serialize)]
pub struct ModesResponse {
    pub provider: String,
    pub modes: BTreeMap<String, String>,
    pub capabilities: ProviderCapabilities,
}

/// GET /ops/modes
pub async fn get_modes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<ModesResponse> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(ModesResponse {
        provider: provider.kind().name().to_string(),
        modes: provider.available_search_modes(),
        capabilities: provider.capabilities(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct NormalizeParams {
    pub provider: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// GET /ops/normalize
pub async fn normalize_text(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NormalizeParams>,
) -> ApiResult<Value> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(json!({
        "text": params.text,
        "normalized": provider.normalize_string(&params.text),
    })))
}

/// POST /ops/recordsearch
pub async fn record_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderParam>,
    Json(stat): Json<SearchStat>,
) -> ApiResult<ApiResponse<()>> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    provider.log_query(&stat).await?;
    Ok(Json(ApiResponse::success(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    #[test]
    fn test_params_to_request() {
        let params = SearchParams {
            search: "aloha".to_string(),
            searchpattern: Some("exact".to_string()),
            order: Some("date desc".to_string()),
            from: Some("1850".to_string()),
            to: Some("".to_string()),
            nodiacriticals: Some("1".to_string()),
            page: Some("2".to_string()),
            limit: Some("20".to_string()),
            group: Some(" nupepa ".to_string()),
            ..Default::default()
        };
        let req = params.to_request();
        assert_eq!(req.mode, "exact");
        assert_eq!(req.sort, SortKey::DateDesc);
        assert_eq!(req.date_from, Some(1850));
        assert_eq!(req.date_to, None);
        assert!(req.diacritic_insensitive);
        assert_eq!(req.page, Page::Number(2));
        assert_eq!(req.page_size, Some(20));
        assert_eq!(req.group.as_deref(), Some("nupepa"));
    }

    #[test]
    fn test_params_defaults() {
        let req = SearchParams {
            search: "aloha".to_string(),
            order: Some("sideways".to_string()),
            page: Some("-1".to_string()),
            limit: Some("0".to_string()),
            ..Default::default()
        }
        .to_request();
        assert_eq!(req.mode, "any");
        assert_eq!(req.sort, SortKey::default());
        assert_eq!(req.page, Page::Unpaged);
        assert_eq!(req.page_size, None);
        assert!(!req.diacritic_insensitive);
    }

    #[tokio::test]
    async fn test_empty_search_returns_empty_list() {
        let (status, body) = test_support::get("/ops/sentences?search=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_empty_search_count_is_zero() {
        let (status, body) = test_support::get("/ops/resultcount?search=%22%22").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_invalid_mode_is_bad_request() {
        let (status, body) = test_support::get("/ops/sentences?search=aloha&searchpattern=nonexistent").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("exact, any, all, regex"));
    }

    #[tokio::test]
    async fn test_short_term_is_bad_request() {
        let (status, _) = test_support::get("/ops/sentences?search=ke&provider=es").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_modes() {
        let (status, body) = test_support::get("/ops/modes?provider=Elasticsearch").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "Elasticsearch");
        assert!(body["modes"]["hybriddoc"].is_string());
        assert_eq!(body["capabilities"]["provides_highlights"], true);
    }

    #[tokio::test]
    async fn test_normalize() {
        let (status, body) = test_support::get("/ops/normalize?text=%CA%BB%C4%81ina").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "ʻāina");
        assert_eq!(body["normalized"], "aina");
    }

    #[tokio::test]
    async fn test_record_search_rejects_bad_body() {
        let req = Request::post("/ops/recordsearch")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"searchterm": 5}"#))
            .unwrap();
        let (status, _) = test_support::send(req).await;
        assert!(status.is_client_error());
    }
}
