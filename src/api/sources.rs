//! Source and corpus metadata handlers / 来源与语料元数据接口

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::sentences::ProviderParam;
use crate::api::{ApiError, ApiResult};
use crate::state::AppState;
use noiiolelo_search::search::{
    CorpusStats, DocumentFormat, GroupDate, SentenceRecord, SourceRecord, SourceSentences,
};

#[derive(Debug, Deserialize)]
pub struct SourcesParams {
    pub provider: Option<String>,
    pub group: Option<String>,
}

/// GET /ops/sources
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SourcesParams>,
) -> ApiResult<Vec<SourceRecord>> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    let group = params.group.as_deref().map(str::trim).filter(|g| !g.is_empty());
    Ok(Json(provider.get_sources(group).await?))
}

/// GET /ops/source/:id
pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<SourceRecord> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_source(&id).await?))
}

/// GET /ops/source/:id/sentences
pub async fn get_source_sentences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<SourceSentences> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_sentences_by_source(&id).await?))
}

async fn document(
    state: &AppState,
    id: &str,
    provider: Option<&str>,
    format: DocumentFormat,
) -> Result<String, ApiError> {
    let provider = state.providers.get(provider).await?;
    Ok(provider.get_document(id, format).await?)
}

/// GET /ops/source/:id/html
pub async fn get_source_html(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
) -> Result<impl IntoResponse, ApiError> {
    let html = document(&state, &id, params.provider.as_deref(), DocumentFormat::Html).await?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html))
}

/// GET /ops/source/:id/plain
pub async fn get_source_plain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
) -> Result<impl IntoResponse, ApiError> {
    let text = document(&state, &id, params.provider.as_deref(), DocumentFormat::Text).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// GET /ops/sentence/:id
pub async fn get_sentence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<SentenceRecord> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_sentence(&id).await?))
}

/// GET /ops/stats
pub async fn corpus_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<CorpusStats> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_corpus_stats().await?))
}

/// GET /ops/groupcounts
pub async fn group_counts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<BTreeMap<String, i64>> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_total_source_group_counts().await?))
}

/// GET /ops/latestdates
pub async fn latest_dates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderParam>,
) -> ApiResult<Vec<GroupDate>> {
    let provider = state.providers.get(params.provider.as_deref()).await?;
    Ok(Json(provider.get_latest_source_dates().await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_metadata_routes_check_provider_first() {
        for uri in [
            "/ops/sources?provider=solr",
            "/ops/source/1?provider=solr",
            "/ops/source/1/sentences?provider=solr",
            "/ops/source/1/html?provider=solr",
            "/ops/source/1/plain?provider=solr",
            "/ops/sentence/1?provider=solr",
            "/ops/stats?provider=solr",
            "/ops/groupcounts?provider=solr",
            "/ops/latestdates?provider=solr",
        ] {
            let (status, body) = test_support::get(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["code"], 400, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_disabled_provider_on_metadata_route() {
        let (status, _) = test_support::get("/ops/stats?provider=postgres").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
