//! Elasticsearch executor / Elasticsearch 执行器
//!
//! Talks to the REST API with reqwest and builds the query DSL with
//! `serde_json::json!`. Sentence hits live in `sentences_index`, whole
//! documents (with links, html and metadata) in `documents_index`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

use super::embedding::EmbeddingClient;
use super::rows::year_bounds;
use super::{http_status_error, ExecQuery, QueryExecutor};
use crate::config::ElasticsearchConfig;
use crate::error::{BackendError, SearchError};
use crate::search::normalizer::{strip_engine_markers, ENGINE_HIGHLIGHT_END, ENGINE_HIGHLIGHT_START};
use crate::search::{
    normalize, BackendKind, CorpusStats, DocumentFormat, Granularity, GroupDate, MatchStyle, Page, RawRow,
    SearchStat, SentenceRecord, SortKey, SourceRecord,
};

/// Result window used when the caller asks for every row
const UNPAGED_SIZE: u32 = 10_000;
/// Upper bound on `num_candidates` for knn
const MAX_KNN_CANDIDATES: u32 = 10_000;

/// Elasticsearch executor / Elasticsearch 执行器
pub struct ElasticsearchExecutor {
    client: Client,
    base: Url,
    config: ElasticsearchConfig,
    embedding: Option<EmbeddingClient>,
}

impl ElasticsearchExecutor {
    pub fn new(
        config: &ElasticsearchConfig,
        timeout: Duration,
        embedding: Option<EmbeddingClient>,
    ) -> Result<Self, SearchError> {
        let base = Url::parse(&format!("{}/", config.url.trim_end_matches('/')))
            .map_err(|e| SearchError::BackendUnavailable(format!("Invalid Elasticsearch url {}: {}", config.url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Elasticsearch provider configured at {} (indices {}, {})",
            base,
            config.sentences_index,
            config.documents_index
        );
        Ok(Self {
            client,
            base,
            config: config.clone(),
            embedding,
        })
    }

    /// Send one request; `Ok(None)` for 404
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>, BackendError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| BackendError::Query(format!("invalid path {}: {}", path, e)))?;

        let mut req = self.client.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.header(AUTHORIZATION, format!("ApiKey {}", key));
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_status_error(status, &text));
        }
        Ok(Some(resp.json().await?))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError> {
        self.call(Method::POST, &format!("{}/_search", index), Some(body))
            .await?
            .ok_or_else(|| BackendError::Query(format!("index {} not found", index)))
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, BackendError> {
        let path = format!("{}/_doc/{}", index, urlencoding::encode(id));
        let doc = self.call(Method::GET, &path, None).await?;
        Ok(doc.filter(|d| d["found"].as_bool().unwrap_or(false)))
    }

    async fn count_index(&self, index: &str) -> Result<i64, BackendError> {
        let resp = self
            .call(Method::GET, &format!("{}/_count", index), None)
            .await?
            .ok_or_else(|| BackendError::Query(format!("index {} not found", index)))?;
        Ok(resp["count"].as_i64().unwrap_or(0))
    }

    async fn query_vector(&self, query: &ExecQuery) -> Option<Vec<f32>> {
        if query.mode.style != MatchStyle::Semantic {
            return None;
        }
        self.embedding.as_ref()?.embed_or_warn(query.unquoted_term()).await
    }

    /// Fill missing links from the documents index in one `_mget`
    async fn attach_links(&self, rows: &mut [RawRow]) {
        let mut ids: Vec<String> = rows
            .iter()
            .filter(|r| r.link.is_empty() && !r.source_id.is_empty())
            .map(|r| r.source_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return;
        }

        let path = format!("{}/_mget?_source=link", self.config.documents_index);
        let links = match self.call(Method::POST, &path, Some(&json!({ "ids": ids }))).await {
            Ok(Some(resp)) => parse_mget_links(&resp),
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!("Elasticsearch link lookup failed for {} sources: {}", ids.len(), e);
                return;
            }
        };
        for row in rows.iter_mut().filter(|r| r.link.is_empty()) {
            if let Some(link) = links.get(&row.source_id) {
                row.link = link.clone();
            }
        }
    }
}

fn text_field(query: &ExecQuery) -> &'static str {
    if query.diacritic_insensitive {
        "text.folded"
    } else {
        "text"
    }
}

fn query_text(query: &ExecQuery) -> String {
    query.search_term()
}

/// Lucene regexp matches the whole keyword, so unanchored patterns get `.*` on each side.
/// Word-boundary markers have no Lucene equivalent and are dropped.
pub(crate) fn regexp_value(term: &str) -> String {
    let body = term
        .trim()
        .replace("[[:<:]]", "")
        .replace("[[:>:]]", "")
        .replace(r"\b", "");
    let (start, body) = match body.strip_prefix('^') {
        Some(rest) => ("", rest.to_string()),
        None => (".*", body),
    };
    let (body, end) = match body.strip_suffix('$') {
        Some(rest) => (rest.to_string(), ""),
        None => (body, ".*"),
    };
    format!("{}{}{}", start, body, end)
}

fn ratio_boost(query: Value) -> Value {
    json!({
        "function_score": {
            "query": query,
            "functions": [{
                "field_value_factor": {
                    "field": "hawaiian_word_ratio",
                    "modifier": "ln1p",
                    "factor": 1.0,
                    "missing": 1
                }
            }],
            "boost_mode": "multiply"
        }
    })
}

fn filters(query: &ExecQuery) -> Vec<Value> {
    let mut filters = Vec::new();
    let (from, to) = year_bounds(query.date_from, query.date_to);
    if from.is_some() || to.is_some() {
        let mut range = Map::new();
        if let Some(from) = from {
            range.insert("gte".to_string(), json!(from));
        }
        if let Some(to) = to {
            range.insert("lte".to_string(), json!(to));
        }
        filters.push(json!({ "range": { "date": range } }));
    }
    if let Some(group) = &query.group {
        filters.push(json!({ "term": { "groupname.keyword": group } }));
    }
    if query.sort.is_date() {
        filters.push(json!({ "exists": { "field": "date" } }));
    }
    filters
}

fn with_filters(query: Value, filters: &[Value]) -> Value {
    if filters.is_empty() {
        query
    } else {
        json!({ "bool": { "must": [query], "filter": filters } })
    }
}

/// Mode-specific query plus an optional top-level knn clause
fn mode_query(query: &ExecQuery, config: &ElasticsearchConfig, vector: Option<&[f32]>) -> (Value, Option<Value>) {
    let field = text_field(query);
    let text = query_text(query);

    match query.mode.name {
        // A quoted term is one literal phrase under either word mode
        "matchsentence" | "matchsentence_all" if query.is_quoted() => {
            (json!({ "match_phrase": { field: text } }), None)
        }
        "matchsentence_all" => (json!({ "match": { field: { "query": text, "operator": "and" } } }), None),
        "phrasesentence" => (json!({ "match_phrase": { field: text } }), None),
        "regexpsentence" => {
            let field = if query.diacritic_insensitive { "text.folded" } else { "text.raw" };
            let term = if query.diacritic_insensitive {
                normalize(query.term.trim())
            } else {
                query.term.trim().to_string()
            };
            (
                json!({ "regexp": { field: {
                    "value": regexp_value(&term),
                    "case_insensitive": true,
                    "flags": "ALL"
                } } }),
                None,
            )
        }
        "hybridsentence" => {
            let text_query = json!({ "bool": { "should": [{ "match": { field: text } }] } });
            let knn = vector.map(|v| {
                let k = query.page_size.min(MAX_KNN_CANDIDATES / 25).max(1);
                json!({
                    "field": config.vector_field,
                    "query_vector": v,
                    "k": k * 5,
                    "num_candidates": k * 25,
                    "boost": 1.5
                })
            });
            (text_query, knn)
        }
        "hybrid" => {
            let mut should = vec![json!({ "match": { "text": text } })];
            if let Some(v) = vector {
                should.push(json!({
                    "script_score": {
                        "query": { "match_all": {} },
                        "script": {
                            "source": format!(
                                "cosineSimilarity(params.query_vector, '{}') + 1.0",
                                config.document_vector_field
                            ),
                            "params": { "query_vector": v }
                        }
                    }
                }));
            }
            (json!({ "bool": { "should": should } }), None)
        }
        _ => (json!({ "match": { field: { "query": text, "operator": "or" } } }), None),
    }
}

fn sort_clause(sort: SortKey) -> Option<Value> {
    let order = if sort.is_descending() { "desc" } else { "asc" };
    let field = match sort {
        SortKey::Alpha | SortKey::AlphaDesc => "text.keyword",
        SortKey::Source | SortKey::SourceDesc => "sourcename.keyword",
        SortKey::Date | SortKey::DateDesc => "date",
        SortKey::Length | SortKey::LengthDesc => "length",
        SortKey::None => return Some(json!(["_doc"])),
        SortKey::Random | SortKey::Score => return None,
    };
    Some(json!([{ field: { "order": order } }]))
}

fn highlight_clause(query: &ExecQuery) -> Option<Value> {
    let field = text_field(query);
    match (query.mode.granularity, query.mode.name) {
        // Keyword-field regexps would mark the whole sentence; the local mask does better
        (_, "regexpsentence") => None,
        (Granularity::Sentence, _) => Some(json!({
            "pre_tags": [ENGINE_HIGHLIGHT_START],
            "post_tags": [ENGINE_HIGHLIGHT_END],
            "fields": { field: { "number_of_fragments": 0 } }
        })),
        (Granularity::Document, _) => Some(json!({
            "pre_tags": [ENGINE_HIGHLIGHT_START],
            "post_tags": [ENGINE_HIGHLIGHT_END],
            "fields": { "text": { "fragment_size": 200, "number_of_fragments": 5 } }
        })),
    }
}

/// Full `_search` body for one page of hits
pub(crate) fn search_body(
    query: &ExecQuery,
    config: &ElasticsearchConfig,
    vector: Option<&[f32]>,
    seed: u32,
) -> Value {
    let filters = filters(query);
    let (base, knn) = mode_query(query, config, vector);

    let mut q = with_filters(base, &filters);
    if query.mode.granularity == Granularity::Sentence {
        q = ratio_boost(q);
    }
    if query.sort == SortKey::Random {
        q = json!({
            "function_score": {
                "query": q,
                "random_score": { "seed": seed, "field": "_seq_no" },
                "boost_mode": "replace"
            }
        });
    }

    let (from, size) = match query.page {
        Page::Unpaged => (0, UNPAGED_SIZE),
        Page::Number(_) => query.limit().unwrap_or((0, query.page_size)),
    };

    let mut body = json!({
        "query": q,
        "from": from,
        "size": size,
        "track_total_hits": true,
        "_source": { "excludes": [config.vector_field, config.document_vector_field, "html"] }
    });
    if let Some(mut knn) = knn {
        if !filters.is_empty() {
            knn["filter"] = json!(filters);
        }
        body["knn"] = knn;
    }
    if let Some(sort) = sort_clause(query.sort) {
        body["sort"] = sort;
    }
    if let Some(highlight) = highlight_clause(query) {
        body["highlight"] = highlight;
    }
    body
}

/// `_count` body; `None` for semantic modes, whose result set is a ranking
pub(crate) fn count_body(query: &ExecQuery, config: &ElasticsearchConfig) -> Option<Value> {
    if query.mode.style == MatchStyle::Semantic {
        return None;
    }
    let (base, _) = mode_query(query, config, None);
    Some(json!({ "query": with_filters(base, &filters(query)) }))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn authors_of(source: &Value) -> String {
    match &source["authors"] {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn source_id_of(source: &Value) -> Option<String> {
    ["sourceid", "sourceID", "doc_id"]
        .iter()
        .find_map(|key| value_to_string(&source[*key]))
}

/// One search hit to a raw row
pub(crate) fn parse_hit(hit: &Value, granularity: Granularity) -> RawRow {
    let source = &hit["_source"];
    let sentence_id = value_to_string(&hit["_id"]).unwrap_or_default();
    let source_id = source_id_of(source).unwrap_or_else(|| match granularity {
        Granularity::Document => sentence_id.clone(),
        Granularity::Sentence => String::new(),
    });

    let fragments: Vec<String> = hit["highlight"]
        .as_object()
        .and_then(|fields| fields.values().next())
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let full_text = source["text"].as_str().unwrap_or_default().trim().to_string();
    let (text, engine_highlight) = match granularity {
        Granularity::Sentence => (full_text, fragments.into_iter().next().map(|f| f.trim().to_string())),
        // Documents are shown as their matching fragments
        Granularity::Document if !fragments.is_empty() => {
            let marked = fragments.join(" … ");
            (strip_engine_markers(&marked), Some(marked))
        }
        Granularity::Document => (full_text.chars().take(300).collect(), None),
    };

    RawRow {
        sentence_id,
        source_id,
        source_name: source["sourcename"].as_str().unwrap_or("unknown").to_string(),
        authors: authors_of(source),
        date: value_to_string(&source["date"]),
        link: source["link"].as_str().unwrap_or_default().to_string(),
        text,
        engine_highlight,
        score: hit["_score"].as_f64(),
    }
}

fn parse_mget_links(resp: &Value) -> HashMap<String, String> {
    resp["docs"]
        .as_array()
        .map(|docs| {
            docs.iter()
                .filter(|d| d["found"].as_bool().unwrap_or(false))
                .filter_map(|d| {
                    let id = value_to_string(&d["_id"])?;
                    let link = d["_source"]["link"].as_str()?.to_string();
                    Some((id, link))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_source(id: &str, source: &Value) -> SourceRecord {
    SourceRecord {
        source_id: source_id_of(source).unwrap_or_else(|| id.to_string()),
        source_name: source["sourcename"].as_str().unwrap_or_default().to_string(),
        group_name: source["groupname"].as_str().unwrap_or_default().to_string(),
        authors: authors_of(source),
        date: value_to_string(&source["date"]),
        link: source["link"].as_str().unwrap_or_default().to_string(),
        title: source["title"].as_str().unwrap_or_default().to_string(),
        sentence_count: source["sentence_count"].as_i64().unwrap_or(0),
    }
}

fn parse_sentence(id: &str, source: &Value) -> SentenceRecord {
    SentenceRecord {
        sentence_id: id.to_string(),
        source_id: source_id_of(source).unwrap_or_default(),
        text: source["text"].as_str().unwrap_or_default().to_string(),
    }
}

fn hits(resp: &Value) -> &[Value] {
    resp["hits"]["hits"].as_array().map(Vec::as_slice).unwrap_or_default()
}

fn group_buckets(resp: &Value) -> &[Value] {
    resp["aggregations"]["groups"]["buckets"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Max date bucket value as `YYYY-MM-DD`
fn bucket_date(bucket: &Value) -> Option<String> {
    let max = &bucket["max_date"];
    if let Some(s) = max["value_as_string"].as_str() {
        return Some(s.chars().take(10).collect());
    }
    let ms = max["value"].as_f64()? as i64;
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).map(|d| d.format("%Y-%m-%d").to_string())
}

const SOURCE_FIELDS: [&str; 9] = [
    "sourceid",
    "doc_id",
    "sourcename",
    "groupname",
    "authors",
    "date",
    "link",
    "title",
    "sentence_count",
];

#[async_trait]
impl QueryExecutor for ElasticsearchExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn default_page_size(&self) -> u32 {
        self.config.page_size.max(1)
    }

    async fn fetch(&self, query: &ExecQuery) -> Result<Vec<RawRow>, BackendError> {
        let vector = self.query_vector(query).await;
        let body = search_body(query, &self.config, vector.as_deref(), rand::random());
        let index = match query.mode.granularity {
            Granularity::Sentence => &self.config.sentences_index,
            Granularity::Document => &self.config.documents_index,
        };
        tracing::debug!("Elasticsearch {} search: {}", index, body);

        let resp = self.search(index, &body).await?;
        let mut rows: Vec<RawRow> = hits(&resp)
            .iter()
            .map(|hit| parse_hit(hit, query.mode.granularity))
            .collect();
        self.attach_links(&mut rows).await;
        Ok(rows)
    }

    async fn count(&self, query: &ExecQuery) -> Result<Option<u64>, BackendError> {
        let Some(body) = count_body(query, &self.config) else {
            return Ok(None);
        };
        let path = format!("{}/_count", self.config.sentences_index);
        let resp = self
            .call(Method::POST, &path, Some(&body))
            .await?
            .ok_or_else(|| BackendError::Query(format!("index {} not found", self.config.sentences_index)))?;
        Ok(resp["count"].as_u64())
    }

    async fn sources(&self, group: Option<&str>) -> Result<Vec<SourceRecord>, BackendError> {
        let query = match group {
            Some(group) => json!({ "term": { "groupname.keyword": group } }),
            None => json!({ "match_all": {} }),
        };
        let body = json!({
            "query": query,
            "size": UNPAGED_SIZE,
            "_source": SOURCE_FIELDS,
            "sort": [{ "sourcename.keyword": { "order": "asc" } }]
        });
        let resp = self.search(&self.config.documents_index, &body).await?;
        Ok(hits(&resp)
            .iter()
            .map(|hit| parse_source(hit["_id"].as_str().unwrap_or_default(), &hit["_source"]))
            .collect())
    }

    async fn source(&self, source_id: &str) -> Result<Option<SourceRecord>, BackendError> {
        let doc = self.get_doc(&self.config.documents_index, source_id).await?;
        Ok(doc.map(|d| parse_source(source_id, &d["_source"])))
    }

    async fn sentence(&self, sentence_id: &str) -> Result<Option<SentenceRecord>, BackendError> {
        let doc = self.get_doc(&self.config.sentences_index, sentence_id).await?;
        Ok(doc.map(|d| parse_sentence(sentence_id, &d["_source"])))
    }

    async fn sentences_by_source(&self, source_id: &str) -> Result<Vec<SentenceRecord>, BackendError> {
        let body = json!({
            "query": { "bool": {
                "should": [
                    { "term": { "doc_id": source_id } },
                    { "term": { "sourceid": source_id } }
                ],
                "minimum_should_match": 1
            } },
            "size": UNPAGED_SIZE,
            "_source": ["sourceid", "doc_id", "text"],
            "sort": [{ "position": { "order": "asc", "unmapped_type": "long" } }]
        });
        let resp = self.search(&self.config.sentences_index, &body).await?;
        Ok(hits(&resp)
            .iter()
            .map(|hit| parse_sentence(hit["_id"].as_str().unwrap_or_default(), &hit["_source"]))
            .collect())
    }

    async fn document(&self, source_id: &str, format: DocumentFormat) -> Result<Option<String>, BackendError> {
        let doc = self.get_doc(&self.config.documents_index, source_id).await?;
        let field = match format {
            DocumentFormat::Text => "text",
            DocumentFormat::Html => "html",
        };
        Ok(doc.and_then(|d| d["_source"][field].as_str().map(str::to_string)))
    }

    async fn corpus_stats(&self) -> Result<CorpusStats, BackendError> {
        Ok(CorpusStats {
            sentence_count: self.count_index(&self.config.sentences_index).await?,
            source_count: self.count_index(&self.config.documents_index).await?,
        })
    }

    async fn group_counts(&self) -> Result<BTreeMap<String, i64>, BackendError> {
        let body = json!({
            "size": 0,
            "aggs": { "groups": { "terms": { "field": "groupname.keyword", "size": UNPAGED_SIZE } } }
        });
        let resp = self.search(&self.config.documents_index, &body).await?;
        Ok(group_buckets(&resp)
            .iter()
            .filter_map(|b| Some((b["key"].as_str()?.to_string(), b["doc_count"].as_i64()?)))
            .collect())
    }

    async fn latest_source_dates(&self) -> Result<Vec<GroupDate>, BackendError> {
        let body = json!({
            "size": 0,
            "aggs": { "groups": {
                "terms": { "field": "groupname.keyword", "size": UNPAGED_SIZE },
                "aggs": { "max_date": { "max": { "field": "date" } } }
            } }
        });
        let resp = self.search(&self.config.documents_index, &body).await?;
        Ok(group_buckets(&resp)
            .iter()
            .filter_map(|b| {
                Some(GroupDate {
                    groupname: b["key"].as_str()?.to_string(),
                    date: bucket_date(b),
                })
            })
            .collect())
    }

    async fn record_search(&self, stat: &SearchStat) -> Result<(), BackendError> {
        let doc = json!({
            "searchterm": stat.searchterm,
            "pattern": stat.pattern,
            "results": stat.results,
            "sort": stat.sort,
            "elapsed": stat.elapsed,
            "created": chrono::Utc::now().to_rfc3339()
        });
        let path = format!("{}/_doc", self.config.stats_index);
        self.call(Method::POST, &path, Some(&doc)).await?;
        Ok(())
    }
}
