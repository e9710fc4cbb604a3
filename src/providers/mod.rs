//! Search providers / 搜索提供者
//!
//! - `QueryExecutor`: one implementation per backend, runs native queries
//! - `SearchProvider<E>`: facade composing translation, masks, execution and normalization
//! - `Provider`: closed set of the deployable backends, dispatched with `match`

pub mod elasticsearch;
pub mod embedding;
pub mod facade;
pub mod manager;
pub mod mysql;
pub mod postgres;
mod rows;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::error::{BackendError, SearchError};
use crate::search::{
    normalize, BackendKind, CorpusStats, DocumentFormat, GroupDate, NativeMode, Page, ProviderCapabilities,
    RawRow, SearchRequest, SearchStat, SentenceRecord, SentenceResult, SortKey, SourceRecord, SourceSentences,
};

pub use elasticsearch::ElasticsearchExecutor;
pub use embedding::EmbeddingClient;
pub use facade::SearchProvider;
pub use manager::ProviderManager;
pub use mysql::MySqlExecutor;
pub use postgres::PostgresExecutor;

/// Translated request handed to an executor / 交给执行器的已翻译请求
#[derive(Debug, Clone)]
pub struct ExecQuery {
    /// Trimmed caller term, quotes kept
    pub term: String,
    pub mode: NativeMode,
    pub page: Page,
    pub page_size: u32,
    pub sort: SortKey,
    pub date_from: Option<i32>,
    pub date_to: Option<i32>,
    pub group: Option<String>,
    pub diacritic_insensitive: bool,
}

impl ExecQuery {
    /// Term with surrounding double quotes removed
    pub fn unquoted_term(&self) -> &str {
        self.term.trim_matches('"').trim()
    }

    /// Whether the caller quoted the term as one phrase
    pub fn is_quoted(&self) -> bool {
        let t = self.term.trim();
        t.len() >= 2 && t.starts_with('"') && t.ends_with('"')
    }

    /// Unquoted term, folded when the request is diacritic-insensitive
    pub fn search_term(&self) -> String {
        if self.diacritic_insensitive {
            normalize(self.unquoted_term())
        } else {
            self.unquoted_term().to_string()
        }
    }

    /// Row offset and limit, `None` when unpaged
    pub fn limit(&self) -> Option<(u64, u32)> {
        self.page.offset(self.page_size).map(|offset| (offset, self.page_size))
    }

    /// Compact description for logs
    pub fn describe(&self) -> String {
        format!(
            "mode={} term={:?} page={:?} size={} sort={} from={:?} to={:?} group={:?} nodiacriticals={}",
            self.mode.name,
            self.term,
            self.page,
            self.page_size,
            self.sort,
            self.date_from,
            self.date_to,
            self.group,
            self.diacritic_insensitive
        )
    }
}

/// Words of a term for engines that take token lists; splits on anything that is not a word char
pub fn query_words(term: &str) -> Vec<String> {
    term.split(|c: char| !crate::search::normalize::is_hawaiian_word_char(c))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Non-success HTTP status: 4xx means the request itself was rejected
pub(crate) fn http_status_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    let body: String = body.chars().take(300).collect();
    if status.is_server_error() {
        BackendError::Connection(format!("HTTP {}: {}", status, body))
    } else {
        BackendError::Query(format!("HTTP {}: {}", status, body))
    }
}

/// Backend query executor / 后端查询执行器
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Page size used when the request does not set one
    fn default_page_size(&self) -> u32;

    async fn fetch(&self, query: &ExecQuery) -> Result<Vec<RawRow>, BackendError>;

    /// `None` when the mode cannot be counted (vector modes)
    async fn count(&self, query: &ExecQuery) -> Result<Option<u64>, BackendError>;

    async fn sources(&self, group: Option<&str>) -> Result<Vec<SourceRecord>, BackendError>;

    async fn source(&self, source_id: &str) -> Result<Option<SourceRecord>, BackendError>;

    async fn sentence(&self, sentence_id: &str) -> Result<Option<SentenceRecord>, BackendError>;

    async fn sentences_by_source(&self, source_id: &str) -> Result<Vec<SentenceRecord>, BackendError>;

    async fn document(&self, source_id: &str, format: DocumentFormat) -> Result<Option<String>, BackendError>;

    async fn corpus_stats(&self) -> Result<CorpusStats, BackendError>;

    async fn group_counts(&self) -> Result<BTreeMap<String, i64>, BackendError>;

    async fn latest_source_dates(&self) -> Result<Vec<GroupDate>, BackendError>;

    async fn record_search(&self, stat: &SearchStat) -> Result<(), BackendError>;
}

/// Deployable providers / 可部署的提供者
pub enum Provider {
    MySql(SearchProvider<MySqlExecutor>),
    Postgres(SearchProvider<PostgresExecutor>),
    Elasticsearch(SearchProvider<ElasticsearchExecutor>),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            Provider::MySql($p) => $body,
            Provider::Postgres($p) => $body,
            Provider::Elasticsearch($p) => $body,
        }
    };
}

impl Provider {
    /// Build a provider from configuration. Connections are opened lazily.
    pub fn from_config(kind: BackendKind, config: &AppConfig) -> Result<Self, SearchError> {
        let policy = config.search.clone();
        let provider = match kind {
            BackendKind::MySql => Provider::MySql(SearchProvider::new(
                MySqlExecutor::connect_lazy(&config.mysql)?,
                policy,
            )),
            BackendKind::Postgres => {
                let embedding = EmbeddingClient::new(&config.embedding, config.search.timeout())?;
                Provider::Postgres(SearchProvider::new(
                    PostgresExecutor::connect_lazy(&config.postgres, Some(embedding))?,
                    policy,
                ))
            }
            BackendKind::Elasticsearch => {
                let embedding = EmbeddingClient::new(&config.embedding, config.search.timeout())?;
                Provider::Elasticsearch(SearchProvider::new(
                    ElasticsearchExecutor::new(&config.elasticsearch, config.search.timeout(), Some(embedding))?,
                    policy,
                ))
            }
        };
        Ok(provider)
    }

    pub fn kind(&self) -> BackendKind {
        dispatch!(self, p => p.kind())
    }

    pub fn capabilities(&self) -> ProviderCapabilities {
        dispatch!(self, p => p.capabilities())
    }

    pub fn available_search_modes(&self) -> BTreeMap<String, String> {
        dispatch!(self, p => p.available_search_modes())
    }

    pub fn normalize_string(&self, text: &str) -> String {
        dispatch!(self, p => p.normalize_string(text))
    }

    pub async fn get_sentences(&self, req: &SearchRequest) -> Result<Vec<SentenceResult>, SearchError> {
        dispatch!(self, p => p.get_sentences(req).await)
    }

    pub async fn get_matching_sentence_count(&self, req: &SearchRequest) -> Result<Option<u64>, SearchError> {
        dispatch!(self, p => p.get_matching_sentence_count(req).await)
    }

    pub async fn get_sources(&self, group: Option<&str>) -> Result<Vec<SourceRecord>, SearchError> {
        dispatch!(self, p => p.get_sources(group).await)
    }

    pub async fn get_source(&self, source_id: &str) -> Result<SourceRecord, SearchError> {
        dispatch!(self, p => p.get_source(source_id).await)
    }

    pub async fn get_sentence(&self, sentence_id: &str) -> Result<SentenceRecord, SearchError> {
        dispatch!(self, p => p.get_sentence(sentence_id).await)
    }

    pub async fn get_sentences_by_source(&self, source_id: &str) -> Result<SourceSentences, SearchError> {
        dispatch!(self, p => p.get_sentences_by_source(source_id).await)
    }

    pub async fn get_document(&self, source_id: &str, format: DocumentFormat) -> Result<String, SearchError> {
        dispatch!(self, p => p.get_document(source_id, format).await)
    }

    pub async fn get_corpus_stats(&self) -> Result<CorpusStats, SearchError> {
        dispatch!(self, p => p.get_corpus_stats().await)
    }

    pub async fn get_total_source_group_counts(&self) -> Result<BTreeMap<String, i64>, SearchError> {
        dispatch!(self, p => p.get_total_source_group_counts().await)
    }

    pub async fn get_latest_source_dates(&self) -> Result<Vec<GroupDate>, SearchError> {
        dispatch!(self, p => p.get_latest_source_dates().await)
    }

    pub async fn log_query(&self, stat: &SearchStat) -> Result<(), SearchError> {
        dispatch!(self, p => p.log_query(stat).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ModeTranslator;

    fn query(term: &str, insensitive: bool) -> ExecQuery {
        ExecQuery {
            term: term.to_string(),
            mode: ModeTranslator::default_mode(BackendKind::MySql),
            page: Page::Number(2),
            page_size: 5,
            sort: SortKey::None,
            date_from: None,
            date_to: None,
            group: None,
            diacritic_insensitive: insensitive,
        }
    }

    #[test]
    fn test_search_term_folds_and_unquotes() {
        assert_eq!(query("\"hoʻokipa\"", true).search_term(), "hookipa");
        assert_eq!(query("hālau", false).search_term(), "hālau");
        assert!(query("\"hale kuai\"", false).is_quoted());
        assert!(!query("hale", false).is_quoted());
    }

    #[test]
    fn test_limit() {
        assert_eq!(query("x", false).limit(), Some((10, 5)));
        let mut q = query("x", false);
        q.page = Page::Unpaged;
        assert_eq!(q.limit(), None);
    }

    #[test]
    fn test_query_words() {
        assert_eq!(query_words("ka hale, (kuai)! +x"), vec!["ka", "hale", "kuai", "x"]);
        assert_eq!(query_words("ʻōlelo Hawaiʻi"), vec!["ʻōlelo", "Hawaiʻi"]);
        assert!(query_words(" ,. ").is_empty());
    }
}
