//! Provider facade / 提供者门面
//!
//! Wires mode translation, the executor, the highlight mask and result
//! normalization together behind one backend-agnostic set of operations.
//! Execution errors follow the configured `ErrorPolicy`; validation errors
//! always reach the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::{ExecQuery, QueryExecutor};
use crate::config::{ErrorPolicy, SearchConfig};
use crate::error::{BackendError, SearchError};
use crate::search::{
    normalize, BackendKind, CorpusStats, DocumentFormat, GroupDate, HighlightMask, MatchStyle, ModeTranslator,
    ProviderCapabilities, ResultNormalizer, SearchRequest, SearchStat, SentenceMaskBuilder, SentenceRecord,
    SentenceResult, SourceRecord, SourceSentences,
};

/// Search provider facade / 搜索提供者门面
pub struct SearchProvider<E> {
    executor: E,
    policy: SearchConfig,
}

impl<E: QueryExecutor> SearchProvider<E> {
    pub fn new(executor: E, policy: SearchConfig) -> Self {
        Self { executor, policy }
    }

    pub fn kind(&self) -> BackendKind {
        self.executor.kind()
    }

    pub fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::for_backend(self.kind())
    }

    /// Mode key → human description
    pub fn available_search_modes(&self) -> BTreeMap<String, String> {
        self.capabilities().available_modes
    }

    pub fn normalize_string(&self, text: &str) -> String {
        normalize(text)
    }

    /// Validate and translate a request. `None` for an empty term.
    fn prepare(&self, req: &SearchRequest) -> Result<Option<(ExecQuery, HighlightMask)>, SearchError> {
        let native = ModeTranslator::translate(&req.mode, self.kind())?;

        let term = req.trimmed_term();
        if term.trim_matches('"').trim().is_empty() {
            return Ok(None);
        }
        let min = self.policy.min_term_length;
        if native.style != MatchStyle::Regex && term.trim_matches('"').chars().count() < min {
            return Err(SearchError::TermTooShort { min });
        }

        let mask = SentenceMaskBuilder::new(term, native.mode)
            .diacritic_insensitive(req.diacritic_insensitive)
            .build()?;

        let query = ExecQuery {
            term: term.to_string(),
            mode: native,
            page: req.page,
            page_size: req.page_size.unwrap_or_else(|| self.executor.default_page_size()).max(1),
            sort: req.sort,
            date_from: req.date_from,
            date_to: req.date_to,
            group: req.group.clone(),
            diacritic_insensitive: req.diacritic_insensitive,
        };
        Ok(Some((query, mask)))
    }

    /// Matching sentences for one page / 获取匹配句子
    pub async fn get_sentences(&self, req: &SearchRequest) -> Result<Vec<SentenceResult>, SearchError> {
        let Some((query, mask)) = self.prepare(req)? else {
            return Ok(Vec::new());
        };

        let started = Instant::now();
        match self.run(|| self.executor.fetch(&query)).await {
            Ok(rows) => {
                let row_count = rows.len();
                let results = ResultNormalizer::new(&mask)
                    .enforce_stripped_check(self.policy.enforce_stripped_check)
                    .normalize(rows);
                tracing::debug!(
                    "{} getSentences {} -> {} rows, {} results in {:?}",
                    self.kind(),
                    query.describe(),
                    row_count,
                    results.len(),
                    started.elapsed()
                );
                Ok(results)
            }
            Err(e) => self.degrade("getSentences", &query.describe(), e, Vec::new()),
        }
    }

    /// Total matches regardless of page; `None` when the mode cannot be counted
    pub async fn get_matching_sentence_count(&self, req: &SearchRequest) -> Result<Option<u64>, SearchError> {
        let Some((query, _)) = self.prepare(req)? else {
            return Ok(Some(0));
        };
        match self.run(|| self.executor.count(&query)).await {
            Ok(count) => Ok(count),
            Err(e) => self.degrade("getMatchingSentenceCount", &query.describe(), e, Some(0)),
        }
    }

    pub async fn get_sources(&self, group: Option<&str>) -> Result<Vec<SourceRecord>, SearchError> {
        let group = group.map(str::trim).filter(|g| !g.is_empty());
        match self.run(|| self.executor.sources(group)).await {
            Ok(sources) => Ok(sources),
            Err(e) => self.degrade("getSources", &format!("group={:?}", group), e, Vec::new()),
        }
    }

    pub async fn get_source(&self, source_id: &str) -> Result<SourceRecord, SearchError> {
        let found = match self.run(|| self.executor.source(source_id)).await {
            Ok(found) => found,
            Err(e) => self.degrade("getSource", source_id, e, None)?,
        };
        found.ok_or_else(|| SearchError::NoContent(format!("source {}", source_id)))
    }

    pub async fn get_sentence(&self, sentence_id: &str) -> Result<SentenceRecord, SearchError> {
        let found = match self.run(|| self.executor.sentence(sentence_id)).await {
            Ok(found) => found,
            Err(e) => self.degrade("getSentence", sentence_id, e, None)?,
        };
        found.ok_or_else(|| SearchError::NoContent(format!("sentence {}", sentence_id)))
    }

    pub async fn get_sentences_by_source(&self, source_id: &str) -> Result<SourceSentences, SearchError> {
        let source = self.get_source(source_id).await?;
        let sentences = match self.run(|| self.executor.sentences_by_source(source_id)).await {
            Ok(sentences) => sentences,
            Err(e) => self.degrade("getSentencesBySourceID", source_id, e, Vec::new())?,
        };
        Ok(SourceSentences { source, sentences })
    }

    /// Document body; `NoContent` when missing or empty
    pub async fn get_document(&self, source_id: &str, format: DocumentFormat) -> Result<String, SearchError> {
        let found = match self.run(|| self.executor.document(source_id, format)).await {
            Ok(found) => found,
            Err(e) => self.degrade("getDocument", source_id, e, None)?,
        };
        found
            .filter(|body| !body.trim().is_empty())
            .ok_or_else(|| SearchError::NoContent(format!("document {} ({:?})", source_id, format)))
    }

    pub async fn get_corpus_stats(&self) -> Result<CorpusStats, SearchError> {
        match self.run(|| self.executor.corpus_stats()).await {
            Ok(stats) => Ok(stats),
            Err(e) => self.degrade("getCorpusStats", "", e, CorpusStats::default()),
        }
    }

    pub async fn get_total_source_group_counts(&self) -> Result<BTreeMap<String, i64>, SearchError> {
        match self.run(|| self.executor.group_counts()).await {
            Ok(counts) => Ok(counts),
            Err(e) => self.degrade("getTotalSourceGroupCounts", "", e, BTreeMap::new()),
        }
    }

    pub async fn get_latest_source_dates(&self) -> Result<Vec<GroupDate>, SearchError> {
        match self.run(|| self.executor.latest_source_dates()).await {
            Ok(dates) => Ok(dates),
            Err(e) => self.degrade("getLatestSourceDates", "", e, Vec::new()),
        }
    }

    /// Record a search in the stats store / 记录搜索日志
    pub async fn log_query(&self, stat: &SearchStat) -> Result<(), SearchError> {
        match self.run(|| self.executor.record_search(stat)).await {
            Ok(()) => Ok(()),
            Err(e) => self.degrade("logQuery", &stat.searchterm, e, ()),
        }
    }

    /// Run one executor call under the overall deadline, retrying transient failures
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, BackendError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let deadline = Instant::now() + self.policy.timeout();
        // First attempt plus `max_retries` retries
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            let result = match tokio::time::timeout_at(deadline, op()).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout),
            };
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("{} call succeeded after {} attempts", self.kind(), attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt + 1 < max_attempts && Instant::now() < deadline => {
                    let delay = 100 * (attempt as u64 + 1);
                    tracing::warn!(
                        "{} call failed (attempt {}/{}): {}, retrying in {}ms",
                        self.kind(),
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply the error policy to an execution failure
    fn degrade<T>(&self, operation: &str, context: &str, err: BackendError, fallback: T) -> Result<T, SearchError> {
        tracing::error!("{} {} failed [{}]: {}", self.kind(), operation, context, err);
        match self.policy.error_policy {
            ErrorPolicy::FailSoft => Ok(fallback),
            ErrorPolicy::Propagate => Err(SearchError::BackendUnavailable(err.to_string())),
        }
    }
}
