//! MySQL full-text executor / MySQL 全文检索执行器
//!
//! Tables: `sentences(sentenceID, sourceID, hawaiianText, simplified)`,
//! `sources(sourceID, sourceName, groupname, authors, date, link, title)`,
//! `contents(sourceID, text, html)` and `searchstats`.
//! `simplified` holds the diacritic-folded sentence text.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder};
use std::collections::BTreeMap;
use std::time::Duration;

use super::rows::{year_bounds, PlainSentenceRow, SentenceRow, SourceRow, StatsRow};
use super::{query_words, ExecQuery, QueryExecutor};
use crate::config::MySqlConfig;
use crate::error::{BackendError, SearchError};
use crate::search::{
    normalize, BackendKind, CorpusStats, DocumentFormat, GroupDate, RawRow, SearchStat, SentenceRecord, SortKey,
    SourceRecord,
};

const SENTENCE_COLUMNS: &str = "select cast(s.sentenceID as char) sentenceid, cast(o.sourceID as char) sourceid, \
     o.sourceName sourcename, o.authors authors, cast(o.date as char) date, o.link link, \
     s.hawaiianText hawaiiantext from sentences s join sources o on s.sourceID = o.sourceID where ";

const SOURCE_COLUMNS: &str = "select cast(o.sourceID as char) sourceid, o.sourceName sourcename, \
     o.groupname groupname, o.authors authors, cast(o.date as char) date, o.link link, o.title title, \
     count(s.sentenceID) sentencecount from sources o left join sentences s on s.sourceID = o.sourceID";

/// MySQL executor / MySQL 执行器
pub struct MySqlExecutor {
    pool: MySqlPool,
    page_size: u32,
}

impl MySqlExecutor {
    /// Create the pool without connecting; the first query opens a connection
    pub fn connect_lazy(config: &MySqlConfig) -> Result<Self, SearchError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(&config.url)
            .map_err(|e| SearchError::BackendUnavailable(format!("MySQL: {}", e)))?;

        tracing::info!("MySQL provider configured (page size {})", config.page_size);
        Ok(Self {
            pool,
            page_size: config.page_size.max(1),
        })
    }
}

fn search_column(query: &ExecQuery) -> &'static str {
    if query.diacritic_insensitive {
        "s.simplified"
    } else {
        "s.hawaiianText"
    }
}

/// Map `[[:<:]]`/`[[:>:]]` word markers to the ICU boundary MySQL 8 understands
fn regex_term(query: &ExecQuery) -> String {
    let term = query.term.trim();
    let term = if query.diacritic_insensitive { normalize(term) } else { term.to_string() };
    term.replace("[[:<:]]", r"\b").replace("[[:>:]]", r"\b")
}

/// Literal phrase bounded by word boundaries, any whitespace between words
fn exact_pattern(phrase: &str) -> String {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    format!(r"\b{}\b", words.join(r"\s+"))
}

fn push_term_predicate(qb: &mut QueryBuilder<'static, MySql>, query: &ExecQuery) {
    let col = search_column(query);
    let term = query.search_term();

    match query.mode.name {
        "regex" => {
            qb.push(col).push(" regexp ").push_bind(regex_term(query));
        }
        "exact" => {
            qb.push(col).push(" regexp ").push_bind(exact_pattern(&term));
        }
        "all" | "any" if query.is_quoted() => {
            qb.push("match(")
                .push(col)
                .push(") against (")
                .push_bind(format!("\"{}\"", term))
                .push(" in boolean mode)");
        }
        "all" => {
            let words = query_words(&term);
            if words.is_empty() {
                qb.push("false");
                return;
            }
            let required: Vec<String> = words.iter().map(|w| format!("+{}", w)).collect();
            qb.push("match(")
                .push(col)
                .push(") against (")
                .push_bind(required.join(" "))
                .push(" in boolean mode)");
        }
        _ => {
            qb.push("match(").push(col).push(") against (").push_bind(term).push(")");
        }
    }
}

/// Date range and group filters; date sorts also drop undated rows
fn push_filters(qb: &mut QueryBuilder<'static, MySql>, query: &ExecQuery) {
    let (from, to) = year_bounds(query.date_from, query.date_to);
    if let Some(from) = from {
        qb.push(" and o.date >= ").push_bind(from);
    }
    if let Some(to) = to {
        qb.push(" and o.date <= ").push_bind(to);
    }
    if let Some(group) = &query.group {
        qb.push(" and o.groupname = ").push_bind(group.clone());
    }
    if query.sort.is_date() {
        qb.push(" and o.date is not null");
    }
}

fn needs_source_join(query: &ExecQuery) -> bool {
    query.date_from.is_some() || query.date_to.is_some() || query.group.is_some() || query.sort.is_date()
}

fn order_clause(sort: SortKey) -> Option<&'static str> {
    match sort {
        SortKey::Random => Some("rand()"),
        SortKey::Alpha => Some("s.hawaiianText"),
        SortKey::AlphaDesc => Some("s.hawaiianText desc"),
        SortKey::Date => Some("o.date, s.hawaiianText"),
        SortKey::DateDesc => Some("o.date desc, s.hawaiianText"),
        SortKey::Source => Some("o.sourceName, s.hawaiianText"),
        SortKey::SourceDesc => Some("o.sourceName desc, s.hawaiianText"),
        SortKey::Length => Some("length(s.hawaiianText), s.hawaiianText"),
        SortKey::LengthDesc => Some("length(s.hawaiianText) desc, s.hawaiianText"),
        SortKey::None | SortKey::Score => None,
    }
}

/// Page of matching sentences with source metadata
pub(crate) fn search_query(query: &ExecQuery) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::new(SENTENCE_COLUMNS);
    push_term_predicate(&mut qb, query);
    push_filters(&mut qb, query);
    if let Some(order) = order_clause(query.sort) {
        qb.push(" order by ").push(order);
    }
    if let Some((offset, size)) = query.limit() {
        qb.push(" limit ").push_bind(offset).push(", ").push_bind(size);
    }
    qb
}

/// Total matches, joining sources only when a filter needs them
pub(crate) fn count_query(query: &ExecQuery) -> QueryBuilder<'static, MySql> {
    let mut qb = if needs_source_join(query) {
        QueryBuilder::new("select count(*) count from sentences s join sources o on s.sourceID = o.sourceID where ")
    } else {
        QueryBuilder::new("select count(*) count from sentences s where ")
    };
    push_term_predicate(&mut qb, query);
    push_filters(&mut qb, query);
    qb
}

pub(crate) fn sources_query(group: Option<&str>) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::new(SOURCE_COLUMNS);
    if let Some(group) = group {
        qb.push(" where o.groupname = ").push_bind(group.to_string());
    }
    qb.push(" group by o.sourceID having sentencecount > 0 order by o.sourceName");
    qb
}

fn source_query(source_id: &str) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::new(SOURCE_COLUMNS);
    qb.push(" where o.sourceID = ")
        .push_bind(source_id.to_string())
        .push(" group by o.sourceID");
    qb
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn default_page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch(&self, query: &ExecQuery) -> Result<Vec<RawRow>, BackendError> {
        let mut qb = search_query(query);
        tracing::debug!("MySQL fetch: {}", qb.sql());
        let rows = qb.build_query_as::<SentenceRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(RawRow::from).collect())
    }

    async fn count(&self, query: &ExecQuery) -> Result<Option<u64>, BackendError> {
        let mut qb = count_query(query);
        tracing::debug!("MySQL count: {}", qb.sql());
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(Some(count.max(0) as u64))
    }

    async fn sources(&self, group: Option<&str>) -> Result<Vec<SourceRecord>, BackendError> {
        let rows = sources_query(group)
            .build_query_as::<SourceRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SourceRecord::from).collect())
    }

    async fn source(&self, source_id: &str) -> Result<Option<SourceRecord>, BackendError> {
        let row = source_query(source_id)
            .build_query_as::<SourceRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SourceRecord::from))
    }

    async fn sentence(&self, sentence_id: &str) -> Result<Option<SentenceRecord>, BackendError> {
        let row: Option<PlainSentenceRow> = sqlx::query_as(
            "select cast(sentenceID as char) sentenceid, cast(sourceID as char) sourceid, hawaiianText hawaiiantext \
             from sentences where sentenceID = ?",
        )
        .bind(sentence_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SentenceRecord::from))
    }

    async fn sentences_by_source(&self, source_id: &str) -> Result<Vec<SentenceRecord>, BackendError> {
        let rows: Vec<PlainSentenceRow> = sqlx::query_as(
            "select cast(sentenceID as char) sentenceid, cast(sourceID as char) sourceid, hawaiianText hawaiiantext \
             from sentences where sourceID = ? order by sentenceID",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SentenceRecord::from).collect())
    }

    async fn document(&self, source_id: &str, format: DocumentFormat) -> Result<Option<String>, BackendError> {
        let sql = match format {
            DocumentFormat::Text => "select text from contents where sourceID = ?",
            DocumentFormat::Html => "select html from contents where sourceID = ?",
        };
        let body: Option<Option<String>> = sqlx::query_scalar(sql)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(body.flatten())
    }

    async fn corpus_stats(&self) -> Result<CorpusStats, BackendError> {
        let row: StatsRow = sqlx::query_as(
            "select (select count(*) from sentences) sentencecount, (select count(*) from sources) sourcecount",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CorpusStats {
            sentence_count: row.sentencecount,
            source_count: row.sourcecount,
        })
    }

    async fn group_counts(&self) -> Result<BTreeMap<String, i64>, BackendError> {
        let rows: Vec<(Option<String>, i64)> =
            sqlx::query_as("select groupname, count(distinct sourceID) c from sources group by groupname")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(group, count)| group.map(|g| (g, count)))
            .collect())
    }

    async fn latest_source_dates(&self) -> Result<Vec<GroupDate>, BackendError> {
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "select groupname, cast(max(date) as char) date from sources group by groupname order by groupname",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(group, date)| group.map(|groupname| GroupDate { groupname, date }))
            .collect())
    }

    async fn record_search(&self, stat: &SearchStat) -> Result<(), BackendError> {
        sqlx::query("insert into searchstats(searchterm,pattern,results,sort,elapsed) values(?,?,?,?,?)")
            .bind(&stat.searchterm)
            .bind(&stat.pattern)
            .bind(stat.results)
            .bind(&stat.sort)
            .bind(stat.elapsed)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ModeTranslator, Page};

    fn query(term: &str, mode: &str) -> ExecQuery {
        ExecQuery {
            term: term.to_string(),
            mode: ModeTranslator::translate(mode, BackendKind::MySql).unwrap(),
            page: Page::Number(0),
            page_size: 20,
            sort: SortKey::None,
            date_from: None,
            date_to: None,
            group: None,
            diacritic_insensitive: false,
        }
    }

    #[test]
    fn test_any_uses_natural_language_match() {
        let qb = search_query(&query("aloha", "any"));
        assert!(qb.sql().starts_with("select cast(s.sentenceID as char) sentenceid"));
        assert!(qb.sql().ends_with("where match(s.hawaiianText) against (?) limit ?, ?"));
    }

    #[test]
    fn test_all_uses_boolean_mode() {
        let qb = search_query(&query("hale kuai", "all"));
        assert!(qb.sql().contains("match(s.hawaiianText) against (? in boolean mode)"));
    }

    #[test]
    fn test_all_without_words_matches_nothing() {
        let qb = count_query(&query("?!", "all"));
        assert_eq!(qb.sql(), "select count(*) count from sentences s where false");
    }

    #[test]
    fn test_quoted_any_is_boolean_phrase() {
        let qb = search_query(&query("\"ke aloha\"", "any"));
        assert!(qb.sql().contains("against (? in boolean mode)"));
    }

    #[test]
    fn test_exact_and_regex_use_regexp() {
        let qb = search_query(&query("ke aloha", "exact"));
        assert!(qb.sql().contains("s.hawaiianText regexp ?"));
        let qb = search_query(&query("^aloha", "regex"));
        assert!(qb.sql().contains("s.hawaiianText regexp ?"));
    }

    #[test]
    fn test_exact_pattern() {
        assert_eq!(exact_pattern("ke  aloha"), r"\bke\s+aloha\b");
        assert_eq!(exact_pattern("a.b"), r"\ba\.b\b");
    }

    #[test]
    fn test_regex_word_markers() {
        let q = query("[[:<:]]aloha[[:>:]]", "regex");
        assert_eq!(regex_term(&q), r"\baloha\b");
    }

    #[test]
    fn test_diacritic_insensitive_uses_simplified() {
        let mut q = query("ʻāina", "any");
        q.diacritic_insensitive = true;
        assert!(search_query(&q).sql().contains("match(s.simplified)"));
        assert_eq!(q.search_term(), "aina");
    }

    #[test]
    fn test_filters_and_order() {
        let mut q = query("aloha", "any");
        q.date_from = Some(1850);
        q.date_to = Some(1900);
        q.group = Some("nupepa".to_string());
        q.sort = SortKey::DateDesc;
        let qb = search_query(&q);
        assert!(qb.sql().contains(
            " and o.date >= ? and o.date <= ? and o.groupname = ? and o.date is not null order by o.date desc, s.hawaiianText limit ?, ?"
        ));
    }

    #[test]
    fn test_random_order_and_unpaged() {
        let mut q = query("aloha", "any");
        q.sort = SortKey::Random;
        q.page = Page::Unpaged;
        let qb = search_query(&q);
        assert!(qb.sql().ends_with("order by rand()"));
    }

    #[test]
    fn test_count_joins_sources_only_when_filtered() {
        let q = query("aloha", "any");
        assert_eq!(
            count_query(&q).sql(),
            "select count(*) count from sentences s where match(s.hawaiianText) against (?)"
        );
        let mut q = q;
        q.group = Some("nupepa".to_string());
        assert!(count_query(&q).sql().contains("join sources o"));
        assert!(!count_query(&q).sql().contains("limit"));
    }

    #[test]
    fn test_sources_query() {
        let qb = sources_query(Some("ulukau"));
        assert!(qb
            .sql()
            .ends_with("where o.groupname = ? group by o.sourceID having sentencecount > 0 order by o.sourceName"));
        assert!(!sources_query(None).sql().contains("where"));
    }
}
