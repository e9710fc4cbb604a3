//! Postgres executor with full-text, trigram and vector search / Postgres 执行器
//!
//! Sentences carry a precomputed `tsvector` for the original and the folded
//! text, plus an optional pgvector embedding. Column names come from config
//! and are validated as plain identifiers before they reach any statement.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::time::Duration;

use super::embedding::{vector_literal, EmbeddingClient};
use super::rows::{year_bounds, PlainSentenceRow, SentenceRow, SourceRow, StatsRow};
use super::{query_words, ExecQuery, QueryExecutor};
use crate::config::PostgresConfig;
use crate::error::{BackendError, SearchError};
use crate::search::{
    normalize, BackendKind, CorpusStats, DocumentFormat, GroupDate, MatchStyle, RawRow, SearchStat, SentenceRecord,
    SortKey, SourceRecord,
};

const SENTENCE_COLUMNS: &str = "select s.sentenceid::text sentenceid, o.sourceid::text sourceid, \
     o.sourcename sourcename, o.authors authors, o.date::text date, o.link link, s.hawaiiantext hawaiiantext";

const SENTENCE_FROM: &str = " from sentences s join sources o on s.sourceid = o.sourceid where ";

const SOURCE_COLUMNS: &str = "select o.sourceid::text sourceid, o.sourcename sourcename, o.groupname groupname, \
     o.authors authors, o.date::text date, o.link link, o.title title, count(s.sentenceid) sentencecount \
     from sources o left join sentences s on s.sourceid = o.sourceid";

/// Column names and weights used to build statements
#[derive(Debug, Clone)]
pub(crate) struct PgSettings {
    text_vector_column: String,
    folded_text_vector_column: String,
    embedding_column: String,
    vector_weight: f64,
    text_weight: f64,
    fuzzy_threshold: f64,
}

impl PgSettings {
    fn from_config(config: &PostgresConfig) -> Result<Self, SearchError> {
        for column in [
            &config.text_vector_column,
            &config.folded_text_vector_column,
            &config.embedding_column,
        ] {
            if !is_identifier(column) {
                return Err(SearchError::BackendUnavailable(format!(
                    "Postgres: invalid column name '{}'",
                    column
                )));
            }
        }
        Ok(Self {
            text_vector_column: config.text_vector_column.clone(),
            folded_text_vector_column: config.folded_text_vector_column.clone(),
            embedding_column: config.embedding_column.clone(),
            vector_weight: config.vector_weight,
            text_weight: config.text_weight,
            fuzzy_threshold: config.fuzzy_threshold,
        })
    }

    fn tsv(&self, query: &ExecQuery) -> String {
        if query.diacritic_insensitive {
            format!("s.{}", self.folded_text_vector_column)
        } else {
            format!("s.{}", self.text_vector_column)
        }
    }

    fn embedding(&self) -> String {
        format!("s.{}", self.embedding_column)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn text_column(query: &ExecQuery) -> &'static str {
    if query.diacritic_insensitive {
        "s.simplified"
    } else {
        "s.hawaiiantext"
    }
}

/// Postgres executor / Postgres 执行器
pub struct PostgresExecutor {
    pool: PgPool,
    page_size: u32,
    settings: PgSettings,
    embedding: Option<EmbeddingClient>,
}

impl PostgresExecutor {
    pub fn connect_lazy(config: &PostgresConfig, embedding: Option<EmbeddingClient>) -> Result<Self, SearchError> {
        let settings = PgSettings::from_config(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(&config.url)
            .map_err(|e| SearchError::BackendUnavailable(format!("Postgres: {}", e)))?;

        tracing::info!(
            "Postgres provider configured (page size {}, embeddings {})",
            config.page_size,
            if embedding.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            pool,
            page_size: config.page_size.max(1),
            settings,
            embedding,
        })
    }

    /// Query vector literal for semantic modes; `None` falls back to keyword search
    async fn query_vector(&self, query: &ExecQuery) -> Option<String> {
        if query.mode.style != MatchStyle::Semantic {
            return None;
        }
        let client = self.embedding.as_ref()?;
        let vector = client.embed_or_warn(query.unquoted_term()).await?;
        Some(vector_literal(&vector))
    }
}

/// How a statement scores its rows
enum Scoring {
    None,
    Fuzzy,
    Hybrid,
    Vector,
}

fn scoring(query: &ExecQuery, vector: Option<&str>) -> Scoring {
    match (query.mode.name, vector) {
        ("fuzzy", _) => Scoring::Fuzzy,
        ("hybrid", _) => Scoring::Hybrid,
        ("vector", Some(_)) => Scoring::Vector,
        _ => Scoring::None,
    }
}

fn regex_term(query: &ExecQuery) -> String {
    let term = query.term.trim();
    let term = if query.diacritic_insensitive { normalize(term) } else { term.to_string() };
    term.replace("[[:<:]]", r"\m").replace("[[:>:]]", r"\M")
}

fn like_pattern(phrase: &str) -> String {
    let escaped = phrase.replace('\\', r"\\").replace('%', r"\%").replace('_', r"\_");
    format!("%{}%", escaped)
}

fn word_regex(phrase: &str) -> String {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    format!(r"\m{}\M", words.join(r"\s+"))
}

/// Push `<tsv> @@ <tsquery>`; `false` when the term has no words
fn push_tsquery(qb: &mut QueryBuilder<'static, Postgres>, tsv: &str, query: &ExecQuery, joiner: &str) {
    let term = query.search_term();
    if query.is_quoted() {
        qb.push(tsv).push(" @@ phraseto_tsquery('simple', ").push_bind(term).push(")");
        return;
    }
    let words = query_words(&term);
    if words.is_empty() {
        qb.push("false");
        return;
    }
    qb.push(tsv)
        .push(" @@ to_tsquery('simple', ")
        .push_bind(words.join(joiner))
        .push(")");
}

fn push_plain_tsquery(qb: &mut QueryBuilder<'static, Postgres>, tsv: &str, query: &ExecQuery) {
    qb.push(tsv)
        .push(" @@ plainto_tsquery('simple', ")
        .push_bind(query.search_term())
        .push(")");
}

fn push_term_predicate(
    qb: &mut QueryBuilder<'static, Postgres>,
    query: &ExecQuery,
    settings: &PgSettings,
    scoring: &Scoring,
) {
    let col = text_column(query);
    let tsv = settings.tsv(query);

    match (query.mode.name, scoring) {
        ("regex", _) => {
            qb.push(col).push(" ~* ").push_bind(regex_term(query));
        }
        ("exact", _) => {
            let phrase = query.search_term();
            qb.push(col)
                .push(" ilike ")
                .push_bind(like_pattern(&phrase))
                .push(" and ")
                .push(col)
                .push(" ~* ")
                .push_bind(word_regex(&phrase));
        }
        ("all", _) => push_tsquery(qb, &tsv, query, " & "),
        ("near", _) => {
            if query_words(&query.search_term()).len() < 2 {
                push_plain_tsquery(qb, &tsv, query);
            } else {
                push_tsquery(qb, &tsv, query, " <-> ");
            }
        }
        (_, Scoring::Fuzzy) => {
            qb.push("similarity(")
                .push(col)
                .push(", ")
                .push_bind(query.search_term())
                .push(") >= ")
                .push_bind(settings.fuzzy_threshold);
        }
        (_, Scoring::Vector) => {
            qb.push(settings.embedding()).push(" is not null");
        }
        // Hybrid with a vector filters on the embedding instead; see `search_query`
        (_, Scoring::Hybrid) => push_plain_tsquery(qb, &tsv, query),
        _ => push_tsquery(qb, &tsv, query, " | "),
    }
}

fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, query: &ExecQuery, order_by_field: bool) {
    let (from, to) = year_bounds(query.date_from, query.date_to);
    if let Some(from) = from {
        qb.push(" and o.date >= ").push_bind(from).push("::date");
    }
    if let Some(to) = to {
        qb.push(" and o.date <= ").push_bind(to).push("::date");
    }
    if let Some(group) = &query.group {
        qb.push(" and o.groupname = ").push_bind(group.clone());
    }
    if order_by_field && query.sort.is_date() {
        qb.push(" and o.date is not null");
    }
}

fn order_clause(sort: SortKey) -> Option<&'static str> {
    match sort {
        SortKey::Random => Some("random()"),
        SortKey::Alpha => Some("s.hawaiiantext"),
        SortKey::AlphaDesc => Some("s.hawaiiantext desc"),
        SortKey::Date => Some("o.date, s.hawaiiantext"),
        SortKey::DateDesc => Some("o.date desc, s.hawaiiantext"),
        SortKey::Source => Some("o.sourcename, s.hawaiiantext"),
        SortKey::SourceDesc => Some("o.sourcename desc, s.hawaiiantext"),
        SortKey::Length => Some("length(s.hawaiiantext), s.hawaiiantext"),
        SortKey::LengthDesc => Some("length(s.hawaiiantext) desc, s.hawaiiantext"),
        SortKey::None | SortKey::Score => None,
    }
}

/// Field sorts override score order; random and none keep it
fn is_field_sort(sort: SortKey) -> bool {
    !matches!(sort, SortKey::Random | SortKey::None | SortKey::Score)
}

/// Page of matching sentences. `vector` is the query embedding literal, when available.
pub(crate) fn search_query(
    query: &ExecQuery,
    settings: &PgSettings,
    vector: Option<&str>,
) -> QueryBuilder<'static, Postgres> {
    let scoring = scoring(query, vector);
    let col = text_column(query);
    let tsv = settings.tsv(query);

    let mut qb = QueryBuilder::new(SENTENCE_COLUMNS);
    match (&scoring, vector) {
        (Scoring::Fuzzy, _) => {
            qb.push(", similarity(")
                .push(col)
                .push(", ")
                .push_bind(query.search_term())
                .push(")::float8 score");
        }
        (Scoring::Hybrid, Some(v)) => {
            qb.push(", (")
                .push_bind(settings.text_weight)
                .push(" * ts_rank_cd(")
                .push(&tsv)
                .push(", plainto_tsquery('simple', ")
                .push_bind(query.search_term())
                .push(")) + ")
                .push_bind(settings.vector_weight)
                .push(" * (1 - (")
                .push(settings.embedding())
                .push(" <=> ")
                .push_bind(v.to_string())
                .push("::vector)))::float8 score");
        }
        (Scoring::Hybrid, None) => {
            qb.push(", (")
                .push_bind(settings.text_weight)
                .push(" * ts_rank_cd(")
                .push(&tsv)
                .push(", plainto_tsquery('simple', ")
                .push_bind(query.search_term())
                .push(")))::float8 score");
        }
        (Scoring::Vector, Some(v)) => {
            qb.push(", (1 - (")
                .push(settings.embedding())
                .push(" <=> ")
                .push_bind(v.to_string())
                .push("::vector))::float8 score");
        }
        _ => {}
    }
    qb.push(SENTENCE_FROM);

    match (&scoring, vector) {
        (Scoring::Hybrid, Some(_)) => {
            qb.push(settings.embedding()).push(" is not null");
        }
        _ => push_term_predicate(&mut qb, query, settings, &scoring),
    }

    let scored = !matches!(scoring, Scoring::None);
    let field_sort = is_field_sort(query.sort);
    push_filters(&mut qb, query, !scored || field_sort);

    if scored && !field_sort {
        qb.push(" order by score desc");
    } else if let Some(order) = order_clause(query.sort) {
        qb.push(" order by ").push(order);
    }

    if let Some((offset, size)) = query.limit() {
        qb.push(" limit ")
            .push_bind(i64::from(size))
            .push(" offset ")
            .push_bind(offset as i64);
    }
    qb
}

/// Total matches; `None` for semantic modes, which rank rather than filter
pub(crate) fn count_query(query: &ExecQuery, settings: &PgSettings) -> Option<QueryBuilder<'static, Postgres>> {
    if query.mode.style == MatchStyle::Semantic {
        return None;
    }
    let scoring = scoring(query, None);
    let joined = query.date_from.is_some() || query.date_to.is_some() || query.group.is_some();
    let mut qb = if joined {
        QueryBuilder::new("select count(*) count from sentences s join sources o on s.sourceid = o.sourceid where ")
    } else {
        QueryBuilder::new("select count(*) count from sentences s where ")
    };
    push_term_predicate(&mut qb, query, settings, &scoring);
    push_filters(&mut qb, query, false);
    Some(qb)
}

pub(crate) fn sources_query(group: Option<&str>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(SOURCE_COLUMNS);
    if let Some(group) = group {
        qb.push(" where o.groupname = ").push_bind(group.to_string());
    }
    qb.push(" group by o.sourceid having count(s.sentenceid) > 0 order by o.sourcename");
    qb
}

fn source_query(source_id: &str) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(SOURCE_COLUMNS);
    qb.push(" where o.sourceid::text = ")
        .push_bind(source_id.to_string())
        .push(" group by o.sourceid");
    qb
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn default_page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch(&self, query: &ExecQuery) -> Result<Vec<RawRow>, BackendError> {
        let vector = self.query_vector(query).await;
        let mut qb = search_query(query, &self.settings, vector.as_deref());
        tracing::debug!("Postgres fetch: {}", qb.sql());
        let rows = qb.build_query_as::<SentenceRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(RawRow::from).collect())
    }

    async fn count(&self, query: &ExecQuery) -> Result<Option<u64>, BackendError> {
        let Some(mut qb) = count_query(query, &self.settings) else {
            return Ok(None);
        };
        tracing::debug!("Postgres count: {}", qb.sql());
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
            "select sentenceid::text sentenceid, sourceid::text sourceid, hawaiiantext \
             from sentences where sentenceid::text = $1",
        )
        .bind(sentence_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SentenceRecord::from))
    }

    async fn sentences_by_source(&self, source_id: &str) -> Result<Vec<SentenceRecord>, BackendError> {
        let rows: Vec<PlainSentenceRow> = sqlx::query_as(
            "select sentenceid::text sentenceid, sourceid::text sourceid, hawaiiantext \
             from sentences where sourceid::text = $1 order by sentenceid",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SentenceRecord::from).collect())
    }

    async fn document(&self, source_id: &str, format: DocumentFormat) -> Result<Option<String>, BackendError> {
        let sql = match format {
            DocumentFormat::Text => "select text from contents where sourceid::text = $1",
            DocumentFormat::Html => "select html from contents where sourceid::text = $1",
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
            sqlx::query_as("select groupname, count(distinct sourceid) c from sources group by groupname")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(group, count)| group.map(|g| (g, count)))
            .collect())
    }

    async fn latest_source_dates(&self) -> Result<Vec<GroupDate>, BackendError> {
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "select groupname, max(date)::text date from sources group by groupname order by groupname",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(group, date)| group.map(|groupname| GroupDate { groupname, date }))
            .collect())
    }

    async fn record_search(&self, stat: &SearchStat) -> Result<(), BackendError> {
        sqlx::query("insert into searchstats(searchterm,pattern,results,sort,elapsed) values($1,$2,$3,$4,$5)")
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

    fn settings() -> PgSettings {
        PgSettings::from_config(&PostgresConfig::default()).unwrap()
    }

    fn query(term: &str, mode: &str) -> ExecQuery {
        ExecQuery {
            term: term.to_string(),
            mode: ModeTranslator::translate(mode, BackendKind::Postgres).unwrap(),
            page: Page::Number(1),
            page_size: 10,
            sort: SortKey::None,
            date_from: None,
            date_to: None,
            group: None,
            diacritic_insensitive: false,
        }
    }

    #[test]
    fn test_rejects_unsafe_column_names() {
        let config = PostgresConfig {
            embedding_column: "embedding; drop table sources".to_string(),
            ..PostgresConfig::default()
        };
        assert!(PgSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_any_and_all_use_tsquery() {
        let qb = search_query(&query("hale kuai", "any"), &settings(), None);
        assert!(qb.sql().contains("where s.search_tsv @@ to_tsquery('simple', $1)"));
        assert!(qb.sql().ends_with("limit $2 offset $3"));

        let mut q = query("hale kuai", "all");
        q.diacritic_insensitive = true;
        let qb = search_query(&q, &settings(), None);
        assert!(qb.sql().contains("s.search_tsv_folded @@ to_tsquery('simple', $1)"));
    }

    #[test]
    fn test_quoted_term_uses_phrase_query() {
        let qb = search_query(&query("\"ke aloha\"", "any"), &settings(), None);
        assert!(qb.sql().contains("@@ phraseto_tsquery('simple', $1)"));
    }

    #[test]
    fn test_near_single_word_uses_plain_query() {
        let qb = search_query(&query("aloha", "near"), &settings(), None);
        assert!(qb.sql().contains("plainto_tsquery('simple', $1)"));
        let qb = search_query(&query("ke aloha", "near"), &settings(), None);
        assert!(qb.sql().contains("to_tsquery('simple', $1)"));
    }

    #[test]
    fn test_exact_uses_ilike_and_word_regex() {
        let qb = search_query(&query("ke aloha", "exact"), &settings(), None);
        assert!(qb.sql().contains("s.hawaiiantext ilike $1 and s.hawaiiantext ~* $2"));
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(word_regex("ke aloha"), r"\mke\s+aloha\M");
    }

    #[test]
    fn test_regex_boundaries() {
        let q = query("[[:<:]]aloha[[:>:]]", "regex");
        assert_eq!(regex_term(&q), r"\maloha\M");
        assert!(search_query(&q, &settings(), None).sql().contains("s.hawaiiantext ~* $1"));
    }

    #[test]
    fn test_fuzzy_orders_by_score() {
        let qb = search_query(&query("alohaa", "fuzzy"), &settings(), None);
        assert!(qb.sql().contains(", similarity(s.hawaiiantext, $1)::float8 score"));
        assert!(qb.sql().contains("where similarity(s.hawaiiantext, $2) >= $3"));
        assert!(qb.sql().contains("order by score desc limit"));
    }

    #[test]
    fn test_hybrid_with_vector() {
        let qb = search_query(&query("aloha", "hybrid"), &settings(), Some("[0.1,0.2]"));
        assert!(qb.sql().contains("s.embedding <=> $4::vector"));
        assert!(qb.sql().contains("where s.embedding is not null order by score desc"));
    }

    #[test]
    fn test_hybrid_without_vector_is_text_only() {
        let qb = search_query(&query("aloha", "hybrid"), &settings(), None);
        assert!(!qb.sql().contains("<=>"));
        assert!(qb.sql().contains("where s.search_tsv @@ plainto_tsquery('simple', $3)"));
    }

    #[test]
    fn test_vector_without_embedding_degrades_to_any() {
        let qb = search_query(&query("aloha", "vector"), &settings(), None);
        assert!(!qb.sql().contains("score"));
        assert!(qb.sql().contains("to_tsquery('simple', $1)"));
        let qb = search_query(&query("aloha", "vector"), &settings(), Some("[1.0]"));
        assert!(qb.sql().contains("where s.embedding is not null order by score desc"));
    }

    #[test]
    fn test_field_sort_overrides_score_order() {
        let mut q = query("alohaa", "fuzzy");
        q.sort = SortKey::DateDesc;
        let qb = search_query(&q, &settings(), None);
        assert!(qb.sql().contains("and o.date is not null order by o.date desc, s.hawaiiantext"));
    }

    #[test]
    fn test_date_filters_cast_to_date() {
        let mut q = query("aloha", "any");
        q.date_from = Some(1900);
        q.group = Some("nupepa".to_string());
        let qb = search_query(&q, &settings(), None);
        assert!(qb.sql().contains("and o.date >= $2::date and o.groupname = $3"));
    }

    #[test]
    fn test_count_is_none_for_semantic_modes() {
        assert!(count_query(&query("aloha", "hybrid"), &settings()).is_none());
        assert!(count_query(&query("aloha", "vector"), &settings()).is_none());
        let qb = count_query(&query("aloha", "any"), &settings()).unwrap();
        assert_eq!(
            qb.sql(),
            "select count(*) count from sentences s where s.search_tsv @@ to_tsquery('simple', $1)"
        );
    }

    #[test]
    fn test_random_sort() {
        let mut q = query("aloha", "any");
        q.sort = SortKey::Random;
        q.page = Page::Unpaged;
        assert!(search_query(&q, &settings(), None).sql().ends_with("order by random()"));
    }
}
