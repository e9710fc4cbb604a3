//! Row shapes shared by the relational executors / 关系型执行器共用行结构
//!
//! Both SQL dialects alias their columns to the same lowercase names so one
//! set of `FromRow` structs decodes either backend.

use crate::search::{RawRow, SentenceRecord, SourceRecord};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SentenceRow {
    pub sentenceid: String,
    pub sourceid: String,
    pub sourcename: Option<String>,
    pub authors: Option<String>,
    pub date: Option<String>,
    pub link: Option<String>,
    pub hawaiiantext: String,
    #[sqlx(default)]
    pub score: Option<f64>,
}

impl From<SentenceRow> for RawRow {
    fn from(row: SentenceRow) -> Self {
        RawRow {
            sentence_id: row.sentenceid,
            source_id: row.sourceid,
            source_name: row.sourcename.unwrap_or_default(),
            authors: row.authors.unwrap_or_default(),
            date: row.date,
            link: row.link.unwrap_or_default(),
            text: row.hawaiiantext,
            engine_highlight: None,
            score: row.score,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub sourceid: String,
    pub sourcename: Option<String>,
    pub groupname: Option<String>,
    pub authors: Option<String>,
    pub date: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub sentencecount: i64,
}

impl From<SourceRow> for SourceRecord {
    fn from(row: SourceRow) -> Self {
        SourceRecord {
            source_id: row.sourceid,
            source_name: row.sourcename.unwrap_or_default(),
            group_name: row.groupname.unwrap_or_default(),
            authors: row.authors.unwrap_or_default(),
            date: row.date.filter(|d| !d.is_empty()),
            link: row.link.unwrap_or_default(),
            title: row.title.unwrap_or_default(),
            sentence_count: row.sentencecount,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PlainSentenceRow {
    pub sentenceid: String,
    pub sourceid: String,
    pub hawaiiantext: String,
}

impl From<PlainSentenceRow> for SentenceRecord {
    fn from(row: PlainSentenceRow) -> Self {
        SentenceRecord {
            sentence_id: row.sentenceid,
            source_id: row.sourceid,
            text: row.hawaiiantext,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatsRow {
    pub sentencecount: i64,
    pub sourcecount: i64,
}

/// `(lower, upper)` date bounds for an inclusive year range
pub(crate) fn year_bounds(from: Option<i32>, to: Option<i32>) -> (Option<String>, Option<String>) {
    (
        from.map(|y| format!("{:04}-01-01", y)),
        to.map(|y| format!("{:04}-12-31", y)),
    )
}
