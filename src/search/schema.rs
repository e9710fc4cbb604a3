//! Result and metadata records / 结果与元数据记录

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::modes::BackendKind;

/// Row as returned by a query executor, before normalization / 执行器原始行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub sentence_id: String,
    pub source_id: String,
    pub source_name: String,
    pub authors: String,
    pub date: Option<String>,
    pub link: String,
    pub text: String,
    /// Text with engine-supplied highlight markers, when the backend highlights itself
    pub engine_highlight: Option<String>,
    pub score: Option<f64>,
}

/// Canonical sentence result / 规范化的句子结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceResult {
    pub sentence_id: String,
    pub source_id: String,
    pub source_name: String,
    pub authors: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub link: String,
    pub raw_text: String,
    pub highlighted_text: String,
}

/// Source document metadata / 来源文档元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub source_id: String,
    pub source_name: String,
    pub group_name: String,
    pub authors: String,
    pub date: Option<String>,
    pub link: String,
    pub title: String,
    pub sentence_count: i64,
}

/// Single stored sentence / 单条句子
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceRecord {
    pub sentence_id: String,
    pub source_id: String,
    pub text: String,
}

/// A source together with all of its sentences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSentences {
    pub source: SourceRecord,
    pub sentences: Vec<SentenceRecord>,
}

/// Corpus totals / 语料统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub sentence_count: i64,
    pub source_count: i64,
}

/// Most recent source date per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDate {
    pub groupname: String,
    pub date: Option<String>,
}

/// Search log entry / 搜索日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStat {
    pub searchterm: String,
    pub pattern: String,
    pub results: i64,
    #[serde(default)]
    pub sort: String,
    /// Milliseconds
    #[serde(default)]
    pub elapsed: f64,
}

/// What a provider can do / 提供者能力
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCapabilities {
    pub available_modes: BTreeMap<String, String>,
    pub provides_highlights: bool,
    pub provides_no_diacritics: bool,
}

impl ProviderCapabilities {
    /// Fixed per backend
    pub fn for_backend(kind: BackendKind) -> Self {
        Self {
            available_modes: kind
                .modes()
                .iter()
                .map(|m| (m.mode.as_str().to_string(), m.description.to_string()))
                .collect(),
            provides_highlights: kind.provides_highlights(),
            provides_no_diacritics: kind.provides_no_diacritics(),
        }
    }
}
