//! Search modes and per-backend capability tables / 搜索模式与后端能力表
//!
//! Each backend advertises its own vocabulary. `ModeTranslator` maps a
//! caller-facing mode name onto a backend's native mode, falling back through
//! aliases and then match style; unknown names are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// Caller-facing search mode / 调用方搜索模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    Any,
    All,
    Regex,
    Phrase,
    Order,
    Near,
    Match,
    MatchAll,
    Hybrid,
    HybridDoc,
    Fuzzy,
    Vector,
}

/// How a mode decides what matches / 匹配风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStyle {
    Exact,
    Fuzzy,
    Semantic,
    Regex,
}

/// Result granularity / 结果粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Sentence,
    Document,
}

/// Shape of the highlight pattern a mode needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskShape {
    /// Whole term as one contiguous phrase
    Phrase,
    /// Any listed word
    AnyWord,
    /// Every listed word, any order
    AllWords,
    /// Words in order with text allowed between
    Ordered,
    /// Caller-supplied regular expression
    Regex,
}

impl SearchMode {
    pub const ALL: [SearchMode; 13] = [
        SearchMode::Exact,
        SearchMode::Any,
        SearchMode::All,
        SearchMode::Regex,
        SearchMode::Phrase,
        SearchMode::Order,
        SearchMode::Near,
        SearchMode::Match,
        SearchMode::MatchAll,
        SearchMode::Hybrid,
        SearchMode::HybridDoc,
        SearchMode::Fuzzy,
        SearchMode::Vector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Any => "any",
            SearchMode::All => "all",
            SearchMode::Regex => "regex",
            SearchMode::Phrase => "phrase",
            SearchMode::Order => "order",
            SearchMode::Near => "near",
            SearchMode::Match => "match",
            SearchMode::MatchAll => "matchall",
            SearchMode::Hybrid => "hybrid",
            SearchMode::HybridDoc => "hybriddoc",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Vector => "vector",
        }
    }

    pub fn style(&self) -> MatchStyle {
        match self {
            SearchMode::Exact | SearchMode::Phrase | SearchMode::Order | SearchMode::Near => {
                MatchStyle::Exact
            }
            SearchMode::Any | SearchMode::All | SearchMode::Match | SearchMode::MatchAll | SearchMode::Fuzzy => {
                MatchStyle::Fuzzy
            }
            SearchMode::Hybrid | SearchMode::HybridDoc | SearchMode::Vector => MatchStyle::Semantic,
            SearchMode::Regex => MatchStyle::Regex,
        }
    }

    pub fn mask_shape(&self) -> MaskShape {
        match self {
            SearchMode::Exact | SearchMode::Phrase => MaskShape::Phrase,
            SearchMode::All | SearchMode::MatchAll => MaskShape::AllWords,
            SearchMode::Order | SearchMode::Near => MaskShape::Ordered,
            SearchMode::Regex => MaskShape::Regex,
            SearchMode::Any
            | SearchMode::Match
            | SearchMode::Fuzzy
            | SearchMode::Hybrid
            | SearchMode::HybridDoc
            | SearchMode::Vector => MaskShape::AnyWord,
        }
    }

    /// Modes with the same meaning under another backend's vocabulary, best first
    pub fn aliases(&self) -> &'static [SearchMode] {
        match self {
            SearchMode::Any => &[SearchMode::Match],
            SearchMode::Match => &[SearchMode::Any],
            SearchMode::All => &[SearchMode::MatchAll],
            SearchMode::MatchAll => &[SearchMode::All],
            SearchMode::Exact => &[SearchMode::Phrase],
            SearchMode::Phrase => &[SearchMode::Exact],
            SearchMode::Order => &[SearchMode::Near, SearchMode::Exact, SearchMode::Phrase],
            SearchMode::Near => &[SearchMode::Order, SearchMode::Exact, SearchMode::Phrase],
            SearchMode::Vector => &[SearchMode::Hybrid],
            SearchMode::HybridDoc => &[SearchMode::Hybrid],
            SearchMode::Fuzzy => &[SearchMode::Any, SearchMode::Match],
            SearchMode::Hybrid | SearchMode::Regex => &[],
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SearchMode::ALL
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(())
    }
}

/// Native mode entry in a backend's capability table / 后端原生模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMode {
    /// Name the backend's query builder dispatches on
    pub name: &'static str,
    /// Caller-facing mode this entry is advertised as
    pub mode: SearchMode,
    pub description: &'static str,
    pub style: MatchStyle,
    pub granularity: Granularity,
}

const fn native(
    name: &'static str,
    mode: SearchMode,
    description: &'static str,
    style: MatchStyle,
    granularity: Granularity,
) -> NativeMode {
    NativeMode { name, mode, description, style, granularity }
}

const MYSQL_MODES: &[NativeMode] = &[
    native("exact", SearchMode::Exact, "Match exact phrase", MatchStyle::Exact, Granularity::Sentence),
    native("any", SearchMode::Any, "Match any of the words", MatchStyle::Fuzzy, Granularity::Sentence),
    native("all", SearchMode::All, "Match all words in any order", MatchStyle::Fuzzy, Granularity::Sentence),
    native("regex", SearchMode::Regex, "Regular expression search", MatchStyle::Regex, Granularity::Sentence),
];

const POSTGRES_MODES: &[NativeMode] = &[
    native("exact", SearchMode::Exact, "Match exact phrase", MatchStyle::Exact, Granularity::Sentence),
    native("any", SearchMode::Any, "Match any of the words", MatchStyle::Fuzzy, Granularity::Sentence),
    native("all", SearchMode::All, "Match all words in any order", MatchStyle::Fuzzy, Granularity::Sentence),
    native("near", SearchMode::Near, "Words adjacent in order", MatchStyle::Exact, Granularity::Sentence),
    native("regex", SearchMode::Regex, "Regular expression search", MatchStyle::Regex, Granularity::Sentence),
    native("hybrid", SearchMode::Hybrid, "Hybrid: keyword + vector + quality", MatchStyle::Semantic, Granularity::Sentence),
    native("fuzzy", SearchMode::Fuzzy, "Similar spelling (trigram similarity)", MatchStyle::Fuzzy, Granularity::Sentence),
    native("vector", SearchMode::Vector, "Semantic similarity only", MatchStyle::Semantic, Granularity::Sentence),
];

const ELASTICSEARCH_MODES: &[NativeMode] = &[
    native("matchsentence", SearchMode::Match, "Match any of the words", MatchStyle::Fuzzy, Granularity::Sentence),
    native("matchsentence_all", SearchMode::MatchAll, "Match all words in any order", MatchStyle::Fuzzy, Granularity::Sentence),
    native("phrasesentence", SearchMode::Phrase, "Match exact phrase", MatchStyle::Exact, Granularity::Sentence),
    native("regexpsentence", SearchMode::Regex, "Regular expression search", MatchStyle::Regex, Granularity::Sentence),
    native("hybridsentence", SearchMode::Hybrid, "Hybrid semantic search on sentences", MatchStyle::Semantic, Granularity::Sentence),
    native("hybrid", SearchMode::HybridDoc, "Hybrid semantic search on documents", MatchStyle::Semantic, Granularity::Document),
];

/// Search backend kind / 搜索后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "MySQL")]
    MySql,
    Postgres,
    Elasticsearch,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::MySql, BackendKind::Postgres, BackendKind::Elasticsearch];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::MySql => "MySQL",
            BackendKind::Postgres => "Postgres",
            BackendKind::Elasticsearch => "Elasticsearch",
        }
    }

    /// Capability table in advertised order
    pub fn modes(&self) -> &'static [NativeMode] {
        match self {
            BackendKind::MySql => MYSQL_MODES,
            BackendKind::Postgres => POSTGRES_MODES,
            BackendKind::Elasticsearch => ELASTICSEARCH_MODES,
        }
    }

    /// Advertised caller-facing mode keys
    pub fn mode_keys(&self) -> Vec<String> {
        self.modes().iter().map(|m| m.mode.as_str().to_string()).collect()
    }

    /// Whether the engine returns highlighted fragments itself
    pub fn provides_highlights(&self) -> bool {
        matches!(self, BackendKind::Elasticsearch)
    }

    /// Every backend keeps a folded text column or field
    pub fn provides_no_diacritics(&self) -> bool {
        true
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "laana" => Ok(BackendKind::MySql),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "elasticsearch" | "es" => Ok(BackendKind::Elasticsearch),
            _ => Err(SearchError::UnknownProvider(s.to_string())),
        }
    }
}

/// Mode translator / 模式翻译器
pub struct ModeTranslator;

impl ModeTranslator {
    /// Translate a caller-facing mode name into the backend's native mode.
    ///
    /// Order of resolution: native name, advertised mode, alias, same match
    /// style (sentence granularity first), then the backend's default fuzzy
    /// mode. Names that are not modes at all fail with `InvalidMode`.
    pub fn translate(mode: &str, backend: BackendKind) -> Result<NativeMode, SearchError> {
        let table = backend.modes();

        if let Some(n) = table.iter().find(|n| n.name.eq_ignore_ascii_case(mode.trim())) {
            // "hybrid" is both a native and a caller name on Elasticsearch; caller name wins
            if mode.trim().parse::<SearchMode>().map(|m| m == n.mode).unwrap_or(true) {
                return Ok(*n);
            }
        }

        let requested: SearchMode = mode.parse().map_err(|_| SearchError::InvalidMode {
            mode: mode.to_string(),
            valid: backend.mode_keys(),
        })?;

        if let Some(n) = Self::advertised(requested, backend) {
            return Ok(n);
        }

        for alias in requested.aliases() {
            if let Some(n) = Self::advertised(*alias, backend) {
                tracing::debug!("{}: mode {} served as {}", backend, requested, n.mode);
                return Ok(n);
            }
        }

        if let Some(n) = Self::select_by_style(requested.style(), backend) {
            tracing::debug!("{}: mode {} has no direct equivalent, using {}", backend, requested, n.mode);
            return Ok(n);
        }

        let fallback = Self::default_mode(backend);
        tracing::debug!("{}: mode {} falls back to {}", backend, requested, fallback.mode);
        Ok(fallback)
    }

    fn advertised(mode: SearchMode, backend: BackendKind) -> Option<NativeMode> {
        backend.modes().iter().find(|n| n.mode == mode).copied()
    }

    /// First mode with the given style, preferring sentence granularity
    pub fn select_by_style(style: MatchStyle, backend: BackendKind) -> Option<NativeMode> {
        let candidates = backend.modes().iter().filter(|n| n.style == style);
        let mut document_level = None;
        for n in candidates {
            if n.granularity == Granularity::Sentence {
                return Some(*n);
            }
            document_level.get_or_insert(*n);
        }
        document_level
    }

    /// Best fuzzy sentence-level mode for the backend
    pub fn default_mode(backend: BackendKind) -> NativeMode {
        Self::select_by_style(MatchStyle::Fuzzy, backend).unwrap_or(backend.modes()[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("exact".parse::<SearchMode>(), Ok(SearchMode::Exact));
        assert_eq!("MatchAll".parse::<SearchMode>(), Ok(SearchMode::MatchAll));
        assert_eq!(" hybriddoc ".parse::<SearchMode>(), Ok(SearchMode::HybridDoc));
        assert!("nonexistent".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("MySQL".parse::<BackendKind>().ok(), Some(BackendKind::MySql));
        assert_eq!("laana".parse::<BackendKind>().ok(), Some(BackendKind::MySql));
        assert_eq!("PG".parse::<BackendKind>().ok(), Some(BackendKind::Postgres));
        assert_eq!("es".parse::<BackendKind>().ok(), Some(BackendKind::Elasticsearch));
        assert!(matches!(
            "solr".parse::<BackendKind>(),
            Err(SearchError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_translate_advertised() {
        let n = ModeTranslator::translate("all", BackendKind::MySql).unwrap();
        assert_eq!(n.name, "all");
        let n = ModeTranslator::translate("matchall", BackendKind::Elasticsearch).unwrap();
        assert_eq!(n.name, "matchsentence_all");
        let n = ModeTranslator::translate("hybriddoc", BackendKind::Elasticsearch).unwrap();
        assert_eq!(n.name, "hybrid");
        assert_eq!(n.granularity, Granularity::Document);
    }

    #[test]
    fn test_hybrid_name_prefers_caller_mode_on_elasticsearch() {
        let n = ModeTranslator::translate("hybrid", BackendKind::Elasticsearch).unwrap();
        assert_eq!(n.name, "hybridsentence");
        assert_eq!(n.granularity, Granularity::Sentence);
    }

    #[test]
    fn test_translate_aliases() {
        assert_eq!(ModeTranslator::translate("any", BackendKind::Elasticsearch).unwrap().name, "matchsentence");
        assert_eq!(ModeTranslator::translate("exact", BackendKind::Elasticsearch).unwrap().name, "phrasesentence");
        assert_eq!(ModeTranslator::translate("phrase", BackendKind::MySql).unwrap().name, "exact");
        assert_eq!(ModeTranslator::translate("order", BackendKind::Postgres).unwrap().name, "near");
        assert_eq!(ModeTranslator::translate("matchall", BackendKind::Postgres).unwrap().name, "all");
    }

    #[test]
    fn test_translate_style_fallback() {
        // No semantic mode on MySQL: best fuzzy equivalent
        let n = ModeTranslator::translate("hybrid", BackendKind::MySql).unwrap();
        assert_eq!(n.name, "any");
        let n = ModeTranslator::translate("fuzzy", BackendKind::Elasticsearch).unwrap();
        assert_eq!(n.name, "matchsentence");
    }

    #[test]
    fn test_translate_unknown_lists_valid_modes() {
        for backend in BackendKind::ALL {
            match ModeTranslator::translate("nonexistent", backend) {
                Err(SearchError::InvalidMode { mode, valid }) => {
                    assert_eq!(mode, "nonexistent");
                    assert_eq!(valid, backend.mode_keys());
                }
                other => panic!("expected InvalidMode, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_select_prefers_sentence_granularity() {
        let n = ModeTranslator::select_by_style(MatchStyle::Semantic, BackendKind::Elasticsearch).unwrap();
        assert_eq!(n.granularity, Granularity::Sentence);
    }

    #[test]
    fn test_default_modes() {
        assert_eq!(ModeTranslator::default_mode(BackendKind::MySql).name, "any");
        assert_eq!(ModeTranslator::default_mode(BackendKind::Postgres).name, "any");
        assert_eq!(ModeTranslator::default_mode(BackendKind::Elasticsearch).name, "matchsentence");
    }
}
