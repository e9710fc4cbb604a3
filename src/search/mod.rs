//! Search module - backend-independent query semantics / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Pure pieces only: normalization, mode translation, highlight masks, result shaping
//! - Executors and facades live in `providers`, which calls into this module
//! - Call direction: providers → search (unidirectional) / 调用方向
//!
//! Hawaiian orthography / 夏威夷语正字法：
//! - Macroned vowels (kahakō) fold to plain vowels for diacritic-insensitive search
//! - ʻokina (U+02BB) and its look-alike U+2018 are letters, not punctuation

pub mod mask;
pub mod modes;
pub mod normalize;
pub mod normalizer;
pub mod request;
pub mod schema;

pub use mask::{HighlightMask, HighlightTemplate, SentenceMaskBuilder};
pub use modes::{BackendKind, Granularity, MatchStyle, ModeTranslator, NativeMode, SearchMode};
pub use normalize::normalize;
pub use normalizer::ResultNormalizer;
pub use request::{DocumentFormat, Page, SearchRequest, SortKey};
pub use schema::{
    CorpusStats, GroupDate, ProviderCapabilities, RawRow, SearchStat, SentenceRecord, SentenceResult,
    SourceRecord, SourceSentences,
};
