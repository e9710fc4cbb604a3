//! Search request definition / 搜索请求定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result ordering / 结果排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    /// Backend's own order-by-random, re-evaluated per call
    #[default]
    #[serde(rename = "rand")]
    Random,
    #[serde(rename = "alpha")]
    Alpha,
    #[serde(rename = "alpha desc")]
    AlphaDesc,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "date desc")]
    DateDesc,
    #[serde(rename = "source")]
    Source,
    #[serde(rename = "source desc")]
    SourceDesc,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "length desc")]
    LengthDesc,
    #[serde(rename = "none")]
    None,
    /// Relevance, engine-defined
    #[serde(rename = "score")]
    Score,
}

impl SortKey {
    /// Canonical vocabulary shared with the front end
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Random => "rand",
            SortKey::Alpha => "alpha",
            SortKey::AlphaDesc => "alpha desc",
            SortKey::Date => "date",
            SortKey::DateDesc => "date desc",
            SortKey::Source => "source",
            SortKey::SourceDesc => "source desc",
            SortKey::Length => "length",
            SortKey::LengthDesc => "length desc",
            SortKey::None => "none",
            SortKey::Score => "score",
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, SortKey::Date | SortKey::DateDesc)
    }

    pub fn is_descending(&self) -> bool {
        matches!(
            self,
            SortKey::AlphaDesc | SortKey::DateDesc | SortKey::SourceDesc | SortKey::LengthDesc
        )
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ();

    /// Accepts "alpha desc", "alpha_desc" and "alphadesc" spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();
        match key.as_str() {
            "rand" | "random" => Ok(SortKey::Random),
            "alpha" => Ok(SortKey::Alpha),
            "alphadesc" => Ok(SortKey::AlphaDesc),
            "date" => Ok(SortKey::Date),
            "datedesc" => Ok(SortKey::DateDesc),
            "source" => Ok(SortKey::Source),
            "sourcedesc" => Ok(SortKey::SourceDesc),
            "length" => Ok(SortKey::Length),
            "lengthdesc" => Ok(SortKey::LengthDesc),
            "none" | "" => Ok(SortKey::None),
            "score" | "relevance" => Ok(SortKey::Score),
            _ => Err(()),
        }
    }
}

/// Page selector / 分页选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Whole result set
    Unpaged,
    /// Zero-based page number
    Number(u32),
}

impl Page {
    /// Negative page numbers mean unpaged
    pub fn from_index(page: i64) -> Self {
        if page < 0 {
            Page::Unpaged
        } else {
            Page::Number(u32::try_from(page).unwrap_or(u32::MAX))
        }
    }

    /// Row offset for the page, `None` when unpaged
    pub fn offset(&self, page_size: u32) -> Option<u64> {
        match self {
            Page::Unpaged => None,
            Page::Number(n) => Some(u64::from(*n) * u64::from(page_size)),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::Number(0)
    }
}

/// Requested document rendering / 文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Text,
    Html,
}

/// Search request / 搜索请求
///
/// `mode` is the caller-facing name; the provider translates and validates it.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub term: String,
    pub mode: String,
    pub page: Page,
    /// `None` uses the provider's configured page size
    pub page_size: Option<u32>,
    pub diacritic_insensitive: bool,
    pub date_from: Option<i32>,
    pub date_to: Option<i32>,
    pub sort: SortKey,
    pub group: Option<String>,
}

impl SearchRequest {
    pub fn new(term: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            mode: mode.into(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_dates(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.trim().is_empty() { None } else { Some(group) };
        self
    }

    pub fn diacritic_insensitive(mut self, enabled: bool) -> Self {
        self.diacritic_insensitive = enabled;
        self
    }

    /// Term with surrounding whitespace removed
    pub fn trimmed_term(&self) -> &str {
        self.term.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_spellings() {
        assert_eq!("rand".parse::<SortKey>(), Ok(SortKey::Random));
        assert_eq!("alpha desc".parse::<SortKey>(), Ok(SortKey::AlphaDesc));
        assert_eq!("alpha_desc".parse::<SortKey>(), Ok(SortKey::AlphaDesc));
        assert_eq!("Length Desc".parse::<SortKey>(), Ok(SortKey::LengthDesc));
        assert_eq!("".parse::<SortKey>(), Ok(SortKey::None));
        assert!("sideways".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_sort_key_round_trips_canonical_vocabulary() {
        for s in [
            "rand", "alpha", "alpha desc", "date", "date desc", "source", "source desc", "length",
            "length desc", "none",
        ] {
            let key: SortKey = s.parse().unwrap();
            assert_eq!(key.as_str(), s);
        }
    }

    #[test]
    fn test_sort_key_serde_uses_canonical_names() {
        let json = serde_json::to_string(&SortKey::SourceDesc).unwrap();
        assert_eq!(json, "\"source desc\"");
    }

    #[test]
    fn test_page_offsets() {
        assert_eq!(Page::from_index(-1), Page::Unpaged);
        assert_eq!(Page::from_index(0).offset(5), Some(0));
        assert_eq!(Page::from_index(3).offset(5), Some(15));
        assert_eq!(Page::Unpaged.offset(5), None);
    }

    #[test]
    fn test_request_builder() {
        let req = SearchRequest::new(" aloha ", "any")
            .with_page(Page::Number(2))
            .with_page_size(0)
            .with_group("  ")
            .with_sort(SortKey::DateDesc)
            .diacritic_insensitive(true);
        assert_eq!(req.trimmed_term(), "aloha");
        assert_eq!(req.page_size, Some(1));
        assert_eq!(req.group, None);
        assert!(req.sort.is_date());
        assert!(req.diacritic_insensitive);
    }
}
