//! Raw rows to canonical sentence results / 结果规范化

use super::mask::HighlightMask;
use super::schema::{RawRow, SentenceResult};

/// Highlight markers requested from the document-search engine
pub const ENGINE_HIGHLIGHT_START: &str = "__START_HIGHLIGHT__";
pub const ENGINE_HIGHLIGHT_END: &str = "__END_HIGHLIGHT__";

/// Result normalizer / 结果规范化器
pub struct ResultNormalizer<'a> {
    mask: &'a HighlightMask,
    enforce_stripped_check: bool,
}

impl<'a> ResultNormalizer<'a> {
    pub fn new(mask: &'a HighlightMask) -> Self {
        Self {
            mask,
            enforce_stripped_check: false,
        }
    }

    /// Drop rows that fail the mask's exact-phrase check
    pub fn enforce_stripped_check(mut self, enabled: bool) -> Self {
        self.enforce_stripped_check = enabled;
        self
    }

    pub fn normalize(&self, rows: Vec<RawRow>) -> Vec<SentenceResult> {
        let total = rows.len();
        let results: Vec<SentenceResult> = rows.into_iter().filter_map(|r| self.normalize_row(r)).collect();
        if results.len() < total {
            tracing::debug!("Stripped check excluded {} of {} rows", total - results.len(), total);
        }
        results
    }

    /// `None` when the row is excluded
    pub fn normalize_row(&self, row: RawRow) -> Option<SentenceResult> {
        let highlighted_text = match row.engine_highlight.as_deref() {
            Some(marked) if strip_engine_markers(marked) == row.text => {
                self.convert_engine_markers(marked)
            }
            // Fragments that don't cover the full text fall back to the local mask
            _ => {
                if self.enforce_stripped_check
                    && row.engine_highlight.is_none()
                    && !self.mask.passes_stripped_check(&row.text)
                {
                    return None;
                }
                self.mask.highlight(&row.text)
            }
        };

        Some(SentenceResult {
            sentence_id: row.sentence_id,
            source_id: row.source_id,
            source_name: row.source_name,
            authors: row.authors,
            date: row.date.filter(|d| !d.is_empty()),
            link: row.link,
            raw_text: row.text,
            highlighted_text,
        })
    }

    fn convert_engine_markers(&self, marked: &str) -> String {
        let template = self.mask.template();
        marked
            .replace(ENGINE_HIGHLIGHT_START, &template.open)
            .replace(ENGINE_HIGHLIGHT_END, &template.close)
    }
}

/// Text with the engine's highlight markers removed
pub fn strip_engine_markers(marked: &str) -> String {
    marked.replace(ENGINE_HIGHLIGHT_START, "").replace(ENGINE_HIGHLIGHT_END, "")
}
