//! Highlight mask construction / 高亮掩码构建
//!
//! A mask is built once per request and applied to every row of that
//! request's results. Word boundaries are expressed with an explicit
//! Hawaiian word-char class so the ʻokina and its curly-quote look-alike
//! behave like letters.

use regex::{Regex, RegexBuilder};

use super::modes::{MaskShape, SearchMode};
use super::normalize::{base_vowel, is_okina, normalize, OKINA_LOOKALIKE};
use crate::error::SearchError;

/// Default highlight markers / 默认高亮标记
pub const MATCH_OPEN: &str = "<span class=\"match\">";
pub const MATCH_CLOSE: &str = "</span>";

/// Capture group holding the highlighted span
const MATCH_GROUP: &str = "hl";

/// Chars that count as part of a word
const WORD_CLASS: &str = r"\p{L}\p{M}\p{N}_ʻ‘";

/// Either ʻokina form
const OKINA_CLASS: &str = "[ʻ‘]";

/// Replacement template / 替换模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightTemplate {
    pub open: String,
    pub close: String,
}

impl Default for HighlightTemplate {
    fn default() -> Self {
        Self {
            open: MATCH_OPEN.to_string(),
            close: MATCH_CLOSE.to_string(),
        }
    }
}

/// Compiled highlight mask / 高亮掩码
#[derive(Debug, Clone, Default)]
pub struct HighlightMask {
    pattern: Option<Regex>,
    /// Every one of these must match for `is_match` (all-words modes)
    required: Vec<Regex>,
    stripped_check: Option<Regex>,
    template: HighlightTemplate,
}

impl HighlightMask {
    /// Pass-through mask
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn stripped_check(&self) -> Option<&Regex> {
        self.stripped_check.as_ref()
    }

    pub fn template(&self) -> &HighlightTemplate {
        &self.template
    }

    /// Whether the text satisfies the mask's matching rule.
    ///
    /// An empty mask matches everything.
    pub fn is_match(&self, text: &str) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        pattern.is_match(text) && self.required.iter().all(|r| r.is_match(text))
    }

    /// Exact-phrase filter; `true` when there is no check
    pub fn passes_stripped_check(&self, text: &str) -> bool {
        self.stripped_check.as_ref().map_or(true, |r| r.is_match(text))
    }

    /// Wrap every match in the template. Never drops characters.
    pub fn highlight(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len() + 32);
        let mut copied = 0;
        let mut pos = 0;

        while pos <= text.len() {
            let Some(caps) = pattern.captures_at(text, pos) else {
                break;
            };
            let Some(m) = caps.name(MATCH_GROUP).or_else(|| caps.get(0)) else {
                break;
            };
            if m.start() == m.end() {
                pos = next_char_boundary(text, m.end());
                continue;
            }
            out.push_str(&text[copied..m.start()]);
            out.push_str(&self.template.open);
            out.push_str(m.as_str());
            out.push_str(&self.template.close);
            copied = m.end();
            pos = m.end();
        }

        out.push_str(&text[copied..]);
        out
    }
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
        .unwrap_or(text.len() + 1)
}

/// Sentence mask builder / 句子掩码构建器
#[derive(Debug, Clone)]
pub struct SentenceMaskBuilder<'a> {
    term: &'a str,
    mode: SearchMode,
    diacritic_insensitive: bool,
}

impl<'a> SentenceMaskBuilder<'a> {
    pub fn new(term: &'a str, mode: SearchMode) -> Self {
        Self {
            term,
            mode,
            diacritic_insensitive: false,
        }
    }

    pub fn diacritic_insensitive(mut self, enabled: bool) -> Self {
        self.diacritic_insensitive = enabled;
        self
    }

    /// Build the mask. Only `regex` mode can fail, with `InvalidPattern`.
    pub fn build(&self) -> Result<HighlightMask, SearchError> {
        let shape = self.mode.mask_shape();

        let mut term = self.term.trim().to_string();
        if self.diacritic_insensitive {
            term = normalize(&term);
        }
        if matches!(shape, MaskShape::Phrase | MaskShape::Regex) {
            if let Some(rest) = term.strip_prefix(OKINA_LOOKALIKE) {
                term = rest.to_string();
            }
        }
        if term.trim().is_empty() {
            return Ok(HighlightMask::empty());
        }

        if shape == MaskShape::Regex {
            let body = term.replace("[[:<:]]", r"\b").replace("[[:>:]]", r"\b");
            let pattern = compile(&body)?;
            return Ok(HighlightMask {
                pattern: Some(pattern),
                ..HighlightMask::default()
            });
        }

        let expand = self.diacritic_insensitive && shape != MaskShape::Phrase;

        let quoted = unquote(&term);
        if let Some(phrase) = quoted {
            // Quoted content is a single literal phrase in every non-regex shape
            let body = anchored(&phrase_body(phrase, expand));
            let pattern = compile(&body)?;
            let stripped_check = match shape {
                MaskShape::AnyWord | MaskShape::AllWords => Some(pattern.clone()),
                _ => None,
            };
            return Ok(HighlightMask {
                pattern: Some(pattern),
                stripped_check,
                ..HighlightMask::default()
            });
        }

        let words: Vec<String> = term.split_whitespace().map(|w| word_body(w, expand)).collect();

        let (body, required) = match shape {
            MaskShape::Phrase => (anchored(&phrase_body(&term, expand)), Vec::new()),
            MaskShape::AnyWord | MaskShape::Regex => (anchored(&words.join("|")), Vec::new()),
            MaskShape::AllWords => {
                let required = words
                    .iter()
                    .map(|w| compile(&anchored(w)))
                    .collect::<Result<Vec<_>, _>>()?;
                (anchored(&words.join("|")), required)
            }
            MaskShape::Ordered => {
                let gap = format!("(?:[^{w}]|[^{w}].*?[^{w}])", w = WORD_CLASS);
                (anchored(&words.join(&gap)), Vec::new())
            }
        };

        Ok(HighlightMask {
            pattern: Some(compile(&body)?),
            required,
            ..HighlightMask::default()
        })
    }
}

/// Inner text of a `"..."` term
fn unquote(term: &str) -> Option<&str> {
    let inner = term.strip_prefix('"')?.strip_suffix('"')?;
    let inner = inner.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Escaped single word; ʻokina forms match each other, vowels optionally expand
fn word_body(word: &str, expand: bool) -> String {
    let mut out = String::with_capacity(word.len() * 4);
    for c in word.chars() {
        if is_okina(c) {
            out.push_str(OKINA_CLASS);
            continue;
        }
        if expand {
            if let Some(v) = base_vowel(c) {
                out.push_str(OKINA_CLASS);
                out.push('*');
                out.push_str(vowel_class(v));
                continue;
            }
        }
        out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
    }
    out
}

fn vowel_class(v: char) -> &'static str {
    match v {
        'a' => "[aĀā]",
        'e' => "[eĒē]",
        'i' => "[iĪī]",
        'o' => "[oŌō]",
        _ => "[uŪū]",
    }
}

fn phrase_body(phrase: &str, expand: bool) -> String {
    phrase
        .split_whitespace()
        .map(|w| word_body(w, expand))
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Wrap a body in Hawaiian-aware word boundaries, capturing the inner span
fn anchored(body: &str) -> String {
    format!(
        "(?:^|[^{w}])(?P<{g}>{body})(?:$|[^{w}])",
        w = WORD_CLASS,
        g = MATCH_GROUP,
        body = body
    )
}

fn compile(pattern: &str) -> Result<Regex, SearchError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .unicode(true)
        .build()
        .map_err(|e| SearchError::InvalidPattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(term: &str, mode: SearchMode, insensitive: bool) -> HighlightMask {
        SentenceMaskBuilder::new(term, mode)
            .diacritic_insensitive(insensitive)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_term_is_pass_through() {
        let m = mask("   ", SearchMode::Any, true);
        assert!(m.is_empty());
        assert_eq!(m.highlight("aloha"), "aloha");
        assert!(m.is_match("anything"));
    }

    #[test]
    fn test_okina_insensitive_both_directions() {
        let m = mask("hoʻokipa", SearchMode::Any, true);
        assert!(m.is_match("ka hookipa nui"));
        assert!(m.is_match("ka hoʻokipa nui"));

        let m = mask("hookipa", SearchMode::Any, true);
        assert!(m.is_match("ka hoʻokipa nui"));
        assert!(m.is_match("ka ho‘okipa nui"));
        assert_eq!(
            m.highlight("ka hoʻokipa nui"),
            "ka <span class=\"match\">hoʻokipa</span> nui"
        );
    }

    #[test]
    fn test_macron_insensitive() {
        let m = mask("halau", SearchMode::All, true);
        assert!(m.is_match("Ma ka hālau hula"));
        let m = mask("hālau", SearchMode::Any, true);
        assert!(m.is_match("Ma ka halau hula"));
    }

    #[test]
    fn test_exact_requires_contiguous_phrase() {
        let m = mask("hale kuai", SearchMode::Exact, false);
        assert!(m.is_match("Aia ka hale kuai ma laila."));
        assert!(!m.is_match("Aia ke kuai hale ma laila."));
        assert!(!m.is_match("Aia ka hale ma ke kuai."));
        assert_eq!(
            m.highlight("ka hale kuai nui"),
            "ka <span class=\"match\">hale kuai</span> nui"
        );
    }

    #[test]
    fn test_all_requires_every_word() {
        let m = mask("hale kuai", SearchMode::All, false);
        assert!(m.is_match("ke kuai ma ka hale"));
        assert!(m.is_match("hale kuai"));
        assert!(!m.is_match("he hale nani"));
        assert!(!m.is_match("kuai wale"));
    }

    #[test]
    fn test_any_accepts_single_word() {
        let m = mask("hale kuai", SearchMode::Any, false);
        assert!(m.is_match("he hale nani"));
        assert!(!m.is_match("he wahi nani"));
    }

    #[test]
    fn test_word_boundaries() {
        let m = mask("hale", SearchMode::Any, false);
        assert!(!m.is_match("halemua"));
        assert!(!m.is_match("nahale"));
        assert_eq!(
            m.highlight("hale, hale hale."),
            "<span class=\"match\">hale</span>, <span class=\"match\">hale</span> <span class=\"match\">hale</span>."
        );
    }

    #[test]
    fn test_okina_is_a_letter() {
        // "ike" must not match inside "ʻike" when diacritics matter
        let m = mask("ike", SearchMode::Any, false);
        assert!(!m.is_match("ka ʻike"));
        assert!(!m.is_match("ka ‘ike"));

        let m = mask("ʻike", SearchMode::Any, false);
        assert!(m.is_match("ka ‘ike"));
        assert_eq!(m.highlight("ka ʻike"), "ka <span class=\"match\">ʻike</span>");
    }

    #[test]
    fn test_ordered_allows_gap() {
        let m = mask("hale kuai", SearchMode::Order, false);
        assert!(m.is_match("ka hale nui o ke kuai"));
        assert!(m.is_match("ka hale kuai"));
        assert!(!m.is_match("ke kuai o ka hale"));
    }

    #[test]
    fn test_quoted_phrase_under_any() {
        let m = mask("\"hale kuai\"", SearchMode::Any, false);
        assert!(m.is_match("ka hale kuai"));
        assert!(!m.is_match("ke kuai o ka hale"));
        assert!(m.stripped_check().is_some());
        assert!(m.passes_stripped_check("ka hale kuai"));
        assert!(!m.passes_stripped_check("ka hale a me ke kuai"));
    }

    #[test]
    fn test_unquoted_has_no_stripped_check() {
        let m = mask("hale kuai", SearchMode::Any, false);
        assert!(m.stripped_check().is_none());
        assert!(m.passes_stripped_check("anything"));
    }

    #[test]
    fn test_regex_mode() {
        let m = mask("[[:<:]]ka[[:>:]] [a-z]+", SearchMode::Regex, false);
        assert!(m.is_match("ka hale"));
        assert_eq!(m.highlight("ʻo ka hale"), "ʻo <span class=\"match\">ka hale</span>");
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let err = SentenceMaskBuilder::new("(unclosed", SearchMode::Regex).build();
        assert!(matches!(err, Err(SearchError::InvalidPattern(_))));
    }

    #[test]
    fn test_metachars_are_literal_outside_regex_mode() {
        let m = mask("a.b (c)", SearchMode::Exact, false);
        assert!(m.is_match("x a.b (c) y"));
        assert!(!m.is_match("x axb (c) y"));
        assert!(SentenceMaskBuilder::new("(unclosed", SearchMode::Any).build().is_ok());
    }

    #[test]
    fn test_exact_strips_leading_smart_quote() {
        let m = mask("‘aina", SearchMode::Exact, false);
        assert!(m.is_match("ka aina"));
    }

    #[test]
    fn test_case_insensitive() {
        let m = mask("ALOHA", SearchMode::Any, false);
        assert_eq!(m.highlight("Aloha mai"), "<span class=\"match\">Aloha</span> mai");
    }

    #[test]
    fn test_highlight_preserves_text() {
        let m = mask("a", SearchMode::Any, true);
        let text = "ʻā a ‘a ā, hā";
        let highlighted = m.highlight(text);
        let stripped = highlighted.replace(MATCH_OPEN, "").replace(MATCH_CLOSE, "");
        assert_eq!(stripped, text);
    }

    #[test]
    fn test_empty_regex_matches_do_not_loop() {
        let m = mask("x*", SearchMode::Regex, false);
        assert_eq!(m.highlight("abc"), "abc");
        assert_eq!(m.highlight("axxb"), "a<span class=\"match\">xx</span>b");
    }
}
