//! Hawaiian diacritic normalization / 夏威夷语变音符号归一化
//!
//! Maps the five macroned vowels (both cases) to their base letters and drops
//! the ʻokina along with its curly-quote look-alike. The table is fixed; there
//! is no locale dependence.

/// ʻokina (U+02BB MODIFIER LETTER TURNED COMMA)
pub const OKINA: char = '\u{02BB}';

/// Left single quotation mark, commonly typed in place of the ʻokina
pub const OKINA_LOOKALIKE: char = '\u{2018}';

/// Substitution table: (source, replacement). `None` means the char is removed.
const FOLD_TABLE: [(char, Option<char>); 12] = [
    ('ō', Some('o')),
    ('ī', Some('i')),
    ('ē', Some('e')),
    ('ū', Some('u')),
    ('ā', Some('a')),
    ('Ō', Some('O')),
    ('Ī', Some('I')),
    ('Ē', Some('E')),
    ('Ū', Some('U')),
    ('Ā', Some('A')),
    (OKINA_LOOKALIKE, None),
    (OKINA, None),
];

/// Fold a single char / 折叠单个字符
///
/// Returns `None` for the ʻokina variants, the base letter for macroned vowels,
/// and the char itself otherwise.
#[inline]
pub fn fold_char(c: char) -> Option<char> {
    for (from, to) in FOLD_TABLE.iter() {
        if *from == c {
            return *to;
        }
    }
    Some(c)
}

/// Normalize text for diacritic-insensitive matching / 归一化文本
///
/// Idempotent: `normalize(&normalize(t)) == normalize(t)`.
pub fn normalize(text: &str) -> String {
    text.chars().filter_map(fold_char).collect()
}

/// Both ʻokina codepoints
#[inline]
pub fn is_okina(c: char) -> bool {
    c == OKINA || c == OKINA_LOOKALIKE
}

/// Letters, marks, digits, underscore and both ʻokina forms count as word chars.
///
/// Most regex engines treat U+2018 as punctuation, which splits words like
/// `‘ike` in the wrong place.
#[inline]
pub fn is_hawaiian_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_okina(c)
}

/// Plain base vowel for a (possibly macroned) vowel, lowercased
pub fn base_vowel(c: char) -> Option<char> {
    match fold_char(c)?.to_ascii_lowercase() {
        v @ ('a' | 'e' | 'i' | 'o' | 'u') => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_macrons() {
        assert_eq!(normalize("hālau"), "halau");
        assert_eq!(normalize("ĀĒĪŌŪ āēīōū"), "AEIOU aeiou");
    }

    #[test]
    fn test_normalize_okina_variants() {
        assert_eq!(normalize("hoʻokipa"), "hookipa");
        assert_eq!(normalize("‘ike"), "ike");
        assert_eq!(normalize("Hawaiʻi"), "Hawaii");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "",
            "aloha",
            "ʻŌlelo Hawaiʻi",
            "‘ĀINA ‘ike",
            "Ka ʻōlelo o ka ʻāina, he mea nui.",
            "mixed ASCII and ā ē ī ō ū",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_other_chars_untouched() {
        assert_eq!(normalize("café 123 'x'"), "café 123 'x'");
    }

    #[test]
    fn test_word_chars() {
        assert!(is_hawaiian_word_char(OKINA));
        assert!(is_hawaiian_word_char(OKINA_LOOKALIKE));
        assert!(is_hawaiian_word_char('ā'));
        assert!(!is_hawaiian_word_char(' '));
        assert!(!is_hawaiian_word_char(','));
    }

    #[test]
    fn test_base_vowel() {
        assert_eq!(base_vowel('Ā'), Some('a'));
        assert_eq!(base_vowel('o'), Some('o'));
        assert_eq!(base_vowel('k'), None);
        assert_eq!(base_vowel(OKINA), None);
    }
}
