//! Normal-form reduction for entity spans
//!
//! Covers the inflections that show up in certificates and statements:
//! oblique cases of Slavic-pattern surnames ("Иванову" -> "Иванов"), dative
//! and instrumental given names and patronymics ("Сергею" -> "Сергей") and
//! title-casing of words. Anything not covered is returned as written.

/// Suffix rewrites, longest first so "овым" is tried before "ову"
const SURNAME_RULES: &[(&str, &str)] = &[
    ("ского", "ский"),
    ("скому", "ский"),
    ("ским", "ский"),
    ("овым", "ов"),
    ("евым", "ев"),
    ("ёвым", "ёв"),
    ("иным", "ин"),
    ("овой", "ова"),
    ("евой", "ева"),
    ("иной", "ина"),
    ("ской", "ская"),
    ("ову", "ов"),
    ("еву", "ев"),
    ("ёву", "ёв"),
    ("ове", "ов"),
    ("еве", "ев"),
];

/// Given names and patronymics, tried when no surname rule matched
const GIVEN_NAME_RULES: &[(&str, &str)] = &[
    ("ичем", "ич"),
    ("вной", "вна"),
    ("вне", "вна"),
    ("еем", "ей"),
    ("ием", "ий"),
    ("ею", "ей"),
    ("ию", "ий"),
];

/// Case endings dropped from names with a consonant stem ("Ивану", "Нурланом")
const CONSONANT_STEM_ENDINGS: &[&str] = &["ом", "у"];

/// Minimum stem length (in chars) left after stripping a suffix
const MIN_STEM: usize = 3;
const MIN_GIVEN_STEM: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct Lemmatizer;

impl Lemmatizer {
    pub fn new() -> Self {
        Self
    }

    /// Reduce a single name token to its nominative form
    pub fn name_token(&self, token: &str) -> String {
        let word = title_case(token);

        for (suffix, replacement) in SURNAME_RULES {
            if let Some(stem) = word.strip_suffix(suffix) {
                if stem.chars().count() >= MIN_STEM {
                    return format!("{stem}{replacement}");
                }
            }
        }

        for (suffix, replacement) in GIVEN_NAME_RULES {
            if let Some(stem) = word.strip_suffix(suffix) {
                if stem.chars().count() >= MIN_GIVEN_STEM {
                    return format!("{stem}{replacement}");
                }
            }
        }

        for suffix in CONSONANT_STEM_ENDINGS {
            if let Some(stem) = word.strip_suffix(suffix) {
                if stem.chars().count() >= MIN_GIVEN_STEM
                    && stem.chars().last().is_some_and(is_consonant)
                {
                    return stem.to_string();
                }
            }
        }

        word
    }

    /// Normalize a multi-word person name token by token
    pub fn person(&self, span: &str) -> String {
        span.split_whitespace()
            .map(|t| self.name_token(t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Collapse whitespace and unify quotes: `ТОО "Ромашка"` -> `ТОО «Ромашка»`
    pub fn organization(&self, span: &str) -> String {
        let collapsed = span.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut out = String::with_capacity(collapsed.len() + 4);
        let mut open = true;

        for c in collapsed.chars() {
            let quote = match c {
                '"' | '“' | '”' | '„' => Some(open),
                '«' => Some(true),
                '»' => Some(false),
                _ => None,
            };

            match quote {
                Some(true) => {
                    if !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                    out.push('«');
                    open = false;
                }
                Some(false) => {
                    out.push('»');
                    open = true;
                }
                None => out.push(c),
            }
        }

        out
    }
}

fn is_consonant(c: char) -> bool {
    c.is_alphabetic() && !"аеёиоуыэюяйьъaeiouy".contains(c.to_lowercase().next().unwrap_or(c))
}

/// Upper-case the first char, lower-case the rest
pub fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
