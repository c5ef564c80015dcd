//! Markup stripping and lemmatization of query text.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use kb_core::{NormalizerConfig, Result};

use crate::lemma::{LemmaTable, Lemmatizer};

/// Cleaning passes, applied in order: (pattern, replacement).
const PASSES: &[(&str, &str)] = &[
    // fenced code blocks
    (r"```[\s\S]*?```", " "),
    // images
    (r"!\[[^\]]*\]\([^)]+\)", " "),
    // links keep their label
    (r"\[([^\]]+)\]\([^)]+\)", "${1}"),
    // heading markers
    (r"#+\s*", " "),
    // inline code keeps its content
    (r"`([^`]*)`", "${1}"),
    // emphasis
    (r"[*_]{1,3}", " "),
    // list prefixes
    (r"(?m)^\s*[-*+]\s*", " "),
    // quote prefixes
    (r"(?m)^\s*>\s*", " "),
    // table rows
    (r"\|.*\|", " "),
    // horizontal rules
    (r"[-*_]{3,}", " "),
    // braces and brackets
    (r"[{}\[\]]", " "),
    // html-like tags
    (r"<[^>]+>", " "),
];

static CLEANING: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PASSES
        .iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, *replacement)))
        .collect()
});

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

// Word tokens keep a trailing elision apostrophe (`l'`) or hyphenated
// parts; anything else that is not whitespace is a punctuation run.
static TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\w+(?:['’]|(?:-\w+)*)|[^\w\s]+").ok());

/// Remove markup, collapse whitespace and lowercase.
pub fn clean_markup(text: &str) -> String {
    let mut text = text.to_string();
    for (re, replacement) in CLEANING.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    let collapsed = match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(&text, " ").into_owned(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    };
    collapsed.trim().to_lowercase()
}

fn is_punctuation(token: &str) -> bool {
    !token.chars().any(|c| c.is_alphanumeric() || c == '_')
}

/// Prepares query text for the lexical signal.
///
/// Only the lexical adapter receives normalized text; the vector signal
/// embeds the raw query.
#[derive(Clone)]
pub struct Normalizer {
    lemmatizer: Arc<dyn Lemmatizer>,
}

impl Normalizer {
    /// Create a normalizer over any lemmatizer.
    pub fn new(lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        Self { lemmatizer }
    }

    /// Normalizer backed by the shared built-in French table.
    pub fn french() -> Self {
        Self::new(Arc::new(StaticTable(LemmaTable::builtin())))
    }

    /// Build from configuration, loading a custom table when one is named.
    pub fn from_config(config: &NormalizerConfig) -> Result<Self> {
        match &config.lemma_path {
            Some(path) => Ok(Self::new(Arc::new(LemmaTable::load(path)?))),
            None => Ok(Self::french()),
        }
    }

    /// Clean, lowercase and lemmatize `text`.
    pub fn normalize(&self, text: &str) -> String {
        let cleaned = clean_markup(text);
        let Some(token_re) = TOKEN.as_ref() else {
            return cleaned;
        };

        token_re
            .find_iter(&cleaned)
            .map(|m| m.as_str())
            .filter(|token| !is_punctuation(token))
            .map(|token| self.lemmatizer.lemmatize(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

/// Adapter sharing the `'static` built-in table without cloning it.
struct StaticTable(&'static LemmaTable);

impl Lemmatizer for StaticTable {
    fn lemmatize<'a>(&'a self, token: &'a str) -> &'a str {
        self.0.lemmatize(token)
    }
}
