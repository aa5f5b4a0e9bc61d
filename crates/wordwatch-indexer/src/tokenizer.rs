//! Tokenizers turning file content into a set of words.

use crate::config::TokenizerKind;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// Splits content into the set of distinct words it contains.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, content: &str) -> HashSet<String>;
}

/// Build the tokenizer selected in configuration.
pub fn from_kind(kind: TokenizerKind) -> Arc<dyn Tokenizer> {
    match kind {
        TokenizerKind::Delimiter => Arc::new(DelimiterTokenizer::default()),
        TokenizerKind::Regex => Arc::new(RegexTokenizer),
    }
}

/// Splits on a fixed set of delimiter characters.
#[derive(Debug, Clone, Default)]
pub struct DelimiterTokenizer {
    /// `None` means any Unicode whitespace
    delimiters: Option<Vec<char>>,
}

impl DelimiterTokenizer {
    /// Split on the given characters only. Newlines are always delimiters.
    pub fn with_delimiters(delimiters: &[char]) -> Self {
        let mut delimiters = delimiters.to_vec();
        if !delimiters.contains(&'\n') {
            delimiters.push('\n');
        }
        Self {
            delimiters: Some(delimiters),
        }
    }

    fn is_delimiter(&self, c: char) -> bool {
        match &self.delimiters {
            Some(delimiters) => delimiters.contains(&c),
            None => c.is_whitespace(),
        }
    }
}

impl Tokenizer for DelimiterTokenizer {
    fn tokenize(&self, content: &str) -> HashSet<String> {
        content
            .split(|c| self.is_delimiter(c))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }
}

static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{L}[\p{L}\p{M}\p{Nd}_]*(?:[\p{Mn}']\p{L}+[\p{L}\p{M}\p{Nd}_]*)?\b")
        .expect("word pattern is valid")
});

/// Extracts Unicode words: a letter followed by letters, marks, digits or
/// underscores, optionally joined by one apostrophe (`don't`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTokenizer;

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, content: &str) -> HashSet<String> {
        WORD_PATTERN
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
