//! Deterministic tokenization (C1): lowercase, strip non-alphanumeric,
//! split on whitespace, drop stopwords, stem.
//!
//! Grounded on `preprocess.py`'s pipeline: the character class kept by step
//! 2 (`[a-z0-9áéíóúñü]`) is preserved exactly so accented Spanish text keeps
//! its diacritics through normalization, matching the donor corpus's
//! default language.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

/// Language used for stopword removal and stemming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Spanish,
    English,
}

impl Language {
    fn stemmer_algorithm(self) -> Algorithm {
        match self {
            Language::Spanish => Algorithm::Spanish,
            Language::English => Algorithm::English,
        }
    }

    fn stop_words_language(self) -> stop_words::LANGUAGE {
        match self {
            Language::Spanish => stop_words::LANGUAGE::Spanish,
            Language::English => stop_words::LANGUAGE::English,
        }
    }

    /// Parse a language tag as accepted by the CLI (`es`, `en`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "es" | "spanish" => Some(Language::Spanish),
            "en" | "english" => Some(Language::English),
            _ => None,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Spanish
    }
}

/// Configuration for [`Normalizer`].
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    pub language: Language,
    /// Overrides the default stopword list for `language` when set.
    pub stopwords: Option<Vec<String>>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            stopwords: None,
        }
    }
}

/// Stateless, thread-safe text normalizer (C1).
///
/// Construction resolves the stopword set and stemmer once; `normalize` is
/// then a pure function of its input string.
pub struct Normalizer {
    stopwords: HashSet<String>,
    stemmer: Stemmer,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        let stopwords = match config.stopwords {
            Some(words) => words.into_iter().collect(),
            None => stop_words::get(config.language.stop_words_language())
                .into_iter()
                .collect(),
        };
        Self {
            stopwords,
            stemmer: Stemmer::create(config.language.stemmer_algorithm()),
        }
    }

    /// Run the full C1 pipeline over one UTF-8 string.
    ///
    /// Deterministic and stateless per call: empty input yields an empty
    /// sequence, and repeated calls with the same input always agree.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let spaced = replace_non_alphanumeric(&lowered);
        spaced
            .split_whitespace()
            .filter(|tok| !tok.is_empty() && !self.stopwords.contains(*tok))
            .map(|tok| self.stemmer.stem(tok).into_owned())
            .collect()
    }
}

/// Replace every maximal run of characters outside
/// `[a-z 0-9 á é í ó ú ñ ü]` with a single space.
fn replace_non_alphanumeric(lowered: &str) -> String {
    const EXTRA: [char; 6] = ['á', 'é', 'í', 'ó', 'ú', 'ñ'];
    let mut out = String::with_capacity(lowered.len());
    let mut in_run = false;
    for c in lowered.chars() {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || EXTRA.contains(&c) || c == 'ü';
        if keep {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_sequence() {
        let n = Normalizer::new(NormalizeConfig::default());
        assert!(n.normalize("").is_empty());
    }

    #[test]
    fn strips_punctuation_and_lowercases() {
        let n = Normalizer::new(NormalizeConfig {
            language: Language::English,
            stopwords: Some(vec![]),
        });
        let tokens = n.normalize("Hello, World!!");
        assert_eq!(tokens, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn drops_configured_stopwords() {
        let n = Normalizer::new(NormalizeConfig {
            language: Language::English,
            stopwords: Some(vec!["the".to_string()]),
        });
        let tokens = n.normalize("the quick brown fox");
        assert!(!tokens.contains(&"the".to_string()));
    }

    #[test]
    fn keeps_spanish_diacritics_through_normalization() {
        let n = Normalizer::new(NormalizeConfig {
            language: Language::Spanish,
            stopwords: Some(vec![]),
        });
        let tokens = n.normalize("canci\u{f3}n");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn is_deterministic() {
        let n = Normalizer::new(NormalizeConfig {
            language: Language::English,
            stopwords: Some(vec![]),
        });
        let a = n.normalize("Quick Brown Foxes");
        let b = n.normalize("Quick Brown Foxes");
        assert_eq!(a, b);
    }
}
