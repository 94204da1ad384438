use ahash::AHashSet;
use rust_stemmers::{Algorithm, Stemmer};

/// Text-to-term transformation used identically at index and query time.
///
/// A term is an alphanumeric run of more than two characters, lowercased,
/// not an English stopword, reduced with the Snowball English stemmer.
/// Output order follows input order; duplicates are preserved so callers
/// can count frequencies.
pub struct Tokenizer {
    stemmer: Stemmer,
    stop_words: AHashSet<String>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words: stop_words::get(stop_words::LANGUAGE::English)
                .into_iter()
                .collect(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut terms = Vec::new();

        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.chars().count() <= 2 {
                continue;
            }
            let lower = word.to_lowercase();
            if self.stop_words.contains(&lower) {
                continue;
            }
            terms.push(self.stemmer.stem(&lower).into_owned());
        }

        terms
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}
