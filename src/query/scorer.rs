use crate::index::types::Tf;
use ahash::AHashMap;
use clap::ValueEnum;

/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f32 = 1.5;
/// BM25 document-length normalization parameter.
pub const BM25_B: f32 = 0.75;

/// Ranking function selected on the query command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ranker {
    Bm25,
    Tfidf,
}

/// Computes per-term score contributions for one ranker over one index.
///
/// IDF is memoized per term for the scorer's lifetime; a scorer is built
/// with a fixed ranker, so the cache key is effectively `(term, ranker)`.
pub struct Scorer {
    ranker: Ranker,
    num_documents: u64,
    avg_doc_length: f64,
    idf_cache: AHashMap<String, f32>,
}

impl Scorer {
    pub fn new(ranker: Ranker, num_documents: u64, avg_doc_length: f64) -> Self {
        Self {
            ranker,
            num_documents,
            avg_doc_length,
            idf_cache: AHashMap::new(),
        }
    }

    /// Contribution of one query term to one candidate document's score.
    /// `df` comes from the lexicon, `tf` from the term's posting for the
    /// document, `doc_len` from the document index.
    pub fn contribution(&mut self, term: &str, df: u64, tf: Tf, doc_len: u64) -> f32 {
        let idf = self.idf(term, df);
        let tf = tf as f32;

        match self.ranker {
            Ranker::Tfidf => (1.0 + tf.ln()) * idf,
            Ranker::Bm25 => {
                let dl = doc_len as f32;
                let avgdl = self.avg_doc_length as f32;
                let tf_norm = (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
                idf * tf_norm
            }
        }
    }

    fn idf(&mut self, term: &str, df: u64) -> f32 {
        if let Some(&cached) = self.idf_cache.get(term) {
            return cached;
        }

        let n = self.num_documents as f32;
        let df = df as f32;
        let idf = match self.ranker {
            Ranker::Tfidf => (n / df).ln(),
            // Plus-1 Okapi variant: strictly positive for every df <= N.
            Ranker::Bm25 => ((n - df + 0.5) / (df + 0.5) + 1.0).ln(),
        };

        self.idf_cache.insert(term.to_string(), idf);
        idf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tfidf_matches_formula() {
        let mut scorer = Scorer::new(Ranker::Tfidf, 100, 10.0);
        // idf = ln(100/10), contribution = (1 + ln(4)) * idf
        let expected = (1.0 + 4.0f32.ln()) * 10.0f32.ln();
        let got = scorer.contribution("alpha", 10, 4, 7);
        assert!((got - expected).abs() < 1e-6);
    }

    #[test]
    fn tfidf_single_occurrence_is_pure_idf() {
        let mut scorer = Scorer::new(Ranker::Tfidf, 100, 10.0);
        let got = scorer.contribution("alpha", 10, 1, 7);
        assert!((got - 10.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn bm25_matches_formula() {
        let mut scorer = Scorer::new(Ranker::Bm25, 100, 10.0);
        let idf = ((100.0f32 - 10.0 + 0.5) / (10.0 + 0.5) + 1.0).ln();
        let tf = 4.0f32;
        let tf_norm =
            (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * 20.0 / 10.0));
        let got = scorer.contribution("alpha", 10, 4, 20);
        assert!((got - idf * tf_norm).abs() < 1e-6);
    }

    #[test]
    fn bm25_idf_is_positive_even_for_ubiquitous_terms() {
        let mut scorer = Scorer::new(Ranker::Bm25, 100, 10.0);
        let got = scorer.contribution("common", 100, 1, 10);
        assert!(got > 0.0);
    }

    #[test]
    fn bm25_penalizes_longer_documents() {
        let mut scorer = Scorer::new(Ranker::Bm25, 100, 10.0);
        let short = scorer.contribution("alpha", 10, 2, 5);
        let long = scorer.contribution("alpha", 10, 2, 50);
        assert!(short > long);
    }

    #[test]
    fn rarer_terms_score_higher() {
        let mut scorer = Scorer::new(Ranker::Bm25, 1000, 10.0);
        let rare = scorer.contribution("rare", 2, 1, 10);
        let common = scorer.contribution("common", 500, 1, 10);
        assert!(rare > common);
    }

    #[test]
    fn idf_is_cached_per_term() {
        let mut scorer = Scorer::new(Ranker::Tfidf, 100, 10.0);
        let first = scorer.contribution("alpha", 10, 1, 10);
        // A different df for the same term must hit the cache, not recompute.
        let second = scorer.contribution("alpha", 50, 1, 10);
        assert_eq!(first, second);
    }
}
