use crate::index::types::{DocId, Posting, Tf};
use ahash::AHashMap;

/// Approximate heap cost of one posting entry (map slot share, term key
/// share, posting pair). Calibrated for this runtime; the flush threshold
/// only needs to bound true usage from above, not match it.
pub const POSTING_ENTRY_COST: usize = 112;

/// Fraction of the per-worker budget at which a flush is forced.
pub const FLUSH_THRESHOLD: f64 = 0.8;

/// Accumulates postings for the documents assigned to one worker while
/// bounding memory by entry count.
///
/// Posting lists are kept in arrival order and sorted on drain; each
/// document contributes at most one posting per term.
#[derive(Default)]
pub struct InMemoryIndex {
    postings: AHashMap<String, Vec<Posting>>,
    entry_count: usize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tokenized document. Scans `terms` once, aggregating the
    /// per-document frequency of each distinct term.
    pub fn add_document(&mut self, doc_id: &DocId, terms: &[String]) {
        let mut counts: AHashMap<&str, Tf> = AHashMap::with_capacity(terms.len());
        for term in terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }

        for (term, tf) in counts {
            let posting = Posting(doc_id.clone(), tf);
            match self.postings.get_mut(term) {
                Some(list) => list.push(posting),
                None => {
                    self.postings.insert(term.to_owned(), vec![posting]);
                }
            }
            self.entry_count += 1;
        }
    }

    /// Approximate resident bytes, dominated by the posting entry count.
    pub fn memory_estimate(&self) -> usize {
        self.entry_count * POSTING_ENTRY_COST
    }

    /// True once the estimate reaches 80% of the worker's budget.
    pub fn should_flush(&self, budget_bytes: usize) -> bool {
        self.memory_estimate() as f64 >= FLUSH_THRESHOLD * budget_bytes as f64
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Drain the accumulator into `(term, postings)` records with terms in
    /// ascending lexicographic order and each posting list sorted by doc
    /// id. The accumulator is empty afterwards.
    pub fn drain_sorted(&mut self) -> Vec<(String, Vec<Posting>)> {
        self.entry_count = 0;
        let mut records: Vec<(String, Vec<Posting>)> =
            std::mem::take(&mut self.postings).into_iter().collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, postings) in &mut records {
            postings.sort_by(|a, b| a.0.cmp(&b.0));
        }
        records
    }
}
