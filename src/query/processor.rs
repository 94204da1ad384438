use crate::index::types::{
    CorpusStats, DocEntry, DocId, IndexRecord, LexiconEntry, Posting, DOCUMENT_INDEX_FILE,
    LEXICON_FILE, STATS_FILE,
};
use crate::query::scorer::{Ranker, Scorer};
use crate::utils::Tokenizer;
use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Context, Result};
use lru::LruCache;
use memmap2::Mmap;
use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

/// Posting lists kept hot across the queries of one run.
const POSTINGS_CACHE_SIZE: usize = 1024;

/// A ranked query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f32,
}

/// Query engine over a finished index.
///
/// The lexicon, global statistics, and document index are loaded eagerly;
/// the final index file is memory-mapped and only the posting lists named
/// by a query are ever parsed. Retrieval is conjunctive: a document must
/// contain every query term.
pub struct Processor {
    tokenizer: Tokenizer,
    scorer: Scorer,
    top_k: usize,
    lexicon: AHashMap<String, LexiconEntry>,
    /// Document index entries, ascending by doc id (merge order).
    docs: Vec<DocEntry>,
    /// doc id -> position in `docs`. Ordinal order equals doc id order.
    ordinals: AHashMap<DocId, u32>,
    index_map: Option<Mmap>,
    postings_cache: LruCache<String, Arc<Vec<Posting>>>,
}

impl Processor {
    /// Open the index whose final index file is at `index_file`. The
    /// lexicon, document index, and stats are siblings in its directory.
    pub fn open(index_file: &Path, ranker: Ranker, top_k: usize) -> Result<Self> {
        let index_dir = index_file
            .parent()
            .with_context(|| format!("index file {} has no parent dir", index_file.display()))?;

        let stats_path = index_dir.join(STATS_FILE);
        let stats_file = File::open(&stats_path)
            .with_context(|| format!("failed to open {}", stats_path.display()))?;
        let stats: CorpusStats = serde_json::from_reader(BufReader::new(stats_file))
            .with_context(|| format!("malformed {}", stats_path.display()))?;

        let lexicon = load_lexicon(&index_dir.join(LEXICON_FILE))?;
        let docs = load_document_index(&index_dir.join(DOCUMENT_INDEX_FILE))?;

        let mut ordinals = AHashMap::with_capacity(docs.len());
        for (ordinal, entry) in docs.iter().enumerate() {
            ordinals.insert(entry.doc_id.clone(), ordinal as u32);
        }

        let file = File::open(index_file)
            .with_context(|| format!("failed to open index {}", index_file.display()))?;
        // Zero-length files cannot be mapped; an empty index never gets a
        // posting fetch anyway because its lexicon is empty.
        let index_map = if file.metadata()?.len() == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            tokenizer: Tokenizer::new(),
            scorer: Scorer::new(ranker, stats.num_documents, stats.avg_doc_length),
            top_k,
            lexicon,
            docs,
            ordinals,
            index_map,
            postings_cache: LruCache::new(
                NonZeroUsize::new(POSTINGS_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ),
        })
    }

    /// Process every non-empty line of `queries_path`, printing ranked
    /// results for each.
    pub fn run_queries(&mut self, queries_path: &Path) -> Result<()> {
        let file = File::open(queries_path)
            .with_context(|| format!("failed to open queries {}", queries_path.display()))?;

        for line in BufReader::new(file).lines() {
            let query = line?;
            let query = query.trim();
            if query.is_empty() {
                continue;
            }

            let hits = self.search(query)?;
            println!("Query: {}", query);
            if hits.is_empty() {
                println!("  (no matches)");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!("  {}. {}  {:.4}", rank + 1, hit.doc_id, hit.score);
            }
            println!();
        }

        Ok(())
    }

    /// Answer one query: tokenize, fetch the postings of each unique
    /// term, intersect candidates, score, and keep the top k.
    pub fn search(&mut self, query: &str) -> Result<Vec<Hit>> {
        let terms = self.unique_terms(query);
        if terms.is_empty() || self.docs.is_empty() {
            return Ok(Vec::new());
        }

        // Conjunctive retrieval: one out-of-vocabulary term empties the
        // candidate set.
        let mut lists: Vec<(String, u64, Arc<Vec<Posting>>)> = Vec::with_capacity(terms.len());
        for term in terms {
            let Some(entry) = self.lexicon.get(&term).cloned() else {
                return Ok(Vec::new());
            };
            let postings = self.fetch_postings(&term, &entry)?;
            lists.push((term, entry.df, postings));
        }

        let mut candidates: Option<RoaringBitmap> = None;
        for (_, _, postings) in &lists {
            let mut matched = RoaringBitmap::new();
            for posting in postings.iter() {
                if let Some(&ordinal) = self.ordinals.get(posting.doc()) {
                    matched.insert(ordinal);
                }
            }
            let next = match candidates.take() {
                Some(acc) => acc & matched,
                None => matched,
            };
            if next.is_empty() {
                return Ok(Vec::new());
            }
            candidates = Some(next);
        }
        let candidates = candidates.unwrap_or_default();

        let mut scores: AHashMap<u32, f32> = AHashMap::with_capacity(candidates.len() as usize);
        for (term, df, postings) in &lists {
            for posting in postings.iter() {
                let Some(&ordinal) = self.ordinals.get(posting.doc()) else {
                    continue;
                };
                if !candidates.contains(ordinal) {
                    continue;
                }
                let doc_len = self.docs[ordinal as usize].tokens;
                *scores.entry(ordinal).or_insert(0.0) +=
                    self.scorer.contribution(term, *df, posting.tf(), doc_len);
            }
        }

        Ok(self.top_k_hits(scores))
    }

    fn unique_terms(&self, query: &str) -> Vec<String> {
        let mut seen = AHashSet::new();
        self.tokenizer
            .tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    fn fetch_postings(&mut self, term: &str, entry: &LexiconEntry) -> Result<Arc<Vec<Posting>>> {
        if let Some(postings) = self.postings_cache.get(term) {
            return Ok(postings.clone());
        }

        let Some(map) = &self.index_map else {
            bail!("lexicon names {:?} but the index file is empty", term);
        };
        let offset = entry.offset as usize;
        if offset >= map.len() {
            bail!("lexicon offset {} for {:?} is past end of index", offset, term);
        }

        let rest = &map[offset..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(rest.len());
        let record: IndexRecord = serde_json::from_slice(&rest[..end])
            .with_context(|| format!("malformed index record at offset {}", offset))?;
        if record.term != term {
            bail!(
                "lexicon offset for {:?} points at record for {:?}",
                term,
                record.term
            );
        }

        let postings = Arc::new(record.postings);
        self.postings_cache.put(term.to_string(), postings.clone());
        Ok(postings)
    }

    /// Keep the k best candidates in a bounded min-heap, then emit in
    /// descending score order, ties broken by ascending doc id. Ordinals
    /// follow document-index order, so ordinal order is doc id order.
    fn top_k_hits(&self, scores: AHashMap<u32, f32>) -> Vec<Hit> {
        let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, Reverse<u32>)>> =
            BinaryHeap::with_capacity(self.top_k + 1);

        for (ordinal, score) in scores {
            heap.push(Reverse((OrderedFloat(score), Reverse(ordinal))));
            if heap.len() > self.top_k {
                heap.pop();
            }
        }

        let mut ranked: Vec<(OrderedFloat<f32>, u32)> = heap
            .into_iter()
            .map(|Reverse((score, Reverse(ordinal)))| (score, ordinal))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        ranked
            .into_iter()
            .map(|(score, ordinal)| Hit {
                doc_id: self.docs[ordinal as usize].doc_id.clone(),
                score: score.0,
            })
            .collect()
    }
}

fn load_lexicon(path: &Path) -> Result<AHashMap<String, LexiconEntry>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut lexicon = AHashMap::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let entry: LexiconEntry = serde_json::from_str(&line)
            .with_context(|| format!("malformed lexicon entry in {}", path.display()))?;
        lexicon.insert(entry.term.clone(), entry);
    }

    Ok(lexicon)
}

fn load_document_index(path: &Path) -> Result<Vec<DocEntry>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut docs = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let entry: DocEntry = serde_json::from_str(&line)
            .with_context(|| format!("malformed document index entry in {}", path.display()))?;
        docs.push(entry);
    }

    Ok(docs)
}
