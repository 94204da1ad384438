use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Term frequency within a single document.
pub type Tf = u32;

pub const ONE_MB: usize = 1024 * 1024;

/// Final output file names under the index directory.
pub const FINAL_INDEX_FILE: &str = "final_inverted_index.jsonl";
pub const LEXICON_FILE: &str = "lexicon.jsonl";
pub const DOCUMENT_INDEX_FILE: &str = "document_index.jsonl";
pub const STATS_FILE: &str = "stats.json";

/// Document identifier, preserved verbatim from the corpus record.
///
/// Corpus ids may be JSON numbers or strings; both round-trip unchanged
/// through the index files. Ordering is total and deterministic: numbers
/// sort before text, numbers numerically, text bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    Number(u64),
    Text(String),
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Number(n) => write!(f, "{}", n),
            DocId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Occurrence of a term in one document, serialized as `[doc_id, tf]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting(pub DocId, pub Tf);

impl Posting {
    pub fn doc(&self) -> &DocId {
        &self.0
    }

    pub fn tf(&self) -> Tf {
        self.1
    }
}

/// One record of the corpus file. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusDoc {
    pub id: DocId,
    pub text: String,
}

/// One line of `final_inverted_index.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub term: String,
    pub postings: Vec<Posting>,
}

/// One line of `lexicon.jsonl`. `offset` is the byte position of the
/// term's record in the final index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub term: String,
    pub df: u64,
    pub cf: u64,
    pub offset: u64,
}

/// One line of `document_index.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub doc_id: DocId,
    pub tokens: u64,
    pub chars: u64,
}

/// Contents of `stats.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStats {
    pub num_documents: u64,
    pub num_tokens: u64,
    pub avg_doc_length: f64,
}

/// Configuration for an indexing run.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Global memory budget for all in-memory posting accumulators, in MB.
    pub memory_limit_mb: u64,
    /// Number of worker threads.
    pub num_workers: usize,
    /// Documents per batch pushed onto the work queue.
    pub batch_size: usize,
    /// Bound of the work queue, in batches.
    pub queue_capacity: usize,
}

impl IndexConfig {
    pub fn new(memory_limit_mb: u64) -> Self {
        let num_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);

        Self {
            memory_limit_mb,
            num_workers,
            batch_size: 1000,
            queue_capacity: 8,
        }
    }

    /// The budget each worker's posting accumulator must stay under.
    pub fn worker_budget_bytes(&self) -> usize {
        (self.memory_limit_mb as usize * ONE_MB) / self.num_workers.max(1)
    }
}

/// Path of a worker's partial index file for a given flush.
pub fn partial_index_path(index_dir: &Path, worker_id: usize, seq: usize) -> PathBuf {
    index_dir.join(format!("partial_index_{}_{}.jsonl", worker_id, seq))
}

/// Path of a worker's document-index shard.
pub fn doc_index_shard_path(index_dir: &Path, worker_id: usize) -> PathBuf {
    index_dir.join(format!("document_index_{}.jsonl", worker_id))
}

/// Sibling `.tmp` path used by the write-then-rename pattern.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
