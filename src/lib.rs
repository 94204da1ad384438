//! # IVX - Memory-Bounded Inverted Index
//!
//! IVX builds an inverted index over a JSONL corpus under a global memory
//! budget and answers ranked keyword queries against it, keeping
//! single-query latency low even when the index is far larger than RAM.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Indexing pipeline: in-memory accumulation, partial index
//!   files, worker pool, and the external k-way merge
//! - [`query`] - Query processing and TF-IDF / BM25 scoring
//! - [`utils`] - Tokenization shared by index and query time
//!
//! ## Quick Start
//!
//! ```ignore
//! use ivx::index::pipeline::build_index;
//! use ivx::index::types::IndexConfig;
//! use ivx::query::{Processor, Ranker};
//! use std::path::Path;
//!
//! // Build an index under a 512 MB budget.
//! let config = IndexConfig::new(512);
//! build_index(&config, Path::new("corpus.jsonl"), Path::new("idx")).unwrap();
//!
//! // Query it.
//! let mut processor = Processor::open(
//!     Path::new("idx/final_inverted_index.jsonl"),
//!     Ranker::Bm25,
//!     10,
//! )
//! .unwrap();
//! for hit in processor.search("christopher nolan movies").unwrap() {
//!     println!("{}\t{:.4}", hit.doc_id, hit.score);
//! }
//! ```
//!
//! ## Memory model
//!
//! N worker threads consume document batches from one bounded queue. Each
//! worker accumulates postings in memory and flushes a sorted partial
//! index file whenever its share of the budget (`memory_limit_mb / N`,
//! threshold 80%) fills up. A streaming k-way merge then consolidates all
//! partial files into the final index, lexicon, and document index, so no
//! phase ever holds more than the budget in memory.

pub mod index;
pub mod query;
pub mod utils;
