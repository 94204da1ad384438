use crate::index::memory::InMemoryIndex;
use crate::index::partial::PartialIndexWriter;
use crate::index::types::{doc_index_shard_path, tmp_path, CorpusDoc, DocEntry};
use crate::utils::Tokenizer;
use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Unit of work handed to a worker. The reader pushes one `Shutdown`
/// sentinel per worker after the last batch.
pub enum WorkItem {
    Batch(Vec<CorpusDoc>),
    Shutdown,
}

/// Counters and output paths a worker hands back to the orchestrator on
/// exit. Global statistics are folded from these summaries; workers keep
/// no ambient shared state.
pub struct WorkerSummary {
    pub worker_id: usize,
    pub docs_seen: u64,
    pub tokens_seen: u64,
    pub partial_files: Vec<PathBuf>,
    pub doc_index_shard: PathBuf,
}

/// Worker loop: dequeue batches, tokenize, accumulate postings, flush to
/// partial files when the accumulator nears its budget, and record one
/// document-index entry per document in this worker's shard.
///
/// Returns after receiving `Shutdown` or once the queue's senders are
/// gone, flushing whatever remains in memory either way.
pub fn run_worker(
    worker_id: usize,
    index_dir: &Path,
    budget_bytes: usize,
    work: Receiver<WorkItem>,
) -> Result<WorkerSummary> {
    let tokenizer = Tokenizer::new();
    let mut index = InMemoryIndex::new();
    let mut writer = PartialIndexWriter::new(index_dir, worker_id);

    let shard_path = doc_index_shard_path(index_dir, worker_id);
    let shard_tmp = tmp_path(&shard_path);
    let shard_file = File::create(&shard_tmp)
        .with_context(|| format!("failed to create shard {}", shard_tmp.display()))?;
    let mut shard = BufWriter::new(shard_file);

    let mut partial_files = Vec::new();
    let mut docs_seen = 0u64;
    let mut tokens_seen = 0u64;

    while let Ok(item) = work.recv() {
        let batch = match item {
            WorkItem::Batch(batch) => batch,
            WorkItem::Shutdown => break,
        };

        for doc in batch {
            let chars = doc.text.chars().count() as u64;
            let terms = tokenizer.tokenize(&doc.text);
            docs_seen += 1;
            tokens_seen += terms.len() as u64;

            serde_json::to_writer(
                &mut shard,
                &DocEntry {
                    doc_id: doc.id.clone(),
                    tokens: terms.len() as u64,
                    chars,
                },
            )?;
            shard.write_all(b"\n")?;

            index.add_document(&doc.id, &terms);

            if index.should_flush(budget_bytes) {
                eprintln!(
                    "worker {}: memory threshold reached (~{} KB), flushing",
                    worker_id,
                    index.memory_estimate() / 1024
                );
                partial_files.push(writer.write(index.drain_sorted())?);
                if index.memory_estimate() != 0 {
                    bail!("worker {}: accumulator not empty after flush", worker_id);
                }
            }
        }
    }

    if !index.is_empty() {
        partial_files.push(writer.write(index.drain_sorted())?);
    }

    shard.flush()?;
    fs::rename(&shard_tmp, &shard_path)
        .with_context(|| format!("failed to commit shard {}", shard_path.display()))?;

    Ok(WorkerSummary {
        worker_id,
        docs_seen,
        tokens_seen,
        partial_files,
        doc_index_shard: shard_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::POSTING_ENTRY_COST;
    use crate::index::types::DocId;
    use crossbeam_channel::bounded;
    use std::io::BufRead;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ivx_worker_tests")
            .join(format!("{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn batch(docs: &[(&str, &str)]) -> WorkItem {
        WorkItem::Batch(
            docs.iter()
                .map(|(id, text)| CorpusDoc {
                    id: DocId::Text(id.to_string()),
                    text: text.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn flushes_remainder_on_shutdown() {
        let dir = scratch_dir("shutdown");
        let (tx, rx) = bounded(4);
        tx.send(batch(&[("d1", "alpha beta alpha")])).unwrap();
        tx.send(WorkItem::Shutdown).unwrap();

        let summary = run_worker(0, &dir, 1024 * 1024, rx).unwrap();
        assert_eq!(summary.docs_seen, 1);
        assert_eq!(summary.tokens_seen, 3);
        assert_eq!(summary.partial_files.len(), 1);
        assert!(summary.doc_index_shard.exists());
    }

    #[test]
    fn tiny_budget_forces_multiple_partials() {
        let dir = scratch_dir("tiny_budget");
        let (tx, rx) = bounded(4);
        // Budget for ~2 entries: every document overflows the threshold.
        let budget = 2 * POSTING_ENTRY_COST;

        tx.send(batch(&[
            ("d1", "alpha beta gamma"),
            ("d2", "delta epsilon zeta"),
        ]))
        .unwrap();
        tx.send(WorkItem::Shutdown).unwrap();

        let summary = run_worker(0, &dir, budget, rx).unwrap();
        assert!(
            summary.partial_files.len() >= 2,
            "expected several flushes, got {}",
            summary.partial_files.len()
        );
    }

    #[test]
    fn shard_records_token_and_char_counts() {
        let dir = scratch_dir("shard");
        let (tx, rx) = bounded(4);
        tx.send(batch(&[("d1", "alpha beta")])).unwrap();
        tx.send(WorkItem::Shutdown).unwrap();

        let summary = run_worker(0, &dir, 1024 * 1024, rx).unwrap();
        let shard = fs::File::open(&summary.doc_index_shard).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(shard)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 1);

        let entry: DocEntry = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(entry.doc_id, DocId::Text("d1".to_string()));
        assert_eq!(entry.tokens, 2);
        assert_eq!(entry.chars, 10);
    }

    #[test]
    fn exits_when_senders_are_dropped() {
        let dir = scratch_dir("disconnect");
        let (tx, rx) = bounded::<WorkItem>(4);
        drop(tx);

        let summary = run_worker(0, &dir, 1024 * 1024, rx).unwrap();
        assert_eq!(summary.docs_seen, 0);
        assert!(summary.partial_files.is_empty());
    }
}
