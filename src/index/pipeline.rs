use crate::index::merge::{merge_index, remove_merge_inputs, MergeReport};
use crate::index::types::{tmp_path, CorpusDoc, CorpusStats, IndexConfig, ONE_MB, STATS_FILE};
use crate::index::worker::{run_worker, WorkItem, WorkerSummary};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Sender};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

/// Outcome of a full indexing run.
pub struct IndexSummary {
    pub num_documents: u64,
    pub num_tokens: u64,
    pub num_terms: u64,
    pub num_postings: u64,
    pub skipped_records: u64,
}

struct ReaderReport {
    enqueued: u64,
    skipped: u64,
}

/// Build the index: spawn the worker pool, stream the corpus through the
/// bounded queue, merge the resulting partial files, and write the global
/// statistics. All outputs land under `index_dir`.
pub fn build_index(
    config: &IndexConfig,
    corpus_path: &Path,
    index_dir: &Path,
) -> Result<IndexSummary> {
    fs::create_dir_all(index_dir)
        .with_context(|| format!("failed to create index dir {}", index_dir.display()))?;

    let budget = config.worker_budget_bytes();
    println!("Indexing: {}", corpus_path.display());
    println!(
        "Workers: {} ({} MB budget each, flush at 80%)",
        config.num_workers,
        budget / ONE_MB
    );

    let (tx, rx) = bounded::<WorkItem>(config.queue_capacity);

    let mut handles = Vec::with_capacity(config.num_workers);
    for worker_id in 0..config.num_workers {
        let rx = rx.clone();
        let dir = index_dir.to_path_buf();
        let handle = thread::Builder::new()
            .name(format!("ivx-worker-{}", worker_id))
            .spawn(move || run_worker(worker_id, &dir, budget, rx))
            .context("failed to spawn worker thread")?;
        handles.push(handle);
    }
    drop(rx);

    let fed = stream_documents(corpus_path, &tx, config.batch_size);

    // Workers always get their sentinels, even when the reader failed, so
    // they drain in-flight batches, flush, and exit.
    for _ in 0..config.num_workers {
        let _ = tx.send(WorkItem::Shutdown);
    }
    drop(tx);

    let mut summaries: Vec<WorkerSummary> = Vec::with_capacity(handles.len());
    let mut worker_failure: Option<anyhow::Error> = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(err)) => worker_failure = Some(err),
            Err(_) => worker_failure = Some(anyhow!("worker thread panicked")),
        }
    }

    // A dead worker also breaks the reader (closed queue); report the
    // worker's own error in that case, not the consequence.
    if let Some(err) = worker_failure {
        return Err(err.context("indexing worker failed"));
    }
    let reader = fed.context("failed to read corpus")?;

    let num_documents: u64 = summaries.iter().map(|s| s.docs_seen).sum();
    let num_tokens: u64 = summaries.iter().map(|s| s.tokens_seen).sum();
    if num_documents != reader.enqueued {
        bail!(
            "worker document counts disagree with the reader ({} vs {})",
            num_documents,
            reader.enqueued
        );
    }

    let partial_files: Vec<PathBuf> = summaries
        .iter()
        .flat_map(|s| s.partial_files.iter().cloned())
        .collect();
    let doc_index_shards: Vec<PathBuf> = summaries
        .iter()
        .map(|s| s.doc_index_shard.clone())
        .collect();

    let report = merge_index(index_dir, &partial_files, &doc_index_shards)?;
    write_stats(index_dir, num_documents, num_tokens)?;
    remove_merge_inputs(&partial_files, &doc_index_shards)?;

    print_completion(index_dir, &report, num_tokens, reader.skipped);

    Ok(IndexSummary {
        num_documents,
        num_tokens,
        num_terms: report.num_terms,
        num_postings: report.num_postings,
        skipped_records: reader.skipped,
    })
}

/// Single-producer corpus feed. Malformed lines (bad JSON, missing or
/// mistyped `id`/`text`) are counted and skipped, never fatal.
fn stream_documents(
    corpus_path: &Path,
    tx: &Sender<WorkItem>,
    batch_size: usize,
) -> Result<ReaderReport> {
    let file = File::open(corpus_path)
        .with_context(|| format!("failed to open corpus {}", corpus_path.display()))?;
    let reader = BufReader::new(file);

    let mut report = ReaderReport {
        enqueued: 0,
        skipped: 0,
    };
    let mut batch: Vec<CorpusDoc> = Vec::with_capacity(batch_size);

    for line in reader.lines() {
        let line = line.with_context(|| format!("failed to read {}", corpus_path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let doc: CorpusDoc = match serde_json::from_str(&line) {
            Ok(doc) => doc,
            Err(_) => {
                report.skipped += 1;
                continue;
            }
        };

        batch.push(doc);
        report.enqueued += 1;

        if batch.len() >= batch_size {
            send_batch(tx, &mut batch)?;
        }
    }

    if !batch.is_empty() {
        send_batch(tx, &mut batch)?;
    }

    Ok(report)
}

fn send_batch(tx: &Sender<WorkItem>, batch: &mut Vec<CorpusDoc>) -> Result<()> {
    let full = std::mem::take(batch);
    tx.send(WorkItem::Batch(full))
        .map_err(|_| anyhow!("work queue closed: all workers exited early"))
}

/// Atomically write `stats.json`.
fn write_stats(index_dir: &Path, num_documents: u64, num_tokens: u64) -> Result<()> {
    let stats = CorpusStats {
        num_documents,
        num_tokens,
        avg_doc_length: if num_documents > 0 {
            num_tokens as f64 / num_documents as f64
        } else {
            0.0
        },
    };

    let path = index_dir.join(STATS_FILE);
    let tmp = tmp_path(&path);
    let mut out = BufWriter::new(
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?,
    );
    serde_json::to_writer_pretty(&mut out, &stats)?;
    out.write_all(b"\n")?;
    out.flush()?;
    fs::rename(&tmp, &path).with_context(|| format!("failed to commit {}", path.display()))?;

    Ok(())
}

fn print_completion(index_dir: &Path, report: &MergeReport, num_tokens: u64, skipped: u64) {
    println!(
        "Indexed {} documents ({} tokens, {} terms, {} postings)",
        report.num_documents, num_tokens, report.num_terms, report.num_postings
    );
    if skipped > 0 {
        eprintln!("({} malformed corpus records skipped)", skipped);
    }
    println!("Index stored at: {}", index_dir.display());
}
