use crate::index::types::{partial_index_path, tmp_path, Posting};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes one immutable partial index file per flush.
///
/// Format: one record per line, `term \t postings-json`, terms in strict
/// ascending order (guaranteed by `InMemoryIndex::drain_sorted`). Terms
/// are alphanumeric, so the tab separator cannot occur inside them. Files
/// appear atomically via write-then-rename.
pub struct PartialIndexWriter {
    index_dir: PathBuf,
    worker_id: usize,
    seq: usize,
}

impl PartialIndexWriter {
    pub fn new(index_dir: &Path, worker_id: usize) -> Self {
        Self {
            index_dir: index_dir.to_path_buf(),
            worker_id,
            seq: 0,
        }
    }

    pub fn write(&mut self, records: Vec<(String, Vec<Posting>)>) -> Result<PathBuf> {
        let path = partial_index_path(&self.index_dir, self.worker_id, self.seq);
        self.seq += 1;

        let tmp = tmp_path(&path);
        let file = File::create(&tmp)
            .with_context(|| format!("failed to create partial index {}", tmp.display()))?;
        let mut out = BufWriter::new(file);

        for (term, postings) in &records {
            writeln!(out, "{}\t{}", term, serde_json::to_string(postings)?)?;
        }

        out.flush()?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to commit partial index {}", path.display()))?;

        Ok(path)
    }
}

/// Streams `(term, postings)` records back out of a partial index file in
/// file order (ascending terms) for the k-way merge.
pub struct PartialIndexCursor {
    path: PathBuf,
    reader: BufReader<File>,
    line: String,
}

impl PartialIndexCursor {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open partial index {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
        })
    }

    pub fn next_record(&mut self) -> Result<Option<(String, Vec<Posting>)>> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if read == 0 {
            return Ok(None);
        }

        let line = self.line.trim_end_matches('\n');
        let (term, payload) = line.split_once('\t').with_context(|| {
            format!("malformed partial index record in {}", self.path.display())
        })?;
        let postings: Vec<Posting> = serde_json::from_str(payload).with_context(|| {
            format!(
                "malformed posting list for {:?} in {}",
                term,
                self.path.display()
            )
        })?;

        Ok(Some((term.to_string(), postings)))
    }
}
