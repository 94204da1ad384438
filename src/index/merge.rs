use crate::index::partial::PartialIndexCursor;
use crate::index::types::{
    tmp_path, DocEntry, IndexRecord, LexiconEntry, Posting, DOCUMENT_INDEX_FILE, FINAL_INDEX_FILE,
    LEXICON_FILE,
};
use anyhow::{Context, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Counters produced by a completed merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReport {
    pub num_terms: u64,
    pub num_postings: u64,
    pub num_documents: u64,
}

/// Streaming k-way merge over partial index files plus concatenation of
/// the per-worker document-index shards.
///
/// Emits `final_inverted_index.jsonl`, `lexicon.jsonl`, and
/// `document_index.jsonl` under `index_dir`, each written to a `.tmp`
/// sibling and renamed into place only on success. Inputs are read once
/// and never mutated; rerunning over the same inputs produces
/// byte-identical outputs.
pub fn merge_index(
    index_dir: &Path,
    partial_files: &[PathBuf],
    doc_index_shards: &[PathBuf],
) -> Result<MergeReport> {
    // Deterministic cursor ids: cursors are opened over the sorted file
    // list and heap ties break on cursor id.
    let mut files: Vec<PathBuf> = partial_files.to_vec();
    files.sort();

    eprintln!("Merging {} partial index files...", files.len());

    let mut cursors = files
        .iter()
        .map(|p| PartialIndexCursor::open(p))
        .collect::<Result<Vec<_>>>()?;

    // Head-of-cursor postings, parked here while their term sits in the heap.
    let mut pending: Vec<Option<Vec<Posting>>> = Vec::with_capacity(cursors.len());
    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();

    for (cursor_id, cursor) in cursors.iter_mut().enumerate() {
        match cursor.next_record()? {
            Some((term, postings)) => {
                pending.push(Some(postings));
                heap.push(Reverse((term, cursor_id)));
            }
            None => pending.push(None),
        }
    }

    let index_path = index_dir.join(FINAL_INDEX_FILE);
    let lexicon_path = index_dir.join(LEXICON_FILE);
    let index_tmp = tmp_path(&index_path);
    let lexicon_tmp = tmp_path(&lexicon_path);

    let mut index_out = BufWriter::new(
        File::create(&index_tmp)
            .with_context(|| format!("failed to create {}", index_tmp.display()))?,
    );
    let mut lexicon_out = BufWriter::new(
        File::create(&lexicon_tmp)
            .with_context(|| format!("failed to create {}", lexicon_tmp.display()))?,
    );

    let mut report = MergeReport::default();
    let mut offset = 0u64;

    while let Some(Reverse((term, cursor_id))) = heap.pop() {
        let mut postings = take_pending(&mut pending, cursor_id)?;
        advance(&mut cursors, &mut pending, &mut heap, cursor_id)?;

        // Drain every other cursor currently parked on the same term.
        while let Some(Reverse((next_term, _))) = heap.peek() {
            if *next_term != term {
                break;
            }
            let Some(Reverse((_, other_id))) = heap.pop() else {
                break;
            };
            postings.extend(take_pending(&mut pending, other_id)?);
            advance(&mut cursors, &mut pending, &mut heap, other_id)?;
        }

        postings.sort_by(|a, b| a.0.cmp(&b.0));
        let postings = coalesce(postings);

        let df = postings.len() as u64;
        let cf = postings.iter().map(|p| p.tf() as u64).sum();

        let record = IndexRecord {
            term: term.clone(),
            postings,
        };
        let line = serde_json::to_string(&record)?;
        index_out.write_all(line.as_bytes())?;
        index_out.write_all(b"\n")?;

        let entry = LexiconEntry {
            term,
            df,
            cf,
            offset,
        };
        writeln!(lexicon_out, "{}", serde_json::to_string(&entry)?)?;

        offset += line.len() as u64 + 1;
        report.num_terms += 1;
        report.num_postings += df;
    }

    index_out.flush()?;
    lexicon_out.flush()?;

    report.num_documents = merge_document_index(index_dir, doc_index_shards)?;

    fs::rename(&index_tmp, &index_path)
        .with_context(|| format!("failed to commit {}", index_path.display()))?;
    fs::rename(&lexicon_tmp, &lexicon_path)
        .with_context(|| format!("failed to commit {}", lexicon_path.display()))?;

    Ok(report)
}

/// Concatenate the per-worker shards and sort by doc id. Worker doc id
/// partitioning is disjoint, so there are no key conflicts to resolve.
fn merge_document_index(index_dir: &Path, shards: &[PathBuf]) -> Result<u64> {
    let mut entries: Vec<DocEntry> = Vec::new();

    let mut files: Vec<PathBuf> = shards.to_vec();
    files.sort();
    for shard in &files {
        let file = File::open(shard)
            .with_context(|| format!("failed to open shard {}", shard.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry: DocEntry = serde_json::from_str(&line)
                .with_context(|| format!("malformed shard record in {}", shard.display()))?;
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

    let path = index_dir.join(DOCUMENT_INDEX_FILE);
    let tmp = tmp_path(&path);
    let mut out = BufWriter::new(
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?,
    );
    for entry in &entries {
        writeln!(out, "{}", serde_json::to_string(entry)?)?;
    }
    out.flush()?;
    fs::rename(&tmp, &path).with_context(|| format!("failed to commit {}", path.display()))?;

    Ok(entries.len() as u64)
}

/// Delete merge inputs once the final outputs are committed. Kept apart
/// from `merge_index` so a merge can be rerun over the same inputs.
pub fn remove_merge_inputs(partial_files: &[PathBuf], doc_index_shards: &[PathBuf]) -> Result<()> {
    for path in partial_files.iter().chain(doc_index_shards) {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove merge input {}", path.display()))?;
    }
    Ok(())
}

fn take_pending(pending: &mut [Option<Vec<Posting>>], cursor_id: usize) -> Result<Vec<Posting>> {
    pending[cursor_id]
        .take()
        .with_context(|| format!("merge cursor {} had no parked record", cursor_id))
}

/// Refill a cursor's slot after its head record was consumed.
fn advance(
    cursors: &mut [PartialIndexCursor],
    pending: &mut [Option<Vec<Posting>>],
    heap: &mut BinaryHeap<Reverse<(String, usize)>>,
    cursor_id: usize,
) -> Result<()> {
    if let Some((term, postings)) = cursors[cursor_id].next_record()? {
        pending[cursor_id] = Some(postings);
        heap.push(Reverse((term, cursor_id)));
    }
    Ok(())
}

/// Sum tf values for duplicate doc ids in a doc-id-sorted posting list.
/// Cannot occur when the reader partitions doc ids across workers, but
/// the merge handles it rather than assuming it.
fn coalesce(postings: Vec<Posting>) -> Vec<Posting> {
    let mut merged: Vec<Posting> = Vec::with_capacity(postings.len());
    for posting in postings {
        match merged.last_mut() {
            Some(last) if last.0 == posting.0 => last.1 += posting.1,
            _ => merged.push(posting),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::partial::PartialIndexWriter;
    use crate::index::types::DocId;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ivx_merge_tests")
            .join(format!("{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn doc(id: &str) -> DocId {
        DocId::Text(id.to_string())
    }

    fn read_lines(path: &Path) -> Vec<String> {
        let content = fs::read_to_string(path).unwrap();
        content.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn merges_same_term_across_files() {
        let dir = scratch_dir("across");
        let mut w0 = PartialIndexWriter::new(&dir, 0);
        let mut w1 = PartialIndexWriter::new(&dir, 1);

        let p0 = w0
            .write(vec![
                ("alpha".to_string(), vec![Posting(doc("d1"), 2)]),
                ("beta".to_string(), vec![Posting(doc("d1"), 1)]),
            ])
            .unwrap();
        let p1 = w1
            .write(vec![("alpha".to_string(), vec![Posting(doc("d2"), 1)])])
            .unwrap();

        let report = merge_index(&dir, &[p0, p1], &[]).unwrap();
        assert_eq!(report.num_terms, 2);
        assert_eq!(report.num_postings, 3);

        let lines = read_lines(&dir.join(FINAL_INDEX_FILE));
        assert_eq!(lines.len(), 2);
        let alpha: IndexRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(alpha.term, "alpha");
        assert_eq!(
            alpha.postings,
            vec![Posting(doc("d1"), 2), Posting(doc("d2"), 1)]
        );
    }

    #[test]
    fn lexicon_offsets_point_at_index_records() {
        let dir = scratch_dir("offsets");
        let mut writer = PartialIndexWriter::new(&dir, 0);
        let partial = writer
            .write(vec![
                ("alpha".to_string(), vec![Posting(doc("d1"), 2)]),
                ("beta".to_string(), vec![Posting(doc("d2"), 1)]),
                ("gamma".to_string(), vec![Posting(doc("d3"), 4)]),
            ])
            .unwrap();

        merge_index(&dir, &[partial], &[]).unwrap();

        let index_bytes = fs::read(dir.join(FINAL_INDEX_FILE)).unwrap();
        for line in read_lines(&dir.join(LEXICON_FILE)) {
            let entry: LexiconEntry = serde_json::from_str(&line).unwrap();
            let rest = &index_bytes[entry.offset as usize..];
            let end = rest.iter().position(|&b| b == b'\n').unwrap();
            let record: IndexRecord = serde_json::from_slice(&rest[..end]).unwrap();
            assert_eq!(record.term, entry.term);
            assert_eq!(record.postings.len() as u64, entry.df);
            assert_eq!(
                record.postings.iter().map(|p| p.tf() as u64).sum::<u64>(),
                entry.cf
            );
        }
    }

    #[test]
    fn duplicate_doc_ids_sum_their_tfs() {
        let dir = scratch_dir("dupes");
        let mut w0 = PartialIndexWriter::new(&dir, 0);
        let mut w1 = PartialIndexWriter::new(&dir, 1);

        let p0 = w0
            .write(vec![("alpha".to_string(), vec![Posting(doc("d1"), 2)])])
            .unwrap();
        let p1 = w1
            .write(vec![("alpha".to_string(), vec![Posting(doc("d1"), 3)])])
            .unwrap();

        merge_index(&dir, &[p0, p1], &[]).unwrap();

        let lines = read_lines(&dir.join(FINAL_INDEX_FILE));
        let record: IndexRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record.postings, vec![Posting(doc("d1"), 5)]);
    }

    #[test]
    fn empty_input_produces_empty_outputs() {
        let dir = scratch_dir("empty");
        let report = merge_index(&dir, &[], &[]).unwrap();
        assert_eq!(report.num_terms, 0);
        assert_eq!(report.num_documents, 0);

        assert_eq!(fs::read_to_string(dir.join(FINAL_INDEX_FILE)).unwrap(), "");
        assert_eq!(fs::read_to_string(dir.join(LEXICON_FILE)).unwrap(), "");
        assert_eq!(
            fs::read_to_string(dir.join(DOCUMENT_INDEX_FILE)).unwrap(),
            ""
        );
    }

    #[test]
    fn document_index_is_sorted_by_doc_id() {
        let dir = scratch_dir("docindex");
        let shard0 = dir.join("document_index_0.jsonl");
        let shard1 = dir.join("document_index_1.jsonl");
        fs::write(
            &shard0,
            "{\"doc_id\":\"d3\",\"tokens\":5,\"chars\":30}\n",
        )
        .unwrap();
        fs::write(
            &shard1,
            "{\"doc_id\":\"d1\",\"tokens\":2,\"chars\":10}\n{\"doc_id\":\"d2\",\"tokens\":4,\"chars\":22}\n",
        )
        .unwrap();

        let report = merge_index(&dir, &[], &[shard0, shard1]).unwrap();
        assert_eq!(report.num_documents, 3);

        let ids: Vec<DocId> = read_lines(&dir.join(DOCUMENT_INDEX_FILE))
            .iter()
            .map(|l| serde_json::from_str::<DocEntry>(l).unwrap().doc_id)
            .collect();
        assert_eq!(ids, vec![doc("d1"), doc("d2"), doc("d3")]);
    }

    #[test]
    fn merging_twice_is_byte_identical() {
        let dir_a = scratch_dir("idem_a");
        let dir_b = scratch_dir("idem_b");

        let mut writer = PartialIndexWriter::new(&dir_a, 0);
        let partial = writer
            .write(vec![
                ("alpha".to_string(), vec![Posting(doc("d1"), 2)]),
                ("beta".to_string(), vec![Posting(doc("d2"), 1)]),
            ])
            .unwrap();

        merge_index(&dir_a, &[partial.clone()], &[]).unwrap();
        merge_index(&dir_b, &[partial], &[]).unwrap();

        for name in [FINAL_INDEX_FILE, LEXICON_FILE, DOCUMENT_INDEX_FILE] {
            assert_eq!(
                fs::read(dir_a.join(name)).unwrap(),
                fs::read(dir_b.join(name)).unwrap(),
                "{} differs between identical merges",
                name
            );
        }
    }
}
