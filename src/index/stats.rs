use crate::index::types::{
    CorpusStats, LexiconEntry, DOCUMENT_INDEX_FILE, FINAL_INDEX_FILE, LEXICON_FILE, STATS_FILE,
};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Display statistics for an existing index directory.
pub fn show_stats(index_dir: &Path) -> Result<()> {
    let stats_path = index_dir.join(STATS_FILE);
    let stats_file = File::open(&stats_path)
        .with_context(|| format!("no index found at {}", index_dir.display()))?;
    let stats: CorpusStats = serde_json::from_reader(BufReader::new(stats_file))
        .with_context(|| format!("malformed {}", stats_path.display()))?;

    let lexicon_path = index_dir.join(LEXICON_FILE);
    let lexicon_file = File::open(&lexicon_path)
        .with_context(|| format!("failed to open {}", lexicon_path.display()))?;

    let mut num_terms = 0u64;
    let mut num_postings = 0u64;
    for line in BufReader::new(lexicon_file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let entry: LexiconEntry = serde_json::from_str(&line)
            .with_context(|| format!("malformed lexicon entry in {}", lexicon_path.display()))?;
        num_terms += 1;
        num_postings += entry.df;
    }

    let avg_list_len = if num_terms > 0 {
        num_postings as f64 / num_terms as f64
    } else {
        0.0
    };

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Index location:    {}", index_dir.display());
    println!("Documents:         {}", stats.num_documents);
    println!("Tokens:            {}", stats.num_tokens);
    println!("Avg tokens/doc:    {:.2}", stats.avg_doc_length);
    println!("Terms:             {}", num_terms);
    println!("Postings:          {}", num_postings);
    println!("Avg postings/term: {:.2}", avg_list_len);

    println!();
    for name in [
        FINAL_INDEX_FILE,
        LEXICON_FILE,
        DOCUMENT_INDEX_FILE,
        STATS_FILE,
    ] {
        if let Ok(meta) = std::fs::metadata(index_dir.join(name)) {
            println!("{:26} {}", name, format_size(meta.len()));
        }
    }

    Ok(())
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_picks_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
