mod index;
mod query;
mod utils;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use index::types::IndexConfig;
use query::{Processor, Ranker};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ivx")]
#[command(about = "Memory-bounded inverted index builder and ranked keyword search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the inverted index from a JSONL corpus
    Index {
        /// Memory available to the indexer, in MB
        #[arg(short = 'm', long = "memory_limit_mb", value_parser = clap::value_parser!(u64).range(1..))]
        memory_limit_mb: u64,

        /// Path to the corpus file (.jsonl, one {"id", "text"} object per line)
        #[arg(short = 'c', long = "corpus_path")]
        corpus_path: PathBuf,

        /// Directory where the index files are written
        #[arg(short = 'i', long = "index_dir")]
        index_dir: PathBuf,
    },
    /// Run ranked queries against a built index
    Query {
        /// Path to the final index file
        #[arg(short = 'i', long = "index_file_path")]
        index_file_path: PathBuf,

        /// File with one query per line
        #[arg(short = 'q', long = "queries_file_path")]
        queries_file_path: PathBuf,

        /// Ranking function
        #[arg(short = 'r', long = "ranker", value_enum)]
        ranker: Ranker,

        /// Number of results per query
        #[arg(short = 'k', long = "top_k", default_value = "10")]
        top_k: usize,
    },
    /// Show statistics for an existing index
    Stats {
        /// Index directory
        #[arg(short = 'i', long = "index_dir")]
        index_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            memory_limit_mb,
            corpus_path,
            index_dir,
        } => {
            if corpus_path.extension().map_or(true, |ext| ext != "jsonl") {
                bail!("corpus file must be a .jsonl file");
            }
            let config = IndexConfig::new(memory_limit_mb);
            index::pipeline::build_index(&config, &corpus_path, &index_dir)?;
        }
        Commands::Query {
            index_file_path,
            queries_file_path,
            ranker,
            top_k,
        } => {
            if index_file_path.extension().map_or(true, |ext| ext != "jsonl") {
                bail!("index file must be a .jsonl file");
            }
            let mut processor = Processor::open(&index_file_path, ranker, top_k)?;
            processor.run_queries(&queries_file_path)?;
        }
        Commands::Stats { index_dir } => {
            index::stats::show_stats(&index_dir)?;
        }
    }

    Ok(())
}
