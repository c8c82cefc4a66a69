use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use esa_core::corpus::{read_links, JsonlCorpus, LinkRecord, RecordIter};
use esa_core::ledger::Ledger;
use esa_core::persist::ModelPaths;
use esa_core::pipeline;
use esa_core::{ModelConfig, QueryEngine};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "esa")]
#[command(about = "Build and query an Explicit Semantic Analysis model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign concept and word ids and write both indices
    Index {
        /// Concept records (JSON/JSONL file or directory)
        #[arg(long)]
        corpus: PathBuf,
        /// Incoming-link records (JSON/JSONL file or directory)
        #[arg(long)]
        links: Option<PathBuf>,
        #[arg(long)]
        model: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Accumulate raw counts into chunk files, resuming an interrupted run
    Construct {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        model: PathBuf,
        /// Discard earlier chunk files and construction progress first
        #[arg(long, default_value_t = false)]
        fresh: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Rewrite every count chunk as TF-IDF weights and write the model meta
    Transform {
        #[arg(long)]
        model: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Index, construct and transform in one go
    Build {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        links: Option<PathBuf>,
        #[arg(long)]
        model: PathBuf,
        /// Start over instead of resuming an unfinished build
        #[arg(long, default_value_t = false)]
        fresh: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the strongest concepts for a piece of text
    Interpret {
        #[arg(long)]
        model: PathBuf,
        /// Number of concepts to print (defaults to the configured top_concepts)
        #[arg(short, long)]
        k: Option<usize>,
        text: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the cosine similarity of two texts
    Similarity {
        #[arg(long)]
        model: PathBuf,
        text1: String,
        text2: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// A JSON config file plus per-option overrides applied on top of it.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// JSON file with model settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    row_chunk_size: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    min_links_in: Option<usize>,
    /// Keep the full long tail of every word row
    #[arg(long, default_value_t = false)]
    no_prune: bool,
    #[arg(long)]
    window_size: Option<usize>,
    #[arg(long)]
    cutoff: Option<f64>,
    #[arg(long)]
    top_concepts: Option<usize>,
    #[arg(long)]
    cache_chunks: Option<usize>,
    #[arg(long, default_value_t = false)]
    stem: bool,
    #[arg(long, default_value_t = false)]
    remove_stopwords: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<ModelConfig> {
        let mut config = match &self.config {
            Some(path) => ModelConfig::from_json_file(path)?,
            None => ModelConfig::default(),
        };
        if let Some(v) = self.row_chunk_size { config.row_chunk_size = v; }
        if let Some(v) = self.batch_size { config.batch_size = v; }
        if let Some(v) = self.min_links_in { config.min_links_in = v; }
        if self.no_prune { config.tfidf.prune = false; }
        if let Some(v) = self.window_size { config.tfidf.window_size = v; }
        if let Some(v) = self.cutoff { config.tfidf.cutoff = v; }
        if let Some(v) = self.top_concepts { config.top_concepts = v; }
        if let Some(v) = self.cache_chunks { config.cache_chunks = v; }
        if self.stem { config.tokenizer.stem = true; }
        if self.remove_stopwords { config.tokenizer.remove_stopwords = true; }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index { corpus, links, model, config } => index(&corpus, links.as_deref(), &model, &config.resolve()?),
        Commands::Construct { corpus, model, fresh, config } => construct(&corpus, &model, fresh, &config.resolve()?),
        Commands::Transform { model, config } => transform(&model, &config.resolve()?),
        Commands::Build { corpus, links, model, fresh, config } => {
            build(&corpus, links.as_deref(), &model, fresh, &config.resolve()?)
        }
        Commands::Interpret { model, k, text, config } => {
            let config = config.resolve()?;
            interpret(&model, &text, k.unwrap_or(config.top_concepts), &config)
        }
        Commands::Similarity { model, text1, text2, config } => similarity(&model, &text1, &text2, &config.resolve()?),
    }
}

/// Link records streamed from `path`, or none.
fn links_of(path: Option<&Path>) -> Result<RecordIter<'static, LinkRecord>> {
    Ok(match path {
        Some(p) => read_links(p).with_context(|| format!("reading links from {}", p.display()))?,
        None => Box::new(std::iter::empty()),
    })
}

fn open_corpus(path: &Path) -> Result<JsonlCorpus> {
    let corpus = JsonlCorpus::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    tracing::info!(files = corpus.files().len(), corpus = %path.display(), "found corpus files");
    Ok(corpus)
}

fn index(corpus: &Path, links: Option<&Path>, model: &Path, config: &ModelConfig) -> Result<()> {
    let corpus = open_corpus(corpus)?;
    let paths = ModelPaths::new(model);
    std::fs::create_dir_all(&paths.root)?;
    let (concepts, words) = pipeline::index_corpus(&paths, &corpus, links_of(links)?, config)?;
    println!("indexed {} concepts and {} words into {}", concepts.len(), words.len(), model.display());
    Ok(())
}

fn construct(corpus: &Path, model: &Path, fresh: bool, config: &ModelConfig) -> Result<()> {
    let corpus = open_corpus(corpus)?;
    let paths = ModelPaths::new(model);
    let ledger = Ledger::open(&paths.ledger_dir())?;
    if fresh {
        pipeline::reset_construction(&paths, &ledger)?;
    }
    let stats = pipeline::construct_model(&paths, &corpus, config, &ledger)?;
    println!(
        "constructed {} batches ({} resumed), {} records, {} chunk writes",
        stats.batches, stats.batches_resumed, stats.records, stats.chunks_written
    );
    Ok(())
}

fn transform(model: &Path, config: &ModelConfig) -> Result<()> {
    let paths = ModelPaths::new(model);
    let ledger = Ledger::open(&paths.ledger_dir())?;
    let (meta, stats) = pipeline::transform_model(&paths, config, &ledger)?;
    println!(
        "transformed {} chunks ({} already done), pruned {} of {} rows; model has {} words x {} concepts",
        stats.chunks, stats.chunks_skipped, stats.rows_pruned, stats.rows, meta.n_words, meta.n_concepts
    );
    Ok(())
}

fn build(corpus: &Path, links: Option<&Path>, model: &Path, fresh: bool, config: &ModelConfig) -> Result<()> {
    let corpus = open_corpus(corpus)?;
    let report = pipeline::build(&ModelPaths::new(model), &corpus, links_of(links)?, config, fresh)?;
    if let Some(c) = &report.construct {
        tracing::info!(batches = c.batches, resumed = c.batches_resumed, unknown = c.unknown_concepts, "construction");
    }
    println!("{}", serde_json::to_string_pretty(&report.meta)?);
    Ok(())
}

fn interpret(model: &Path, text: &str, k: usize, config: &ModelConfig) -> Result<()> {
    let engine = QueryEngine::open(model, config.cache_chunks)?;
    for score in engine.interpret(text, k)? {
        println!("{:.6}\t{}", score.weight, score.concept);
    }
    Ok(())
}

fn similarity(model: &Path, text1: &str, text2: &str, config: &ModelConfig) -> Result<()> {
    let engine = QueryEngine::open(model, config.cache_chunks)?;
    println!("{:.6}", engine.similarity(text1, text2)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_over_defaults() {
        let cli = Cli::try_parse_from([
            "esa", "build", "--corpus", "c", "--model", "m", "--batch-size", "7", "--no-prune", "--stem",
        ])
        .unwrap();
        let Commands::Build { config, fresh, .. } = cli.command else { panic!("expected build") };
        let config = config.resolve().unwrap();
        assert!(!fresh);
        assert_eq!(config.batch_size, 7);
        assert!(!config.tfidf.prune);
        assert!(config.tokenizer.stem);
        assert_eq!(config.row_chunk_size, ModelConfig::default().row_chunk_size);
    }

    #[test]
    fn config_file_is_read_then_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.json");
        std::fs::write(&file, r#"{"row_chunk_size": 3, "cutoff": 0.5}"#).unwrap();
        let args = ConfigArgs { config: Some(file), cutoff: Some(0.8), ..ConfigArgs::default() };
        let config = args.resolve().unwrap();
        assert_eq!(config.row_chunk_size, 3);
        assert_eq!(config.tfidf.cutoff, 0.8);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = ConfigArgs { batch_size: Some(0), ..ConfigArgs::default() };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn links_are_read_one_record_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("links.jsonl");
        std::fs::write(&file, "{\"target\": \"Rust\", \"sources\": [\"Cargo\"]}\nnot json\n").unwrap();
        let mut links = links_of(Some(&file)).unwrap();
        assert_eq!(links.next().unwrap().unwrap().target, "Rust");
        assert!(links.next().unwrap().is_err());
        assert!(links_of(None).unwrap().next().is_none());
    }

    #[test]
    fn interpret_takes_short_k() {
        let cli = Cli::try_parse_from(["esa", "interpret", "--model", "m", "-k", "3", "some text"]).unwrap();
        let Commands::Interpret { k, text, .. } = cli.command else { panic!("expected interpret") };
        assert_eq!(k, Some(3));
        assert_eq!(text, "some text");
    }
}
