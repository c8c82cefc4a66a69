use crate::tokenizer::TokenizerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Long-tail pruning applied by the TF-IDF transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfIdfConfig {
    pub prune: bool,
    pub window_size: usize,
    pub cutoff: f64,
}

impl Default for TfIdfConfig {
    fn default() -> Self {
        Self { prune: true, window_size: 100, cutoff: 0.95 }
    }
}

/// Every tunable of a build and of the query engine over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Word rows per chunk file.
    pub row_chunk_size: usize,
    /// Concept records per construction batch.
    pub batch_size: usize,
    /// Concepts with fewer incoming links are dropped before indexing.
    pub min_links_in: usize,
    #[serde(flatten)]
    pub tfidf: TfIdfConfig,
    pub top_concepts: usize,
    /// Chunks held by the query-time cache.
    pub cache_chunks: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            row_chunk_size: 10_000,
            batch_size: 500,
            min_links_in: 0,
            tfidf: TfIdfConfig::default(),
            top_concepts: 10,
            cache_chunks: 64,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(Error::io(path))?;
        let config: ModelConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.row_chunk_size == 0 {
            return Err(Error::Config("row_chunk_size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.tfidf.window_size == 0 {
            return Err(Error::Config("window_size must be positive".into()));
        }
        if !(self.tfidf.cutoff > 0.0 && self.tfidf.cutoff < 1.0) {
            return Err(Error::Config(format!("cutoff must lie in (0, 1), got {}", self.tfidf.cutoff)));
        }
        if self.cache_chunks == 0 {
            return Err(Error::Config("cache_chunks must be positive".into()));
        }
        Ok(())
    }
}
