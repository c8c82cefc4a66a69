//! Query-time interpretation vectors, concept ranking and similarity.

use crate::cache::{CacheStats, ChunkCache};
use crate::chunk::{ChunkLayout, ChunkStage, ChunkStore};
use crate::index::{ConceptIndex, WordIndex};
use crate::persist::{load_model_header, ModelMeta, ModelPaths};
use crate::sparse::{SparseAccumulator, SparseVector};
use crate::tokenizer::Tokenizer;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptScore {
    pub concept: String,
    pub weight: f64,
}

/// Read-only view over a built model. Safe to share across threads.
pub struct QueryEngine {
    concepts: ConceptIndex,
    words: WordIndex,
    meta: ModelMeta,
    layout: ChunkLayout,
    store: ChunkStore,
    tokenizer: Tokenizer,
    cache: ChunkCache,
}

impl QueryEngine {
    pub fn open<P: AsRef<Path>>(model_dir: P, cache_chunks: usize) -> Result<Self> {
        let paths = ModelPaths::new(model_dir);
        let (concepts, words, meta) = load_model_header(&paths)?;
        let layout = ChunkLayout::new(meta.n_words, meta.row_chunk_size);
        tracing::info!(
            model = %paths.root.display(),
            n_words = meta.n_words,
            n_concepts = meta.n_concepts,
            n_chunks = meta.n_chunks,
            cache_chunks,
            "opened model"
        );
        Ok(Self {
            concepts,
            words,
            tokenizer: Tokenizer::new(meta.tokenizer),
            meta,
            layout,
            store: paths.chunk_store(),
            cache: ChunkCache::new(cache_chunks),
        })
    }

    pub fn meta(&self) -> &ModelMeta { &self.meta }

    pub fn cache_stats(&self) -> CacheStats { self.cache.stats() }

    pub fn n_concepts(&self) -> usize { self.concepts.len() }

    /// Sum of `count x row` over every known word of `text`. Unknown words
    /// contribute nothing. The result is not normalized.
    pub fn interpretation_vector(&self, text: &str) -> Result<SparseVector> {
        let mut known: Vec<(u32, u32)> = self
            .tokenizer
            .count_terms(text)
            .into_iter()
            .filter_map(|(term, count)| self.words.get(&term).map(|word| (word, count)))
            .collect();
        // sum in word-id order
        known.sort_unstable();

        let mut by_chunk: BTreeMap<u32, Vec<(usize, u32)>> = BTreeMap::new();
        for (word, count) in known {
            let (chunk_id, local) = self.layout.locate(word);
            by_chunk.entry(chunk_id).or_default().push((local, count));
        }

        let mut acc = SparseAccumulator::new();
        for (chunk_id, rows) in by_chunk {
            let shape = (self.layout.rows_in(chunk_id), self.concepts.len());
            let matrix = self.cache.get_or_load(chunk_id, || {
                Ok(self.store.load_shaped(chunk_id, ChunkStage::TfIdf, shape)?.matrix)
            })?;
            for (local, count) in rows {
                let (cols, weights) = matrix.row(local);
                acc.add_scaled(cols, weights, count as f64);
            }
        }
        Ok(acc.into_vector(self.concepts.len()))
    }

    /// Up to `k` concepts by descending weight.
    pub fn top_concepts(&self, vector: &SparseVector, k: usize) -> Vec<ConceptScore> {
        vector
            .top_k(k)
            .into_iter()
            .filter_map(|(id, weight)| {
                self.concepts.label(id).map(|c| ConceptScore { concept: c.to_string(), weight })
            })
            .collect()
    }

    pub fn interpret(&self, text: &str, k: usize) -> Result<Vec<ConceptScore>> {
        let vector = self.interpretation_vector(text)?;
        Ok(self.top_concepts(&vector, k))
    }

    pub fn similarity(&self, text1: &str, text2: &str) -> Result<f64> {
        let v1 = self.interpretation_vector(text1)?;
        let v2 = self.interpretation_vector(text2)?;
        Ok(similarity(&v1, &v2))
    }

    pub fn distance(&self, text1: &str, text2: &str) -> Result<f64> {
        Ok(1.0 - self.similarity(text1, text2)?)
    }
}

/// Cosine similarity of two interpretation vectors; 0 if either is zero.
pub fn similarity(v1: &SparseVector, v2: &SparseVector) -> f64 {
    v1.cosine(v2)
}
