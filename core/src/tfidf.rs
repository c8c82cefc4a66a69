//! Per-chunk TF-IDF weighting, row normalization and long-tail pruning.

use crate::chunk::{ChunkLayout, ChunkStage, ChunkStore};
use crate::config::TfIdfConfig;
use crate::ledger::{Ledger, Phase};
use crate::sparse::CsrMatrix;
use crate::{Error, Result};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Replace raw counts with `(1 + ln m) * ln(n_concepts / df)`, where `df` is
/// the number of non-zero entries in the row.
pub fn weight_row(row: &mut [f64], n_concepts: usize) {
    let df = row.iter().filter(|&&m| m > 0.0).count();
    if df == 0 { return; }
    let idf = (n_concepts as f64 / df as f64).ln();
    for m in row.iter_mut() {
        *m = if *m > 0.0 { (1.0 + m.ln()) * idf } else { 0.0 };
    }
}

/// Scale to unit Euclidean norm. An all-zero row stays zero.
pub fn normalize_row(row: &mut [f64]) {
    let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 { return; }
    for v in row.iter_mut() {
        *v /= norm;
    }
}

/// Sliding-window truncation over the row sorted by descending weight.
///
/// Scanning `i = 0..n - window`, the first position where
/// `sorted[i + window] >= cutoff * sorted[i]` zeroes that entry and every
/// weaker one. Rows with no more than `window` entries are untouched.
/// Returns the sorted position truncation started at, if any.
pub fn prune_row(row: &mut [f64], window: usize, cutoff: f64) -> Option<usize> {
    let n = row.len();
    if window >= n { return None; }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| row[b].partial_cmp(&row[a]).unwrap_or(Ordering::Equal));

    let cut = (0..n - window).find(|&i| row[order[i + window]] >= cutoff * row[order[i]])?;
    for &pos in &order[cut..] {
        row[pos] = 0.0;
    }
    Some(cut)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformStats {
    pub chunks: u64,
    /// Chunks already in the TF-IDF stage from an earlier run.
    pub chunks_skipped: u64,
    pub rows: u64,
    pub rows_pruned: u64,
    pub entries_in: u64,
    pub entries_out: u64,
}

impl TransformStats {
    fn absorb(mut self, other: TransformStats) -> TransformStats {
        self.chunks += other.chunks;
        self.chunks_skipped += other.chunks_skipped;
        self.rows += other.rows;
        self.rows_pruned += other.rows_pruned;
        self.entries_in += other.entries_in;
        self.entries_out += other.entries_out;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TfIdfTransformer {
    config: TfIdfConfig,
    n_concepts: usize,
}

impl TfIdfTransformer {
    pub fn new(config: TfIdfConfig, n_concepts: usize) -> Self {
        Self { config, n_concepts }
    }

    /// Weight, normalize and prune every row, then drop zeros.
    pub fn transform_matrix(&self, matrix: &mut CsrMatrix) -> TransformStats {
        let mut stats = TransformStats { entries_in: matrix.nnz() as u64, ..Default::default() };
        let (n_rows, _) = matrix.shape();
        for r in 0..n_rows {
            let row = matrix.row_values_mut(r);
            if row.is_empty() { continue; }
            stats.rows += 1;
            weight_row(row, self.n_concepts);
            normalize_row(row);
            if row.iter().all(|&w| w == 0.0) { continue; }
            if self.config.prune && prune_row(row, self.config.window_size, self.config.cutoff).is_some() {
                stats.rows_pruned += 1;
            }
        }
        matrix.eliminate_zeros();
        stats.entries_out = matrix.nnz() as u64;
        stats
    }

    /// Rewrite one counts chunk as a TF-IDF chunk. Chunks already transformed
    /// are left alone.
    pub fn transform_chunk(&self, store: &ChunkStore, layout: &ChunkLayout, chunk_id: u32) -> Result<TransformStats> {
        let shape = (layout.rows_in(chunk_id), self.n_concepts);
        let mut chunk = match store.load_shaped(chunk_id, ChunkStage::Counts, shape) {
            Ok(chunk) => chunk,
            Err(Error::Stage { found: ChunkStage::TfIdf, .. }) => {
                store.load_shaped(chunk_id, ChunkStage::TfIdf, shape)?;
                tracing::debug!(chunk_id, "chunk already transformed");
                return Ok(TransformStats { chunks_skipped: 1, ..Default::default() });
            }
            Err(e) => return Err(e),
        };
        let mut stats = self.transform_matrix(&mut chunk.matrix);
        chunk.stage = ChunkStage::TfIdf;
        store.save(chunk_id, &chunk)?;
        stats.chunks = 1;
        tracing::debug!(chunk_id, rows = stats.rows, entries_in = stats.entries_in, entries_out = stats.entries_out, "chunk transformed");
        Ok(stats)
    }

    /// Transform every chunk of `layout` in parallel.
    pub fn transform_all(&self, store: &ChunkStore, layout: &ChunkLayout) -> Result<TransformStats> {
        let stats = (0..layout.n_chunks())
            .into_par_iter()
            .map(|chunk_id| self.transform_chunk(store, layout, chunk_id))
            .try_reduce(TransformStats::default, |a, b| Ok(a.absorb(b)))?;
        tracing::info!(?stats, "TF-IDF transform complete");
        Ok(stats)
    }

    /// `transform_all`, gated on the ledger showing construction finished.
    /// The pruning settings are recorded on first use and every later run
    /// over the same chunks must use the same ones.
    pub fn transform_resumable(&self, store: &ChunkStore, layout: &ChunkLayout, ledger: &Ledger) -> Result<TransformStats> {
        match ledger.phase()? {
            Some(Phase::Constructed) | Some(Phase::Transformed) => {}
            other => {
                return Err(Error::Resume(format!("construction has not finished (phase {other:?})")));
            }
        }
        ledger.check_tfidf(&self.config)?;
        let stats = self.transform_all(store, layout)?;
        ledger.set_phase(Phase::Transformed)?;
        Ok(stats)
    }
}
