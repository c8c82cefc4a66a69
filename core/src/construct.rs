//! Out-of-core construction of the word x concept count matrix.

use crate::chunk::{ChunkLayout, ChunkStore, MergeOutcome};
use crate::config::ModelConfig;
use crate::corpus::{ConceptRecord, Corpus};
use crate::index::{ConceptIndex, WordIndex};
use crate::ledger::{BuildParams, Ledger, Phase};
use crate::sparse::TripletBuilder;
use crate::tokenizer::Tokenizer;
use crate::{Error, Result};
use rayon::prelude::*;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConstructStats {
    pub batches: u64,
    /// Batches recorded as done by an earlier run and not re-read.
    pub batches_resumed: u64,
    pub records: u64,
    /// Records whose title is not in the concept index.
    pub unknown_concepts: u64,
    pub chunks_written: u64,
    pub chunks_already_merged: u64,
    /// Empty chunks written at the end so the files tile every word id.
    pub chunks_filled: u64,
}

pub struct MatrixConstructor<'a> {
    concepts: &'a ConceptIndex,
    words: &'a WordIndex,
    tokenizer: Tokenizer,
    layout: ChunkLayout,
    store: ChunkStore,
    batch_size: usize,
}

impl<'a> MatrixConstructor<'a> {
    pub fn new(concepts: &'a ConceptIndex, words: &'a WordIndex, store: ChunkStore, config: &ModelConfig) -> Self {
        Self {
            concepts,
            words,
            tokenizer: Tokenizer::new(config.tokenizer),
            layout: ChunkLayout::new(words.len(), config.row_chunk_size),
            store,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn layout(&self) -> &ChunkLayout { &self.layout }

    pub fn params(&self) -> BuildParams {
        BuildParams {
            batch_size: self.batch_size,
            row_chunk_size: self.layout.row_chunk_size(),
            n_words: self.words.len(),
            n_concepts: self.concepts.len(),
            tokenizer: self.tokenizer.config(),
        }
    }

    /// Build the count chunks from `corpus` with no progress ledger. Every
    /// batch is added to whatever the store already holds.
    pub fn construct(&self, corpus: &dyn Corpus) -> Result<ConstructStats> {
        self.run(corpus, None, |_| Ok(()))
    }

    /// Build the count chunks, skipping batches `ledger` records as done and
    /// recording each batch once all of its chunks are written.
    pub fn construct_resumable(&self, corpus: &dyn Corpus, ledger: &Ledger) -> Result<ConstructStats> {
        ledger.check_params(&self.params())?;
        if let Some(phase) = ledger.phase()? {
            if phase >= Phase::Constructed {
                return Err(Error::Resume(format!("construction already finished (phase {phase:?})")));
            }
        }
        ledger.set_phase(Phase::Constructing)?;
        let start = ledger.batches_done()?;
        if start > 0 {
            tracing::info!(batches_done = start, "resuming construction");
        }
        let stats = self.run(corpus, Some(start), |batch| ledger.mark_batch_done(batch))?;
        ledger.set_phase(Phase::Constructed)?;
        Ok(stats)
    }

    /// `resume_from` is `Some` for ledger-tracked runs: that many leading
    /// batches are skipped and chunk watermarks are honoured.
    fn run(&self, corpus: &dyn Corpus, resume_from: Option<u64>, mut on_batch_done: impl FnMut(u64) -> Result<()>) -> Result<ConstructStats> {
        let tracked = resume_from.is_some();
        let skip_batches = resume_from.unwrap_or(0);
        let mut stats = ConstructStats::default();
        let mut batch: Vec<ConceptRecord> = Vec::with_capacity(self.batch_size);
        let mut seq: u64 = 0;

        tracing::info!(
            n_words = self.layout.n_words(),
            n_concepts = self.concepts.len(),
            n_chunks = self.layout.n_chunks(),
            batch_size = self.batch_size,
            "constructing count matrix"
        );

        let mut records = corpus.records()?;
        loop {
            let next = records.next().transpose()?;
            let end = next.is_none();
            if let Some(record) = next {
                if seq < skip_batches {
                    // Batches are counted by position only, so a resumed run
                    // skips without tokenizing.
                    batch.push(record);
                    if batch.len() == self.batch_size {
                        batch.clear();
                        stats.batches_resumed += 1;
                        seq += 1;
                    }
                    continue;
                }
                batch.push(record);
                if batch.len() < self.batch_size { continue; }
            }
            if !batch.is_empty() && seq >= skip_batches {
                self.merge_batch(seq, tracked, &batch, &mut stats)?;
                on_batch_done(seq)?;
                stats.batches += 1;
                seq += 1;
                batch.clear();
            }
            if end {
                if seq < skip_batches && !batch.is_empty() {
                    stats.batches_resumed += 1;
                }
                break;
            }
        }

        stats.chunks_filled = self.store.finalize(&self.layout, self.concepts.len())? as u64;
        tracing::info!(?stats, "count matrix complete");
        Ok(stats)
    }

    fn merge_batch(&self, seq: u64, tracked: bool, batch: &[ConceptRecord], stats: &mut ConstructStats) -> Result<()> {
        let mut builder = TripletBuilder::new();
        let mut skipped = 0u64;
        for record in batch {
            stats.records += 1;
            let Some(concept) = self.concepts.get(&record.title) else {
                skipped += 1;
                tracing::debug!(title = %record.title, "record is not in the concept index, skipping");
                continue;
            };
            for (term, count) in self.tokenizer.count_terms(&record.text) {
                if let Some(word) = self.words.get(&term) {
                    builder.add(word, concept, count as f64);
                }
            }
        }

        if skipped > 0 {
            stats.unknown_concepts += skipped;
            tracing::warn!(batch = seq, skipped, "records naming concepts outside the index were skipped");
        }

        let entries = builder.len();
        let blocks: Vec<_> = builder.into_chunks(&self.layout, self.concepts.len()).into_iter().collect();
        let outcomes = blocks
            .into_par_iter()
            .map(|(chunk_id, block)| -> Result<MergeOutcome> {
                let outcome = self.store.merge(chunk_id, &block, tracked.then_some(seq))?;
                tracing::debug!(batch = seq, chunk_id, ?outcome, "merged block");
                Ok(outcome)
            })
            .collect::<Result<Vec<MergeOutcome>>>()?;

        for outcome in &outcomes {
            match outcome {
                MergeOutcome::AlreadyMerged => stats.chunks_already_merged += 1,
                _ => stats.chunks_written += 1,
            }
        }
        tracing::info!(batch = seq, records = batch.len(), entries, chunks = outcomes.len(), "batch merged");
        Ok(())
    }
}
