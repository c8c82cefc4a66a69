//! Build orchestration: index -> construct -> transform -> meta.

use crate::chunk::ChunkLayout;
use crate::config::ModelConfig;
use crate::construct::{ConstructStats, MatrixConstructor};
use crate::corpus::{Corpus, LinkRecord};
use crate::index::{ConceptIndex, WordIndex};
use crate::index_builder::IndexBuilder;
use crate::ledger::{Ledger, Phase};
use crate::persist::{load_indices, now_rfc3339, save_indices, save_meta, ModelMeta, ModelPaths, MODEL_FORMAT_VERSION};
use crate::tfidf::{TfIdfTransformer, TransformStats};
use crate::tokenizer::Tokenizer;
use crate::{Error, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub meta: ModelMeta,
    pub construct: Option<ConstructStats>,
    pub transform: TransformStats,
}

/// Discard chunks, meta and ledger progress but keep the indices.
pub fn reset_construction(paths: &ModelPaths, ledger: &Ledger) -> Result<()> {
    paths.chunk_store().clear()?;
    remove_if_present(&paths.meta())?;
    ledger.reset()?;
    tracing::info!(model = %paths.root.display(), "cleared previous construction");
    Ok(())
}

/// Remove every build artifact under `paths` so the next build starts over.
pub fn reset_model(paths: &ModelPaths, ledger: &Ledger) -> Result<()> {
    reset_construction(paths, ledger)?;
    remove_if_present(&paths.concepts())?;
    remove_if_present(&paths.words())
}

fn remove_if_present(file: &Path) -> Result<()> {
    match fs::remove_file(file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io { path: file.to_path_buf(), source: e }),
    }
}

/// Run the index builder over `corpus` and persist both indices.
pub fn index_corpus<L>(paths: &ModelPaths, corpus: &dyn Corpus, links: L, config: &ModelConfig) -> Result<(ConceptIndex, WordIndex)>
where
    L: IntoIterator<Item = Result<LinkRecord>>,
{
    let mut builder = IndexBuilder::new(config.min_links_in, Tokenizer::new(config.tokenizer));
    let n_links = builder.add_link_records(links)?;
    tracing::info!(link_records = n_links, "merged link records");
    let (concepts, words) = builder.build(corpus)?;
    save_indices(paths, &concepts, &words)?;
    Ok((concepts, words))
}

/// Build the count chunks from persisted indices, resuming where the ledger
/// left off.
pub fn construct_model(paths: &ModelPaths, corpus: &dyn Corpus, config: &ModelConfig, ledger: &Ledger) -> Result<ConstructStats> {
    let (concepts, words) = load_indices(paths)?;
    MatrixConstructor::new(&concepts, &words, paths.chunk_store(), config).construct_resumable(corpus, ledger)
}

/// Transform every count chunk and write the model meta. Layout and
/// tokenizer come from the ledger, pruning settings from `config`.
pub fn transform_model(paths: &ModelPaths, config: &ModelConfig, ledger: &Ledger) -> Result<(ModelMeta, TransformStats)> {
    let (concepts, words) = load_indices(paths)?;
    let params = ledger
        .params()?
        .ok_or_else(|| Error::Resume("no construction has been recorded for this model".into()))?;
    if params.n_words != words.len() || params.n_concepts != concepts.len() {
        return Err(Error::Resume("indices changed since the count matrix was constructed".into()));
    }
    let layout = ChunkLayout::new(words.len(), params.row_chunk_size);
    let stats = TfIdfTransformer::new(config.tfidf, concepts.len())
        .transform_resumable(&paths.chunk_store(), &layout, ledger)?;
    let meta = ModelMeta {
        n_words: words.len(),
        n_concepts: concepts.len(),
        row_chunk_size: layout.row_chunk_size(),
        n_chunks: layout.n_chunks(),
        tokenizer: params.tokenizer,
        tfidf: config.tfidf,
        created_at: now_rfc3339(),
        version: MODEL_FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    Ok((meta, stats))
}

/// Full build. An interrupted build rerun with the same input and config
/// continues from its last completed batch; `fresh` discards it instead.
pub fn build<L>(paths: &ModelPaths, corpus: &dyn Corpus, links: L, config: &ModelConfig, fresh: bool) -> Result<BuildReport>
where
    L: IntoIterator<Item = Result<LinkRecord>>,
{
    config.validate()?;
    fs::create_dir_all(&paths.root).map_err(Error::io(&paths.root))?;
    let ledger = Ledger::open(&paths.ledger_dir())?;
    if fresh {
        reset_model(paths, &ledger)?;
    }

    let phase = ledger.phase()?;
    if phase.is_none() {
        // Nothing recorded, so any chunk files present belong to another build.
        paths.chunk_store().clear()?;
    }
    let resuming = phase.is_some() && paths.concepts().is_file() && paths.words().is_file();
    if resuming {
        tracing::info!(?phase, "found unfinished build, reusing its indices");
    } else {
        index_corpus(paths, corpus, links, config)?;
    }

    let construct = match phase {
        Some(p) if p >= Phase::Constructed => None,
        _ => Some(construct_model(paths, corpus, config, &ledger)?),
    };
    let (meta, transform) = transform_model(paths, config, &ledger)?;
    tracing::info!(n_words = meta.n_words, n_concepts = meta.n_concepts, n_chunks = meta.n_chunks, "model build complete");
    Ok(BuildReport { meta, construct, transform })
}
