use crate::chunk::ChunkStore;
use crate::config::TfIdfConfig;
use crate::index::IdMap;
use crate::tokenizer::TokenizerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub n_words: usize,
    pub n_concepts: usize,
    pub row_chunk_size: usize,
    pub n_chunks: u32,
    pub tokenizer: TokenizerConfig,
    pub tfidf: TfIdfConfig,
    pub created_at: String,
    pub version: u32,
}

/// Locations of every artifact inside a model directory.
pub struct ModelPaths {
    pub root: PathBuf,
}

impl ModelPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn concepts(&self) -> PathBuf { self.root.join("concepts.idx") }
    pub fn words(&self) -> PathBuf { self.root.join("words.idx") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn chunks_dir(&self) -> PathBuf { self.root.join("chunks") }
    pub fn ledger_dir(&self) -> PathBuf { self.root.join("ledger") }
    pub fn chunk_store(&self) -> ChunkStore { ChunkStore::new(self.chunks_dir()) }
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).map_err(Error::io(path))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(Error::io(path))?;
    Ok(buf)
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp).map_err(Error::io(&tmp))?;
        f.write_all(bytes).map_err(Error::io(&tmp))?;
        f.sync_all().map_err(Error::io(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(Error::io(path))
}

fn save_id_map(path: &Path, map: &IdMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(Error::io(parent))?;
    }
    let bytes = bincode::serialize(map.as_map())
        .map_err(|e| Error::CorruptIndex { path: path.to_path_buf(), reason: e.to_string() })?;
    write_atomic(path, &bytes)
}

fn load_id_map(path: &Path) -> Result<IdMap> {
    let bytes = read_bytes(path)?;
    let raw: HashMap<String, u32> = bincode::deserialize(&bytes)
        .map_err(|e| Error::CorruptIndex { path: path.to_path_buf(), reason: e.to_string() })?;
    IdMap::from_map(raw).ok_or_else(|| Error::CorruptIndex {
        path: path.to_path_buf(),
        reason: "ids are not a contiguous range starting at 0".into(),
    })
}

pub fn save_indices(paths: &ModelPaths, concepts: &IdMap, words: &IdMap) -> Result<()> {
    save_id_map(&paths.concepts(), concepts)?;
    save_id_map(&paths.words(), words)
}

/// Returns `(concept_index, word_index)`.
pub fn load_indices(paths: &ModelPaths) -> Result<(IdMap, IdMap)> {
    Ok((load_id_map(&paths.concepts())?, load_id_map(&paths.words())?))
}

pub fn save_meta(paths: &ModelPaths, meta: &ModelMeta) -> Result<()> {
    create_dir_all(&paths.root).map_err(Error::io(&paths.root))?;
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| Error::CorruptIndex { path: paths.meta(), reason: e.to_string() })?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &ModelPaths) -> Result<ModelMeta> {
    let path = paths.meta();
    let bytes = read_bytes(&path)?;
    serde_json::from_slice(&bytes).map_err(|e| Error::CorruptIndex { path, reason: e.to_string() })
}

/// Load only what a query engine needs up front: both indices and the meta.
pub fn load_model_header(paths: &ModelPaths) -> Result<(IdMap, IdMap, ModelMeta)> {
    let (concepts, words) = load_indices(paths)?;
    let meta = load_meta(paths)?;
    if concepts.len() != meta.n_concepts || words.len() != meta.n_words {
        return Err(Error::CorruptIndex {
            path: paths.meta(),
            reason: format!(
                "meta describes {}x{} but indices hold {} words and {} concepts",
                meta.n_words, meta.n_concepts, words.len(), concepts.len()
            ),
        });
    }
    Ok((concepts, words, meta))
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn indices_round_trip_exactly() {
        let dir = tempdir().unwrap();
        let paths = ModelPaths::new(dir.path());
        let concepts = IdMap::from_keys(["pets", "animals"]);
        let words = IdMap::from_keys(["cat", "dog", "fish"]);
        save_indices(&paths, &concepts, &words).unwrap();
        let (c, w) = load_indices(&paths).unwrap();
        assert_eq!(c, concepts);
        assert_eq!(w, words);
    }

    #[test]
    fn truncated_index_is_corrupt() {
        let dir = tempdir().unwrap();
        let paths = ModelPaths::new(dir.path());
        fs::write(paths.words(), [1u8, 2, 3]).unwrap();
        fs::write(paths.concepts(), [1u8, 2, 3]).unwrap();
        assert!(load_indices(&paths).unwrap_err().is_corruption());
    }
}
