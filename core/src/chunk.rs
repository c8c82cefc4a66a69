use crate::persist::{read_bytes, write_atomic};
use crate::sparse::CsrMatrix;
use crate::{Error, Result, WordId};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const CHUNK_FORMAT_VERSION: u32 = 1;

/// Fixed-size row ranges tiling `0..n_words`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    n_words: usize,
    row_chunk_size: usize,
}

impl ChunkLayout {
    /// `row_chunk_size` must be non-zero; `ModelConfig::validate` guarantees it.
    pub fn new(n_words: usize, row_chunk_size: usize) -> Self {
        Self { n_words, row_chunk_size: row_chunk_size.max(1) }
    }

    pub fn n_words(&self) -> usize { self.n_words }

    pub fn row_chunk_size(&self) -> usize { self.row_chunk_size }

    pub fn n_chunks(&self) -> u32 {
        self.n_words.div_ceil(self.row_chunk_size) as u32
    }

    /// `(chunk_id, local_row)` of a word.
    pub fn locate(&self, word: WordId) -> (u32, usize) {
        let word = word as usize;
        ((word / self.row_chunk_size) as u32, word % self.row_chunk_size)
    }

    pub fn range(&self, chunk_id: u32) -> Range<usize> {
        let start = chunk_id as usize * self.row_chunk_size;
        let end = (start + self.row_chunk_size).min(self.n_words);
        start..end.max(start)
    }

    pub fn rows_in(&self, chunk_id: u32) -> usize { self.range(chunk_id).len() }

    pub fn ranges(&self) -> impl Iterator<Item = (u32, Range<usize>)> + '_ {
        (0..self.n_chunks()).map(move |id| (id, self.range(id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStage {
    /// Raw occurrence counts, still accepting merges.
    Counts,
    /// Normalized, pruned weights. Read-only.
    TfIdf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFile {
    pub version: u32,
    pub stage: ChunkStage,
    /// Sequence number of the last construction batch merged into this chunk.
    pub merged_through: Option<u64>,
    pub matrix: CsrMatrix,
}

impl ChunkFile {
    pub fn counts(matrix: CsrMatrix) -> Self {
        Self { version: CHUNK_FORMAT_VERSION, stage: ChunkStage::Counts, merged_through: None, matrix }
    }
}

/// Outcome of merging one batch block into a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Merged,
    /// The chunk already contains this batch.
    AlreadyMerged,
}

/// Directory of chunk files, one per row range.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn path(&self, chunk_id: u32) -> PathBuf {
        self.dir.join(format!("{chunk_id:06}.chunk"))
    }

    pub fn exists(&self, chunk_id: u32) -> bool { self.path(chunk_id).is_file() }

    /// `Ok(None)` when the file is absent; any decoding or structural failure
    /// of an existing file is a corruption error.
    pub fn load(&self, chunk_id: u32) -> Result<Option<ChunkFile>> {
        let path = self.path(chunk_id);
        let bytes = match read_bytes(&path) {
            Ok(bytes) => bytes,
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let chunk: ChunkFile = bincode::deserialize(&bytes)
            .map_err(|e| Error::CorruptChunk { path: path.clone(), reason: e.to_string() })?;
        if chunk.version != CHUNK_FORMAT_VERSION {
            return Err(Error::CorruptChunk { path, reason: format!("unsupported version {}", chunk.version) });
        }
        chunk.matrix.validate().map_err(|reason| Error::CorruptChunk { path, reason })?;
        Ok(Some(chunk))
    }

    /// Load a chunk that must exist and be in `stage`.
    pub fn load_stage(&self, chunk_id: u32, stage: ChunkStage) -> Result<ChunkFile> {
        let chunk = self.load(chunk_id)?.ok_or(Error::MissingChunk(chunk_id))?;
        if chunk.stage != stage {
            return Err(Error::Stage { chunk: chunk_id, expected: stage, found: chunk.stage });
        }
        Ok(chunk)
    }

    /// `load_stage` for a chunk whose matrix must be `shape`. A file that
    /// decodes with any other shape is corrupt.
    pub fn load_shaped(&self, chunk_id: u32, stage: ChunkStage, shape: (usize, usize)) -> Result<ChunkFile> {
        let chunk = self.load_stage(chunk_id, stage)?;
        self.check_shape(chunk_id, &chunk.matrix, shape)?;
        Ok(chunk)
    }

    fn check_shape(&self, chunk_id: u32, matrix: &CsrMatrix, shape: (usize, usize)) -> Result<()> {
        if matrix.shape() != shape {
            return Err(Error::CorruptChunk {
                path: self.path(chunk_id),
                reason: format!("expected shape {shape:?}, found {:?}", matrix.shape()),
            });
        }
        Ok(())
    }

    pub fn save(&self, chunk_id: u32, chunk: &ChunkFile) -> Result<()> {
        create_dir_all(&self.dir).map_err(Error::io(&self.dir))?;
        let bytes = bincode::serialize(chunk)
            .map_err(|e| Error::CorruptChunk { path: self.path(chunk_id), reason: e.to_string() })?;
        write_atomic(&self.path(chunk_id), &bytes)
    }

    /// Add `block` into the stored chunk (absent counts as zero). Exclusive
    /// access to the chunk is the caller's responsibility.
    ///
    /// With `Some(batch)` the chunk's watermark is honoured and advanced: a
    /// chunk that already holds `batch` is left alone. With `None` the block is
    /// always added and the watermark is cleared.
    pub fn merge(&self, chunk_id: u32, block: &CsrMatrix, batch: Option<u64>) -> Result<MergeOutcome> {
        let (chunk, outcome) = match self.load(chunk_id)? {
            Some(existing) => {
                if existing.stage != ChunkStage::Counts {
                    return Err(Error::Stage { chunk: chunk_id, expected: ChunkStage::Counts, found: existing.stage });
                }
                if let (Some(done), Some(batch)) = (existing.merged_through, batch) {
                    if done >= batch {
                        return Ok(MergeOutcome::AlreadyMerged);
                    }
                }
                self.check_shape(chunk_id, &existing.matrix, block.shape())?;
                let matrix = existing.matrix.add(block)?;
                (ChunkFile { matrix, merged_through: batch, ..existing }, MergeOutcome::Merged)
            }
            None => {
                let mut chunk = ChunkFile::counts(block.clone());
                chunk.merged_through = batch;
                (chunk, MergeOutcome::Created)
            }
        };
        self.save(chunk_id, &chunk)?;
        Ok(outcome)
    }

    /// Write an empty counts chunk for every range that has no file yet.
    /// Returns how many were created.
    pub fn finalize(&self, layout: &ChunkLayout, n_cols: usize) -> Result<usize> {
        let mut created = 0;
        for (chunk_id, range) in layout.ranges() {
            if self.exists(chunk_id) { continue; }
            self.save(chunk_id, &ChunkFile::counts(CsrMatrix::zeros(range.len(), n_cols)))?;
            created += 1;
        }
        Ok(created)
    }

    /// Delete every chunk file in the directory.
    pub fn clear(&self) -> Result<()> {
        if !self.dir.exists() { return Ok(()); }
        for entry in fs::read_dir(&self.dir).map_err(Error::io(&self.dir))? {
            let path = entry.map_err(Error::io(&self.dir))?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("chunk") {
                fs::remove_file(&path).map_err(Error::io(&path))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn locate_splits_word_id() {
        let layout = ChunkLayout::new(25, 10);
        assert_eq!(layout.n_chunks(), 3);
        assert_eq!(layout.locate(0), (0, 0));
        assert_eq!(layout.locate(17), (1, 7));
        assert_eq!(layout.range(2), 20..25);
        assert_eq!(layout.rows_in(2), 5);
    }

    #[test]
    fn empty_layout_has_no_chunks() {
        let layout = ChunkLayout::new(0, 10);
        assert_eq!(layout.n_chunks(), 0);
        assert_eq!(layout.ranges().count(), 0);
    }

    #[test]
    fn absent_chunk_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.load(0).unwrap().is_none());
    }

    #[test]
    fn garbage_chunk_is_corruption_not_absence() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        fs::write(store.path(3), b"not a chunk").unwrap();
        let err = store.load(3).unwrap_err();
        assert!(err.is_corruption(), "{err}");
        let block = CsrMatrix::zeros(1, 1);
        assert!(store.merge(3, &block, Some(0)).unwrap_err().is_corruption());
    }

    #[test]
    fn merge_adds_and_skips_repeated_batch() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let block = CsrMatrix::from_sorted_rows(2, vec![vec![(1, 2.0)], vec![]]);
        assert_eq!(store.merge(0, &block, Some(0)).unwrap(), MergeOutcome::Created);
        assert_eq!(store.merge(0, &block, Some(1)).unwrap(), MergeOutcome::Merged);
        assert_eq!(store.merge(0, &block, Some(1)).unwrap(), MergeOutcome::AlreadyMerged);
        let chunk = store.load(0).unwrap().unwrap();
        assert_eq!(chunk.matrix.get(0, 1), 4.0);
        assert_eq!(chunk.merged_through, Some(1));
    }

    #[test]
    fn untracked_merge_always_adds() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let block = CsrMatrix::from_sorted_rows(2, vec![vec![(1, 2.0)], vec![]]);
        assert_eq!(store.merge(0, &block, Some(3)).unwrap(), MergeOutcome::Created);
        assert_eq!(store.merge(0, &block, None).unwrap(), MergeOutcome::Merged);
        assert_eq!(store.merge(0, &block, None).unwrap(), MergeOutcome::Merged);
        let chunk = store.load(0).unwrap().unwrap();
        assert_eq!(chunk.matrix.get(0, 1), 6.0);
        assert_eq!(chunk.merged_through, None);
    }

    #[test]
    fn merge_into_chunk_of_wrong_shape_is_corruption() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store.save(0, &ChunkFile::counts(CsrMatrix::zeros(1, 2))).unwrap();
        let block = CsrMatrix::from_sorted_rows(2, vec![vec![(1, 2.0)], vec![]]);
        let err = store.merge(0, &block, None).unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn shaped_load_rejects_short_chunk() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store.save(0, &ChunkFile::counts(CsrMatrix::zeros(1, 2))).unwrap();
        assert!(store.load_shaped(0, ChunkStage::Counts, (1, 2)).is_ok());
        let err = store.load_shaped(0, ChunkStage::Counts, (2, 2)).unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn finalize_fills_gaps() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let layout = ChunkLayout::new(5, 2);
        store.merge(1, &CsrMatrix::zeros(2, 3), Some(0)).unwrap();
        assert_eq!(store.finalize(&layout, 3).unwrap(), 2);
        for (id, range) in layout.ranges() {
            let chunk = store.load_stage(id, ChunkStage::Counts).unwrap();
            assert_eq!(chunk.matrix.shape(), (range.len(), 3));
        }
    }
}
