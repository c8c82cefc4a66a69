use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An existing chunk file could not be decoded. Never treated as empty.
    #[error("corrupt chunk file {path}: {reason}")]
    CorruptChunk { path: PathBuf, reason: String },

    #[error("corrupt index file {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("malformed input in {path}: {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    Shape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("chunk {0} is missing from the model")]
    MissingChunk(u32),

    #[error("chunk {chunk} is in stage {found:?}, expected {expected:?}")]
    Stage {
        chunk: u32,
        expected: crate::chunk::ChunkStage,
        found: crate::chunk::ChunkStage,
    },

    #[error("build ledger error: {0}")]
    Ledger(#[from] sled::Error),

    #[error("cannot resume build: {0}")]
    Resume(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// True for errors that indicate on-disk state can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptChunk { .. } | Error::CorruptIndex { .. })
    }
}
