use crate::config::TfIdfConfig;
use crate::tokenizer::TokenizerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const PARAMS: &[u8] = b"params";
const BATCHES_DONE: &[u8] = b"batches_done";
const PHASE: &[u8] = b"phase";
const TFIDF: &[u8] = b"tfidf";

/// Parameters that must not change while a build is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    pub batch_size: usize,
    pub row_chunk_size: usize,
    pub n_words: usize,
    pub n_concepts: usize,
    pub tokenizer: TokenizerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Constructing,
    Constructed,
    Transformed,
}

/// Persistent record of build progress.
pub struct Ledger {
    db: sled::Db,
}

impl Ledger {
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self { db: sled::open(dir)? })
    }

    /// Record `params` on first use; afterwards they must match.
    pub fn check_params(&self, params: &BuildParams) -> Result<()> {
        match self.params()? {
            Some(recorded) => {
                if &recorded != params {
                    return Err(Error::Resume(format!(
                        "ledger was recorded with {recorded:?}, this build uses {params:?}; rerun with a fresh build"
                    )));
                }
            }
            None => {
                let raw = serde_json::to_vec(params).map_err(|e| Error::Resume(e.to_string()))?;
                self.db.insert(PARAMS, raw)?;
                self.db.flush()?;
            }
        }
        Ok(())
    }

    pub fn params(&self) -> Result<Option<BuildParams>> {
        match self.db.get(PARAMS)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| Error::Resume(format!("unreadable ledger parameters: {e}"))),
            None => Ok(None),
        }
    }

    /// Record the transform settings on first use; afterwards they must match,
    /// so chunks rewritten by an interrupted transform and by its resumption
    /// are weighted and pruned alike.
    pub fn check_tfidf(&self, config: &TfIdfConfig) -> Result<()> {
        match self.tfidf()? {
            Some(recorded) if &recorded != config => Err(Error::Resume(format!(
                "transform was started with {recorded:?}, this run uses {config:?}; rerun with a fresh build"
            ))),
            Some(_) => Ok(()),
            None => {
                let raw = serde_json::to_vec(config).map_err(|e| Error::Resume(e.to_string()))?;
                self.db.insert(TFIDF, raw)?;
                self.db.flush()?;
                Ok(())
            }
        }
    }

    pub fn tfidf(&self) -> Result<Option<TfIdfConfig>> {
        match self.db.get(TFIDF)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| Error::Resume(format!("unreadable ledger transform settings: {e}"))),
            None => Ok(None),
        }
    }

    /// Number of leading batches fully merged into every chunk they touch.
    pub fn batches_done(&self) -> Result<u64> {
        Ok(self
            .db
            .get(BATCHES_DONE)?
            .and_then(|raw| <[u8; 8]>::try_from(&raw[..]).ok())
            .map_or(0, u64::from_be_bytes))
    }

    pub fn mark_batch_done(&self, batch: u64) -> Result<()> {
        self.db.insert(BATCHES_DONE, (batch + 1).to_be_bytes().to_vec())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn phase(&self) -> Result<Option<Phase>> {
        match self.db.get(PHASE)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| Error::Resume(format!("unreadable ledger phase: {e}"))),
            None => Ok(None),
        }
    }

    pub fn set_phase(&self, phase: Phase) -> Result<()> {
        let raw = serde_json::to_vec(&phase).map_err(|e| Error::Resume(e.to_string()))?;
        self.db.insert(PHASE, raw)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }
}
