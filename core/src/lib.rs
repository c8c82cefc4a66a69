//! Explicit Semantic Analysis over a disk-resident word x concept matrix.
//!
//! Building runs in three phases over a corpus of per-concept text:
//! [`index_builder`] assigns dense ids, [`construct`] accumulates raw counts
//! into fixed-size row chunks on disk, and [`tfidf`] rewrites every chunk as
//! normalized, pruned TF-IDF weights. [`query::QueryEngine`] then maps free
//! text to a sparse concept vector, loading only the chunks it touches.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod construct;
pub mod corpus;
pub mod error;
pub mod index;
pub mod index_builder;
pub mod ledger;
pub mod persist;
pub mod pipeline;
pub mod query;
pub mod sparse;
pub mod tfidf;
pub mod tokenizer;

pub use config::ModelConfig;
pub use error::{Error, Result};
pub use index::{ConceptId, ConceptIndex, IdMap, WordId, WordIndex};
pub use query::{similarity, ConceptScore, QueryEngine};
pub use sparse::SparseVector;
