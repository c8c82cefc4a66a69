use crate::sparse::CsrMatrix;
use crate::Result;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub resident: usize,
    pub capacity: usize,
}

/// Least-recently-used cache of loaded chunk matrices.
pub struct ChunkCache {
    slots: Mutex<LruCache<u32, Arc<CsrMatrix>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached chunk or run `load` and cache its result. The lock is
    /// not held while loading, so two threads may load the same chunk once each.
    pub fn get_or_load<F>(&self, chunk_id: u32, load: F) -> Result<Arc<CsrMatrix>>
    where
        F: FnOnce() -> Result<CsrMatrix>,
    {
        if let Some(matrix) = self.slots.lock().get(&chunk_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(matrix));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let matrix = Arc::new(load()?);

        if let Some((victim, _)) = self.slots.lock().push(chunk_id, Arc::clone(&matrix)) {
            if victim != chunk_id {
                tracing::trace!(chunk_id = victim, "evicted chunk");
            }
        }
        Ok(matrix)
    }

    pub fn contains(&self, chunk_id: u32) -> bool {
        self.slots.lock().contains(&chunk_id)
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resident: slots.len(),
            capacity: slots.cap().get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(rows: usize) -> impl FnOnce() -> Result<CsrMatrix> {
        move || Ok(CsrMatrix::zeros(rows, 1))
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ChunkCache::new(2);
        cache.get_or_load(0, load(1)).unwrap();
        cache.get_or_load(1, load(1)).unwrap();
        cache.get_or_load(0, load(1)).unwrap();
        cache.get_or_load(2, load(1)).unwrap();
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.resident), (1, 3, 2));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = ChunkCache::new(2);
        let err = cache.get_or_load(7, || Err(crate::Error::MissingChunk(7)));
        assert!(err.is_err());
        assert!(!cache.contains(7));
    }
}
