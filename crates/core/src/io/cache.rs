//! LRU cache of decoded chunks.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::raster::BandArray;

/// Key for cached chunks: (plane, chunk index).
///
/// `plane` is the sample plane for planar files and 0 when samples are
/// interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub plane: usize,
    pub chunk: usize,
}

/// LRU cache storing decoded chunks, one array per sample.
///
/// Owned by a single dataset handle; nothing is shared between readers.
pub struct ChunkCache {
    inner: LruCache<ChunkKey, Vec<BandArray>>,
}

impl ChunkCache {
    /// Create a new cache with the given capacity (number of chunks, at least 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// Decoded sample planes of a chunk, if cached.
    pub fn get(&mut self, key: &ChunkKey) -> Option<&Vec<BandArray>> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.inner.contains(key)
    }

    pub fn insert(&mut self, key: ChunkKey, planes: Vec<BandArray>) {
        self.inner.put(key, planes);
    }

    /// Number of chunks currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn planes(v: u8) -> Vec<BandArray> {
        vec![BandArray::from(array![[v]])]
    }

    #[test]
    fn test_cache_insert_get() {
        let mut cache = ChunkCache::new(2);
        let key = ChunkKey { plane: 0, chunk: 5 };
        cache.insert(key, planes(3));
        assert_eq!(cache.get(&key), Some(&planes(3)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_eviction() {
        let mut cache = ChunkCache::new(2);
        let k1 = ChunkKey { plane: 0, chunk: 0 };
        let k2 = ChunkKey { plane: 0, chunk: 1 };
        let k3 = ChunkKey { plane: 1, chunk: 0 };

        cache.insert(k1, planes(1));
        cache.insert(k2, planes(2));
        cache.insert(k3, planes(3)); // evicts k1

        assert!(!cache.contains(&k1));
        assert!(cache.contains(&k2));
        assert!(cache.contains(&k3));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = ChunkCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(ChunkKey { plane: 0, chunk: 0 }, planes(1));
        assert_eq!(cache.len(), 1);
    }
}
