//! LRU cache of decoded chunks.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Key for cached chunks: (resolution level, band plane, chunk index).
///
/// Level 0 is the full-resolution image. Pixel-interleaved files store every
/// band in one chunk and always use plane 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ChunkKey {
    pub level: usize,
    pub plane: usize,
    pub chunk: usize,
}

/// LRU cache storing decompressed chunk bytes.
///
/// Entries are reference counted so a reader can keep using a chunk after
/// releasing the cache lock.
pub(crate) struct ChunkCache {
    inner: LruCache<ChunkKey, Arc<Vec<u8>>>,
}

impl ChunkCache {
    /// Create a cache holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &ChunkKey) -> Option<Arc<Vec<u8>>> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: ChunkKey, data: Arc<Vec<u8>>) {
        self.inner.put(key, data);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
