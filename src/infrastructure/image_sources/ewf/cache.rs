//! Decompressed chunk cache with least-recently-used eviction

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default number of chunks kept (2 MiB at the usual 32 KiB chunk size)
pub(crate) const DEFAULT_CACHE_ENTRIES: usize = 64;

/// LRU cache of decompressed chunks keyed by chunk index
///
/// Chunks are shared as `Arc` so a hit never copies chunk data.
#[derive(Debug)]
pub(crate) struct ChunkCache {
    entries: HashMap<usize, Arc<Vec<u8>>>,
    recency: VecDeque<usize>,
    capacity: usize,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&mut self, index: usize) -> Option<Arc<Vec<u8>>> {
        let data = self.entries.get(&index)?;
        if self.recency.front() != Some(&index) {
            self.recency.retain(|&i| i != index);
            self.recency.push_front(index);
        }
        Some(Arc::clone(data))
    }

    pub fn insert(&mut self, index: usize, data: Arc<Vec<u8>>) {
        if self.entries.contains_key(&index) {
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.recency.pop_back() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(index, data);
        self.recency.push_front(index);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
