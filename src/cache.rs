//! Bounded least-recently-used cache of opened audio handles.
//!
//! The cache owns every handle it holds. A handle leaves the cache in one of
//! two ways: eviction (or replacement, or drop of the cache), which unloads
//! it on the spot, or [`SoundCache::remove`], which hands ownership back to
//! the caller. Either way the underlying resource is released exactly once.

use crate::audio::AudioHandle;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};

pub struct SoundCache {
    capacity: usize,
    entries: HashMap<String, Box<dyn AudioHandle>>,
    /// Keys from least to most recently used.
    recency: VecDeque<String>,
}

impl std::fmt::Debug for SoundCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundCache")
            .field("capacity", &self.capacity)
            .field("recency", &self.recency)
            .finish()
    }
}

impl SoundCache {
    /// A cache holding at most `capacity` handles (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Membership test. Does not count as a use.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys ordered from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.recency.iter().map(String::as_str)
    }

    /// Borrow a handle and mark it most recently used.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Box<dyn AudioHandle>> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get_mut(key)
    }

    /// Insert `handle` as most recently used. A handle already stored under
    /// `key` is released. When the cache overflows, the least recently used
    /// entry is released and its key returned.
    pub fn insert(&mut self, key: String, handle: Box<dyn AudioHandle>) -> Option<String> {
        if let Some(previous) = self.entries.insert(key.clone(), handle) {
            release(&key, previous);
            self.touch(&key);
            return None;
        }
        self.recency.push_back(key);

        if self.entries.len() <= self.capacity {
            return None;
        }

        let evicted = self.recency.pop_front()?;
        if let Some(handle) = self.entries.remove(&evicted) {
            debug!("Evicting `{evicted}' from sound cache");
            release(&evicted, handle);
        }
        Some(evicted)
    }

    /// Take a handle out of the cache without releasing it.
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn AudioHandle>> {
        let handle = self.entries.remove(key)?;
        self.recency.retain(|k| k != key);
        Some(handle)
    }

    /// Release every handle.
    pub fn clear(&mut self) {
        while let Some(key) = self.recency.pop_front() {
            if let Some(handle) = self.entries.remove(&key) {
                release(&key, handle);
            }
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }
}

impl Drop for SoundCache {
    fn drop(&mut self) {
        self.clear();
    }
}

fn release(key: &str, mut handle: Box<dyn AudioHandle>) {
    if let Err(err) = handle.unload() {
        warn!("Error disposing sound `{key}': {err:#}");
    }
}
