//! Content-addressed LRU cache with TTL for token counts

use crate::error::Result;
use crate::metrics::METRICS;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Short content hash used in cache keys
pub fn short_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Cache key combining content hash, content length, and model id
fn cache_key(content: &str, model_id: &str) -> String {
    format!("{}:{}:{}", short_hash(content), content.len(), model_id)
}

/// Cache entry with TTL and access ordering
struct CacheEntry {
    tokens: usize,
    inserted_at: Instant,
    last_access: u64,
}

/// Token-count cache shared by every component that estimates tokens
///
/// Eviction is strict LRU once `max_entries` is reached; expired entries are
/// treated as misses and purged lazily on access.
pub struct TokenCountingCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: AtomicU64,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TokenCountingCache {
    /// Create a new cache with TTL and max size
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            ttl,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Get a cached count if present and not expired
    pub fn get(&self, content: &str, model_id: &str) -> Option<usize> {
        let key = cache_key(content, model_id);
        let mut entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                entry.last_access = self.tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                METRICS.record_cache_lookup(true);
                return Some(entry.tokens);
            }
            // Expired, purge lazily
            entries.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        METRICS.record_cache_lookup(false);
        None
    }

    /// Store a count, evicting the least-recently-used entry at capacity
    pub fn insert(&self, content: &str, model_id: &str, tokens: usize) {
        if self.max_entries == 0 {
            return;
        }

        let key = cache_key(content, model_id);
        let mut entries = self.entries.lock().unwrap();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            Self::evict_lru(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                tokens,
                inserted_at: Instant::now(),
                last_access: self.tick(),
            },
        );
    }

    /// Return the cached count or invoke `compute` and store its result
    ///
    /// A failed count propagates untouched; nothing is stored for it.
    pub fn get_or_compute<F>(&self, content: &str, model_id: &str, compute: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        if let Some(tokens) = self.get(content, model_id) {
            return Ok(tokens);
        }

        let tokens = compute()?;
        self.insert(content, model_id, tokens);
        Ok(tokens)
    }

    fn evict_lru(entries: &mut HashMap<String, CacheEntry>) {
        if let Some(lru_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&lru_key);
        }
    }

    /// Sweep out all expired entries
    pub fn cleanup(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap();
        let valid = entries
            .values()
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .count();

        CacheStats {
            total_entries: entries.len(),
            valid_entries: valid,
            expired_entries: entries.len() - valid,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;

    #[test]
    fn test_insert_and_get() {
        let cache = TokenCountingCache::new(Duration::from_secs(60), 100);

        cache.insert("hello world", "model-a", 3);
        assert_eq!(cache.get("hello world", "model-a"), Some(3));
        assert_eq!(cache.get("hello world", "model-b"), None);
        assert_eq!(cache.get("other", "model-a"), None);
    }

    #[test]
    fn test_expiration_is_a_miss() {
        let cache = TokenCountingCache::new(Duration::from_millis(50), 100);

        cache.insert("hello", "m", 2);
        assert_eq!(cache.get("hello", "m"), Some(2));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("hello", "m"), None);

        // Lazy purge removed the entry
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_strict_lru_eviction() {
        let cache = TokenCountingCache::new(Duration::from_secs(60), 2);

        cache.insert("a", "m", 1);
        cache.insert("b", "m", 2);

        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a", "m"), Some(1));

        cache.insert("c", "m", 3);

        assert_eq!(cache.get("b", "m"), None);
        assert_eq!(cache.get("a", "m"), Some(1));
        assert_eq!(cache.get("c", "m"), Some(3));
        assert_eq!(cache.stats().total_entries, 2);
    }

    #[test]
    fn test_get_or_compute_caches_result() {
        let cache = TokenCountingCache::new(Duration::from_secs(60), 100);
        let mut calls = 0;

        let first = cache
            .get_or_compute("content", "m", || {
                calls += 1;
                Ok(42)
            })
            .unwrap();
        assert_eq!(first, 42);
        assert_eq!(calls, 1);

        let second = cache
            .get_or_compute("content", "m", || {
                calls += 1;
                Ok(0)
            })
            .unwrap();
        assert_eq!(second, 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_get_or_compute_propagates_errors() {
        let cache = TokenCountingCache::new(Duration::from_secs(60), 100);

        let result = cache.get_or_compute("content", "m", || {
            Err(ContextError::TokenCount("backend unavailable".to_string()))
        });
        assert!(result.is_err());

        // A failed count must not be stored
        assert_eq!(cache.get("content", "m"), None);
    }

    #[test]
    fn test_cleanup_sweep() {
        let cache = TokenCountingCache::new(Duration::from_millis(50), 100);

        cache.insert("a", "m", 1);
        cache.insert("b", "m", 2);
        std::thread::sleep(Duration::from_millis(80));

        cache.cleanup();
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_stats_counters() {
        let cache = TokenCountingCache::new(Duration::from_secs(60), 100);

        cache.insert("a", "m", 1);
        cache.get("a", "m");
        cache.get("missing", "m");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.valid_entries, 1);
    }

    #[test]
    fn test_short_hash_is_stable() {
        assert_eq!(short_hash("hello"), short_hash("hello"));
        assert_ne!(short_hash("hello"), short_hash("hello "));
        assert_eq!(short_hash("hello").len(), 16);
    }
}
