//! Cache layer (C2) — concurrency-safe, typed, named caches keyed by a
//! content hash, one instance per logical cache, scoped to a parsing
//! session (spec §4.2).
//!
//! Grounded on the `Arc<RwLock<HashMap<..>>>` connection/schema cache
//! pattern in `so0k-oxid::provider::manager::ProviderManager`.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

/// A 256-bit content hash, used as the cache key per spec invariant 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\0");
            }
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        ContentHash(bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// A single named, typed cache: insertion never evicts (spec §4.2).
#[derive(Debug)]
pub struct Cache<V> {
    name: &'static str,
    entries: DashMap<ContentHash, Arc<V>>,
}

impl<V> Cache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: ContentHash) -> Option<Arc<V>> {
        let hit = self.entries.get(&key).map(|e| e.clone());
        if hit.is_some() {
            tracing::debug!(cache = self.name, key = %key.to_hex(), "cache hit");
        } else {
            tracing::debug!(cache = self.name, key = %key.to_hex(), "cache miss");
        }
        hit
    }

    pub fn insert(&self, key: ContentHash, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(key, value.clone());
        value
    }

    /// Get the cached value or compute and insert it, without evicting.
    pub fn get_or_insert_with(&self, key: ContentHash, f: impl FnOnce() -> V) -> Arc<V> {
        if let Some(v) = self.get(key) {
            return v;
        }
        // Re-check after a potential race: two callers may both miss and
        // both compute; the second insert wins but both got a correct
        // value, which is acceptable for parse/compute results that are
        // pure functions of the key.
        self.insert(key, f())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new("unnamed")
    }
}

/// The per-path output-lock cache: `target_path -> mutex`. Callers acquire
/// the target's mutex before performing an output fetch, which is how
/// invariant 4 (at-most-once expensive fetch) is enforced (spec §4.2,
/// §4.6.3). Uses load-or-store semantics so concurrent callers always
/// observe the same mutex instance.
#[derive(Debug, Default)]
pub struct LockCache {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl LockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, target: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Generic memoized-value cache keyed by plain string, used for the
/// per-target output result cache and `find_in_parent_folders` memoization
/// (spec §4.6.3 and SPEC_FULL §4).
#[derive(Debug, Default)]
pub struct KeyedCache<V: Clone> {
    entries: DashMap<String, V>,
}

impl<V: Clone> KeyedCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// The full family of caches owned by one parsing session (spec §4.2).
#[derive(Debug, Default)]
pub struct Caches {
    /// Parsed (but not evaluated) HCL ASTs, keyed by file content + path.
    pub parsed_files: Cache<hcl::Body>,
    /// Fully materialized configurations, keyed per invariant 7.
    pub configs: Cache<crate::config::types::Configuration>,
    /// `run_cmd`/tool-invocation stdout, keyed by argument fingerprint.
    pub run_command: KeyedCache<String>,
    /// Fetched dependency outputs (raw JSON bytes), keyed by target path.
    pub dependency_outputs: KeyedCache<String>,
    /// Per-target output-fetch mutexes.
    pub output_locks: LockCache,
    /// Assumed-role credentials, keyed by role ARN + session name.
    pub credentials: KeyedCache<String>,
    /// `find_in_parent_folders` ascension memoization.
    pub parent_folder_lookups: KeyedCache<Option<String>>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_identically() {
        let a = ContentHash::of(&["/a/b", "wd", "sig", "full", "123"]);
        let b = ContentHash::of(&["/a/b", "wd", "sig", "full", "123"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_hash_differently() {
        let a = ContentHash::of(&["/a/b", "wd", "sig", "full", "123"]);
        let b = ContentHash::of(&["/a/b", "wd", "sig", "full", "124"]);
        assert_ne!(a, b);
    }

    #[test]
    fn get_or_insert_with_only_inserts_once() {
        let cache: Cache<u32> = Cache::new("test");
        let key = ContentHash::of(&["k"]);
        let mut calls = 0;
        cache.get_or_insert_with(key, || {
            calls += 1;
            1
        });
        cache.get_or_insert_with(key, || {
            calls += 1;
            2
        });
        assert_eq!(calls, 1);
        assert_eq!(*cache.get(key).unwrap(), 1);
    }

    #[test]
    fn lock_cache_returns_same_mutex_for_same_target() {
        let locks = LockCache::new();
        let a = locks.lock_for("/units/a");
        let b = locks.lock_for("/units/a");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
