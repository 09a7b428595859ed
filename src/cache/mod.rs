//! Two-tier memoization of conversion results.
//!
//! The in-process tier is a bounded accelerator in front of an optional
//! [`SharedStore`]. Lookups try the local tier, then the shared tier (promoting
//! hits). Shared-store failures are reported as
//! [`DiagnosticKind::CacheUnreachable`] and otherwise behave like misses.

mod local;
mod shared;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use self::local::LocalTier;
pub use self::shared::{FileStore, MemoryStore, SharedStore, StoredEntry};
use crate::diagnostics::{self, DiagnosticKind};
use crate::variant::Variant;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// BLAKE3 digest of a (text, variant) pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn derive(text: &str, variant: Variant) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Length prefix keeps (text, code) boundaries unambiguous.
        hasher.update(&(text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.update(variant.code().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..16])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Entries currently held by the in-process tier.
    pub size: usize,
}

pub struct ConversionCache {
    local: LocalTier,
    shared: Option<Arc<dyn SharedStore>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl ConversionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            local: LocalTier::new(capacity, ttl),
            shared: None,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    pub fn with_shared_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.shared = Some(store);
        self
    }

    pub fn get(&self, text: &str, variant: Variant) -> Option<String> {
        let key = CacheKey::derive(text, variant);
        if let Some(value) = self.local.get(&key, text, variant) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(store) = &self.shared {
            match store.get(&key) {
                Ok(Some(entry)) if entry.matches(text, variant) => {
                    self.local.insert(key, text, variant, &entry.value);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value);
                }
                Ok(_) => {}
                Err(err) => {
                    diagnostics::report(DiagnosticKind::CacheUnreachable, &err.to_string());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `result` for `(text, variant)`. Identity conversions are not stored.
    pub fn set(&self, text: &str, variant: Variant, result: &str) {
        if result == text {
            return;
        }
        let key = CacheKey::derive(text, variant);
        self.local.insert(key, text, variant, result);
        self.sets.fetch_add(1, Ordering::Relaxed);

        if let Some(store) = &self.shared {
            let entry = StoredEntry::new(text, variant, result, self.ttl);
            if let Err(err) = store.set(&key, &entry) {
                diagnostics::report(DiagnosticKind::CacheUnreachable, &err.to_string());
            }
        }
    }

    /// Looks up `(text, variant)` and runs `convert` on a miss, storing its result.
    pub fn get_or_insert_with<F>(&self, text: &str, variant: Variant, convert: F) -> String
    where
        F: FnOnce(&str) -> String,
    {
        if let Some(hit) = self.get(text, variant) {
            return hit;
        }
        let converted = convert(text);
        self.set(text, variant, &converted);
        converted
    }

    pub fn clear(&self) {
        self.local.clear();
        if let Some(store) = &self.shared {
            if let Err(err) = store.clear() {
                diagnostics::report(DiagnosticKind::CacheUnreachable, &err.to_string());
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            size: self.local.len(),
        }
    }
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    struct BrokenStore;

    impl SharedStore for BrokenStore {
        fn get(&self, _: &CacheKey) -> Result<Option<StoredEntry>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn set(&self, _: &CacheKey, _: &StoredEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn keys_separate_text_and_variant() {
        assert_ne!(
            CacheKey::derive("头发", Variant::ZhTw),
            CacheKey::derive("头发", Variant::ZhHk)
        );
        assert_eq!(CacheKey::derive("a", Variant::ZhTw).to_hex().len(), 64);
    }

    #[test]
    fn set_get_clear() {
        let cache = ConversionCache::default();
        cache.set("头发", Variant::ZhTw, "頭髮");
        assert_eq!(cache.get("头发", Variant::ZhTw).as_deref(), Some("頭髮"));
        assert_eq!(cache.get("头发", Variant::ZhHk), None);

        cache.clear();
        assert_eq!(cache.get("头发", Variant::ZhTw), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets, stats.size), (1, 2, 1, 0));
    }

    #[test]
    fn identity_results_are_not_stored() {
        let cache = ConversionCache::default();
        cache.set("abc", Variant::ZhTw, "abc");
        assert_eq!(cache.stats().sets, 0);
        assert_eq!(cache.get("abc", Variant::ZhTw), None);
    }

    #[test]
    fn shared_hits_are_promoted() {
        let store = Arc::new(MemoryStore::new());
        let writer = ConversionCache::default().with_shared_store(store.clone());
        writer.set("头发", Variant::ZhTw, "頭髮");

        let reader = ConversionCache::default().with_shared_store(store);
        assert_eq!(reader.get("头发", Variant::ZhTw).as_deref(), Some("頭髮"));
        assert_eq!(reader.stats().size, 1);
    }

    #[test]
    fn broken_store_degrades_to_miss() {
        let cache = ConversionCache::default().with_shared_store(Arc::new(BrokenStore));
        assert_eq!(cache.get("头发", Variant::ZhTw), None);
        cache.set("头发", Variant::ZhTw, "頭髮");
        // Local tier still serves.
        assert_eq!(cache.get("头发", Variant::ZhTw).as_deref(), Some("頭髮"));
        cache.clear();
    }

    #[test]
    fn get_or_insert_runs_conversion_once() {
        let cache = ConversionCache::default();
        let mut calls = 0;
        for _ in 0..3 {
            let out = cache.get_or_insert_with("发", Variant::ZhHant, |t| {
                calls += 1;
                t.replace('发', "發")
            });
            assert_eq!(out, "發");
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn concurrent_readers_and_writers_stay_bounded() {
        const CAPACITY: usize = 8;
        let cache = ConversionCache::new(CAPACITY, DEFAULT_TTL);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..200 {
                        let i = (t * 7 + round) % 32;
                        let text = format!("字{i}");
                        if let Some(hit) = cache.get(&text, Variant::ZhTw) {
                            assert_eq!(hit, format!("字{i}!"));
                        }
                        cache.set(&text, Variant::ZhTw, &format!("字{i}!"));
                        assert!(cache.stats().size <= CAPACITY);
                    }
                });
            }
        });

        let stats = cache.stats();
        assert!(stats.size <= CAPACITY);
        assert_eq!(stats.sets, 8 * 200);
        assert_eq!(stats.hits + stats.misses, 8 * 200);
    }
}
