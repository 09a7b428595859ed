use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::CacheKey;
use crate::variant::Variant;

struct Entry {
    source: Box<str>,
    variant: Variant,
    value: Box<str>,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    map: FxHashMap<CacheKey, Entry>,
    /// Insertion order; front is the structurally oldest key.
    order: VecDeque<CacheKey>,
}

/// Bounded in-process tier.
///
/// Eviction is by insertion order, not recency: every insert past capacity
/// drops the oldest inserted key. Reads only take the shared lock and never
/// touch the bookkeeping.
pub(crate) struct LocalTier {
    state: RwLock<State>,
    capacity: usize,
    ttl: Duration,
}

impl LocalTier {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub(crate) fn get(&self, key: &CacheKey, text: &str, variant: Variant) -> Option<String> {
        let state = self.state.read();
        let entry = state.map.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        // Guard against hash collisions: the pair must match exactly.
        if entry.variant != variant || entry.source.as_ref() != text {
            return None;
        }
        Some(entry.value.to_string())
    }

    pub(crate) fn insert(&self, key: CacheKey, text: &str, variant: Variant, value: &str) {
        let entry = Entry {
            source: text.into(),
            variant,
            value: value.into(),
            expires_at: Instant::now() + self.ttl,
        };
        let mut state = self.state.write();
        if state.map.insert(key, entry).is_none() {
            state.order.push_back(key);
        }
        while state.map.len() > self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        state.map.clear();
        state.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> CacheKey {
        CacheKey::derive(text, Variant::ZhTw)
    }

    #[test]
    fn evicts_oldest_inserted_not_least_recent() {
        let tier = LocalTier::new(2, Duration::from_secs(60));
        tier.insert(key("一"), "一", Variant::ZhTw, "壹");
        tier.insert(key("二"), "二", Variant::ZhTw, "貳");
        // Reading "一" does not refresh it.
        assert!(tier.get(&key("一"), "一", Variant::ZhTw).is_some());
        tier.insert(key("三"), "三", Variant::ZhTw, "參");

        assert_eq!(tier.len(), 2);
        assert!(tier.get(&key("一"), "一", Variant::ZhTw).is_none());
        assert_eq!(tier.get(&key("三"), "三", Variant::ZhTw).as_deref(), Some("參"));
    }

    #[test]
    fn reinsert_keeps_original_position() {
        let tier = LocalTier::new(2, Duration::from_secs(60));
        tier.insert(key("一"), "一", Variant::ZhTw, "壹");
        tier.insert(key("二"), "二", Variant::ZhTw, "貳");
        tier.insert(key("一"), "一", Variant::ZhTw, "弌");
        tier.insert(key("三"), "三", Variant::ZhTw, "參");
        assert!(tier.get(&key("一"), "一", Variant::ZhTw).is_none());
        assert!(tier.get(&key("二"), "二", Variant::ZhTw).is_some());
    }

    #[test]
    fn expired_entries_are_misses() {
        let tier = LocalTier::new(4, Duration::ZERO);
        tier.insert(key("一"), "一", Variant::ZhTw, "壹");
        assert!(tier.get(&key("一"), "一", Variant::ZhTw).is_none());
    }

    #[test]
    fn mismatched_source_is_a_miss() {
        let tier = LocalTier::new(4, Duration::from_secs(60));
        tier.insert(key("一"), "一", Variant::ZhTw, "壹");
        assert!(tier.get(&key("一"), "二", Variant::ZhTw).is_none());
    }
}
