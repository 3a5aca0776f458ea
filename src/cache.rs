//! Per-chat in-memory cache of loaded messages with TTL invalidation.
//!
//! The cache is a derived, invalidatable view over the reducer's canonical
//! list: a fresh load repopulates it, a send/confirm refreshes it, and an
//! expired or absent entry forces a remote reload. Time is injected as
//! milliseconds so expiry is deterministic under test.

use crate::models::Message;
use std::collections::HashMap;
use std::time::Duration;

/// Default entry lifetime (30 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    messages: Vec<Message>,
    cached_at_ms: u64,
}

/// TTL-based message cache keyed by chat id.
///
/// An entry is valid only while `now - cached_at < ttl`; expired entries are
/// dropped on access.
pub struct MessageCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCache {
    /// Create a cache with the default 30-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Store the message list for a chat, stamped at `now_ms`.
    pub fn insert(&mut self, chat_id: impl Into<String>, messages: Vec<Message>, now_ms: u64) {
        self.entries.insert(
            chat_id.into(),
            CacheEntry {
                messages,
                cached_at_ms: now_ms,
            },
        );
    }

    /// Get the cached messages for a chat, or `None` when absent or expired.
    ///
    /// Expired entries are evicted on the way out.
    pub fn get(&mut self, chat_id: &str, now_ms: u64) -> Option<&[Message]> {
        let valid = match self.entries.get(chat_id) {
            Some(entry) => now_ms.saturating_sub(entry.cached_at_ms) < self.ttl.as_millis() as u64,
            None => return None,
        };
        if !valid {
            log::debug!("Cache entry for chat {} expired", chat_id);
            self.entries.remove(chat_id);
            return None;
        }
        self.entries.get(chat_id).map(|e| e.messages.as_slice())
    }

    /// Drop the entry for one chat.
    pub fn invalidate(&mut self, chat_id: &str) {
        self.entries.remove(chat_id);
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries (including any not yet evicted as expired).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;

    const T0: u64 = 1_700_000_000_000;
    const TTL_MS: u64 = 30 * 60 * 1000;

    fn sample_messages() -> Vec<Message> {
        vec![Message::placeholder(
            "tmp_1",
            "chat_1",
            "Hello",
            ContentKind::Text,
            0,
            T0,
        )]
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = MessageCache::new();
        cache.insert("chat_1", sample_messages(), T0);
        let hit = cache.get("chat_1", T0 + TTL_MS - 1);
        assert!(hit.is_some(), "entry must be valid 1ms before expiry");
        assert_eq!(hit.unwrap().len(), 1);
    }

    #[test]
    fn test_miss_after_ttl() {
        let mut cache = MessageCache::new();
        cache.insert("chat_1", sample_messages(), T0);
        assert!(cache.get("chat_1", T0 + TTL_MS + 1).is_none());
        assert!(cache.is_empty(), "expired entry must be evicted");
    }

    #[test]
    fn test_exact_ttl_boundary_is_expired() {
        let mut cache = MessageCache::new();
        cache.insert("chat_1", sample_messages(), T0);
        // Validity requires now - cached_at strictly less than the TTL.
        assert!(cache.get("chat_1", T0 + TTL_MS).is_none());
    }

    #[test]
    fn test_absent_chat_misses() {
        let mut cache = MessageCache::new();
        assert!(cache.get("chat_unknown", T0).is_none());
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let mut cache = MessageCache::new();
        cache.insert("chat_1", sample_messages(), T0);
        cache.invalidate("chat_1");
        assert!(cache.get("chat_1", T0).is_none());
    }

    #[test]
    fn test_reinsert_refreshes_timestamp() {
        let mut cache = MessageCache::new();
        cache.insert("chat_1", sample_messages(), T0);
        cache.insert("chat_1", sample_messages(), T0 + TTL_MS);
        assert!(cache.get("chat_1", T0 + TTL_MS + 100).is_some());
    }
}
