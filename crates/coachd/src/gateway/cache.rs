//! Response cache for the AI gateway
//!
//! Keyed by a SHA-256 fingerprint of the request. Entries expire lazily
//! after the TTL; when full, the oldest inserted entry is evicted. Reads use
//! `peek` so lookups never reorder entries.

use chrono::{DateTime, Utc};
use coach_common::ChatMessage;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Cached generation result
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content: String,
    pub provider: String,
    pub stored_at: DateTime<Utc>,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CacheEntry),
    Miss,
    Expired,
}

/// TTL- and capacity-bounded cache
#[derive(Debug)]
pub struct ResponseCache {
    entries: LruCache<String, CacheEntry>,
    ttl: chrono::Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Look up `key`, discarding it if it outlived the TTL
    pub fn lookup(&mut self, key: &str, now: DateTime<Utc>) -> Lookup {
        let expired = match self.entries.peek(key) {
            None => return Lookup::Miss,
            Some(entry) => entry
                .stored_at
                .checked_add_signed(self.ttl)
                .is_some_and(|expires| now >= expires),
        };

        if expired {
            self.entries.pop(key);
            return Lookup::Expired;
        }

        match self.entries.peek(key) {
            Some(entry) => Lookup::Hit(entry.clone()),
            None => Lookup::Miss,
        }
    }

    /// Store an entry. Returns the key evicted to make room, if any.
    pub fn insert(&mut self, key: String, entry: CacheEntry) -> Option<String> {
        let replacing = self.entries.contains(&key);
        match self.entries.push(key, entry) {
            Some((evicted, _)) if !replacing => Some(evicted),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Request fingerprint over messages, language, domain and sampling params
pub fn fingerprint(
    messages: &[ChatMessage],
    language: Option<&str>,
    domain: Option<&str>,
    max_tokens: u32,
    temperature: f32,
) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(format!("{:?}", message.role).as_bytes());
        hasher.update([0x1f]);
        hasher.update(message.content.as_bytes());
        hasher.update([0x1e]);
    }
    hasher.update(format!(
        "lang={}|domain={}|max_tokens={}|temperature={:.3}",
        language.unwrap_or(""),
        domain.unwrap_or(""),
        max_tokens,
        temperature
    ));
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(content: &str, at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            content: content.to_string(),
            provider: "fake".to_string(),
            stored_at: at,
        }
    }

    #[test]
    fn test_hit_then_expiry() {
        let t0 = Utc::now();
        let mut cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.insert("k".to_string(), entry("v", t0));

        assert!(matches!(
            cache.lookup("k", t0 + ChronoDuration::seconds(59)),
            Lookup::Hit(_)
        ));
        assert_eq!(
            cache.lookup("k", t0 + ChronoDuration::seconds(60)),
            Lookup::Expired
        );
        assert!(cache.is_empty());
        assert_eq!(cache.lookup("k", t0), Lookup::Miss);
    }

    #[test]
    fn test_evicts_oldest_even_after_reads() {
        let now = Utc::now();
        let mut cache = ResponseCache::new(2, Duration::from_secs(600));
        cache.insert("a".to_string(), entry("1", now));
        cache.insert("b".to_string(), entry("2", now));

        // Reading "a" must not protect it from eviction
        assert!(matches!(cache.lookup("a", now), Lookup::Hit(_)));

        let evicted = cache.insert("c".to_string(), entry("3", now));
        assert_eq!(evicted.as_deref(), Some("a"));
        assert_eq!(cache.lookup("a", now), Lookup::Miss);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replacing_key_is_not_eviction() {
        let now = Utc::now();
        let mut cache = ResponseCache::new(1, Duration::from_secs(600));
        cache.insert("a".to_string(), entry("1", now));
        assert_eq!(cache.insert("a".to_string(), entry("2", now)), None);
        match cache.lookup("a", now) {
            Lookup::Hit(e) => assert_eq!(e.content, "2"),
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let msgs = vec![ChatMessage::system("coach"), ChatMessage::user("hello")];
        let base = fingerprint(&msgs, Some("en"), Some("question"), 300, 0.7);

        assert_eq!(base, fingerprint(&msgs, Some("en"), Some("question"), 300, 0.7));
        assert_ne!(base, fingerprint(&msgs, Some("es"), Some("question"), 300, 0.7));
        assert_ne!(base, fingerprint(&msgs, Some("en"), Some("summary"), 300, 0.7));
        assert_ne!(base, fingerprint(&msgs, Some("en"), Some("question"), 301, 0.7));
        assert_ne!(base, fingerprint(&msgs, Some("en"), Some("question"), 300, 0.2));

        let swapped = vec![ChatMessage::user("coach"), ChatMessage::system("hello")];
        assert_ne!(base, fingerprint(&swapped, Some("en"), Some("question"), 300, 0.7));
    }
}
