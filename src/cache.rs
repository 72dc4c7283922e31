//! Resolved-manifest cache.
//!
//! Maps a canonical embed URL to the manifest URL a browser session found
//! for it. Entries live for a fixed TTL (one hour by default) and are
//! evicted lazily on lookup; there is no background sweep and no size bound,
//! so memory grows with the number of distinct titles requested per TTL window.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default TTL for resolved manifests.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Storage seam used by the resolver, so tests and alternative
/// (bounded, shared) stores can be swapped in.
pub trait ManifestStore: Send + Sync {
    /// Fresh manifest URL for `key`, evicting the entry if it has expired.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `manifest_url` under `key`, replacing any previous entry.
    fn set(&self, key: &str, manifest_url: String);

    /// Number of entries currently held, expired or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A discovered manifest URL.
#[derive(Clone, Debug)]
struct CacheEntry {
    manifest_url: String,
    discovered_at: Instant,
}

/// Thread-safe in-memory manifest cache with TTL-based invalidation.
#[derive(Clone, Debug)]
pub struct ManifestCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ManifestCache {
    /// Create a cache with the default one-hour TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestStore for ManifestCache {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if entry.discovered_at.elapsed() < self.ttl {
                debug!("Manifest cache HIT for {}", key);
                return Some(entry.manifest_url.clone());
            }
            // Stale, drop the read guard before removing
            drop(entry);
            self.entries.remove(key);
            debug!("Manifest cache entry expired for {}", key);
        }
        debug!("Manifest cache MISS for {}", key);
        None
    }

    fn set(&self, key: &str, manifest_url: String) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                manifest_url,
                discovered_at: Instant::now(),
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "https://embed.example.com/movie/12345?autoPlay=true&server=Vfast";

    #[test]
    fn hit_within_ttl() {
        let cache = ManifestCache::new();
        cache.set(KEY, "https://cdn.example/stream/abc.m3u8".to_string());

        assert_eq!(
            cache.get(KEY),
            Some("https://cdn.example/stream/abc.m3u8".to_string())
        );
    }

    #[test]
    fn miss_for_unknown_key() {
        let cache = ManifestCache::new();
        assert_eq!(cache.get(KEY), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let cache = ManifestCache::with_ttl(Duration::from_millis(1));
        cache.set(KEY, "https://cdn.example/stream/abc.m3u8".to_string());
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get(KEY), None, "Entry should be stale after TTL");
        assert!(cache.is_empty(), "Stale entry should be removed by get");
    }

    #[test]
    fn expired_entries_linger_until_looked_up() {
        let cache = ManifestCache::with_ttl(Duration::from_millis(1));
        cache.set(KEY, "a.m3u8".to_string());
        cache.set("other", "b.m3u8".to_string());

        std::thread::sleep(Duration::from_millis(5));
        cache.get(KEY);

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overwrite_refreshes_entry() {
        let cache = ManifestCache::new();
        cache.set(KEY, "old.m3u8".to_string());
        cache.set(KEY, "new.m3u8".to_string());

        assert_eq!(cache.get(KEY), Some("new.m3u8".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_not_normalized() {
        let cache = ManifestCache::new();
        cache.set(KEY, "abc.m3u8".to_string());

        assert_eq!(
            cache.get("https://embed.example.com/movie/12345?server=Vfast&autoPlay=true"),
            None
        );
    }

    #[test]
    fn clones_share_entries() {
        let cache = ManifestCache::new();
        let other = cache.clone();
        other.set(KEY, "abc.m3u8".to_string());

        assert_eq!(cache.get(KEY), Some("abc.m3u8".to_string()));
    }
}
