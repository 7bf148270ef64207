use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::channels::Catalog;
use crate::loader::{CatalogLoader, FetchError};
use crate::metrics::CATALOG_CACHE_HITS;

pub type CatalogResult = Result<Arc<Catalog>, FetchError>;

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds an entry stays fresh; 0 keeps it until refreshed by hand.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Seconds a failed load is remembered before the next lookup retries it.
    #[serde(default = "default_error_ttl_secs")]
    pub error_ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_error_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            error_ttl_secs: default_error_ttl_secs(),
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        secs(self.ttl_secs)
    }

    pub fn error_ttl(&self) -> Option<Duration> {
        secs(self.error_ttl_secs)
    }
}

struct Entry {
    stored_at: Instant,
    result: CatalogResult,
}

/// Load results keyed by the exact URL string. Failures are remembered too,
/// for `error_ttl`, so an unreachable source is reported consistently without
/// being hammered on every lookup.
pub struct CatalogCache {
    ttl: Option<Duration>,
    error_ttl: Option<Duration>,
    entries: HashMap<String, Entry>,
}

impl CatalogCache {
    pub fn new(ttl: Option<Duration>, error_ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            error_ttl,
            entries: HashMap::new(),
        }
    }

    /// The stored result for `url`, unless missing or expired.
    pub fn get(&self, url: &str) -> Option<CatalogResult> {
        let fresh = self.entries.get(url).filter(|entry| {
            let ttl = if entry.result.is_ok() { self.ttl } else { self.error_ttl };
            ttl.map_or(true, |ttl| entry.stored_at.elapsed() < ttl)
        });

        match fresh {
            Some(entry) => {
                debug!("Catalog cache hit for {}", url);
                CATALOG_CACHE_HITS.inc();
                Some(entry.result.clone())
            }
            None => {
                debug!("Catalog cache miss for {}", url);
                None
            }
        }
    }

    pub fn insert(&mut self, url: &str, result: CatalogResult) {
        self.entries.insert(
            url.to_string(),
            Entry {
                stored_at: Instant::now(),
                result,
            },
        );
    }

    /// Drops the entry for `url`. Returns whether there was one.
    pub fn invalidate(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn get_or_load(&mut self, loader: &CatalogLoader, url: &str) -> CatalogResult {
        if let Some(result) = self.get(url) {
            return result;
        }

        let result = loader.load(url).await.map(Arc::new);
        self.insert(url, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;

    fn catalog(url: &str) -> CatalogResult {
        Ok(Arc::new(Catalog::new(url, vec![Channel::new("A", "http://a.test")])))
    }

    #[test]
    fn test_hit_returns_same_catalog() {
        let mut cache = CatalogCache::new(None, None);
        assert!(cache.get("http://x.test/index.m3u").is_none());

        let stored = catalog("http://x.test/index.m3u");
        cache.insert("http://x.test/index.m3u", stored.clone());
        let hit = cache.get("http://x.test/index.m3u").unwrap().unwrap();
        assert!(Arc::ptr_eq(&hit, stored.as_ref().unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_exact_urls() {
        let mut cache = CatalogCache::new(None, None);
        cache.insert("http://x.test/index.m3u", catalog("http://x.test/index.m3u"));
        assert!(cache.get("http://x.test/index.m3u?").is_none());
        assert!(cache.get("HTTP://x.test/index.m3u").is_none());
    }

    #[test]
    fn test_failures_are_cached_and_distinct() {
        let mut cache = CatalogCache::new(None, None);
        let err = FetchError::Status {
            url: "http://down.test".to_string(),
            status: 503,
        };
        cache.insert("http://down.test", Err(err.clone()));
        assert_eq!(cache.get("http://down.test").unwrap().unwrap_err(), err);
    }

    #[test]
    fn test_entries_expire() {
        let mut cache = CatalogCache::new(Some(Duration::from_millis(1)), None);
        cache.insert("http://x.test", catalog("http://x.test"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("http://x.test").is_none());
    }

    #[test]
    fn test_failures_expire_before_successes() {
        let mut cache = CatalogCache::new(Some(Duration::from_secs(3600)), Some(Duration::from_millis(1)));
        cache.insert("http://ok.test", catalog("http://ok.test"));
        cache.insert(
            "http://down.test",
            Err(FetchError::Request {
                url: "http://down.test".to_string(),
                reason: "connection refused".to_string(),
            }),
        );
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("http://down.test").is_none());
        assert!(cache.get("http://ok.test").unwrap().is_ok());
    }

    #[test]
    fn test_invalidate() {
        let mut cache = CatalogCache::new(None, None);
        cache.insert("http://a.test", catalog("http://a.test"));
        cache.insert("http://b.test", catalog("http://b.test"));
        assert!(cache.invalidate("http://a.test"));
        assert!(!cache.invalidate("http://a.test"));
        assert!(cache.get("http://a.test").is_none());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let config = CacheConfig {
            ttl_secs: 0,
            error_ttl_secs: 0,
        };
        assert_eq!(config.ttl(), None);
        assert_eq!(config.error_ttl(), None);
        assert_eq!(CacheConfig::default().ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(CacheConfig::default().error_ttl(), Some(Duration::from_secs(60)));
    }
}
