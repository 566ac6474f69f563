//! `src/cache/metadata_cache.rs`
//! ============================================================================
//! # Read-through metadata cache
//!
//! Per-URL [`Metadata`] records backed by a [`MetadataSource`]. Records are
//! partial: each remembers which properties have been loaded, and `get`
//! only goes to the source for entries missing a requested property.
//! Eviction is handled by `moka` with TTL and TTI from [`CacheConfig`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{config::CacheConfig, error::AppError, fs::entry::Entry};

/// Cache key (cheap to clone)
pub type MetadataKey = Arc<str>;

pub const ENCRYPTED_MIME_TYPE: &str = "application/vnd.google-gsuite.encrypted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MetadataProperty {
    Hosted,
    Pinned,
    CanPin,
    CanShare,
    CanDelete,
    CanRename,
    CanAddChildren,
    Shared,
    AvailableOffline,
    ContentMimeType,
    Size,
    ModificationTime,
    AlternateUrl,
    ShareUrl,
}

impl MetadataProperty {
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Properties prefetched for every listed entry.
pub const LIST_PROPERTIES: &[MetadataProperty] = &[
    MetadataProperty::Size,
    MetadataProperty::ModificationTime,
    MetadataProperty::Hosted,
    MetadataProperty::Pinned,
    MetadataProperty::AvailableOffline,
    MetadataProperty::ContentMimeType,
];

/// Properties Drive actions and transfer checks read from the cache.
pub const DRIVE_PROPERTIES: &[MetadataProperty] = &[
    MetadataProperty::Hosted,
    MetadataProperty::Pinned,
    MetadataProperty::CanPin,
    MetadataProperty::CanShare,
    MetadataProperty::CanDelete,
    MetadataProperty::CanAddChildren,
    MetadataProperty::Shared,
    MetadataProperty::AlternateUrl,
    MetadataProperty::ContentMimeType,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub hosted: Option<bool>,
    pub pinned: Option<bool>,
    pub can_pin: Option<bool>,
    pub can_share: Option<bool>,
    pub can_delete: Option<bool>,
    pub can_rename: Option<bool>,
    pub can_add_children: Option<bool>,
    pub shared: Option<bool>,
    pub available_offline: Option<bool>,
    pub content_mime_type: Option<String>,
    pub size: Option<u64>,
    pub modification_time: Option<DateTime<Utc>>,
    pub alternate_url: Option<String>,
    pub share_url: Option<String>,
    loaded: u16,
}

impl Metadata {
    pub fn has(&self, property: MetadataProperty) -> bool {
        self.loaded & property.bit() != 0
    }

    /// Marks every property as loaded, absent values included.
    #[must_use]
    pub fn complete(mut self) -> Self {
        self.loaded = u16::MAX;
        self
    }

    pub fn is_hosted(&self) -> bool {
        self.hosted == Some(true)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned == Some(true)
    }

    pub fn is_encrypted(&self) -> bool {
        self.content_mime_type.as_deref() == Some(ENCRYPTED_MIME_TYPE)
    }

    fn merge_from(&mut self, other: &Self, properties: &[MetadataProperty]) {
        for property in properties {
            match property {
                MetadataProperty::Hosted => self.hosted = other.hosted,
                MetadataProperty::Pinned => self.pinned = other.pinned,
                MetadataProperty::CanPin => self.can_pin = other.can_pin,
                MetadataProperty::CanShare => self.can_share = other.can_share,
                MetadataProperty::CanDelete => self.can_delete = other.can_delete,
                MetadataProperty::CanRename => self.can_rename = other.can_rename,
                MetadataProperty::CanAddChildren => self.can_add_children = other.can_add_children,
                MetadataProperty::Shared => self.shared = other.shared,
                MetadataProperty::AvailableOffline => {
                    self.available_offline = other.available_offline;
                }
                MetadataProperty::ContentMimeType => {
                    self.content_mime_type.clone_from(&other.content_mime_type);
                }
                MetadataProperty::Size => self.size = other.size,
                MetadataProperty::ModificationTime => self.modification_time = other.modification_time,
                MetadataProperty::AlternateUrl => self.alternate_url.clone_from(&other.alternate_url),
                MetadataProperty::ShareUrl => self.share_url.clone_from(&other.share_url),
            }
            self.loaded |= property.bit();
        }
    }
}

/// Where metadata comes from on a cache miss.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// One record per entry, in order.
    async fn fetch(
        &self,
        entries: &[Entry],
        properties: &[MetadataProperty],
    ) -> Result<Vec<Metadata>, AppError>;
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_exceptions: AtomicU64,
    total_load_time_ns: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[expect(clippy::cast_possible_truncation, reason = "load times fit in u64 nanoseconds")]
    fn record_load(&self, duration: Duration, success: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if !success {
            self.load_exceptions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_exceptions: self.load_exceptions.load(Ordering::Relaxed),
            total_load_time: Duration::from_nanos(self.total_load_time_ns.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_exceptions: u64,
    pub total_load_time: Duration,
}

pub struct MetadataCache {
    cache: Cache<MetadataKey, Metadata>,
    source: Arc<dyn MetadataSource>,
    stats: Arc<CacheStats>,
}

impl MetadataCache {
    pub fn new(config: &CacheConfig, source: Arc<dyn MetadataSource>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .time_to_idle(config.tti)
            .build();

        Self {
            cache,
            source,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Records for `entries`, loading from the source where a requested
    /// property is missing. Source failures leave the cached values in place.
    pub async fn get(&self, entries: &[Entry], properties: &[MetadataProperty]) -> Vec<Metadata> {
        let mut results = Vec::with_capacity(entries.len());
        let mut missing = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let cached = self.cache.get(entry.url());
            match cached {
                Some(record) if properties.iter().all(|p| record.has(*p)) => {
                    self.stats.record_hit();
                    results.push(record);
                }
                other => {
                    self.stats.record_miss();
                    results.push(other.unwrap_or_default());
                    if !entry.is_fake() {
                        missing.push(index);
                    }
                }
            }
        }

        if missing.is_empty() {
            return results;
        }

        let to_fetch: Vec<Entry> = missing.iter().map(|&i| entries[i].clone()).collect();
        let start = Instant::now();

        match self.source.fetch(&to_fetch, properties).await {
            Ok(fetched) => {
                self.stats.record_load(start.elapsed(), true);
                for (&index, record) in missing.iter().zip(fetched.iter()) {
                    results[index].merge_from(record, properties);
                    self.cache
                        .insert(MetadataKey::from(entries[index].url()), results[index].clone());
                }
                debug!(count = to_fetch.len(), "Metadata loaded");
            }
            Err(e) => {
                self.stats.record_load(start.elapsed(), false);
                warn!(marker = "METADATA_LOAD_FAILED", error = %e, "Metadata load failed");
            }
        }

        results
    }

    /// Cached records only; never touches the source.
    pub fn get_cache(&self, entries: &[Entry], _properties: &[MetadataProperty]) -> Vec<Metadata> {
        entries
            .iter()
            .map(|entry| self.cache.get(entry.url()).unwrap_or_default())
            .collect()
    }

    pub fn peek_url(&self, url: &str) -> Option<Metadata> {
        self.cache.get(url)
    }

    pub fn insert(&self, entry: &Entry, metadata: Metadata) {
        self.cache.insert(MetadataKey::from(entry.url()), metadata);
    }

    pub fn notify_entries_created(&self, entries: &[Entry]) {
        for entry in entries {
            self.cache.invalidate(entry.url());
        }
    }

    pub fn notify_entries_changed(&self, entries: &[Entry]) {
        for entry in entries {
            self.cache.invalidate(entry.url());
        }
    }

    pub fn notify_entries_removed(&self, urls: &[String]) {
        for url in urls {
            self.cache.invalidate(url.as_str());
        }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("entries", &self.cache.entry_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl MetadataSource for CountingSource {
        async fn fetch(
            &self,
            entries: &[Entry],
            _properties: &[MetadataProperty],
        ) -> Result<Vec<Metadata>, AppError> {
            self.calls.lock().push(entries.len());
            if self.fail {
                return Err(AppError::Other("offline".into()));
            }
            Ok(entries
                .iter()
                .map(|_| Metadata {
                    hosted: Some(true),
                    pinned: Some(false),
                    ..Metadata::default()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_read_through_and_invalidation() {
        let source = Arc::new(CountingSource::default());
        let cache = MetadataCache::new(&CacheConfig::default(), source.clone());
        let a = Entry::file("drive", "/root/a");
        let props = [MetadataProperty::Hosted, MetadataProperty::Pinned];

        let first = cache.get(std::slice::from_ref(&a), &props).await;
        assert!(first[0].is_hosted());
        cache.get(std::slice::from_ref(&a), &props).await;
        assert_eq!(*source.calls.lock(), vec![1]);

        // A property not loaded yet forces another fetch.
        cache.get(std::slice::from_ref(&a), &[MetadataProperty::CanPin]).await;
        assert_eq!(source.calls.lock().len(), 2);

        cache.notify_entries_removed(&[a.url().to_string()]);
        assert!(cache.peek_url(a.url()).is_none());
        assert!(!cache.get_cache(&[a], &props)[0].is_hosted());
    }

    #[tokio::test]
    async fn test_failed_source_yields_defaults() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..CountingSource::default()
        });
        let cache = MetadataCache::new(&CacheConfig::default(), source);
        let a = Entry::file("drive", "/root/a");

        let records = cache.get(&[a], &[MetadataProperty::Hosted]).await;

        assert_eq!(records, vec![Metadata::default()]);
        assert_eq!(cache.stats().load_exceptions, 1);
    }
}
