//! Record cache with versioned entries and change notification.
//!
//! This module provides the shared store that both the read aggregator and
//! the mutation controller write into. Entries live in a Moka cache, keyed by
//! `(resource, id)`, so memory stays bounded and every entry expires
//! `cache_time` after its last write.
//!
//! # Versions
//!
//! Every write stamps the entry with a version taken from one monotonic
//! counter. A mutation remembers the version it wrote; rolling back or
//! reconciling only succeeds while the entry still carries that version, so a
//! later mutation on the same key is never clobbered and no other key is ever
//! touched.
//!
//! # Bookkeeping
//!
//! Besides values the cache tracks, per key:
//! - whether a provider call for it is outstanding (`is_fetching`)
//! - whether it was explicitly invalidated or is older than a stale time
//!
//! Query observers derive `is_loading` / `is_fetching` from these flags.
//!
//! # Example
//!
//! ```rust,ignore
//! use dataloom_core::cache::{CacheKey, RecordCache, RecordCacheConfig};
//! use dataloom_provider::Record;
//!
//! let cache = RecordCache::new(RecordCacheConfig::default());
//! let key = CacheKey::new("posts", 1);
//! cache.insert(key.clone(), Record::new(1).with_field("title", "Hello"));
//!
//! assert!(cache.get(&key).is_some());
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use dataloom_provider::{Identifier, Record};

use crate::error::{CoreError, CoreResult};

/// Configuration for the record cache.
#[derive(Debug, Clone)]
pub struct RecordCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// How long an entry lives after its last write (time-to-live).
    pub cache_time: Duration,
    /// Buffer size of the change event channel.
    pub event_capacity: usize,
}

impl Default for RecordCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
            cache_time: Duration::from_secs(300),
            event_capacity: 1024,
        }
    }
}

impl RecordCacheConfig {
    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets how long an entry lives after its last write.
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }
}

/// Cache key: one record of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The resource name (e.g., "posts").
    pub resource: String,
    /// The record identifier.
    pub id: Identifier,
}

impl CacheKey {
    /// Creates a new cache key.
    pub fn new(resource: impl Into<String>, id: impl Into<Identifier>) -> Self {
        Self {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource, self.id)
    }
}

/// A cached record with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub record: Record,
    /// Version stamped by the write that produced this entry.
    pub version: u64,
    /// When the record was last written.
    pub updated_at: Instant,
    /// Set by `invalidate`; cleared by the next write.
    pub invalidated: bool,
}

/// Change notification sent to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Updated { key: CacheKey, version: u64 },
    Removed { key: CacheKey },
    Invalidated { key: CacheKey },
}

/// The state of one key before a mutation touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: CacheKey,
    pub previous: Option<CacheEntry>,
}

impl Snapshot {
    /// The record the key held, if any.
    pub fn record(&self) -> Option<&Record> {
        self.previous.as_ref().map(|entry| &entry.record)
    }
}

/// Shared record store.
///
/// # Thread Safety
///
/// Reads are lock-free. Writes take a short write lock so version checks and
/// the write they guard are atomic with respect to each other.
pub struct RecordCache {
    /// The underlying Moka cache storing entries.
    entries: Cache<CacheKey, CacheEntry>,
    /// Configuration for this cache instance.
    config: RecordCacheConfig,
    /// Secondary index: resource -> ids ever written, for resource invalidation.
    by_resource: DashMap<String, HashSet<Identifier>>,
    /// Outstanding provider calls per key.
    fetching: DashMap<CacheKey, usize>,
    next_version: AtomicU64,
    write_lock: Mutex<()>,
    events: broadcast::Sender<CacheEvent>,
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("config", &self.config)
            .field("entry_count", &self.entries.entry_count())
            .field("resource_index_size", &self.by_resource.len())
            .field("fetching", &self.fetching.len())
            .finish()
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new(RecordCacheConfig::default())
    }
}

impl RecordCache {
    /// Creates a new record cache with the given configuration.
    pub fn new(config: RecordCacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.cache_time)
            .build();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            entries,
            config,
            by_resource: DashMap::new(),
            fetching: DashMap::new(),
            next_version: AtomicU64::new(1),
            write_lock: Mutex::new(()),
            events,
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &RecordCacheConfig {
        &self.config
    }

    /// Retrieves a cached record.
    ///
    /// # Metrics
    ///
    /// Records cache hit/miss to:
    /// - `dataloom_cache_hits_total` - Incremented on cache hit
    /// - `dataloom_cache_misses_total` - Incremented on cache miss
    pub fn get(&self, key: &CacheKey) -> Option<Record> {
        let result = self.entries.get(key).map(|entry| entry.record);
        if result.is_some() {
            metrics::counter!("dataloom_cache_hits_total").increment(1);
        } else {
            metrics::counter!("dataloom_cache_misses_total").increment(1);
        }
        result
    }

    /// Retrieves a cached entry with its bookkeeping.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key)
    }

    /// Returns the current version of a key.
    pub fn version(&self, key: &CacheKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.version)
    }

    /// Returns whether a key holds a value.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Retrieves several records of one resource, in the given order.
    pub fn get_many(&self, resource: &str, ids: &[Identifier]) -> Vec<Option<Record>> {
        ids.iter()
            .map(|id| self.get(&CacheKey::new(resource, id.clone())))
            .collect()
    }

    /// Writes a record and returns the version it was stamped with.
    pub fn insert(&self, key: CacheKey, record: Record) -> u64 {
        let _guard = self.write_lock.lock();
        self.put_locked(key, record, Instant::now())
    }

    /// Removes a key.
    pub fn remove(&self, key: &CacheKey) {
        let _guard = self.write_lock.lock();
        self.remove_locked(key);
    }

    /// Captures the current state of a key for later rollback.
    pub fn snapshot(&self, key: &CacheKey) -> Snapshot {
        Snapshot {
            key: key.clone(),
            previous: self.entries.get(key),
        }
    }

    /// Restores a snapshot, provided the key still carries `expected_version`.
    ///
    /// The restored record keeps its original `updated_at`, so a rolled back
    /// entry is exactly as fresh as it was before the mutation. An
    /// invalidation of the entry being replaced carries over to the restored
    /// one. When the key was rewritten in between, nothing is changed and
    /// [`CoreError::RollbackConflict`] is returned.
    pub fn restore(&self, snapshot: &Snapshot, expected_version: u64) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let current = self.entries.get(&snapshot.key);
        let found = current.as_ref().map(|entry| entry.version);
        if found != Some(expected_version) {
            return Err(CoreError::RollbackConflict {
                resource: snapshot.key.resource.clone(),
                id: snapshot.key.id.to_string(),
                expected: expected_version,
                found,
            });
        }
        let was_invalidated = current.is_some_and(|entry| entry.invalidated);

        match &snapshot.previous {
            Some(previous) => {
                self.put_locked(
                    snapshot.key.clone(),
                    previous.record.clone(),
                    previous.updated_at,
                );
                if was_invalidated || previous.invalidated {
                    self.invalidate_locked(&snapshot.key);
                }
            }
            None => self.remove_locked(&snapshot.key),
        }
        Ok(())
    }

    /// Writes a record only if the key still carries `expected_version`.
    pub fn replace_if_version(
        &self,
        key: CacheKey,
        record: Record,
        expected_version: u64,
    ) -> CoreResult<u64> {
        let _guard = self.write_lock.lock();
        let found = self.entries.get(&key).map(|entry| entry.version);
        if found != Some(expected_version) {
            return Err(CoreError::StaleWrite {
                resource: key.resource,
                id: key.id.to_string(),
                expected: expected_version,
                found,
            });
        }
        Ok(self.put_locked(key, record, Instant::now()))
    }

    /// Returns whether a key needs refetching.
    ///
    /// Missing and invalidated entries are always stale; with a zero
    /// `stale_time` every entry is.
    pub fn is_stale(&self, key: &CacheKey, stale_time: Duration) -> bool {
        match self.entries.get(key) {
            Some(entry) => entry.invalidated || entry.updated_at.elapsed() >= stale_time,
            None => true,
        }
    }

    /// Marks a key stale without dropping its value.
    pub fn invalidate(&self, key: &CacheKey) {
        let _guard = self.write_lock.lock();
        self.invalidate_locked(key);
    }

    /// Marks every cached record of a resource stale.
    ///
    /// Uses the secondary index for O(K) where K is ids written for this
    /// resource. Ids that aged out of the cache are pruned from the index.
    pub fn invalidate_resource(&self, resource: &str) {
        let _guard = self.write_lock.lock();
        let ids: Vec<Identifier> = match self.by_resource.get(resource) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return,
        };

        let mut pruned = Vec::new();
        for id in ids {
            let key = CacheKey::new(resource, id.clone());
            if self.entries.contains_key(&key) {
                self.invalidate_locked(&key);
            } else {
                pruned.push(id);
            }
        }
        if let Some(mut index) = self.by_resource.get_mut(resource) {
            for id in &pruned {
                index.remove(id);
            }
        }
        debug!(resource = %resource, pruned = pruned.len(), "invalidated resource");
    }

    /// Marks keys as having an outstanding provider call.
    pub fn begin_fetch(&self, keys: &[CacheKey]) {
        for key in keys {
            *self.fetching.entry(key.clone()).or_insert(0) += 1;
        }
    }

    /// Clears one outstanding call per key.
    pub fn end_fetch(&self, keys: &[CacheKey]) {
        for key in keys {
            let done = match self.fetching.get_mut(key) {
                Some(mut count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if done {
                self.fetching.remove_if(key, |_, count| *count == 0);
            }
        }
    }

    /// Returns whether a provider call for the key is outstanding.
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.fetching.contains_key(key)
    }

    /// Subscribes to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Runs pending maintenance tasks (evictions, counters).
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    fn put_locked(&self, key: CacheKey, record: Record, updated_at: Instant) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.by_resource
            .entry(key.resource.clone())
            .or_default()
            .insert(key.id.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                record,
                version,
                updated_at,
                invalidated: false,
            },
        );
        let _ = self.events.send(CacheEvent::Updated { key, version });
        version
    }

    fn remove_locked(&self, key: &CacheKey) {
        if let Some(mut index) = self.by_resource.get_mut(&key.resource) {
            index.remove(&key.id);
        }
        if self.entries.remove(key).is_some() {
            let _ = self.events.send(CacheEvent::Removed { key: key.clone() });
        }
    }

    fn invalidate_locked(&self, key: &CacheKey) {
        if let Some(mut entry) = self.entries.get(key) {
            entry.invalidated = true;
            self.entries.insert(key.clone(), entry);
            let _ = self
                .events
                .send(CacheEvent::Invalidated { key: key.clone() });
        }
    }
}

/// Registers record cache metrics descriptions.
///
/// Call this function once during application startup to register metric
/// descriptions with the metrics recorder.
///
/// # Metrics Registered
///
/// - `dataloom_cache_hits_total` - Total number of record cache hits
/// - `dataloom_cache_misses_total` - Total number of record cache misses
pub fn register_record_cache_metrics() {
    metrics::describe_counter!(
        "dataloom_cache_hits_total",
        "Total number of record cache hits"
    );
    metrics::describe_counter!(
        "dataloom_cache_misses_total",
        "Total number of record cache misses"
    );
}
