//! TTL + LRU response cache for prompt and resource calls. Tool calls are
//! never cached -- see [`crate::router`].
//!
//! Backed by an [`IndexMap`], which preserves insertion/access order, so
//! eviction can always drop the entry at the front without a separate
//! recency structure. Mutation is serialized behind a `parking_lot::Mutex`;
//! every operation here is synchronous and short, so there's no need for an
//! async-aware lock.

use crate::config::CacheSettings;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry {
    value: Value,
    created_at: Instant,
}

pub struct Cache {
    entries: Mutex<IndexMap<String, Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl Cache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: settings.capacity,
            ttl: Duration::from_secs(settings.ttl_seconds),
        }
    }

    /// Returns the cached value if present and fresh, moving it to the
    /// most-recently-used end. A stale entry is dropped and treated as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(key).map(|e| e.created_at.elapsed() <= self.ttl)?;
        if !fresh {
            entries.shift_remove(key);
            return None;
        }
        let (_, entry) = entries.shift_remove_entry(key)?;
        let value = entry.value.clone();
        entries.insert(key.to_string(), entry);
        Some(value)
    }

    /// Inserts or replaces `key`, evicting the least-recently-used entry
    /// first if the cache is at capacity.
    pub fn set(&self, key: String, value: Value) {
        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        if entries.len() >= self.capacity && entries.len() > 0 {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(key = %evicted, "evicted cache entry to stay under capacity");
            }
        }
        entries.insert(key, Entry { value, created_at: Instant::now() });
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().shift_remove(key);
    }

    /// Removes every entry belonging to `server`, matching the `prompt:` and
    /// `resource:` key prefixes the router constructs. Called when a server
    /// is unregistered after sustained timeouts.
    pub fn invalidate_server(&self, server: &str) {
        let prompt_prefix = format!("prompt:{server}.");
        let resource_prefix = format!("resource:{server}:");
        let mut entries = self.entries.lock();
        entries.retain(|key, _| !key.starts_with(&prompt_prefix) && !key.starts_with(&resource_prefix));
    }

    /// Drops every expired entry. Invoked periodically by [`spawn_sweeper`].
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.lock().retain(|_, entry| entry.created_at.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Spawns the background sweep task. The returned handle should be aborted
/// on host shutdown.
pub fn spawn_sweeper(cache: Arc<Cache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            cache.sweep();
        }
    })
}
