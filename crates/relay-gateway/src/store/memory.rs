//! In-process store implementations.
//!
//! Used when no database / Redis URL is configured (single-instance
//! deployments, local development) and as fixtures in tests. Time is read
//! from `tokio::time` so paused-clock tests control expiry.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use relay_kernel::{
    BlocklistEntry, CacheStore, Channel, CounterStore, MetadataSource, RouteTemplate,
    StaticMetadata, StoreError, StoreResult, WindowCount,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// [`MetadataSource`] backed by plain collections.
#[derive(Default)]
pub struct InMemoryMetadata {
    routes: RwLock<Vec<RouteTemplate>>,
    channels: RwLock<HashMap<String, Channel>>,
    blocklist: RwLock<Vec<BlocklistEntry>>,
    failure: RwLock<Option<StoreError>>,
    route_queries: AtomicUsize,
    channel_queries: AtomicUsize,
    blocklist_queries: AtomicUsize,
}

impl InMemoryMetadata {
    pub fn from_static(seed: StaticMetadata) -> Self {
        let meta = Self::default();
        for route in seed.routes {
            meta.add_route(route);
        }
        for channel in seed.channels {
            meta.upsert_channel(channel);
        }
        for entry in seed.blocklist {
            meta.add_block(entry);
        }
        meta
    }

    pub fn add_route(&self, route: RouteTemplate) {
        self.routes.write().push(route);
    }

    pub fn upsert_channel(&self, channel: Channel) {
        self.channels.write().insert(channel.name.clone(), channel);
    }

    pub fn remove_channel(&self, name: &str) {
        self.channels.write().remove(name);
    }

    pub fn add_block(&self, entry: BlocklistEntry) {
        let mut blocklist = self.blocklist.write();
        if !blocklist.contains(&entry) {
            blocklist.push(entry);
        }
    }

    pub fn remove_block(&self, entry: &BlocklistEntry) {
        self.blocklist.write().retain(|e| e != entry);
    }

    /// Make every query fail with `err` until called again with `None`.
    pub fn fail_with(&self, err: Option<StoreError>) {
        *self.failure.write() = err;
    }

    pub fn route_queries(&self) -> usize {
        self.route_queries.load(Ordering::Relaxed)
    }

    pub fn channel_queries(&self) -> usize {
        self.channel_queries.load(Ordering::Relaxed)
    }

    pub fn blocklist_queries(&self) -> usize {
        self.blocklist_queries.load(Ordering::Relaxed)
    }

    fn check_failure(&self) -> StoreResult<()> {
        match self.failure.read().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataSource for InMemoryMetadata {
    async fn active_route_templates(&self) -> StoreResult<Vec<RouteTemplate>> {
        self.route_queries.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;
        Ok(self
            .routes
            .read()
            .iter()
            .filter(|r| r.status.is_active())
            .cloned()
            .collect())
    }

    async fn channel_by_name(&self, name: &str) -> StoreResult<Option<Channel>> {
        self.channel_queries.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;
        Ok(self
            .channels
            .read()
            .get(name)
            .filter(|c| c.status.is_active())
            .cloned())
    }

    async fn blocklist_entries(&self) -> StoreResult<Vec<BlocklistEntry>> {
        self.blocklist_queries.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;
        Ok(self.blocklist.read().clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────────────────

struct Window {
    count: u64,
    expires_at: Instant,
}

/// Fixed-window counters held in a [`DashMap`]. Atomic per key within one
/// process; not shared between instances.
#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Window>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired windows to keep memory bounded. Call periodically.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.retain(|_, w| w.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            expires_at: now + window,
        });

        if now >= entry.expires_at {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            expires_in: entry.expires_at.saturating_duration_since(now),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Payload cache held in a [`DashMap`]; expired entries are dropped lazily on
/// read or by [`purge_expired`](Self::purge_expired).
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if hit {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.entries
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }
}
