//! Store contracts consumed by the gateway core.
//!
//! * [`MetadataSource`]: the relational collaborator (routes, channels,
//!   blocklist). Results are treated as read-only snapshots.
//! * [`CounterStore`]: shared atomic counters with per-key expiry, used for
//!   fixed-window rate limiting across gateway instances.
//! * [`CacheStore`]: shared key/value store with per-key TTL for response
//!   payloads.

use crate::blocklist::BlocklistEntry;
use crate::channel::Channel;
use crate::error::StoreResult;
use crate::route::RouteTemplate;
use async_trait::async_trait;
use std::time::Duration;

/// Read access to administratively managed metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// All route templates with `status = active`.
    async fn active_route_templates(&self) -> StoreResult<Vec<RouteTemplate>>;

    /// The active channel whose name equals `name` exactly, if any.
    async fn channel_by_name(&self, name: &str) -> StoreResult<Option<Channel>>;

    /// Every blocklist row, IP and domain alike.
    async fn blocklist_entries(&self) -> StoreResult<Vec<BlocklistEntry>>;
}

/// Counter value after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Post-increment count within the current window.
    pub count: u64,
    /// Time left until the window resets.
    pub expires_in: Duration,
}

/// Atomic windowed counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`. When this is the first increment of a window the key
    /// expires after `window`; later increments leave the expiry untouched.
    /// Must be atomic against concurrent callers on other instances.
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount>;
}

/// Key/value payload cache with per-key TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl`. Expiry is enforced by
    /// the store itself.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;
}
