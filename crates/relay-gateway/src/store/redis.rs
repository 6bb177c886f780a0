//! Redis-backed counter and cache store.
//!
//! One [`ConnectionManager`] serves both concerns; it is cheap to clone and
//! reconnects on its own after connection loss.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use relay_kernel::{CacheStore, CounterStore, StoreError, StoreResult, WindowCount};
use std::time::Duration;
use tracing::info;

/// Increment and start the window on first use, in one round trip.
///
/// The `PTTL == -1` branch re-arms a key that lost its expiry (e.g. written
/// by hand), which would otherwise never reset.
const FIXED_WINDOW_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

pub struct RedisStore {
    conn: ConnectionManager,
    window_script: redis::Script,
}

impl RedisStore {
    /// Connect to `redis_url` (`redis://` or `rediss://`).
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(tls = redis_url.starts_with("rediss://"), "connected to Redis");
        Ok(Self {
            conn,
            window_script: redis::Script::new(FIXED_WINDOW_SCRIPT),
        })
    }
}

fn query_err(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Query(e.to_string())
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        let mut conn = self.conn.clone();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let (count, ttl_ms): (u64, i64) = self
            .window_script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(query_err)?;

        Ok(WindowCount {
            count,
            expires_in: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(query_err)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(query_err)
    }
}
