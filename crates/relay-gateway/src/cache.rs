//! Response cache keyed by channel and request path.

use crate::error::{GatewayError, GatewayResult};
use bytes::Bytes;
use relay_kernel::CacheStore;
use std::sync::Arc;
use std::time::Duration;

/// Thin layer over a [`CacheStore`] fixing the key layout
/// `{channel}:{path}`. Expiry is left to the store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn key(channel: &str, path: &str) -> String {
        format!("{channel}:{path}")
    }

    pub async fn get(&self, channel: &str, path: &str) -> GatewayResult<Option<Bytes>> {
        self.store
            .get(&Self::key(channel, path))
            .await
            .map(|hit| hit.map(Bytes::from))
            .map_err(|e| GatewayError::CacheStore(e.to_string()))
    }

    /// Store `payload` for `ttl`. A zero TTL stores nothing.
    pub async fn put(
        &self,
        channel: &str,
        path: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> GatewayResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.store
            .set_ex(&Self::key(channel, path), payload, ttl)
            .await
            .map_err(|e| GatewayError::CacheStore(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCacheStore;

    #[tokio::test(start_paused = true)]
    async fn put_then_get_until_expiry() {
        let cache = ResponseCache::new(Arc::new(InMemoryCacheStore::new()));
        cache
            .put("acme", "/clients/42", br#"{"id":42}"#, Duration::from_secs(30))
            .await
            .unwrap();

        let hit = cache.get("acme", "/clients/42").await.unwrap();
        assert_eq!(hit.as_deref(), Some(&br#"{"id":42}"#[..]));
        // Keys are per channel.
        assert!(cache.get("other", "/clients/42").await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("acme", "/clients/42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = ResponseCache::new(Arc::clone(&store) as Arc<dyn CacheStore>);
        cache
            .put("acme", "/clients", b"[]", Duration::ZERO)
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            ResponseCache::key("acme", "/clients?page=2"),
            "acme:/clients?page=2"
        );
    }
}
