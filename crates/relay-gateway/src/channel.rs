//! Channel resolution and authorization.

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};
use dashmap::DashMap;
use relay_kernel::{Channel, ChannelInfo, MetadataSource, Principal, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

struct CachedLookup {
    channel: Channel,
    loaded_at: Instant,
}

/// Maps the channel prefix of a request URL to downstream connection data
/// and checks it against the caller's entitlements.
///
/// Found channels are cached per name for at most `max_staleness`; misses
/// always go to the store. A lookup failure with a cached value at hand
/// serves the cached value.
pub struct ChannelResolver {
    source: Arc<dyn MetadataSource>,
    max_staleness: Duration,
    error_marker: String,
    lookups: DashMap<String, CachedLookup>,
}

impl ChannelResolver {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        max_staleness: Duration,
        error_marker: impl Into<String>,
    ) -> Self {
        Self {
            source,
            max_staleness,
            error_marker: error_marker.into(),
            lookups: DashMap::new(),
        }
    }

    /// Resolve `prefix` for `principal`.
    ///
    /// Checks, in order: the channel exists (404), the principal has any
    /// entitlement (401), the record is not the error marker (500), the
    /// canonical name is non-empty (400), the principal is entitled to it
    /// (403), and the canonical name appears in `prefix` (400).
    pub async fn resolve(
        &self,
        prefix: &str,
        principal: &Principal,
        ctx: &RequestContext,
    ) -> GatewayResult<ChannelInfo> {
        let result = self.check(prefix, principal).await;
        if let Err(err) = &result {
            warn!(
                request_id = %ctx.request_id,
                client_ip = %ctx.client_ip,
                host = %ctx.host,
                token = ctx.token.as_deref().unwrap_or("none"),
                prefix = %prefix,
                subject = %principal.subject,
                error = %err,
                "channel check failed"
            );
        }
        result
    }

    async fn check(&self, prefix: &str, principal: &Principal) -> GatewayResult<ChannelInfo> {
        let channel = self
            .lookup(prefix)
            .await?
            .ok_or_else(|| GatewayError::ChannelNotFound(prefix.to_string()))?;

        if principal.channels.is_empty() {
            return Err(GatewayError::NoEntitlement);
        }
        if channel.name == self.error_marker {
            return Err(GatewayError::ChannelMisconfigured(prefix.to_string()));
        }
        if channel.name.is_empty() {
            return Err(GatewayError::ChannelMismatch {
                channel: channel.name,
                prefix: prefix.to_string(),
            });
        }
        if !principal.is_entitled_to(&channel.name) {
            return Err(GatewayError::ChannelForbidden {
                channel: channel.name,
            });
        }
        if !prefix.contains(channel.name.as_str()) {
            return Err(GatewayError::ChannelMismatch {
                channel: channel.name,
                prefix: prefix.to_string(),
            });
        }

        Ok(ChannelInfo::from(&channel))
    }

    async fn lookup(&self, name: &str) -> StoreResult<Option<Channel>> {
        if let Some(cached) = self.lookups.get(name) {
            if cached.loaded_at.elapsed() < self.max_staleness {
                return Ok(Some(cached.channel.clone()));
            }
        }

        match self.source.channel_by_name(name).await {
            Ok(Some(channel)) => {
                self.lookups.insert(
                    name.to_string(),
                    CachedLookup {
                        channel: channel.clone(),
                        loaded_at: Instant::now(),
                    },
                );
                Ok(Some(channel))
            }
            Ok(None) => {
                // Misses are never cached; the prefix comes from the caller.
                self.lookups.remove(name);
                Ok(None)
            }
            Err(e) => match self.lookups.get(name) {
                Some(stale) => {
                    warn!(channel = %name, error = %e, "channel lookup failed; serving stale entry");
                    Ok(Some(stale.channel.clone()))
                }
                None => Err(e),
            },
        }
    }

    /// Drop every cached lookup.
    pub fn invalidate(&self) {
        self.lookups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMetadata;
    use axum::http::{HeaderMap, Method};
    use relay_kernel::StoreError;

    fn ctx() -> RequestContext {
        RequestContext::new("r1", Method::GET, "/acme/clients", None, HeaderMap::new(), None)
    }

    fn setup() -> (Arc<InMemoryMetadata>, ChannelResolver) {
        let meta = Arc::new(InMemoryMetadata::default());
        meta.upsert_channel(Channel::new("acme", "http://core.local/", "key-acme"));
        meta.upsert_channel(Channel::new("other", "http://other.local", "key-other"));
        let resolver = ChannelResolver::new(
            Arc::clone(&meta) as Arc<dyn MetadataSource>,
            Duration::from_secs(30),
            "Error",
        );
        (meta, resolver)
    }

    #[tokio::test]
    async fn entitled_principal_resolves() {
        let (_, resolver) = setup();
        let info = resolver
            .resolve("acme", &Principal::new("u", ["acme"]), &ctx())
            .await
            .unwrap();
        assert_eq!(info.base_url, "http://core.local");
        assert_eq!(info.api_key, "key-acme");
    }

    #[tokio::test]
    async fn failure_order() {
        let (meta, resolver) = setup();
        let acme_only = Principal::new("u", ["acme"]);

        let err = resolver.resolve("nope", &acme_only, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotFound(_)));

        let nobody = Principal::new("u", Vec::<String>::new());
        let err = resolver.resolve("acme", &nobody, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoEntitlement));

        let err = resolver.resolve("other", &acme_only, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ChannelForbidden { .. }));

        // A record whose canonical name is the marker means the row is broken.
        meta.upsert_channel(Channel::new("Error", "http://x", "k"));
        let err = resolver
            .resolve("Error", &Principal::new("u", ["Error"]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelMisconfigured(_)));
    }

    #[tokio::test]
    async fn canonical_name_must_appear_in_prefix() {
        // Found under the prefix but carrying a different canonical name.
        let resolver = ChannelResolver::new(
            Arc::new(Aliased(Channel::new("acme", "http://a", "k"))) as Arc<dyn MetadataSource>,
            Duration::from_secs(30),
            "Error",
        );
        let err = resolver
            .resolve("ac", &Principal::new("u", ["acme"]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelMismatch { .. }));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    struct Aliased(Channel);

    #[async_trait::async_trait]
    impl MetadataSource for Aliased {
        async fn active_route_templates(&self) -> StoreResult<Vec<relay_kernel::RouteTemplate>> {
            Ok(Vec::new())
        }

        async fn channel_by_name(&self, _name: &str) -> StoreResult<Option<Channel>> {
            Ok(Some(self.0.clone()))
        }

        async fn blocklist_entries(&self) -> StoreResult<Vec<relay_kernel::BlocklistEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_are_cached_within_staleness_bound() {
        let (meta, resolver) = setup();
        let p = Principal::new("u", ["acme"]);
        resolver.resolve("acme", &p, &ctx()).await.unwrap();
        resolver.resolve("acme", &p, &ctx()).await.unwrap();
        assert_eq!(meta.channel_queries(), 1);

        meta.remove_channel("acme");
        assert!(resolver.resolve("acme", &p, &ctx()).await.is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        let err = resolver.resolve("acme", &p, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotFound(_)));
        assert_eq!(meta.channel_queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_serves_stale_or_errors() {
        let (meta, resolver) = setup();
        let p = Principal::new("u", ["acme", "other"]);
        resolver.resolve("acme", &p, &ctx()).await.unwrap();

        meta.fail_with(Some(StoreError::Connection("down".into())));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(resolver.resolve("acme", &p, &ctx()).await.is_ok());

        let err = resolver.resolve("other", &p, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Store(_)));
    }

    #[tokio::test]
    async fn unknown_prefixes_do_not_grow_the_cache() {
        let (meta, resolver) = setup();
        let p = Principal::new("u", ["acme"]);
        resolver.resolve("acme", &p, &ctx()).await.unwrap();

        for i in 0..1_000 {
            let err = resolver
                .resolve(&format!("junk{i}"), &p, &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::ChannelNotFound(_)));
        }
        assert_eq!(resolver.lookups.len(), 1);
        assert_eq!(meta.channel_queries(), 1_001);
    }
}
