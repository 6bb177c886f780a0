//! Per-request orchestration after the filter chain.
//!
//! ```text
//! /{channel}/clients/...  ──► prefix check ──► channel ──► route ──► cache? ──► downstream ──► cache write
//! ```

use crate::cache::ResponseCache;
use crate::channel::ChannelResolver;
use crate::context::{CacheStatus, GatewayResponse, RequestContext};
use crate::downstream::DownstreamClient;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::GatewayMetrics;
use crate::router::RouteRegistry;
use axum::http::Method;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Settings the dispatcher needs from the gateway configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub allowed_prefix: String,
    pub default_ttl: Duration,
    pub read_through_cache: bool,
}

pub struct Dispatcher {
    settings: DispatchSettings,
    channels: ChannelResolver,
    routes: RouteRegistry,
    cache: ResponseCache,
    downstream: DownstreamClient,
    metrics: GatewayMetrics,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        channels: ChannelResolver,
        routes: RouteRegistry,
        cache: ResponseCache,
        downstream: DownstreamClient,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            settings,
            channels,
            routes,
            cache,
            downstream,
            metrics,
        }
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn channels(&self) -> &ChannelResolver {
        &self.channels
    }

    /// Serve an authenticated request.
    pub async fn dispatch(&self, ctx: &RequestContext) -> GatewayResult<GatewayResponse> {
        if ctx.method != Method::GET {
            return Err(GatewayError::MethodNotAllowed(ctx.method.to_string()));
        }

        let (prefix, request_path) = split_channel_prefix(&ctx.path)
            .ok_or_else(|| GatewayError::PathNotAllowed(ctx.path.clone()))?;
        if !is_under(request_path, &self.settings.allowed_prefix) {
            return Err(GatewayError::PathNotAllowed(request_path.to_string()));
        }
        // A dot segment would be collapsed by the URL parser into a path no
        // template admits.
        if has_dot_segment(request_path) {
            return Err(GatewayError::RouteNotFound(request_path.to_string()));
        }

        let principal = ctx
            .principal
            .as_ref()
            .ok_or_else(|| GatewayError::Unauthenticated("no principal".to_string()))?;
        let channel = self.channels.resolve(prefix, principal, ctx).await?;

        let route = self
            .routes
            .resolve(request_path)
            .await?
            .ok_or_else(|| GatewayError::RouteNotFound(request_path.to_string()))?;
        let ttl = route.ttl.unwrap_or(self.settings.default_ttl);

        let forwarded = match &ctx.query {
            Some(q) if !q.is_empty() => format!("{request_path}?{q}"),
            _ => request_path.to_string(),
        };

        if self.settings.read_through_cache && !ttl.is_zero() {
            match self.cache.get(prefix, &forwarded).await {
                Ok(Some(body)) => {
                    self.metrics.record_cache_lookup("hit");
                    debug!(request_id = %ctx.request_id, key = %forwarded, "served from cache");
                    return Ok(GatewayResponse::payload(body, CacheStatus::Hit));
                }
                Ok(None) => self.metrics.record_cache_lookup("miss"),
                Err(e) => {
                    self.metrics.record_cache_lookup("error");
                    warn!(request_id = %ctx.request_id, error = %e, "cache read failed");
                }
            }
        }

        let url = channel.downstream_url(&forwarded);
        let started = Instant::now();
        let fetched = self.downstream.fetch(&url, &channel.api_key).await;
        self.metrics.observe_downstream(started.elapsed());
        let body = fetched?;

        if let Err(e) = self.cache.put(prefix, &forwarded, &body, ttl).await {
            warn!(request_id = %ctx.request_id, error = %e, "cache write failed");
        }

        info!(
            request_id = %ctx.request_id,
            client_ip = %ctx.client_ip,
            channel = %channel.name,
            template = %route.template,
            ttl_secs = ttl.as_secs(),
            "data fetched from downstream"
        );
        Ok(GatewayResponse::payload(body, CacheStatus::Miss))
    }
}

/// Split `/{prefix}/{rest}` into `("prefix", "/rest")`.
fn split_channel_prefix(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let slash = trimmed.find('/')?;
    let (prefix, rest) = trimmed.split_at(slash);
    (!prefix.is_empty()).then_some((prefix, rest))
}

/// True when any segment is `.` or `..`, percent-encoded or not.
fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Segment-aware prefix test: `/clients` admits `/clients` and
/// `/clients/...` but not `/clientsfoo`.
fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return true;
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Outcome;
    use crate::store::{InMemoryCacheStore, InMemoryMetadata};
    use axum::http::HeaderMap;
    use relay_kernel::{CacheStore, Channel, MetadataSource, Principal, RouteTemplate};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        dispatcher: Dispatcher,
        cache_store: Arc<InMemoryCacheStore>,
        metrics: GatewayMetrics,
    }

    fn fixture(downstream_uri: &str) -> Fixture {
        let meta = Arc::new(InMemoryMetadata::default());
        meta.upsert_channel(Channel::new("acme", downstream_uri, "key-acme"));
        meta.upsert_channel(Channel::new("other", downstream_uri, "key-other"));
        meta.add_route(RouteTemplate::new("/clients/{client_id}/products", 30));
        meta.add_route(RouteTemplate::new("/clients/{client_id}/orders", 0));
        meta.add_route(RouteTemplate::new("/clients/{client_id}", 10).with_default_ttl());
        let source = meta as Arc<dyn MetadataSource>;

        let cache_store = Arc::new(InMemoryCacheStore::new());
        let metrics = GatewayMetrics::new().unwrap();
        let dispatcher = Dispatcher::new(
            DispatchSettings {
                allowed_prefix: "/clients".into(),
                default_ttl: Duration::from_secs(5),
                read_through_cache: true,
            },
            ChannelResolver::new(Arc::clone(&source), Duration::from_secs(30), "Error"),
            RouteRegistry::new(source, Duration::from_secs(30)),
            ResponseCache::new(Arc::clone(&cache_store) as Arc<dyn CacheStore>),
            DownstreamClient::new(Duration::from_secs(5)).unwrap(),
            metrics.clone(),
        );
        Fixture {
            dispatcher,
            cache_store,
            metrics,
        }
    }

    fn ctx(path: &str, channels: &[&str]) -> RequestContext {
        let mut ctx = RequestContext::new("r1", Method::GET, path, None, HeaderMap::new(), None);
        ctx.principal = Some(Principal::new("u", channels.iter().copied()));
        ctx
    }

    fn body(resp: &GatewayResponse) -> &[u8] {
        match &resp.outcome {
            Outcome::Payload { body, .. } => body,
            Outcome::Error(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn prefix_split_and_root_check() {
        assert_eq!(
            split_channel_prefix("/acme/clients/42"),
            Some(("acme", "/clients/42"))
        );
        assert_eq!(split_channel_prefix("/acme"), None);
        assert_eq!(split_channel_prefix("//clients"), None);

        assert!(is_under("/clients", "/clients"));
        assert!(is_under("/clients/42", "/clients"));
        assert!(!is_under("/clientsfoo", "/clients"));
        assert!(!is_under("/users/1", "/clients"));
        assert!(is_under("/anything", "/"));
    }

    #[test]
    fn dot_segments_are_detected() {
        assert!(has_dot_segment("/clients/.."));
        assert!(has_dot_segment("/clients/./42"));
        assert!(has_dot_segment("/clients/%2e%2E/secret"));
        assert!(has_dot_segment("/clients/.%2e"));
        assert!(!has_dot_segment("/clients/42/products"));
        assert!(!has_dot_segment("/clients/v1.2/..x"));
    }

    #[tokio::test]
    async fn dot_segments_never_reach_downstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        for path in [
            "/acme/clients/..",
            "/acme/clients/%2E%2E",
            "/acme/clients/./products",
            "/acme/clients/../secret",
        ] {
            let err = f
                .dispatcher
                .dispatch(&ctx(path, &["acme"]))
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::RouteNotFound(_)), "{path}: {err:?}");
        }
    }

    #[tokio::test]
    async fn fetches_then_serves_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/clients/42/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":1}]"#))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        let first = f
            .dispatcher
            .dispatch(&ctx("/acme/clients/42/products", &["acme"]))
            .await
            .unwrap();
        assert_eq!(body(&first), br#"[{"id":1}]"#);
        assert!(matches!(
            first.outcome,
            Outcome::Payload {
                cache: CacheStatus::Miss,
                ..
            }
        ));
        assert!(
            f.cache_store
                .get("acme:/clients/42/products")
                .await
                .unwrap()
                .is_some()
        );

        let second = f
            .dispatcher
            .dispatch(&ctx("/acme/clients/42/products", &["acme"]))
            .await
            .unwrap();
        assert_eq!(body(&second), br#"[{"id":1}]"#);
        assert!(matches!(
            second.outcome,
            Outcome::Payload {
                cache: CacheStatus::Hit,
                ..
            }
        ));
        assert_eq!(f.metrics.cache_lookups("hit"), 1);
    }

    #[tokio::test]
    async fn zero_ttl_route_is_never_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/clients/42/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(2)
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        for _ in 0..2 {
            f.dispatcher
                .dispatch(&ctx("/acme/clients/42/orders", &["acme"]))
                .await
                .unwrap();
        }
        assert!(f.cache_store.is_empty());
    }

    #[tokio::test]
    async fn downstream_error_is_relayed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string(r#"{"error":"unavailable"}"#))
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        let err = f
            .dispatcher
            .dispatch(&ctx("/acme/clients/42", &["acme"]))
            .await
            .unwrap_err();
        match err {
            GatewayError::DownstreamHttp { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, r#"{"error":"unavailable"}"#);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(f.cache_store.is_empty());
    }

    #[tokio::test]
    async fn foreign_channel_is_forbidden_before_any_downstream_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        let err = f
            .dispatcher
            .dispatch(&ctx("/other/clients/42/products", &["acme"]))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn path_checks() {
        let f = fixture("http://127.0.0.1:1");

        let err = f
            .dispatcher
            .dispatch(&ctx("/acme/users/1", &["acme"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PathNotAllowed(_)));

        let err = f
            .dispatcher
            .dispatch(&ctx("/acme/clients/42/unknown", &["acme"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound(_)));

        let err = f
            .dispatcher
            .dispatch(&ctx("/nope/clients/42", &["acme"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotFound(_)));

        let mut post = ctx("/acme/clients/42", &["acme"]);
        post.method = Method::POST;
        let err = f.dispatcher.dispatch(&post).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 405);
    }

    #[tokio::test]
    async fn query_string_is_forwarded_and_keyed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/clients/42"))
            .and(wiremock::matchers::query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"page":2}"#))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server.uri());

        let mut c = ctx("/acme/clients/42", &["acme"]);
        c.query = Some("page=2".into());
        f.dispatcher.dispatch(&c).await.unwrap();
        assert!(
            f.cache_store
                .get("acme:/clients/42?page=2")
                .await
                .unwrap()
                .is_some()
        );
    }
}
