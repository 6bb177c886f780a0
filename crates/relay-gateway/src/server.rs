//! Axum HTTP server.
//!
//! [`GatewayServer`] wires the stores, filter pipeline and dispatcher into a
//! running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, `200 OK` unless the client is blocklisted. |
//! | `GET`  | `/metrics` | Prometheus text exposition, behind the same admission check. |
//! | `GET`  | `/{channel}/clients/...` | Gateway path (any other method ⇒ `405`). |

use crate::admission::{BlocklistCache, BlocklistRefresher};
use crate::auth::ChainAuthenticator;
use crate::cache::ResponseCache;
use crate::channel::ChannelResolver;
use crate::context::{GatewayResponse, RequestContext};
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::downstream::DownstreamClient;
use crate::error::GatewayError;
use crate::filter::{
    AccessLogFilter, AdmissionFilter, AuthFilter, FilterAction, FilterPipeline, GatewayFilter,
    RateLimitFilter, TrustedHostFilter,
};
use crate::limiter::RateLimiter;
use crate::metrics::{GatewayMetrics, MetricsError};
use crate::router::RouteRegistry;
use crate::store::{
    InMemoryCacheStore, InMemoryCounterStore, InMemoryMetadata, PostgresMetadataSource,
    RedisStore,
};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use relay_kernel::{
    Authenticator, CacheStore, CounterStore, GatewayConfig, MetadataSource, StoreError,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

const PG_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("invalid listen address '{0}'")]
    ListenAddr(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// External collaborators the gateway runs against.
#[derive(Clone)]
pub struct GatewayServices {
    pub metadata: Arc<dyn MetadataSource>,
    pub counters: Arc<dyn CounterStore>,
    pub cache: Arc<dyn CacheStore>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl GatewayServices {
    /// In-process stores seeded from `config.static_metadata`.
    pub fn in_memory(config: &GatewayConfig) -> Self {
        Self {
            metadata: Arc::new(InMemoryMetadata::from_static(config.static_metadata.clone())),
            counters: Arc::new(InMemoryCounterStore::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
            authenticator: Arc::new(ChainAuthenticator::from_config(&config.auth)),
        }
    }
}

/// In-process stores that need periodic sweeping of expired keys.
struct LocalStores {
    counters: Arc<InMemoryCounterStore>,
    cache: Arc<InMemoryCacheStore>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`].
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<FilterPipeline>,
    /// Admission only; guards `/health` and `/metrics`.
    ops_pipeline: Arc<FilterPipeline>,
    dispatcher: Arc<Dispatcher>,
    metrics: GatewayMetrics,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
    blocklist: Arc<BlocklistCache>,
    refresher: Arc<BlocklistRefresher>,
    local: Option<LocalStores>,
}

impl GatewayServer {
    /// Connect to the stores named in `config`: PostgreSQL when
    /// `database_url` is set (static metadata otherwise) and Redis when
    /// `redis_url` is set (in-process counters and cache otherwise).
    pub async fn connect(config: GatewayConfig) -> Result<Self, ServerError> {
        let metadata: Arc<dyn MetadataSource> = match &config.database_url {
            Some(url) => {
                let source = PostgresMetadataSource::connect(url, PG_MAX_CONNECTIONS).await?;
                info!("using PostgreSQL metadata source");
                Arc::new(source)
            }
            None => {
                warn!("no database_url configured; serving static metadata");
                Arc::new(InMemoryMetadata::from_static(config.static_metadata.clone()))
            }
        };

        let mut local = None;
        let (counters, cache): (Arc<dyn CounterStore>, Arc<dyn CacheStore>) =
            match &config.redis_url {
                Some(url) => {
                    let redis = Arc::new(RedisStore::connect(url).await?);
                    let counters: Arc<dyn CounterStore> = redis.clone();
                    (counters, redis as Arc<dyn CacheStore>)
                }
                None => {
                    warn!("no redis_url configured; rate limits and cache are per instance");
                    let counters = Arc::new(InMemoryCounterStore::new());
                    let cache = Arc::new(InMemoryCacheStore::new());
                    local = Some(LocalStores {
                        counters: Arc::clone(&counters),
                        cache: Arc::clone(&cache),
                    });
                    (counters as Arc<dyn CounterStore>, cache as Arc<dyn CacheStore>)
                }
            };

        let authenticator = Arc::new(ChainAuthenticator::from_config(&config.auth));
        let services = GatewayServices {
            metadata,
            counters,
            cache,
            authenticator,
        };
        let mut server = Self::with_services(config, services)?;
        server.local = local;
        Ok(server)
    }

    /// Build a server around caller-supplied collaborators.
    pub fn with_services(
        config: GatewayConfig,
        services: GatewayServices,
    ) -> Result<Self, ServerError> {
        let metrics = GatewayMetrics::new()?;
        let blocklist = Arc::new(BlocklistCache::new());
        let refresher = Arc::new(
            BlocklistRefresher::new(
                Arc::clone(&services.metadata),
                Arc::clone(&blocklist),
                config.blocklist_refresh_interval(),
            )
            .with_metrics(metrics.clone()),
        );

        let mut filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(AccessLogFilter::new()),
            Arc::new(AdmissionFilter::new(Arc::clone(&blocklist))),
            Arc::new(AuthFilter::new(services.authenticator)),
            Arc::new(RateLimitFilter::new(Arc::new(RateLimiter::new(
                services.counters,
                config.rate_limit.clone(),
            )))),
        ];
        if !config.allowed_hosts.is_empty() {
            filters.push(Arc::new(TrustedHostFilter::new(&config.allowed_hosts)));
        }
        let pipeline = FilterPipeline::new(filters);
        let ops_pipeline = FilterPipeline::new(vec![
            Arc::new(AdmissionFilter::new(Arc::clone(&blocklist))) as Arc<dyn GatewayFilter>,
        ]);

        let dispatcher = Dispatcher::new(
            DispatchSettings {
                allowed_prefix: config.allowed_prefix.clone(),
                default_ttl: config.default_cache_ttl(),
                read_through_cache: config.read_through_cache,
            },
            ChannelResolver::new(
                Arc::clone(&services.metadata),
                config.metadata_staleness(),
                config.channel_error_marker.clone(),
            ),
            RouteRegistry::new(services.metadata, config.metadata_staleness()),
            ResponseCache::new(services.cache),
            DownstreamClient::new(config.downstream_timeout())?,
            metrics.clone(),
        );

        info!(filters = ?pipeline.names(), "gateway pipeline assembled");

        Ok(Self {
            config,
            state: AppState {
                pipeline: Arc::new(pipeline),
                ops_pipeline: Arc::new(ops_pipeline),
                dispatcher: Arc::new(dispatcher),
                metrics,
            },
            blocklist,
            refresher,
            local: None,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn blocklist(&self) -> &Arc<BlocklistCache> {
        &self.blocklist
    }

    pub fn refresher(&self) -> &Arc<BlocklistRefresher> {
        &self.refresher
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.state.metrics
    }

    /// The axum [`Router`]. Call [`start`](Self::start) to bind and serve.
    pub fn build_app(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(gateway_handler)
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start the blocklist refresher, bind `listen_addr` and serve until
    /// Ctrl-C or SIGTERM.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|_| ServerError::ListenAddr(self.config.listen_addr.clone()))?;

        let app = self.build_app();
        let mut background = vec![Arc::clone(&self.refresher).spawn()];
        if let Some(local) = &self.local {
            background.push(spawn_sweeper(local, self.config.rate_limit.period()));
        }

        info!(addr = %addr, "relay gateway starting");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        for handle in background {
            handle.abort();
        }
        info!("relay gateway stopped");
        served.map_err(ServerError::from)
    }
}

fn spawn_sweeper(local: &LocalStores, every: std::time::Duration) -> JoinHandle<()> {
    let counters = Arc::clone(&local.counters);
    let cache = Arc::clone(&local.cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            counters.purge_expired();
            cache.purge_expired();
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>, request: Request) -> Response {
    if let Err(rejected) = admit_operational(&state, request).await {
        return rejected;
    }
    Json(json!({ "status": "ok", "service": "relay-gateway" })).into_response()
}

/// `GET /metrics`: Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<AppState>, request: Request) -> Response {
    if let Err(rejected) = admit_operational(&state, request).await {
        return rejected;
    }
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Run the operational pipeline (admission only) in front of `/health` and
/// `/metrics`.
async fn admit_operational(state: &AppState, request: Request) -> Result<(), Response> {
    let mut ctx = request_context(request);
    match state.ops_pipeline.run_request(&mut ctx).await {
        FilterAction::Continue => Ok(()),
        FilterAction::Reject(err) => Err(GatewayResponse::error(err).into_response()),
    }
}

/// Every other path: filter chain, then the dispatcher, then the response
/// hooks.
async fn gateway_handler(State(state): State<AppState>, request: Request) -> Response {
    let mut ctx = request_context(request);

    let mut resp = match state.pipeline.run_request(&mut ctx).await {
        FilterAction::Reject(err) => GatewayResponse::error(err),
        FilterAction::Continue => state
            .dispatcher
            .dispatch(&ctx)
            .await
            .unwrap_or_else(GatewayResponse::error),
    };

    state.pipeline.run_response(&ctx, &mut resp).await;
    state.metrics.record_response(resp.status.as_u16());
    resp.into_response()
}

fn request_context(request: Request) -> RequestContext {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, _body) = request.into_parts();

    RequestContext::new(
        Uuid::new_v4().to_string(),
        parts.method,
        parts.uri.path(),
        parts.uri.query().map(str::to_string),
        parts.headers,
        peer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use relay_kernel::{RouteTemplate, StaticToken};
    use tower::ServiceExt;

    fn config(hosts: &[&str]) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.allowed_hosts = hosts.iter().map(|h| h.to_string()).collect();
        config.auth.static_tokens.push(StaticToken {
            token: "t".to_string(),
            subject: "s".to_string(),
            channels: vec!["acme".to_string()],
        });
        config
            .static_metadata
            .routes
            .push(RouteTemplate::new("/clients/{id}", 10));
        config
    }

    fn server(config: GatewayConfig) -> GatewayServer {
        let services = GatewayServices::in_memory(&config);
        GatewayServer::with_services(config, services).unwrap()
    }

    #[test]
    fn trusted_host_filter_only_with_configured_hosts() {
        let open = server(config(&[]));
        assert_eq!(
            open.state.pipeline.names(),
            vec!["access-log", "admission", "auth", "rate-limit"]
        );

        let guarded = server(config(&["*.example.com"]));
        assert_eq!(
            guarded.state.pipeline.names(),
            vec!["access-log", "trusted-host", "admission", "auth", "rate-limit"]
        );
    }

    #[tokio::test]
    async fn untrusted_host_is_rejected_before_auth() {
        let app = server(config(&["*.example.com"])).build_app();
        let req = HttpRequest::get("/acme/clients/1")
            .header("host", "evil.test")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn peer_address_from_connect_info_is_the_client_ip() {
        let server = server(config(&[]));
        server.blocklist().replace(&[relay_kernel::BlocklistEntry::ip("192.0.2.10")]);
        let app = server.build_app();

        let mut req = HttpRequest::get("/acme/clients/1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.10:40000".parse::<SocketAddr>().unwrap()));

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn blocked_client_cannot_read_operational_endpoints() {
        let server = server(config(&[]));
        server.blocklist().replace(&[relay_kernel::BlocklistEntry::ip("192.0.2.10")]);
        let app = server.build_app();

        for path in ["/metrics", "/health"] {
            let mut blocked = HttpRequest::get(path).body(Body::empty()).unwrap();
            blocked
                .extensions_mut()
                .insert(ConnectInfo("192.0.2.10:40000".parse::<SocketAddr>().unwrap()));
            let resp = app.clone().oneshot(blocked).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");

            let mut allowed = HttpRequest::get(path).body(Body::empty()).unwrap();
            allowed
                .extensions_mut()
                .insert(ConnectInfo("192.0.2.11:40000".parse::<SocketAddr>().unwrap()));
            let resp = app.clone().oneshot(allowed).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
        }
    }
}
