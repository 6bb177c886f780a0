//! `relay-gateway`: Relay channel gateway runtime.
//!
//! This crate provides the concrete implementations of the contracts defined
//! in `relay-kernel` and the request path built from them:
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | Route templates | [`router::RouteRegistry`] over [`router::RouteTable`] |
//! | IP / domain blocklist | [`admission::BlocklistCache`] + [`admission::BlocklistRefresher`] |
//! | Fixed-window rate limit | [`limiter::RateLimiter`] |
//! | Channel authorization | [`channel::ChannelResolver`] |
//! | Response cache | [`cache::ResponseCache`] |
//! | Downstream proxy | [`downstream::DownstreamClient`] |
//! | Credentials | [`auth::ChainAuthenticator`] |
//! | Stores | [`store::PostgresMetadataSource`], [`store::RedisStore`], in-memory fixtures |
//!
//! [`server::GatewayServer`] wires everything together into an axum HTTP
//! service.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use relay_gateway::server::GatewayServer;
//! use relay_kernel::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::load(Some("relay.toml"))?;
//!     GatewayServer::connect(config).await?.start().await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod auth;
pub mod cache;
pub mod channel;
pub mod context;
pub mod dispatcher;
pub mod downstream;
pub mod error;
pub mod filter;
pub mod limiter;
pub mod metrics;
pub mod router;
pub mod server;
pub mod store;

pub use error::{GatewayError, GatewayResult};
