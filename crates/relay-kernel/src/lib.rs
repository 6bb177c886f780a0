//! `relay-kernel`: contracts for the Relay channel gateway.
//!
//! This crate holds the *types and trait interfaces* shared by the gateway
//! runtime and its collaborators. Concrete implementations (Redis, PostgreSQL,
//! JWT, in-memory fixtures) live in `relay-gateway`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              relay-kernel  (this crate)                     │
//! │  RouteTemplate  Channel  BlocklistEntry  Principal          │
//! │  MetadataSource  CounterStore  CacheStore  Authenticator    │
//! │  GatewayConfig + load()/validate()                          │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              relay-gateway  (runtime crate)                 │
//! │  RouteRegistry  BlocklistCache  RateLimiter                 │
//! │  ChannelResolver  ResponseCache  Dispatcher                 │
//! │  GatewayServer  (axum HTTP server)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod blocklist;
pub mod channel;
pub mod config;
pub mod error;
pub mod route;
pub mod store;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use auth::{Authenticator, Principal};
pub use blocklist::{BlockKind, BlocklistEntry};
pub use channel::{Channel, ChannelInfo};
pub use self::config::{AuthConfig, GatewayConfig, RateLimitConfig, StaticMetadata, StaticToken};
pub use error::{AuthError, ConfigError, ConfigResult, StoreError, StoreResult};
pub use route::{RecordStatus, RouteTemplate};
pub use store::{CacheStore, CounterStore, MetadataSource, WindowCount};
