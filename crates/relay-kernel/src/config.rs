//! Gateway configuration.
//!
//! Configuration is layered with the `config` crate, later sources
//! overriding earlier ones:
//!
//! 1. serde defaults on [`GatewayConfig`],
//! 2. an optional file (`.toml`, `.yaml`/`.yml`, `.json`),
//! 3. environment variables prefixed `RELAY__`, with `__` separating nested
//!    keys (`RELAY__RATE_LIMIT__MAX_CALLS=120`, `RELAY__REDIS_URL=...`).
//!
//! ```rust,ignore
//! use relay_kernel::GatewayConfig;
//!
//! let config = GatewayConfig::load(Some("relay.toml"))?;
//! println!("listening on {}", config.listen_addr);
//! ```

use crate::blocklist::BlocklistEntry;
use crate::channel::Channel;
use crate::error::{ConfigError, ConfigResult};
use crate::route::RouteTemplate;
use config::{Config as Cfg, Environment, File};

pub use config::FileFormat;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per window and client.
    pub max_calls: u64,
    /// Window length in seconds.
    pub period_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 60,
            period_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// A fixed bearer credential and the principal it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticToken {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Credential verification settings. At least one mechanism must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for JWT bearer credentials.
    pub jwt_secret: Option<String>,
    pub static_tokens: Vec<StaticToken>,
}

/// Metadata served by the in-memory source when no `database_url` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMetadata {
    pub channels: Vec<Channel>,
    pub routes: Vec<RouteTemplate>,
    pub blocklist: Vec<BlocklistEntry>,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket address to bind.
    pub listen_addr: String,
    /// Path root every proxied request must sit under, after the channel
    /// prefix.
    pub allowed_prefix: String,
    /// PostgreSQL connection string for routes, channels and blocklist.
    pub database_url: Option<String>,
    /// Redis connection string for rate counters and the response cache.
    pub redis_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub blocklist_refresh_secs: u64,
    /// Maximum age of the route and channel snapshots.
    pub metadata_staleness_secs: u64,
    /// TTL used when a path is accepted without a template-supplied TTL.
    pub default_cache_ttl_secs: u64,
    /// Serve cached payloads before calling the downstream.
    pub read_through_cache: bool,
    pub downstream_timeout_ms: u64,
    /// Canonical channel name that flags a misconfigured channel row.
    pub channel_error_marker: String,
    /// Trusted `Host` patterns; `*.example.com` matches any subdomain.
    /// Empty accepts every host.
    pub allowed_hosts: Vec<String>,
    pub auth: AuthConfig,
    pub static_metadata: StaticMetadata,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            allowed_prefix: "/clients".to_string(),
            database_url: None,
            redis_url: None,
            rate_limit: RateLimitConfig::default(),
            blocklist_refresh_secs: 60,
            metadata_staleness_secs: 30,
            default_cache_ttl_secs: 5,
            read_through_cache: true,
            downstream_timeout_ms: 10_000,
            channel_error_marker: "Error".to_string(),
            allowed_hosts: Vec::new(),
            auth: AuthConfig::default(),
            static_metadata: StaticMetadata::default(),
        }
    }
}

impl GatewayConfig {
    /// Load defaults, then `path` (if any), then `RELAY__*` environment
    /// variables, and validate the result.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = Cfg::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, detect_format(path)?));
        }
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_hosts"),
        );

        let config: GatewayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document held in memory.
    pub fn from_document(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let config: GatewayConfig = Cfg::builder()
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid("listen_addr", e.to_string()))?;
        if !self.allowed_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(
                "allowed_prefix",
                "must start with '/'".to_string(),
            ));
        }
        if self.rate_limit.max_calls == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.max_calls",
                "must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.period_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.period_secs",
                "must be greater than 0".to_string(),
            ));
        }
        if self.blocklist_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "blocklist_refresh_secs",
                "must be greater than 0".to_string(),
            ));
        }
        if self.downstream_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "downstream_timeout_ms",
                "must be greater than 0".to_string(),
            ));
        }
        if self.auth.jwt_secret.as_deref().is_none_or(str::is_empty)
            && self.auth.static_tokens.is_empty()
        {
            return Err(ConfigError::Invalid(
                "auth",
                "set auth.jwt_secret or at least one auth.static_tokens entry".to_string(),
            ));
        }
        Ok(())
    }

    pub fn blocklist_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.blocklist_refresh_secs)
    }

    pub fn metadata_staleness(&self) -> Duration {
        Duration::from_secs(self.metadata_staleness_secs)
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_secs)
    }

    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_millis(self.downstream_timeout_ms)
    }
}

/// Detect the file format from the extension.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::Load(format!("no file extension on '{path}'")))?;

    match ext.to_ascii_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        other => Err(ConfigError::Load(format!("unsupported config format '{other}'"))),
    }
}
