//! Relay channel gateway entry point.
//!
//! Loads the layered configuration and starts the axum-based HTTP gateway.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RELAY_CONFIG` | *(none)* | Config file path, used when no argument is given. |
//! | `RELAY_LOG_FORMAT` | `text` | `json` switches to one JSON object per line. |
//! | `RUST_LOG` | `relay_gateway=info,relay_kernel=info` | Log filter directives. |
//! | `RELAY__*` | *(none)* | Overrides for any config key, e.g. `RELAY__REDIS_URL`. |

use relay_gateway::server::GatewayServer;
use relay_kernel::GatewayConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RELAY_CONFIG").ok());

    let config = match GatewayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        listen_addr = %config.listen_addr,
        allowed_prefix = %config.allowed_prefix,
        postgres = config.database_url.is_some(),
        redis = config.redis_url.is_some(),
        max_calls = config.rate_limit.max_calls,
        period_secs = config.rate_limit.period_secs,
        "relay gateway configuration loaded"
    );

    let server = match GatewayServer::connect(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Gateway startup error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay_gateway=info,relay_kernel=info"));
    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
