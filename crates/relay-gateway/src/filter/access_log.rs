//! Access-log filter.
//!
//! Emits one `INCOMING` event per request and one `OUTGOING` (or `ERROR`,
//! for status ≥ 500) event per response, carrying client IP, host, URL,
//! token, method, status and processing time.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::context::{GatewayResponse, RequestContext};
use async_trait::async_trait;
use tracing::{error, info};

#[derive(Default)]
pub struct AccessLogFilter;

impl AccessLogFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for AccessLogFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ACCESS_LOG
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        info!(
            request_id = %ctx.request_id,
            client_ip  = %ctx.client_ip,
            host       = %ctx.host,
            url        = %ctx.path_and_query(),
            token      = ctx.token.as_deref().unwrap_or("none"),
            method     = %ctx.method,
            "INCOMING"
        );
        FilterAction::Continue
    }

    async fn on_response(&self, ctx: &RequestContext, resp: &mut GatewayResponse) {
        let elapsed_ms = u64::try_from(ctx.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        if resp.status.is_server_error() {
            error!(
                request_id   = %ctx.request_id,
                client_ip    = %ctx.client_ip,
                host         = %ctx.host,
                url          = %ctx.path_and_query(),
                status       = resp.status.as_u16(),
                error        = ?resp.error_ref().map(ToString::to_string),
                processed_ms = elapsed_ms,
                "ERROR"
            );
        } else {
            info!(
                request_id   = %ctx.request_id,
                client_ip    = %ctx.client_ip,
                host         = %ctx.host,
                url          = %ctx.path_and_query(),
                status       = resp.status.as_u16(),
                processed_ms = elapsed_ms,
                "OUTGOING"
            );
        }
    }
}
