//! Fixed-window rate-limit filter keyed by client IP.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::context::{GatewayResponse, RequestContext};
use crate::error::GatewayError;
use crate::limiter::RateLimiter;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

const REMAINING_ATTR: &str = "ratelimit.remaining";

pub struct RateLimitFilter {
    limiter: Arc<RateLimiter>,
}

impl RateLimitFilter {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl GatewayFilter for RateLimitFilter {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::RATE_LIMIT
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        match self.limiter.check(&ctx.client_ip).await {
            Ok(decision) => {
                ctx.set_attr(REMAINING_ATTR, &decision.remaining);
                if decision.allowed {
                    return FilterAction::Continue;
                }
                warn!(
                    request_id = %ctx.request_id,
                    client_ip = %ctx.client_ip,
                    host = %ctx.host,
                    token = ctx.token.as_deref().unwrap_or("none"),
                    count = decision.count,
                    limit = decision.limit,
                    "rejected request: rate limit exceeded"
                );
                let reset = decision.reset_after;
                let retry_after_secs = reset.as_secs() + u64::from(reset.subsec_nanos() > 0);
                FilterAction::Reject(GatewayError::RateLimited {
                    client: ctx.client_ip.clone(),
                    retry_after_secs: retry_after_secs.max(1),
                })
            }
            Err(e) => {
                error!(
                    request_id = %ctx.request_id,
                    client_ip = %ctx.client_ip,
                    error = %e,
                    "rate limiter store failed; rejecting request"
                );
                FilterAction::Reject(GatewayError::RateLimiterUnavailable(e.to_string()))
            }
        }
    }

    async fn on_response(&self, ctx: &RequestContext, resp: &mut GatewayResponse) {
        // Only requests that reached the limiter carry a count.
        if let Some(remaining) = ctx.get_attr::<u64>(REMAINING_ATTR) {
            resp.set_header("x-ratelimit-limit", self.limiter.limit().to_string());
            resp.set_header("x-ratelimit-remaining", remaining.to_string());
        }
    }
}
