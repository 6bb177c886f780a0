//! Blocklist admission filter.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::admission::BlocklistCache;
use crate::context::RequestContext;
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Rejects requests whose client IP or `Host` domain is blocked. Runs before
/// authentication.
pub struct AdmissionFilter {
    blocklist: Arc<BlocklistCache>,
}

impl AdmissionFilter {
    pub fn new(blocklist: Arc<BlocklistCache>) -> Self {
        Self { blocklist }
    }

    fn denial(&self, ctx: &RequestContext) -> Option<&'static str> {
        if self.blocklist.is_ip_blocked(&ctx.client_ip) {
            Some("blocked IP")
        } else if self.blocklist.is_domain_blocked(&ctx.host) {
            Some("blocked domain")
        } else {
            None
        }
    }
}

#[async_trait]
impl GatewayFilter for AdmissionFilter {
    fn name(&self) -> &str {
        "admission"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ADMISSION
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        let Some(reason) = self.denial(ctx) else {
            return FilterAction::Continue;
        };
        warn!(
            request_id = %ctx.request_id,
            client_ip = %ctx.client_ip,
            host = %ctx.host,
            token = ctx.token.as_deref().unwrap_or("none"),
            check = reason,
            "rejected request: admission denied"
        );
        FilterAction::Reject(GatewayError::AdmissionDenied(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use relay_kernel::BlocklistEntry;

    fn ctx(xff: &'static str, host: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(xff));
        headers.insert("host", HeaderValue::from_static(host));
        RequestContext::new("r1", Method::GET, "/acme/clients", None, headers, None)
    }

    #[tokio::test]
    async fn blocked_ip_and_domain_are_denied() {
        let cache = Arc::new(BlocklistCache::new());
        cache.replace(&[
            BlocklistEntry::ip("203.0.113.7"),
            BlocklistEntry::domain("bad.example.com"),
        ]);
        let filter = AdmissionFilter::new(cache);

        let mut blocked_ip = ctx("203.0.113.7, 10.0.0.1", "api.example.com");
        assert!(matches!(
            filter.on_request(&mut blocked_ip).await,
            FilterAction::Reject(GatewayError::AdmissionDenied(_))
        ));

        let mut blocked_host = ctx("198.51.100.1", "Bad.Example.com:8000");
        assert!(matches!(
            filter.on_request(&mut blocked_host).await,
            FilterAction::Reject(GatewayError::AdmissionDenied(_))
        ));

        let mut fine = ctx("198.51.100.1", "api.example.com");
        assert!(matches!(filter.on_request(&mut fine).await, FilterAction::Continue));
    }
}
