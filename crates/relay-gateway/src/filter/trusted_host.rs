//! Trusted `Host` header filter.
//!
//! Patterns are exact host names or `*.domain` wildcards matching any
//! subdomain of `domain` (not `domain` itself). Comparison ignores case and
//! port.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::admission::normalize_host;
use crate::context::RequestContext;
use crate::error::GatewayError;
use async_trait::async_trait;
use tracing::warn;

enum HostPattern {
    Exact(String),
    Suffix(String),
}

pub struct TrustedHostFilter {
    patterns: Vec<HostPattern>,
}

impl TrustedHostFilter {
    pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref().trim().to_ascii_lowercase();
                match p.strip_prefix("*.") {
                    Some(domain) => HostPattern::Suffix(format!(".{domain}")),
                    None => HostPattern::Exact(p),
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_trusted(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.patterns.iter().any(|p| match p {
            HostPattern::Exact(name) => *name == host,
            HostPattern::Suffix(suffix) => {
                host.len() > suffix.len() && host.ends_with(suffix.as_str())
            }
        })
    }
}

#[async_trait]
impl GatewayFilter for TrustedHostFilter {
    fn name(&self) -> &str {
        "trusted-host"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::TRUSTED_HOST
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        if self.is_trusted(&ctx.host) {
            return FilterAction::Continue;
        }
        warn!(
            request_id = %ctx.request_id,
            client_ip = %ctx.client_ip,
            host = %ctx.host,
            token = ctx.token.as_deref().unwrap_or("none"),
            "rejected request: untrusted host"
        );
        FilterAction::Reject(GatewayError::UntrustedHost(ctx.host.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_patterns() {
        let filter = TrustedHostFilter::new(["api.example.com", "*.tenant.io"]);
        assert!(filter.is_trusted("api.example.com"));
        assert!(filter.is_trusted("API.example.com:8000"));
        assert!(filter.is_trusted("acme.tenant.io"));
        assert!(!filter.is_trusted("tenant.io"));
        assert!(!filter.is_trusted("eviltenant.io"));
        assert!(!filter.is_trusted("example.com"));
    }

    #[tokio::test]
    async fn untrusted_host_is_rejected() {
        use axum::http::{HeaderMap, HeaderValue, Method};

        let filter = TrustedHostFilter::new(["api.example.com"]);
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("other.com"));
        let mut ctx = RequestContext::new("r1", Method::GET, "/acme/clients", None, headers, None);
        match filter.on_request(&mut ctx).await {
            FilterAction::Reject(err) => assert_eq!(err.status().as_u16(), 400),
            FilterAction::Continue => panic!("expected rejection"),
        }
    }
}
