//! Request filter pipeline.
//!
//! Filters run in ascending [`FilterOrder`] on the request path and in
//! descending order on the response path. The first rejection ends the
//! request path; every response, rejected or not, goes through all response
//! hooks.
//!
//! ```text
//! Request  ──► AccessLog ──► TrustedHost ──► Admission ──► Auth ──► RateLimit ──► dispatcher
//! Response ◄── AccessLog ◄── TrustedHost ◄── Admission ◄── Auth ◄── RateLimit ◄──
//! ```

mod access_log;
mod admission;
mod auth;
mod rate_limit;
mod trusted_host;

pub use access_log::AccessLogFilter;
pub use admission::AdmissionFilter;
pub use auth::AuthFilter;
pub use rate_limit::RateLimitFilter;
pub use trusted_host::TrustedHostFilter;

use crate::context::{GatewayResponse, RequestContext};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;

/// Position of a filter in the chain. Equal values keep registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    pub const ACCESS_LOG: FilterOrder = FilterOrder(0);
    pub const TRUSTED_HOST: FilterOrder = FilterOrder(10);
    pub const ADMISSION: FilterOrder = FilterOrder(50);
    pub const AUTH: FilterOrder = FilterOrder(100);
    pub const RATE_LIMIT: FilterOrder = FilterOrder(200);
}

/// What the pipeline does after a filter's request hook.
#[derive(Debug)]
pub enum FilterAction {
    Continue,
    /// Stop here and answer with this error.
    Reject(GatewayError),
}

#[async_trait]
pub trait GatewayFilter: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> FilterOrder;

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction;

    async fn on_response(&self, _ctx: &RequestContext, _resp: &mut GatewayResponse) {}
}

/// Filters sorted by [`FilterOrder`].
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run request hooks in ascending order, stopping at the first
    /// rejection.
    pub async fn run_request(&self, ctx: &mut RequestContext) -> FilterAction {
        for filter in &self.filters {
            if let FilterAction::Reject(err) = filter.on_request(ctx).await {
                return FilterAction::Reject(err);
            }
        }
        FilterAction::Continue
    }

    /// Run response hooks in descending order.
    pub async fn run_response(&self, ctx: &RequestContext, resp: &mut GatewayResponse) {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await;
        }
    }
}
