//! Bearer authentication filter.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::context::RequestContext;
use crate::error::GatewayError;
use async_trait::async_trait;
use relay_kernel::{AuthError, Authenticator};
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies the bearer credential and stores the resulting
/// [`Principal`](relay_kernel::Principal) on the context.
pub struct AuthFilter {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthFilter {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl GatewayFilter for AuthFilter {
    fn name(&self) -> &str {
        "auth"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        let result = match ctx.bearer() {
            Some(credential) => self.authenticator.authenticate(credential).await,
            None => Err(AuthError::MissingCredential),
        };

        match result {
            Ok(principal) => {
                debug!(
                    request_id = %ctx.request_id,
                    subject = %principal.subject,
                    channels = principal.channels.len(),
                    "authenticated"
                );
                ctx.principal = Some(principal);
                FilterAction::Continue
            }
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id,
                    client_ip = %ctx.client_ip,
                    host = %ctx.host,
                    token = ctx.token.as_deref().unwrap_or("none"),
                    authenticator = self.authenticator.name(),
                    error = %e,
                    "rejected request: authentication failed"
                );
                FilterAction::Reject(GatewayError::from(e))
            }
        }
    }
}
