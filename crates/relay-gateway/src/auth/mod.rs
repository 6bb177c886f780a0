//! Bearer credential verification.

mod jwt;
mod static_token;

pub use jwt::{JwtAuthenticator, JwtClaims};
pub use static_token::StaticTokenAuthenticator;

use async_trait::async_trait;
use relay_kernel::{AuthConfig, AuthError, Authenticator, Principal};
use std::sync::Arc;

/// Tries each authenticator in turn; the first success wins.
///
/// When every authenticator fails, the last error is returned, except that
/// an `Expired` error takes precedence so the caller learns why.
pub struct ChainAuthenticator {
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl ChainAuthenticator {
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { authenticators }
    }

    /// Build the chain described by `config`: static tokens first, then JWT.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut authenticators: Vec<Arc<dyn Authenticator>> = Vec::new();
        if !config.static_tokens.is_empty() {
            authenticators.push(Arc::new(StaticTokenAuthenticator::new(
                config.static_tokens.iter().cloned(),
            )));
        }
        if let Some(secret) = config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            authenticators.push(Arc::new(JwtAuthenticator::new(secret)));
        }
        Self::new(authenticators)
    }

    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }
}

#[async_trait]
impl Authenticator for ChainAuthenticator {
    fn name(&self) -> &str {
        "chain"
    }

    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError> {
        let mut last = AuthError::InvalidCredential("no authenticator configured".to_string());
        for authenticator in &self.authenticators {
            match authenticator.authenticate(credential).await {
                Ok(principal) => return Ok(principal),
                Err(AuthError::Expired) => return Err(AuthError::Expired),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
