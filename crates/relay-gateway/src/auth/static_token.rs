//! Fixed tokens from configuration.

use async_trait::async_trait;
use relay_kernel::{AuthError, Authenticator, Principal, StaticToken};
use std::collections::HashMap;

pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = StaticToken>) -> Self {
        let tokens = tokens
            .into_iter()
            .map(|t| (t.token, Principal::new(t.subject, t.channels)))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    fn name(&self) -> &str {
        "static-token"
    }

    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential("unknown token".to_string()))
    }
}
