//! HS256 JWT bearer credentials.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use relay_kernel::{AuthError, Authenticator, Principal};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Claims carried by gateway tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
    /// Entitled channel names.
    #[serde(default)]
    pub channels: Vec<String>,
}

pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a token for `subject` valid for `ttl_secs`. Used by tooling and
    /// tests; the gateway itself only verifies.
    pub fn issue(
        &self,
        subject: &str,
        channels: impl IntoIterator<Item = impl Into<String>>,
        ttl_secs: u64,
    ) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = JwtClaims {
            sub: subject.to_string(),
            exp: now + ttl_secs,
            channels: channels.into_iter().map(Into::into).collect(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn name(&self) -> &str {
        "jwt"
    }

    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError> {
        let data = decode::<JwtClaims>(credential, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredential(e.to_string()),
            },
        )?;
        Ok(Principal::new(data.claims.sub, data.claims.channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_claims() {
        let auth = JwtAuthenticator::new("s3cret");
        let token = auth.issue("user-1", ["acme"], 600).unwrap();
        let principal = auth.authenticate(&token).await.unwrap();
        assert_eq!(principal.subject, "user-1");
        assert!(principal.is_entitled_to("acme"));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let token = JwtAuthenticator::new("one").issue("u", ["acme"], 600).unwrap();
        assert!(matches!(
            JwtAuthenticator::new("two").authenticate(&token).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let auth = JwtAuthenticator::new("s3cret");
        let claims = JwtClaims {
            sub: "u".into(),
            exp: 1_000,
            channels: vec!["acme".into()],
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding_key).unwrap();
        assert!(matches!(auth.authenticate(&token).await, Err(AuthError::Expired)));
    }
}
