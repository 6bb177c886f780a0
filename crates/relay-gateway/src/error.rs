//! Gateway error types

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use relay_kernel::{AuthError, StoreError};
use serde_json::json;
use thiserror::Error;

/// Request-level gateway errors.
///
/// Every variant maps to exactly one HTTP status; see [`GatewayError::status`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("access denied: {0}")]
    AdmissionDenied(String),

    #[error("untrusted host header '{0}'")]
    UntrustedHost(String),

    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("principal has no entitled channels")]
    NoEntitlement,

    #[error("channel '{channel}' is not granted to this principal")]
    ChannelForbidden { channel: String },

    #[error("channel '{channel}' does not match URL prefix '{prefix}'")]
    ChannelMismatch { channel: String, prefix: String },

    #[error("channel '{0}' not found")]
    ChannelNotFound(String),

    #[error("channel '{0}' is misconfigured")]
    ChannelMisconfigured(String),

    #[error("path '{0}' is outside the proxied prefix")]
    PathNotAllowed(String),

    #[error("no active route matches '{0}'")]
    RouteNotFound(String),

    #[error("method '{0}' is not supported")]
    MethodNotAllowed(String),

    #[error("rate limit exceeded for client {client}")]
    RateLimited { client: String, retry_after_secs: u64 },

    #[error("rate limiter unavailable: {0}")]
    RateLimiterUnavailable(String),

    /// Downstream answered with a non-success status; relayed verbatim.
    #[error("downstream returned {status}")]
    DownstreamHttp {
        status: u16,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    #[error("downstream transport failure: {0}")]
    DownstreamTransport(String),

    #[error("cache store failure: {0}")]
    CacheStore(String),

    #[error("metadata store failure: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        GatewayError::Unauthenticated(err.to_string())
    }
}

impl GatewayError {
    /// HTTP status returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::UntrustedHost(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NoEntitlement => StatusCode::UNAUTHORIZED,
            GatewayError::ChannelForbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::ChannelMismatch { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ChannelMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::PathNotAllowed(_) => StatusCode::NOT_FOUND,
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RateLimiterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::DownstreamHttp { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::DownstreamTransport(_)
            | GatewayError::CacheStore(_)
            | GatewayError::Store(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code placed in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AdmissionDenied(_) => "ADMISSION_DENIED",
            GatewayError::UntrustedHost(_) => "UNTRUSTED_HOST",
            GatewayError::Unauthenticated(_) => "UNAUTHENTICATED",
            GatewayError::NoEntitlement => "NO_ENTITLEMENT",
            GatewayError::ChannelForbidden { .. } => "CHANNEL_FORBIDDEN",
            GatewayError::ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            GatewayError::ChannelNotFound(_) => "CHANNEL_NOT_FOUND",
            GatewayError::ChannelMisconfigured(_) => "CHANNEL_MISCONFIGURED",
            GatewayError::PathNotAllowed(_) => "PATH_NOT_ALLOWED",
            GatewayError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            GatewayError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::RateLimiterUnavailable(_) => "RATE_LIMITER_UNAVAILABLE",
            GatewayError::DownstreamHttp { .. } => "DOWNSTREAM_ERROR",
            GatewayError::DownstreamTransport(_) => "INTERNAL_ERROR",
            GatewayError::CacheStore(_) => "CACHE_STORE_ERROR",
            GatewayError::Store(_) => "STORE_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller. Transport and store detail stays in the
    /// logs.
    fn public_message(&self) -> String {
        match self {
            GatewayError::DownstreamTransport(_)
            | GatewayError::CacheStore(_)
            | GatewayError::Store(_)
            | GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::DownstreamHttp {
                content_type, body, ..
            } => {
                let mut resp = (status, body).into_response();
                match content_type {
                    Some(value) => {
                        resp.headers_mut().insert(header::CONTENT_TYPE, value);
                    }
                    None => {
                        resp.headers_mut().remove(header::CONTENT_TYPE);
                    }
                }
                resp
            }
            GatewayError::RateLimited {
                retry_after_secs, ..
            } => {
                let body = Json(json!({
                    "error": {
                        "code": self.code(),
                        "message": self.public_message(),
                    }
                }));
                let mut resp = (status, body).into_response();
                resp.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                resp
            }
            other => {
                let body = Json(json!({
                    "error": {
                        "code": other.code(),
                        "message": other.public_message(),
                    }
                }));
                (status, body).into_response()
            }
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(resp: Response) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn downstream_error_is_relayed_verbatim() {
        let err = GatewayError::DownstreamHttp {
            status: 503,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"error":"unavailable"}"#),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_of(resp).await, r#"{"error":"unavailable"}"#);
    }

    #[tokio::test]
    async fn downstream_content_type_is_kept() {
        let html = GatewayError::DownstreamHttp {
            status: 502,
            content_type: Some(HeaderValue::from_static("text/html; charset=utf-8")),
            body: Bytes::from_static(b"<h1>Bad Gateway</h1>"),
        }
        .into_response();
        assert_eq!(html.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body_of(html).await, "<h1>Bad Gateway</h1>");

        let untyped = GatewayError::DownstreamHttp {
            status: 500,
            content_type: None,
            body: Bytes::from_static(b"oops"),
        }
        .into_response();
        assert!(untyped.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn transport_detail_is_not_leaked() {
        let resp = GatewayError::DownstreamTransport("connect refused 10.1.2.3:443".into())
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(resp).await;
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("10.1.2.3"));
        assert!(text.contains("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let resp = GatewayError::RateLimited {
            client: "10.0.0.1".into(),
            retry_after_secs: 17,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "17");
    }

    #[test]
    fn status_map() {
        assert_eq!(GatewayError::NoEntitlement.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::ChannelForbidden {
                channel: "acme".into()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::ChannelMismatch {
                channel: "acme".into(),
                prefix: "other".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::RateLimiterUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
