//! Per-request context and the response representation shared by the filter
//! pipeline and the dispatcher.

use crate::error::GatewayError;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use relay_kernel::Principal;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Mutable context that flows through the filter chain for a single request.
///
/// Filters read decisions made by earlier filters from here (the principal
/// set by authentication is read by the dispatcher, the start time recorded
/// by the access log is read back on the response path).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates the access log lines of one request.
    pub request_id: String,
    pub method: Method,
    /// Path without query string, e.g. `/acme/clients/42/products`.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// First `X-Forwarded-For` element, else the peer address, else `unknown`.
    pub client_ip: String,
    /// Raw `Host` header, `unknown` when absent.
    pub host: String,
    /// Raw `Authorization` header value, kept opaque for logging.
    pub token: Option<String>,
    /// Set by the authentication filter.
    pub principal: Option<Principal>,
    pub started_at: Instant,
    /// Free-form attributes written and read by filters.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new(
        request_id: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        query: Option<String>,
        headers: HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Self {
        let client_ip = client_ip(&headers, peer);
        let host = header_str(&headers, "host").unwrap_or("unknown").to_string();
        let token = header_str(&headers, "authorization").map(str::to_string);
        Self {
            request_id: request_id.into(),
            method,
            path: path.into(),
            query,
            headers,
            client_ip,
            host,
            token,
            principal: None,
            started_at: Instant::now(),
            attributes: HashMap::new(),
        }
    }

    /// The bearer credential with any `Bearer ` scheme prefix removed.
    pub fn bearer(&self) -> Option<&str> {
        let raw = self.token.as_deref()?.trim();
        let value = match raw.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ if raw.eq_ignore_ascii_case("bearer") => "",
            _ => raw,
        };
        (!value.is_empty()).then_some(value)
    }

    /// Path plus `?query` when a query string is present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    /// Read a typed attribute, `None` if absent or of another shape.
    pub fn get_attr<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_attr<T: serde::Serialize>(&mut self, key: impl Into<String>, val: &T) {
        if let Ok(v) = serde_json::to_value(val) {
            self.attributes.insert(key.into(), v);
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Whether a response came from the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Final response before conversion into an axum [`Response`].
///
/// Either a payload produced by the dispatcher or an error raised anywhere
/// in the pipeline; response filters see both.
#[derive(Debug)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Outcome {
    Payload { body: Bytes, cache: CacheStatus },
    Error(GatewayError),
}

impl GatewayResponse {
    pub fn payload(body: Bytes, cache: CacheStatus) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            outcome: Outcome::Payload { body, cache },
        }
    }

    pub fn error(err: GatewayError) -> Self {
        Self {
            status: err.status(),
            headers: HeaderMap::new(),
            outcome: Outcome::Error(err),
        }
    }

    pub fn error_ref(&self) -> Option<&GatewayError> {
        match &self.outcome {
            Outcome::Error(err) => Some(err),
            Outcome::Payload { .. } => None,
        }
    }

    /// Insert a header; invalid names or values are dropped.
    pub fn set_header(&mut self, name: &str, value: impl AsRef<str>) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut resp = match self.outcome {
            Outcome::Payload { body, cache } => {
                let mut resp = Response::new(Body::from(body));
                *resp.status_mut() = self.status;
                let headers = resp.headers_mut();
                headers.insert(
                    axum::http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                headers.insert("x-cache", HeaderValue::from_static(cache.as_str()));
                resp
            }
            Outcome::Error(err) => err.into_response(),
        };
        resp.headers_mut().extend(self.headers);
        resp
    }
}
