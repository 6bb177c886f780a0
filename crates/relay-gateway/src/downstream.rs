//! Downstream GET proxy.
//!
//! One buffered request/response exchange per call, no retries. The
//! downstream body must be JSON and is relayed byte for byte.

use crate::error::{GatewayError, GatewayResult};
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::IgnoredAny;
use std::time::Duration;
use tracing::{debug, error, instrument};

pub struct DownstreamClient {
    client: Client,
}

impl DownstreamClient {
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` with `Authorization: <api_key>`.
    ///
    /// Any status ≥ 400 becomes [`GatewayError::DownstreamHttp`] carrying that
    /// status, content type and body. Connection failures, timeouts and non-JSON success
    /// bodies are logged and surface as opaque internal errors.
    #[instrument(skip(self, api_key), fields(url = %url))]
    pub async fn fetch(&self, url: &str, api_key: &str) -> GatewayResult<Bytes> {
        debug!("fetching from downstream");
        let mut builder = self.client.get(url);
        if !api_key.is_empty() {
            builder = builder.header(AUTHORIZATION, api_key);
        }

        let resp = builder.send().await.map_err(|e| {
            error!(
                error = %e,
                timeout = e.is_timeout(),
                connect = e.is_connect(),
                "downstream request failed"
            );
            GatewayError::DownstreamTransport(e.to_string())
        })?;

        let status = resp.status();
        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let body = resp.bytes().await.map_err(|e| {
            error!(error = %e, status = status.as_u16(), "failed to read downstream body");
            GatewayError::DownstreamTransport(e.to_string())
        })?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "relaying downstream error");
            return Err(GatewayError::DownstreamHttp {
                status: status.as_u16(),
                content_type,
                body,
            });
        }

        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&body) {
            error!(error = %e, status = status.as_u16(), "downstream returned a non-JSON body");
            return Err(GatewayError::Internal(format!("downstream body is not JSON: {e}")));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> DownstreamClient {
        DownstreamClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sends_api_key_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/clients/42"))
            .and(query_param("page", "2"))
            .and(header("authorization", "key-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":42}"#))
            .expect(1)
            .mount(&server)
            .await;

        let body = client()
            .fetch(&format!("{}/acme/clients/42?page=2", server.uri()), "key-1")
            .await
            .unwrap();
        assert_eq!(body, r#"{"id":42}"#);
    }

    #[tokio::test]
    async fn error_status_and_body_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_raw(r#"{"error":"unavailable"}"#, "application/problem+json"),
            )
            .mount(&server)
            .await;

        let err = client()
            .fetch(&format!("{}/acme/clients", server.uri()), "k")
            .await
            .unwrap_err();
        match err {
            GatewayError::DownstreamHttp {
                status,
                content_type,
                body,
            } => {
                assert_eq!(status, 503);
                assert_eq!(content_type.unwrap(), "application/problem+json");
                assert_eq!(body, r#"{"error":"unavailable"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_is_internal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client()
            .fetch(&format!("{}/acme/clients", server.uri()), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
    }

    #[tokio::test]
    async fn timeout_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = DownstreamClient::new(Duration::from_millis(50)).unwrap();
        let err = client
            .fetch(&format!("{}/acme/clients", server.uri()), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DownstreamTransport(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let err = client()
            .fetch("http://127.0.0.1:1/acme/clients", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DownstreamTransport(_)));
    }
}
