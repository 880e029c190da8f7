//! HTTP transport: retry, rate limiting, auth attachment and
//! cancellation for every call made by the Orchestrator Client (spec
//! §4.1).

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::auth::SharedAuthProvider;
use crate::error::{ClientError, Result};
use crate::rate_limit::RateLimiter;

/// Retry policy: linear backoff where the wait before attempt `k` is
/// `retry_delay * (k - 1)`, up to `max_attempts` total tries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Bundles an HTTP client, rate limiter, auth provider and retry policy
/// behind a single call surface used by every endpoint module.
#[derive(Clone)]
pub struct Transport {
    http: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    auth: SharedAuthProvider,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
        auth: SharedAuthProvider,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            auth,
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn attempt(&self, method: Method, path: &str, body: Option<&impl Serialize>) -> Result<Response> {
        let token = self.auth.token().await?;
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url).bearer_auth(token.as_str());
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send().await.map_err(ClientError::TransportIO)
    }

    /// Sends a request, retrying on retryable failures with linear
    /// backoff, honoring rate limiting and cancellation throughout.
    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            self.rate_limiter.acquire(cancel).await?;
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            match self.attempt(method.clone(), path, body).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    let err = ClientError::HttpStatus { status, body: text };
                    if !err.is_retryable() || attempt == self.retry.max_attempts {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt == self.retry.max_attempts {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }

            let backoff = self.retry.retry_delay * attempt;
            warn!(attempt, path, "request failed, retrying after backoff");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            }
        }
        Err(last_err.unwrap_or(ClientError::Cancelled))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, cancel: &CancellationToken) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None, cancel).await?;
        decode(response).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.send(Method::POST, path, Some(body), cancel).await?;
        decode(response).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.send(Method::PUT, path, Some(body), cancel).await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        self.send::<()>(Method::DELETE, path, None, cancel).await?;
        Ok(())
    }
}

/// Decodes a successful response body as JSON. A 204, or any 2xx with an
/// empty body, decodes as null rather than an error; callers that expect
/// no body should use `T = ()`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(ClientError::TransportIO)?;
    if bytes.is_empty() && (status.as_u16() == 204 || status.is_success()) {
        return serde_json::from_slice(b"null").map_err(|e| ClientError::DecodeError(e.to_string()));
    }
    serde_json::from_slice(&bytes).map_err(|e| ClientError::DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use httpmock::MockServer;
    use httpmock::Method::GET;
    use serde_json::json;

    fn transport(server: &MockServer) -> Transport {
        Transport::new(
            Client::new(),
            server.base_url(),
            Arc::new(RateLimiter::new(50.0)),
            Arc::new(StaticTokenProvider::ApiKey("test-token".to_string())),
            RetryPolicy {
                max_attempts: 3,
                retry_delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn successful_get_decodes_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        let value: serde_json::Value = transport.get("/ping", &cancel).await.unwrap();
        assert_eq!(value["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        let err = transport.get::<serde_json::Value>("/flaky", &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
        assert_eq!(mock.hits_async().await, 3);
    }

    #[tokio::test]
    async fn does_not_retry_4xx() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/bad");
                then.status(404);
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        let err = transport.get::<serde_json::Value>("/bad", &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 404, .. }));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_retry_wait() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport.get::<serde_json::Value>("/flaky", &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }

    /// S5: the wait before the 2nd attempt is `retry_delay * 1`, not 0.
    #[tokio::test]
    async fn first_retry_waits_one_retry_delay() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let mut transport = transport(&server);
        transport.retry.retry_delay = Duration::from_millis(40);
        transport.retry.max_attempts = 2;
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let _ = transport.get::<serde_json::Value>("/flaky", &cancel).await;
        let elapsed = started.elapsed();

        assert_eq!(mock.hits_async().await, 2);
        assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?} should include one backoff wait");
        assert!(elapsed < Duration::from_millis(120), "elapsed {elapsed:?} should not include a second wait");
    }

    #[tokio::test]
    async fn no_content_204_decodes_without_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/ack");
                then.status(204);
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        let value: serde_json::Value = transport.post("/ack", &json!({}), &cancel).await.unwrap();
        assert!(value.is_null());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_body_200_decodes_without_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/ack2");
                then.status(200).body("");
            })
            .await;

        let transport = transport(&server);
        let cancel = CancellationToken::new();
        let value: serde_json::Value = transport.post("/ack2", &json!({}), &cancel).await.unwrap();
        assert!(value.is_null());
    }
}
