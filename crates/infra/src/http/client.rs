use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use superapp_domain::{BackendConfig, SuperAppError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::InfraError;

/// No usable response came back from the server
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error("could not connect: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Streaming bodies cannot be sent twice
    #[error("request body is not replayable")]
    NotCloneable,
}

impl HttpError {
    /// Worth another attempt against the same server
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Request(inner) => inner.is_request(),
            Self::NotCloneable => false,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err)
        }
    }
}

impl From<HttpError> for SuperAppError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(inner) => InfraError::from(inner).into(),
            HttpError::NotCloneable => SuperAppError::Internal(err.to_string()),
            HttpError::Timeout | HttpError::Connect(_) => SuperAppError::Network(err.to_string()),
        }
    }
}

/// How many times a request goes out and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryPolicy {
    attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling each time
    fn delay_after(&self, attempt: usize) -> Duration {
        let doublings = attempt.saturating_sub(1).min(8) as u32;
        self.base_delay.saturating_mul(1 << doublings)
    }
}

/// reqwest client with a per-request timeout and transport-level retries
///
/// Only failures that never reached the backend's handler are retried here:
/// connection errors, timeouts and 5xx responses. Anything the backend
/// answered with a 4xx is handed straight back, since session refresh and
/// the circuit breaker make those decisions one layer up.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, SuperAppError> {
        Self::builder()
            .timeout(config.request_timeout())
            .max_attempts(config.max_transport_retries as usize + 1)
            .base_backoff(config.retry_base_delay())
            .user_agent(concat!("superapp-client/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send `builder`, retrying transient failures
    ///
    /// When every attempt got a 5xx the last response is returned, so the
    /// caller still sees the backend's status and body.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, HttpError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.retry.attempts;
            let request = builder.try_clone().ok_or(HttpError::NotCloneable)?.build()?;
            let target = format!("{} {}", request.method(), request.url());

            match self.client.execute(request).await {
                Ok(response) if response.status().is_server_error() && !last => {
                    debug!(attempt, %target, status = %response.status(), "Server error, retrying");
                }
                Ok(response) => {
                    debug!(attempt, %target, status = %response.status(), "Response received");
                    return Ok(response);
                }
                Err(err) => {
                    let err = HttpError::from(err);
                    if last || !err.is_transient() {
                        if last && err.is_transient() {
                            warn!(attempts = attempt, %target, error = %err, "Transport retries exhausted");
                        }
                        return Err(err);
                    }
                    debug!(attempt, %target, error = %err, "Transport failure, retrying");
                }
            }

            let delay = self.retry.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts including the first one; at least 1
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient, SuperAppError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(|err| SuperAppError::from(InfraError::from(err)))?;

        Ok(HttpClient {
            client,
            retry: RetryPolicy { attempts: self.max_attempts, base_delay: self.base_backoff },
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use reqwest::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(attempts: usize) -> HttpClient {
        HttpClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_attempts(attempts)
            .build()
            .unwrap()
    }

    /// Validates recovery from a flapping backend.
    ///
    /// Assertions:
    /// - Confirms two 503s followed by a 200 yield the 200.
    /// - Confirms exactly three requests reached the server.
    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/get-wallet"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/get-wallet"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let http = client(3);
        let url = format!("{}/functions/v1/get-wallet", server.uri());
        let response = http.send(http.request(Method::POST, url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let http = client(2);
        let response = http.send(http.request(Method::POST, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    /// Validates that answered requests are not repeated.
    ///
    /// Assertions:
    /// - Confirms a 401 is returned after a single request.
    #[tokio::test]
    async fn client_errors_are_returned_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let http = client(3);
        let response = http.send(http.request(Method::POST, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refused_connection_maps_to_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let http = client(2);
        let err = http
            .send(http.request(Method::GET, format!("http://{addr}")))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Connect(_)), "got {err:?}");
        assert!(matches!(SuperAppError::from(err), SuperAppError::Network(_)));
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy { attempts: 3, base_delay: Duration::from_millis(100) };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(50), Duration::from_millis(100 * 256));
    }
}
